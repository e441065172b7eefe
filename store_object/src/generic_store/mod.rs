pub mod core;
pub mod store_object;

pub use core::EntityStore;
