//! Batched writes of many entities of one type
//!
//! Statements are submitted in chunks of the unit of work's batch size. Outcomes are
//! matched back to entities by submission position; a failed statement marks exactly
//! its own entity as failed and leaves the rest of the chunk persisted.

use super::{entity_statement, validate_graph, UnitOfWork};
use crate::connection::{BatchExecutionError, StatementOutcome};
use crate::errors::{BatchFailure, PersistError};
use crate::status::{EntityStatus, Operation};
use crate::traits::Entity;
use signal_system::EventType;
use tracing::{debug, warn};

/// Summary of a completed batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Entities that got a statement of their own
    pub submitted: usize,
    /// Chunks sent to the backend
    pub batches: usize,
    /// Entities skipped because of their status or because they appeared twice
    pub skipped: usize,
}

/// Entity indices sorted by what happened to their statement
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Correlation {
    pub succeeded: Vec<usize>,
    pub failed: Vec<usize>,
    pub not_executed: Vec<usize>,
}

/// Match outcomes to entities; `submitted[i]` is the entity behind statement `i`
pub(crate) fn correlate(submitted: &[usize], outcomes: &[StatementOutcome]) -> Correlation {
    let mut correlation = Correlation::default();
    for (position, &index) in submitted.iter().enumerate() {
        match outcomes.get(position) {
            Some(StatementOutcome::ExecutionFailed) => correlation.failed.push(index),
            Some(_) => correlation.succeeded.push(index),
            None => correlation.not_executed.push(index),
        }
    }
    correlation
}

fn settled_status(operation: Operation) -> EntityStatus {
    match operation {
        Operation::Delete => EntityStatus::Deleted,
        _ => EntityStatus::Existing,
    }
}

fn event_for(operation: Operation) -> EventType {
    match operation {
        Operation::Insert => EventType::Insert,
        Operation::Update => EventType::Update,
        _ => EventType::Delete,
    }
}

impl UnitOfWork {
    /// Insert new entities in batches, then their parts one graph at a time
    pub async fn insert_batch(
        &mut self,
        entities: &mut [&mut dyn Entity],
    ) -> Result<BatchReport, PersistError> {
        self.run_batch(Operation::Insert, entities).await
    }

    /// Batch the `UPDATE`s of changed entities; everything else is saved as a graph
    pub async fn update_batch(
        &mut self,
        entities: &mut [&mut dyn Entity],
    ) -> Result<BatchReport, PersistError> {
        self.run_batch(Operation::Update, entities).await
    }

    pub async fn delete_batch(
        &mut self,
        entities: &mut [&mut dyn Entity],
    ) -> Result<BatchReport, PersistError> {
        self.run_batch(Operation::Delete, entities).await
    }

    async fn run_batch(
        &mut self,
        operation: Operation,
        entities: &mut [&mut dyn Entity],
    ) -> Result<BatchReport, PersistError> {
        for entity in entities.iter() {
            validate_graph(&**entity, operation)?;
        }
        let mut report = BatchReport::default();

        // Input order is kept; only entities in the right state get a statement
        let mut eligible = Vec::new();
        let mut duplicates = Vec::new();
        let mut individual = Vec::new();
        for (index, entity) in entities.iter_mut().enumerate() {
            let entity = &mut **entity;
            let status = entity.status();
            let batched = match operation {
                Operation::Insert => status == EntityStatus::New,
                Operation::Update => status == EntityStatus::Changed,
                Operation::Delete => matches!(
                    status,
                    EntityStatus::Existing | EntityStatus::Changed | EntityStatus::Deleted
                ),
                Operation::Select => false,
            };
            if !batched {
                match (operation, status) {
                    (Operation::Update, EntityStatus::New)
                    | (Operation::Update, EntityStatus::Existing)
                    | (Operation::Update, EntityStatus::Deleted)
                    | (Operation::Update, EntityStatus::CascadeDeleted)
                    | (Operation::Delete, EntityStatus::CascadeDeleted) => individual.push(index),
                    _ => report.skipped += 1,
                }
                continue;
            }
            if operation == Operation::Insert {
                self.ensure_key(entity).await?;
            }
            let tracking = Self::tracking_key(entity, operation)?;
            if self.visited.contains_key(&tracking) {
                duplicates.push((index, tracking));
                report.skipped += 1;
                continue;
            }
            self.visited.insert(tracking, settled_status(operation));
            eligible.push(index);
        }

        for &index in &eligible {
            let entity = &mut *entities[index];
            match operation {
                Operation::Update => self.delete_removed_parts(entity).await?,
                Operation::Delete => self.delete_uncascaded_parts(entity).await?,
                _ => {}
            }
        }

        let mut written: Vec<usize> = Vec::with_capacity(eligible.len());
        let mut submitted = 0;
        for (chunk_no, chunk) in eligible.chunks(self.batch_size).enumerate() {
            let mut statements = Vec::with_capacity(chunk.len());
            for &index in chunk {
                statements.push(entity_statement(&*entities[index], operation)?);
            }
            debug!(
                uow = %self.id,
                %operation,
                chunk = chunk_no,
                statements = statements.len(),
                "submitting batch"
            );
            let (outcomes, aborted) = match self.connection.execute_batch(&statements).await {
                Ok(outcomes) => (outcomes, None),
                Err(BatchExecutionError { outcomes, source }) => (outcomes, Some(source)),
            };
            report.batches += 1;
            submitted += chunk.len();

            let correlation = correlate(chunk, &outcomes);
            self.statements += correlation.succeeded.len() + correlation.failed.len();
            for &index in &correlation.succeeded {
                let entity: &dyn Entity = &*entities[index];
                let key = entity.require_key(operation)?.clone();
                self.record(event_for(operation), entity.entity_type(), key);
            }
            written.extend_from_slice(&correlation.succeeded);

            if correlation.failed.is_empty() && aborted.is_none() {
                continue;
            }

            // Statements that ran are persisted, the failed ones are not retried
            for &index in &written {
                entities[index].set_status(settled_status(operation));
            }
            let mut failures = Vec::with_capacity(correlation.failed.len());
            for &index in &correlation.failed {
                let entity = &mut *entities[index];
                self.fail(entity, operation);
                failures.push(BatchFailure {
                    position: index,
                    key: entity.primary_key().cloned(),
                });
            }
            self.rollback_only = true;
            let not_executed = correlation.not_executed.len() + (eligible.len() - submitted);
            let entity_type = correlation
                .failed
                .first()
                .or(chunk.first())
                .map(|&index| entities[index].entity_type())
                .unwrap_or_default();
            warn!(
                uow = %self.id,
                %operation,
                entity_type,
                failed = failures.len(),
                not_executed,
                "batch had failing statements"
            );
            return Err(PersistError::BatchPartialFailure {
                entity_type: entity_type.to_string(),
                operation,
                submitted,
                failures,
                not_executed,
                source: aborted,
            });
        }
        report.submitted = submitted;

        for &index in &eligible {
            let entity = &mut *entities[index];
            match operation {
                Operation::Insert => {
                    for part in entity.parts_mut() {
                        self.insert_graph(part).await?;
                    }
                }
                Operation::Update => {
                    self.save_parts(entity).await?;
                    entity.release_removed_parts();
                }
                Operation::Delete => self.cascade_parts(entity),
                Operation::Select => {}
            }
            entity.set_status(settled_status(operation));
        }

        for index in individual {
            let entity = &mut *entities[index];
            match operation {
                Operation::Delete => self.mark_cascaded(entity),
                _ => self.update_graph(entity).await?,
            }
        }

        for (index, tracking) in duplicates {
            if let Some(status) = self.visited.get(&tracking).copied() {
                entities[index].set_status(status);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlate_by_position() {
        let outcomes = [
            StatementOutcome::Affected(1),
            StatementOutcome::SuccessNoInfo,
            StatementOutcome::ExecutionFailed,
            StatementOutcome::Affected(1),
        ];
        let correlation = correlate(&[3, 5, 8, 9], &outcomes);
        assert_eq!(correlation.succeeded, vec![3, 5, 9]);
        assert_eq!(correlation.failed, vec![8]);
        assert!(correlation.not_executed.is_empty());
    }

    #[test]
    fn test_correlate_short_outcome_list() {
        let outcomes = [StatementOutcome::Affected(1)];
        let correlation = correlate(&[0, 1, 2], &outcomes);
        assert_eq!(correlation.succeeded, vec![0]);
        assert!(correlation.failed.is_empty());
        assert_eq!(correlation.not_executed, vec![1, 2]);
    }
}
