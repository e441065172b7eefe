//! Parser for the statement dialect the in-memory backend understands
//!
//! ```text
//! INSERT INTO t (a, b) VALUES (?, ?)
//! UPDATE t SET a = ?, b = ? WHERE k = ? AND j = ?
//! DELETE FROM t WHERE k = ?
//! SELECT * | a, b FROM t [alias] [WHERE [alias.]k = ? AND ..]
//! SELECT NEXTVAL('seq') [AS name]
//! ```
//!
//! Identifiers are case-insensitive and stored lowercase.

use crate::connection::DriverError;

const SYNTAX_ERROR: &str = "42601";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Insert {
        table: String,
        columns: Vec<String>,
    },
    Update {
        table: String,
        assignments: Vec<String>,
        conditions: Vec<String>,
    },
    Delete {
        table: String,
        conditions: Vec<String>,
    },
    Select {
        table: String,
        projection: Option<Vec<String>>,
        conditions: Vec<String>,
    },
    NextVal {
        sequence: String,
        alias: String,
    },
}

impl Command {
    pub(crate) fn placeholder_count(&self) -> usize {
        match self {
            Command::Insert { columns, .. } => columns.len(),
            Command::Update {
                assignments,
                conditions,
                ..
            } => assignments.len() + conditions.len(),
            Command::Delete { conditions, .. } | Command::Select { conditions, .. } => {
                conditions.len()
            }
            Command::NextVal { .. } => 0,
        }
    }

    pub(crate) fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Insert { .. } | Command::Update { .. } | Command::Delete { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Placeholder,
    Symbol(char),
}

fn syntax(message: impl Into<String>) -> DriverError {
    DriverError::new(Some(SYNTAX_ERROR.to_string()), message)
}

fn tokenize(sql: &str) -> Result<Vec<Token>, DriverError> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '?' {
            chars.next();
            tokens.push(Token::Placeholder);
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => text.push(ch),
                    None => return Err(syntax("unterminated quoted string")),
                }
            }
            tokens.push(Token::Quoted(text));
        } else if c.is_alphanumeric() || c == '_' {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    word.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else if "(),=*.;".contains(c) {
            chars.next();
            tokens.push(Token::Symbol(c));
        } else {
            return Err(syntax(format!("unexpected character '{}'", c)));
        }
    }
    // A trailing semicolon is allowed
    if tokens.last() == Some(&Token::Symbol(';')) {
        tokens.pop();
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), DriverError> {
        if self.at_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(format!("expected {} at token {}", keyword, self.pos)))
        }
    }

    fn at_symbol(&self, symbol: char) -> bool {
        self.peek() == Some(&Token::Symbol(symbol))
    }

    fn symbol(&mut self, symbol: char) -> Result<(), DriverError> {
        if self.at_symbol(symbol) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(format!("expected '{}' at token {}", symbol, self.pos)))
        }
    }

    fn placeholder(&mut self) -> Result<(), DriverError> {
        match self.next() {
            Some(Token::Placeholder) => Ok(()),
            _ => Err(syntax("only ? placeholders are supported as values")),
        }
    }

    fn ident(&mut self) -> Result<String, DriverError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.to_ascii_lowercase()),
            _ => Err(syntax(format!("expected identifier at token {}", self.pos - 1))),
        }
    }

    /// `name` or `prefix.name`, returning `name`
    fn column(&mut self) -> Result<String, DriverError> {
        let first = self.ident()?;
        if self.at_symbol('.') {
            self.pos += 1;
            return self.ident();
        }
        Ok(first)
    }

    fn ident_list(&mut self) -> Result<Vec<String>, DriverError> {
        let mut names = vec![self.column()?];
        while self.at_symbol(',') {
            self.pos += 1;
            names.push(self.column()?);
        }
        Ok(names)
    }

    /// `a = ? AND b = ?`
    fn conditions(&mut self) -> Result<Vec<String>, DriverError> {
        let mut columns = Vec::new();
        loop {
            columns.push(self.column()?);
            self.symbol('=')?;
            self.placeholder()?;
            if self.at_keyword("AND") {
                self.pos += 1;
            } else {
                return Ok(columns);
            }
        }
    }

    fn optional_where(&mut self) -> Result<Vec<String>, DriverError> {
        if self.at_keyword("WHERE") {
            self.pos += 1;
            self.conditions()
        } else {
            Ok(Vec::new())
        }
    }

    fn finish(&self) -> Result<(), DriverError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(syntax(format!("unexpected trailing token {:?}", token))),
        }
    }

    fn insert(&mut self) -> Result<Command, DriverError> {
        self.keyword("INTO")?;
        let table = self.ident()?;
        self.symbol('(')?;
        let columns = self.ident_list()?;
        self.symbol(')')?;
        self.keyword("VALUES")?;
        self.symbol('(')?;
        for i in 0..columns.len() {
            if i > 0 {
                self.symbol(',')?;
            }
            self.placeholder()?;
        }
        self.symbol(')')?;
        Ok(Command::Insert { table, columns })
    }

    fn update(&mut self) -> Result<Command, DriverError> {
        let table = self.ident()?;
        self.keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            assignments.push(self.column()?);
            self.symbol('=')?;
            self.placeholder()?;
            if self.at_symbol(',') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let conditions = self.optional_where()?;
        Ok(Command::Update {
            table,
            assignments,
            conditions,
        })
    }

    fn delete(&mut self) -> Result<Command, DriverError> {
        self.keyword("FROM")?;
        let table = self.ident()?;
        let conditions = self.optional_where()?;
        Ok(Command::Delete { table, conditions })
    }

    fn select(&mut self) -> Result<Command, DriverError> {
        if self.at_keyword("NEXTVAL") {
            self.pos += 1;
            self.symbol('(')?;
            let sequence = match self.next() {
                Some(Token::Quoted(name)) => name.to_ascii_lowercase(),
                _ => return Err(syntax("NEXTVAL expects a quoted sequence name")),
            };
            self.symbol(')')?;
            let alias = if self.at_keyword("AS") {
                self.pos += 1;
                self.ident()?
            } else {
                "nextval".to_string()
            };
            return Ok(Command::NextVal { sequence, alias });
        }

        let projection = if self.at_symbol('*') {
            self.pos += 1;
            None
        } else {
            Some(self.ident_list()?)
        };
        self.keyword("FROM")?;
        let table = self.ident()?;
        // Optional alias
        if matches!(self.peek(), Some(Token::Word(_))) && !self.at_keyword("WHERE") {
            self.pos += 1;
        }
        let conditions = self.optional_where()?;
        Ok(Command::Select {
            table,
            projection,
            conditions,
        })
    }
}

pub(crate) fn parse(sql: &str) -> Result<Command, DriverError> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
    };
    let verb = parser.ident()?;
    let command = match verb.as_str() {
        "insert" => parser.insert()?,
        "update" => parser.update()?,
        "delete" => parser.delete()?,
        "select" => parser.select()?,
        other => return Err(syntax(format!("unsupported statement '{}'", other))),
    };
    parser.finish()?;
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert() {
        let command = parse("INSERT INTO Orders (order_id, Customer) VALUES (?, ?)").unwrap();
        assert_eq!(
            command,
            Command::Insert {
                table: "orders".into(),
                columns: vec!["order_id".into(), "customer".into()],
            }
        );
        assert_eq!(command.placeholder_count(), 2);
    }

    #[test]
    fn test_parse_update_with_prefixed_conditions() {
        let command =
            parse("update order_lines set qty = ?, price = ? where l.order_id = ? and l.line_no = ?;")
                .unwrap();
        assert_eq!(
            command,
            Command::Update {
                table: "order_lines".into(),
                assignments: vec!["qty".into(), "price".into()],
                conditions: vec!["order_id".into(), "line_no".into()],
            }
        );
        assert_eq!(command.placeholder_count(), 4);
    }

    #[test]
    fn test_parse_select_forms() {
        assert_eq!(
            parse("SELECT * FROM products p WHERE p.sku = ?").unwrap(),
            Command::Select {
                table: "products".into(),
                projection: None,
                conditions: vec!["sku".into()],
            }
        );
        assert_eq!(
            parse("SELECT sku, qty FROM products").unwrap(),
            Command::Select {
                table: "products".into(),
                projection: Some(vec!["sku".into(), "qty".into()]),
                conditions: vec![],
            }
        );
        assert_eq!(
            parse("SELECT NEXTVAL('Order_Seq') AS nextval").unwrap(),
            Command::NextVal {
                sequence: "order_seq".into(),
                alias: "nextval".into(),
            }
        );
    }

    #[test]
    fn test_rejects_unsupported_sql() {
        let error = parse("DELETE FROM t WHERE a > ?").unwrap_err();
        assert_eq!(error.code.as_deref(), Some(SYNTAX_ERROR));
        assert!(parse("INSERT INTO t (a) VALUES (1)").is_err());
        assert!(parse("TRUNCATE t").is_err());
        assert!(parse("SELECT * FROM t WHERE a = ? extra").is_err());
    }
}
