//! Lightweight validation of user queries before they are wrapped as subqueries.

use sqlparser::ast::{SetExpr, Statement, TableFactor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::error::{ConectaError, Result};

/// A user query that is safe to embed as `(...) AS t`.
#[derive(Debug, Clone)]
pub struct UserQuery {
    sql: String,
    table: Option<String>,
}

impl UserQuery {
    /// Normalize and validate `sql`.
    ///
    /// Text the generic dialect cannot parse is accepted as-is, so vendor
    /// specific syntax still reaches the source. Parsed text must be exactly
    /// one query statement.
    pub fn parse(sql: &str) -> Result<Self> {
        let normalized = normalize(sql);
        if normalized.is_empty() {
            return Err(ConectaError::config("query is empty"));
        }
        if normalized.contains('\0') {
            return Err(ConectaError::config("query contains null bytes"));
        }

        let statements = match Parser::parse_sql(&GenericDialect {}, &normalized) {
            Ok(statements) => statements,
            Err(err) => {
                debug!(error = %err, "query not understood by generic dialect, passing through");
                return Ok(Self {
                    sql: normalized,
                    table: None,
                });
            }
        };

        match statements.as_slice() {
            [Statement::Query(query)] => {
                let table = match query.body.as_ref() {
                    SetExpr::Select(select) => select.from.iter().find_map(|twj| {
                        match &twj.relation {
                            TableFactor::Table { name, .. } => Some(name.to_string()),
                            _ => None,
                        }
                    }),
                    _ => None,
                };
                Ok(Self {
                    sql: normalized,
                    table,
                })
            }
            [_] => Err(ConectaError::config(format!(
                "only SELECT queries can be read, got: {normalized}"
            ))),
            _ => Err(ConectaError::config(format!(
                "expected exactly one statement per query, got {}",
                statements.len()
            ))),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// First table in the FROM clause, when the query is a plain SELECT.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

/// Trim whitespace and trailing semicolons.
pub fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim_end().to_string()
}
