//! Named-parameter substitution for SQL text.
//!
//! `:name` placeholders are replaced by SQL literals, `IDENT(:name)` by a
//! quoted identifier. Matching is boundary aware: a placeholder only matches
//! when the whole identifier run after the prefix equals the parameter name,
//! so `:val` never rewrites part of `:val1`. Postgres style `::type` casts are
//! left alone.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{ConectaError, Result};

const IDENT_CALL: &str = "IDENT(";

#[derive(Debug, Clone)]
pub struct BindOptions {
    pub placeholder_prefix: char,
    pub identifier_quote: char,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            placeholder_prefix: ':',
            identifier_quote: '"',
        }
    }
}

/// Bind `parameters` into `sql` using `:` placeholders and `"` identifier quotes.
pub fn bind(sql: &str, parameters: &Map<String, Value>) -> Result<String> {
    bind_with(sql, parameters, &BindOptions::default())
}

pub fn bind_with(sql: &str, parameters: &Map<String, Value>, opts: &BindOptions) -> Result<String> {
    let literals = parameters
        .iter()
        .map(|(name, value)| Ok((name.as_str(), render_literal(name, value)?)))
        .collect::<Result<HashMap<&str, String>>>()?;

    let prefix = opts.placeholder_prefix;
    let mut out = String::with_capacity(sql.len());
    let mut prev: Option<char> = None;
    let mut pos = 0;

    while let Some(ch) = sql[pos..].chars().next() {
        let at_boundary = !prev.is_some_and(|p| is_ident_char(p) || p == prefix);

        if at_boundary && sql[pos..].starts_with(IDENT_CALL) {
            if let Some((name, end)) = placeholder_at(sql, pos + IDENT_CALL.len(), prefix) {
                if sql[end..].starts_with(')') {
                    if let Some(value) = parameters.get(name) {
                        out.push_str(&render_identifier(name, value, opts.identifier_quote)?);
                        pos = end + 1;
                        prev = Some(')');
                        continue;
                    }
                }
            }
        }

        if ch == prefix && at_boundary {
            if let Some((name, end)) = placeholder_at(sql, pos, prefix) {
                if let Some(literal) = literals.get(name) {
                    out.push_str(literal);
                    prev = literal.chars().last();
                    pos = end;
                    continue;
                }
            }
        }

        out.push(ch);
        prev = Some(ch);
        pos += ch.len_utf8();
    }

    Ok(out)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Returns the placeholder name starting at `pos` (which must hold `prefix`)
/// and the byte offset just past it.
fn placeholder_at(sql: &str, pos: usize, prefix: char) -> Option<(&str, usize)> {
    let rest = sql.get(pos..)?.strip_prefix(prefix)?;
    let len = rest
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(rest.len());
    if len == 0 {
        return None;
    }
    let start = pos + prefix.len_utf8();
    Some((&sql[start..start + len], start + len))
}

fn render_literal(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok("NULL".to_string()),
        other => Err(ConectaError::Bind(format!(
            "parameter '{name}' has unsupported value kind {}",
            value_kind(other)
        ))),
    }
}

fn render_identifier(name: &str, value: &Value, quote: char) -> Result<String> {
    match value {
        Value::String(s) => {
            let escaped = s.replace(quote, &format!("{quote}{quote}"));
            Ok(format!("{quote}{escaped}{quote}"))
        }
        other => Err(ConectaError::Bind(format!(
            "parameter '{name}' used as identifier must be a string, got {}",
            value_kind(other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
