//! Rewriting of named `:name` placeholders into Postgres `$n` parameters.

use indexmap::IndexMap;
use pizzeria_query::{BindParams, SqlValue};

use crate::error::{PostgresError, Result};

/// SQL text with positional parameters and the values to bind, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Replaces every `:name` placeholder with `$n`.
///
/// Repeated names share one parameter. Quoted strings, quoted identifiers and
/// `::` casts are left alone. A placeholder without an input bind fails; input
/// binds that the SQL never mentions are not sent.
pub fn to_positional(sql: &str, binds: &BindParams) -> Result<PositionalStatement> {
    let mut out = String::with_capacity(sql.len());
    let mut positions: IndexMap<&str, usize> = IndexMap::new();
    let mut values = Vec::new();

    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                let end = closing_quote(bytes, i, quote);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                out.push_str("::");
                i += 2;
            }
            b':' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                let name = &sql[start..end];
                let position = match positions.get(name) {
                    Some(position) => *position,
                    None => {
                        let value = binds
                            .in_value(name)
                            .ok_or_else(|| PostgresError::UnboundPlaceholder { name: name.to_string() })?;
                        values.push(value.clone());
                        positions.insert(name, values.len());
                        values.len()
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
                i = end;
            }
            _ => {
                let ch_len = utf8_len(bytes[i]);
                out.push_str(&sql[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    Ok(PositionalStatement { sql: out, values })
}

/// Index just past the quote closing the literal that starts at `start`.
/// Doubled quotes are escapes. An unterminated literal runs to the end.
fn closing_quote(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}
