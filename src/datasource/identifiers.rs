//! Validation of names that end up interpolated into SQL text.
//!
//! Table and column identifiers cannot be bound as parameters, so every name
//! that reaches a generated statement must pass these checks first.

use thiserror::Error;

const MAX_SEGMENT_LENGTH: usize = 64;

const RESERVED_WORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "UNION", "OR",
    "AND", "WHERE", "FROM", "JOIN", "HAVING", "GROUP", "ORDER", "EXEC", "EXECUTE", "DECLARE",
    "CAST", "CONVERT", "SCRIPT", "JAVASCRIPT",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },
    #[error("{kind} name '{name}' exceeds 64 characters")]
    TooLong { kind: &'static str, name: String },
    #[error("{kind} name '{name}' contains characters outside [A-Za-z0-9_] or does not start with a letter")]
    InvalidCharacters { kind: &'static str, name: String },
    #[error("{kind} name '{name}' is a reserved SQL keyword")]
    Reserved { kind: &'static str, name: String },
}

fn validate_segment(kind: &'static str, segment: &str, whole: &str) -> Result<(), IdentifierError> {
    if segment.is_empty() {
        return Err(IdentifierError::InvalidCharacters {
            kind,
            name: whole.to_string(),
        });
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(IdentifierError::TooLong {
            kind,
            name: whole.to_string(),
        });
    }
    let mut chars = segment.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentifierError::InvalidCharacters {
            kind,
            name: whole.to_string(),
        });
    }
    if RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(segment))
    {
        return Err(IdentifierError::Reserved {
            kind,
            name: whole.to_string(),
        });
    }
    Ok(())
}

/// Accepts `table` or `schema.table`.
pub fn validate_table_name(name: &str) -> Result<(), IdentifierError> {
    if name.trim().is_empty() {
        return Err(IdentifierError::Empty { kind: "table" });
    }
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() > 2 {
        return Err(IdentifierError::InvalidCharacters {
            kind: "table",
            name: name.to_string(),
        });
    }
    segments
        .iter()
        .try_for_each(|segment| validate_segment("table", segment, name))
}

pub fn validate_column_name(name: &str) -> Result<(), IdentifierError> {
    if name.trim().is_empty() {
        return Err(IdentifierError::Empty { kind: "column" });
    }
    validate_segment("column", name, name)
}

pub fn validate_datasource_name(name: &str) -> Result<(), IdentifierError> {
    if name.trim().is_empty() {
        return Err(IdentifierError::Empty { kind: "datasource" });
    }
    validate_segment("datasource", name, name)
}

/// Splits a validated table name into its optional schema and bare table part.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}
