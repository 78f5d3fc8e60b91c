// Error taxonomy for the load pipeline
//
// Recoverable conditions (missing cells, duplicate keys, malformed trait lists)
// never show up here: they are ordinary values. What remains is either fatal
// for one row (RowError) or fatal for the whole load (SourceError, StoreError).

use crate::resolver::TermKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading the tabular source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("source is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Errors raised by the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened or reached. Always fatal.
    #[error("cannot reach store at {path}: {source}")]
    Connectivity {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A constraint other than the anticipated uniqueness conflict fired.
    #[error("constraint violated on {table}: {message}")]
    Constraint { table: &'static str, message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Classify a rusqlite error raised while writing `table`.
    pub fn from_write(table: &'static str, err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint {
                    table,
                    message: message.unwrap_or_else(|| code.to_string()),
                }
            }
            other => StoreError::Sqlite(other),
        }
    }

    /// True when the error only condemns the row being written.
    pub fn is_row_local(&self) -> bool {
        matches!(self, StoreError::Constraint { .. })
    }
}

/// Errors that reject a single source row.
#[derive(Error, Debug)]
pub enum RowError {
    #[error("entity key is missing")]
    MissingKey,

    #[error("row has {found} fields but the header has {expected}")]
    TooManyFields { expected: usize, found: usize },

    #[error("column {column} holds unparsable value {value:?}")]
    InvalidField { column: &'static str, value: String },

    #[error("{kind} term {name:?} was never resolved")]
    UnresolvedTerm { kind: TermKind, name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RowError {
    /// Row errors are row-local unless the store itself failed.
    pub fn is_row_local(&self) -> bool {
        match self {
            RowError::Store(err) => err.is_row_local(),
            _ => true,
        }
    }
}

/// Errors that end a load.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("row at line {line} (entity key {}) rejected: {source}", display_key(.entity_key))]
    Row {
        line: u64,
        entity_key: Option<i64>,
        #[source]
        source: RowError,
    },
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        LoadError::Store(StoreError::Sqlite(err))
    }
}

fn display_key(key: &Option<i64>) -> String {
    key.map(|k| k.to_string()).unwrap_or_else(|| "?".to_string())
}
