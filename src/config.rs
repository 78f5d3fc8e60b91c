use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the catalog CSV
pub const DEFAULT_SOURCE_PATH: &str = "data/pokemon.csv";

/// Default location of the SQLite store
pub const DEFAULT_DATABASE_PATH: &str = "data/dex.db";

/// Bind address for the read-only API server
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";

/// Environment variable the API server reads the database path from
pub const DATABASE_ENV_VAR: &str = "DEX_DATABASE";

/// What the loader does when a single row is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowErrorPolicy {
    /// Stop and roll back the whole load.
    #[default]
    Abort,
    /// Roll back just that row, record it, keep going.
    Skip,
}

/// Everything one invocation of the pipeline needs.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub source: PathBuf,
    pub database: PathBuf,
    pub on_row_error: RowErrorPolicy,
}

impl LoadConfig {
    pub fn new(source: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        LoadConfig {
            source: source.into(),
            database: database.into(),
            on_row_error: RowErrorPolicy::default(),
        }
    }

    pub fn with_row_error_policy(mut self, policy: RowErrorPolicy) -> Self {
        self.on_row_error = policy;
        self
    }
}
