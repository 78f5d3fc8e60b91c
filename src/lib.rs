// Dex Normalizer - Core Library
// Loads a denormalized catalog CSV into a normalized SQLite store.
// Exposes all modules for use in the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod record;
pub mod resolver;
pub mod source;
pub mod trait_list;
pub mod vocabulary;

// Re-export commonly used types
pub use config::{LoadConfig, RowErrorPolicy};
pub use db::{
    Store, Table, TableCounts, EntityView, LoadRun,
    setup_database, table_counts, count, get_entity_view, get_load_runs,
};
pub use error::{LoadError, RowError, SourceError, StoreError};
pub use loader::{load, load_row, run_load, LoadReport, RejectedRow, RowOutcome};
pub use record::{CatalogRow, EntityRecord, Slot, EFFECTIVENESS_COLUMNS};
pub use resolver::{
    Resolution, TermIds, TermKind, TermRow,
    resolve_term, resolve_all, lookup_term, list_terms,
};
pub use source::{SourceReader, SourceRow};
pub use trait_list::{MalformedList, TraitList};
pub use vocabulary::Vocabulary;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
