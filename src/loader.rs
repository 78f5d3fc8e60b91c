// Row Normalizer/Loader - the load pipeline
//
// Stages run strictly in order: extract the vocabulary, resolve every term,
// then load rows. The whole load is one transaction; each row gets a
// savepoint so a rejected row leaves nothing behind.

use crate::config::{LoadConfig, RowErrorPolicy};
use crate::db::{
    insert_category_link, insert_effectiveness, insert_entity, insert_load_run, insert_physical,
    insert_stats, insert_trait_link, setup_database, LoadRun, Store, Table,
};
use crate::error::{LoadError, RowError, StoreError};
use crate::record::{entity_key_of, CatalogRow, Slot};
use crate::resolver::{resolve_all, TermIds, TermKind};
use crate::source::{SourceReader, SourceRow};
use crate::trait_list::TraitList;
use crate::vocabulary;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// ROW OUTCOME
// ============================================================================

/// What loading one row did to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub entity_key: i64,
    /// Tables that received a new row, once per row written
    pub inserted: Vec<Table>,
    /// Tables where the row was already there
    pub present: Vec<Table>,
    pub traits: TraitList,
}

impl RowOutcome {
    fn new(entity_key: i64) -> Self {
        RowOutcome {
            entity_key,
            inserted: Vec::new(),
            present: Vec::new(),
            traits: TraitList::Absent,
        }
    }

    fn record(&mut self, table: Table, written: bool) {
        if written {
            self.inserted.push(table);
        } else {
            self.present.push(table);
        }
    }
}

fn resolved(terms: &TermIds, kind: TermKind, name: &str) -> Result<i64, RowError> {
    terms.get(name).ok_or_else(|| RowError::UnresolvedTerm {
        kind,
        name: name.to_string(),
    })
}

/// Write one row: entity first, then its bundles, then junctions.
///
/// Every write is conflict-free on its natural key, so loading a row that is
/// already stored changes nothing. A trait cell that does not decode only
/// drops this row's trait links.
pub fn load_row(
    conn: &Connection,
    row: &CatalogRow,
    categories: &TermIds,
    traits: &TermIds,
) -> Result<RowOutcome, RowError> {
    let key = row.entity.entity_key;
    let mut outcome = RowOutcome::new(key);

    outcome.record(Table::Entity, insert_entity(conn, &row.entity)?);
    outcome.record(Table::StatBundle, insert_stats(conn, key, &row.stats)?);
    outcome.record(Table::PhysicalBundle, insert_physical(conn, key, &row.physical)?);
    outcome.record(
        Table::EffectivenessBundle,
        insert_effectiveness(conn, key, &row.effectiveness)?,
    );

    // Slots are independent: an empty slot 2 never suppresses slot 1
    for slot in Slot::ALL {
        if let Some(name) = row.category(slot) {
            let term_id = resolved(categories, TermKind::Category, name)?;
            outcome.record(
                Table::EntityCategory,
                insert_category_link(conn, key, slot, term_id)?,
            );
        }
    }

    let decoded = TraitList::from_cell(row.traits_raw.as_deref());
    for name in decoded.terms() {
        let term_id = resolved(traits, TermKind::Trait, name)?;
        outcome.record(Table::EntityTrait, insert_trait_link(conn, key, term_id)?);
    }
    if let TraitList::Malformed(err) = &decoded {
        debug!(entity_key = key, line = row.line, "No trait links: {}", err);
    }
    outcome.traits = decoded;

    Ok(outcome)
}

// ============================================================================
// LOAD REPORT
// ============================================================================

/// A row the loader refused, kept for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub line: u64,
    pub entity_key: Option<i64>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermSummary {
    pub distinct: usize,
    pub created: usize,
    pub existing: usize,
}

impl From<&TermIds> for TermSummary {
    fn from(terms: &TermIds) -> Self {
        TermSummary {
            distinct: terms.len(),
            created: terms.created,
            existing: terms.existing,
        }
    }
}

/// Summary of one load, also stored as JSON in load_run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub run_id: String,
    pub rows_read: u64,
    pub rows_loaded: u64,
    pub inserted: BTreeMap<Table, u64>,
    pub already_present: BTreeMap<Table, u64>,
    pub malformed_trait_lines: Vec<u64>,
    pub rejected: Vec<RejectedRow>,
    pub categories: TermSummary,
    pub traits: TermSummary,
    pub elapsed_ms: u64,
}

impl LoadReport {
    fn absorb(&mut self, outcome: &RowOutcome) {
        self.rows_loaded += 1;
        for table in &outcome.inserted {
            *self.inserted.entry(*table).or_default() += 1;
        }
        for table in &outcome.present {
            *self.already_present.entry(*table).or_default() += 1;
        }
    }

    pub fn inserted_into(&self, table: Table) -> u64 {
        self.inserted.get(&table).copied().unwrap_or(0)
    }

    pub fn present_in(&self, table: Table) -> u64 {
        self.already_present.get(&table).copied().unwrap_or(0)
    }

    /// True when the run added nothing to the catalog tables.
    pub fn is_noop(&self) -> bool {
        self.inserted.values().all(|n| *n == 0)
            && self.categories.created == 0
            && self.traits.created == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Rows: {} read, {} loaded, {} rejected | Entities: {} new, {} present | \
             Categories: {} ({} new) | Traits: {} ({} new) | Malformed trait cells: {}",
            self.rows_read,
            self.rows_loaded,
            self.rejected.len(),
            self.inserted_into(Table::Entity),
            self.present_in(Table::Entity),
            self.categories.distinct,
            self.categories.created,
            self.traits.distinct,
            self.traits.created,
            self.malformed_trait_lines.len(),
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Load every source row inside `tx`, one savepoint per row.
pub fn load_rows<I>(
    tx: &mut rusqlite::Transaction<'_>,
    rows: I,
    categories: &TermIds,
    traits: &TermIds,
    policy: RowErrorPolicy,
    report: &mut LoadReport,
) -> Result<(), LoadError>
where
    I: IntoIterator<Item = Result<SourceRow, crate::error::SourceError>>,
{
    for source_row in rows {
        let source_row = source_row?;
        report.rows_read += 1;

        let result = CatalogRow::from_source(&source_row).and_then(|row| {
            let savepoint = tx.savepoint().map_err(StoreError::from)?;
            let outcome = load_row(&savepoint, &row, categories, traits)?;
            savepoint.commit().map_err(StoreError::from)?;
            Ok(outcome)
        });
        // an Err above drops the savepoint, rolling the row back

        match result {
            Ok(outcome) => {
                debug!(
                    entity_key = outcome.entity_key,
                    inserted = outcome.inserted.len(),
                    present = outcome.present.len(),
                    "Row loaded"
                );
                report.absorb(&outcome);
            }
            Err(err) => {
                let line = source_row.line();
                let entity_key = entity_key_of(&source_row);

                if policy == RowErrorPolicy::Abort || !err.is_row_local() {
                    return Err(LoadError::Row {
                        line,
                        entity_key,
                        source: err,
                    });
                }

                warn!(line, ?entity_key, "Skipping rejected row: {}", err);
                report.rejected.push(RejectedRow {
                    line,
                    entity_key,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Run the full pipeline against an open store.
///
/// Nothing is committed unless every stage succeeds; on error the
/// transaction is dropped and rolls back.
pub fn load(store: &mut Store, source: &SourceReader, policy: RowErrorPolicy) -> Result<LoadReport, LoadError> {
    let started_at = Utc::now();
    let timer = Instant::now();
    let mut report = LoadReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        ..Default::default()
    };

    info!(source = %source.describe(), store = store.location(), "Starting load");
    let fingerprint = source.fingerprint()?;

    setup_database(store.conn())?;
    let mut tx = store.transaction()?;

    // Stage 1: the complete vocabulary, before any id exists
    let vocabulary = vocabulary::extract(source.rows()?)?;
    report.malformed_trait_lines = vocabulary.malformed_trait_lines.clone();

    // Stage 2: a total mapping for both vocabularies
    let categories = resolve_all(&tx, TermKind::Category, &vocabulary.categories)?;
    let traits = resolve_all(&tx, TermKind::Trait, &vocabulary.traits)?;
    report.categories = TermSummary::from(&categories);
    report.traits = TermSummary::from(&traits);

    // Stage 3: rows, on a fresh pass over the source
    load_rows(&mut tx, source.rows()?, &categories, &traits, policy, &mut report)?;

    report.elapsed_ms = timer.elapsed().as_millis() as u64;
    let run = LoadRun {
        run_id: report.run_id.clone(),
        started_at,
        finished_at: Utc::now(),
        source_path: source.describe(),
        source_sha256: fingerprint,
        report: serde_json::to_value(&report)
            .map_err(|e| StoreError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?,
    };
    insert_load_run(&tx, &run)?;

    tx.commit()?;
    info!(run_id = %report.run_id, elapsed_ms = report.elapsed_ms, "{}", report.summary());
    Ok(report)
}

/// Open the configured store, load the configured source, release the store.
pub fn run_load(config: &LoadConfig) -> Result<LoadReport, LoadError> {
    let source = SourceReader::from_path(&config.source);
    let mut store = Store::open(&config.database)?;
    let report = load(&mut store, &source, config.on_row_error)?;
    store.close()?;
    Ok(report)
}
