// Vocabulary Extractor - first pass over the source
//
// Both term sets must be complete before any id is resolved: junction rows
// are written in a single pass and need every id up front.

use crate::error::SourceError;
use crate::record::{Slot, TRAIT_COLUMN};
use crate::source::SourceRow;
use crate::trait_list::TraitList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Distinct category and trait names used anywhere in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub categories: BTreeSet<String>,
    pub traits: BTreeSet<String>,
    pub rows_scanned: u64,
    /// Source lines whose trait cell did not decode
    pub malformed_trait_lines: Vec<u64>,
}

impl Vocabulary {
    /// Fold one row into the vocabulary.
    pub fn observe(&mut self, row: &SourceRow) {
        self.rows_scanned += 1;

        // Misaligned cells; the row is rejected when loaded
        if row.overflow().is_some() {
            debug!(line = row.line(), "Row wider than header, not scanned for terms");
            return;
        }

        for slot in Slot::ALL {
            if let Some(name) = row.get(slot.source_column()) {
                self.categories.insert(name.to_string());
            }
        }

        match TraitList::from_cell(row.get(TRAIT_COLUMN)) {
            TraitList::Terms(terms) => self.traits.extend(terms),
            TraitList::Absent => {}
            TraitList::Malformed(err) => {
                warn!(line = row.line(), "Ignoring trait cell: {}", err);
                self.malformed_trait_lines.push(row.line());
            }
        }
    }
}

/// Scan every row once and return the finished vocabulary.
///
/// A source error on any row aborts extraction: a partial vocabulary would
/// leave later junction writes with unresolved names.
pub fn extract<I>(rows: I) -> Result<Vocabulary, SourceError>
where
    I: IntoIterator<Item = Result<SourceRow, SourceError>>,
{
    let mut vocabulary = Vocabulary::default();
    for row in rows {
        vocabulary.observe(&row?);
    }

    info!(
        rows = vocabulary.rows_scanned,
        categories = vocabulary.categories.len(),
        traits = vocabulary.traits.len(),
        malformed = vocabulary.malformed_trait_lines.len(),
        "Vocabulary extracted"
    );
    debug!(categories = ?vocabulary.categories, "Category vocabulary");

    Ok(vocabulary)
}
