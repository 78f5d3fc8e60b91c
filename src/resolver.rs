// Reference Resolver - idempotent get-or-create for vocabulary terms
//
// A name that already exists is the steady state on every reload, so it comes
// back as Resolution::Existing rather than as an error to catch.

use crate::error::StoreError;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

/// The two disjoint vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Category,
    Trait,
}

impl TermKind {
    pub fn table(self) -> &'static str {
        match self {
            TermKind::Category => "category_term",
            TermKind::Trait => "trait_term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category" => Some(TermKind::Category),
            "trait" => Some(TermKind::Trait),
            _ => None,
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            TermKind::Category => {
                "INSERT INTO category_term (name) VALUES (?1) ON CONFLICT(name) DO NOTHING RETURNING id"
            }
            TermKind::Trait => {
                "INSERT INTO trait_term (name) VALUES (?1) ON CONFLICT(name) DO NOTHING RETURNING id"
            }
        }
    }

    fn select_sql(self) -> &'static str {
        match self {
            TermKind::Category => "SELECT id FROM category_term WHERE name = ?1",
            TermKind::Trait => "SELECT id FROM trait_term WHERE name = ?1",
        }
    }

    fn list_sql(self) -> &'static str {
        match self {
            TermKind::Category => "SELECT id, name FROM category_term ORDER BY id",
            TermKind::Trait => "SELECT id, name FROM trait_term ORDER BY id",
        }
    }
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermKind::Category => f.write_str("category"),
            TermKind::Trait => f.write_str("trait"),
        }
    }
}

/// Result of a get-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This call inserted the term.
    Created(i64),
    /// The term was already present.
    Existing(i64),
}

impl Resolution {
    pub fn id(self) -> i64 {
        match self {
            Resolution::Created(id) | Resolution::Existing(id) => id,
        }
    }

    pub fn was_created(self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

/// Insert `name` unless present; either way return its id.
pub fn resolve_term(conn: &Connection, kind: TermKind, name: &str) -> Result<Resolution, StoreError> {
    let inserted: Option<i64> = conn
        .prepare_cached(kind.insert_sql())?
        .query_row([name], |row| row.get(0))
        .optional()
        .map_err(|err| StoreError::from_write(kind.table(), err))?;

    if let Some(id) = inserted {
        debug!(%kind, name, id, "Created term");
        return Ok(Resolution::Created(id));
    }

    let id: i64 = conn
        .prepare_cached(kind.select_sql())?
        .query_row([name], |row| row.get(0))?;
    Ok(Resolution::Existing(id))
}

/// Complete name → id mapping for one vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermIds {
    ids: HashMap<String, i64>,
    pub created: usize,
    pub existing: usize,
}

impl TermIds {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

/// Resolve every term in `names`. The mapping covers the whole input set.
pub fn resolve_all(
    conn: &Connection,
    kind: TermKind,
    names: &BTreeSet<String>,
) -> Result<TermIds, StoreError> {
    let mut terms = TermIds {
        ids: HashMap::with_capacity(names.len()),
        created: 0,
        existing: 0,
    };

    for name in names {
        let resolution = resolve_term(conn, kind, name)?;
        if resolution.was_created() {
            terms.created += 1;
        } else {
            terms.existing += 1;
        }
        terms.ids.insert(name.clone(), resolution.id());
    }

    info!(
        %kind,
        total = terms.len(),
        created = terms.created,
        existing = terms.existing,
        "Resolved vocabulary"
    );
    Ok(terms)
}

/// Id of a term without creating it
pub fn lookup_term(conn: &Connection, kind: TermKind, name: &str) -> Result<Option<i64>, StoreError> {
    Ok(conn
        .prepare_cached(kind.select_sql())?
        .query_row([name], |row| row.get(0))
        .optional()?)
}

/// Term row as exposed to readers of the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRow {
    pub id: i64,
    pub name: String,
}

pub fn list_terms(conn: &Connection, kind: TermKind) -> Result<Vec<TermRow>, StoreError> {
    let mut stmt = conn.prepare(kind.list_sql())?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TermRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
