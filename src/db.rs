use crate::error::StoreError;
use crate::record::{
    EffectivenessBundle, EntityRecord, PhysicalBundle, Slot, StatBundle, EFFECTIVENESS_COLUMNS,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// STORE
// ============================================================================

/// Owned connection to the catalog store.
///
/// Acquired once per load and released when dropped, on every exit path. An
/// uncommitted transaction taken from it rolls back on drop.
pub struct Store {
    conn: Connection,
    location: String,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let conn = Connection::open(path).map_err(|source| StoreError::Connectivity {
            path: location.clone(),
            source,
        })?;
        Self::configure(conn, location)
    }

    /// Open an existing store for reading only.
    ///
    /// No pragma is issued and nothing is created; a missing file is a
    /// connectivity error.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let location = path.display().to_string();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags).map_err(|source| StoreError::Connectivity {
            path: location.clone(),
            source,
        })?;
        Ok(Store { conn, location })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = ":memory:".to_string();
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Connectivity {
            path: location.clone(),
            source,
        })?;
        Self::configure(conn, location)
    }

    fn configure(conn: Connection, location: String) -> Result<Self, StoreError> {
        // First statement touching the file; failures here mean it is unusable
        let connectivity = |source| StoreError::Connectivity {
            path: location.clone(),
            source,
        };
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(connectivity)?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(connectivity)?;
        Ok(Store { conn, location })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin the transaction a whole load runs in.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, StoreError> {
        Ok(self.conn.transaction()?)
    }

    /// Close explicitly so a failing close is reported instead of ignored.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS entity (
    entity_key INTEGER PRIMARY KEY,
    name TEXT,
    localized_name TEXT,
    classification TEXT,
    generation INTEGER,
    is_special INTEGER
);

CREATE TABLE IF NOT EXISTS stat_bundle (
    entity_key INTEGER PRIMARY KEY REFERENCES entity(entity_key) ON DELETE CASCADE,
    hp INTEGER,
    attack INTEGER,
    defense INTEGER,
    sp_attack INTEGER,
    sp_defense INTEGER,
    speed INTEGER,
    base_total INTEGER
);

CREATE TABLE IF NOT EXISTS physical_bundle (
    entity_key INTEGER PRIMARY KEY REFERENCES entity(entity_key) ON DELETE CASCADE,
    height_m REAL,
    weight_kg REAL,
    capture_rate TEXT,
    base_egg_steps INTEGER,
    base_happiness INTEGER,
    percentage_male REAL
);

CREATE TABLE IF NOT EXISTS effectiveness_bundle (
    entity_key INTEGER PRIMARY KEY REFERENCES entity(entity_key) ON DELETE CASCADE,
    against_bug REAL,
    against_dark REAL,
    against_dragon REAL,
    against_electric REAL,
    against_fairy REAL,
    against_fight REAL,
    against_fire REAL,
    against_flying REAL,
    against_ghost REAL,
    against_grass REAL,
    against_ground REAL,
    against_ice REAL,
    against_normal REAL,
    against_poison REAL,
    against_psychic REAL,
    against_rock REAL,
    against_steel REAL,
    against_water REAL
);

CREATE TABLE IF NOT EXISTS category_term (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS entity_category (
    entity_key INTEGER NOT NULL REFERENCES entity(entity_key) ON DELETE CASCADE,
    slot INTEGER NOT NULL CHECK (slot IN (1, 2)),
    category_term_id INTEGER NOT NULL REFERENCES category_term(id) ON DELETE CASCADE,
    PRIMARY KEY (entity_key, slot)
);

CREATE TABLE IF NOT EXISTS trait_term (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS entity_trait (
    entity_key INTEGER NOT NULL REFERENCES entity(entity_key) ON DELETE CASCADE,
    trait_term_id INTEGER NOT NULL REFERENCES trait_term(id) ON DELETE CASCADE,
    PRIMARY KEY (entity_key, trait_term_id)
);

CREATE TABLE IF NOT EXISTS load_run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT UNIQUE NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    source_path TEXT NOT NULL,
    source_sha256 TEXT NOT NULL,
    report TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entity_category_term ON entity_category(category_term_id);
CREATE INDEX IF NOT EXISTS idx_entity_trait_term ON entity_trait(trait_term_id);
CREATE INDEX IF NOT EXISTS idx_load_run_started ON load_run(started_at);
";

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// ============================================================================
// TABLES
// ============================================================================

/// Catalog tables the loader writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Entity,
    StatBundle,
    PhysicalBundle,
    EffectivenessBundle,
    CategoryTerm,
    EntityCategory,
    TraitTerm,
    EntityTrait,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Entity,
        Table::StatBundle,
        Table::PhysicalBundle,
        Table::EffectivenessBundle,
        Table::CategoryTerm,
        Table::EntityCategory,
        Table::TraitTerm,
        Table::EntityTrait,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Entity => "entity",
            Table::StatBundle => "stat_bundle",
            Table::PhysicalBundle => "physical_bundle",
            Table::EffectivenessBundle => "effectiveness_bundle",
            Table::CategoryTerm => "category_term",
            Table::EntityCategory => "entity_category",
            Table::TraitTerm => "trait_term",
            Table::EntityTrait => "entity_trait",
        }
    }

    fn count_sql(self) -> &'static str {
        match self {
            Table::Entity => "SELECT COUNT(*) FROM entity",
            Table::StatBundle => "SELECT COUNT(*) FROM stat_bundle",
            Table::PhysicalBundle => "SELECT COUNT(*) FROM physical_bundle",
            Table::EffectivenessBundle => "SELECT COUNT(*) FROM effectiveness_bundle",
            Table::CategoryTerm => "SELECT COUNT(*) FROM category_term",
            Table::EntityCategory => "SELECT COUNT(*) FROM entity_category",
            Table::TraitTerm => "SELECT COUNT(*) FROM trait_term",
            Table::EntityTrait => "SELECT COUNT(*) FROM entity_trait",
        }
    }
}

pub fn count(conn: &Connection, table: Table) -> Result<i64, StoreError> {
    Ok(conn.query_row(table.count_sql(), [], |row| row.get(0))?)
}

/// Row counts for every catalog table, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts(pub BTreeMap<String, i64>);

impl TableCounts {
    pub fn get(&self, table: Table) -> i64 {
        self.0.get(table.name()).copied().unwrap_or(0)
    }
}

pub fn table_counts(conn: &Connection) -> Result<TableCounts, StoreError> {
    let mut counts = BTreeMap::new();
    for table in Table::ALL {
        counts.insert(table.name().to_string(), count(conn, table)?);
    }
    Ok(TableCounts(counts))
}

// ============================================================================
// CONFLICT-FREE WRITES
// Each returns true when a row was written, false when the key already existed.
// ============================================================================

const INSERT_ENTITY_SQL: &str = "INSERT INTO entity (
        entity_key, name, localized_name, classification, generation, is_special
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(entity_key) DO NOTHING";

const INSERT_STATS_SQL: &str = "INSERT INTO stat_bundle (
        entity_key, hp, attack, defense, sp_attack, sp_defense, speed, base_total
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(entity_key) DO NOTHING";

const INSERT_PHYSICAL_SQL: &str = "INSERT INTO physical_bundle (
        entity_key, height_m, weight_kg, capture_rate, base_egg_steps, base_happiness, percentage_male
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(entity_key) DO NOTHING";

/// Column order matches `EFFECTIVENESS_COLUMNS`.
const INSERT_EFFECTIVENESS_SQL: &str = "INSERT INTO effectiveness_bundle (
        entity_key,
        against_bug, against_dark, against_dragon, against_electric, against_fairy, against_fight,
        against_fire, against_flying, against_ghost, against_grass, against_ground, against_ice,
        against_normal, against_poison, against_psychic, against_rock, against_steel, against_water
    ) VALUES (
        ?1,
        ?2, ?3, ?4, ?5, ?6, ?7,
        ?8, ?9, ?10, ?11, ?12, ?13,
        ?14, ?15, ?16, ?17, ?18, ?19
    )
    ON CONFLICT(entity_key) DO NOTHING";

const INSERT_CATEGORY_LINK_SQL: &str = "INSERT INTO entity_category (entity_key, slot, category_term_id)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(entity_key, slot) DO NOTHING";

const INSERT_TRAIT_LINK_SQL: &str = "INSERT INTO entity_trait (entity_key, trait_term_id)
    VALUES (?1, ?2)
    ON CONFLICT(entity_key, trait_term_id) DO NOTHING";

fn write(conn: &Connection, table: Table, sql: &str, params: &[&dyn ToSql]) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt
        .execute(params)
        .map_err(|err| StoreError::from_write(table.name(), err))?;
    Ok(changed > 0)
}

pub fn insert_entity(conn: &Connection, entity: &EntityRecord) -> Result<bool, StoreError> {
    write(
        conn,
        Table::Entity,
        INSERT_ENTITY_SQL,
        params![
            entity.entity_key,
            entity.name,
            entity.localized_name,
            entity.classification,
            entity.generation,
            entity.is_special,
        ],
    )
}

pub fn insert_stats(conn: &Connection, entity_key: i64, stats: &StatBundle) -> Result<bool, StoreError> {
    write(
        conn,
        Table::StatBundle,
        INSERT_STATS_SQL,
        params![
            entity_key,
            stats.hp,
            stats.attack,
            stats.defense,
            stats.sp_attack,
            stats.sp_defense,
            stats.speed,
            stats.base_total,
        ],
    )
}

pub fn insert_physical(
    conn: &Connection,
    entity_key: i64,
    physical: &PhysicalBundle,
) -> Result<bool, StoreError> {
    write(
        conn,
        Table::PhysicalBundle,
        INSERT_PHYSICAL_SQL,
        params![
            entity_key,
            physical.height_m,
            physical.weight_kg,
            physical.capture_rate,
            physical.base_egg_steps,
            physical.base_happiness,
            physical.percentage_male,
        ],
    )
}

pub fn insert_effectiveness(
    conn: &Connection,
    entity_key: i64,
    bundle: &EffectivenessBundle,
) -> Result<bool, StoreError> {
    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(bundle.multipliers.len() + 1);
    values.push(&entity_key);
    values.extend(bundle.multipliers.iter().map(|m| m as &dyn ToSql));
    write(conn, Table::EffectivenessBundle, INSERT_EFFECTIVENESS_SQL, &values)
}

pub fn insert_category_link(
    conn: &Connection,
    entity_key: i64,
    slot: Slot,
    category_term_id: i64,
) -> Result<bool, StoreError> {
    write(
        conn,
        Table::EntityCategory,
        INSERT_CATEGORY_LINK_SQL,
        params![entity_key, slot.number(), category_term_id],
    )
}

pub fn insert_trait_link(conn: &Connection, entity_key: i64, trait_term_id: i64) -> Result<bool, StoreError> {
    write(
        conn,
        Table::EntityTrait,
        INSERT_TRAIT_LINK_SQL,
        params![entity_key, trait_term_id],
    )
}

// ============================================================================
// READ-ONLY LOOKUPS
// ============================================================================

/// Category attached to an entity in a given slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLink {
    pub slot: i64,
    pub term_id: i64,
    pub name: String,
}

/// Trait attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitLink {
    pub term_id: i64,
    pub name: String,
}

/// An entity joined back together from the normalized tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
    pub entity: EntityRecord,
    pub stats: Option<StatBundle>,
    pub physical: Option<PhysicalBundle>,
    /// Keyed by store column name
    pub effectiveness: Option<BTreeMap<String, Option<f64>>>,
    pub categories: Vec<CategoryLink>,
    pub traits: Vec<TraitLink>,
}

const SELECT_EFFECTIVENESS_SQL: &str = "SELECT
        against_bug, against_dark, against_dragon, against_electric, against_fairy, against_fight,
        against_fire, against_flying, against_ghost, against_grass, against_ground, against_ice,
        against_normal, against_poison, against_psychic, against_rock, against_steel, against_water
    FROM effectiveness_bundle WHERE entity_key = ?1";

pub fn get_entity_view(conn: &Connection, entity_key: i64) -> Result<Option<EntityView>, StoreError> {
    let entity = conn
        .query_row(
            "SELECT entity_key, name, localized_name, classification, generation, is_special
             FROM entity WHERE entity_key = ?1",
            [entity_key],
            |row| {
                Ok(EntityRecord {
                    entity_key: row.get(0)?,
                    name: row.get(1)?,
                    localized_name: row.get(2)?,
                    classification: row.get(3)?,
                    generation: row.get(4)?,
                    is_special: row.get(5)?,
                })
            },
        )
        .optional()?;

    let Some(entity) = entity else {
        return Ok(None);
    };

    let stats = conn
        .query_row(
            "SELECT hp, attack, defense, sp_attack, sp_defense, speed, base_total
             FROM stat_bundle WHERE entity_key = ?1",
            [entity_key],
            |row| {
                Ok(StatBundle {
                    hp: row.get(0)?,
                    attack: row.get(1)?,
                    defense: row.get(2)?,
                    sp_attack: row.get(3)?,
                    sp_defense: row.get(4)?,
                    speed: row.get(5)?,
                    base_total: row.get(6)?,
                })
            },
        )
        .optional()?;

    let physical = conn
        .query_row(
            "SELECT height_m, weight_kg, capture_rate, base_egg_steps, base_happiness, percentage_male
             FROM physical_bundle WHERE entity_key = ?1",
            [entity_key],
            |row| {
                Ok(PhysicalBundle {
                    height_m: row.get(0)?,
                    weight_kg: row.get(1)?,
                    capture_rate: row.get(2)?,
                    base_egg_steps: row.get(3)?,
                    base_happiness: row.get(4)?,
                    percentage_male: row.get(5)?,
                })
            },
        )
        .optional()?;

    let effectiveness = conn
        .query_row(SELECT_EFFECTIVENESS_SQL, [entity_key], |row| {
            let mut values = BTreeMap::new();
            for (i, column) in EFFECTIVENESS_COLUMNS.iter().enumerate() {
                values.insert(column.to_string(), row.get::<_, Option<f64>>(i)?);
            }
            Ok(values)
        })
        .optional()?;

    let mut stmt = conn.prepare(
        "SELECT ec.slot, ct.id, ct.name
         FROM entity_category ec
         JOIN category_term ct ON ct.id = ec.category_term_id
         WHERE ec.entity_key = ?1
         ORDER BY ec.slot",
    )?;
    let categories = stmt
        .query_map([entity_key], |row| {
            Ok(CategoryLink {
                slot: row.get(0)?,
                term_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT tt.id, tt.name
         FROM entity_trait et
         JOIN trait_term tt ON tt.id = et.trait_term_id
         WHERE et.entity_key = ?1
         ORDER BY tt.name",
    )?;
    let traits = stmt
        .query_map([entity_key], |row| {
            Ok(TraitLink {
                term_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(EntityView {
        entity,
        stats,
        physical,
        effectiveness,
        categories,
        traits,
    }))
}

// ============================================================================
// LOAD RUN AUDIT LOG
// ============================================================================

/// One completed load, as recorded in load_run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_path: String,
    pub source_sha256: String,
    pub report: serde_json::Value,
}

pub fn insert_load_run(conn: &Connection, run: &LoadRun) -> Result<(), StoreError> {
    let report_json = serde_json::to_string(&run.report).map_err(|e| StoreError::Sqlite(
        rusqlite::Error::ToSqlConversionFailure(Box::new(e)),
    ))?;

    conn.execute(
        "INSERT INTO load_run (
            run_id, started_at, finished_at, source_path, source_sha256, report
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id,
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
            run.source_path,
            run.source_sha256,
            report_json,
        ],
    )?;

    Ok(())
}

/// Recorded runs, newest first.
pub fn get_load_runs(conn: &Connection) -> Result<Vec<LoadRun>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, source_path, source_sha256, report
         FROM load_run
         ORDER BY id DESC",
    )?;

    let runs = stmt
        .query_map([], |row| {
            let started: String = row.get(1)?;
            let finished: String = row.get(2)?;
            let report: String = row.get(5)?;

            Ok(LoadRun {
                run_id: row.get(0)?,
                started_at: parse_timestamp(1, &started)?,
                finished_at: parse_timestamp(2, &finished)?,
                source_path: row.get(3)?,
                source_sha256: row.get(4)?,
                report: serde_json::from_str(&report).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        setup_database(store.conn()).unwrap();
        store
    }

    fn entity(key: i64, name: &str) -> EntityRecord {
        EntityRecord {
            entity_key: key,
            name: Some(name.to_string()),
            localized_name: None,
            classification: Some("Seed Pokémon".to_string()),
            generation: Some(1),
            is_special: Some(false),
        }
    }

    fn add_category(conn: &Connection, name: &str) -> i64 {
        conn.execute("INSERT INTO category_term (name) VALUES (?1)", [name]).unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_setup_is_repeatable() {
        let store = store();
        setup_database(store.conn()).unwrap();
        let counts = table_counts(store.conn()).unwrap();
        assert_eq!(counts.0.len(), Table::ALL.len());
        assert!(counts.0.values().all(|&n| n == 0));
    }

    #[test]
    fn test_entity_insert_is_conflict_free() {
        let store = store();
        let conn = store.conn();

        assert!(insert_entity(conn, &entity(1, "Bulbasaur")).unwrap());
        // Same key again never overwrites
        assert!(!insert_entity(conn, &entity(1, "Renamed")).unwrap());

        let view = get_entity_view(conn, 1).unwrap().unwrap();
        assert_eq!(view.entity.name.as_deref(), Some("Bulbasaur"));
        assert_eq!(count(conn, Table::Entity).unwrap(), 1);
    }

    #[test]
    fn test_bundles_are_one_per_entity() {
        let store = store();
        let conn = store.conn();
        insert_entity(conn, &entity(1, "Bulbasaur")).unwrap();

        let stats = StatBundle {
            hp: Some(45),
            base_total: Some(318),
            ..Default::default()
        };
        let mut effect = EffectivenessBundle::default();
        effect.multipliers[6] = Some(2.0);

        assert!(insert_stats(conn, 1, &stats).unwrap());
        assert!(!insert_stats(conn, 1, &stats).unwrap());
        assert!(insert_physical(conn, 1, &PhysicalBundle::default()).unwrap());
        assert!(!insert_physical(conn, 1, &PhysicalBundle::default()).unwrap());
        assert!(insert_effectiveness(conn, 1, &effect).unwrap());
        assert!(!insert_effectiveness(conn, 1, &effect).unwrap());

        let view = get_entity_view(conn, 1).unwrap().unwrap();
        assert_eq!(view.stats.unwrap().hp, Some(45));
        let effectiveness = view.effectiveness.unwrap();
        assert_eq!(effectiveness["against_fire"], Some(2.0));
        assert_eq!(effectiveness["against_bug"], None);
    }

    #[test]
    fn test_bundle_without_entity_violates_foreign_key() {
        let store = store();
        let err = insert_stats(store.conn(), 99, &StatBundle::default()).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { table: "stat_bundle", .. }));
    }

    #[test]
    fn test_category_links_by_slot() {
        let store = store();
        let conn = store.conn();
        insert_entity(conn, &entity(1, "Bulbasaur")).unwrap();
        let grass = add_category(conn, "Grass");
        let poison = add_category(conn, "Poison");

        assert!(insert_category_link(conn, 1, Slot::Primary, grass).unwrap());
        assert!(insert_category_link(conn, 1, Slot::Secondary, poison).unwrap());
        assert!(!insert_category_link(conn, 1, Slot::Primary, poison).unwrap());

        let view = get_entity_view(conn, 1).unwrap().unwrap();
        let slots: Vec<(i64, &str)> = view
            .categories
            .iter()
            .map(|c| (c.slot, c.name.as_str()))
            .collect();
        assert_eq!(slots, vec![(1, "Grass"), (2, "Poison")]);
    }

    #[test]
    fn test_slot_outside_domain_is_rejected_by_schema() {
        let store = store();
        let conn = store.conn();
        insert_entity(conn, &entity(1, "Bulbasaur")).unwrap();
        let grass = add_category(conn, "Grass");

        let err = conn
            .execute(
                "INSERT INTO entity_category (entity_key, slot, category_term_id) VALUES (1, 3, ?1)",
                [grass],
            )
            .unwrap_err();
        assert!(StoreError::from_write("entity_category", err).is_row_local());
    }

    #[test]
    fn test_trait_link_requires_resolved_term() {
        let store = store();
        let conn = store.conn();
        insert_entity(conn, &entity(1, "Bulbasaur")).unwrap();

        let err = insert_trait_link(conn, 1, 12345).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { table: "entity_trait", .. }));
    }

    #[test]
    fn test_missing_entity_view_is_none() {
        let store = store();
        assert!(get_entity_view(store.conn(), 404).unwrap().is_none());
    }

    #[test]
    fn test_effectiveness_sql_matches_descriptor() {
        let open = INSERT_EFFECTIVENESS_SQL.find('(').unwrap();
        let close = INSERT_EFFECTIVENESS_SQL.find(')').unwrap();
        let columns: Vec<&str> = INSERT_EFFECTIVENESS_SQL[open + 1..close]
            .split(',')
            .map(str::trim)
            .collect();

        let mut expected = vec!["entity_key"];
        expected.extend(EFFECTIVENESS_COLUMNS.iter().copied());
        assert_eq!(columns, expected);

        let selected: Vec<&str> = SELECT_EFFECTIVENESS_SQL["SELECT".len()..SELECT_EFFECTIVENESS_SQL.find("FROM").unwrap()]
            .split(',')
            .map(str::trim)
            .collect();
        assert_eq!(selected, &expected[1..]);

        for column in EFFECTIVENESS_COLUMNS.iter() {
            assert!(SCHEMA_SQL.contains(&format!("{} REAL", column)));
        }
    }

    #[test]
    fn test_load_run_log() {
        let store = store();
        let conn = store.conn();
        let now = Utc::now();

        let run = LoadRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: now,
            source_path: "pokemon.csv".to_string(),
            source_sha256: "ab".repeat(32),
            report: serde_json::json!({"rows_read": 2}),
        };
        insert_load_run(conn, &run).unwrap();

        let runs = get_load_runs(conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run.run_id);
        assert_eq!(runs[0].report["rows_read"], 2);
    }

    #[test]
    fn test_unreachable_path_is_connectivity_error() {
        let result = Store::open(Path::new("/nonexistent-dir/for/sure/dex.db"));
        assert!(matches!(result, Err(StoreError::Connectivity { .. })));
    }
}
