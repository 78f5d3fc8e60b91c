//! End-to-end tests for the catalog load pipeline.
//!
//! Each test writes a small catalog CSV into its own TempDir, runs the
//! pipeline through `run_load` against an on-disk SQLite file, and checks the
//! normalized tables with plain SQL, the way a downstream reader would see them.

use dex_normalizer::{
    get_load_runs, run_load, table_counts, LoadConfig, LoadError, RowErrorPolicy, Store,
    StoreError, Table,
};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "abilities,against_bug,against_dark,against_dragon,against_electric,\
against_fairy,against_fight,against_fire,against_flying,against_ghost,against_grass,against_ground,\
against_ice,against_normal,against_poison,against_psychic,against_rock,against_steel,against_water,\
attack,base_egg_steps,base_happiness,base_total,capture_rate,classfication,defense,height_m,hp,\
japanese_name,name,percentage_male,pokedex_number,sp_attack,sp_defense,speed,type1,type2,weight_kg,\
generation,is_legendary";

/// One catalog row; blank `type2` and a free-form `abilities` cell are allowed.
fn line(key: i64, name: &str, type1: &str, type2: &str, abilities: &str) -> String {
    format!(
        "\"{abilities}\",1,1,1,0.5,0.5,0.5,2,2,1,0.25,1,2,1,1,2,1,1,0.5,\
49,5120,70,318,45,Seed Pokémon,49,0.7,45,Jp{key},{name},88.1,{key},65,65,45,{type1},{type2},6.9,1,0"
    )
}

fn write_csv(dir: &TempDir, lines: &[String]) -> PathBuf {
    let path = dir.path().join("pokemon.csv");
    let mut body = String::from(HEADER);
    body.push('\n');
    for l in lines {
        body.push_str(l);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

fn scenario_rows() -> Vec<String> {
    vec![
        line(1, "Bulbasaur", "Grass", "Poison", "['Overgrow', 'Chlorophyll']"),
        line(2, "Charmander", "Fire", "", "not-a-list"),
        line(3, "Squirtle", "Water", "", "['Torrent', 'Rain Dish']"),
        line(4, "Ivysaur", "Grass", "Poison", "['Overgrow', 'Chlorophyll']"),
    ]
}

fn config(dir: &TempDir, csv: &Path) -> LoadConfig {
    LoadConfig::new(csv, dir.path().join("dex.db"))
}

fn scalar(conn: &Connection, sql: &str, key: i64) -> i64 {
    conn.query_row(sql, [key], |row| row.get(0)).unwrap()
}

#[test]
fn test_full_load_scenarios() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, &scenario_rows());
    let config = config(&dir, &csv);

    let report = run_load(&config).unwrap();
    assert_eq!(report.rows_read, 4);
    assert_eq!(report.rows_loaded, 4);
    assert!(report.rejected.is_empty());
    assert_eq!(report.malformed_trait_lines, vec![3]);

    let conn = Connection::open(&config.database).unwrap();

    // Scenario A: dual-slot row with two traits
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity WHERE entity_key = ?1", 1), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM stat_bundle WHERE entity_key = ?1", 1), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM physical_bundle WHERE entity_key = ?1", 1), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM effectiveness_bundle WHERE entity_key = ?1", 1), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity_category WHERE entity_key = ?1", 1), 2);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity_trait WHERE entity_key = ?1", 1), 2);

    let slot_names: Vec<(i64, String)> = conn
        .prepare(
            "SELECT ec.slot, ct.name FROM entity_category ec
             JOIN category_term ct ON ct.id = ec.category_term_id
             WHERE ec.entity_key = 1 ORDER BY ec.slot",
        )
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(slot_names, vec![(1, "Grass".to_string()), (2, "Poison".to_string())]);

    // Scenario B: single slot, malformed traits, bundles still complete
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity WHERE entity_key = ?1", 2), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM stat_bundle WHERE entity_key = ?1", 2), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM physical_bundle WHERE entity_key = ?1", 2), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM effectiveness_bundle WHERE entity_key = ?1", 2), 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity_category WHERE entity_key = ?1", 2), 1);
    assert_eq!(
        scalar(&conn, "SELECT COUNT(*) FROM entity_category WHERE entity_key = ?1 AND slot = 2", 2),
        0
    );
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity_trait WHERE entity_key = ?1", 2), 0);

    // Distinct category values: Grass, Poison, Fire, Water
    let counts = table_counts(&conn).unwrap();
    assert_eq!(counts.get(Table::CategoryTerm), 4);
    // Distinct traits: Overgrow, Chlorophyll, Torrent, Rain Dish
    assert_eq!(counts.get(Table::TraitTerm), 4);
}

#[test]
fn test_reload_identical_source_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, &scenario_rows());
    let config = config(&dir, &csv);

    run_load(&config).unwrap();
    let first = {
        let store = Store::open(&config.database).unwrap();
        table_counts(store.conn()).unwrap()
    };

    // Scenario C: the second run is a no-op and raises nothing
    let report = run_load(&config).unwrap();
    let second = {
        let store = Store::open(&config.database).unwrap();
        table_counts(store.conn()).unwrap()
    };

    assert_eq!(first, second);
    assert!(report.is_noop());
    assert_eq!(report.present_in(Table::Entity), 4);
    assert_eq!(report.present_in(Table::EntityCategory), 6);

    let store = Store::open(&config.database).unwrap();
    let runs = get_load_runs(store.conn()).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].source_sha256, runs[1].source_sha256);
}

#[test]
fn test_growing_source_only_adds_new_rows() {
    let dir = TempDir::new().unwrap();
    let mut rows = scenario_rows();
    let csv = write_csv(&dir, &rows);
    let config = config(&dir, &csv);
    run_load(&config).unwrap();

    let term_ids_before: Vec<(i64, String)> = {
        let conn = Connection::open(&config.database).unwrap();
        let mut stmt = conn.prepare("SELECT id, name FROM category_term ORDER BY id").unwrap();
        let ids = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        ids
    };

    rows.push(line(25, "Pikachu", "Electric", "", "['Static', 'Lightning Rod']"));
    rows.push(line(5, "Charmeleon", "Fire", "", "['Blaze', 'Solar Power']"));
    write_csv(&dir, &rows);

    let report = run_load(&config).unwrap();
    assert_eq!(report.inserted_into(Table::Entity), 2);
    assert_eq!(report.present_in(Table::Entity), 4);
    assert_eq!(report.categories.created, 1);
    assert_eq!(report.traits.created, 4);

    // Existing ids never move
    let conn = Connection::open(&config.database).unwrap();
    for (id, name) in term_ids_before {
        let now: i64 = conn
            .query_row("SELECT id FROM category_term WHERE name = ?1", [&name], |row| row.get(0))
            .unwrap();
        assert_eq!(now, id, "id of {name} changed");
    }
}

#[test]
fn test_rejected_row_aborts_by_default() {
    let dir = TempDir::new().unwrap();
    let mut rows = scenario_rows();
    rows.push(line(6, "Charizard", "Fire", "Flying", "['Blaze']").replace(",0.7,", ",tall,"));
    let csv = write_csv(&dir, &rows);
    let config = config(&dir, &csv);

    let err = run_load(&config).unwrap_err();
    assert!(matches!(err, LoadError::Row { line: 6, entity_key: Some(6), .. }));

    let store = Store::open(&config.database).unwrap();
    let counts = table_counts(store.conn()).unwrap();
    assert_eq!(counts.get(Table::Entity), 0);
    assert_eq!(counts.get(Table::CategoryTerm), 0);
    assert!(get_load_runs(store.conn()).unwrap().is_empty());
}

#[test]
fn test_skip_policy_then_fixed_source_converges() {
    let dir = TempDir::new().unwrap();
    let mut rows = scenario_rows();
    rows.push(line(6, "Charizard", "Fire", "Flying", "['Blaze']").replace(",0.7,", ",tall,"));
    let csv = write_csv(&dir, &rows);
    let config = config(&dir, &csv).with_row_error_policy(RowErrorPolicy::Skip);

    let report = run_load(&config).unwrap();
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].line, 6);

    // Fix the row and retry from the top
    rows.pop();
    rows.push(line(6, "Charizard", "Fire", "Flying", "['Blaze']"));
    write_csv(&dir, &rows);
    let report = run_load(&config).unwrap();

    assert!(report.rejected.is_empty());
    assert_eq!(report.inserted_into(Table::Entity), 1);

    let conn = Connection::open(&config.database).unwrap();
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM entity_category WHERE entity_key = ?1", 6), 2);
}

#[test]
fn test_missing_columns_fail_before_any_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pokemon.csv");
    fs::write(&path, "pokedex_number,name,type1\n1,Bulbasaur,Grass\n").unwrap();
    let config = config(&dir, &path);

    let err = run_load(&config).unwrap_err();
    assert!(matches!(err, LoadError::Source(_)));
    assert!(err.to_string().contains("abilities"));
}

#[test]
fn test_unreachable_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, &scenario_rows());
    let config = LoadConfig::new(&csv, dir.path().join("no/such/dir/dex.db"));

    let err = run_load(&config).unwrap_err();
    assert!(matches!(err, LoadError::Store(StoreError::Connectivity { .. })));
}

#[test]
fn test_read_only_store_serves_reads_and_refuses_writes() {
    let dir = TempDir::new().unwrap();
    let csv = write_csv(&dir, &scenario_rows());
    let config = config(&dir, &csv);
    run_load(&config).unwrap();

    let store = Store::open_read_only(&config.database).unwrap();
    let counts = table_counts(store.conn()).unwrap();
    assert_eq!(counts.get(Table::Entity), 4);
    assert_eq!(get_load_runs(store.conn()).unwrap().len(), 1);

    let write = store
        .conn()
        .execute("INSERT INTO category_term (name) VALUES ('Dragon')", []);
    assert!(write.is_err());
    assert_eq!(table_counts(store.conn()).unwrap(), counts);
}

#[test]
fn test_read_only_open_never_creates_a_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.db");

    let err = Store::open_read_only(&path).err().unwrap();
    assert!(matches!(err, StoreError::Connectivity { .. }));
    assert!(!path.exists());
}

#[test]
fn test_short_row_on_disk_loads_with_nulls() {
    let dir = TempDir::new().unwrap();
    let mut rows = scenario_rows();
    let short = line(7, "Squirtle2", "Water", "", "['Torrent']");
    rows.push(short.strip_suffix(",1,0").unwrap().to_string());
    let csv = write_csv(&dir, &rows);
    let config = config(&dir, &csv).with_row_error_policy(RowErrorPolicy::Skip);

    let report = run_load(&config).unwrap();
    assert_eq!(report.rows_loaded, 5);
    assert!(report.rejected.is_empty());

    let conn = Connection::open(&config.database).unwrap();
    let generation: Option<i64> = conn
        .query_row("SELECT generation FROM entity WHERE entity_key = 7", [], |row| row.get(0))
        .unwrap();
    assert_eq!(generation, None);
}
