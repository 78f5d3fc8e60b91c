// Typed views over a catalog row
//
// The source header names are the catalog's published ones; the store column
// names live in db.rs. Every column set here is fixed at build time.

use crate::error::RowError;
use crate::source::SourceRow;
use serde::{Deserialize, Serialize};

// ============================================================================
// COLUMN DESCRIPTORS
// ============================================================================

pub static KEY_COLUMN: &str = "pokedex_number";
pub static NAME_COLUMN: &str = "name";
pub static LOCALIZED_NAME_COLUMN: &str = "japanese_name";
/// Upstream exports misspell this header; accept both.
pub static CLASSIFICATION_COLUMNS: [&str; 2] = ["classfication", "classification"];
pub static GENERATION_COLUMN: &str = "generation";
pub static SPECIAL_COLUMN: &str = "is_legendary";
pub static TRAIT_COLUMN: &str = "abilities";

pub static STAT_COLUMNS: [&str; 7] = [
    "hp",
    "attack",
    "defense",
    "sp_attack",
    "sp_defense",
    "speed",
    "base_total",
];

pub static PHYSICAL_COLUMNS: [&str; 6] = [
    "height_m",
    "weight_kg",
    "capture_rate",
    "base_egg_steps",
    "base_happiness",
    "percentage_male",
];

/// Category slot discriminator. Only two slots exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Primary, Slot::Secondary];

    /// Value stored in entity_category.slot
    pub fn number(self) -> i64 {
        match self {
            Slot::Primary => 1,
            Slot::Secondary => 2,
        }
    }

    pub fn source_column(self) -> &'static str {
        SLOT_COLUMNS[self.index()]
    }

    fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Secondary => 1,
        }
    }
}

pub const EFFECTIVENESS_COUNT: usize = 18;

/// Multiplier columns, one per attacking category. Same name in the source and the store.
pub static EFFECTIVENESS_COLUMNS: [&str; EFFECTIVENESS_COUNT] = [
    "against_bug",
    "against_dark",
    "against_dragon",
    "against_electric",
    "against_fairy",
    "against_fight",
    "against_fire",
    "against_flying",
    "against_ghost",
    "against_grass",
    "against_ground",
    "against_ice",
    "against_normal",
    "against_poison",
    "against_psychic",
    "against_rock",
    "against_steel",
    "against_water",
];

/// Header groups the source must carry. Each group lists accepted spellings.
pub fn required_columns() -> Vec<&'static [&'static str]> {
    let mut required: Vec<&'static [&'static str]> = vec![
        std::slice::from_ref(&KEY_COLUMN),
        std::slice::from_ref(&NAME_COLUMN),
        std::slice::from_ref(&LOCALIZED_NAME_COLUMN),
        &CLASSIFICATION_COLUMNS,
        std::slice::from_ref(&GENERATION_COLUMN),
        std::slice::from_ref(&SPECIAL_COLUMN),
        std::slice::from_ref(&TRAIT_COLUMN),
    ];
    required.extend(STAT_COLUMNS.iter().map(std::slice::from_ref));
    required.extend(PHYSICAL_COLUMNS.iter().map(std::slice::from_ref));
    required.extend(EFFECTIVENESS_COLUMNS.iter().map(std::slice::from_ref));
    required.extend(SLOT_COLUMNS.iter().map(std::slice::from_ref));
    required
}

static SLOT_COLUMNS: [&str; 2] = ["type1", "type2"];

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_key: i64,
    pub name: Option<String>,
    pub localized_name: Option<String>,
    pub classification: Option<String>,
    pub generation: Option<i64>,
    pub is_special: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatBundle {
    pub hp: Option<i64>,
    pub attack: Option<i64>,
    pub defense: Option<i64>,
    pub sp_attack: Option<i64>,
    pub sp_defense: Option<i64>,
    pub speed: Option<i64>,
    pub base_total: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalBundle {
    pub height_m: Option<f64>,
    pub weight_kg: Option<f64>,
    /// Kept as text: some catalog entries carry annotated rates like "30 (Meteorite)"
    pub capture_rate: Option<String>,
    pub base_egg_steps: Option<i64>,
    pub base_happiness: Option<i64>,
    pub percentage_male: Option<f64>,
}

/// Multipliers in `EFFECTIVENESS_COLUMNS` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectivenessBundle {
    pub multipliers: [Option<f64>; EFFECTIVENESS_COUNT],
}

impl EffectivenessBundle {
    pub fn get(&self, column: &str) -> Option<f64> {
        EFFECTIVENESS_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.multipliers[i])
    }
}

/// A source row split into the shapes the store wants.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub line: u64,
    pub entity: EntityRecord,
    pub stats: StatBundle,
    pub physical: PhysicalBundle,
    pub effectiveness: EffectivenessBundle,
    /// Raw category names by slot, null when the slot is empty
    pub categories: [Option<String>; 2],
    /// Serialized trait list, still undecoded
    pub traits_raw: Option<String>,
}

impl CatalogRow {
    pub fn from_source(row: &SourceRow) -> Result<Self, RowError> {
        if let Some((expected, found)) = row.overflow() {
            return Err(RowError::TooManyFields { expected, found });
        }
        let entity_key = parse_int(KEY_COLUMN, row.get(KEY_COLUMN))?.ok_or(RowError::MissingKey)?;

        let entity = EntityRecord {
            entity_key,
            name: text(row.get(NAME_COLUMN)),
            localized_name: text(row.get(LOCALIZED_NAME_COLUMN)),
            classification: text(row.get_any(&CLASSIFICATION_COLUMNS)),
            generation: parse_int(GENERATION_COLUMN, row.get(GENERATION_COLUMN))?,
            is_special: parse_bool(SPECIAL_COLUMN, row.get(SPECIAL_COLUMN))?,
        };

        let int = |column: &'static str| parse_int(column, row.get(column));
        let real = |column: &'static str| parse_real(column, row.get(column));

        let stats = StatBundle {
            hp: int("hp")?,
            attack: int("attack")?,
            defense: int("defense")?,
            sp_attack: int("sp_attack")?,
            sp_defense: int("sp_defense")?,
            speed: int("speed")?,
            base_total: int("base_total")?,
        };

        let physical = PhysicalBundle {
            height_m: real("height_m")?,
            weight_kg: real("weight_kg")?,
            capture_rate: text(row.get("capture_rate")),
            base_egg_steps: int("base_egg_steps")?,
            base_happiness: int("base_happiness")?,
            percentage_male: real("percentage_male")?,
        };

        let mut effectiveness = EffectivenessBundle::default();
        for (slot, column) in effectiveness.multipliers.iter_mut().zip(EFFECTIVENESS_COLUMNS.iter()) {
            *slot = real(*column)?;
        }

        Ok(CatalogRow {
            line: row.line(),
            entity,
            stats,
            physical,
            effectiveness,
            categories: Slot::ALL.map(|slot| text(row.get(slot.source_column()))),
            traits_raw: text(row.get(TRAIT_COLUMN)),
        })
    }

    pub fn category(&self, slot: Slot) -> Option<&str> {
        self.categories[slot.index()].as_deref()
    }
}

/// Entity key of a source row, if it has a readable one
pub fn entity_key_of(row: &SourceRow) -> Option<i64> {
    parse_int(KEY_COLUMN, row.get(KEY_COLUMN)).ok().flatten()
}

// ============================================================================
// CELL PARSING
// ============================================================================

fn text(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn invalid(column: &'static str, value: &str) -> RowError {
    RowError::InvalidField {
        column,
        value: value.to_string(),
    }
}

/// Integers, also accepting whole floats like "45.0".
pub fn parse_int(column: &'static str, value: Option<&str>) -> Result<Option<i64>, RowError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Ok(n) = value.parse::<i64>() {
        return Ok(Some(n));
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
        _ => Err(invalid(column, value)),
    }
}

pub fn parse_real(column: &'static str, value: Option<&str>) -> Result<Option<f64>, RowError> {
    match value {
        None => Ok(None),
        Some(v) => match v.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Some(f)),
            _ => Err(invalid(column, v)),
        },
    }
}

pub fn parse_bool(column: &'static str, value: Option<&str>) -> Result<Option<bool>, RowError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "yes" => Ok(Some(true)),
        "0" | "0.0" | "false" | "f" | "no" => Ok(Some(false)),
        _ => Err(invalid(column, value)),
    }
}
