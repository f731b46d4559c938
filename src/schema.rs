//! Canonical column names and the per-year schema variants of the fire
//! sheets.
//!
//! The yearly exports drifted over time: newer sheets call the burned area
//! `Area_total` and the percentage `Perc_AAF_UC`, 2021 carries a mangled
//! `` `Perc_UC `` header and an unnamed index column, and only 2018-2021
//! carry biome, satellite and last-update columns.

use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::loader::RawSheet;
use crate::sheet::Sheet;
use crate::types::{FireRow, ReferenceEntity};

// Yearly fire sheets.
pub const FACILITY: &str = "UC";
pub const BURNED_AREA: &str = "Area_queimada";
pub const PERCENT_BURNED: &str = "Perc_UC";
pub const YEAR: &str = "ano";
pub const BIOME: &str = "Bioma";
pub const SATELLITE: &str = "Satelite";
pub const LAST_UPDATE: &str = "Data_ult_atual";
pub const ROW_INDEX: &str = "ind";

// Reference attributes table.
pub const NATIONAL_CODE: &str = "CNUC";
pub const ABBREVIATED_NAME: &str = "TIPO_NOME";
pub const FULL_NAME: &str = "NOME_UC";
pub const CATEGORY: &str = "TIPO";
pub const PREDOMINANT_BIOME: &str = "Bioma_predominante";
pub const STATE: &str = "UF";
pub const LEGAL_ACTS: &str = "Atos_legais";
pub const AREA: &str = "Area";
pub const LEGACY_ID: &str = "id";

/// Columns every yearly sheet exposes once normalized.
pub const CANONICAL_FIRE_COLUMNS: [&str; 3] = [FACILITY, BURNED_AREA, PERCENT_BURNED];

pub const REFERENCE_COLUMNS: [&str; 8] = [
    NATIONAL_CODE,
    ABBREVIATED_NAME,
    FULL_NAME,
    CATEGORY,
    PREDOMINANT_BIOME,
    STATE,
    LEGAL_ACTS,
    AREA,
];

const MODERN_RENAMES: [(&str, &str); 2] = [("Perc_AAF_UC", PERCENT_BURNED), ("Area_total", BURNED_AREA)];
const TRANSITIONAL_RENAMES: [(&str, &str); 2] = [("`Perc_UC", PERCENT_BURNED), ("_c0", ROW_INDEX)];
const REFERENCE_RENAMES: [(&str, &str); 1] = [("Nome_UC", FULL_NAME)];

/// Raw layout of a yearly fire sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SchemaVariant {
    /// 2018-2020: canonical names, with biome/satellite/last-update.
    Legacy,
    /// 2021: unnamed index column and a stray backtick in `Perc_UC`.
    Transitional,
    /// 2022-2023: `Area_total` and `Perc_AAF_UC`, no biome.
    Modern,
}

impl SchemaVariant {
    pub fn for_year(year: i32) -> Result<Self> {
        match year {
            2018..=2020 => Ok(SchemaVariant::Legacy),
            2021 => Ok(SchemaVariant::Transitional),
            2022 | 2023 => Ok(SchemaVariant::Modern),
            other => Err(PipelineError::UnknownYear(other)),
        }
    }

    pub fn renames(self) -> &'static [(&'static str, &'static str)] {
        match self {
            SchemaVariant::Legacy => &[],
            SchemaVariant::Transitional => &TRANSITIONAL_RENAMES,
            SchemaVariant::Modern => &MODERN_RENAMES,
        }
    }
}

/// Apply `renames` to `sheet`; names that are not present are skipped.
/// Returns how many columns were renamed.
pub fn rename_columns(sheet: &mut RawSheet, renames: &[(&str, &str)]) -> usize {
    renames
        .iter()
        .filter(|(from, to)| {
            let renamed = sheet.rename_column(from, to);
            if renamed {
                debug!(path = %sheet.path().display(), from, to, "renamed column");
            }
            renamed
        })
        .count()
}

/// Bring a raw yearly sheet to canonical column names and parse it.
/// Columns outside the canonical set are carried along as text.
pub fn normalize_yearly(
    mut raw: RawSheet,
    variant: SchemaVariant,
    name: &str,
) -> Result<Sheet<FireRow>> {
    rename_columns(&mut raw, variant.renames());
    Sheet::from_raw(name, &raw)
}

/// Canonicalize the reference table and drop its surrogate `id` column,
/// which the national code supersedes.
pub fn normalize_reference(mut raw: RawSheet, name: &str) -> Result<Sheet<ReferenceEntity>> {
    rename_columns(&mut raw, &REFERENCE_RENAMES);
    if raw.drop_column(LEGACY_ID) {
        debug!(table = name, "dropped legacy id column");
    }
    Sheet::from_raw(name, &raw)
}
