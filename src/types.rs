use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::schema;
use crate::sheet::SheetRow;
use crate::util::{de_opt_date, de_opt_f64, de_required};

/// One conservation unit from the reference attributes table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    #[serde(rename = "CNUC", deserialize_with = "de_required")]
    pub national_code: String,
    #[serde(rename = "TIPO_NOME", deserialize_with = "de_required")]
    pub abbreviated_name: String,
    #[serde(rename = "NOME_UC", deserialize_with = "de_required")]
    pub full_name: String,
    #[serde(rename = "TIPO", deserialize_with = "de_required")]
    pub category: String,
    #[serde(rename = "Bioma_predominante", deserialize_with = "de_required")]
    pub biome: String,
    #[serde(rename = "UF", deserialize_with = "de_required")]
    pub state: String,
    #[serde(rename = "Atos_legais", default)]
    pub legal_acts: Option<String>,
    #[serde(rename = "Area", default, deserialize_with = "de_opt_f64")]
    pub area_ha: Option<f64>,
}

impl SheetRow for ReferenceEntity {
    const COLUMNS: &'static [&'static str] = &schema::REFERENCE_COLUMNS;
    const REQUIRED: &'static [&'static str] = &schema::REFERENCE_COLUMNS;

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            schema::AREA => self.area_ha.map(|v| v.to_string()),
            _ => self.text(column).map(str::to_string),
        }
    }

    fn text(&self, column: &str) -> Option<&str> {
        let value = match column {
            schema::NATIONAL_CODE => &self.national_code,
            schema::ABBREVIATED_NAME => &self.abbreviated_name,
            schema::FULL_NAME => &self.full_name,
            schema::CATEGORY => &self.category,
            schema::PREDOMINANT_BIOME => &self.biome,
            schema::STATE => &self.state,
            schema::LEGAL_ACTS => return self.legal_acts.as_deref(),
            _ => return None,
        };
        Some(value.as_str())
    }

    fn set_text(&mut self, column: &str, value: &str) -> bool {
        let slot = match column {
            schema::NATIONAL_CODE => &mut self.national_code,
            schema::ABBREVIATED_NAME => &mut self.abbreviated_name,
            schema::FULL_NAME => &mut self.full_name,
            schema::CATEGORY => &mut self.category,
            schema::PREDOMINANT_BIOME => &mut self.biome,
            schema::STATE => &mut self.state,
            schema::LEGAL_ACTS => {
                self.legal_acts = Some(value.to_string());
                return true;
            }
            _ => return false,
        };
        *slot = value.to_string();
        true
    }
}

/// One row of a normalized yearly fire sheet. Columns only some layouts
/// carry deserialize to `None` elsewhere; `year` is filled in by tagging.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FireRow {
    #[serde(rename = "UC", deserialize_with = "de_required")]
    pub facility: String,
    #[serde(rename = "Area_queimada", deserialize_with = "de_opt_f64")]
    pub burned_area: Option<f64>,
    #[serde(rename = "Perc_UC", deserialize_with = "de_opt_f64")]
    pub percent_burned: Option<f64>,
    #[serde(rename = "Bioma", default)]
    pub biome: Option<String>,
    #[serde(rename = "Satelite", default)]
    pub satellite: Option<String>,
    #[serde(rename = "Data_ult_atual", default, deserialize_with = "de_opt_date")]
    pub last_update: Option<NaiveDate>,
    #[serde(rename = "ano", default)]
    pub year: Option<i32>,
}

const FIRE_COLUMNS: [&str; 7] = [
    schema::FACILITY,
    schema::BURNED_AREA,
    schema::PERCENT_BURNED,
    schema::BIOME,
    schema::SATELLITE,
    schema::LAST_UPDATE,
    schema::YEAR,
];

impl SheetRow for FireRow {
    const COLUMNS: &'static [&'static str] = &FIRE_COLUMNS;
    const REQUIRED: &'static [&'static str] = &schema::CANONICAL_FIRE_COLUMNS;

    fn cell(&self, column: &str) -> Option<String> {
        match column {
            schema::BURNED_AREA => self.burned_area.map(|v| v.to_string()),
            schema::PERCENT_BURNED => self.percent_burned.map(|v| v.to_string()),
            schema::LAST_UPDATE => self.last_update.map(|d| d.format("%Y-%m-%d").to_string()),
            schema::YEAR => self.year.map(|y| y.to_string()),
            _ => self.text(column).map(str::to_string),
        }
    }

    fn text(&self, column: &str) -> Option<&str> {
        match column {
            schema::FACILITY => Some(self.facility.as_str()),
            schema::BIOME => self.biome.as_deref(),
            schema::SATELLITE => self.satellite.as_deref(),
            _ => None,
        }
    }

    fn set_text(&mut self, column: &str, value: &str) -> bool {
        match column {
            schema::FACILITY => self.facility = value.to_string(),
            schema::BIOME => self.biome = Some(value.to_string()),
            schema::SATELLITE => self.satellite = Some(value.to_string()),
            _ => return false,
        }
        true
    }
}

/// A row of the historical fact table before the join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    #[serde(rename = "UC")]
    pub facility: String,
    #[serde(rename = "Area_queimada")]
    pub burned_area: Option<f64>,
    #[serde(rename = "Perc_UC")]
    pub percent_burned: Option<f64>,
    #[serde(rename = "ano")]
    pub year: i32,
}

/// A row of the historical fact table joined with its reference unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRecord {
    #[serde(rename = "CNUC")]
    pub national_code: String,
    #[serde(rename = "TIPO_NOME")]
    pub abbreviated_name: String,
    #[serde(rename = "NOME_UC")]
    pub full_name: String,
    #[serde(rename = "TIPO")]
    pub category: String,
    #[serde(rename = "Bioma_predominante")]
    pub biome: String,
    #[serde(rename = "UF")]
    pub state: String,
    #[serde(rename = "Area_queimada")]
    pub burned_area: Option<f64>,
    #[serde(rename = "Perc_UC")]
    pub percent_burned: Option<f64>,
    #[serde(rename = "ano")]
    pub year: i32,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct YearTotalRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "TotalBurnedArea")]
    #[tabled(rename = "TotalBurnedArea")]
    pub total_burned_area: String,
    #[serde(rename = "AvgPercentBurned")]
    #[tabled(rename = "AvgPercentBurned")]
    pub avg_percent_burned: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TopUnitRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Unit")]
    #[tabled(rename = "Unit")]
    pub full_name: String,
    #[serde(rename = "Biome")]
    #[tabled(rename = "Biome")]
    pub biome: String,
    #[serde(rename = "TotalBurnedArea")]
    #[tabled(rename = "TotalBurnedArea")]
    pub total_burned_area: String,
    #[serde(rename = "AvgPercentBurned")]
    #[tabled(rename = "AvgPercentBurned")]
    pub avg_percent_burned: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct UnburnedUnitRow {
    #[serde(rename = "Unit")]
    #[tabled(rename = "Unit")]
    pub abbreviated_name: String,
    #[serde(rename = "LegalActs")]
    #[tabled(rename = "LegalActs")]
    pub legal_acts: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ReferenceMatchRow {
    #[serde(rename = "TIPO_NOME")]
    #[tabled(rename = "TIPO_NOME")]
    pub abbreviated_name: String,
    #[serde(rename = "NOME_UC")]
    #[tabled(rename = "NOME_UC")]
    pub full_name: String,
    #[serde(rename = "Area")]
    #[tabled(rename = "Area")]
    pub area: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub ruleset_version: String,
    pub total_records: usize,
    pub total_years: usize,
    pub total_units_burned: usize,
    pub total_burned_area: f64,
    pub rows_dropped_at_join: usize,
    pub unmatched_after_corrections: usize,
}
