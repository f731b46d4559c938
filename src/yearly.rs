//! A yearly fire sheet and the stage it has reached.
//!
//! Tables move strictly forward through
//! `Raw -> Normalized -> Corrected -> Tagged -> Projected -> Unified`;
//! every operation checks that it is the next step.

use std::fmt;

use tracing::debug;

use crate::corrections::{apply_rules, RuleOutcome};
use crate::error::{PipelineError, Result};
use crate::loader::RawSheet;
use crate::rules::RuleSet;
use crate::schema::{self, SchemaVariant};
use crate::sheet::Sheet;
use crate::types::{FireRow, HistoryRow};

/// Name of the yearly sheet, as used in logs, errors and reports.
pub fn yearly_table_name(year: i32) -> String {
    format!("incendio_{}", year)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Raw,
    Normalized,
    Corrected,
    Tagged,
    Projected,
    Unified,
}

impl Stage {
    fn next(self) -> Option<Stage> {
        match self {
            Stage::Raw => Some(Stage::Normalized),
            Stage::Normalized => Some(Stage::Corrected),
            Stage::Corrected => Some(Stage::Tagged),
            Stage::Tagged => Some(Stage::Projected),
            Stage::Projected => Some(Stage::Unified),
            Stage::Unified => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
enum Content {
    Raw(RawSheet),
    Rows(Sheet<FireRow>),
    Projected(Vec<HistoryRow>),
}

#[derive(Debug, Clone)]
pub struct YearlyTable {
    year: i32,
    variant: SchemaVariant,
    stage: Stage,
    name: String,
    content: Content,
}

impl YearlyTable {
    pub fn raw(year: i32, sheet: RawSheet) -> Result<Self> {
        Ok(YearlyTable {
            year,
            variant: SchemaVariant::for_year(year)?,
            stage: Stage::Raw,
            name: yearly_table_name(year),
            content: Content::Raw(sheet),
        })
    }

    /// Wrap and normalize a sheet read from disk.
    pub fn normalized(year: i32, sheet: RawSheet) -> Result<Self> {
        let mut yearly = Self::raw(year, sheet)?;
        yearly.normalize()?;
        Ok(yearly)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn stage_error(&self, to: Stage) -> PipelineError {
        PipelineError::Stage {
            table: self.name.clone(),
            from: self.stage.to_string(),
            to: to.to_string(),
        }
    }

    fn advance(&mut self, to: Stage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(self.stage_error(to));
        }
        debug!(table = %self.name, from = %self.stage, to = %to, "stage transition");
        self.stage = to;
        Ok(())
    }

    /// Fail unless the sheet sits at `required`, the stage before `to`.
    pub fn require_stage(&self, required: Stage, to: Stage) -> Result<()> {
        if self.stage != required {
            return Err(self.stage_error(to));
        }
        Ok(())
    }

    /// Parsed rows. Available from `Normalized` until projection.
    pub fn sheet(&self) -> Result<&Sheet<FireRow>> {
        match &self.content {
            Content::Rows(sheet) => Ok(sheet),
            _ => Err(self.stage_error(Stage::Normalized)),
        }
    }

    fn sheet_mut(&mut self, to: Stage) -> Result<&mut Sheet<FireRow>> {
        let err = self.stage_error(to);
        match &mut self.content {
            Content::Rows(sheet) => Ok(sheet),
            _ => Err(err),
        }
    }

    /// Rows of the historical fact table, once projected.
    pub fn projected(&self) -> Result<&[HistoryRow]> {
        match &self.content {
            Content::Projected(rows) => Ok(rows),
            _ => Err(self.stage_error(Stage::Projected)),
        }
    }

    pub fn normalize(&mut self) -> Result<()> {
        self.require_stage(Stage::Raw, Stage::Normalized)?;
        let Content::Raw(raw) = &self.content else {
            return Err(self.stage_error(Stage::Normalized));
        };
        let sheet = schema::normalize_yearly(raw.clone(), self.variant, &self.name)?;
        self.content = Content::Rows(sheet);
        self.advance(Stage::Normalized)
    }

    pub fn correct(&mut self, rules: &RuleSet) -> Result<Vec<RuleOutcome>> {
        self.require_stage(Stage::Normalized, Stage::Corrected)?;
        let year = self.year;
        let outcomes = apply_rules(self.sheet_mut(Stage::Corrected)?, year, rules)?;
        self.advance(Stage::Corrected)?;
        Ok(outcomes)
    }

    /// Add the constant `ano` column.
    pub fn tag(&mut self) -> Result<()> {
        self.require_stage(Stage::Corrected, Stage::Tagged)?;
        let year = self.year;
        let sheet = self.sheet_mut(Stage::Tagged)?;
        sheet.add_column(schema::YEAR);
        for row in sheet.rows_mut() {
            row.year = Some(year);
        }
        self.advance(Stage::Tagged)
    }

    /// Keep only the columns of the historical fact table.
    pub fn project(&mut self) -> Result<()> {
        self.require_stage(Stage::Tagged, Stage::Projected)?;
        let year = self.year;
        let rows = self
            .sheet()?
            .rows()
            .iter()
            .map(|r| HistoryRow {
                facility: r.facility.clone(),
                burned_area: r.burned_area,
                percent_burned: r.percent_burned,
                year: r.year.unwrap_or(year),
            })
            .collect();
        self.content = Content::Projected(rows);
        self.advance(Stage::Projected)
    }

    pub fn mark_unified(&mut self) -> Result<()> {
        self.advance(Stage::Unified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn raw_2022() -> RawSheet {
        RawSheet::from_reader(
            Path::new("area_atingida_2022.csv"),
            "ind,UC,Area_total,Area_UC,Perc_AAF_UC\n0,PARNA DAS SEMPRE VIVAS,120.5,124554.7,0.1\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn walks_all_stages_in_order() {
        let rules = RuleSet::builtin().unwrap();
        let mut yearly = YearlyTable::raw(2022, raw_2022()).unwrap();
        yearly.normalize().unwrap();
        let outcomes = yearly.correct(&rules).unwrap();
        assert!(outcomes.iter().any(|o| o.changed == 1));
        yearly.tag().unwrap();
        assert!(yearly.sheet().unwrap().has_column("ano"));
        yearly.project().unwrap();
        assert_eq!(
            yearly.projected().unwrap(),
            [HistoryRow {
                facility: "PARNA DAS SEMPRE-VIVAS".into(),
                burned_area: Some(120.5),
                percent_burned: Some(0.1),
                year: 2022,
            }]
        );
        assert!(yearly.sheet().is_err());
        yearly.mark_unified().unwrap();
        assert_eq!(yearly.stage(), Stage::Unified);
        assert!(yearly.mark_unified().is_err());
    }

    #[test]
    fn out_of_order_transition_is_rejected() {
        let mut yearly = YearlyTable::raw(2022, raw_2022()).unwrap();
        let err = yearly.tag().unwrap_err();
        assert!(matches!(err, PipelineError::Stage { ref from, ref to, .. } if from == "Raw" && to == "Tagged"));
        yearly.normalize().unwrap();
        assert!(yearly.normalize().is_err());
        assert_eq!(yearly.stage(), Stage::Normalized);
    }

    #[test]
    fn normalized_sheet_exposes_optional_columns() {
        let yearly = YearlyTable::normalized(2022, raw_2022()).unwrap();
        assert_eq!(yearly.name(), "incendio_2022");
        let rows = yearly.sheet().unwrap().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].burned_area, Some(120.5));
        assert_eq!(rows[0].biome, None);
        assert_eq!(rows[0].year, None);
        assert!(YearlyTable::raw(2022, raw_2022()).unwrap().sheet().is_err());
        assert!(matches!(YearlyTable::raw(2017, raw_2022()), Err(PipelineError::UnknownYear(2017))));
    }
}
