//! Batch orchestration: load, normalize, detect, persist, correct, verify,
//! unify. Stages run strictly in that order; a load failure in any file
//! aborts the run.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::corrections::RuleOutcome;
use crate::error::{PipelineError, Result};
use crate::loader::read_raw;
use crate::mismatch::{search_reference, unmatched_facilities};
use crate::output::{write_csv, write_json};
use crate::reports;
use crate::rules::RuleSet;
use crate::schema::normalize_reference;
use crate::store::{SnapshotKey, SnapshotStore};
use crate::sheet::Sheet;
use crate::types::{ReferenceEntity, ReferenceMatchRow};
use crate::unify::{unify, Unified};
use crate::yearly::YearlyTable;

pub const REFERENCE_TABLE: &str = "dados_uc";

/// Unmatched facility names per year.
pub type MismatchReport = BTreeMap<i32, Vec<String>>;

#[derive(Debug, Clone)]
pub struct Sources {
    pub reference: Sheet<ReferenceEntity>,
    pub yearly: Vec<YearlyTable>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub ruleset_version: String,
    pub reference: Vec<ReferenceEntity>,
    pub mismatches_before: MismatchReport,
    pub mismatches_after: MismatchReport,
    pub corrections: Vec<RuleOutcome>,
    pub unified: Unified,
}

impl PipelineOutcome {
    pub fn unmatched_after(&self) -> usize {
        self.mismatches_after.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub history: PathBuf,
    pub yearly_totals: PathBuf,
    pub top_units: PathBuf,
    pub unburned_units: PathBuf,
    pub summary: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
    rules: RuleSet,
    store: SnapshotStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, rules: RuleSet) -> Result<Self> {
        config.validate()?;
        let store = SnapshotStore::open(&config.store_dir)?;
        Ok(Pipeline {
            config,
            rules,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn load_reference(&self) -> Result<Sheet<ReferenceEntity>> {
        let raw = read_raw(&self.config.reference_path())?;
        normalize_reference(raw, REFERENCE_TABLE)
    }

    pub fn load_yearly(&self, year: i32) -> Result<YearlyTable> {
        let raw = read_raw(&self.config.yearly_path(year))?;
        let yearly = YearlyTable::normalized(year, raw)?;
        let rows = yearly.sheet()?.rows();
        let burned: f64 = rows.iter().filter_map(|r| r.burned_area).sum();
        debug!(
            year,
            variant = ?yearly.variant(),
            rows = rows.len(),
            burned_area = burned,
            "normalized yearly sheet"
        );
        Ok(yearly)
    }

    pub fn load_sources(&self) -> Result<Sources> {
        let reference = self.load_reference()?;
        let yearly = self
            .config
            .years
            .iter()
            .map(|&year| self.load_yearly(year))
            .collect::<Result<Vec<_>>>()?;
        info!(
            reference_rows = reference.len(),
            years = yearly.len(),
            "loaded sources"
        );
        Ok(Sources { reference, yearly })
    }

    pub fn detect(
        reference: &Sheet<ReferenceEntity>,
        yearly: &[YearlyTable],
    ) -> Result<MismatchReport> {
        yearly
            .iter()
            .map(|sheet| -> Result<(i32, Vec<String>)> {
                Ok((sheet.year(), unmatched_facilities(sheet.sheet()?, reference)?))
            })
            .collect()
    }

    pub fn search(&self, keywords: &[String]) -> Result<Vec<ReferenceMatchRow>> {
        Ok(search_reference(self.load_reference()?.rows(), keywords))
    }

    pub fn run(&self) -> Result<PipelineOutcome> {
        let Sources {
            reference,
            mut yearly,
        } = self.load_sources()?;

        self.store.write(SnapshotKey::Reference, &reference)?;
        for sheet in &yearly {
            self.store.write(SnapshotKey::Year(sheet.year()), sheet.sheet()?)?;
        }

        let mismatches_before = Self::detect(&reference, &yearly)?;
        for (year, names) in mismatches_before.iter().filter(|(_, n)| !n.is_empty()) {
            info!(year, unmatched = ?names, "facility names without a reference unit");
        }

        let mut corrections = Vec::new();
        for sheet in &mut yearly {
            corrections.extend(sheet.correct(&self.rules)?);
            self.store.write(SnapshotKey::Year(sheet.year()), sheet.sheet()?)?;
        }

        let mismatches_after = Self::detect(&reference, &yearly)?;
        for (year, names) in mismatches_after.iter().filter(|(_, n)| !n.is_empty()) {
            warn!(year, unmatched = ?names, "names still unmatched after corrections");
        }

        let unified = unify(&mut yearly, reference.rows())?;

        Ok(PipelineOutcome {
            ruleset_version: self.rules.version.clone(),
            reference: reference.rows().to_vec(),
            mismatches_before,
            mismatches_after,
            corrections,
            unified,
        })
    }

    /// Apply the ruleset to the persisted yearly snapshots and overwrite
    /// them. Rerunning is a no-op once every rule has been applied. A
    /// snapshot that no longer matches its catalog is refused.
    pub fn correct_persisted(&self) -> Result<Vec<RuleOutcome>> {
        let mut outcomes = Vec::new();
        for &year in &self.config.years {
            let key = SnapshotKey::Year(year);
            if !self.store.exists(key) {
                return Err(PipelineError::Config(format!(
                    "no snapshot for {} in {}; run the pipeline first",
                    year,
                    self.store.root().display()
                )));
            }
            let raw = self.store.read_verified(key)?;
            let mut sheet = YearlyTable::normalized(year, raw)?;
            outcomes.extend(sheet.correct(&self.rules)?);
            self.store.write(key, sheet.sheet()?)?;
        }
        Ok(outcomes)
    }

    pub fn write_reports(&self, outcome: &PipelineOutcome) -> Result<ReportFiles> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir)?;
        let records = &outcome.unified.records;
        let files = ReportFiles {
            history: dir.join("historico_dados_uc.csv"),
            yearly_totals: dir.join("burned_area_by_year.csv"),
            top_units: dir.join("top_units_by_year.csv"),
            unburned_units: dir.join("unburned_units.csv"),
            summary: dir.join("summary.json"),
        };
        write_csv(&files.history, records)?;
        write_csv(&files.yearly_totals, &reports::generate_yearly_totals(records))?;
        write_csv(
            &files.top_units,
            &reports::generate_top_units(records, &self.config.years, self.config.top_n),
        )?;
        write_csv(
            &files.unburned_units,
            &reports::generate_unburned_units(&outcome.reference, records),
        )?;
        let summary = reports::generate_summary(
            records,
            &outcome.unified.report,
            outcome.unmatched_after(),
            &outcome.ruleset_version,
        );
        write_json(&files.summary, &summary)?;
        info!(dir = %dir.display(), "wrote reports");
        Ok(files)
    }
}
