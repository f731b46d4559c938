//! Temporal unification: tag every corrected yearly sheet with its year,
//! project to the fact-table columns, `UNION ALL` the years and inner-join
//! the result against the reference units on `UC = TIPO_NOME`.
//!
//! Rows whose facility has no reference unit are dropped by the join; they
//! are counted per year in [`UnifyReport`] instead of disappearing silently.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{HistoryRow, ReferenceEntity, UnifiedRecord};
use crate::yearly::{Stage, YearlyTable};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearJoinStats {
    pub year: i32,
    pub rows_in: usize,
    pub rows_joined: usize,
    pub rows_dropped: usize,
    pub dropped_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnifyReport {
    pub years: Vec<YearJoinStats>,
}

impl UnifyReport {
    pub fn rows_in(&self) -> usize {
        self.years.iter().map(|y| y.rows_in).sum()
    }

    pub fn rows_joined(&self) -> usize {
        self.years.iter().map(|y| y.rows_joined).sum()
    }

    pub fn rows_dropped(&self) -> usize {
        self.years.iter().map(|y| y.rows_dropped).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Unified {
    pub records: Vec<UnifiedRecord>,
    pub report: UnifyReport,
}

/// Unify corrected yearly sheets with the reference units.
///
/// Every sheet must be in the `Corrected` stage. The sheets move to
/// `Unified` together or, on any error, are left exactly as they were.
pub fn unify(yearly: &mut [YearlyTable], reference: &[ReferenceEntity]) -> Result<Unified> {
    for sheet in yearly.iter() {
        sheet.require_stage(Stage::Corrected, Stage::Tagged)?;
    }

    let mut staged = yearly.to_vec();
    let mut stats: BTreeMap<i32, YearJoinStats> = BTreeMap::new();
    let mut history: Vec<HistoryRow> = Vec::new();
    for sheet in staged.iter_mut() {
        sheet.tag()?;
        sheet.project()?;
        let rows = sheet.projected()?;
        let entry = stats.entry(sheet.year()).or_insert_with(|| YearJoinStats {
            year: sheet.year(),
            ..YearJoinStats::default()
        });
        entry.rows_in += rows.len();
        history.extend_from_slice(rows);
    }

    let mut by_name: HashMap<&str, Vec<&ReferenceEntity>> = HashMap::new();
    for entity in reference {
        by_name
            .entry(entity.abbreviated_name.as_str())
            .or_default()
            .push(entity);
    }
    for (name, units) in &by_name {
        if units.len() > 1 {
            warn!(name, units = units.len(), "abbreviated name is not unique in reference");
        }
    }

    let records = join_history(&history, &by_name, &mut stats);

    for sheet in staged.iter_mut() {
        sheet.mark_unified()?;
    }
    yearly.clone_from_slice(&staged);

    let report = UnifyReport {
        years: stats.into_values().collect(),
    };
    for year in report.years.iter().filter(|y| y.rows_dropped > 0) {
        warn!(
            year = year.year,
            dropped = year.rows_dropped,
            names = ?year.dropped_names,
            "rows without a reference unit were dropped by the join"
        );
    }
    info!(
        rows_in = report.rows_in(),
        rows_joined = report.rows_joined(),
        rows_dropped = report.rows_dropped(),
        "unified historical table"
    );
    Ok(Unified { records, report })
}

fn join_history(
    history: &[HistoryRow],
    by_name: &HashMap<&str, Vec<&ReferenceEntity>>,
    stats: &mut BTreeMap<i32, YearJoinStats>,
) -> Vec<UnifiedRecord> {
    let mut dropped: BTreeMap<i32, BTreeSet<String>> = BTreeMap::new();
    let mut records = Vec::with_capacity(history.len());
    for row in history {
        let entry = stats.entry(row.year).or_default();
        match by_name.get(row.facility.as_str()) {
            Some(units) => {
                entry.rows_joined += 1;
                records.extend(units.iter().map(|unit| UnifiedRecord {
                    national_code: unit.national_code.clone(),
                    abbreviated_name: unit.abbreviated_name.clone(),
                    full_name: unit.full_name.clone(),
                    category: unit.category.clone(),
                    biome: unit.biome.clone(),
                    state: unit.state.clone(),
                    burned_area: row.burned_area,
                    percent_burned: row.percent_burned,
                    year: row.year,
                }));
            }
            None => {
                entry.rows_dropped += 1;
                dropped
                    .entry(row.year)
                    .or_default()
                    .insert(row.facility.clone());
            }
        }
    }
    for (year, names) in dropped {
        if let Some(entry) = stats.get_mut(&year) {
            entry.dropped_names = names.into_iter().collect();
        }
    }
    records
}
