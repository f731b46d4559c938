use crate::types::{
    ReferenceEntity, SummaryStats, TopUnitRow, UnburnedUnitRow, UnifiedRecord, YearTotalRow,
};
use crate::unify::UnifyReport;
use crate::util::{average, format_number};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// `SUM(Area_queimada) GROUP BY ano`. Null areas contribute nothing.
pub fn totals_by_year(data: &[UnifiedRecord]) -> BTreeMap<i32, f64> {
    let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
    for r in data {
        *totals.entry(r.year).or_insert(0.0) += r.burned_area.unwrap_or(0.0);
    }
    totals
}

pub fn generate_yearly_totals(data: &[UnifiedRecord]) -> Vec<YearTotalRow> {
    #[derive(Default)]
    struct Acc {
        records: usize,
        total: f64,
        percents: Vec<f64>,
    }
    let mut map: BTreeMap<i32, Acc> = BTreeMap::new();
    for r in data {
        let e = map.entry(r.year).or_default();
        e.records += 1;
        e.total += r.burned_area.unwrap_or(0.0);
        if let Some(p) = r.percent_burned {
            e.percents.push(p);
        }
    }
    map.into_iter()
        .map(|(year, acc)| YearTotalRow {
            year,
            records: acc.records,
            total_burned_area: format_number(acc.total, 2),
            avg_percent_burned: format_number(average(&acc.percents), 2),
        })
        .collect()
}

/// One unit's burn totals for a single year.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitBurn {
    pub full_name: String,
    pub biome: String,
    pub total_burned_area: f64,
    pub avg_percent_burned: f64,
}

/// Units most affected in `year`: group by (full name, biome), sum burned
/// area, average the percentage, largest totals first.
pub fn rank_units(data: &[UnifiedRecord], year: i32, limit: usize) -> Vec<UnitBurn> {
    #[derive(Default)]
    struct Acc {
        total: f64,
        percents: Vec<f64>,
    }
    let mut map: HashMap<(String, String), Acc> = HashMap::new();
    for r in data.iter().filter(|r| r.year == year) {
        let e = map
            .entry((r.full_name.clone(), r.biome.clone()))
            .or_default();
        e.total += r.burned_area.unwrap_or(0.0);
        if let Some(p) = r.percent_burned {
            e.percents.push(p);
        }
    }
    let mut ranked: Vec<UnitBurn> = map
        .into_iter()
        .map(|((full_name, biome), acc)| UnitBurn {
            full_name,
            biome,
            total_burned_area: acc.total,
            avg_percent_burned: average(&acc.percents),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.total_burned_area
            .partial_cmp(&a.total_burned_area)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    ranked.truncate(limit);
    ranked
}

pub fn generate_top_units(data: &[UnifiedRecord], years: &[i32], limit: usize) -> Vec<TopUnitRow> {
    let mut rows = Vec::new();
    for &year in years {
        for (idx, unit) in rank_units(data, year, limit).into_iter().enumerate() {
            rows.push(TopUnitRow {
                year,
                rank: idx + 1,
                full_name: unit.full_name,
                biome: unit.biome,
                total_burned_area: format_number(unit.total_burned_area, 2),
                avg_percent_burned: format_number(unit.avg_percent_burned, 2),
            });
        }
    }
    rows
}

/// Reference units with no fire record in any year.
pub fn generate_unburned_units(
    reference: &[ReferenceEntity],
    data: &[UnifiedRecord],
) -> Vec<UnburnedUnitRow> {
    let burned: HashSet<&str> = data.iter().map(|r| r.abbreviated_name.as_str()).collect();
    let mut rows: Vec<UnburnedUnitRow> = reference
        .iter()
        .filter(|u| !burned.contains(u.abbreviated_name.as_str()))
        .map(|u| UnburnedUnitRow {
            abbreviated_name: u.abbreviated_name.clone(),
            legal_acts: u.legal_acts.clone().unwrap_or_default(),
        })
        .collect();
    rows.sort_by(|a, b| a.abbreviated_name.cmp(&b.abbreviated_name));
    rows
}

pub fn generate_summary(
    data: &[UnifiedRecord],
    unify: &UnifyReport,
    unmatched_after_corrections: usize,
    ruleset_version: &str,
) -> SummaryStats {
    let units: HashSet<&str> = data.iter().map(|r| r.abbreviated_name.as_str()).collect();
    let years = totals_by_year(data);
    SummaryStats {
        ruleset_version: ruleset_version.to_string(),
        total_records: data.len(),
        total_years: years.len(),
        total_units_burned: units.len(),
        total_burned_area: years.values().sum(),
        rows_dropped_at_join: unify.rows_dropped(),
        unmatched_after_corrections,
    }
}
