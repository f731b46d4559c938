use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::rules::{CorrectionRule, RuleSet};
use crate::sheet::Sheet;
use crate::types::FireRow;

/// What one rule did to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub table: String,
    pub year: i32,
    pub matched: usize,
    pub changed: usize,
    /// The table lacks one of the rule's columns.
    pub skipped: bool,
}

impl RuleOutcome {
    pub fn is_inert(&self) -> bool {
        self.skipped || self.matched == 0
    }
}

/// Apply every rule scoped to `year`, in order, to `sheet`.
///
/// A rule matching nothing, or naming a column this year's sheet does not
/// have, leaves the sheet untouched and is reported as inert.
pub fn apply_rules(
    sheet: &mut Sheet<FireRow>,
    year: i32,
    rules: &RuleSet,
) -> Result<Vec<RuleOutcome>> {
    let mut outcomes = Vec::new();
    for rule in rules.rules_for(year) {
        let outcome = apply_rule(sheet, year, rule)?;
        if outcome.is_inert() {
            debug!(
                rule = %rule.name,
                table = sheet.name(),
                skipped = outcome.skipped,
                "correction rule matched no rows"
            );
        } else {
            info!(
                rule = %rule.name,
                table = sheet.name(),
                matched = outcome.matched,
                changed = outcome.changed,
                "applied correction rule"
            );
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn apply_rule(sheet: &mut Sheet<FireRow>, year: i32, rule: &CorrectionRule) -> Result<RuleOutcome> {
    let mut outcome = RuleOutcome {
        rule: rule.name.clone(),
        table: sheet.name().to_string(),
        year,
        matched: 0,
        changed: 0,
        skipped: false,
    };
    if !sheet.has_column(&rule.when.column) || !sheet.has_column(&rule.set.column) {
        outcome.skipped = true;
        return Ok(outcome);
    }
    let count = sheet.update_where(
        &rule.when.column,
        &rule.when.equals,
        &rule.set.column,
        &rule.set.value,
    )?;
    outcome.matched = count.matched;
    outcome.changed = count.changed;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RawSheet;
    use crate::rules::RuleSet;
    use std::path::Path;

    fn sheet(name: &str, with_biome: bool, rows: &[(&str, &str)]) -> Sheet<FireRow> {
        let mut csv = String::from(if with_biome {
            "UC,Area_queimada,Perc_UC,Bioma\n"
        } else {
            "UC,Area_queimada,Perc_UC\n"
        });
        for (uc, biome) in rows {
            csv.push_str(&format!("\"{}\",1.0,0.5", uc));
            if with_biome {
                csv.push_str(&format!(",{}", biome));
            }
            csv.push('\n');
        }
        let raw = RawSheet::from_reader(Path::new("incendio.csv"), csv.as_bytes()).unwrap();
        Sheet::from_raw(name, &raw).unwrap()
    }

    fn names(sheet: &Sheet<FireRow>) -> Vec<&str> {
        sheet.rows().iter().map(|r| r.facility.as_str()).collect()
    }

    #[test]
    fn misspelled_variants_converge() {
        let rules = RuleSet::builtin().unwrap();
        let mut s = sheet(
            "incendio_2019",
            true,
            &[
                ("APA BACIA DO PARAIBA DO SUL", "MATA ATLANTICA"),
                ("APA DA BACIA PARAIBA DO SUL", "MATA ATLANTICA"),
                ("PARNA DAS SEMPRE VIVAS", "CERRADO"),
                ("PARNA DA SERRA DOS ORGAOS ", "MATA ATLANTICA"),
                ("REBIO DAS NASCENTES DA SERRA DO CACHIMBO", "AMAZONIA"),
            ],
        );
        apply_rules(&mut s, 2019, &rules).unwrap();
        assert_eq!(
            names(&s),
            vec![
                "APA BACIA PARAIBA DO SUL",
                "APA BACIA PARAIBA DO SUL",
                "PARNA DAS SEMPRE-VIVAS",
                "PARNA DA SERRA DOS ORGAOS",
                "REBIO NASCENTES DA SERRA DO CACHIMBO",
            ]
        );
    }

    #[test]
    fn applying_twice_is_a_noop() {
        let rules = RuleSet::builtin().unwrap();
        let mut s = sheet(
            "incendio_2020",
            true,
            &[("APA DA BACIA DO RIO PARNAIBA DO SUL", "CERRADO"), ("PARNA X", "PAMPA")],
        );
        apply_rules(&mut s, 2020, &rules).unwrap();
        let once = s.clone();
        let second = apply_rules(&mut s, 2020, &rules).unwrap();
        assert_eq!(s, once);
        assert!(second.iter().all(|o| o.changed == 0));
    }

    #[test]
    fn biome_fix_is_scoped_to_2020() {
        let rules = RuleSet::builtin().unwrap();
        let mut y2020 = sheet("incendio_2020", true, &[("APA DA BACIA DO RIO PARNAIBA DO SUL", "CERRADO")]);
        let mut y2019 = sheet("incendio_2019", true, &[("APA BACIA PARAIBA DO SUL", "CERRADO")]);
        apply_rules(&mut y2020, 2020, &rules).unwrap();
        apply_rules(&mut y2019, 2019, &rules).unwrap();
        assert_eq!(y2020.rows()[0].biome.as_deref(), Some("MATA ATLANTICA"));
        assert_eq!(y2019.rows()[0].biome.as_deref(), Some("CERRADO"));
    }

    #[test]
    fn rule_on_missing_column_is_inert() {
        let rules = RuleSet::builtin().unwrap();
        let mut s = sheet("incendio_2020", false, &[("APA BACIA PARAIBA DO SUL", "")]);
        let outcomes = apply_rules(&mut s, 2020, &rules).unwrap();
        let biome = outcomes
            .iter()
            .find(|o| o.rule == "apa-paraiba-do-sul-biome-2020")
            .unwrap();
        assert!(biome.skipped);
        assert!(biome.is_inert());
        assert_eq!(s.columns().len(), 3);
        assert_eq!(s.rows()[0].biome, None);
    }

    #[test]
    fn unmatched_rules_report_zero() {
        let rules = RuleSet::builtin().unwrap();
        let mut s = sheet("incendio_2023", false, &[("PARNA X", "")]);
        let outcomes = apply_rules(&mut s, 2023, &rules).unwrap();
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(RuleOutcome::is_inert));
    }
}
