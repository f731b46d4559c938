//! Declarative correction rules.
//!
//! A rule is `UPDATE <table> SET set.column = set.value WHERE when.column =
//! when.equals`, optionally restricted to one source year. Rule sets are
//! versioned TOML documents; the set shipped in `rules/corrections.toml` is
//! compiled in as the default.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const BUILTIN_RULES: &str = include_str!("../rules/corrections.toml");

/// Which yearly tables a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ScopeRepr", into = "ScopeRepr")]
pub enum RuleScope {
    #[default]
    All,
    Year(i32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScopeRepr {
    Year(i32),
    Keyword(String),
}

impl TryFrom<ScopeRepr> for RuleScope {
    type Error = String;

    fn try_from(repr: ScopeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ScopeRepr::Year(year) => Ok(RuleScope::Year(year)),
            ScopeRepr::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(RuleScope::All),
            ScopeRepr::Keyword(k) => Err(format!("unknown rule scope `{}`", k)),
        }
    }
}

impl From<RuleScope> for ScopeRepr {
    fn from(scope: RuleScope) -> Self {
        match scope {
            RuleScope::All => ScopeRepr::Keyword("all".to_string()),
            RuleScope::Year(year) => ScopeRepr::Year(year),
        }
    }
}

impl RuleScope {
    pub fn applies_to(self, year: i32) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Year(y) => y == year,
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::All => f.write_str("all"),
            RuleScope::Year(y) => write!(f, "{}", y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub equals: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRule {
    pub name: String,
    #[serde(default)]
    pub scope: RuleScope,
    pub when: Condition,
    pub set: Assignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    #[serde(default)]
    pub rules: Vec<CorrectionRule>,
}

impl RuleSet {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "failed to read rules file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let rules: RuleSet = toml::from_str(content)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Rules applicable to `year`, in declaration order.
    pub fn rules_for(&self, year: i32) -> impl Iterator<Item = &CorrectionRule> {
        self.rules.iter().filter(move |r| r.scope.applies_to(year))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            let invalid = |reason: &str| PipelineError::InvalidRule {
                name: rule.name.clone(),
                reason: reason.to_string(),
            };
            if rule.name.trim().is_empty() {
                return Err(invalid("rule name is empty"));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(invalid("duplicate rule name"));
            }
            if rule.when.column.trim().is_empty() || rule.set.column.trim().is_empty() {
                return Err(invalid("column name is empty"));
            }
            if rule.when.column == rule.set.column && rule.when.equals == rule.set.value {
                return Err(invalid("replacement equals the matched value"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_parse() {
        let rules = RuleSet::builtin().unwrap();
        assert_eq!(rules.version, "2024-06");
        assert_eq!(rules.rules.len(), 7);
        let biome = rules
            .rules
            .iter()
            .find(|r| r.set.column == "Bioma")
            .unwrap();
        assert_eq!(biome.scope, RuleScope::Year(2020));
        assert_eq!(biome.set.value, "MATA ATLANTICA");
        // the trailing space is part of the matched value
        assert!(rules
            .rules
            .iter()
            .any(|r| r.when.equals == "PARNA DA SERRA DOS ORGAOS "));
    }

    #[test]
    fn year_scoped_rules_are_filtered() {
        let rules = RuleSet::builtin().unwrap();
        assert_eq!(rules.rules_for(2020).count(), 7);
        assert_eq!(rules.rules_for(2021).count(), 6);
    }

    #[test]
    fn scope_defaults_to_all() {
        let rules = RuleSet::from_toml_str(
            r#"
            version = "test"
            [[rules]]
            name = "a"
            when = { column = "UC", equals = "X" }
            set = { column = "UC", value = "Y" }
            "#,
        )
        .unwrap();
        assert_eq!(rules.rules[0].scope, RuleScope::All);
    }

    #[test]
    fn bad_scope_is_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
            version = "test"
            [[rules]]
            name = "a"
            scope = "sometimes"
            when = { column = "UC", equals = "X" }
            set = { column = "UC", value = "Y" }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Toml(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
            version = "test"
            [[rules]]
            name = "a"
            when = { column = "UC", equals = "X" }
            set = { column = "UC", value = "Y" }
            [[rules]]
            name = "a"
            when = { column = "UC", equals = "Z" }
            set = { column = "UC", value = "Y" }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRule { .. }));
    }

    #[test]
    fn toml_round_trip_keeps_scopes() {
        let rules = RuleSet::builtin().unwrap();
        let text = rules.to_toml_string().unwrap();
        assert_eq!(RuleSet::from_toml_str(&text).unwrap(), rules);
    }
}
