use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::rules::RuleSet;
use crate::schema::SchemaVariant;

pub const DEFAULT_CONFIG_FILE: &str = "uc-fire.toml";
const YEAR_PLACEHOLDER: &str = "{year}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the raw CSV exports.
    pub data_dir: PathBuf,
    /// Directory for overwrite-mode table snapshots.
    pub store_dir: PathBuf,
    /// Directory for report files.
    pub output_dir: PathBuf,
    pub reference_file: String,
    /// File name of a yearly sheet; `{year}` is substituted.
    pub yearly_file_pattern: String,
    pub years: Vec<i32>,
    /// Correction ruleset; the compiled-in set is used when absent.
    pub rules_file: Option<PathBuf>,
    /// Units listed per year in the top-units report.
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: PathBuf::from("data"),
            store_dir: PathBuf::from("store"),
            output_dir: PathBuf::from("reports"),
            reference_file: "dadosgerais_uc.csv".to_string(),
            yearly_file_pattern: "area_atingida_{year}.csv".to_string(),
            years: (2018..=2023).collect(),
            rules_file: None,
            top_n: 5,
        }
    }
}

impl PipelineConfig {
    /// Read the config at `path`, or `uc-fire.toml` in the working
    /// directory when it exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&config_path).map_err(|e| {
            PipelineError::Config(format!(
                "failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.years.is_empty() {
            return Err(PipelineError::Config("no years configured".to_string()));
        }
        for &year in &self.years {
            SchemaVariant::for_year(year)?;
        }
        if !self.yearly_file_pattern.contains(YEAR_PLACEHOLDER) {
            return Err(PipelineError::Config(format!(
                "yearly_file_pattern must contain {}",
                YEAR_PLACEHOLDER
            )));
        }
        if self.top_n == 0 {
            return Err(PipelineError::Config("top_n must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn reference_path(&self) -> PathBuf {
        self.data_dir.join(&self.reference_file)
    }

    pub fn yearly_path(&self, year: i32) -> PathBuf {
        self.data_dir
            .join(self.yearly_file_pattern.replace(YEAR_PLACEHOLDER, &year.to_string()))
    }

    pub fn load_rules(&self) -> Result<RuleSet> {
        match &self.rules_file {
            Some(path) => RuleSet::load(path),
            None => RuleSet::builtin(),
        }
    }
}
