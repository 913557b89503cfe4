//! Pipeline configuration: options and region presets.
//!
//! Configuration comes from, in increasing priority:
//! 1. Built-in defaults ([`PipelineConfig::default`])
//! 2. A JSON file ([`PipelineConfig::from_file`])
//! 3. Environment variables, `.env` included ([`PipelineOptions::with_env_overrides`])
//!
//! ```json
//! {
//!   "regions": [
//!     { "label": "Andes", "members": ["Bolivia", "Chile", "Ecuador", "Peru"] }
//!   ],
//!   "options": { "trend_degree": 3 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::models::{CODE, EMISSIONS_TOTAL, ENTITY, YEAR};
use crate::transform::aggregate::{default_reductions, ColumnReduction};

/// Overrides `PipelineOptions::group_key`.
pub const ENV_GROUP_KEY: &str = "CLIMALIGN_GROUP_KEY";
/// Overrides `PipelineOptions::trend_degree`.
pub const ENV_TREND_DEGREE: &str = "CLIMALIGN_TREND_DEGREE";

/// Highest accepted trendline degree.
pub const MAX_TREND_DEGREE: usize = 12;

// =============================================================================
// Options
// =============================================================================

/// Options for an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Period column the joined table is grouped by
    pub group_key: String,

    /// Columns the temperature and emissions tables are joined on
    pub join_keys: Vec<String>,

    /// Reduction applied to each measure column when grouping
    pub reductions: Vec<ColumnReduction>,

    /// Degree of the per-region trendline
    pub trend_degree: usize,

    /// Regression predictor column in the summary table; the group key when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression_x: Option<String>,

    /// Regression response column in the summary table
    pub regression_y: String,

    /// Also deduplicate and fill the emissions table before alignment
    pub clean_emissions: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            group_key: YEAR.to_string(),
            join_keys: vec![ENTITY.to_string(), CODE.to_string(), YEAR.to_string()],
            reductions: default_reductions(),
            trend_degree: 4,
            regression_x: None,
            regression_y: EMISSIONS_TOTAL.to_string(),
            clean_emissions: false,
        }
    }
}

impl PipelineOptions {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `CLIMALIGN_*` variables, loading `.env` first when present.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_GROUP_KEY) {
            self.group_key = key.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TREND_DEGREE) {
            self.trend_degree = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_TREND_DEGREE.to_string(),
                message: format!("expected a positive integer, got '{}'", raw),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Regression predictor: `regression_x`, or the group key when unset.
    pub fn predictor(&self) -> &str {
        self.regression_x.as_deref().unwrap_or(&self.group_key)
    }

    /// Whether `column` survives grouping into the summary table.
    fn in_summary(&self, column: &str) -> bool {
        column == self.group_key || self.reductions.iter().any(|r| r.column == column)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.trend_degree == 0 || self.trend_degree > MAX_TREND_DEGREE {
            return Err(invalid(
                "trend_degree",
                &format!("must be between 1 and {}", MAX_TREND_DEGREE),
            ));
        }
        if self.join_keys.is_empty() {
            return Err(invalid("join_keys", "at least one join key is required"));
        }
        if self.group_key.trim().is_empty() {
            return Err(invalid("group_key", "must not be empty"));
        }
        if !self.in_summary(self.predictor()) {
            return Err(invalid(
                "regression_x",
                &format!("'{}' is neither the group key nor a reduced column", self.predictor()),
            ));
        }
        if !self.in_summary(&self.regression_y) {
            return Err(invalid(
                "regression_y",
                &format!("'{}' is neither the group key nor a reduced column", self.regression_y),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Regions
// =============================================================================

/// A labelled set of region identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub label: String,
    pub members: Vec<String>,
}

impl RegionSpec {
    pub fn new<I, S>(label: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `LABEL=A,B,C`.
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "region".to_string(),
            message: format!("{} in '{}'", message, raw),
        };

        let (label, members) = raw.split_once('=').ok_or_else(|| invalid("expected LABEL=MEMBER,..."))?;
        let label = label.trim();
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        let members: Vec<&str> = members.split(',').map(str::trim).filter(|m| !m.is_empty()).collect();
        let spec = Self::new(label, members);
        spec.validate()?;
        Ok(spec)
    }

    pub fn member_set(&self) -> HashSet<String> {
        self.members.iter().cloned().collect()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.members.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("regions.{}", self.label),
                message: "region set must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub const NORTH_AMERICA: &str = "North America";
pub const SOUTH_AMERICA: &str = "South America";
pub const ALL_AMERICAS: &str = "All Americas";

fn north_america() -> Vec<&'static str> {
    vec![
        "Antigua and Barbuda",
        "Bahamas",
        "Belize",
        "Costa Rica",
        "Dominican Republic",
        "El Salvador",
        "Haiti",
        "Honduras",
        "Jamaica",
        "Canada",
        "Cuba",
        "Mexico",
        "Nicaragua",
        "Panama",
        "Trinidad and Tobago",
        "United States",
    ]
}

fn south_america() -> Vec<&'static str> {
    vec![
        "Argentina",
        "Bolivia",
        "Brazil",
        "Chile",
        "Ecuador",
        "Guyana",
        "Colombia",
        "Paraguay",
        "Peru",
        "Suriname",
        "Uruguay",
        "Venezuela",
        "Guatemala",
    ]
}

/// Built-in region presets.
pub fn presets() -> Vec<RegionSpec> {
    let mut all = north_america();
    all.extend(south_america());
    vec![
        RegionSpec::new(NORTH_AMERICA, north_america()),
        RegionSpec::new(SOUTH_AMERICA, south_america()),
        RegionSpec::new(ALL_AMERICAS, all),
    ]
}

/// Look up a built-in preset by label, ignoring case.
pub fn preset(label: &str) -> ConfigResult<RegionSpec> {
    presets()
        .into_iter()
        .find(|p| p.label.eq_ignore_ascii_case(label.trim()))
        .ok_or_else(|| ConfigError::UnknownRegion(label.to_string()))
}

// =============================================================================
// Full configuration
// =============================================================================

/// Regions to analyze plus run options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub options: PipelineOptions,
}

fn default_regions() -> Vec<RegionSpec> {
    presets()
        .into_iter()
        .filter(|p| p.label != ALL_AMERICAS)
        .collect()
}

impl Default for PipelineConfig {
    /// North and South America with default options.
    fn default() -> Self {
        Self {
            regions: default_regions(),
            options: PipelineOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.options.validate()?;
        let mut seen = HashSet::new();
        for region in &self.regions {
            region.validate()?;
            if !seen.insert(region.label.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "regions".to_string(),
                    message: format!("duplicate region label '{}'", region.label),
                });
            }
        }
        Ok(())
    }
}
