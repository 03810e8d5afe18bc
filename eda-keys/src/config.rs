//! Configuration for key search runs.
//!
//! A [`SearchConfig`] is passed explicitly to every run; nothing is read from
//! ambient global state. Configurations can be built in code with the
//! `with_*` setters or loaded from JSON:
//!
//! ```rust
//! use eda_keys::config::{SearchConfig, ThresholdPolicy};
//!
//! let config = SearchConfig::from_json_str(
//!     r#"{ "max_columns": 3, "threshold": 0.9999, "excluded_columns": ["row_version"] }"#,
//! )
//! .unwrap();
//! assert_eq!(config.max_columns, 3);
//! assert_eq!(config.threshold_policy, ThresholdPolicy::NonStrict);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EdaError, Result};
use crate::sampling::SampleTier;

/// Default uniqueness ratio a combination must reach to survive a tier.
pub const DEFAULT_THRESHOLD: f64 = 0.99999;

/// Default largest combination size searched.
pub const DEFAULT_MAX_COLUMNS: usize = 5;

/// How the uniqueness ratio is compared against the threshold at each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// `ratio >= threshold` at every tier.
    #[default]
    NonStrict,
    /// `ratio > threshold` at every tier.
    Strict,
    /// `>=` on the small tier and `>` on the medium and large tiers.
    Legacy,
}

impl ThresholdPolicy {
    /// Returns whether `ratio` passes `threshold` at the given tier.
    pub fn passes(&self, tier: SampleTier, ratio: f64, threshold: f64) -> bool {
        match (self, tier) {
            (Self::NonStrict, _) | (Self::Legacy, SampleTier::Small) => ratio >= threshold,
            (Self::Strict, _) | (Self::Legacy, _) => ratio > threshold,
        }
    }
}

/// When tier samples are fetched from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFetch {
    /// Fetch a tier the first time a combination needs it and keep it for the run.
    #[default]
    Lazy,
    /// Fetch all three tiers before the first combination is evaluated.
    Eager,
}

/// Row caps of the three sample tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSizes {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

impl Default for TierSizes {
    fn default() -> Self {
        Self {
            small: 10_000,
            medium: 100_000,
            large: 1_000_000,
        }
    }
}

impl TierSizes {
    /// Creates tier sizes from explicit row caps.
    pub fn new(small: usize, medium: usize, large: usize) -> Self {
        Self {
            small,
            medium,
            large,
        }
    }

    /// Returns the row cap of a tier.
    pub fn row_cap(&self, tier: SampleTier) -> usize {
        match tier {
            SampleTier::Small => self.small,
            SampleTier::Medium => self.medium,
            SampleTier::Large => self.large,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.small == 0 {
            return Err(EdaError::Configuration(
                "small tier must sample at least one row".to_string(),
            ));
        }
        if !(self.small < self.medium && self.medium < self.large) {
            return Err(EdaError::Configuration(format!(
                "tier sizes must be strictly increasing, got {} / {} / {}",
                self.small, self.medium, self.large
            )));
        }
        Ok(())
    }
}

/// Configuration of a progressive key search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Smallest combination size searched
    pub min_columns: usize,
    /// Largest combination size searched (K_max)
    pub max_columns: usize,
    /// Uniqueness ratio a combination must reach
    pub threshold: f64,
    /// How ratios are compared to the threshold per tier
    pub threshold_policy: ThresholdPolicy,
    /// Row caps of the small, medium and large samples
    pub tiers: TierSizes,
    /// When samples are fetched
    pub sample_fetch: SampleFetch,
    /// Number of combinations evaluated concurrently within a tier
    pub concurrency: usize,
    /// Column names never used in the search
    pub excluded_columns: Vec<String>,
    /// Regular expressions; matching column names are never used in the search
    pub excluded_column_patterns: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_columns: 1,
            max_columns: DEFAULT_MAX_COLUMNS,
            threshold: DEFAULT_THRESHOLD,
            threshold_policy: ThresholdPolicy::default(),
            tiers: TierSizes::default(),
            sample_fetch: SampleFetch::default(),
            concurrency: num_cpus::get().max(1),
            excluded_columns: Vec::new(),
            excluded_column_patterns: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Sets the range of combination sizes searched.
    pub fn with_column_range(mut self, min_columns: usize, max_columns: usize) -> Self {
        self.min_columns = min_columns;
        self.max_columns = max_columns;
        self
    }

    /// Sets the largest combination size searched.
    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns;
        self
    }

    /// Sets the uniqueness threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the threshold comparison policy.
    pub fn with_threshold_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    /// Sets the sample tier sizes.
    pub fn with_tiers(mut self, tiers: TierSizes) -> Self {
        self.tiers = tiers;
        self
    }

    /// Sets when samples are fetched.
    pub fn with_sample_fetch(mut self, sample_fetch: SampleFetch) -> Self {
        self.sample_fetch = sample_fetch;
        self
    }

    /// Sets the number of combinations evaluated concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Excludes a column from the search by exact name.
    pub fn exclude_column(mut self, column: impl Into<String>) -> Self {
        self.excluded_columns.push(column.into());
        self
    }

    /// Excludes every column whose name matches the regular expression.
    pub fn exclude_column_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.excluded_column_patterns.push(pattern.into());
        self
    }

    /// Returns whether a ratio survives the given tier.
    pub fn passes(&self, tier: SampleTier, ratio: f64) -> bool {
        self.threshold_policy.passes(tier, ratio, self.threshold)
    }

    /// Checks the configuration for inconsistent values.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(EdaError::Configuration(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.min_columns == 0 || self.min_columns > self.max_columns {
            return Err(EdaError::Configuration(format!(
                "combination sizes must satisfy 1 <= min_columns <= max_columns, got {}..={}",
                self.min_columns, self.max_columns
            )));
        }
        if self.concurrency == 0 {
            return Err(EdaError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.tiers.validate()?;
        self.compiled_exclusion_patterns()?;
        Ok(())
    }

    /// Compiles the exclusion patterns.
    pub fn compiled_exclusion_patterns(&self) -> Result<Vec<Regex>> {
        self.excluded_column_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    EdaError::Configuration(format!("invalid exclusion pattern '{pattern}': {e}"))
                })
            })
            .collect()
    }

    /// Removes excluded columns from an eligible list, keeping its order.
    pub fn filter_excluded(&self, columns: Vec<String>) -> Result<Vec<String>> {
        let patterns = self.compiled_exclusion_patterns()?;
        Ok(columns
            .into_iter()
            .filter(|column| !self.excluded_columns.iter().any(|e| e == column))
            .filter(|column| !patterns.iter().any(|p| p.is_match(column)))
            .collect())
    }
}

/// Configuration of the DataFusion sessions used for sampling and grouping.
#[derive(Debug, Clone)]
pub struct HarvestContextConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
    /// Share of `max_memory` handed to the memory pool, in `(0, 1]`
    pub memory_fraction: f64,
}

impl Default for HarvestContextConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get().max(1),
            // 4GB, the large tier alone can take ~2GB. Capped on 32-bit targets.
            max_memory: usize::try_from(4_u64 * 1024 * 1024 * 1024).unwrap_or(usize::MAX),
            memory_fraction: 0.9,
        }
    }
}

impl HarvestContextConfig {
    /// Checks the session settings.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.target_partitions == 0 {
            return Err(EdaError::Configuration(
                "batch_size and target_partitions must be at least 1".to_string(),
            ));
        }
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err(EdaError::Configuration(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            )));
        }
        Ok(())
    }

    /// Bytes the memory pool may hand out: `max_memory * memory_fraction`.
    pub fn memory_pool_size(&self) -> usize {
        (self.max_memory as f64 * self.memory_fraction) as usize
    }
}
