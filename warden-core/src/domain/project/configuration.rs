// warden-core/src/domain/project/configuration.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::domain::governance::pii::PiiRuleDefinition;
use crate::domain::quality::rule::QualityRule;

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct ProjectConfig {
    #[validate(length(min = 1, message = "Project name cannot be empty"))]
    pub name: String,

    /// DuckDB file holding the governed data.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(rename = "source-id", alias = "source_id", default = "default_source_id")]
    pub source_id: String,

    #[validate(range(min = 1, max = 256))]
    #[serde(
        rename = "max-connections",
        alias = "max_connections",
        default = "default_max_connections"
    )]
    pub max_connections: usize,

    #[serde(rename = "state-path", alias = "state_path", default = "default_state_path")]
    pub state_path: String,

    #[serde(rename = "config-paths", alias = "config_paths", default = "default_config_paths")]
    pub config_paths: Vec<String>,

    #[validate(nested)]
    #[serde(default)]
    pub policy: PolicyConfig,

    #[validate(nested)]
    #[serde(default)]
    pub profiling: ProfilingConfig,

    #[validate(nested)]
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Filled from `config/pii_rules.yml`; built-ins when nothing is declared.
    #[serde(default)]
    pub pii_rules: Vec<PiiRuleDefinition>,

    /// Filled from `config/quality.yml` and `rules.d/`.
    #[serde(default)]
    pub quality_rules: Vec<QualityRule>,
}

impl ProjectConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            database: default_database(),
            source_id: default_source_id(),
            max_connections: default_max_connections(),
            state_path: default_state_path(),
            config_paths: default_config_paths(),
            policy: PolicyConfig::default(),
            profiling: ProfilingConfig::default(),
            timeouts: TimeoutConfig::default(),
            pii_rules: vec![],
            quality_rules: vec![],
        }
    }

    /// Definitions exactly as the project files declare them.
    pub fn declared_rules(&self) -> DeclaredRules {
        DeclaredRules {
            pii_rules: self.pii_rules.clone(),
            quality_rules: self.quality_rules.clone(),
        }
    }
}

/// Rule definitions taken from the project files at one point in time. Kept with the state so
/// the next session can tell which definitions the files changed.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct DeclaredRules {
    #[serde(default)]
    pub pii_rules: Vec<PiiRuleDefinition>,
    #[serde(default)]
    pub quality_rules: Vec<QualityRule>,
}

impl DeclaredRules {
    pub fn pii_rule(&self, pii_type: &str) -> Option<&PiiRuleDefinition> {
        self.pii_rules.iter().find(|r| r.pii_type == pii_type)
    }

    pub fn quality_rule(&self, id: &str) -> Option<&QualityRule> {
        self.quality_rules.iter().find(|r| r.id == id)
    }
}

fn default_database() -> String {
    "warden.duckdb".to_string()
}
fn default_source_id() -> String {
    "warehouse".to_string()
}
fn default_max_connections() -> usize {
    4
}
fn default_state_path() -> String {
    ".warden/state.json".to_string()
}
fn default_config_paths() -> Vec<String> {
    vec!["config".to_string()]
}

// --- PII POLICY ---

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
pub struct PolicyConfig {
    /// Classification cut-off on the 0..100 confidence scale.
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Share of sampled values that must look protected for a fix to count.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_protected_ratio")]
    pub protected_ratio: f64,

    #[validate(range(min = 0.0, max = 8.0))]
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,

    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default = "default_boost_k")]
    pub boost_k: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            protected_ratio: default_protected_ratio(),
            entropy_threshold: default_entropy_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_samples: default_max_samples(),
            boost_k: default_boost_k(),
        }
    }
}

impl PolicyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.clamp(1, 60))
    }
}

fn default_min_confidence() -> f64 {
    70.0
}
fn default_protected_ratio() -> f64 {
    0.8
}
fn default_entropy_threshold() -> f64 {
    4.5
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_max_samples() -> usize {
    10
}
fn default_boost_k() -> f64 {
    10.0
}

// --- PROFILING ---

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
pub struct ProfilingConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_null_rate_threshold")]
    pub null_rate_threshold: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_identifier_unique_min")]
    pub identifier_unique_min: f64,

    #[validate(range(min = 0.0))]
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    #[validate(range(min = 0.0))]
    #[serde(default = "default_cv_threshold")]
    pub cv_threshold: f64,

    #[serde(default = "default_freshness_max_age_secs")]
    pub freshness_max_age_secs: u64,

    #[validate(range(max = 50))]
    #[serde(default = "default_sample_values")]
    pub sample_values: usize,

    #[validate(nested)]
    #[serde(default)]
    pub weights: DimensionWeights,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            null_rate_threshold: default_null_rate_threshold(),
            identifier_unique_min: default_identifier_unique_min(),
            z_threshold: default_z_threshold(),
            cv_threshold: default_cv_threshold(),
            freshness_max_age_secs: default_freshness_max_age_secs(),
            sample_values: default_sample_values(),
            weights: DimensionWeights::default(),
        }
    }
}

fn default_null_rate_threshold() -> f64 {
    0.2
}
fn default_identifier_unique_min() -> f64 {
    0.95
}
fn default_z_threshold() -> f64 {
    3.0
}
fn default_cv_threshold() -> f64 {
    3.0
}
fn default_freshness_max_age_secs() -> u64 {
    86_400
}
fn default_sample_values() -> usize {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
pub struct DimensionWeights {
    #[validate(range(min = 0.0, max = 1.0))]
    pub completeness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub uniqueness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub validity: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub consistency: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub accuracy: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub freshness: f64,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            uniqueness: 0.20,
            validity: 0.20,
            consistency: 0.15,
            accuracy: 0.10,
            freshness: 0.10,
        }
    }
}

// --- TIMEOUTS ---

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
pub struct TimeoutConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_rule_timeout_ms")]
    pub rule_timeout_ms: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_profile_timeout_ms")]
    pub profile_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            rule_timeout_ms: default_rule_timeout_ms(),
            sample_timeout_ms: default_sample_timeout_ms(),
            profile_timeout_ms: default_profile_timeout_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn rule(&self) -> Duration {
        Duration::from_millis(self.rule_timeout_ms)
    }
    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }
    pub fn profile(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }
}

fn default_rule_timeout_ms() -> u64 {
    30_000
}
fn default_sample_timeout_ms() -> u64 {
    10_000
}
fn default_profile_timeout_ms() -> u64 {
    60_000
}
