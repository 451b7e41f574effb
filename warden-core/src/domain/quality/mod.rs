// warden-core/src/domain/quality/mod.rs

pub mod condition;
pub mod profile;
pub mod result;
pub mod rule;
pub mod zscore;

pub use condition::{Condition, Operator};
pub use profile::{DataProfile, ProfileSummary, RuleSuggestion};
pub use result::{QualityResult, ResultStatus, ScanAggregate, ScanReport};
pub use rule::{Dimension, Metric, QualityRule, RuleCheck, Severity};
pub use zscore::{MetricState, ZScoreCheck};
