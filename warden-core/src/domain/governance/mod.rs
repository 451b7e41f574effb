// warden-core/src/domain/governance/mod.rs

pub mod cache;
pub mod masking;
pub mod matcher;
pub mod pii;
pub mod remediation;
pub mod tokens;
pub mod validator;

// Re-exports
pub use cache::PiiRuleCache;
pub use masking::MaskingStrategy;
pub use matcher::{Classification, CompiledPiiRule, MatcherConfig, RuleSet, classify};
pub use pii::{PiiRuleDefinition, ProtectionRequirement, SensitivityLevel};
pub use remediation::{Remediation, RemediationAction, RemediationStep};
pub use validator::{FixVerdict, ProtectionSignal, ValidatorConfig, evaluate_samples};
