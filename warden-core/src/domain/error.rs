// warden-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid rule '{rule}': {reason}")]
    #[diagnostic(
        code(warden::domain::invalid_rule),
        help("Check the rule payload against its kind (threshold, sql, pattern, freshness, comparison, anomaly).")
    )]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid regex in rule '{rule}': {reason}")]
    #[diagnostic(code(warden::domain::regex))]
    InvalidRegex { rule: String, reason: String },

    #[error("Invalid condition '{0}'")]
    #[diagnostic(
        code(warden::domain::condition),
        help("Expected '<operator> <number>', e.g. '< 0.05' or '>= 100'.")
    )]
    InvalidCondition(String),

    #[error("Issue '{0}' not found")]
    #[diagnostic(code(warden::domain::issue_not_found))]
    IssueNotFound(String),

    #[error("Rule '{0}' not found")]
    #[diagnostic(code(warden::domain::rule_not_found))]
    RuleNotFound(String),

    #[error("Asset '{0}' not found in catalog")]
    #[diagnostic(code(warden::domain::asset_not_found))]
    AssetNotFound(String),

    #[error("Data source '{0}' is not registered")]
    #[diagnostic(code(warden::domain::source_not_found))]
    SourceNotFound(String),

    #[error("Cannot {action} an issue that is {status}")]
    #[diagnostic(code(warden::domain::transition))]
    InvalidTransition { action: String, status: String },

    #[error("Resolution of issue '{issue}' rejected: {reason}")]
    #[diagnostic(
        code(warden::domain::resolve_rejected),
        help("The underlying data still fails validation. Fix the data, then resolve again.")
    )]
    ResolveRejected { issue: String, reason: String },
}
