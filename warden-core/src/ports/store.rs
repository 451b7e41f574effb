// warden-core/src/ports/store.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::governance::pii::PiiRuleDefinition;
use crate::domain::issue::{IssueFilter, IssueKey, QualityIssue};
use crate::domain::quality::result::QualityResult;
use crate::domain::quality::rule::QualityRule;
use crate::error::Result;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn quality_rules(&self) -> Result<Vec<QualityRule>>;

    async fn quality_rule(&self, id: &str) -> Result<Option<QualityRule>>;

    /// Insert or replace by id.
    async fn put_quality_rule(&self, rule: QualityRule) -> Result<()>;

    async fn pii_rules(&self) -> Result<Vec<PiiRuleDefinition>>;

    async fn pii_rule(&self, pii_type: &str) -> Result<Option<PiiRuleDefinition>>;

    /// Insert or replace by pii_type.
    async fn put_pii_rule(&self, rule: PiiRuleDefinition) -> Result<()>;

    /// Bumped on every PII rule write. Lets caches notice mutations they did not make.
    fn revision(&self) -> u64;
}

/// Written only by the issue lifecycle manager.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<QualityIssue>>;

    async fn find_by_key(&self, key: &IssueKey) -> Result<Option<QualityIssue>>;

    async fn upsert(&self, issue: QualityIssue) -> Result<()>;

    async fn list(&self, filter: &IssueFilter) -> Result<Vec<QualityIssue>>;
}

/// Append-only.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append(&self, result: QualityResult) -> Result<()>;

    /// Oldest first.
    async fn history(&self, rule_id: &str) -> Result<Vec<QualityResult>>;

    async fn latest(&self, rule_id: &str) -> Result<Option<QualityResult>>;
}
