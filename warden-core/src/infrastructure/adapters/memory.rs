// warden-core/src/infrastructure/adapters/memory.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::catalog::{ColumnClassification, ColumnRef};
use crate::domain::governance::pii::PiiRuleDefinition;
use crate::domain::issue::{IssueFilter, IssueKey, QualityIssue};
use crate::domain::project::DeclaredRules;
use crate::domain::quality::result::QualityResult;
use crate::domain::quality::rule::QualityRule;
use crate::error::Result;
use crate::ports::store::{IssueStore, ResultStore, RuleStore};

/// Everything the store holds, in a shape that serializes to the state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub quality_rules: Vec<QualityRule>,
    #[serde(default)]
    pub pii_rule_definitions: Vec<PiiRuleDefinition>,
    #[serde(default)]
    pub quality_results: Vec<QualityResult>,
    #[serde(default)]
    pub quality_issues: Vec<QualityIssue>,
    #[serde(default)]
    pub classifications: Vec<(ColumnRef, ColumnClassification)>,
    #[serde(default)]
    pub declared: DeclaredRules,
}

/// Rule, issue and result store held in memory, snapshotted to disk by the caller.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    revision: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
            revision: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    pub async fn set_classifications(
        &self,
        classifications: Vec<(ColumnRef, ColumnClassification)>,
    ) {
        self.state.write().await.classifications = classifications;
    }

    /// What the project files declared when the state was last saved.
    pub async fn declared(&self) -> DeclaredRules {
        self.state.read().await.declared.clone()
    }

    pub async fn set_declared(&self, declared: DeclaredRules) {
        self.state.write().await.declared = declared;
    }
}

#[async_trait]
impl RuleStore for InMemoryStore {
    async fn quality_rules(&self) -> Result<Vec<QualityRule>> {
        Ok(self.state.read().await.quality_rules.clone())
    }

    async fn quality_rule(&self, id: &str) -> Result<Option<QualityRule>> {
        Ok(self
            .state
            .read()
            .await
            .quality_rules
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn put_quality_rule(&self, rule: QualityRule) -> Result<()> {
        let mut state = self.state.write().await;
        match state.quality_rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => state.quality_rules.push(rule),
        }
        Ok(())
    }

    async fn pii_rules(&self) -> Result<Vec<PiiRuleDefinition>> {
        Ok(self.state.read().await.pii_rule_definitions.clone())
    }

    async fn pii_rule(&self, pii_type: &str) -> Result<Option<PiiRuleDefinition>> {
        Ok(self
            .state
            .read()
            .await
            .pii_rule_definitions
            .iter()
            .find(|r| r.pii_type == pii_type)
            .cloned())
    }

    async fn put_pii_rule(&self, rule: PiiRuleDefinition) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match state
                .pii_rule_definitions
                .iter_mut()
                .find(|r| r.pii_type == rule.pii_type)
            {
                Some(existing) => *existing = rule,
                None => state.pii_rule_definitions.push(rule),
            }
        }
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

#[async_trait]
impl IssueStore for InMemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<QualityIssue>> {
        Ok(self
            .state
            .read()
            .await
            .quality_issues
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn find_by_key(&self, key: &IssueKey) -> Result<Option<QualityIssue>> {
        Ok(self
            .state
            .read()
            .await
            .quality_issues
            .iter()
            .find(|i| {
                i.asset_id == key.asset_id && i.column == key.column && i.origin == key.origin
            })
            .cloned())
    }

    async fn upsert(&self, issue: QualityIssue) -> Result<()> {
        let mut state = self.state.write().await;
        match state.quality_issues.iter_mut().find(|i| i.id == issue.id) {
            Some(existing) => *existing = issue,
            None => state.quality_issues.push(issue),
        }
        Ok(())
    }

    async fn list(&self, filter: &IssueFilter) -> Result<Vec<QualityIssue>> {
        Ok(self
            .state
            .read()
            .await
            .quality_issues
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn append(&self, result: QualityResult) -> Result<()> {
        self.state.write().await.quality_results.push(result);
        Ok(())
    }

    async fn history(&self, rule_id: &str) -> Result<Vec<QualityResult>> {
        Ok(self
            .state
            .read()
            .await
            .quality_results
            .iter()
            .filter(|r| r.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn latest(&self, rule_id: &str) -> Result<Option<QualityResult>> {
        Ok(self
            .state
            .read()
            .await
            .quality_results
            .iter()
            .rev()
            .find(|r| r.rule_id == rule_id)
            .cloned())
    }
}
