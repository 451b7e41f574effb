// warden-core/src/application/lifecycle.rs

// Sole writer of issue records. Every state change goes through `domain::issue::transition`;
// this module only gathers the facts, serializes per key and persists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::application::ports::TemplateEngine;
use crate::domain::catalog::ColumnRef;
use crate::domain::error::DomainError;
use crate::domain::governance::pii::PiiRuleDefinition;
use crate::domain::governance::remediation::{
    Remediation, RemediationStep, planned_actions, template_context,
};
use crate::domain::governance::validator::FixVerdict;
use crate::domain::issue::{
    IssueEvent, IssueFilter, IssueKey, IssueOrigin, IssueState, QualityIssue, TransitionKind,
    transition,
};
use crate::domain::quality::result::QualityResult;
use crate::domain::quality::rule::{Dimension, QualityRule, Severity};
use crate::error::Result;
use crate::ports::store::IssueStore;

/// Facts and requests the manager reacts to.
#[derive(Debug, Clone)]
pub enum IssueCommand {
    PiiViolationConfirmed {
        column: ColumnRef,
        rule: PiiRuleDefinition,
        verdict: FixVerdict,
    },
    PiiProtectionConfirmed {
        column: ColumnRef,
        pii_type: String,
        verdict: FixVerdict,
    },
    RuleFailed {
        rule: QualityRule,
        result: QualityResult,
    },
    RulePassed {
        rule: QualityRule,
        result: QualityResult,
    },
    RuleDisabled {
        rule_id: String,
    },
    RuleEnabled {
        rule_id: String,
    },
    PiiRuleRelaxed {
        pii_type: String,
        reason: String,
    },
    AcknowledgeRequested {
        issue_id: Uuid,
    },
    /// `verified` is the outcome of re-validating the underlying data.
    ManualResolveRequested {
        issue_id: Uuid,
        verified: bool,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub issue_id: Option<Uuid>,
    pub key: Option<IssueKey>,
    pub kind: TransitionKind,
    pub from: IssueState,
    pub to: IssueState,
    pub note: String,
}

impl Transition {
    fn noop(key: Option<IssueKey>, note: &str) -> Self {
        Self {
            issue_id: None,
            key,
            kind: TransitionKind::Unchanged,
            from: IssueState::None,
            to: IssueState::None,
            note: note.to_string(),
        }
    }
}

pub struct IssueLifecycleManager {
    issues: Arc<dyn IssueStore>,
    templates: Arc<dyn TemplateEngine>,
    locks: Mutex<HashMap<IssueKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl IssueLifecycleManager {
    pub fn new(issues: Arc<dyn IssueStore>, templates: Arc<dyn TemplateEngine>) -> Self {
        Self {
            issues,
            templates,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &IssueKey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Runs `unit` while holding the key's lock. Detect, validate and write for one key go here.
    /// `unit` must write through [`Self::apply`], never [`Self::handle`].
    pub async fn exclusive<F, T>(&self, key: &IssueKey, unit: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.key_lock(key);
        let out = {
            let _guard = lock.lock().await;
            unit.await
        };
        self.release(key, lock);
        out
    }

    /// Drops the key's entry once nobody else holds or waits on its lock.
    fn release(&self, key: &IssueKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's copy and ours.
        let idle = Arc::strong_count(&lock) == 2;
        if idle && locks.get(key).is_some_and(|held| Arc::ptr_eq(held, &lock)) {
            locks.remove(key);
        }
    }

    /// Serializes on every affected key, then applies.
    #[instrument(skip_all)]
    pub async fn handle(&self, command: IssueCommand) -> Result<Vec<Transition>> {
        match &command {
            IssueCommand::RuleDisabled { .. } | IssueCommand::PiiRuleRelaxed { .. } => {
                let mut transitions = Vec::new();
                for issue in self.affected_by(&command).await? {
                    let key = issue.key();
                    let single = self.exclusive(&key, self.relax(issue.id, &command)).await?;
                    transitions.extend(single);
                }
                Ok(transitions)
            }
            IssueCommand::AcknowledgeRequested { issue_id }
            | IssueCommand::ManualResolveRequested { issue_id, .. } => {
                let key = self.existing(*issue_id).await?.key();
                self.exclusive(&key, self.apply(command.clone())).await
            }
            _ => match Self::command_key(&command) {
                Some(key) => self.exclusive(&key, self.apply(command.clone())).await,
                None => self.apply(command.clone()).await,
            },
        }
    }

    fn command_key(command: &IssueCommand) -> Option<IssueKey> {
        match command {
            IssueCommand::PiiViolationConfirmed { column, rule, .. } => {
                Some(IssueKey::pii(&column.asset_id, &column.column, &rule.pii_type))
            }
            IssueCommand::PiiProtectionConfirmed { column, pii_type, .. } => {
                Some(IssueKey::pii(&column.asset_id, &column.column, pii_type))
            }
            IssueCommand::RuleFailed { rule, .. } | IssueCommand::RulePassed { rule, .. } => {
                Some(IssueKey::rule(&rule.asset_id, rule.column.as_deref(), &rule.id))
            }
            _ => None,
        }
    }

    /// Whether an open or acknowledged issue exists for `key`.
    pub async fn is_active(&self, key: &IssueKey) -> Result<bool> {
        Ok(self
            .issues
            .find_by_key(key)
            .await?
            .is_some_and(|i| i.status.is_active()))
    }

    async fn existing(&self, id: Uuid) -> Result<QualityIssue> {
        self.issues
            .get(id)
            .await?
            .ok_or_else(|| DomainError::IssueNotFound(id.to_string()).into())
    }

    async fn affected_by(&self, command: &IssueCommand) -> Result<Vec<QualityIssue>> {
        let all = self.issues.list(&IssueFilter::default()).await?;
        Ok(all
            .into_iter()
            .filter(|i| i.status.is_active())
            .filter(|i| match (command, &i.origin) {
                (IssueCommand::RuleDisabled { rule_id }, IssueOrigin::Rule { rule_id: r }) => {
                    r == rule_id
                }
                (
                    IssueCommand::PiiRuleRelaxed { pii_type, .. },
                    IssueOrigin::Pii { pii_type: p },
                ) => p == pii_type,
                _ => false,
            })
            .collect())
    }

    /// Caller must hold the key lock (see [`Self::exclusive`]).
    pub async fn apply(&self, command: IssueCommand) -> Result<Vec<Transition>> {
        let outcome = match command {
            IssueCommand::PiiViolationConfirmed { column, rule, verdict } => {
                if rule.protection().is_monitoring() {
                    // Monitoring mode classifies; it never raises an issue.
                    return Ok(vec![Transition::noop(None, "monitoring mode")]);
                }
                let key = IssueKey::pii(&column.asset_id, &column.column, &rule.pii_type);
                let remediation = self.remediation(&column, &rule)?;
                let title = format!("Unprotected {} in {}", rule.label(), column);
                let detail = violation_note(&rule, &verdict);
                self.record(
                    key,
                    IssueEvent::ViolationDetected,
                    Seed {
                        title,
                        dimension: Dimension::Validity,
                        severity: rule.sensitivity.severity(),
                    },
                    detail,
                    Some(remediation),
                )
                .await?
            }
            IssueCommand::PiiProtectionConfirmed { column, pii_type, verdict } => {
                let key = IssueKey::pii(&column.asset_id, &column.column, &pii_type);
                self.record_existing(
                    key,
                    IssueEvent::ConditionCleared,
                    format!("validator confirms protection: {}", verdict.reason),
                )
                .await?
            }
            IssueCommand::RuleFailed { rule, result } => {
                let key = IssueKey::rule(&rule.asset_id, rule.column.as_deref(), &rule.id);
                let detail = result
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("rule '{}' failed", rule.id));
                self.record(
                    key,
                    IssueEvent::ViolationDetected,
                    Seed {
                        title: rule.title(),
                        dimension: rule.dimension,
                        severity: rule.severity,
                    },
                    detail,
                    None,
                )
                .await?
            }
            IssueCommand::RulePassed { rule, .. } => {
                let key = IssueKey::rule(&rule.asset_id, rule.column.as_deref(), &rule.id);
                let detail = format!("rule '{}' passed", rule.id);
                self.record_existing(key, IssueEvent::ConditionCleared, detail)
                    .await?
            }
            IssueCommand::RuleEnabled { rule_id } => {
                // Nothing to write; the next scan re-evaluates.
                Transition::noop(None, &format!("rule '{}' enabled", rule_id))
            }
            IssueCommand::RuleDisabled { .. } | IssueCommand::PiiRuleRelaxed { .. } => {
                let mut out = Vec::new();
                for issue in self.affected_by(&command).await? {
                    out.extend(self.relax(issue.id, &command).await?);
                }
                return Ok(out);
            }
            IssueCommand::AcknowledgeRequested { issue_id } => {
                let issue = self.existing(issue_id).await?;
                self.update(issue, IssueEvent::Acknowledge, "acknowledged".to_string())
                    .await?
            }
            IssueCommand::ManualResolveRequested {
                issue_id,
                verified,
                reason,
            } => {
                let issue = self.existing(issue_id).await?;
                let note = if verified {
                    format!("resolved on request: {}", reason)
                } else {
                    format!("resolution rejected: {}", reason)
                };
                self.update(issue, IssueEvent::ResolveRequested { verified }, note)
                    .await?
            }
        };
        Ok(vec![outcome])
    }

    async fn relax(&self, issue_id: Uuid, command: &IssueCommand) -> Result<Vec<Transition>> {
        let note = match command {
            IssueCommand::RuleDisabled { rule_id } => {
                format!("auto-resolved: rule '{}' was disabled", rule_id)
            }
            IssueCommand::PiiRuleRelaxed { pii_type, reason } => {
                format!("auto-resolved: PII rule '{}' {}", pii_type, reason)
            }
            _ => String::new(),
        };
        let issue = self.existing(issue_id).await?;
        Ok(vec![self.update(issue, IssueEvent::RuleRelaxed, note).await?])
    }

    /// Creates the issue when the event opens one.
    async fn record(
        &self,
        key: IssueKey,
        event: IssueEvent,
        seed: Seed,
        detail: String,
        remediation: Option<Option<Remediation>>,
    ) -> Result<Transition> {
        let existing = self.issues.find_by_key(&key).await?;
        let from = IssueState::from(existing.as_ref().map(|i| i.status));
        let decision = transition(from, event)?;

        let mut issue = match existing {
            Some(issue) => issue,
            None => QualityIssue::open(&key, &seed.title, seed.dimension, seed.severity),
        };
        let note = match decision.kind {
            TransitionKind::Opened => format!("opened: {}", detail),
            TransitionKind::Reopened => {
                format!("reopened: regression detected on a later scan: {}", detail)
            }
            _ => String::new(),
        };
        issue.severity = seed.severity;
        if let Some(remediation) = remediation {
            issue.remediation = remediation;
        }
        issue.apply(&decision, &note);
        self.persist(issue, from, decision.kind, note).await
    }

    /// Only moves an issue that already exists.
    async fn record_existing(
        &self,
        key: IssueKey,
        event: IssueEvent,
        detail: String,
    ) -> Result<Transition> {
        match self.issues.find_by_key(&key).await? {
            Some(issue) => self.update(issue, event, detail).await,
            None => Ok(Transition::noop(Some(key), "no issue")),
        }
    }

    async fn update(
        &self,
        mut issue: QualityIssue,
        event: IssueEvent,
        note: String,
    ) -> Result<Transition> {
        let from = issue.state();
        let decision = transition(from, event)?;
        if !decision.kind.writes() {
            return Ok(Transition {
                issue_id: Some(issue.id),
                key: Some(issue.key()),
                kind: decision.kind,
                from,
                to: decision.to,
                note: String::new(),
            });
        }
        issue.apply(&decision, &note);
        self.persist(issue, from, decision.kind, note).await
    }

    async fn persist(
        &self,
        issue: QualityIssue,
        from: IssueState,
        kind: TransitionKind,
        note: String,
    ) -> Result<Transition> {
        let done = Transition {
            issue_id: Some(issue.id),
            key: Some(issue.key()),
            kind,
            from,
            to: issue.state(),
            note,
        };
        if kind == TransitionKind::Reconfirmed {
            debug!(issue = %issue.id, occurrences = issue.occurrences, "Issue reconfirmed");
        } else {
            info!(
                issue = %issue.id,
                key = %issue.key(),
                from = %from,
                to = %done.to,
                "Issue transition"
            );
        }
        self.issues.upsert(issue).await?;
        Ok(done)
    }

    /// Rendered encrypt/mask steps for a PII rule. `None` in monitoring mode.
    pub fn remediation(
        &self,
        column: &ColumnRef,
        rule: &PiiRuleDefinition,
    ) -> Result<Option<Remediation>> {
        let actions = planned_actions(rule);
        if actions.is_empty() {
            return Ok(None);
        }
        let context = template_context(column, rule);
        let steps = actions
            .into_iter()
            .map(|action| {
                Ok(RemediationStep {
                    action,
                    script: self.templates.render(action.template(), &context)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Remediation { steps }))
    }
}

struct Seed {
    title: String,
    dimension: Dimension,
    severity: Severity,
}

fn violation_note(rule: &PiiRuleDefinition, verdict: &FixVerdict) -> String {
    let mut note = format!(
        "{} requires {}; {}",
        rule.label(),
        match (rule.requires_encryption, rule.requires_masking) {
            (true, true) => "encryption and masking",
            (true, false) => "encryption",
            _ => "masking",
        },
        verdict.reason
    );
    if !verdict.unprotected_samples.is_empty() {
        note.push_str(&format!(
            "; unprotected samples: {}",
            verdict.unprotected_samples.join(", ")
        ));
    }
    note
}
