// warden-core/src/domain/issue.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::governance::remediation::Remediation;
use crate::domain::quality::rule::{Dimension, Severity};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "acknowledged" | "ack" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Unknown issue status: {}", s)),
        }
    }
}

/// Status including "no issue yet".
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    None,
    Open,
    Acknowledged,
    Resolved,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Open => "open",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }

    pub fn status(&self) -> Option<IssueStatus> {
        match self {
            Self::None => None,
            Self::Open => Some(IssueStatus::Open),
            Self::Acknowledged => Some(IssueStatus::Acknowledged),
            Self::Resolved => Some(IssueStatus::Resolved),
        }
    }
}

impl From<Option<IssueStatus>> for IssueState {
    fn from(status: Option<IssueStatus>) -> Self {
        match status {
            None => Self::None,
            Some(IssueStatus::Open) => Self::Open,
            Some(IssueStatus::Acknowledged) => Self::Acknowledged,
            Some(IssueStatus::Resolved) => Self::Resolved,
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueOrigin {
    Pii { pii_type: String },
    Rule { rule_id: String },
}

impl IssueOrigin {
    pub fn is_pii(&self) -> bool {
        matches!(self, Self::Pii { .. })
    }
}

impl fmt::Display for IssueOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pii { pii_type } => write!(f, "pii:{}", pii_type),
            Self::Rule { rule_id } => write!(f, "rule:{}", rule_id),
        }
    }
}

/// One issue per key, ever. Reopening reuses the same record.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct IssueKey {
    pub asset_id: String,
    pub column: Option<String>,
    pub origin: IssueOrigin,
}

impl IssueKey {
    pub fn pii(asset_id: &str, column: &str, pii_type: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            column: Some(column.to_string()),
            origin: IssueOrigin::Pii {
                pii_type: pii_type.to_string(),
            },
        }
    }

    pub fn rule(asset_id: &str, column: Option<&str>, rule_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            column: column.map(str::to_string),
            origin: IssueOrigin::Rule {
                rule_id: rule_id.to_string(),
            },
        }
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "{}.{} [{}]", self.asset_id, col, self.origin),
            None => write!(f, "{} [{}]", self.asset_id, self.origin),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IssueNote {
    pub at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct QualityIssue {
    pub id: Uuid,
    pub asset_id: String,
    #[serde(default)]
    pub column: Option<String>,
    pub origin: IssueOrigin,
    pub title: String,
    pub dimension: Dimension,
    pub severity: Severity,
    pub status: IssueStatus,
    /// Append-only audit trail.
    #[serde(default)]
    pub description: Vec<IssueNote>,
    #[serde(default)]
    pub columns: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub occurrences: u32,
    #[serde(default)]
    pub remediation: Option<Remediation>,
}

impl QualityIssue {
    pub fn open(key: &IssueKey, title: &str, dimension: Dimension, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_id: key.asset_id.clone(),
            column: key.column.clone(),
            origin: key.origin.clone(),
            title: title.to_string(),
            dimension,
            severity,
            status: IssueStatus::Open,
            description: vec![],
            columns: key.column.iter().cloned().collect(),
            first_seen_at: now,
            last_seen_at: now,
            resolved_at: None,
            occurrences: 1,
            remediation: None,
        }
    }

    pub fn key(&self) -> IssueKey {
        IssueKey {
            asset_id: self.asset_id.clone(),
            column: self.column.clone(),
            origin: self.origin.clone(),
        }
    }

    pub fn state(&self) -> IssueState {
        Some(self.status).into()
    }

    pub fn append_note(&mut self, note: impl Into<String>) {
        self.description.push(IssueNote {
            at: Utc::now(),
            note: note.into(),
        });
    }

    pub fn description_text(&self) -> String {
        self.description
            .iter()
            .map(|n| format!("[{}] {}", n.at.format("%Y-%m-%d %H:%M:%S"), n.note))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Moves the record to the decided state. History is only ever appended.
    pub fn apply(&mut self, decision: &Decision, note: &str) {
        let now = Utc::now();
        match decision.kind {
            TransitionKind::Opened => {
                self.last_seen_at = now;
            }
            TransitionKind::Reconfirmed => {
                self.last_seen_at = now;
                self.occurrences += 1;
            }
            TransitionKind::Reopened => {
                self.last_seen_at = now;
                self.occurrences += 1;
                self.resolved_at = None;
            }
            TransitionKind::Resolved | TransitionKind::AutoResolved => {
                self.resolved_at = Some(now);
            }
            TransitionKind::Acknowledged
            | TransitionKind::ResolveRejected
            | TransitionKind::Unchanged => {}
        }
        if let Some(status) = decision.to.status() {
            self.status = status;
        }
        if !note.is_empty() {
            self.append_note(note);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueFilter {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: Option<IssueStatus>,
    #[serde(default)]
    pub dimension: Option<Dimension>,
    #[serde(default)]
    pub pii_only: bool,
}

impl IssueFilter {
    pub fn matches(&self, issue: &QualityIssue) -> bool {
        self.asset_id.as_deref().is_none_or(|a| a == issue.asset_id)
            && self.severity.is_none_or(|s| s == issue.severity)
            && self.status.is_none_or(|s| s == issue.status)
            && self.dimension.is_none_or(|d| d == issue.dimension)
            && (!self.pii_only || issue.origin.is_pii())
    }
}

// --- STATE MACHINE ---

/// What happened to the condition behind an issue key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueEvent {
    /// Validated failure: unprotected PII that requires protection, or a failed rule.
    ViolationDetected,
    /// Validated success on a later scan.
    ConditionCleared,
    /// The PII rule no longer requires protection, or the rule was disabled.
    RuleRelaxed,
    Acknowledge,
    /// Operator request; `verified` is the outcome of re-validation.
    ResolveRequested { verified: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Opened,
    Reconfirmed,
    Reopened,
    Acknowledged,
    Resolved,
    AutoResolved,
    ResolveRejected,
    Unchanged,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Reconfirmed => "reconfirmed",
            Self::Reopened => "reopened",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::AutoResolved => "auto_resolved",
            Self::ResolveRejected => "resolve_rejected",
            Self::Unchanged => "unchanged",
        }
    }

    /// Whether the issue record has to be written.
    pub fn writes(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub kind: TransitionKind,
    pub to: IssueState,
}

impl Decision {
    fn new(kind: TransitionKind, to: IssueState) -> Self {
        Self { kind, to }
    }

    fn unchanged(state: IssueState) -> Self {
        Self::new(TransitionKind::Unchanged, state)
    }
}

/// Every legal issue transition. Callers persist; this only decides.
pub fn transition(state: IssueState, event: IssueEvent) -> Result<Decision, DomainError> {
    use IssueEvent as E;
    use IssueState as S;
    use TransitionKind as K;

    let invalid = |action: &str| DomainError::InvalidTransition {
        action: action.to_string(),
        status: state.to_string(),
    };

    let decision = match (state, event) {
        (S::None, E::ViolationDetected) => Decision::new(K::Opened, S::Open),
        (S::Open | S::Acknowledged, E::ViolationDetected) => Decision::new(K::Reconfirmed, state),
        (S::Resolved, E::ViolationDetected) => Decision::new(K::Reopened, S::Open),

        (S::Open | S::Acknowledged, E::ConditionCleared) => {
            Decision::new(K::AutoResolved, S::Resolved)
        }
        (S::Open | S::Acknowledged, E::RuleRelaxed) => Decision::new(K::AutoResolved, S::Resolved),
        (S::None | S::Resolved, E::ConditionCleared | E::RuleRelaxed) => Decision::unchanged(state),

        (S::Open, E::Acknowledge) => Decision::new(K::Acknowledged, S::Acknowledged),
        (S::Acknowledged, E::Acknowledge) => Decision::unchanged(state),
        (S::None, E::Acknowledge) | (S::Resolved, E::Acknowledge) => {
            return Err(invalid("acknowledge"));
        }

        (S::Open | S::Acknowledged, E::ResolveRequested { verified: true }) => {
            Decision::new(K::Resolved, S::Resolved)
        }
        (S::Open | S::Acknowledged, E::ResolveRequested { verified: false }) => {
            Decision::new(K::ResolveRejected, state)
        }
        (S::Resolved, E::ResolveRequested { .. }) => Decision::unchanged(state),
        (S::None, E::ResolveRequested { .. }) => return Err(invalid("resolve")),
    };
    Ok(decision)
}
