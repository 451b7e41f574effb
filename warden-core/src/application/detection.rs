// warden-core/src/application/detection.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::application::lifecycle::{IssueCommand, IssueLifecycleManager, Transition};
use crate::application::pii_validator::{PiiFixValidator, ValidationOutcome};
use crate::domain::catalog::{Asset, Column, ColumnClassification, ColumnRef};
use crate::domain::governance::cache::PiiRuleCache;
use crate::domain::governance::matcher::{Classification, MatcherConfig, RuleSet, classify};
use crate::domain::governance::validator::FixVerdict;
use crate::domain::issue::IssueKey;
use crate::domain::quality::profile::SkippedAsset;
use crate::error::Result;
use crate::ports::catalog::CatalogSource;
use crate::ports::connector::DataSourceConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOutcome {
    NotPii,
    /// Classified; the rule asks for no protection.
    Monitored,
    Protected,
    Unprotected,
    /// Sampling for validation did not finish; issue state untouched.
    Inconclusive,
}

impl DetectionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPii => "not_pii",
            Self::Monitored => "monitored",
            Self::Protected => "protected",
            Self::Unprotected => "unprotected",
            Self::Inconclusive => "inconclusive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDetection {
    pub asset_id: String,
    pub classification: Classification,
    pub outcome: DetectionOutcome,
    #[serde(default)]
    pub verdict: Option<FixVerdict>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub assets_scanned: usize,
    pub columns_scanned: usize,
    pub assets_skipped: Vec<SkippedAsset>,
    pub columns: Vec<ColumnDetection>,
    pub transitions: Vec<Transition>,
    pub duration_ms: u64,
}

impl DetectionReport {
    pub fn detections(&self) -> impl Iterator<Item = &ColumnDetection> {
        self.columns.iter().filter(|c| c.classification.is_pii())
    }

    pub fn absorb(&mut self, asset: AssetDetection) {
        self.assets_scanned += 1;
        self.columns_scanned += asset.columns.len();
        self.columns.extend(asset.columns);
        self.transitions.extend(asset.transitions);
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetDetection {
    pub columns: Vec<ColumnDetection>,
    pub transitions: Vec<Transition>,
}

/// Matcher, validator and lifecycle pass over the columns of one asset.
pub struct PiiDetectionEngine {
    catalog: Arc<dyn CatalogSource>,
    cache: Arc<PiiRuleCache>,
    validator: Arc<PiiFixValidator>,
    lifecycle: Arc<IssueLifecycleManager>,
    matcher: MatcherConfig,
    max_samples: usize,
    budget: Duration,
}

impl PiiDetectionEngine {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        cache: Arc<PiiRuleCache>,
        validator: Arc<PiiFixValidator>,
        lifecycle: Arc<IssueLifecycleManager>,
        matcher: MatcherConfig,
        max_samples: usize,
        budget: Duration,
    ) -> Self {
        Self {
            catalog,
            cache,
            validator,
            lifecycle,
            matcher,
            max_samples,
            budget,
        }
    }

    #[instrument(skip_all, fields(asset = %asset.id))]
    pub async fn detect_asset(
        &self,
        asset: &Asset,
        connector: &dyn DataSourceConnector,
    ) -> Result<AssetDetection> {
        let rules = self.cache.rules().await?;
        let columns = self.catalog.list_columns(&asset.id).await?;

        let mut out = AssetDetection::default();
        for column in &columns {
            let (detection, transitions) =
                self.detect_column(asset, column, &rules, connector).await?;
            out.columns.push(detection);
            out.transitions.extend(transitions);
        }
        Ok(out)
    }

    async fn detect_column(
        &self,
        asset: &Asset,
        column: &Column,
        rules: &RuleSet,
        connector: &dyn DataSourceConnector,
    ) -> Result<(ColumnDetection, Vec<Transition>)> {
        let column_ref = asset.column(&column.name);

        // Columns no hint matches are never sampled.
        let samples = if rules.candidates(&column.name).iter().any(|r| r.has_regex()) {
            match connector.sample(&column_ref, self.max_samples, self.budget).await {
                Ok(samples) => samples,
                Err(e) if e.is_systemic() => return Err(e.into()),
                Err(e) => {
                    debug!(
                        column = %column_ref,
                        error = %e,
                        "Sampling failed, classifying on name only"
                    );
                    vec![]
                }
            }
        } else {
            vec![]
        };

        let classification = classify(rules, &column.name, &samples, &self.matcher);
        let rule = classification
            .pii_type
            .as_deref()
            .and_then(|t| rules.get(t))
            .map(|r| r.definition.clone());

        let requirement = rule.as_ref().map(|r| r.protection()).unwrap_or_default();
        self.catalog
            .update_column_classification(
                &column_ref,
                ColumnClassification {
                    pii_type: classification.pii_type.clone(),
                    is_sensitive: rule.is_some() && !requirement.is_monitoring(),
                    confidence: classification.confidence,
                    classified_at: Utc::now(),
                },
            )
            .await?;

        let Some(rule) = rule else {
            let transitions = self.clear_stale(&column_ref, rules, connector).await?;
            return Ok((
                ColumnDetection {
                    asset_id: asset.id.clone(),
                    classification,
                    outcome: DetectionOutcome::NotPii,
                    verdict: None,
                },
                transitions,
            ));
        };
        debug!(
            column = %column.name,
            pii_type = %rule.pii_type,
            confidence = classification.confidence,
            "PII detected"
        );

        let key = IssueKey::pii(&asset.id, &column.name, &rule.pii_type);
        let (outcome, verdict, transitions) = self
            .lifecycle
            .exclusive(&key, async {
                let validation = self
                    .validator
                    .validate(&column_ref, requirement, connector)
                    .await?;
                let verdict = match validation {
                    ValidationOutcome::Verdict(v) => v,
                    ValidationOutcome::Inconclusive { reason } => {
                        info!(
                            column = %column_ref,
                            reason = %reason,
                            "Validation inconclusive, issue state kept"
                        );
                        return Ok((DetectionOutcome::Inconclusive, None, vec![]));
                    }
                };

                let (outcome, command) = if verdict.is_fixed {
                    let outcome = if requirement.is_monitoring() {
                        DetectionOutcome::Monitored
                    } else {
                        DetectionOutcome::Protected
                    };
                    (
                        outcome,
                        IssueCommand::PiiProtectionConfirmed {
                            column: column_ref.clone(),
                            pii_type: rule.pii_type.clone(),
                            verdict: verdict.clone(),
                        },
                    )
                } else {
                    (
                        DetectionOutcome::Unprotected,
                        IssueCommand::PiiViolationConfirmed {
                            column: column_ref.clone(),
                            rule: rule.clone(),
                            verdict: verdict.clone(),
                        },
                    )
                };
                let transitions = self.lifecycle.apply(command).await?;
                Ok::<_, crate::error::WardenError>((outcome, Some(verdict), transitions))
            })
            .await?;

        Ok((
            ColumnDetection {
                asset_id: asset.id.clone(),
                classification,
                outcome,
                verdict,
            },
            transitions.into_iter().filter(|t| t.kind.writes()).collect(),
        ))
    }

    /// Values that stopped matching (encrypted, tokenized) no longer classify, but an issue the
    /// column's name hint raised earlier still has to be cleared once protection is proven.
    async fn clear_stale(
        &self,
        column_ref: &ColumnRef,
        rules: &RuleSet,
        connector: &dyn DataSourceConnector,
    ) -> Result<Vec<Transition>> {
        let mut out = Vec::new();
        for candidate in rules.candidates(&column_ref.column) {
            let requirement = candidate.definition.protection();
            if requirement.is_monitoring() {
                continue;
            }
            let key = IssueKey::pii(&column_ref.asset_id, &column_ref.column, candidate.pii_type());
            if !self.lifecycle.is_active(&key).await? {
                continue;
            }

            let transitions = self
                .lifecycle
                .exclusive(&key, async {
                    match self.validator.validate(column_ref, requirement, connector).await? {
                        ValidationOutcome::Verdict(verdict) if verdict.is_fixed => {
                            self.lifecycle
                                .apply(IssueCommand::PiiProtectionConfirmed {
                                    column: column_ref.clone(),
                                    pii_type: candidate.pii_type().to_string(),
                                    verdict,
                                })
                                .await
                        }
                        _ => Ok(vec![]),
                    }
                })
                .await?;
            out.extend(transitions.into_iter().filter(|t| t.kind.writes()));
        }
        Ok(out)
    }
}
