// warden-core/src/application/pii_validator.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::catalog::ColumnRef;
use crate::domain::governance::pii::ProtectionRequirement;
use crate::domain::governance::validator::{FixVerdict, ValidatorConfig, evaluate_samples};
use crate::domain::project::ProjectConfig;
use crate::error::Result;
use crate::ports::connector::{ConnectorError, DataSourceConnector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Verdict(FixVerdict),
    /// Sampling did not finish. Prior issue state must stay as it is.
    Inconclusive { reason: String },
}

impl ValidationOutcome {
    pub fn verdict(&self) -> Option<&FixVerdict> {
        match self {
            Self::Verdict(v) => Some(v),
            Self::Inconclusive { .. } => None,
        }
    }
}

/// Decides from real values whether a column's protection has been applied.
#[derive(Debug, Clone)]
pub struct PiiFixValidator {
    config: ValidatorConfig,
    max_samples: usize,
    budget: Duration,
}

impl PiiFixValidator {
    pub fn new(config: ValidatorConfig, max_samples: usize, budget: Duration) -> Self {
        Self {
            config,
            max_samples: max_samples.max(1),
            budget,
        }
    }

    pub fn from_project(project: &ProjectConfig) -> Self {
        Self::new(
            ValidatorConfig::from(&project.policy),
            project.policy.max_samples,
            project.timeouts.sample(),
        )
    }

    #[instrument(skip(self, connector), fields(column = %column))]
    pub async fn validate(
        &self,
        column: &ColumnRef,
        requirement: ProtectionRequirement,
        connector: &dyn DataSourceConnector,
    ) -> Result<ValidationOutcome> {
        if requirement.is_monitoring() {
            return Ok(ValidationOutcome::Verdict(evaluate_samples(&[], requirement, &self.config)));
        }

        match connector.sample(column, self.max_samples, self.budget).await {
            Ok(samples) => {
                let verdict = evaluate_samples(&samples, requirement, &self.config);
                debug!(
                    fixed = verdict.is_fixed,
                    ratio = verdict.protected_ratio,
                    "Protection evaluated"
                );
                Ok(ValidationOutcome::Verdict(verdict))
            }
            Err(e) if e.is_systemic() => Err(e.into()),
            Err(ConnectorError::Timeout(budget)) => {
                warn!(budget = ?budget, "Sampling timed out, validation inconclusive");
                Ok(ValidationOutcome::Inconclusive {
                    reason: format!("sampling exceeded its {:?} budget", budget),
                })
            }
            Err(e) => {
                warn!(error = %e, "Sampling failed, validation inconclusive");
                Ok(ValidationOutcome::Inconclusive { reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Asset, AssetType};
    use crate::ports::connector::QueryResult;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // --- MOCK CONNECTOR ---
    struct SampleConnector {
        values: Vec<&'static str>,
        hang: bool,
        calls: AtomicUsize,
    }

    impl SampleConnector {
        fn with(values: Vec<&'static str>) -> Self {
            Self {
                values,
                hang: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DataSourceConnector for SampleConnector {
        fn source_id(&self) -> &str {
            "warehouse"
        }
        fn engine_name(&self) -> &str {
            "mock"
        }
        async fn execute(
            &self,
            _query: &str,
            timeout: Duration,
        ) -> std::result::Result<QueryResult, ConnectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                return Err(ConnectorError::Timeout(timeout));
            }
            Ok(QueryResult {
                columns: vec!["value".into()],
                rows: self.values.iter().map(|v| vec![Value::String(v.to_string())]).collect(),
            })
        }
    }

    fn column() -> ColumnRef {
        Asset::new("warehouse", "main", "customers", AssetType::Table).column("email")
    }

    fn validator() -> PiiFixValidator {
        PiiFixValidator::new(ValidatorConfig::default(), 10, Duration::from_secs(1))
    }

    const ENCRYPT: ProtectionRequirement = ProtectionRequirement {
        encryption: true,
        masking: false,
    };

    #[tokio::test]
    async fn test_base64_values_are_fixed() -> Result<()> {
        let connector = SampleConnector::with(vec!["aGVsbG8=", "d29ybGQ=", "dGVzdA=="]);
        let outcome = validator().validate(&column(), ENCRYPT, &connector).await?;
        let verdict = outcome.verdict().ok_or_else(|| anyhow::anyhow!("expected a verdict"))?;
        assert!(verdict.is_fixed);
        assert_eq!(verdict.protected_ratio, 1.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_plaintext_is_not_fixed() -> Result<()> {
        let connector = SampleConnector::with(vec!["alice@example.com", "bob@example.com"]);
        let outcome = validator().validate(&column(), ENCRYPT, &connector).await?;
        let verdict = outcome.verdict().ok_or_else(|| anyhow::anyhow!("expected a verdict"))?;
        assert!(!verdict.is_fixed);
        assert_eq!(verdict.unprotected_samples.len(), 2);
        assert_eq!(verdict.unprotected_samples[0], "alic…");
        Ok(())
    }

    #[tokio::test]
    async fn test_monitoring_mode_never_samples() -> Result<()> {
        let connector = SampleConnector::with(vec!["alice@example.com"]);
        let outcome = validator()
            .validate(&column(), ProtectionRequirement::default(), &connector)
            .await?;
        assert!(outcome.verdict().is_some_and(|v| v.is_fixed));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_is_inconclusive() -> Result<()> {
        let mut connector = SampleConnector::with(vec![]);
        connector.hang = true;
        let outcome = validator().validate(&column(), ENCRYPT, &connector).await?;
        assert!(matches!(outcome, ValidationOutcome::Inconclusive { .. }));
        Ok(())
    }
}
