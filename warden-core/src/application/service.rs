// warden-core/src/application/service.rs

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::detection::{DetectionReport, PiiDetectionEngine};
use crate::application::lifecycle::{IssueCommand, IssueLifecycleManager, Transition};
use crate::application::pii_validator::{PiiFixValidator, ValidationOutcome};
use crate::application::ports::TemplateEngine;
use crate::application::profiling::ProfilingEngine;
use crate::application::rule_engine::QualityRuleEngine;
use crate::application::sources::SourceRegistry;
use crate::domain::catalog::{Asset, AssetFilter, ColumnRef};
use crate::domain::error::DomainError;
use crate::domain::governance::cache::PiiRuleCache;
use crate::domain::governance::matcher::MatcherConfig;
use crate::domain::governance::pii::{PiiRuleDefinition, ProtectionRequirement};
use crate::domain::issue::{IssueFilter, IssueOrigin, QualityIssue};
use crate::domain::project::{DeclaredRules, ProjectConfig};
use crate::domain::quality::profile::{ProfileSummary, SkippedAsset};
use crate::domain::quality::result::{QualityResult, ResultStatus, ScanReport};
use crate::domain::quality::rule::QualityRule;
use crate::error::{Result, WardenError};
use crate::ports::catalog::CatalogSource;
use crate::ports::connector::{ConnectorError, DataSourceConnector};
use crate::ports::store::{IssueStore, ResultStore, RuleStore};

/// Adapters the service runs on.
pub struct WardenDeps {
    pub catalog: Arc<dyn CatalogSource>,
    pub rules: Arc<dyn RuleStore>,
    pub issues: Arc<dyn IssueStore>,
    pub results: Arc<dyn ResultStore>,
    pub templates: Arc<dyn TemplateEngine>,
    pub connectors: Vec<Arc<dyn DataSourceConnector>>,
}

/// What a profile or detection pass covers.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Asset(String),
    Source { source_id: String, filter: AssetFilter },
}

impl Target {
    pub fn source(source_id: &str) -> Self {
        Self::Source {
            source_id: source_id.to_string(),
            filter: AssetFilter::default(),
        }
    }
}

/// What a manual resolve looks at again, gathered before the issue key is locked.
enum Recheck {
    Inactive(String),
    Pii {
        connector: Arc<dyn DataSourceConnector>,
        column: ColumnRef,
        requirement: ProtectionRequirement,
    },
    Rule {
        connector: Arc<dyn DataSourceConnector>,
        rule: QualityRule,
    },
}

pub struct WardenService {
    catalog: Arc<dyn CatalogSource>,
    rules: Arc<dyn RuleStore>,
    issues: Arc<dyn IssueStore>,
    results: Arc<dyn ResultStore>,
    sources: SourceRegistry,
    cache: Arc<PiiRuleCache>,
    engine: QualityRuleEngine,
    profiler: ProfilingEngine,
    validator: Arc<PiiFixValidator>,
    lifecycle: Arc<IssueLifecycleManager>,
    detector: PiiDetectionEngine,
    default_source: String,
    detect_budget: Duration,
}

impl WardenService {
    pub fn new(project: &ProjectConfig, deps: WardenDeps) -> Self {
        let mut sources = SourceRegistry::new();
        for connector in deps.connectors {
            sources.register(connector);
        }

        let cache = Arc::new(PiiRuleCache::new(deps.rules.clone(), project.policy.cache_ttl()));
        let validator = Arc::new(PiiFixValidator::from_project(project));
        let lifecycle = Arc::new(IssueLifecycleManager::new(
            deps.issues.clone(),
            deps.templates.clone(),
        ));

        let engine = QualityRuleEngine::new(
            deps.catalog.clone(),
            deps.results.clone(),
            deps.templates,
            project.timeouts.rule(),
        );
        let profiler = ProfilingEngine::new(
            deps.catalog.clone(),
            project.profiling.clone(),
            project.timeouts.profile(),
        );
        let detector = PiiDetectionEngine::new(
            deps.catalog.clone(),
            cache.clone(),
            validator.clone(),
            lifecycle.clone(),
            MatcherConfig::from(&project.policy),
            project.policy.max_samples,
            project.timeouts.sample(),
        );

        Self {
            catalog: deps.catalog,
            rules: deps.rules,
            issues: deps.issues,
            results: deps.results,
            sources,
            cache,
            engine,
            profiler,
            validator,
            lifecycle,
            detector,
            default_source: project.source_id.clone(),
            // A detection pass samples every column of the asset
            detect_budget: project.timeouts.profile(),
        }
    }

    async fn assets(&self, target: &Target) -> Result<Vec<Asset>> {
        match target {
            Target::Asset(id) => {
                let asset = self
                    .catalog
                    .get_asset(id)
                    .await?
                    .ok_or_else(|| DomainError::AssetNotFound(id.clone()))?;
                Ok(vec![asset])
            }
            Target::Source { source_id, filter } => {
                self.catalog.list_assets(source_id, filter).await
            }
        }
    }

    // --- PROFILING ---

    #[instrument(skip(self))]
    pub async fn profile(&self, target: &Target) -> Result<ProfileSummary> {
        let started = Instant::now();
        let mut summary = ProfileSummary::default();

        for (source_id, assets) in by_source(self.assets(target).await?, |a| a.source_id.clone()) {
            let connector = match self.sources.connector(&source_id) {
                Ok(c) => c,
                Err(e) => {
                    summary.assets_skipped.extend(skipped(&assets, &e.to_string()));
                    continue;
                }
            };
            let source = connector.as_ref();
            let outcomes = self
                .sources
                .pool(source)
                .run_all(self.profiler.budget(), &assets, move |asset| {
                    self.profiler.profile_asset(asset, source)
                })
                .await;

            for (asset, outcome) in outcomes {
                match flatten(outcome) {
                    Ok((profile, suggestions)) => {
                        summary.assets_profiled += 1;
                        summary.profiles.push(profile);
                        summary.suggestions.extend(suggestions);
                    }
                    Err(e) if e.is_systemic() => return Err(e),
                    Err(e) => {
                        warn!(asset = %asset.id, error = %e, "Asset skipped");
                        summary.assets_skipped.push(SkippedAsset {
                            asset_id: asset.id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        summary.profiles.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            profiled = summary.assets_profiled,
            skipped = summary.assets_skipped.len(),
            ms = summary.duration_ms,
            "Profiling finished"
        );
        Ok(summary)
    }

    // --- QUALITY RULES ---

    /// No ids means every enabled rule. Named rules run even when disabled and report `skipped`.
    #[instrument(skip(self))]
    pub async fn scan(
        &self,
        target: Option<&Target>,
        rule_ids: Option<&[String]>,
    ) -> Result<ScanReport> {
        let started = Instant::now();
        let all = self.rules.quality_rules().await?;

        let mut selected: Vec<QualityRule> = match rule_ids {
            Some(ids) => {
                let mut picked = Vec::with_capacity(ids.len());
                for id in ids {
                    let rule = all
                        .iter()
                        .find(|r| &r.id == id)
                        .ok_or_else(|| DomainError::RuleNotFound(id.clone()))?;
                    picked.push(rule.clone());
                }
                picked
            }
            None => all.into_iter().filter(|r| r.enabled).collect(),
        };

        if let Some(target) = target {
            let scope: HashSet<String> =
                self.assets(target).await?.into_iter().map(|a| a.id).collect();
            selected.retain(|r| scope.contains(&r.asset_id));
        }

        let mut results = Vec::with_capacity(selected.len());
        for (source_id, rules) in by_source(selected, |r| r.source_id.clone()) {
            results.extend(self.scan_source(&source_id, &rules).await?);
        }
        results.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        let rules = self.rules.quality_rules().await?;
        let mut opened = 0;
        for result in &results {
            self.results.append(result.clone()).await?;
            let Some(rule) = rules.iter().find(|r| r.id == result.rule_id) else {
                continue;
            };
            let command = match result.status {
                ResultStatus::Failed => IssueCommand::RuleFailed {
                    rule: rule.clone(),
                    result: result.clone(),
                },
                ResultStatus::Passed => IssueCommand::RulePassed {
                    rule: rule.clone(),
                    result: result.clone(),
                },
                // error, timeout and skipped leave issue state alone
                _ => continue,
            };
            opened += self
                .lifecycle
                .handle(command)
                .await?
                .iter()
                .filter(|t| t.kind.writes())
                .count();
        }

        let report = ScanReport::from_results(results, started.elapsed().as_millis() as u64);
        info!(
            executed = report.aggregate.executed,
            failed = report.aggregate.failed,
            issue_writes = opened,
            ms = report.aggregate.duration_ms,
            "Scan finished"
        );
        Ok(report)
    }

    async fn scan_source(
        &self,
        source_id: &str,
        rules: &[QualityRule],
    ) -> Result<Vec<QualityResult>> {
        let connector = match self.sources.connector(source_id) {
            Ok(c) => c,
            Err(e) => {
                warn!(source = source_id, "Rules target an unregistered source");
                return Ok(rules.iter().map(|r| errored(r, &e)).collect());
            }
        };
        let source = connector.as_ref();
        let outcomes = self
            .sources
            .pool(source)
            .run_all(self.engine.budget(), rules, move |rule| self.engine.execute(rule, source))
            .await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (rule, outcome) in outcomes {
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) if e.is_systemic() => return Err(e),
                Ok(Err(e)) => errored(rule, &e),
                Err(ConnectorError::Timeout(budget)) => {
                    let mut result = QualityRuleEngine::timed_out(rule, budget);
                    result.execution_time_ms = budget.as_millis() as u64;
                    result
                }
                Err(e) => errored(rule, &e),
            };
            results.push(result);
        }
        Ok(results)
    }

    // --- PII DETECTION ---

    #[instrument(skip(self))]
    pub async fn detect_pii(&self, target: &Target) -> Result<DetectionReport> {
        let started = Instant::now();
        let mut report = DetectionReport::default();

        for (source_id, assets) in by_source(self.assets(target).await?, |a| a.source_id.clone()) {
            let connector = match self.sources.connector(&source_id) {
                Ok(c) => c,
                Err(e) => {
                    report.assets_skipped.extend(skipped(&assets, &e.to_string()));
                    continue;
                }
            };
            let source = connector.as_ref();
            let outcomes = self
                .sources
                .pool(source)
                .run_all(self.detect_budget, &assets, move |asset| {
                    self.detector.detect_asset(asset, source)
                })
                .await;

            for (asset, outcome) in outcomes {
                match flatten(outcome) {
                    Ok(detection) => report.absorb(detection),
                    Err(e) if e.is_systemic() => return Err(e),
                    Err(e) => {
                        warn!(asset = %asset.id, error = %e, "Asset skipped");
                        report.assets_skipped.push(SkippedAsset {
                            asset_id: asset.id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        report.columns.sort_by(|a, b| {
            (&a.asset_id, &a.classification.column).cmp(&(&b.asset_id, &b.classification.column))
        });
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            assets = report.assets_scanned,
            columns = report.columns_scanned,
            pii = report.detections().count(),
            issue_writes = report.transitions.len(),
            "Detection finished"
        );
        Ok(report)
    }

    // --- ISSUES ---

    pub async fn query_issues(&self, filter: &IssueFilter) -> Result<Vec<QualityIssue>> {
        self.issues.list(filter).await
    }

    pub async fn issue(&self, id: Uuid) -> Result<QualityIssue> {
        self.issues
            .get(id)
            .await?
            .ok_or_else(|| DomainError::IssueNotFound(id.to_string()).into())
    }

    pub async fn acknowledge_issue(&self, id: Uuid) -> Result<Transition> {
        first(self.lifecycle.handle(IssueCommand::AcknowledgeRequested { issue_id: id }).await?)
    }

    /// Re-validates against live data first. A failed re-validation is recorded on the issue and
    /// then reported as [`DomainError::ResolveRejected`].
    #[instrument(skip(self))]
    pub async fn resolve_issue(&self, id: Uuid) -> Result<Transition> {
        let issue = self.issue(id).await?;
        let key = issue.key();
        let recheck = self.recheck_for(&issue).await?;

        let unit = self.lifecycle.exclusive(&key, async {
            let (verified, reason) = self.recheck(&recheck).await?;
            let transitions = self
                .lifecycle
                .apply(IssueCommand::ManualResolveRequested {
                    issue_id: id,
                    verified,
                    reason: reason.clone(),
                })
                .await?;
            Ok::<_, WardenError>((verified, reason, transitions))
        });
        // Permit first, then the key lock: detection takes them in the same order.
        let (verified, reason, transitions) = match &recheck {
            Recheck::Inactive(_) => unit.await?,
            Recheck::Pii { connector, .. } => {
                let pool = self.sources.pool(connector.as_ref());
                flatten(pool.run(self.detect_budget, unit).await)?
            }
            Recheck::Rule { connector, .. } => {
                let pool = self.sources.pool(connector.as_ref());
                flatten(pool.run(self.engine.budget(), unit).await)?
            }
        };

        if !verified {
            return Err(DomainError::ResolveRejected {
                issue: id.to_string(),
                reason,
            }
            .into());
        }
        first(transitions)
    }

    async fn recheck_for(&self, issue: &QualityIssue) -> Result<Recheck> {
        match &issue.origin {
            IssueOrigin::Pii { pii_type } => {
                let requirement = match self.rules.pii_rule(pii_type).await? {
                    Some(rule) if rule.enabled => rule.protection(),
                    _ => {
                        return Ok(Recheck::Inactive(format!(
                            "PII rule '{}' is no longer active",
                            pii_type
                        )));
                    }
                };
                let column = issue.column.as_deref().ok_or_else(|| {
                    WardenError::InternalError(format!("PII issue {} has no column", issue.id))
                })?;
                let asset = self
                    .catalog
                    .get_asset(&issue.asset_id)
                    .await?
                    .ok_or_else(|| DomainError::AssetNotFound(issue.asset_id.clone()))?;
                Ok(Recheck::Pii {
                    connector: self.sources.connector(&asset.source_id)?,
                    column: asset.column(column),
                    requirement,
                })
            }
            IssueOrigin::Rule { rule_id } => match self.rules.quality_rule(rule_id).await? {
                Some(rule) if rule.enabled => Ok(Recheck::Rule {
                    connector: self.sources.connector(&rule.source_id)?,
                    rule,
                }),
                _ => Ok(Recheck::Inactive(format!("rule '{}' is no longer active", rule_id))),
            },
        }
    }

    /// Whether the condition behind an issue is gone, with an explanation either way.
    async fn recheck(&self, recheck: &Recheck) -> Result<(bool, String)> {
        match recheck {
            Recheck::Inactive(reason) => Ok((true, reason.clone())),
            Recheck::Pii {
                connector,
                column,
                requirement,
            } => match self.validator.validate(column, *requirement, connector.as_ref()).await? {
                ValidationOutcome::Verdict(verdict) => Ok((verdict.is_fixed, verdict.reason)),
                ValidationOutcome::Inconclusive { reason } => {
                    Ok((false, format!("validation inconclusive: {}", reason)))
                }
            },
            Recheck::Rule { connector, rule } => {
                let result = self.engine.execute(rule, connector.as_ref()).await?;
                self.results.append(result.clone()).await?;

                let detail = result.message.clone().unwrap_or_default();
                Ok(match result.status {
                    ResultStatus::Passed => (true, format!("rule '{}' passes again", rule.id)),
                    status => (
                        false,
                        format!("rule '{}' is still {}: {}", rule.id, status, detail),
                    ),
                })
            }
        }
    }

    // --- RULE MUTATIONS ---

    pub async fn quality_rules(&self) -> Result<Vec<QualityRule>> {
        self.rules.quality_rules().await
    }

    pub async fn pii_rules(&self) -> Result<Vec<PiiRuleDefinition>> {
        self.rules.pii_rules().await
    }

    pub async fn create_quality_rule(&self, mut rule: QualityRule) -> Result<()> {
        if rule.source_id.is_empty() {
            rule.source_id = self.default_source.clone();
        }
        rule.validate()?;
        if self.rules.quality_rule(&rule.id).await?.is_some() {
            return Err(DomainError::InvalidRule {
                rule: rule.id,
                reason: "a rule with this id already exists".to_string(),
            }
            .into());
        }
        info!(rule = %rule.id, kind = rule.kind(), "Quality rule created");
        self.rules.put_quality_rule(rule).await
    }

    pub async fn update_quality_rule(&self, mut rule: QualityRule) -> Result<Vec<Transition>> {
        if rule.source_id.is_empty() {
            rule.source_id = self.default_source.clone();
        }
        rule.validate()?;
        let previous = self
            .rules
            .quality_rule(&rule.id)
            .await?
            .ok_or_else(|| DomainError::RuleNotFound(rule.id.clone()))?;

        let rule_id = rule.id.clone();
        let enabled = rule.enabled;
        self.rules.put_quality_rule(rule).await?;
        info!(rule = %rule_id, enabled, "Quality rule updated");

        match (previous.enabled, enabled) {
            (true, false) => self.lifecycle.handle(IssueCommand::RuleDisabled { rule_id }).await,
            (false, true) => self.lifecycle.handle(IssueCommand::RuleEnabled { rule_id }).await,
            _ => Ok(vec![]),
        }
    }

    pub async fn set_quality_rule_enabled(
        &self,
        rule_id: &str,
        enabled: bool,
    ) -> Result<Vec<Transition>> {
        let mut rule = self
            .rules
            .quality_rule(rule_id)
            .await?
            .ok_or_else(|| DomainError::RuleNotFound(rule_id.to_string()))?;
        rule.enabled = enabled;
        self.update_quality_rule(rule).await
    }

    pub async fn create_pii_rule(&self, rule: PiiRuleDefinition) -> Result<()> {
        rule.validate()?;
        if self.rules.pii_rule(&rule.pii_type).await?.is_some() {
            return Err(DomainError::InvalidRule {
                rule: rule.pii_type,
                reason: "a PII rule with this type already exists".to_string(),
            }
            .into());
        }
        info!(pii_type = %rule.pii_type, "PII rule created");
        self.rules.put_pii_rule(rule).await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Store write, then cache invalidation, then issue resolution for a relaxed rule. All three
    /// finish before this returns.
    pub async fn update_pii_rule(&self, rule: PiiRuleDefinition) -> Result<Vec<Transition>> {
        rule.validate()?;
        if self.rules.pii_rule(&rule.pii_type).await?.is_none() {
            return Err(DomainError::RuleNotFound(rule.pii_type.clone()).into());
        }

        let pii_type = rule.pii_type.clone();
        let relaxed = if !rule.enabled {
            Some("was disabled")
        } else if rule.protection().is_monitoring() {
            Some("switched to monitoring mode")
        } else {
            None
        };

        self.rules.put_pii_rule(rule).await?;
        self.cache.invalidate();
        info!(pii_type = %pii_type, relaxed = relaxed.is_some(), "PII rule updated");

        match relaxed {
            Some(reason) => {
                self.lifecycle
                    .handle(IssueCommand::PiiRuleRelaxed {
                        pii_type,
                        reason: reason.to_string(),
                    })
                    .await
            }
            None => Ok(vec![]),
        }
    }

    pub async fn set_pii_rule_enabled(
        &self,
        pii_type: &str,
        enabled: bool,
    ) -> Result<Vec<Transition>> {
        let mut rule = self
            .rules
            .pii_rule(pii_type)
            .await?
            .ok_or_else(|| DomainError::RuleNotFound(pii_type.to_string()))?;
        rule.enabled = enabled;
        self.update_pii_rule(rule).await
    }

    /// Brings the store in line with the project files. A definition the files changed since
    /// `previous` goes through the same update path as an API edit; an unchanged one leaves the
    /// stored rule alone, so toggles made through the API survive.
    #[instrument(skip_all)]
    pub async fn apply_declared(
        &self,
        declared: &DeclaredRules,
        previous: &DeclaredRules,
    ) -> Result<Vec<Transition>> {
        let mut transitions = Vec::new();

        for rule in &declared.pii_rules {
            if self.rules.pii_rule(&rule.pii_type).await?.is_none() {
                self.create_pii_rule(rule.clone()).await?;
            } else if previous.pii_rule(&rule.pii_type) != Some(rule) {
                transitions.extend(self.update_pii_rule(rule.clone()).await?);
            }
        }

        for rule in &declared.quality_rules {
            if self.rules.quality_rule(&rule.id).await?.is_none() {
                self.create_quality_rule(rule.clone()).await?;
            } else if previous.quality_rule(&rule.id) != Some(rule) {
                transitions.extend(self.update_quality_rule(rule.clone()).await?);
            }
        }

        let writes: Vec<Transition> = transitions.into_iter().filter(|t| t.kind.writes()).collect();
        if !writes.is_empty() {
            info!(issue_writes = writes.len(), "Project rule changes applied to issues");
        }
        Ok(writes)
    }
}

/// Groups preserving first-seen order of the items inside each group.
fn by_source<T>(items: Vec<T>, source_of: impl Fn(&T) -> String) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(source_of(&item)).or_default().push(item);
    }
    groups
}

fn skipped(assets: &[Asset], reason: &str) -> Vec<SkippedAsset> {
    assets
        .iter()
        .map(|a| SkippedAsset {
            asset_id: a.id.clone(),
            reason: reason.to_string(),
        })
        .collect()
}

fn errored(rule: &QualityRule, error: &dyn std::fmt::Display) -> QualityResult {
    QualityResult::new(&rule.id, &rule.asset_id, ResultStatus::Error)
        .with_message(error.to_string())
}

fn flatten<T>(outcome: std::result::Result<Result<T>, ConnectorError>) -> Result<T> {
    match outcome {
        Ok(inner) => inner,
        Err(e) => Err(e.into()),
    }
}

fn first(transitions: Vec<Transition>) -> Result<Transition> {
    transitions
        .into_iter()
        .next()
        .ok_or_else(|| WardenError::InternalError("lifecycle returned no transition".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::detection::DetectionOutcome;
    use crate::domain::issue::{IssueStatus, TransitionKind};
    use crate::domain::quality::condition::{Condition, Operator};
    use crate::domain::quality::rule::{Dimension, Metric, RuleCheck, Severity};
    use crate::infrastructure::adapters::{DuckDbConnector, InMemoryStore};
    use crate::infrastructure::compiler::JinjaRenderer;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        db: Arc<DuckDbConnector>,
        store: Arc<InMemoryStore>,
        service: WardenService,
    }

    async fn fixture(seed: &str, pii_rules: Vec<PiiRuleDefinition>) -> Result<Fixture> {
        fixture_over(seed, pii_rules, |db| db as Arc<dyn DataSourceConnector>).await
    }

    /// `wrap` decides which connector the service queries through; the catalog stays on DuckDB.
    async fn fixture_over(
        seed: &str,
        pii_rules: Vec<PiiRuleDefinition>,
        wrap: impl FnOnce(Arc<DuckDbConnector>) -> Arc<dyn DataSourceConnector>,
    ) -> Result<Fixture> {
        let db = Arc::new(DuckDbConnector::in_memory("warehouse")?);
        db.execute_batch(seed)?;

        let store = Arc::new(InMemoryStore::new());
        for rule in pii_rules {
            store.put_pii_rule(rule).await?;
        }

        let project = ProjectConfig::new("test");
        let service = WardenService::new(
            &project,
            WardenDeps {
                catalog: db.clone(),
                rules: store.clone(),
                issues: store.clone(),
                results: store.clone(),
                templates: Arc::new(JinjaRenderer::new()),
                connectors: vec![wrap(db.clone())],
            },
        );
        Ok(Fixture { db, store, service })
    }

    /// Single-connection source that records how many queries overlapped.
    struct NarrowSource {
        inner: Arc<DuckDbConnector>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl NarrowSource {
        fn new(inner: Arc<DuckDbConnector>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl DataSourceConnector for NarrowSource {
        fn source_id(&self) -> &str {
            self.inner.source_id()
        }

        fn engine_name(&self) -> &str {
            "duckdb"
        }

        fn max_connections(&self) -> usize {
            1
        }

        async fn execute(
            &self,
            query: &str,
            timeout: Duration,
        ) -> std::result::Result<crate::ports::connector::QueryResult, ConnectorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = self.inner.execute(query, timeout).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn encrypted_email() -> Vec<PiiRuleDefinition> {
        PiiRuleDefinition::builtin()
            .into_iter()
            .map(|mut r| {
                if r.pii_type == "email" {
                    r.requires_encryption = true;
                }
                r
            })
            .collect()
    }

    const CUSTOMERS: &str = "CREATE TABLE customers (customer_id INTEGER, email VARCHAR);
         INSERT INTO customers VALUES
           (1, 'alice@example.com'), (2, 'bob@example.com'), (3, 'carol@example.com'),
           (4, 'dan@example.com'), (5, 'erin@example.com'), (6, 'frank@example.com'),
           (7, 'grace@example.com'), (8, 'heidi@example.com'), (9, 'ivan@example.com'),
           (10, 'not-an-email');";

    fn email_detection(report: &DetectionReport) -> Option<DetectionOutcome> {
        report
            .columns
            .iter()
            .find(|c| c.classification.column == "email")
            .map(|c| c.outcome)
    }

    fn null_check() -> QualityRule {
        QualityRule {
            id: "orders_total_not_null".to_string(),
            description: None,
            asset_id: "main.orders".to_string(),
            column: Some("total".to_string()),
            dimension: Dimension::Completeness,
            severity: Severity::High,
            enabled: true,
            source_id: String::new(),
            check: RuleCheck::Threshold {
                metric: Metric::NullRate,
                condition: Condition::new(Operator::Lt, 0.10),
            },
        }
    }

    #[tokio::test]
    async fn test_monitoring_rule_classifies_without_issue() -> Result<()> {
        let fx = fixture(CUSTOMERS, PiiRuleDefinition::builtin()).await?;
        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;

        assert_eq!(email_detection(&report), Some(DetectionOutcome::Monitored));
        assert!(fx.service.query_issues(&IssueFilter::default()).await?.is_empty());

        let columns = fx.db.list_columns("main.customers").await?;
        let email = columns
            .iter()
            .find(|c| c.name == "email")
            .ok_or_else(|| anyhow::anyhow!("email column missing"))?;
        assert_eq!(email.pii_type.as_deref(), Some("email"));
        assert!(!email.is_sensitive);
        Ok(())
    }

    #[tokio::test]
    async fn test_nine_of_ten_emails_classify_as_pii() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        let report = fx.service.detect_pii(&Target::Asset("main.customers".into())).await?;

        let email = report
            .detections()
            .find(|c| c.classification.column == "email")
            .ok_or_else(|| anyhow::anyhow!("email not detected"))?;
        assert_eq!(email.classification.match_rate, Some(0.9));
        assert!(email.classification.confidence >= 70.0);
        assert_eq!(email.outcome, DetectionOutcome::Unprotected);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_detection_keeps_one_issue() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        let first = fx.service.detect_pii(&Target::source("warehouse")).await?;
        assert_eq!(first.transitions.len(), 1);
        assert_eq!(first.transitions[0].kind, TransitionKind::Opened);

        fx.service.detect_pii(&Target::source("warehouse")).await?;
        let issues = fx.service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Open);
        assert_eq!(issues[0].occurrences, 2);
        assert!(issues[0].remediation.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_encrypted_column_is_protected() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE customers (email VARCHAR);
             INSERT INTO customers VALUES ('aGVsbG8='), ('d29ybGQ='), ('dGVzdA==');",
            encrypted_email(),
        )
        .await?;
        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;
        // Ciphertext does not look like an email, so nothing is raised
        assert_eq!(email_detection(&report), Some(DetectionOutcome::NotPii));
        assert!(fx.service.query_issues(&IssueFilter::default()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rescan_after_encryption_clears_issue() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        fx.service.detect_pii(&Target::source("warehouse")).await?;

        fx.db
            .execute_batch("UPDATE customers SET email = to_base64(encode(email || '-sealed'));")?;
        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].kind, TransitionKind::AutoResolved);

        let issues = fx.service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues[0].status, IssueStatus::Resolved);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_rejected_while_data_unprotected() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        fx.service.detect_pii(&Target::source("warehouse")).await?;
        let issue = fx.service.query_issues(&IssueFilter::default()).await?.remove(0);

        let err = match fx.service.resolve_issue(issue.id).await {
            Err(e) => e,
            Ok(t) => anyhow::bail!("resolve should be rejected, got {:?}", t),
        };
        assert!(matches!(err, WardenError::Domain(DomainError::ResolveRejected { .. })));

        let after = fx.service.issue(issue.id).await?;
        assert_eq!(after.status, IssueStatus::Open);
        assert!(after.description_text().contains("resolution rejected"));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_accepted_after_encryption() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        fx.service.detect_pii(&Target::source("warehouse")).await?;
        let issue = fx.service.query_issues(&IssueFilter::default()).await?.remove(0);

        fx.db
            .execute_batch("UPDATE customers SET email = to_base64(encode(email || '-sealed'));")?;
        let done = fx.service.resolve_issue(issue.id).await?;
        assert_eq!(done.kind, TransitionKind::Resolved);
        assert_eq!(fx.service.issue(issue.id).await?.status, IssueStatus::Resolved);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabling_pii_rule_resolves_and_stops_detection() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        fx.service.detect_pii(&Target::source("warehouse")).await?;

        let transitions = fx.service.set_pii_rule_enabled("email", false).await?;
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::AutoResolved);

        let issues = fx.service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues[0].status, IssueStatus::Resolved);

        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;
        assert!(report.detections().all(|c| c.classification.pii_type.as_deref() != Some("email")));
        Ok(())
    }

    #[tokio::test]
    async fn test_name_hint_needs_whole_token() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE people (schema_name VARCHAR, first_name VARCHAR);
             INSERT INTO people VALUES ('main', 'Ada');",
            PiiRuleDefinition::builtin(),
        )
        .await?;
        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;

        let outcome_of = |name: &str| {
            report
                .columns
                .iter()
                .find(|c| c.classification.column == name)
                .and_then(|c| c.classification.pii_type.clone())
        };
        assert_eq!(outcome_of("schema_name"), None);
        assert_eq!(outcome_of("first_name").as_deref(), Some("name"));
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_opens_issue_then_disable_resolves_it() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE orders (id INTEGER, total DOUBLE);
             INSERT INTO orders VALUES (1, 1), (2, 2), (3, NULL), (4, 4);",
            vec![],
        )
        .await?;
        fx.service.create_quality_rule(null_check()).await?;

        let report = fx.service.scan(None, None).await?;
        assert_eq!(report.aggregate.failed, 1);
        assert_eq!(report.results[0].observed(), Some(0.25));

        fx.service.scan(None, None).await?;
        let issues = fx.service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].occurrences, 2);
        assert_eq!(fx.store.history("orders_total_not_null").await?.len(), 2);

        let transitions = fx
            .service
            .set_quality_rule_enabled("orders_total_not_null", false)
            .await?;
        assert_eq!(transitions[0].kind, TransitionKind::AutoResolved);

        // Disabled rules drop out of a default scan
        let report = fx.service.scan(None, None).await?;
        assert!(report.results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_rejects_unknown_rule() -> Result<()> {
        let fx = fixture("CREATE TABLE orders (id INTEGER);", vec![]).await?;
        let err = fx
            .service
            .scan(None, Some(&["missing".to_string()]))
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert!(matches!(err, WardenError::Domain(DomainError::RuleNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_rule_issue_resolves_once_data_is_fixed() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE orders (id INTEGER, total DOUBLE);
             INSERT INTO orders VALUES (1, 1), (2, NULL);",
            vec![],
        )
        .await?;
        fx.service.create_quality_rule(null_check()).await?;
        fx.service.scan(None, None).await?;
        let issue = fx.service.query_issues(&IssueFilter::default()).await?.remove(0);

        let ack = fx.service.acknowledge_issue(issue.id).await?;
        assert_eq!(ack.kind, TransitionKind::Acknowledged);

        fx.db.execute_batch("UPDATE orders SET total = 0 WHERE total IS NULL;")?;
        let done = fx.service.resolve_issue(issue.id).await?;
        assert_eq!(done.kind, TransitionKind::Resolved);
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_skips_missing_source() -> Result<()> {
        let fx = fixture("CREATE TABLE orders (id INTEGER, total DOUBLE);", vec![]).await?;
        let summary = fx.service.profile(&Target::source("warehouse")).await?;
        assert_eq!(summary.assets_profiled, 1);

        let err = fx.service.profile(&Target::Asset("main.nope".into())).await.err();
        assert!(matches!(err, Some(WardenError::Domain(DomainError::AssetNotFound(_)))));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_detections_share_one_issue() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        let service = Arc::new(fx.service);

        let runs: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.detect_pii(&Target::source("warehouse")).await })
            })
            .collect();
        for run in runs {
            run.await??;
        }

        let issues = service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status, IssueStatus::Open);
        assert_eq!(issues[0].occurrences, 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_scans_share_one_issue() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE orders (id INTEGER, total DOUBLE);
             INSERT INTO orders VALUES (1, 1), (2, NULL);",
            vec![],
        )
        .await?;
        fx.service.create_quality_rule(null_check()).await?;
        let service = Arc::new(fx.service);

        let runs: Vec<_> = (0..3)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.scan(None, None).await })
            })
            .collect();
        for run in runs {
            assert_eq!(run.await??.aggregate.failed, 1);
        }

        let issues = service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].occurrences, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_waits_for_a_source_connection() -> Result<()> {
        let mut narrow = None;
        let fx = fixture_over(
            "CREATE TABLE orders (id INTEGER, total DOUBLE);
             INSERT INTO orders VALUES (1, 1), (2, NULL);",
            vec![],
            |db| {
                let source = NarrowSource::new(db);
                narrow = Some(source.clone());
                source as Arc<dyn DataSourceConnector>
            },
        )
        .await?;
        let narrow = narrow.ok_or_else(|| anyhow::anyhow!("connector not built"))?;

        fx.service.create_quality_rule(null_check()).await?;
        fx.service.scan(None, None).await?;
        let issue = fx.service.query_issues(&IssueFilter::default()).await?.remove(0);
        narrow.peak.store(0, Ordering::SeqCst);

        let (scan, resolve) = tokio::join!(
            fx.service.scan(None, None),
            fx.service.resolve_issue(issue.id)
        );
        scan?;
        assert!(matches!(resolve, Err(WardenError::Domain(DomainError::ResolveRejected { .. }))));
        assert_eq!(narrow.peak.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_relaxing_a_declared_rule_resolves_its_issues() -> Result<()> {
        let fx = fixture(CUSTOMERS, encrypted_email()).await?;
        let before = DeclaredRules {
            pii_rules: encrypted_email(),
            quality_rules: vec![],
        };
        fx.service.detect_pii(&Target::source("warehouse")).await?;
        assert_eq!(fx.service.query_issues(&IssueFilter::default()).await?.len(), 1);

        // The file goes back to monitoring the email rule
        let after = DeclaredRules {
            pii_rules: PiiRuleDefinition::builtin(),
            quality_rules: vec![],
        };
        let transitions = fx.service.apply_declared(&after, &before).await?;
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::AutoResolved);

        let issues = fx.service.query_issues(&IssueFilter::default()).await?;
        assert_eq!(issues[0].status, IssueStatus::Resolved);
        let report = fx.service.detect_pii(&Target::source("warehouse")).await?;
        assert_eq!(email_detection(&report), Some(DetectionOutcome::Monitored));
        Ok(())
    }

    #[tokio::test]
    async fn test_declared_disable_applies_but_unchanged_files_keep_toggles() -> Result<()> {
        let fx = fixture(
            "CREATE TABLE orders (id INTEGER, total DOUBLE);
             INSERT INTO orders VALUES (1, 1), (2, NULL);",
            vec![],
        )
        .await?;
        let enabled = DeclaredRules {
            pii_rules: vec![],
            quality_rules: vec![null_check()],
        };
        fx.service.apply_declared(&enabled, &DeclaredRules::default()).await?;
        fx.service.scan(None, None).await?;

        // Unchanged file: the toggle made through the service stays
        fx.service.set_quality_rule_enabled("orders_total_not_null", false).await?;
        fx.service.apply_declared(&enabled, &enabled).await?;
        assert!(fx.store.quality_rule("orders_total_not_null").await?.is_some_and(|r| !r.enabled));

        fx.service.set_quality_rule_enabled("orders_total_not_null", true).await?;
        fx.service.scan(None, None).await?;
        assert_eq!(
            fx.service.query_issues(&IssueFilter::default()).await?[0].status,
            IssueStatus::Open
        );

        // The file itself now disables the rule
        let mut rule = null_check();
        rule.enabled = false;
        let disabled = DeclaredRules {
            pii_rules: vec![],
            quality_rules: vec![rule],
        };
        let transitions = fx.service.apply_declared(&disabled, &enabled).await?;
        assert_eq!(transitions[0].kind, TransitionKind::AutoResolved);
        assert!(fx.store.quality_rule("orders_total_not_null").await?.is_some_and(|r| !r.enabled));
        Ok(())
    }
}
