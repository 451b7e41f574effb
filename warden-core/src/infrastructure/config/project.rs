// warden-core/src/infrastructure/config/project.rs

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use validator::Validate;
use walkdir::WalkDir;

use crate::domain::governance::pii::PiiRuleDefinition;
use crate::domain::project::ProjectConfig;
use crate::domain::quality::rule::QualityRule;
use crate::infrastructure::error::InfrastructureError;

const MAIN_CONFIG_CANDIDATES: [&str; 2] = ["warden.yaml", "warden.yml"];
const RULES_DIR: &str = "rules.d";

/// Satellite file shape. Every section is optional so one file can carry either kind of rule.
#[derive(Debug, Default, Deserialize)]
struct RuleFragment {
    #[serde(default)]
    pii_rules: Vec<PiiRuleDefinition>,
    #[serde(default)]
    rules: Vec<QualityRule>,
}

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    // 1. Main file
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project configuration");

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read project config at {:?}", config_path))?;
    let mut config: ProjectConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse project config YAML at {:?}", config_path))?;

    // 2. Satellites: a corrupted rule file stops the load
    for folder in config.config_paths.clone() {
        let config_dir = project_dir.join(folder);
        if config_dir.exists() {
            load_satellite_configs(&mut config, &config_dir)?;
        }
    }
    load_rules_dir(&mut config, &project_dir.join(RULES_DIR))?;

    finalize(&mut config)?;
    Ok(config)
}

/// Defaults plus built-in PII rules when the directory holds no project file.
pub fn load_or_default(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    match load_project_config(project_dir) {
        Err(InfrastructureError::ConfigNotFound(msg)) => {
            warn!("{}; using defaults", msg);
            let name = project_dir
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "warden".to_string());
            let mut config = ProjectConfig::new(&name);
            finalize(&mut config)?;
            Ok(config)
        }
        other => other,
    }
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    MAIN_CONFIG_CANDIDATES
        .iter()
        .map(|f| root.join(f))
        .find(|p| p.exists())
        .ok_or_else(|| {
            InfrastructureError::ConfigNotFound(format!(
                "No configuration file found in {:?}. Checked: {:?}",
                root, MAIN_CONFIG_CANDIDATES
            ))
        })
}

fn load_fragment<T: DeserializeOwned>(path: &Path) -> Result<T, InfrastructureError> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config fragment at {:?}", path))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML fragment at {:?}", path))
        .map_err(Into::into)
}

fn load_satellite_configs(
    config: &mut ProjectConfig,
    config_dir: &Path,
) -> Result<(), InfrastructureError> {
    let pii_path = config_dir.join("pii_rules.yml");
    if pii_path.exists() {
        let fragment: RuleFragment = load_fragment(&pii_path)?;
        info!(count = fragment.pii_rules.len(), "PII rules loaded");
        config.pii_rules.extend(fragment.pii_rules);
    }

    let quality_path = config_dir.join("quality.yml");
    if quality_path.exists() {
        let fragment: RuleFragment = load_fragment(&quality_path)?;
        info!(count = fragment.rules.len(), "Quality rules loaded");
        config.quality_rules.extend(fragment.rules);
    }
    Ok(())
}

fn load_rules_dir(config: &mut ProjectConfig, dir: &Path) -> Result<(), InfrastructureError> {
    if !dir.exists() {
        return Ok(());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x == "yml" || x == "yaml")
        })
        .collect();
    files.sort();

    for path in files {
        let fragment: RuleFragment = load_fragment(&path)?;
        info!(
            path = ?path,
            pii = fragment.pii_rules.len(),
            quality = fragment.rules.len(),
            "Rule file loaded"
        );
        config.pii_rules.extend(fragment.pii_rules);
        config.quality_rules.extend(fragment.rules);
    }
    Ok(())
}

fn apply_env_overrides(config: &mut ProjectConfig) {
    if let Ok(val) = std::env::var("WARDEN_DATABASE") {
        info!(old = ?config.database, new = ?val, "Overriding database via ENV");
        config.database = val;
    }
    if let Ok(val) = std::env::var("WARDEN_STATE_PATH") {
        info!(old = ?config.state_path, new = ?val, "Overriding state path via ENV");
        config.state_path = val;
    }
    if let Ok(val) = std::env::var("WARDEN_MAX_CONNECTIONS") {
        match val.parse::<usize>() {
            Ok(n) => {
                info!(old = config.max_connections, new = n, "Overriding max connections via ENV");
                config.max_connections = n;
            }
            Err(_) => warn!(value = %val, "Ignoring non-numeric WARDEN_MAX_CONNECTIONS"),
        }
    }
}

fn finalize(config: &mut ProjectConfig) -> Result<(), InfrastructureError> {
    if config.pii_rules.is_empty() {
        config.pii_rules = PiiRuleDefinition::builtin();
    }
    for rule in &mut config.quality_rules {
        if rule.source_id.is_empty() {
            rule.source_id = config.source_id.clone();
        }
    }

    apply_env_overrides(config);

    config
        .validate()
        .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;
    for rule in &config.pii_rules {
        rule.validate()
            .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;
    }
    for rule in &config.quality_rules {
        rule.validate()
            .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_full_project_layout() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("warden.yaml"),
            "name: shop\ndatabase: shop.duckdb\npolicy:\n  min_confidence: 80\n",
        )?;
        fs::create_dir_all(dir.path().join("config"))?;
        fs::write(
            dir.path().join("config/pii_rules.yml"),
            "pii_rules:\n  - pii_type: email\n    hints: [email]\n    sensitivity: high\n    requires_encryption: true\n",
        )?;
        fs::write(
            dir.path().join("config/quality.yml"),
            "rules:\n  - id: null_check\n    asset_id: main.orders\n    column: total\n    dimension: completeness\n    kind: threshold\n    metric: null_rate\n    condition: '< 0.10'\n",
        )?;
        fs::create_dir_all(dir.path().join("rules.d/team"))?;
        fs::write(
            dir.path().join("rules.d/team/rows.yaml"),
            "rules:\n  - id: has_rows\n    asset_id: main.orders\n    dimension: completeness\n    kind: threshold\n    metric: row_count\n    condition: '> 0'\n",
        )?;

        let config = load_project_config(dir.path())?;
        assert_eq!(config.name, "shop");
        assert_eq!(config.policy.min_confidence, 80.0);
        assert_eq!(config.pii_rules.len(), 1);
        assert!(config.pii_rules[0].requires_encryption);
        assert_eq!(config.quality_rules.len(), 2);
        assert!(config.quality_rules.iter().all(|r| r.source_id == "warehouse"));
        Ok(())
    }

    #[test]
    fn test_missing_project_falls_back_to_builtins() -> Result<()> {
        let dir = tempdir()?;
        assert!(matches!(
            load_project_config(dir.path()),
            Err(InfrastructureError::ConfigNotFound(_))
        ));
        let config = load_or_default(dir.path())?;
        assert_eq!(config.pii_rules.len(), 7);
        assert!(config.quality_rules.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_rule_rejects_load() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("warden.yaml"), "name: shop\n")?;
        fs::create_dir_all(dir.path().join("config"))?;
        fs::write(
            dir.path().join("config/pii_rules.yml"),
            "pii_rules:\n  - pii_type: broken\n    hints: [x]\n    regex: '(['\n",
        )?;
        assert!(matches!(
            load_project_config(dir.path()),
            Err(InfrastructureError::ConfigError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_out_of_range_policy_rejected() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("warden.yaml"),
            "name: shop\npolicy:\n  cache_ttl_secs: 120\n",
        )?;
        assert!(matches!(
            load_project_config(dir.path()),
            Err(InfrastructureError::ConfigError(_))
        ));
        Ok(())
    }
}
