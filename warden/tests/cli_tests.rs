use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const SEED: &str = "
    CREATE TABLE customers (customer_id INTEGER, email VARCHAR, first_name VARCHAR);
    INSERT INTO customers VALUES
      (1, 'alice@example.com', 'Alice'), (2, 'bob@example.com', 'Bob'),
      (3, 'carol@example.com', 'Carol'), (4, 'dan@example.com', 'Dan');
    CREATE TABLE orders (id INTEGER, total DOUBLE);
    INSERT INTO orders VALUES (1, 1), (2, 2), (3, NULL), (4, 4);
";

/// A throwaway project: warden.yaml, rule files and a seeded DuckDB file.
struct WardenTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl WardenTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("shop");
        fs::create_dir_all(root.join("config"))?;

        fs::write(root.join("warden.yaml"), "name: shop\ndatabase: shop.duckdb\n")?;
        fs::write(
            root.join("config/pii_rules.yml"),
            "pii_rules:
  - pii_type: email
    hints: [email]
    regex: '^[^@]+@[^@]+\\.[a-z]+$'
    sensitivity: high
    requires_encryption: true
  - pii_type: name
    hints: [first_name, last_name]
    sensitivity: medium
",
        )?;
        fs::write(
            root.join("config/quality.yml"),
            "rules:
  - id: orders_total_not_null
    asset_id: main.orders
    column: total
    dimension: completeness
    severity: high
    kind: threshold
    metric: null_rate
    condition: '< 0.10'
  - id: orders_have_rows
    asset_id: main.orders
    dimension: completeness
    kind: threshold
    metric: row_count
    condition: '> 0'
",
        )?;

        let conn = duckdb::Connection::open(root.join("shop.duckdb"))?;
        conn.execute_batch(SEED)?;
        drop(conn);

        Ok(Self { _tmp: tmp, root })
    }

    fn empty() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        Ok(Self { _tmp: tmp, root })
    }

    fn warden(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("warden"));
        cmd.arg("--project-dir").arg(&self.root);
        cmd.env_remove("RUST_LOG");
        cmd.env_remove("WARDEN_DATABASE");
        cmd.env_remove("WARDEN_STATE_PATH");
        cmd
    }

    fn issues_json(&self, extra: &[&str]) -> Result<Vec<serde_json::Value>> {
        let output = self
            .warden()
            .args(["--json", "-q", "issues", "list"])
            .args(extra)
            .output()?;
        anyhow::ensure!(output.status.success(), "issues list failed");
        let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        value
            .as_array()
            .cloned()
            .context("issues list did not print an array")
    }
}

#[test]
fn test_scan_failure_opens_issue_across_invocations() -> Result<()> {
    let env = WardenTestEnv::new()?;

    // A failed rule is a finding: non-zero exit for CI
    env.warden()
        .arg("scan")
        .assert()
        .failure()
        .stdout(predicate::str::contains("orders_total_not_null"))
        .stdout(predicate::str::contains("failed"));

    let issues = env.issues_json(&[])?;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["status"], "open");

    env.warden().arg("scan").assert().failure();
    let issues = env.issues_json(&[])?;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["occurrences"], 2);
    Ok(())
}

#[test]
fn test_single_passing_rule_succeeds() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden()
        .args(["scan", "--rule", "orders_have_rows"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 passed"));
    assert!(env.issues_json(&[])?.is_empty());
    Ok(())
}

#[test]
fn test_detect_and_rejected_resolve() -> Result<()> {
    let env = WardenTestEnv::new()?;

    env.warden()
        .arg("detect")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unprotected"));

    let issues = env.issues_json(&["--pii-only"])?;
    assert_eq!(issues.len(), 1);
    let id = issues[0]["id"].as_str().context("issue id missing")?.to_string();

    env.warden()
        .args(["issues", "resolve", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rejected"));

    let issues = env.issues_json(&["--status", "open"])?;
    assert_eq!(issues.len(), 1);
    Ok(())
}

#[test]
fn test_disabling_pii_rule_resolves_its_issue() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden().arg("detect").assert().failure();

    env.warden()
        .args(["rules", "disable", "email", "--pii"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auto_resolved"));

    assert_eq!(env.issues_json(&["--status", "resolved"])?.len(), 1);

    // The toggle survives a reload of the project files
    env.warden().arg("detect").assert().success();
    Ok(())
}

#[test]
fn test_relaxing_pii_rule_file_resolves_its_issue() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden().arg("detect").assert().failure();
    assert_eq!(env.issues_json(&["--status", "open"])?.len(), 1);

    let path = env.root.join("config/pii_rules.yml");
    let relaxed = fs::read_to_string(&path)?
        .replace("requires_encryption: true", "requires_encryption: false");
    fs::write(&path, relaxed)?;

    let resolved = env.issues_json(&["--status", "resolved"])?;
    assert_eq!(resolved.len(), 1);
    assert!(env.issues_json(&["--status", "open"])?.is_empty());
    Ok(())
}

#[test]
fn test_disabled_in_rule_file_takes_effect() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden().args(["rules", "list"]).assert().success();

    let path = env.root.join("config/quality.yml");
    let disabled = fs::read_to_string(&path)?.replace(
        "    condition: '< 0.10'\n",
        "    condition: '< 0.10'\n    enabled: false\n",
    );
    fs::write(&path, disabled)?;

    let output = env.warden().args(["--json", "-q", "rules", "list"]).output()?;
    assert!(output.status.success());
    let rules: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let total = rules["quality_rules"]
        .as_array()
        .and_then(|rules| rules.iter().find(|r| r["id"] == "orders_total_not_null"))
        .context("orders_total_not_null missing")?;
    assert_eq!(total["enabled"], false);

    // The disabled rule no longer fails the scan
    env.warden().arg("scan").assert().success();
    assert!(env.issues_json(&[])?.is_empty());
    Ok(())
}

#[test]
fn test_profile_json() -> Result<()> {
    let env = WardenTestEnv::new()?;
    let output = env.warden().args(["--json", "-q", "profile"]).output()?;
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["assets_profiled"], 2);
    Ok(())
}

#[test]
fn test_defaults_without_project_file() -> Result<()> {
    let env = WardenTestEnv::empty()?;
    env.warden()
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("credit_card"))
        .stdout(predicate::str::contains("monitoring"));
    Ok(())
}

#[test]
fn test_unknown_issue_is_an_error() -> Result<()> {
    let env = WardenTestEnv::new()?;
    env.warden()
        .args(["issues", "ack", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}
