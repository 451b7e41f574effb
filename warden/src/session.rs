// warden/src/session.rs
//
// Wires the adapters for one CLI invocation: project config, DuckDB source, state file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use warden_core::application::{WardenDeps, WardenService};
use warden_core::domain::project::ProjectConfig;
use warden_core::infrastructure::state::{load_state, save_state};
use warden_core::infrastructure::{DuckDbConnector, InMemoryStore, JinjaRenderer, load_or_default};

pub struct Session {
    pub config: ProjectConfig,
    pub service: WardenService,
    db: Arc<DuckDbConnector>,
    store: Arc<InMemoryStore>,
    state_path: PathBuf,
}

impl Session {
    pub async fn open(project_dir: &Path) -> Result<Self> {
        let config = load_or_default(project_dir).with_context(|| {
            format!("Failed to load project config from {}", project_dir.display())
        })?;

        let db_path = resolve(project_dir, &config.database);
        let db = Arc::new(
            DuckDbConnector::open(&config.source_id, &db_path, config.max_connections)
                .with_context(|| format!("Failed to open database {}", db_path))?,
        );

        let state_path = PathBuf::from(resolve(project_dir, &config.state_path));
        let state = load_state(&state_path)
            .with_context(|| format!("Failed to read state file {}", state_path.display()))?;
        db.restore_classifications(state.classifications.clone());

        let store = Arc::new(InMemoryStore::from_state(state));
        let service = WardenService::new(
            &config,
            WardenDeps {
                catalog: db.clone(),
                rules: store.clone(),
                issues: store.clone(),
                results: store.clone(),
                templates: Arc::new(JinjaRenderer::new()),
                connectors: vec![db.clone()],
            },
        );

        let declared = config.declared_rules();
        let changes = service
            .apply_declared(&declared, &store.declared().await)
            .await
            .context("Failed to apply rule definitions from the project files")?;
        store.set_declared(declared).await;
        debug!(
            project = %config.name,
            pii_rules = config.pii_rules.len(),
            quality_rules = config.quality_rules.len(),
            issue_writes = changes.len(),
            "Session opened"
        );

        Ok(Self {
            config,
            service,
            db,
            store,
            state_path,
        })
    }

    pub async fn save(&self) -> Result<()> {
        self.store.set_classifications(self.db.classifications()).await;
        let state = self.store.snapshot().await;
        save_state(&self.state_path, &state)
            .with_context(|| format!("Failed to write state file {}", self.state_path.display()))
    }
}

fn resolve(project_dir: &Path, path: &str) -> String {
    if path == ":memory:" || Path::new(path).is_absolute() {
        return path.to_string();
    }
    project_dir.join(path).to_string_lossy().into_owned()
}
