// warden-core/src/infrastructure/state.rs

// JSON snapshot of the store between CLI invocations. Writes go through a temp file in the
// target directory and a rename, so a crash leaves either the old or the new state.

use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, instrument};

use crate::infrastructure::adapters::memory::StoreState;
use crate::infrastructure::error::InfrastructureError;

fn atomic_write(path: &Path, content: &[u8]) -> Result<(), InfrastructureError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| InfrastructureError::Io(e.error))?;
    Ok(())
}

/// Empty state when the file does not exist yet.
#[instrument]
pub fn load_state(path: &Path) -> Result<StoreState, InfrastructureError> {
    if !path.exists() {
        debug!("No state file yet, starting empty");
        return Ok(StoreState::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[instrument(skip(state))]
pub fn save_state(path: &Path, state: &StoreState) -> Result<(), InfrastructureError> {
    let json = serde_json::to_vec_pretty(state)?;
    atomic_write(path, &json)?;
    debug!(bytes = json.len(), "State saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::governance::pii::PiiRuleDefinition;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty_state() -> Result<()> {
        let dir = tempdir()?;
        let state = load_state(&dir.path().join("absent.json"))?;
        assert!(state.quality_issues.is_empty());
        Ok(())
    }

    #[test]
    fn test_save_creates_parent_and_overwrites() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(".warden").join("state.json");

        let mut state = StoreState::default();
        save_state(&path, &state)?;
        state.pii_rule_definitions = PiiRuleDefinition::builtin();
        save_state(&path, &state)?;

        let loaded = load_state(&path)?;
        assert_eq!(loaded.pii_rule_definitions.len(), 7);
        Ok(())
    }

    #[test]
    fn test_corrupted_state_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json")?;
        assert!(matches!(load_state(&path), Err(InfrastructureError::JsonError(_))));
        Ok(())
    }
}
