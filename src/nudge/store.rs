use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::nudge::model::Snapshot;

/// Best-effort persistence for the scheduler snapshot.
///
/// A missing or corrupt store must never take the scheduler down: `load`
/// answers `None` instead of failing (a cold start), and callers log and drop
/// `save` errors so the cadence continues even when the disk does not.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Option<Snapshot>;
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Option<Snapshot> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    "ignoring malformed snapshot {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, format!("{text}\n"))
            .with_context(|| format!("unable to write snapshot file {}", self.path.display()))?;
        Ok(())
    }
}
