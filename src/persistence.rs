//! Snapshot file for crash recovery.
//!
//! The whole set of running tasks is written as one JSON document. Writes
//! go to a temp file in the same directory and are renamed into place, so a
//! reader never observes a partial file. Saves through one store (and its
//! clones) are serialized, since they share the temp file.

use crate::task::TaskSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Persisted snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "savedAt", default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks: Vec<TaskSnapshot>,
}

/// Reads and writes the snapshot document at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the snapshot with `tasks`.
    pub fn save(&self, tasks: Vec<TaskSnapshot>, now: DateTime<Utc>) -> crate::Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Some(now),
            tasks,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| crate::LoopError::Persistence(format!("cannot serialize snapshot: {e}")))?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_atomic(&self.path, &json)
            .map_err(|e| crate::LoopError::Persistence(format!("cannot write snapshot: {e}")))
    }

    /// Read the snapshot. A missing file is an empty snapshot.
    pub fn load(&self) -> crate::Result<Vec<TaskSnapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(crate::LoopError::Persistence(format!(
                    "cannot read snapshot: {e}"
                )));
            }
        };
        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| crate::LoopError::Persistence(format!("cannot parse snapshot: {e}")))?;
        if file.version > SNAPSHOT_VERSION {
            return Err(crate::LoopError::Persistence(format!(
                "unsupported snapshot version {}",
                file.version
            )));
        }
        Ok(file.tasks)
    }

    /// Like [`Self::load`], but any failure is logged and yields nothing.
    pub fn load_or_empty(&self) -> Vec<TaskSnapshot> {
        match self.load() {
            Ok(tasks) => {
                tracing::debug!(
                    path = %self.path.display(),
                    count = tasks.len(),
                    "loaded task snapshot"
                );
                tasks
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring snapshot: {e}");
                Vec::new()
            }
        }
    }
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tasks"),
        std::process::id()
    );
    let tmp_path = path
        .parent()
        .map(|p| p.join(&tmp_name))
        .unwrap_or_else(|| PathBuf::from(&tmp_name));

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
