//! Credential checks and on-disk credential artifacts.
//!
//! A task's raw credential is written to `<dir>/<task_id>.txt` when the
//! task starts so operators can inspect or reuse it, and so recovered tasks
//! can log in again after a process restart. The file is removed on stop.

use std::path::PathBuf;

/// Marker identifying the account a session belongs to.
pub const SESSION_IDENTITY_MARKER: &str = "c_user";

/// Marker carrying the session token.
pub const SESSION_TOKEN_MARKER: &str = "xs";

/// Structural check: the blob must mention both session markers.
pub fn validate_credential(blob: &str) -> crate::Result<()> {
    let missing: Vec<&str> = [SESSION_IDENTITY_MARKER, SESSION_TOKEN_MARKER]
        .into_iter()
        .filter(|marker| !blob.contains(marker))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::LoopError::InvalidCredentialFormat(format!(
            "missing {}",
            missing.join(" and ")
        )))
    }
}

/// Directory of persisted credential artifacts.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    dir: PathBuf,
}

impl CredentialVault {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{task_id}.txt"))
    }

    /// Write (or overwrite) the artifact for `task_id`.
    pub fn store(&self, task_id: &str, credential: &str) -> crate::Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            crate::LoopError::Persistence(format!("cannot create credentials dir: {e}"))
        })?;
        let path = self.path_for(task_id);
        std::fs::write(&path, credential)
            .map_err(|e| crate::LoopError::Persistence(format!("cannot write credential: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| crate::LoopError::Persistence(format!("cannot restrict credential: {e}")),
            )?;
        }
        Ok(())
    }

    /// Read the artifact for `task_id`, if present.
    pub fn load(&self, task_id: &str) -> crate::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(task_id)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::LoopError::Persistence(format!(
                "cannot read credential: {e}"
            ))),
        }
    }

    /// Delete the artifact for `task_id`. Returns `true` when a file was removed.
    pub fn remove(&self, task_id: &str) -> crate::Result<bool> {
        match std::fs::remove_file(self.path_for(task_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(crate::LoopError::Persistence(format!(
                "cannot delete credential: {e}"
            ))),
        }
    }
}
