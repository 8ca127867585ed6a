//! Scratch directory management for subprocess signing
//!
//! Each signing attempt owns one uniquely-named directory holding the
//! unsigned input, the extracted certificate and key, and the signed
//! output. Everything under the directory is removed when the workspace is
//! released, on every exit path; extracted key material must never outlive
//! the signing call. A startup sweep removes directories orphaned by a
//! crash before their [`Workspace::dispose`] could run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SignError};

/// How long an orphaned scratch directory survives before the sweep
/// removes it.
pub const STALE_RETENTION: Duration = Duration::from_secs(3_600);

const SCRATCH_DIR_PREFIX: &str = "signing-";

/// Default application-writable root for scratch directories.
pub fn default_root() -> PathBuf {
    std::env::temp_dir().join("profile-signer")
}

/// Exclusively-owned scratch directory for one signing attempt.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    disposed: bool,
}

impl Workspace {
    /// Create a fresh, uniquely-named directory under `root` and verify it
    /// is writable by writing and removing a probe file.
    ///
    /// Creation failures and permission failures are distinct: the former
    /// usually means disk or path problems, the latter a sandbox issue.
    pub fn create(root: &Path) -> Result<Self> {
        let dir = root.join(format!("{SCRATCH_DIR_PREFIX}{}", Uuid::new_v4()));

        fs::create_dir_all(&dir).map_err(|e| SignError::TempDirCreationFailed(e.to_string()))?;
        if !dir.is_dir() {
            return Err(SignError::TempDirCreationFailed(format!(
                "{} missing after creation",
                dir.display()
            )));
        }

        let probe = dir.join(".probe");
        if fs::write(&probe, b"probe").is_err() || fs::remove_file(&probe).is_err() {
            let _ = fs::remove_dir_all(&dir);
            return Err(SignError::DirectoryAccessDenied(dir));
        }

        debug!("created scratch directory {}", dir.display());
        Ok(Workspace {
            dir,
            disposed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of a named artifact inside the workspace.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.artifact(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn read_artifact(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.artifact(name))?)
    }

    /// Remove the directory and everything beneath it. Idempotent and
    /// infallible; removal problems are logged, not returned.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("removed scratch directory {}", self.dir.display()),
            Err(e) => warn!(
                "failed to remove scratch directory {}: {e}",
                self.dir.display()
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Remove scratch directories under `root` older than `retention`.
///
/// Crash-recovery safety net for workspaces whose `dispose()` never ran;
/// per-call teardown remains the primary cleanup. Best-effort: problems are
/// logged and skipped.
pub fn sweep_stale(root: &Path, retention: Duration) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        // Nothing to sweep until the first workspace is created.
        Err(_) => return,
    };

    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SCRATCH_DIR_PREFIX) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        match age {
            Some(age) if age > retention => {
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!("failed to sweep stale workspace {}: {e}", path.display());
                } else {
                    debug!("swept stale workspace {}", path.display());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_read_dispose() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).unwrap();
        assert!(ws.path().is_dir());

        ws.write_artifact("unsigned.mobileconfig", b"payload").unwrap();
        assert_eq!(ws.read_artifact("unsigned.mobileconfig").unwrap(), b"payload");

        let dir = ws.path().to_path_buf();
        ws.dispose();
        assert!(!dir.exists());
        // Idempotent.
        ws.dispose();
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir;
        {
            let ws = Workspace::create(root.path()).unwrap();
            dir = ws.path().to_path_buf();
            assert!(dir.is_dir());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn create_fails_against_unwritable_root() {
        // A file in place of the root directory: create_dir_all must fail.
        let holder = tempfile::tempdir().unwrap();
        let blocked = holder.path().join("not-a-dir");
        fs::write(&blocked, b"x").unwrap();

        let err = Workspace::create(&blocked).unwrap_err();
        assert!(matches!(err, SignError::TempDirCreationFailed(_)));
    }

    #[test]
    fn sweep_removes_only_stale_prefixed_entries() {
        let root = tempfile::tempdir().unwrap();

        let stale = root.path().join("signing-stale");
        let foreign = root.path().join("unrelated");
        fs::create_dir(&stale).unwrap();
        fs::create_dir(&foreign).unwrap();

        let fresh = Workspace::create(root.path()).unwrap();

        // Zero retention makes every prefixed entry stale once its age is
        // measurable.
        std::thread::sleep(Duration::from_millis(50));
        sweep_stale(root.path(), Duration::from_secs(0));

        assert!(!stale.exists());
        assert!(foreign.exists());
        // The freshly created workspace is also prefixed, so it is swept;
        // dropping it afterwards must stay silent.
        drop(fresh);
    }

    #[test]
    fn sweep_keeps_recent_entries() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        sweep_stale(root.path(), STALE_RETENTION);
        assert!(ws.path().is_dir());
    }
}
