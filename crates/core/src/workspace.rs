//! Per-request scratch workspaces.
//!
//! [`WorkspaceManager::open_session`] allocates a uniquely named directory
//! (`render-<uuid>`) under the configured root. Every file a render writes
//! lives inside it, and the directory is removed exactly once: by an explicit
//! [`Session::close`], or by `Drop` when the owning future is abandoned.
//! Removal is best-effort; failures are logged and never propagated.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Directory name prefix for session workspaces.
pub const SESSION_DIR_PREFIX: &str = "render-";

/// A file written into a session workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedAsset {
    /// Input position for images; `None` for the audio track.
    pub ordinal: Option<usize>,
    /// Location inside the session root.
    pub path: PathBuf,
}

/// Allocates session workspaces under a common root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty session directory.
    pub async fn open_session(&self) -> io::Result<Session> {
        tokio::fs::create_dir_all(&self.root).await?;

        let id = Uuid::new_v4();
        let root = self.root.join(format!("{SESSION_DIR_PREFIX}{id}"));
        // `create_dir` (not `_all`) so a token collision fails loudly.
        tokio::fs::create_dir(&root).await?;

        tracing::debug!(session_id = %id, root = %root.display(), "Opened render session");
        Ok(Session {
            id,
            root,
            closed: false,
        })
    }
}

/// An isolated, disposable directory owned by one render request.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    root: PathBuf,
    closed: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the session, without touching the filesystem.
    pub fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `bytes` to `name` inside the session and return the full path.
    pub async fn materialize(&self, bytes: &[u8], name: &str) -> io::Result<PathBuf> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove the session directory. Idempotent; never fails.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::debug!(session_id = %self.id, "Removed render session workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %self.id,
                root = %self.root.display(),
                error = %e,
                "Failed to remove render session workspace"
            ),
        }
        self.closed = true;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => tracing::debug!(session_id = %self.id, "Removed abandoned render session workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %self.id,
                root = %self.root.display(),
                error = %e,
                "Failed to remove abandoned render session workspace"
            ),
        }
    }
}

/// Reject names that could escape the session root.
fn validate_file_name(name: &str) -> io::Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid workspace file name '{name}'"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
