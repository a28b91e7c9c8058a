use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hands out one private directory per job under a common root.
#[derive(Clone, Debug)]
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

    /// Makes sure the shared root exists. Called once at startup.
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        info!("📁 Workspace root: {}", self.root.display());
        Ok(())
    }

    pub async fn create(&self, job_id: Uuid) -> io::Result<Workspace> {
        let dir = self.root.join(job_id.simple().to_string());
        tokio::fs::create_dir_all(&self.root).await?;
        // create_dir (not _all) so a colliding id fails instead of sharing.
        tokio::fs::create_dir(&dir).await?;
        debug!("Created workspace {}", dir.display());

        Ok(Workspace {
            dir,
            torn_down: AtomicBool::new(false),
        })
    }
}

/// The temporary files of one job. Removed exactly once: by an explicit
/// [`Workspace::teardown`] or, failing that, when the value is dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    torn_down: AtomicBool,
}

impl Workspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a file inside this workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Removes everything the job wrote. Missing files are not an error and
    /// every call after the first does nothing.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("🗑️  Cleaned up workspace {}", self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up workspace {}: {}", self.dir.display(), e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let dir = std::mem::take(&mut self.dir);
        let remove = move || match std::fs::remove_dir_all(&dir) {
            Ok(()) => debug!("🗑️  Cleaned up abandoned workspace {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clean up workspace {}: {}", dir.display(), e),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}
