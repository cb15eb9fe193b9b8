use crate::models::ArchiveError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Private directory owned by one validation run.
///
/// The directory and everything extracted into it is removed when the value
/// is dropped, whichever way the run ends.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates a uniquely named directory beneath `parent`.
    pub fn create_in(parent: &Path) -> Result<Self, ArchiveError> {
        fs::create_dir_all(parent).map_err(|e| {
            ArchiveError::Io(format!(
                "Failed to create workspace parent {}: {}",
                parent.display(),
                e
            ))
        })?;

        let root = parent.join(format!("shapecheck_{}", Uuid::new_v4().simple()));
        fs::create_dir(&root).map_err(|e| {
            ArchiveError::Io(format!(
                "Failed to create workspace {}: {}",
                root.display(),
                e
            ))
        })?;

        debug!("Created workspace {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a workspace-relative path that the archive inspector already
    /// vetted.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed workspace {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {}: {}", self.root.display(), e),
        }
    }
}
