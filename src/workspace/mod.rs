//! Per-load workspaces
//!
//! A workspace is a fresh directory owned by exactly one load operation. It
//! holds the materialized archive and the extracted tree. Dropping a
//! [`Workspace`] leaves the directory on disk: it is removed only by
//! [`Workspace::release`], or at the end of [`Workspace::scoped`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::WorkspaceConfig;
use crate::error::SetupError;

/// An exclusively owned directory for one load operation.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a new, empty workspace under the configured base directory.
    ///
    /// The directory name carries a random suffix and is created with
    /// `create_dir`, so an existing directory is never reused. The stored
    /// root is canonical.
    pub fn create(config: &WorkspaceConfig) -> Result<Self, SetupError> {
        let base = config.base_dir();
        let root = base.join(format!("{}{}", config.prefix, uuid::Uuid::new_v4()));

        let creation_err = |source| SetupError::WorkspaceCreation {
            path: root.clone(),
            source,
        };
        fs::create_dir(&root).map_err(creation_err)?;
        let root = fs::canonicalize(&root).map_err(creation_err)?;

        debug!(path = %root.display(), "workspace created");
        Ok(Self { root })
    }

    /// Run `f` in a new workspace and release it on every exit path.
    ///
    /// When `f` fails its error is returned and a release failure is only
    /// logged. When `f` succeeds a release failure is returned.
    pub fn scoped<T, F>(config: &WorkspaceConfig, f: F) -> Result<T, SetupError>
    where
        F: FnOnce(&Workspace) -> Result<T, SetupError>,
    {
        let workspace = Self::create(config)?;
        let result = f(&workspace);
        settle(result, workspace.release())
    }

    /// Root directory of the workspace.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of `relative` inside the workspace.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Regular files under the workspace, relative to its root, sorted.
    pub fn extracted_files(&self) -> Result<Vec<PathBuf>, SetupError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    files.push(rel.to_path_buf());
                }
            }
        }
        Ok(files)
    }

    /// Remove the workspace and everything in it.
    ///
    /// A workspace that is already gone is not an error.
    pub fn release(self) -> Result<(), SetupError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!(path = %self.root.display(), "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.root.display(), "workspace already removed");
                Ok(())
            }
            Err(source) => Err(SetupError::WorkspaceRelease {
                path: self.root,
                source,
            }),
        }
    }
}

/// Combine the outcome of scoped work with the release of its workspace.
pub(crate) fn settle<T>(
    result: Result<T, SetupError>,
    released: Result<(), SetupError>,
) -> Result<T, SetupError> {
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(error = %release_err, "workspace release failed after load error");
            Err(err)
        }
    }
}
