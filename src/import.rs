// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Import of live files into the tracked subtree.
//!
//! Importing is the inverse of installing. A file that already lives in the
//! target root is copied into the tracked subtree at the same relative path,
//! then staged and committed. Ancestor directories created along the way
//! take their attributes from the live directories they mirror. Thus, the
//! next reconciliation classifies the imported file as identical.
//!
//! Importing is not transactional. If committing fails after the copy, the
//! working tree is left dirty, which the next reconciliation refuses to run
//! against.

use crate::{
    config::Settings,
    path::{normalize, relative_to},
    provider::attr::{copy_attributes, copy_file},
    repo::{VersionControl, TRACKED_PREFIX},
};

use std::{
    fs::{create_dir, create_dir_all, metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Commit message for imported file.
pub fn commit_message(basename: &str) -> String {
    format!("[cfg] : +{basename}")
}

/// Import live files into repository.
pub struct Importer<'a, V>
where
    V: VersionControl,
{
    vcs: &'a V,
    settings: &'a Settings,
}

impl<'a, V> Importer<'a, V>
where
    V: VersionControl,
{
    /// Construct new importer.
    pub fn new(vcs: &'a V, settings: &'a Settings) -> Self {
        Self { vcs, settings }
    }

    /// Import live file at target path, and commit it.
    ///
    /// Returns path of the new tracked copy relative to the working tree.
    ///
    /// # Errors
    ///
    /// - Return [`ImportError::OutsideTarget`] if path is not inside target
    ///   root.
    /// - Return [`ImportError::Missing`] if path does not exist.
    /// - Return [`ImportError::NotAFile`] if path is not a regular file.
    /// - Return [`ImportError::Io`] or [`ImportError::Provider`] if copying
    ///   into the tracked subtree fails.
    /// - Return [`ImportError::Repo`] if staging or committing fails.
    #[instrument(skip(self, path), level = "debug")]
    pub fn import(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = normalize(path.as_ref()).map_err(|source| ImportError::Io {
            source,
            path: path.as_ref().to_path_buf(),
        })?;
        let root = self.settings.target.as_path();

        // INVARIANT: Reject before touching anything.
        let relative = relative_to(&path, root)
            .filter(|relative| !relative.as_os_str().is_empty())
            .ok_or_else(|| ImportError::OutsideTarget {
                path: path.clone(),
                root: root.to_path_buf(),
            })?;

        let meta = match metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ImportError::Missing { path })
            }
            Err(source) => return Err(ImportError::Io { source, path }),
        };
        if !meta.is_file() {
            return Err(ImportError::NotAFile { path });
        }

        let tracked_root = self.vcs.workdir().join(TRACKED_PREFIX);
        create_dir_all(&tracked_root).map_err(|source| ImportError::Io {
            source,
            path: tracked_root.clone(),
        })?;
        let created = create_ancestors(root, &tracked_root, &relative)?;

        let tracked = tracked_root.join(&relative);
        info!("copy {:?} into {:?}", path.display(), tracked.display());
        copy_file(&path, &tracked)?;

        // INVARIANT: Ancestor modes are applied last so they cannot block the copy.
        for (live, created) in created.iter().rev() {
            copy_attributes(live, created)?;
        }

        let staged = Path::new(TRACKED_PREFIX).join(&relative);
        let basename = relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.vcs.stage_and_commit(&staged, &commit_message(&basename))?;

        Ok(staged)
    }
}

/// Create every missing ancestor of `relative` under `dst_root`.
///
/// Returns pairs of live directory and created directory, shallowest first.
fn create_ancestors(
    src_root: &Path,
    dst_root: &Path,
    relative: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut created = Vec::new();
    let Some(parent) = relative.parent() else {
        return Ok(created);
    };

    let mut ancestor = PathBuf::new();
    for component in parent.components() {
        ancestor.push(component);
        let dst = dst_root.join(&ancestor);
        if dst.exists() {
            continue;
        }

        debug!("create ancestor {:?}", dst.display());
        create_dir(&dst).map_err(|source| ImportError::Io {
            source,
            path: dst.clone(),
        })?;
        created.push((src_root.join(&ancestor), dst));
    }

    Ok(created)
}

/// Import error types.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Path lies outside of target root.
    #[error("path {:?} is outside {:?}", path.display(), root.display())]
    OutsideTarget { path: PathBuf, root: PathBuf },

    /// Path does not exist.
    #[error("path {:?} does not exist", path.display())]
    Missing { path: PathBuf },

    /// Path is not a regular file.
    #[error("path {:?} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    /// Filesystem operation fails.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Copying content or attributes fails.
    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    /// Staging or committing fails.
    #[error(transparent)]
    Repo(#[from] crate::repo::RepoError),
}

/// Friendly result alias :3
pub type Result<T, E = ImportError> = std::result::Result<T, E>;
