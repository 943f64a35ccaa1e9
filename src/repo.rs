// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration repository access.
//!
//! The configuration repository is an ordinary Git repository whose
//! __tracked subtree__ (everything under `src/`) mirrors the files that should
//! be installed into the target root. Commit history is the source of truth.
//! Thus, cfgsync only ever needs three things from it: whether the working
//! tree is clean, what the committed tracked subtree looks like, and a way to
//! stage and commit a newly imported file.

use git2::{ErrorCode, ObjectType, Oid, Repository, StatusOptions, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Prefix of tracked subtree inside the repository working tree.
pub const TRACKED_PREFIX: &str = "src";

/// Kind of tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Entry of committed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeItem {
    /// File or directory.
    pub kind: EntryKind,

    /// Path relative to the prefix the tree was listed from.
    pub path: PathBuf,

    /// Size in bytes of file content. Always zero for directories.
    pub size: u64,

    /// Object identifier of content.
    pub id: Oid,
}

/// Version control operations that reconciliation depends on.
pub trait VersionControl {
    /// Absolute path to working tree.
    fn workdir(&self) -> &Path;

    /// Check that working tree and index match the latest commit.
    fn is_clean(&self) -> Result<bool>;

    /// List committed entries under `prefix` in pre-order.
    ///
    /// A directory always precedes its own children.
    fn tracked_entries(&self, prefix: &Path) -> Result<Vec<TreeItem>>;

    /// Stage path relative to working tree, and commit it on top of HEAD.
    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<Oid>;
}

/// Version control through libgit2.
pub struct Git2Repo {
    repository: Repository,
    workdir: PathBuf,
}

impl Git2Repo {
    /// Find repository containing target path, searching upwards.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Git2`] if no repository can be found.
    /// - Return [`RepoError::Bare`] if repository lacks a working tree.
    #[instrument(skip(path), level = "debug")]
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        debug!("discover repository from {:?}", path.as_ref().display());
        Self::new(Repository::discover(path.as_ref())?)
    }

    /// Wrap existing repository.
    ///
    /// # Errors
    ///
    /// - Return [`RepoError::Bare`] if repository lacks a working tree.
    pub fn new(repository: Repository) -> Result<Self> {
        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| RepoError::Bare {
                gitdir: repository.path().to_path_buf(),
            })?;

        Ok(Self {
            repository,
            workdir,
        })
    }

    fn head_tree(&self) -> Result<Option<Tree<'_>>> {
        match self.repository.head() {
            Ok(head) => Ok(Some(head.peel_to_tree()?)),
            Err(err) if err.code() == ErrorCode::UnbornBranch => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn list_tree(&self, tree: &Tree<'_>, base: &Path, items: &mut Vec<TreeItem>) -> Result<()> {
        let odb = self.repository.odb()?;
        for tree_entry in tree {
            let path = base.join(bytes_to_path(tree_entry.name_bytes()));
            match tree_entry.kind() {
                // INVARIANT: Record directory before descending into it.
                Some(ObjectType::Tree) => {
                    items.push(TreeItem {
                        kind: EntryKind::Directory,
                        path: path.clone(),
                        size: 0,
                        id: tree_entry.id(),
                    });
                    let next_tree = self.repository.find_tree(tree_entry.id())?;
                    self.list_tree(&next_tree, &path, items)?;
                }
                Some(ObjectType::Blob) => {
                    let (size, _) = odb.read_header(tree_entry.id())?;
                    items.push(TreeItem {
                        kind: EntryKind::File,
                        path,
                        size: size as u64,
                        id: tree_entry.id(),
                    });
                }
                // Submodules have nothing to install.
                _ => continue,
            }
        }

        Ok(())
    }
}

impl VersionControl for Git2Repo {
    fn workdir(&self) -> &Path {
        self.workdir.as_path()
    }

    #[instrument(skip(self), level = "debug")]
    fn is_clean(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repository.statuses(Some(&mut opts))?;
        debug!("{} uncommitted changes", statuses.len());

        Ok(statuses.is_empty())
    }

    #[instrument(skip(self), level = "debug")]
    fn tracked_entries(&self, prefix: &Path) -> Result<Vec<TreeItem>> {
        let mut items = Vec::new();
        let Some(tree) = self.head_tree()? else {
            debug!("repository has no commits yet");
            return Ok(items);
        };

        let subtree = match tree.get_path(prefix) {
            Ok(entry) => self.repository.find_tree(entry.id())?,
            Err(err) if err.code() == ErrorCode::NotFound => {
                debug!("nothing tracked under {:?}", prefix.display());
                return Ok(items);
            }
            Err(err) => return Err(err.into()),
        };

        self.list_tree(&subtree, Path::new(""), &mut items)?;

        Ok(items)
    }

    #[instrument(skip(self, message), level = "debug")]
    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<Oid> {
        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repository.index()?;
        index.add_path(path)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repository.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commit to append to.
        let signature = self.repository.signature()?;
        let parent = match self.repository.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(err) if err.code() == ErrorCode::UnbornBranch => None,
            Err(err) => return Err(err.into()),
        };
        let parents = parent.iter().collect::<Vec<_>>();

        let oid = self.repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("commit {oid}: {message}");

        Ok(oid)
    }
}

// Thanks from:
//
// https://github.com/rust-lang/git2-rs/blob/5bc3baa9694a94db2ca9cc256b5bce8a215f9013/
// src/util.rs#L85
#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::{ffi::OsStr, os::unix::prelude::*};
    PathBuf::from(OsStr::from_bytes(bytes))
}
#[cfg(windows)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// Repository access error types.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Repository has no working tree to install from.
    #[error("repository at {:?} has no working tree", gitdir.display())]
    Bare { gitdir: PathBuf },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = RepoError> = std::result::Result<T, E>;
