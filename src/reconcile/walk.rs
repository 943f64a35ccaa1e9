// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracked subtree walking.

use crate::{
    config::{Settings, TargetRoot},
    path::is_confined,
    reconcile::{ReconcileError, Result},
    repo::{EntryKind, VersionControl, TRACKED_PREFIX},
    template::Expander,
};

use git2::Oid;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Entry of tracked subtree paired with its install location.
///
/// # Invariant
///
/// - Target location is always the target root joined with the relative
///   path, and never lies outside of the target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    kind: EntryKind,
    relative_path: PathBuf,
    size: u64,
    content_id: Option<Oid>,
    source: PathBuf,
    target: PathBuf,
}

impl TrackedEntry {
    /// Construct new tracked entry.
    ///
    /// A `content_id` of `None` means the identifier is not known yet.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Escape`] if `relative_path` could resolve
    ///   outside of target root.
    pub fn new(
        kind: EntryKind,
        relative_path: impl Into<PathBuf>,
        size: u64,
        content_id: Option<Oid>,
        source: impl Into<PathBuf>,
        target_root: &TargetRoot,
    ) -> Result<Self> {
        let relative_path = relative_path.into();
        if relative_path.as_os_str().is_empty() || !is_confined(&relative_path) {
            return Err(ReconcileError::Escape {
                path: relative_path,
            });
        }

        let target = target_root.join(&relative_path);
        Ok(Self {
            kind,
            relative_path,
            size,
            content_id,
            source: source.into(),
            target,
        })
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_id(&self) -> Option<Oid> {
        self.content_id
    }

    /// Location of authoritative copy in repository working tree.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Location of deployed copy in target root.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub(crate) fn set_content_id(&mut self, id: Oid) {
        self.content_id = Some(id);
    }
}

/// Walk committed tracked subtree into flat listing of entries.
pub struct Walker<'a, V>
where
    V: VersionControl,
{
    vcs: &'a V,
    target_root: &'a TargetRoot,
    expander: Expander,
}

impl<'a, V> Walker<'a, V>
where
    V: VersionControl,
{
    /// Construct new walker.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Template`] if template expander cannot be
    ///   built from settings.
    pub fn new(vcs: &'a V, settings: &'a Settings) -> Result<Self> {
        Ok(Self {
            vcs,
            target_root: &settings.target,
            expander: Expander::new(settings)?,
        })
    }

    /// Absolute path of tracked subtree in working tree.
    pub fn source_root(&self) -> PathBuf {
        self.vcs.workdir().join(TRACKED_PREFIX)
    }

    /// List every tracked entry in pre-order.
    ///
    /// Templates are expanded along the way, and listed under the name of
    /// their expanded sibling with an unknown content identifier, because
    /// the committed identifier belongs to the template and not to the
    /// generated text.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Repo`] if committed tree cannot be listed.
    /// - Return [`ReconcileError::Template`] if template expansion fails.
    #[instrument(skip(self), level = "debug")]
    pub fn walk(&self) -> Result<Vec<TrackedEntry>> {
        let source_root = self.source_root();
        let mut entries = Vec::new();

        for item in self.vcs.tracked_entries(Path::new(TRACKED_PREFIX))? {
            let source = source_root.join(&item.path);
            let entry = match item.kind {
                EntryKind::Directory => TrackedEntry::new(
                    EntryKind::Directory,
                    item.path,
                    0,
                    Some(item.id),
                    source,
                    self.target_root,
                )?,
                EntryKind::File => match self.expander.expand(&source)? {
                    Some(expanded) => {
                        let size = std::fs::metadata(&expanded)
                            .map_err(|source| ReconcileError::Io {
                                source,
                                path: expanded.clone(),
                            })?
                            .len();
                        let relative = match expanded.file_name() {
                            Some(name) => item.path.with_file_name(name),
                            None => item.path,
                        };
                        debug!("template expands to {:?}", relative.display());
                        TrackedEntry::new(
                            EntryKind::File,
                            relative,
                            size,
                            None,
                            expanded,
                            self.target_root,
                        )?
                    }
                    None => TrackedEntry::new(
                        EntryKind::File,
                        item.path,
                        item.size,
                        Some(item.id),
                        source,
                        self.target_root,
                    )?,
                },
            };
            entries.push(entry);
        }

        debug!("walked {} tracked entries", entries.len());
        Ok(entries)
    }
}
