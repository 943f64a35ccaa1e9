// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation actions.
//!
//! Classified entries are acted upon in two passes. The content pass reports
//! every entry that is not identical, and installs it unless this is a dry
//! run. An existing deployed file is never deleted outright: it is renamed to
//! `<path>.old` first, leaving a recovery point behind. The attribute pass
//! then compares the whole tracked subtree against the target root, and
//! copies permissions over wherever they drifted.

use crate::{
    provider::{
        attr::{copy_attributes, copy_file, human_mode},
        AttributeDiffer,
    },
    reconcile::{
        classify::{ClassifiedEntry, Verdict},
        ReconcileError, Result,
    },
    report::Reporter,
};

use std::{
    ffi::OsString,
    fs::{create_dir_all, rename},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Suffix given to deployed files before they get overwritten.
pub const BACKUP_SUFFIX: &str = ".old";

/// Permission or ownership drift of one tracked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Path relative to tracked subtree and target root.
    pub relative_path: PathBuf,

    /// Itemized change descriptor.
    pub descriptor: String,

    /// Mode of repository copy in `ls -l` form.
    pub source_mode: String,

    /// Mode of deployed copy in `ls -l` form.
    pub target_mode: String,
}

/// Location of backup made for deployed file.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut backup = OsString::from(path.as_os_str());
    backup.push(BACKUP_SUFFIX);
    PathBuf::from(backup)
}

/// Act on classified entries.
pub struct Executor<'a, W>
where
    W: Write,
{
    reporter: &'a mut Reporter<W>,
    dry_run: bool,
}

impl<'a, W> Executor<'a, W>
where
    W: Write,
{
    /// Construct new executor.
    ///
    /// Nothing on the filesystem is touched if `dry_run` is set.
    pub fn new(reporter: &'a mut Reporter<W>, dry_run: bool) -> Self {
        Self { reporter, dry_run }
    }

    /// Report and install every entry that is not identical.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Report`] if reporting fails.
    /// - Return [`ReconcileError::Io`] if a backup or directory cannot be
    ///   made.
    /// - Return [`ReconcileError::Provider`] if a file cannot be copied.
    #[instrument(skip_all, level = "debug")]
    pub fn apply_content(&mut self, entries: &[ClassifiedEntry]) -> Result<()> {
        for ClassifiedEntry { entry, verdict } in entries {
            if *verdict == Verdict::Identical {
                continue;
            }

            self.reporter.verdict(entry.target(), *verdict)?;
            if *verdict != Verdict::Missing && !entry.is_dir() {
                self.reporter.content_diff(entry.target(), entry.source())?;
            }

            if self.dry_run {
                continue;
            }

            if entry.is_dir() {
                info!("create directory {:?}", entry.target().display());
                create_dir_all(entry.target()).map_err(|source| ReconcileError::Io {
                    source,
                    path: entry.target().to_path_buf(),
                })?;
                continue;
            }

            // INVARIANT: Preserve deployed file as backup before overwriting it.
            if *verdict != Verdict::Missing {
                let backup = backup_path(entry.target());
                info!("back up {:?} to {:?}", entry.target().display(), backup.display());
                rename(entry.target(), &backup).map_err(|source| ReconcileError::Io {
                    source,
                    path: entry.target().to_path_buf(),
                })?;
            }

            info!("install {:?}", entry.target().display());
            copy_file(entry.source(), entry.target())?;
        }

        Ok(())
    }

    /// Report and fix attribute drift between tracked subtree and target root.
    ///
    /// Entries still missing from target root are passed over in a dry run,
    /// because there is nothing deployed to compare against.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Provider`] if attribute diffing fails, or
    ///   attributes cannot be copied.
    /// - Return [`ReconcileError::Report`] if reporting fails.
    #[instrument(skip_all, level = "debug")]
    pub fn apply_attributes(
        &mut self,
        entries: &[ClassifiedEntry],
        differ: &dyn AttributeDiffer,
        source_root: &Path,
        target_root: &Path,
    ) -> Result<Vec<AttributeChange>> {
        self.reporter.line("checking attributes changes :")?;
        let diff = differ.diff(source_root, target_root)?;
        debug!("{} paths with attribute changes", diff.len());

        let mut changes = Vec::new();
        for ClassifiedEntry { entry, verdict } in entries {
            if self.dry_run && *verdict == Verdict::Missing {
                continue;
            }

            let Some(descriptor) = diff.get(entry.relative_path()) else {
                continue;
            };

            let change = AttributeChange {
                relative_path: entry.relative_path().to_path_buf(),
                descriptor: descriptor.clone(),
                source_mode: human_mode(entry.source())?,
                target_mode: human_mode(entry.target())?,
            };
            self.reporter.attribute_change(&change)?;

            if !self.dry_run {
                info!("sync attributes of {:?}", entry.target().display());
                copy_attributes(entry.source(), entry.target())?;
            }

            changes.push(change);
        }

        Ok(changes)
    }
}
