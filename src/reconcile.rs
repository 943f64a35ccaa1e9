// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation of tracked files against their deployed counterparts.
//!
//! Reconciliation is a strict pipeline. Each stage runs to completion before
//! the next one begins:
//!
//! 1. __Precondition__: the repository working tree must be clean, so only
//!    a committed, reproducible state is ever installed.
//! 2. __Walk__: list every committed entry of the tracked subtree, expanding
//!    templates along the way.
//! 3. __Classify__: decide a [`Verdict`] for each entry, hashing only the
//!    entries that the cheap checks could not settle.
//! 4. __Execute__: report and install the content of every entry that is not
//!    identical, then report and fix attribute drift.
//!
//! Nothing is kept between runs. A run that aborts midway leaves behind
//! whatever it already installed, with `.old` backups as the only way back.

pub mod classify;
pub mod execute;
pub mod walk;

pub use classify::{ClassifiedEntry, Classifier, Verdict};
pub use execute::{AttributeChange, Executor};
pub use walk::{TrackedEntry, Walker};

use crate::{
    config::Settings,
    provider::{AttributeDiffer, ContentHasher},
    repo::VersionControl,
    report::Reporter,
};

use std::{io::Write, path::PathBuf};
use tracing::{info, instrument};

/// Whether to touch the filesystem.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Report and install.
    #[default]
    Install,

    /// Report only.
    DryRun,
}

impl Mode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

/// Everything a run found out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Every tracked entry with its verdict, in walk order.
    pub entries: Vec<ClassifiedEntry>,

    /// Attribute drift found by the attribute pass.
    pub attribute_changes: Vec<AttributeChange>,
}

/// Reconcile configuration repository against target root.
pub struct Reconciler<'a, V>
where
    V: VersionControl,
{
    vcs: &'a V,
    settings: &'a Settings,
    hasher: &'a dyn ContentHasher,
    differ: &'a dyn AttributeDiffer,
}

impl<'a, V> Reconciler<'a, V>
where
    V: VersionControl,
{
    /// Construct new reconciler.
    pub fn new(
        vcs: &'a V,
        settings: &'a Settings,
        hasher: &'a dyn ContentHasher,
        differ: &'a dyn AttributeDiffer,
    ) -> Self {
        Self {
            vcs,
            settings,
            hasher,
            differ,
        }
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Dirty`] if the working tree has uncommitted
    ///   changes. Nothing is touched in that case.
    /// - Return [`ReconcileError`] if any stage fails.
    #[instrument(skip(self, reporter), level = "debug")]
    pub fn run<W>(&self, mode: Mode, reporter: &mut Reporter<W>) -> Result<Outcome>
    where
        W: Write,
    {
        reporter.line(if mode.is_dry_run() {
            "checking content..."
        } else {
            "installing..."
        })?;

        if !self.vcs.is_clean()? {
            return Err(ReconcileError::Dirty {
                workdir: self.vcs.workdir().to_path_buf(),
            });
        }

        let walker = Walker::new(self.vcs, self.settings)?;
        let entries = walker.walk()?;
        let entries = Classifier::new(self.hasher).classify(entries)?;

        let mut executor = Executor::new(reporter, mode.is_dry_run());
        executor.apply_content(&entries)?;
        let attribute_changes = executor.apply_attributes(
            &entries,
            self.differ,
            &walker.source_root(),
            self.settings.target.as_path(),
        )?;

        info!(
            "{} of {} entries not identical",
            entries
                .iter()
                .filter(|classified| classified.verdict != Verdict::Identical)
                .count(),
            entries.len()
        );

        Ok(Outcome {
            entries,
            attribute_changes,
        })
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Working tree has uncommitted changes.
    #[error("uncommitted files exist in {:?}", workdir.display())]
    Dirty { workdir: PathBuf },

    /// Tracked path could resolve outside of target root.
    #[error("tracked path {:?} escapes target root", path.display())]
    Escape { path: PathBuf },

    /// Batch result does not line up with its queue.
    #[error("expected {expected} results, got {found}")]
    Mismatch { expected: usize, found: usize },

    /// Filesystem operation fails.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Repository access fails.
    #[error(transparent)]
    Repo(#[from] crate::repo::RepoError),

    /// Hashing, attribute diffing, or copying fails.
    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    /// Template expansion fails.
    #[error(transparent)]
    Template(#[from] crate::template::TemplateError),

    /// Report cannot be written.
    #[error(transparent)]
    Report(#[from] crate::report::ReportError),
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
