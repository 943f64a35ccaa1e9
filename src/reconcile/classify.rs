// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Difference classification.
//!
//! Each tracked entry is compared against its deployed counterpart through a
//! cascade of checks, cheapest first: existence, kind, size, and finally
//! content hash. Hashing is the only expensive check, so every entry that
//! survives the cheap checks is queued up, and the whole queue is hashed
//! through one batch call afterwards.

use crate::{
    provider::ContentHasher,
    reconcile::{walk::TrackedEntry, ReconcileError, Result},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::metadata,
    io::ErrorKind,
    path::PathBuf,
};
use tracing::{debug, instrument};

/// Relationship between a tracked entry and its deployed counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deployed copy matches.
    Identical,

    /// Nothing deployed at target location.
    Missing,

    /// Deployed copy has different size.
    SizeDiffers,

    /// Deployed copy has same size, but different content.
    ContentDiffers,

    /// Deployed copy differs in permissions or ownership.
    AttributesDiffer,
}

impl Verdict {
    /// Human-readable description.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Identical => "files identical",
            Self::Missing => "file missing",
            Self::SizeDiffers => "file size differs",
            Self::ContentDiffers => "file content differs",
            Self::AttributesDiffer => "file attributes differs",
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.message())
    }
}

/// Tracked entry with its final verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEntry {
    pub entry: TrackedEntry,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precheck {
    Settled(Verdict),
    NeedsHash,
}

/// Outcome of the cheap checks, before any hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preliminary {
    prechecks: Vec<Precheck>,
    pending: Vec<usize>,
}

impl Preliminary {
    /// Positions of entries waiting on a content hash, in queue order.
    pub fn pending(&self) -> &[usize] {
        &self.pending
    }

    /// Verdict of entry at `index`, if it did not need a hash.
    pub fn settled(&self, index: usize) -> Option<Verdict> {
        match self.prechecks.get(index) {
            Some(Precheck::Settled(verdict)) => Some(*verdict),
            _ => None,
        }
    }
}

/// Run cheap checks on every entry.
///
/// # Errors
///
/// - Return [`ReconcileError::Io`] if target metadata cannot be read for any
///   reason other than the target not existing.
#[instrument(skip(entries), level = "debug")]
pub fn classify(entries: &[TrackedEntry]) -> Result<Preliminary> {
    let mut prechecks = Vec::with_capacity(entries.len());
    let mut pending = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let precheck = match metadata(entry.target()) {
            Err(err) if err.kind() == ErrorKind::NotFound => Precheck::Settled(Verdict::Missing),
            Err(source) => {
                return Err(ReconcileError::Io {
                    source,
                    path: entry.target().to_path_buf(),
                })
            }
            // INVARIANT: Directories are never content compared.
            Ok(_) if entry.is_dir() => Precheck::Settled(Verdict::Identical),
            Ok(meta) if meta.len() != entry.size() => Precheck::Settled(Verdict::SizeDiffers),
            Ok(_) => {
                pending.push(index);
                Precheck::NeedsHash
            }
        };

        debug!("{:?}: {precheck:?}", entry.relative_path().display());
        prechecks.push(precheck);
    }

    Ok(Preliminary { prechecks, pending })
}

/// Resolve queued entries through one batch hash of their targets.
///
/// Identifiers come back in queue order, and are zipped back onto the queued
/// entries positionally. An empty queue never reaches the hasher.
///
/// # Errors
///
/// - Return [`ReconcileError::Provider`] if batch hashing fails.
/// - Return [`ReconcileError::Mismatch`] if `preliminary` does not belong to
///   `entries`, or the hasher returns the wrong number of identifiers.
#[instrument(skip_all, level = "debug")]
pub fn resolve_hashes(
    entries: Vec<TrackedEntry>,
    preliminary: Preliminary,
    hasher: &dyn ContentHasher,
) -> Result<Vec<ClassifiedEntry>> {
    let Preliminary { prechecks, pending } = preliminary;
    if prechecks.len() != entries.len() {
        return Err(ReconcileError::Mismatch {
            expected: entries.len(),
            found: prechecks.len(),
        });
    }

    let mut verdicts = prechecks
        .into_iter()
        .map(|precheck| match precheck {
            Precheck::Settled(verdict) => verdict,
            // INVARIANT: Overwritten below, never surfaces.
            Precheck::NeedsHash => Verdict::ContentDiffers,
        })
        .collect::<Vec<_>>();

    if !pending.is_empty() {
        let paths = pending
            .iter()
            .map(|index| entries[*index].target().to_path_buf())
            .collect::<Vec<_>>();
        let ids = hasher.hash_batch(&paths)?;
        if ids.len() != pending.len() {
            return Err(ReconcileError::Mismatch {
                expected: pending.len(),
                found: ids.len(),
            });
        }

        for (index, id) in pending.into_iter().zip(ids) {
            verdicts[index] = if entries[index].content_id() == Some(id) {
                Verdict::Identical
            } else {
                Verdict::ContentDiffers
            };
        }
    }

    Ok(entries
        .into_iter()
        .zip(verdicts)
        .map(|(entry, verdict)| ClassifiedEntry { entry, verdict })
        .collect())
}

/// Fill in unknown content identifiers by hashing repository copies.
///
/// Only expanded templates lack an identifier. They are all hashed through
/// one batch call, which is skipped when none are present.
///
/// # Errors
///
/// - Return [`ReconcileError::Provider`] if batch hashing fails.
#[instrument(skip_all, level = "debug")]
pub fn resolve_source_ids(entries: &mut [TrackedEntry], hasher: &dyn ContentHasher) -> Result<()> {
    let unknown = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_dir() && entry.content_id().is_none())
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    if unknown.is_empty() {
        return Ok(());
    }

    let paths = unknown
        .iter()
        .map(|index| entries[*index].source().to_path_buf())
        .collect::<Vec<PathBuf>>();
    let ids = hasher.hash_batch(&paths)?;
    if ids.len() != unknown.len() {
        return Err(ReconcileError::Mismatch {
            expected: unknown.len(),
            found: ids.len(),
        });
    }

    for (index, id) in unknown.into_iter().zip(ids) {
        entries[index].set_content_id(id);
    }

    Ok(())
}

/// Full classification pipeline.
pub struct Classifier<'a> {
    hasher: &'a dyn ContentHasher,
}

impl<'a> Classifier<'a> {
    /// Construct new classifier around content hasher.
    pub fn new(hasher: &'a dyn ContentHasher) -> Self {
        Self { hasher }
    }

    /// Classify every entry.
    ///
    /// Resolves unknown source identifiers, runs the cheap checks, then
    /// resolves whatever needs a hash. At most two batch hash calls are made.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError`] if any stage fails.
    pub fn classify(&self, mut entries: Vec<TrackedEntry>) -> Result<Vec<ClassifiedEntry>> {
        resolve_source_ids(&mut entries, self.hasher)?;
        let preliminary = classify(&entries)?;
        resolve_hashes(entries, preliminary, self.hasher)
    }
}
