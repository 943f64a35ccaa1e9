// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem state providers.
//!
//! Reconciliation needs two facts about live files that are expensive to
//! compute: what their content hashes to, and whether their permissions or
//! ownership drifted from the repository copy. Both are modeled as traits so
//! that the backend doing the work can be swapped out.
//!
//! # Content Identity
//!
//! A [`ContentHasher`] hashes a whole batch of paths in one go, and returns
//! one identifier per path in the same order. Identifiers follow Git's blob
//! hashing so they compare directly against the object identifiers recorded
//! in the configuration repository.
//!
//! # Attribute Drift
//!
//! An [`AttributeDiffer`] compares two directory roots and reports a change
//! descriptor for every relative path whose attributes changed. Descriptors
//! follow the itemized change format of `rsync`, e.g., `.f...p.....`.
//!
//! # See Also
//!
//! 1. [git-hash-object](https://git-scm.com/docs/git-hash-object)
//! 2. [rsync itemize changes](https://download.samba.org/pub/rsync/rsync.1#opt--itemize-changes)

pub mod attr;
pub mod hash;

pub use attr::{AttributeDiff, AttributeDiffer, BuiltinDiffer, RsyncDiffer};
pub use hash::{ContentHasher, GitHashObject, Libgit2Hasher};

use crate::config::{AttributeBackend, HashBackend, ToolSettings};

/// Select content hasher for configured backend.
pub fn hasher_for(backend: HashBackend) -> Box<dyn ContentHasher> {
    match backend {
        HashBackend::Git => Box::new(GitHashObject),
        HashBackend::Libgit2 => Box::new(Libgit2Hasher),
    }
}

/// Select attribute differ for configured backend.
pub fn differ_for(backend: AttributeBackend) -> Box<dyn AttributeDiffer> {
    match backend {
        AttributeBackend::Rsync => Box::new(RsyncDiffer),
        AttributeBackend::Builtin => Box::new(BuiltinDiffer),
    }
}

/// Select both providers from tool settings.
pub fn providers_for(tools: &ToolSettings) -> (Box<dyn ContentHasher>, Box<dyn AttributeDiffer>) {
    (hasher_for(tools.hasher), differ_for(tools.attributes))
}

/// Provider error types.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// External tool fails.
    #[error(transparent)]
    Tool(#[from] crate::tool::ToolError),

    /// Batch hash did not produce one identifier per path.
    #[error("expected {expected} content identifiers, got {found}")]
    HashCountMismatch { expected: usize, found: usize },

    /// Content identifier cannot be parsed or computed.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Directory walk fails.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// File metadata cannot be read or written.
    #[error("failed to access attributes of {:?}", path.display())]
    Attributes {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
