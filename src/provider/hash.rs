// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Batch content hashing.

use crate::{
    provider::{ProviderError, Result},
    tool::syscall_non_interactive,
};

use git2::{ObjectType, Oid};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Hash a batch of files.
pub trait ContentHasher {
    /// Hash every path, and return identifiers in the same order as `paths`.
    ///
    /// An empty batch yields an empty result without doing any work.
    fn hash_batch(&self, paths: &[PathBuf]) -> Result<Vec<Oid>>;
}

/// Batch hashing through one `git hash-object --stdin-paths` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitHashObject;

impl ContentHasher for GitHashObject {
    #[instrument(skip(self, paths), level = "debug")]
    fn hash_batch(&self, paths: &[PathBuf]) -> Result<Vec<Oid>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        debug!("hash {} paths through git", paths.len());
        let output = syscall_non_interactive(
            "git",
            ["hash-object", "--stdin-paths"],
            Some(stdin_paths(paths).as_slice()),
        )?;

        parse_hash_output(&output, paths.len())
    }
}

/// Hashing through libgit2, one file at a time in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct Libgit2Hasher;

impl ContentHasher for Libgit2Hasher {
    fn hash_batch(&self, paths: &[PathBuf]) -> Result<Vec<Oid>> {
        paths
            .iter()
            .map(|path| Oid::hash_file(ObjectType::Blob, path).map_err(ProviderError::from))
            .collect()
    }
}

/// Newline-joined path listing with trailing newline.
pub(crate) fn stdin_paths(paths: &[PathBuf]) -> Vec<u8> {
    let mut input = Vec::new();
    for path in paths {
        input.extend_from_slice(path.as_os_str().as_encoded_bytes());
        input.push(b'\n');
    }

    input
}

/// Parse one identifier per line.
///
/// The empty element left after the trailing newline is discarded.
pub(crate) fn parse_hash_output(output: &str, expected: usize) -> Result<Vec<Oid>> {
    let mut lines = output.split('\n').collect::<Vec<_>>();
    lines.pop();

    if lines.len() != expected {
        return Err(ProviderError::HashCountMismatch {
            expected,
            found: lines.len(),
        });
    }

    lines
        .into_iter()
        .map(|line| Oid::from_str(line.trim_end_matches('\r')).map_err(ProviderError::from))
        .collect()
}
