// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Permission and ownership drift.

use crate::{
    provider::{ProviderError, Result},
    tool::syscall_non_interactive,
};

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, Metadata},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use filetime::{set_file_times, FileTime};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Change descriptor for every relative path whose attributes changed.
pub type AttributeDiff = BTreeMap<PathBuf, String>;

/// Width of an itemized change descriptor.
pub const DESCRIPTOR_WIDTH: usize = 11;

/// Compare attributes of two directory trees.
pub trait AttributeDiffer {
    /// Report every path under `source` whose counterpart under `target` has
    /// different permissions or ownership, keyed by path relative to the roots.
    fn diff(&self, source: &Path, target: &Path) -> Result<AttributeDiff>;
}

/// Attribute diffing through an itemized dry-run of `rsync`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsyncDiffer;

impl AttributeDiffer for RsyncDiffer {
    #[instrument(skip(self), level = "debug")]
    fn diff(&self, source: &Path, target: &Path) -> Result<AttributeDiff> {
        let output = syscall_non_interactive(
            "rsync",
            [
                OsString::from("-nrpgovi"),
                with_trailing_slash(source),
                with_trailing_slash(target),
            ],
            None,
        )?;

        Ok(parse_itemized(&output))
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut path = path.as_os_str().to_owned();
    path.push("/");
    path
}

/// Parse itemized output of `rsync -nrpgovi`.
///
/// The first line is a header, and the last four elements are the transfer
/// summary footer plus the empty element after the final newline. Every line
/// in between is an 11 character change descriptor, a space, then a path.
/// Directory paths lose their trailing slash.
pub fn parse_itemized(output: &str) -> AttributeDiff {
    let lines = output.split('\n').collect::<Vec<_>>();
    if lines.len() < 5 {
        return AttributeDiff::new();
    }

    let mut diff = AttributeDiff::new();
    for line in &lines[1..lines.len() - 4] {
        let (Some(change), Some(path)) = (
            line.get(..DESCRIPTOR_WIDTH),
            line.get(DESCRIPTOR_WIDTH + 1..),
        ) else {
            continue;
        };

        let path = path.strip_suffix('/').unwrap_or(path);
        if path.is_empty() {
            continue;
        }

        diff.insert(PathBuf::from(path), change.to_string());
    }

    diff
}

/// Attribute diffing in-process by comparing metadata directly.
///
/// Produces the same descriptor layout as `rsync`, but only ever fills in
/// the permission, owner, and group columns, or marks a missing target as a
/// creation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDiffer;

impl AttributeDiffer for BuiltinDiffer {
    #[instrument(skip(self), level = "debug")]
    fn diff(&self, source: &Path, target: &Path) -> Result<AttributeDiff> {
        let mut diff = AttributeDiff::new();
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };

            let src_meta = fs::metadata(entry.path()).map_err(|source| ProviderError::Attributes {
                source,
                path: entry.path().to_path_buf(),
            })?;
            let dst_path = target.join(relative);
            let dst_meta = match fs::metadata(&dst_path) {
                Ok(meta) => Some(meta),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(ProviderError::Attributes {
                        source,
                        path: dst_path,
                    })
                }
            };

            if let Some(change) = describe_change(&src_meta, dst_meta.as_ref()) {
                debug!("{change} {}", relative.display());
                diff.insert(relative.to_path_buf(), change);
            }
        }

        Ok(diff)
    }
}

fn describe_change(src: &Metadata, dst: Option<&Metadata>) -> Option<String> {
    let Some(dst) = dst else {
        return Some(if src.is_dir() {
            "cd+++++++++".to_string()
        } else {
            ">f+++++++++".to_string()
        });
    };

    let perms = src.mode() & 0o7777 != dst.mode() & 0o7777;
    let owner = src.uid() != dst.uid();
    let group = src.gid() != dst.gid();
    if !(perms || owner || group) {
        return None;
    }

    let flag = |changed: bool, mark: char| if changed { mark } else { '.' };
    Some(format!(
        ".{}...{}{}{}...",
        if src.is_dir() { 'd' } else { 'f' },
        flag(perms, 'p'),
        flag(owner, 'o'),
        flag(group, 'g'),
    ))
}

/// Copy permission bits and timestamps from `src` onto `dst`.
///
/// Ownership is left alone.
///
/// # Errors
///
/// - Return [`ProviderError::Attributes`] if metadata cannot be read from
///   `src` or applied to `dst`.
pub fn copy_attributes(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src).map_err(|source| ProviderError::Attributes {
        source,
        path: src.to_path_buf(),
    })?;

    copy_times(&meta, dst)?;
    fs::set_permissions(dst, meta.permissions()).map_err(|source| ProviderError::Attributes {
        source,
        path: dst.to_path_buf(),
    })?;

    Ok(())
}

/// Copy file content, then its timestamps.
///
/// # Errors
///
/// - Return [`ProviderError::Attributes`] if content or timestamps cannot be
///   copied.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|source| ProviderError::Attributes {
        source,
        path: dst.to_path_buf(),
    })?;

    let meta = fs::metadata(src).map_err(|source| ProviderError::Attributes {
        source,
        path: src.to_path_buf(),
    })?;

    copy_times(&meta, dst)
}

fn copy_times(meta: &Metadata, dst: &Path) -> Result<()> {
    // INVARIANT: Times are set by path, so `dst` never has to be readable.
    set_file_times(
        dst,
        FileTime::from_last_access_time(meta),
        FileTime::from_last_modification_time(meta),
    )
    .map_err(|source| ProviderError::Attributes {
        source,
        path: dst.to_path_buf(),
    })
}

/// Render file mode in `ls -l` form, e.g., `-rw-r--r--`.
pub fn filemode(mode: u32) -> String {
    let kind = match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o020000 => 'c',
        0o060000 => 'b',
        0o010000 => 'p',
        0o140000 => 's',
        0o100000 => '-',
        _ => '?',
    };

    let special = |bit: u32, exec: bool, set: char| match (mode & bit != 0, exec) {
        (true, true) => set,
        (true, false) => set.to_ascii_uppercase(),
        (false, true) => 'x',
        (false, false) => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for (shift, bit, set) in [(6, 0o4000, 's'), (3, 0o2000, 's'), (0, 0o1000, 't')] {
        let triple = (mode >> shift) & 0o7;
        out.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        out.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        out.push(special(bit, triple & 0o1 != 0, set));
    }

    out
}

/// Mode of path in `ls -l` form.
///
/// # Errors
///
/// - Return [`ProviderError::Attributes`] if metadata cannot be read.
pub fn human_mode(path: &Path) -> Result<String> {
    fs::metadata(path)
        .map(|meta| filemode(meta.mode()))
        .map_err(|source| ProviderError::Attributes {
            source,
            path: path.to_path_buf(),
        })
}
