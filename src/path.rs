// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the target root, and decide
//! whether a live path belongs to it.

use std::path::{absolute, Component, Path, PathBuf};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf, NoWayHome> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Make path absolute and resolve `.` and `..` components lexically.
///
/// Symbolic links are left alone, so the result still names the path the
/// caller gave us rather than whatever it points at.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the current directory cannot be determined
///   for a relative path.
pub fn normalize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let path = absolute(path.as_ref())?;
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other.as_os_str()),
        }
    }

    Ok(normal)
}

/// Path of `path` relative to `root`, if `path` lies within `root`.
///
/// Containment is decided per component, never by string prefix. Thus,
/// `/etc2/hosts` is not inside `/etc`. Both paths are expected to already be
/// normalized. A `root` of `/` yields a relative path without a leading
/// separator.
pub fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Check that a relative path cannot escape whatever root it is joined to.
///
/// Only plain name components are allowed.
pub fn is_confined(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("/etc/hosts", "/etc", Some("hosts"); "direct child")]
    #[test_case("/etc/ssh/sshd_config", "/etc", Some("ssh/sshd_config"); "nested child")]
    #[test_case("/etc2/hosts", "/etc", None; "sibling sharing a prefix")]
    #[test_case("/etc/hosts", "/", Some("etc/hosts"); "filesystem root")]
    #[test_case("/var/log", "/etc", None; "unrelated")]
    #[test]
    fn relative_to_checks_components(path: &str, root: &str, expect: Option<&str>) {
        let result = relative_to(Path::new(path), Path::new(root));
        assert_eq!(result, expect.map(PathBuf::from));
    }

    #[test]
    fn normalize_resolves_dots() -> anyhow::Result<()> {
        assert_eq!(normalize("/etc/./ssh/../hosts")?, PathBuf::from("/etc/hosts"));
        assert_eq!(normalize("/etc/../etc2/hosts")?, PathBuf::from("/etc2/hosts"));
        Ok(())
    }

    #[test]
    fn confinement_rejects_escapes() {
        assert!(is_confined(Path::new("a/b/c")));
        assert!(!is_confined(Path::new("../etc/passwd")));
        assert!(!is_confined(Path::new("/etc/passwd")));
    }
}
