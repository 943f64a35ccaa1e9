// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Every configuration repository carries a settings file named
//! `cfg_params.toml` at the top-level of its working tree. The settings file
//! names the __target root__ that tracked files get installed into, picks the
//! external tooling to use, and lists the __substitution constants__ that the
//! template expander splices into template files.
//!
//! # General Layout
//!
//! ```toml
//! target = "~"
//! EMAIL = "john@doe.com"
//! EDITOR = "nvim"
//!
//! [tools]
//! hasher = "git"
//! attributes = "rsync"
//! ```
//!
//! Any top-level key whose name is entirely upper-case is a substitution
//! constant, and must hold a string. Constants go before the `[tools]`
//! table, otherwise they belong to it and get rejected as unknown tools. Settings are loaded once at startup,
//! then handed to whatever needs them.

use crate::path::{home_dir, normalize, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{metadata, read_to_string},
    path::{Path, PathBuf},
    str::FromStr,
    time::SystemTime,
};
use tracing::{debug, instrument, warn};

/// Name of settings file at the top-level of the repository working tree.
pub const SETTINGS_FILE: &str = "cfg_params.toml";

/// Repository settings.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// Where tracked files get installed.
    pub target: TargetRoot,

    /// External tooling selection.
    pub tools: ToolSettings,

    /// Substitution constants for template expansion.
    pub params: BTreeMap<String, String>,

    /// Last modification time of settings file, if loaded from one.
    pub modified: Option<SystemTime>,
}

impl Settings {
    /// Construct settings with no substitution constants and default tooling.
    pub fn new(target: TargetRoot) -> Self {
        Self {
            target,
            tools: ToolSettings::default(),
            params: BTreeMap::new(),
            modified: None,
        }
    }

    /// Load settings file at target path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if settings file cannot be read.
    /// - Return [`ConfigError`] variants from parsing, see
    ///   [`Settings::from_str`].
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load settings: {:?}", path.display());
        let read_err = |source| ConfigError::Read {
            source,
            path: path.to_path_buf(),
        };

        let data = read_to_string(path).map_err(read_err)?;
        let modified = metadata(path).and_then(|meta| meta.modified()).map_err(read_err)?;

        let mut settings: Settings = data.parse()?;
        settings.modified = Some(modified);

        Ok(settings)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let layout: SettingsLayout = toml::from_str(data)?;

        // INVARIANT: Perform shell expansion on target root, then make it absolute.
        let target = match layout.target {
            Some(target) => {
                let expanded = shellexpand::full(target.as_str())?.into_owned();
                TargetRoot::new(normalize(expanded).map_err(ConfigError::ResolveTarget)?)
            }
            None => TargetRoot::new(home_dir()?),
        };

        // INVARIANT: Only upper-case keys are constants, and constants must be strings.
        let mut params = BTreeMap::new();
        for (key, value) in layout.rest {
            if !is_constant_name(&key) {
                warn!("ignoring unknown setting {key:?}");
                continue;
            }

            match value {
                toml::Value::String(value) => {
                    params.insert(key, value);
                }
                other => {
                    return Err(ConfigError::NonStringParam {
                        key,
                        kind: other.type_str(),
                    })
                }
            }
        }

        Ok(Self {
            target,
            tools: layout.tools,
            params,
            modified: None,
        })
    }
}

fn is_constant_name(key: &str) -> bool {
    !key.is_empty() && key == key.to_uppercase()
}

#[derive(Debug, Deserialize)]
struct SettingsLayout {
    target: Option<String>,

    #[serde(default)]
    tools: ToolSettings,

    #[serde(flatten)]
    rest: toml::Table,
}

/// External tooling selection.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    /// Content hashing backend.
    pub hasher: HashBackend,

    /// Attribute diffing backend.
    pub attributes: AttributeBackend,
}

/// Content hashing backends.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashBackend {
    /// Batch through `git hash-object --stdin-paths`.
    #[default]
    Git,

    /// Hash in-process through libgit2.
    Libgit2,
}

/// Attribute diffing backends.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeBackend {
    /// Itemized dry-run of `rsync`.
    #[default]
    Rsync,

    /// Compare metadata in-process.
    Builtin,
}

/// Absolute path that tracked files get installed into.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TargetRoot(PathBuf);

impl TargetRoot {
    /// Construct new target root.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat target root as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Location of a relative path inside target root.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.0.join(relative)
    }
}

impl Display for TargetRoot {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file cannot be read.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Target root cannot be made absolute.
    #[error("failed to resolve target root")]
    ResolveTarget(#[source] std::io::Error),

    /// Default target root cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),

    /// Substitution constant is not a string.
    #[error("{key} value should be a string, found {kind}")]
    NonStringParam { key: String, kind: &'static str },
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            target = "$BLAH/root"
            EMAIL = "john@doe.com"
            EDITOR = "nvim"

            [tools]
            hasher = "libgit2"
            attributes = "builtin"
        "#}
        .parse()?;

        let expect = Settings {
            target: TargetRoot::new("/home/blah/blah/root"),
            tools: ToolSettings {
                hasher: HashBackend::Libgit2,
                attributes: AttributeBackend::Builtin,
            },
            params: BTreeMap::from([
                ("EDITOR".to_string(), "nvim".to_string()),
                ("EMAIL".to_string(), "john@doe.com".to_string()),
            ]),
            modified: None,
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn deserialize_settings_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;

        assert_eq!(result.target, TargetRoot::new("/home/blah"));
        assert_eq!(result.tools, ToolSettings::default());
        assert!(result.params.is_empty());

        Ok(())
    }

    #[test]
    fn reject_non_string_constant() {
        let result = indoc! {r#"
            target = "/etc"
            EMAIL = "john@doe.com"
            RETRIES = 3
        "#}
        .parse::<Settings>();

        match result {
            Err(ConfigError::NonStringParam { key, kind }) => {
                assert_eq!(key, "RETRIES");
                assert_eq!(kind, "integer");
            }
            other => panic!("expected non-string error, got {other:?}"),
        }
    }

    #[test]
    fn reject_constant_inside_tools_table() {
        let result = indoc! {r#"
            target = "/etc"

            [tools]
            hasher = "git"
            EMAIL = "john@doe.com"
        "#}
        .parse::<Settings>();

        assert!(matches!(result, Err(ConfigError::Deserialize(..))));
    }

    #[test]
    fn ignore_lowercase_keys() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            target = "/etc"
            helper = 42
            EMAIL = "john@doe.com"
        "#}
        .parse()?;

        assert_eq!(
            result.params,
            BTreeMap::from([("EMAIL".to_string(), "john@doe.com".to_string())])
        );

        Ok(())
    }

    #[sealed_test]
    fn load_records_modification_time() -> anyhow::Result<()> {
        std::fs::write(SETTINGS_FILE, "target = \"/etc\"\n")?;
        let settings = Settings::load(SETTINGS_FILE)?;

        assert_eq!(settings.target, TargetRoot::new("/etc"));
        assert!(settings.modified.is_some());

        Ok(())
    }
}
