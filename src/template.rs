// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template expansion.
//!
//! A tracked file whose name starts with `cfg.` is a __template__. Before it
//! can be installed, it is expanded into a sibling file that drops the
//! marker, e.g., `.gitconfig` is generated from `cfg..gitconfig`. Expansion
//! replaces every `=cfg[NAME]` token with the value of substitution constant
//! `NAME` from the repository settings. Tokens naming unknown constants are
//! left as-is.
//!
//! The generated sibling is only rewritten when it is missing, or older than
//! either its template or the settings file. Its attributes always follow the
//! template.

use crate::{config::Settings, provider::attr::copy_attributes};

use regex::{Captures, Regex};
use std::{
    collections::BTreeMap,
    fs::{metadata, read_to_string, write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info, instrument};

/// File name prefix marking a template.
pub const TEMPLATE_MARKER: &str = "cfg.";

/// Name of expanded file if `name` marks a template.
pub fn expanded_name(name: &str) -> Option<&str> {
    name.strip_prefix(TEMPLATE_MARKER)
        .filter(|stripped| !stripped.is_empty())
}

/// Template expander bound to a set of substitution constants.
#[derive(Debug, Clone)]
pub struct Expander {
    params: BTreeMap<String, String>,
    pattern: Option<Regex>,
    settings_modified: Option<SystemTime>,
}

impl Expander {
    /// Construct new expander from repository settings.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::Pattern`] if token pattern cannot be built.
    pub fn new(settings: &Settings) -> Result<Self> {
        let tokens = settings
            .params
            .keys()
            .map(|key| regex::escape(&token(key)))
            .collect::<Vec<_>>();

        // INVARIANT: No constants means nothing to match, not an empty pattern.
        let pattern = if tokens.is_empty() {
            None
        } else {
            Some(Regex::new(&tokens.join("|"))?)
        };

        Ok(Self {
            params: settings.params.clone(),
            pattern,
            settings_modified: settings.modified,
        })
    }

    /// Substitute every known token in `content`.
    pub fn substitute(&self, content: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return content.to_string();
        };

        pattern
            .replace_all(content, |caps: &Captures<'_>| {
                let name = &caps[0][TOKEN_OPEN.len()..caps[0].len() - TOKEN_CLOSE.len()];
                self.params.get(name).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Expand template into its sibling, and return the sibling's path.
    ///
    /// Returns `None` if `template` does not carry the template marker.
    ///
    /// # Errors
    ///
    /// - Return [`TemplateError::Io`] if template cannot be read, or sibling
    ///   cannot be written.
    /// - Return [`TemplateError::Attributes`] if template attributes cannot be
    ///   copied onto sibling.
    #[instrument(skip(self), level = "debug")]
    pub fn expand(&self, template: &Path) -> Result<Option<PathBuf>> {
        let Some(name) = template
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(expanded_name)
        else {
            return Ok(None);
        };
        let expanded = template.with_file_name(name);

        if self.is_stale(template, &expanded)? {
            info!("expand {:?} into {:?}", template.display(), expanded.display());
            let content = read_to_string(template).map_err(|source| TemplateError::Io {
                source,
                path: template.to_path_buf(),
            })?;
            write(&expanded, self.substitute(&content)).map_err(|source| TemplateError::Io {
                source,
                path: expanded.clone(),
            })?;
        } else {
            debug!("{:?} is up to date", expanded.display());
        }

        copy_attributes(template, &expanded)?;

        Ok(Some(expanded))
    }

    fn is_stale(&self, template: &Path, expanded: &Path) -> Result<bool> {
        let expanded_modified = match metadata(expanded).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(source) => {
                return Err(TemplateError::Io {
                    source,
                    path: expanded.to_path_buf(),
                })
            }
        };

        let template_modified = metadata(template)
            .and_then(|meta| meta.modified())
            .map_err(|source| TemplateError::Io {
                source,
                path: template.to_path_buf(),
            })?;

        let settings_newer = self
            .settings_modified
            .is_some_and(|modified| modified > expanded_modified);

        Ok(settings_newer || template_modified > expanded_modified)
    }
}

const TOKEN_OPEN: &str = "=cfg[";
const TOKEN_CLOSE: &str = "]";

fn token(name: &str) -> String {
    format!("{TOKEN_OPEN}{name}{TOKEN_CLOSE}")
}

/// Template expansion error types.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Template or expanded file cannot be accessed.
    #[error("failed to expand template at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Token pattern cannot be compiled.
    #[error(transparent)]
    Pattern(#[from] regex::Error),

    /// Template attributes cannot be copied.
    #[error(transparent)]
    Attributes(#[from] crate::provider::ProviderError),
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
