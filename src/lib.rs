// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file synchronizer.
//!
//! Cfgsync keeps a canonical set of configuration files in a Git repository,
//! and reconciles them against their live locations in a __target root__,
//! e.g., the user's home directory, or the system root.
//!
//! # Repository Layout
//!
//! Everything committed under `src/` is the __tracked subtree__. Each tracked
//! path maps onto the same relative path inside the target root. Settings
//! live in `cfg_params.toml` at the top-level of the working tree, see
//! [`config`].
//!
//! # Operations
//!
//! - __Install__: walk the tracked subtree, classify every entry against its
//!   deployed counterpart, then install whatever differs, see [`reconcile`].
//!   A dry run reports without touching anything.
//! - __Import__: copy a live file into the tracked subtree and commit it,
//!   see [`import`].

pub mod config;
pub mod import;
pub mod path;
pub mod provider;
pub mod reconcile;
pub mod repo;
pub mod report;
pub mod template;
pub mod tool;

pub use config::{ConfigError, Settings, TargetRoot, SETTINGS_FILE};
pub use import::{ImportError, Importer};
pub use reconcile::{Mode, Outcome, ReconcileError, Reconciler, Verdict};
pub use repo::{Git2Repo, VersionControl};
pub use report::Reporter;
