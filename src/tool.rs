// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External tool invocation.
//!
//! Some of the heavy lifting is handed to external programs, e.g., `git` for
//! batch content hashing, and `rsync` for attribute diffing. Every call blocks
//! until the program exits. A program that cannot be spawned, or that exits
//! with a non-zero status, fails the whole call. Nothing is retried.

use std::{
    ffi::OsStr,
    io::Write,
    process::{Command, Stdio},
    thread,
};
use tracing::{debug, instrument};

/// Run external program to completion and capture its standard output.
///
/// If `input` is given, then it is written to the program's standard input
/// from a separate thread while standard output is being collected.
///
/// # Errors
///
/// - Return [`ToolError::Spawn`] if program cannot be started or waited on.
/// - Return [`ToolError::Failed`] if program exits with non-zero status.
#[instrument(skip(cmd, args, input), level = "debug")]
pub fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    input: Option<&[u8]>,
) -> Result<String> {
    let name = cmd.as_ref().to_string_lossy().into_owned();
    let spawn_err = |source| ToolError::Spawn {
        source,
        cmd: name.clone(),
    };

    let mut child = Command::new(cmd.as_ref())
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let stdin = child.stdin.take();

    // INVARIANT: Feed stdin while stdout is drained, or both pipes can fill up.
    let (fed, output) = thread::scope(|scope| {
        let feeder = scope.spawn(move || -> std::io::Result<()> {
            if let (Some(input), Some(mut stdin)) = (input, stdin) {
                debug!("feed {} bytes", input.len());
                stdin.write_all(input)?;
                // INVARIANT: Dropping stdin closes it so the program sees end of input.
            }
            Ok(())
        });

        let output = child.wait_with_output();
        let fed = feeder
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin feeder panicked")));
        (fed, output)
    });
    let output = output.map_err(spawn_err)?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice());
        return Err(ToolError::Failed {
            cmd: name,
            status: output.status.code(),
            message: stderr.trim_end().to_string(),
        });
    }

    fed.map_err(spawn_err)?;

    Ok(stdout)
}

/// External tool error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Program cannot be started, fed, or waited on.
    #[error("failed to run {cmd:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        cmd: String,
    },

    /// Program exited unsuccessfully.
    #[error("command {cmd:?} failed with status {status:?}: {message}")]
    Failed {
        cmd: String,
        status: Option<i32>,
        message: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;
