// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator-facing report.
//!
//! Everything the operator is meant to read, i.e., verdict lines, content
//! diffs, and attribute changes, goes through a [`Reporter`]. Logging is kept
//! separate through `tracing`.

use crate::reconcile::{classify::Verdict, execute::AttributeChange};

use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::{
    fs::read,
    io::Write,
    path::{Path, PathBuf},
};

/// Number of unchanged lines shown around each change.
const CONTEXT_LINES: usize = 3;

/// Write report lines to some output, optionally colored.
#[derive(Debug)]
pub struct Reporter<W>
where
    W: Write,
{
    out: W,
    color: bool,
}

impl<W> Reporter<W>
where
    W: Write,
{
    /// Construct new reporter.
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    /// Give back underlying output.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Plain line of text.
    pub fn line(&mut self, text: impl AsRef<str>) -> Result<()> {
        writeln!(self.out, "{}", text.as_ref())?;
        Ok(())
    }

    /// Fatal error line, labeled.
    pub fn error(&mut self, label: &str, message: impl AsRef<str>) -> Result<()> {
        let label = self.paint_red(label);
        writeln!(self.out, "{label} : {}", message.as_ref())?;
        Ok(())
    }

    /// Fatal error line, written plain to `fallback` if report output fails.
    ///
    /// # Errors
    ///
    /// - Return [`ReportError::Write`] if neither output can be written to.
    pub fn error_or(
        &mut self,
        fallback: &mut impl Write,
        label: &str,
        message: impl AsRef<str>,
    ) -> Result<()> {
        if self.error(label, message.as_ref()).is_ok() {
            return Ok(());
        }

        writeln!(fallback, "{label} : {}", message.as_ref())?;
        Ok(())
    }

    /// Target path followed by its verdict.
    pub fn verdict(&mut self, target: &Path, verdict: Verdict) -> Result<()> {
        let message = self.paint_green(verdict.message());
        writeln!(self.out, "{} : {message}", target.display())?;
        Ok(())
    }

    /// Attribute change of one tracked entry.
    pub fn attribute_change(&mut self, change: &AttributeChange) -> Result<()> {
        let source_mode = self.paint_green(&change.source_mode);
        let target_mode = self.paint_red(&change.target_mode);
        writeln!(
            self.out,
            "{} {source_mode} {target_mode} {}",
            change.descriptor,
            change.relative_path.display()
        )?;
        Ok(())
    }

    /// Line diff going from deployed copy to repository copy.
    ///
    /// # Errors
    ///
    /// - Return [`ReportError::Read`] if either file cannot be read.
    /// - Return [`ReportError::Write`] if output cannot be written to.
    pub fn content_diff(&mut self, target: &Path, source: &Path) -> Result<()> {
        let old = read_file(target)?;
        let new = read_file(source)?;

        let (Ok(old), Ok(new)) = (std::str::from_utf8(&old), std::str::from_utf8(&new)) else {
            return self.line("binary files differ");
        };

        let diff = TextDiff::from_lines(old, new);
        let mut output = String::new();
        output.push_str(&self.paint_red(&format!("--- {}", target.display())));
        output.push('\n');
        output.push_str(&self.paint_green(&format!("+++ {}", source.display())));
        output.push('\n');

        for hunk in diff.unified_diff().context_radius(CONTEXT_LINES).iter_hunks() {
            output.push_str(&self.paint_cyan(&hunk.header().to_string()));
            output.push('\n');

            for change in hunk.iter_changes() {
                let line = change.value();
                let line = match change.tag() {
                    ChangeTag::Delete => self.paint_red(&format!("-{line}")),
                    ChangeTag::Insert => self.paint_green(&format!("+{line}")),
                    ChangeTag::Equal => format!(" {line}"),
                };
                output.push_str(&line);

                if !line.ends_with('\n') {
                    output.push('\n');
                }
            }
        }

        self.out.write_all(output.as_bytes())?;
        Ok(())
    }

    fn paint_green(&self, text: &str) -> String {
        if self.color {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_red(&self, text: &str) -> String {
        if self.color {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_cyan(&self, text: &str) -> String {
        if self.color {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    read(path).map_err(|source| ReportError::Read {
        source,
        path: path.to_path_buf(),
    })
}

/// Report error types.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Report output cannot be written to.
    #[error("failed to write report")]
    Write(#[from] std::io::Error),

    /// File to diff cannot be read.
    #[error("failed to read {:?} for diff", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ReportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::write;

    fn output(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn verdict_line() -> anyhow::Result<()> {
        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.verdict(Path::new("/home/john/.bashrc"), Verdict::SizeDiffers)?;
        assert_eq!(output(reporter), "/home/john/.bashrc : file size differs\n");
        Ok(())
    }

    #[test]
    fn error_line_colors_only_label() -> anyhow::Result<()> {
        let mut reporter = Reporter::new(Vec::new(), true);
        reporter.error("CONFIG ERROR", "EMAIL value should be a string")?;
        assert_eq!(
            output(reporter),
            "\u{1b}[31mCONFIG ERROR\u{1b}[39m : EMAIL value should be a string\n"
        );

        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.error("ERROR", "boom")?;
        assert_eq!(output(reporter), "ERROR : boom\n");
        Ok(())
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn error_line_falls_back_when_output_fails() -> anyhow::Result<()> {
        let mut fallback = Vec::new();
        let mut reporter = Reporter::new(BrokenPipe, true);
        reporter.error_or(&mut fallback, "ERROR", "uncommitted files exist")?;
        assert_eq!(String::from_utf8(fallback)?, "ERROR : uncommitted files exist\n");

        let mut fallback = Vec::new();
        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.error_or(&mut fallback, "ERROR", "boom")?;
        assert!(fallback.is_empty());
        assert_eq!(output(reporter), "ERROR : boom\n");
        Ok(())
    }

    #[test]
    fn attribute_change_line() -> anyhow::Result<()> {
        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.attribute_change(&AttributeChange {
            relative_path: PathBuf::from(".ssh/config"),
            descriptor: ".f...p.....".into(),
            source_mode: "-rw-------".into(),
            target_mode: "-rw-r--r--".into(),
        })?;
        assert_eq!(output(reporter), ".f...p..... -rw------- -rw-r--r-- .ssh/config\n");
        Ok(())
    }

    #[sealed_test]
    fn content_diff_from_target_to_source() -> anyhow::Result<()> {
        write("deployed", "set number\nset ruler\n")?;
        write("tracked", "set number\nset hidden\n")?;

        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.content_diff(Path::new("deployed"), Path::new("tracked"))?;

        let expect = indoc! {"
            --- deployed
            +++ tracked
            @@ -1,2 +1,2 @@
             set number
            -set ruler
            +set hidden
        "};
        assert_eq!(output(reporter), expect);

        Ok(())
    }

    #[sealed_test]
    fn content_diff_of_binary_files() -> anyhow::Result<()> {
        write("deployed", [0xff, 0xfe, 0x00])?;
        write("tracked", [0xff, 0x00, 0x01])?;

        let mut reporter = Reporter::new(Vec::new(), false);
        reporter.content_diff(Path::new("deployed"), Path::new("tracked"))?;
        assert_eq!(output(reporter), "binary files differ\n");

        Ok(())
    }
}
