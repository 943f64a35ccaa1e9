// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use cfgsync::{
    provider::providers_for, ConfigError, Git2Repo, Importer, Mode, Reconciler, Reporter,
    Settings, VersionControl, SETTINGS_FILE,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{
    io::{stderr, stdout, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "cfgsync [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path inside configuration repository.
    #[arg(short = 'C', long, value_name = "path", default_value = ".")]
    pub repository: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let repo = Git2Repo::discover(&self.repository)?;

        // INVARIANT: Settings are validated before any tree walk.
        let settings = Settings::load(repo.workdir().join(SETTINGS_FILE))?;

        match self.command {
            Command::Install(opts) => run_install(&repo, &settings, opts.test),
            Command::Check => run_install(&repo, &settings, true),
            Command::Add(opts) => run_add(&repo, &settings, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install tracked files into target root.
    #[command(override_usage = "cfgsync install [options]")]
    Install(InstallOptions),

    /// Perform a trial install to show what changed.
    #[command(override_usage = "cfgsync check")]
    Check,

    /// Import file into repository and commit it.
    #[command(override_usage = "cfgsync add <path>", visible_alias = "import")]
    Add(AddOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Report differences without installing anything.
    #[arg(short, long)]
    pub test: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Full path of file to import.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        debug!("{error:?}");
        let label = if error.downcast_ref::<ConfigError>().is_some() {
            "CONFIG ERROR"
        } else {
            "ERROR"
        };

        let message = format!("{error:#}");
        let mut reporter = Reporter::new(stderr(), stderr().is_terminal());
        if let Err(err) = reporter.error_or(&mut stdout(), label, &message) {
            debug!("cannot report fatal error: {err}");
        }
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_install(repo: &Git2Repo, settings: &Settings, test: bool) -> Result<()> {
    let (hasher, differ) = providers_for(&settings.tools);
    let mode = if test { Mode::DryRun } else { Mode::Install };
    let mut reporter = Reporter::new(stdout(), stdout().is_terminal());

    Reconciler::new(repo, settings, hasher.as_ref(), differ.as_ref()).run(mode, &mut reporter)?;

    Ok(())
}

fn run_add(repo: &Git2Repo, settings: &Settings, opts: AddOptions) -> Result<()> {
    let staged = Importer::new(repo, settings).import(&opts.path)?;
    let basename = staged
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut reporter = Reporter::new(stdout(), stdout().is_terminal());
    reporter.line(format!("{basename} added to the repository"))?;

    Ok(())
}
