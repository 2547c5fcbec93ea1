//! monobuild CLI - build a TypeScript monorepo in dependency order

use std::io::IsTerminal;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use monobuild::builder::Reporter;
use monobuild::core::{Workspace, WorkspaceError};
use monobuild::util::config::{global_config_path, load_config, project_config_path};
use monobuild::util::diagnostic::{self, suggestions, Diagnostic};

mod cli;

use cli::Cli;

fn main() {
    if let Err(e) = run() {
        let color = std::io::stderr().is_terminal();
        match e.downcast_ref::<WorkspaceError>() {
            Some(err) => diagnostic::emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse_lenient();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("monobuild=debug")
        } else {
            EnvFilter::new("monobuild=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    println!("{}", serde_json::to_string(&cli.options())?);
    if !cli.extra.is_empty() {
        tracing::debug!("Ignoring unrecognized arguments: {}", cli.extra.join(" "));
    }

    let cwd = match cli.cwd {
        Some(ref dir) => dir.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };
    let ws = Workspace::discover(&cwd)?;
    tracing::debug!("Workspace root: {}", ws.root().display());

    let config = load_config(
        global_config_path().as_deref(),
        &project_config_path(ws.root()),
    );
    let reporter = Reporter::new(cli.message_format, cli.verbose);

    let report = monobuild::ops::build(&ws, &config, &cli.build_options(), &reporter)?;

    if report.packages.is_empty() {
        let diag = Diagnostic::warning("no packages selected")
            .with_location(ws.root())
            .with_suggestion(suggestions::NOTHING_SELECTED);
        diagnostic::emit(&diag, std::io::stderr().is_terminal());
    }

    if !report.success() {
        let failed: Vec<&str> = report.failed().iter().map(|p| p.name.as_str()).collect();
        bail!(
            "{} package(s) failed to build: {}",
            failed.len(),
            failed.join(", ")
        );
    }

    Ok(())
}
