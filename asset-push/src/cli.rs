///
/// This module implements the CLI interface for asset-push: command parsing,
/// configuration resolution, backend selection and reporting the run result.
///
/// All pipeline logic (manifest, change detection, ordering, uploads) lives in the
/// [`asset-push-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - In CI: run `asset-push sync` with the action inputs in `INPUT_*` variables.
/// - Locally: `asset-push sync --config publish.yaml`.
/// - For integration tests: call [`run`] with a constructed [`Cli`].
///
/// ## Output
/// On success stdout carries one line, `success: [...]`, listing the uploaded
/// paths. When `GITHUB_OUTPUT` is set the same payload is written there as
/// `deployResult`. Logs go to stderr.
///
/// [`asset-push-core`]: ../../asset_push_core/
use crate::load_config::{load_config, CliOverrides};
use crate::upload::Backend;
use anyhow::{Context, Result};
use asset_push_core::listing::WalkDirLister;
use asset_push_core::synchronise::{output_payload, synchronise};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

/// Name of the CI output that receives the run result.
pub const RESULT_OUTPUT: &str = "deployResult";

/// CLI for asset-push: incremental static asset publishing.
#[derive(Parser)]
#[clap(
    name = "asset-push",
    version,
    about = "Upload new and changed static assets to object storage, static hosting or a local directory"
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload new and changed files, then persist the manifest
    Sync {
        /// Path to an optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Ignore the stored manifest and upload every eligible file
        #[clap(long)]
        force: bool,
        /// Maximum uploads in flight
        #[clap(long)]
        concurrency: Option<usize>,
    },
}

/// Append `name=value` to the file named by `GITHUB_OUTPUT`, if any.
pub fn write_action_output(name: &str, value: &str) -> Result<()> {
    let Some(path) = std::env::var_os("GITHUB_OUTPUT").filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open GITHUB_OUTPUT file {path:?}"))?;
    writeln!(file, "{name}={value}").context("failed to write GITHUB_OUTPUT")?;
    Ok(())
}

/// Escape a message for a workflow command such as `::error::`.
pub fn escape_workflow_message(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let result = match cli.command {
        Commands::Sync {
            config,
            force,
            concurrency,
        } => sync(config, CliOverrides { force, concurrency }).await,
    };

    if let Err(e) = &result {
        tracing::error!(command = "sync", error = %e, "Publish run failed");
        if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
            println!("::error::{}", escape_workflow_message(&format!("{e:#}")));
        }
    }
    result
}

async fn sync(config: Option<PathBuf>, overrides: CliOverrides) -> Result<()> {
    tracing::info!(command = "sync", "Starting publish run");
    let config = load_config(config.as_deref(), &overrides)?;
    let backend = Backend::from_config(&config)?;
    let lister = WalkDirLister::new();

    let report = match synchronise(&config, &backend, &lister).await {
        Ok(report) => report,
        Err(e) => {
            // Uploads that landed before the manifest write failed are still reported.
            if !e.uploaded().is_empty() {
                let payload = output_payload(e.uploaded());
                println!("{payload}");
                write_action_output(RESULT_OUTPUT, &payload)?;
            }
            return Err(anyhow::Error::new(e));
        }
    };

    tracing::info!(
        command = "sync",
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        "Publish run complete"
    );
    for failure in &report.failed {
        tracing::warn!(
            path = %failure.path,
            key = %failure.remote_key,
            error = %failure.error,
            "Not uploaded"
        );
    }
    let payload = report.output_payload();
    println!("{payload}");
    write_action_output(RESULT_OUTPUT, &payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_messages_are_escaped() {
        assert_eq!(
            escape_workflow_message("100% failed\nsee log"),
            "100%25 failed%0Asee log"
        );
    }

    #[test]
    fn sync_flags_parse() {
        let cli = Cli::parse_from([
            "asset-push",
            "sync",
            "--force",
            "--concurrency",
            "4",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Sync {
                config,
                force,
                concurrency,
            } => {
                assert!(config.is_none());
                assert!(force);
                assert_eq!(concurrency, Some(4));
            }
        }
    }
}
