//! Sync command - Synchronize a folder with the filer
//!
//! Provides the `weedsync sync` CLI command which:
//! 1. Loads and validates configuration
//! 2. Creates the filer store, the rdiff engine and a scratch workspace
//! 3. Runs one sync pass and reports the outcome
//!
//! Ctrl-C cancels the pass: running transfers are aborted and the file
//! being reconciled gives its lock back before the command exits. The
//! workspace is removed either way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{info, warn};
use weedsync_filer::FilerRemoteStore;
use weedsync_sync::engine::{SyncOptions, SyncOrchestrator, SyncReport};
use weedsync_sync::rdiff::RdiffEngine;
use weedsync_sync::workspace::Workspace;

use super::{load_valid_config, resolve_folder};
use crate::output::{format_duration, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Folder to synchronize, absolute or relative to sync.root
    pub folder: PathBuf,

    /// Only synchronize files directly inside the folder
    #[arg(long)]
    pub no_recursive: bool,

    /// Number of concurrent transfers (overrides sync.workers)
    #[arg(long)]
    pub workers: Option<u32>,
}

impl SyncCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let mut config = load_valid_config(config_path)?;
        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            config.sync.workers = workers;
        }
        let recursive = config.sync.recursive && !self.no_recursive;
        let (folder, base) = resolve_folder(&self.folder, &config.sync.root).await?;

        let store = Arc::new(FilerRemoteStore::from_config(&config)?);
        let delta = Arc::new(RdiffEngine::new(config.delta.rdiff_path.clone()));
        let workspace = match &config.workspace.root {
            Some(root) => Workspace::open_in(root, &config.workspace.prefix),
            None => Workspace::open(&config.workspace.prefix),
        }
        .context("Failed to open scratch workspace")?;

        let orchestrator =
            SyncOrchestrator::new(store, delta, workspace, SyncOptions::from_config(&config));

        info!(
            folder = %folder.display(),
            base = %base.display(),
            recursive,
            workers = config.sync.workers,
            "Starting sync"
        );
        formatter.info(&format!("Synchronizing {} ...", folder.display()));

        let cancel = orchestrator.cancellation_token();
        let result = {
            let pass = orchestrator.sync_folder(&folder, &base, recursive);
            tokio::pin!(pass);
            tokio::select! {
                result = &mut pass => result,
                Ok(()) = tokio::signal::ctrl_c() => {
                    formatter.warn("Interrupted, releasing locks before exit");
                    cancel.cancel();
                    pass.await
                }
            }
        };

        if let Err(err) = orchestrator.shutdown() {
            warn!(%err, "Failed to remove scratch workspace");
        }

        let report = result.with_context(|| format!("Sync of {} failed", folder.display()))?;

        print_report(formatter.as_ref(), format, &report)?;
        if report.cancelled {
            bail!("Sync interrupted");
        }
        if !report.is_clean() {
            bail!(
                "{} not synchronized",
                plural(
                    report.errors.len() + report.given_up.len() + report.aborted_tasks as usize,
                    "file"
                )
            );
        }
        Ok(())
    }
}

fn print_report(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    report: &SyncReport,
) -> Result<()> {
    if format.is_json() {
        let json = serde_json::to_value(report).context("Failed to serialize sync report")?;
        formatter.print_json(&json);
        return Ok(());
    }

    let transferred = (report.uploaded + report.downloaded) as usize;
    if transferred == 0 && report.is_clean() {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!(
            "Sync completed in {}",
            format_duration(report.duration_ms)
        ));
    }

    if report.uploaded > 0 {
        formatter.info(&format!("Uploaded:   {}", plural(report.uploaded as usize, "file")));
    }
    if report.downloaded > 0 {
        formatter.info(&format!(
            "Downloaded: {}",
            plural(report.downloaded as usize, "file")
        ));
    }
    if report.already_synced > 0 {
        formatter.info(&format!(
            "Unchanged:  {}",
            plural(report.already_synced as usize, "file")
        ));
    }
    if report.retry_rounds > 0 {
        formatter.info(&format!(
            "Retries:    {}",
            plural(report.retry_rounds as usize, "round")
        ));
    }

    for failure in &report.errors {
        formatter.error(&format!(
            "{} ({}): {}",
            failure.path, failure.direction, failure.error
        ));
    }
    if report.aborted_tasks > 0 {
        formatter.warn(&format!(
            "{} aborted",
            plural(report.aborted_tasks as usize, "transfer")
        ));
    }
    let given_up: Vec<String> = report.given_up.iter().map(ToString::to_string).collect();
    if !given_up.is_empty() {
        formatter.warn("Still locked by another client after the last retry:");
        formatter.list("Given up", &given_up);
    }
    if report.cancelled {
        formatter.warn("Interrupted before every file was handled");
    }
    Ok(())
}
