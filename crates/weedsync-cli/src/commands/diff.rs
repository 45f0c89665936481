//! Diff command - Preview what a sync pass would reconcile
//!
//! Lists the folder on both sides and prints the three-way split without
//! transferring or tagging anything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use weedsync_core::domain::ListingDiff;
use weedsync_filer::FilerRemoteStore;
use weedsync_sync::diff::compute_diff;

use super::{load_valid_config, resolve_folder};
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct DiffCommand {
    /// Folder to compare, absolute or relative to sync.root
    pub folder: PathBuf,

    /// Only compare files directly inside the folder
    #[arg(long)]
    pub no_recursive: bool,
}

impl DiffCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let config = load_valid_config(config_path)?;
        let recursive = config.sync.recursive && !self.no_recursive;
        let (folder, base) = resolve_folder(&self.folder, &config.sync.root).await?;
        let store = FilerRemoteStore::from_config(&config)?;

        let diff = compute_diff(&store, &folder, &base, recursive)
            .await
            .with_context(|| format!("Failed to compare {}", folder.display()))?;

        if format.is_json() {
            formatter.print_json(&diff_to_json(&diff));
            return Ok(());
        }

        if diff.is_empty() {
            formatter.success("No files on either side");
            return Ok(());
        }
        formatter.success(&format!(
            "{}: {} local only, {} remote only, {} on both sides",
            folder.display(),
            diff.local_only.len(),
            diff.remote_only.len(),
            diff.both.len()
        ));

        let local: Vec<String> = diff.local_only.iter().map(ToString::to_string).collect();
        let remote: Vec<String> = diff.remote_only.iter().map(ToString::to_string).collect();
        let both: Vec<String> = diff
            .both
            .iter()
            .map(|(path, entry)| format!("{path} ({} bytes)", entry.file_size))
            .collect();
        formatter.list("Upload", &local);
        formatter.list("Download", &remote);
        formatter.list("Compare", &both);
        formatter.info(&format!("Total: {}", plural(diff.total(), "file")));
        Ok(())
    }
}

fn diff_to_json(diff: &ListingDiff) -> serde_json::Value {
    let both: Vec<serde_json::Value> = diff
        .both
        .iter()
        .map(|(path, entry)| {
            serde_json::json!({
                "path": path,
                "size": entry.file_size,
                "md5": entry.md5,
                "mtime": entry.reference_mtime(),
            })
        })
        .collect();

    serde_json::json!({
        "local_only": diff.local_only,
        "remote_only": diff.remote_only,
        "both": both,
    })
}
