//! CLI subcommands and the helpers they share

pub mod config;
pub mod diff;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use weedsync_core::config::Config;

/// Load the config file at `path`, falling back to defaults when it does not
/// exist
///
/// A file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(config_path = %path.display(), "No configuration file, using defaults");
        return Ok(Config::default());
    }
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    info!(config_path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Load and validate; every validation error is reported at once
pub fn load_valid_config(path: &Path) -> Result<Config> {
    let mut config = load_config(path)?;
    config.sync.root = expand_tilde(&config.sync.root);

    let errors = config.validate();
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration: {}", joined.join("; "));
    }
    Ok(config)
}

/// Replace a leading `~` with the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the folder argument against the sync root
///
/// Relative folders are taken relative to `base`. Both paths are
/// canonicalized so the folder can be checked against the base.
pub async fn resolve_folder(folder: &Path, base: &Path) -> Result<(PathBuf, PathBuf)> {
    let base = tokio::fs::canonicalize(base)
        .await
        .with_context(|| format!("Sync root {} is not accessible", base.display()))?;
    let joined = if folder.is_absolute() {
        folder.to_path_buf()
    } else {
        base.join(folder)
    };
    let folder = tokio::fs::canonicalize(&joined)
        .await
        .with_context(|| format!("Folder {} is not accessible", joined.display()))?;

    if !folder.starts_with(&base) {
        bail!(
            "Folder {} is outside the sync root {}",
            folder.display(),
            base.display()
        );
    }
    Ok((folder, base))
}
