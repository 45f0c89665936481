//! rdiff delta engine
//!
//! Runs the librsync `rdiff` command line tool for signature, delta and
//! patch generation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use weedsync_core::ports::IDeltaEngine;

/// Failures running the delta tool
#[derive(Debug, Error)]
pub enum DeltaError {
    /// The executable could not be started
    #[error("Failed to run rdiff {op}: {source}")]
    Spawn {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The executable ran but reported failure
    #[error("rdiff {op} exited with status {code:?}: {stderr}")]
    Status {
        op: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

/// [`IDeltaEngine`] backed by an `rdiff` executable
#[derive(Debug, Clone)]
pub struct RdiffEngine {
    binary: PathBuf,
}

impl RdiffEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, op: &'static str, args: &[&Path]) -> Result<(), DeltaError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(op);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|source| DeltaError::Spawn { op, source })?;

        if !output.status.success() {
            return Err(DeltaError::Status {
                op,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(op, binary = %self.binary.display(), "rdiff finished");
        Ok(())
    }
}

impl Default for RdiffEngine {
    fn default() -> Self {
        Self::new("rdiff")
    }
}

#[async_trait::async_trait]
impl IDeltaEngine for RdiffEngine {
    async fn signature(&self, source: &Path, signature_out: &Path) -> anyhow::Result<()> {
        self.run("signature", &[source, signature_out]).await?;
        Ok(())
    }

    async fn delta(
        &self,
        signature: &Path,
        new_file: &Path,
        delta_out: &Path,
    ) -> anyhow::Result<()> {
        self.run("delta", &[signature, new_file, delta_out]).await?;
        Ok(())
    }

    async fn patch(&self, basis: &Path, delta: &Path, patched_out: &Path) -> anyhow::Result<()> {
        self.run("patch", &[basis, delta, patched_out]).await?;
        Ok(())
    }
}
