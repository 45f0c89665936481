//! Delta engine port (driven/secondary port)
//!
//! Binary delta computation in the rsync family: a signature summarises a
//! basis file, a delta encodes a new file against a signature, and a patch
//! rebuilds the new file from the basis plus the delta.
//!
//! Every operation reads and writes whole files; the engine does not stream.
//! A failure leaves any partially written output behind and the caller is
//! expected to discard it.

use std::path::Path;

/// Port for signature, delta and patch generation
#[async_trait::async_trait]
pub trait IDeltaEngine: Send + Sync {
    /// Write the signature of `source` to `signature_out`
    async fn signature(&self, source: &Path, signature_out: &Path) -> anyhow::Result<()>;

    /// Write the delta that turns the signed basis into `new_file`
    async fn delta(
        &self,
        signature: &Path,
        new_file: &Path,
        delta_out: &Path,
    ) -> anyhow::Result<()>;

    /// Apply `delta` to `basis`, writing the result to `patched_out`
    async fn patch(&self, basis: &Path, delta: &Path, patched_out: &Path) -> anyhow::Result<()>;
}
