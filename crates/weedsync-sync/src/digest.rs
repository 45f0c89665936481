//! MD5 content digests
//!
//! The store records a whole-file MD5 (`Md5`) and one MD5 per stored chunk
//! (`e_tag`). [`file_digests`] computes both in a single pass over the file
//! so the comparator and the tag writer work from the same materialized
//! values.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use weedsync_core::domain::ContentDigest;

/// Read buffer for whole-file digests
pub const WHOLE_FILE_BUFFER: usize = 16_384;

/// Chunk size the store uses by default
pub const DEFAULT_CHUNK_SIZE: usize = 1_048_576;

/// Per-chunk and whole-file digests of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    /// Digest of each `chunk_size` slice, in file order (empty for an empty file)
    pub chunks: Vec<ContentDigest>,
    /// Digest of the whole file
    pub whole: ContentDigest,
    /// Bytes read
    pub size: u64,
}

impl FileDigests {
    /// Chunk digests followed by the whole-file digest
    pub fn sequence(&self) -> impl Iterator<Item = ContentDigest> + '_ {
        self.chunks
            .iter()
            .copied()
            .chain(std::iter::once(self.whole))
    }
}

fn finish(hasher: Md5) -> ContentDigest {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hasher.finalize());
    ContentDigest::from_bytes(bytes)
}

/// Fill `buf` from `file`, returning fewer bytes only at end of file
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Compute chunk digests (at `chunk_size`) and the whole-file digest
pub async fn file_digests(path: &Path, chunk_size: usize) -> std::io::Result<FileDigests> {
    let chunk_size = chunk_size.max(1);
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; chunk_size];
    let mut whole = Md5::new();
    let mut chunks = Vec::new();
    let mut size = 0u64;

    loop {
        let n = read_full(&mut file, &mut buf).await?;
        if n == 0 {
            break;
        }
        whole.update(&buf[..n]);
        chunks.push(finish(Md5::new_with_prefix(&buf[..n])));
        size += n as u64;
        if n < chunk_size {
            break;
        }
    }

    Ok(FileDigests {
        chunks,
        whole: finish(whole),
        size,
    })
}

/// Stream the file once and return its MD5
pub async fn whole_file_digest(path: &Path) -> std::io::Result<ContentDigest> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; WHOLE_FILE_BUFFER];
    let mut hasher = Md5::new();

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(finish(hasher))
}

/// MD5 of an in-memory buffer
pub fn digest_bytes(bytes: &[u8]) -> ContentDigest {
    finish(Md5::new_with_prefix(bytes))
}
