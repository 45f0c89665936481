//! Filer HTTP client
//!
//! Wraps `reqwest::Client` with URL construction under the user's namespace
//! (`/{username}/...`) and the filer's JSON listing format.
//!
//! ## Endpoints
//!
//! - `GET /{user}/{dir}/` with `Accept: application/json` lists a directory,
//!   paginated with `lastFileName`
//! - `PUT /{user}/{path}` uploads a file
//! - `GET /{user}/{path}` downloads a file
//! - `PUT|DELETE /{user}/{path}?tagging` sets or removes extended attributes
//!   carried in `Seaweed-<Name>` headers; `HEAD` reads them back
//!
//! Redirects are not followed: every status of 300 or above is an error.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;
use weedsync_core::domain::{
    Chunk, ContentDigest, RelativePath, RemoteEntry, PARTIAL_DOWNLOAD_SUFFIX,
};
use weedsync_core::ports::DownloadParams;

use crate::FilerError;

/// Entries requested per listing page
pub const LISTING_PAGE_SIZE: usize = 1000;

/// Prefix of extended-attribute headers
pub const TAG_HEADER_PREFIX: &str = "Seaweed-";

// ============================================================================
// Listing response types
// ============================================================================

/// One page of a directory listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingPage {
    #[serde(default)]
    entries: Option<Vec<ListingEntry>>,
    #[serde(default)]
    last_file_name: String,
    #[serde(default)]
    should_display_load_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListingEntry {
    full_path: String,
    #[serde(default)]
    mode: u64,
    #[serde(default)]
    file_size: u64,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default, rename = "chunks")]
    chunks: Option<Vec<ListingChunk>>,
}

#[derive(Debug, Deserialize)]
struct ListingChunk {
    #[serde(default)]
    e_tag: String,
    /// Rendered as a JSON number by current filers and as a string by some
    /// older ones
    #[serde(default)]
    mtime: serde_json::Value,
}

impl ListingEntry {
    fn into_remote(self) -> RemoteEntry {
        let md5 = match ContentDigest::parse_marker(self.md5.as_deref()) {
            Ok(digest) => digest,
            Err(err) => {
                warn!(path = %self.full_path, %err, "Ignoring unreadable Md5");
                None
            }
        };

        let chunks = self
            .chunks
            .unwrap_or_default()
            .into_iter()
            .map(|c| Chunk {
                e_tag: c.e_tag,
                mtime: match c.mtime {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                },
            })
            .collect();

        RemoteEntry {
            full_path: self.full_path,
            mode: u32::try_from(self.mode).unwrap_or(u32::MAX),
            file_size: self.file_size,
            md5,
            chunks,
        }
    }
}

// ============================================================================
// FilerClient
// ============================================================================

/// HTTP client for one user's namespace on a filer
#[derive(Debug, Clone)]
pub struct FilerClient {
    /// The underlying HTTP client
    client: Client,
    /// Filer root URL
    base_url: Url,
    /// Account whose namespace is addressed
    username: String,
}

impl FilerClient {
    /// Create a client for `username` on the filer at `base_url`
    ///
    /// # Errors
    /// Returns error if the URL cannot address paths or the HTTP client
    /// cannot be built
    pub fn new(base_url: &str, username: impl Into<String>) -> Result<Self, FilerError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Self::with_client(client, base_url, username)
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_client(
        client: Client,
        base_url: &str,
        username: impl Into<String>,
    ) -> Result<Self, FilerError> {
        let base_url =
            Url::parse(base_url).map_err(|e| FilerError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FilerError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            username: username.into(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of `path` (relative to the user root); a trailing slash is added
    /// for directories
    fn url(&self, path: &str, directory: bool) -> Result<Url, FilerError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| FilerError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(&self.username);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            if directory {
                segments.push("");
            }
        }
        Ok(url)
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    /// List one directory, following pagination
    pub async fn list_dir(&self, dir: &str) -> Result<Vec<RemoteEntry>, FilerError> {
        let url = self.url(dir, true)?;
        let mut entries = Vec::new();
        let mut last_file_name = String::new();

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .header(ACCEPT, "application/json")
                .query(&[("limit", LISTING_PAGE_SIZE.to_string())]);
            if !last_file_name.is_empty() {
                request = request.query(&[("lastFileName", &last_file_name)]);
            }

            let page: ListingPage = check(request.send().await?)?.json().await?;
            let batch = page.entries.unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            entries.extend(batch.into_iter().map(ListingEntry::into_remote));

            if !page.should_display_load_more
                || page.last_file_name.is_empty()
                || page.last_file_name == last_file_name
            {
                break;
            }
            last_file_name = page.last_file_name;
        }

        debug!(dir, entries = entries.len(), "Listed filer directory");
        Ok(entries)
    }

    /// List `folder`, descending into subdirectories when `recursive`
    ///
    /// Directory entries are included in the result.
    pub async fn list(&self, folder: &str, recursive: bool) -> Result<Vec<RemoteEntry>, FilerError> {
        let mut pending = vec![folder.to_string()];
        let mut all = Vec::new();

        while let Some(dir) = pending.pop() {
            let entries = self.list_dir(&dir).await?;
            if recursive {
                for entry in entries.iter().filter(|e| !e.is_file()) {
                    match RelativePath::from_remote(&entry.full_path, &self.username) {
                        Ok(sub) => pending.push(sub.as_str().to_string()),
                        Err(err) => {
                            warn!(path = %entry.full_path, %err, "Skipping unreadable directory")
                        }
                    }
                }
            }
            all.extend(entries);
        }

        Ok(all)
    }

    // ------------------------------------------------------------------
    // Whole-file transfer
    // ------------------------------------------------------------------

    /// Upload the local file at `local` to `remote`
    ///
    /// The body is streamed from disk with the length taken from the file
    /// metadata.
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<(), FilerError> {
        let url = self.url(remote, false)?;
        let file = tokio::fs::File::open(local).await?;
        let bytes = file.metadata().await?.len();

        check(
            self.client
                .put(url)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, bytes)
                .body(Body::wrap_stream(ReaderStream::new(file)))
                .send()
                .await?,
        )?;

        debug!(remote, bytes, "Uploaded file");
        Ok(())
    }

    /// Download `remote` into `dest`, creating parent directories
    ///
    /// The body is streamed into a sibling `<dest>.weedsync-part` file that
    /// is renamed onto `dest` once complete, so `dest` never holds a
    /// truncated download. Returns the number of bytes written.
    pub async fn download(
        &self,
        remote: &str,
        dest: &Path,
        params: &DownloadParams,
    ) -> Result<u64, FilerError> {
        let url = self.url(remote, false)?;
        let mut request = self.client.get(url);
        if !params.is_empty() {
            let pairs: Vec<(&str, &str)> = params.iter().collect();
            request = request.query(&pairs);
        }
        let response = check(request.send().await?)?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = PartFile::for_dest(dest);
        let mut file = tokio::fs::File::create(&part.path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        part.commit(dest).await?;

        debug!(remote, bytes = written, dest = %dest.display(), "Downloaded file");
        Ok(written)
    }

    // ------------------------------------------------------------------
    // Extended-attribute tags
    // ------------------------------------------------------------------

    /// Read tag `name` of `remote`, `None` when unset
    pub async fn get_tag(&self, remote: &str, name: &str) -> Result<Option<String>, FilerError> {
        let url = self.url(remote, false)?;
        let response = check(self.client.head(url).send().await?)?;
        let header = format!("{TAG_HEADER_PREFIX}{name}");
        Ok(response
            .headers()
            .get(header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }

    /// Set tag `name` of `remote` to `value`
    pub async fn set_tag(&self, remote: &str, name: &str, value: &str) -> Result<(), FilerError> {
        let url = self.url(remote, false)?;
        check(
            self.client
                .put(url)
                .query(&[("tagging", "")])
                .header(format!("{TAG_HEADER_PREFIX}{name}"), value)
                .send()
                .await?,
        )?;
        debug!(remote, tag = name, "Tag set");
        Ok(())
    }

    /// Remove tag `name` from `remote`
    pub async fn delete_tag(&self, remote: &str, name: &str) -> Result<(), FilerError> {
        let url = self.url(remote, false)?;
        check(
            self.client
                .delete(url)
                .query(&[("tagging", name)])
                .send()
                .await?,
        )?;
        debug!(remote, tag = name, "Tag removed");
        Ok(())
    }
}

/// Turn any status of 300 or above into an error
fn check(response: Response) -> Result<Response, FilerError> {
    let status = response.status();
    if status.as_u16() >= 300 {
        return Err(FilerError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

// ============================================================================
// Partial downloads
// ============================================================================

/// Sibling file a download streams into before it replaces the destination
///
/// Removed on drop unless committed, which covers both failed and
/// abandoned downloads.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    fn for_dest(dest: &Path) -> Self {
        let mut name = dest.as_os_str().to_owned();
        name.push(PARTIAL_DOWNLOAD_SUFFIX);
        Self {
            path: PathBuf::from(name),
            committed: false,
        }
    }

    async fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to remove partial download");
            }
        }
    }
}
