//! Shared helpers for filer integration tests

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::MockServer;

use weedsync_core::domain::ClientId;
use weedsync_filer::{FilerClient, FilerRemoteStore, TransferEndpoints};
use weedsync_transfer::{ControlLink, Dialect, LineChannel};

pub const USER: &str = "alice";
pub const CLIENT: &str = "client-a";

/// Mode the filer reports for directories
pub const DIR_MODE: u64 = 2_147_484_141;

/// Start a mock filer and a store whose transfer endpoints go nowhere
pub async fn setup_filer_mock() -> (MockServer, FilerRemoteStore) {
    let server = MockServer::start().await;
    let store = store_for(&server.uri(), unused_endpoints(), CLIENT);
    (server, store)
}

pub fn store_for(url: &str, transfer: TransferEndpoints, client_id: &str) -> FilerRemoteStore {
    let client = FilerClient::new(url, USER).unwrap();
    FilerRemoteStore::new(client, transfer, ClientId::new(client_id.to_string()).unwrap())
}

/// A filer that promises `declared` body bytes, sends `sent` and hangs up
///
/// Returns the base URL of the listener. It serves a single request.
pub async fn short_body_filer(declared: usize, sent: &[u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sent = sent.to_vec();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n");
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&sent).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

pub fn unused_endpoints() -> TransferEndpoints {
    TransferEndpoints::new("127.0.0.1:9", "127.0.0.1:9", Dialect::Legacy)
}

/// JSON listing entry for a regular file
pub fn file_entry(path: &str, size: u64, md5: &str, mtime: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "FullPath": format!("/{USER}/{path}"),
        "Mode": 432,
        "FileSize": size,
        "Md5": md5,
        "chunks": [ { "e_tag": "XUFAKrxLKna5cZ2REBfFkg==", "mtime": mtime } ]
    })
}

/// JSON listing entry for a directory
pub fn dir_entry(path: &str) -> serde_json::Value {
    serde_json::json!({
        "FullPath": format!("/{USER}/{path}"),
        "Mode": DIR_MODE,
        "FileSize": 0
    })
}

pub fn page(entries: serde_json::Value, last: &str, more: bool) -> serde_json::Value {
    serde_json::json!({
        "Path": format!("/{USER}"),
        "Entries": entries,
        "LastFileName": last,
        "ShouldDisplayLoadMore": more
    })
}

// ============================================================================
// Transfer peers
// ============================================================================

/// The filer side of transfer sessions: a control and a data listener
pub struct TransferPeer {
    control: TcpListener,
    data: TcpListener,
    dialect: Dialect,
}

impl TransferPeer {
    pub async fn bind(dialect: Dialect) -> Self {
        Self {
            control: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            data: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            dialect,
        }
    }

    pub fn endpoints(&self) -> TransferEndpoints {
        TransferEndpoints::new(
            self.control.local_addr().unwrap().to_string(),
            self.data.local_addr().unwrap().to_string(),
            self.dialect,
        )
    }

    /// Accept one session in the order the client connects
    pub async fn accept(&self) -> (ControlLink<LineChannel<TcpStream>>, TcpStream) {
        let (control, _) = self.control.accept().await.unwrap();
        let (data, _) = self.data.accept().await.unwrap();
        (ControlLink::new(LineChannel::new(control), self.dialect), data)
    }
}

pub fn write_file(dir: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}
