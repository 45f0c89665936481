//! Whole-file HTTP transfer and transfer-protocol sessions

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use weedsync_core::domain::RelativePath;
use weedsync_core::ports::{DownloadParams, IRemoteStore};
use weedsync_filer::FilerError;
use weedsync_transfer::session::{receive_folder, receive_pushed_file};
use weedsync_transfer::{ControlMessage, Dialect, Operation};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    setup_filer_mock, short_body_filer, store_for, unused_endpoints, write_file, TransferPeer,
    CLIENT,
};

fn rel(path: &str) -> RelativePath {
    RelativePath::new(path.to_string()).unwrap()
}

// ============================================================================
// HTTP upload and download
// ============================================================================

#[tokio::test]
async fn test_upload_puts_file_body() {
    let (server, store) = setup_filer_mock().await;
    let dir = TempDir::new().unwrap();
    let local = write_file(dir.path(), "docs/u.txt", b"upload me");

    Mock::given(method("PUT"))
        .and(path("/alice/docs/u.txt"))
        .and(header("Content-Type", "application/octet-stream"))
        .and(body_bytes(b"upload me".to_vec()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store.upload_file(&local, &rel("docs/u.txt")).await.unwrap();
}

#[tokio::test]
async fn test_upload_declares_content_length() {
    let (server, store) = setup_filer_mock().await;
    let dir = TempDir::new().unwrap();
    let local = write_file(dir.path(), "big.bin", &vec![7u8; 300_000]);
    let empty = write_file(dir.path(), "empty.txt", b"");

    Mock::given(method("PUT"))
        .and(path("/alice/big.bin"))
        .and(header("Content-Length", "300000"))
        .and(body_bytes(vec![7u8; 300_000]))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/alice/empty.txt"))
        .and(header("Content-Length", "0"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store.upload_file(&local, &rel("big.bin")).await.unwrap();
    store.upload_file(&empty, &rel("empty.txt")).await.unwrap();
}

#[tokio::test]
async fn test_upload_rejected() {
    let (server, store) = setup_filer_mock().await;
    let dir = TempDir::new().unwrap();
    let local = write_file(dir.path(), "x.txt", b"x");

    Mock::given(method("PUT"))
        .and(path("/alice/x.txt"))
        .respond_with(ResponseTemplate::new(507))
        .mount(&server)
        .await;

    let err = store.upload_file(&local, &rel("x.txt")).await.unwrap_err();
    assert!(format!("{err:#}").contains("507"));
}

#[tokio::test]
async fn test_download_creates_parent_directories() {
    let (server, store) = setup_filer_mock().await;
    let dest = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/alice/docs/deep/d.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote body".to_vec()))
        .mount(&server)
        .await;

    let written = store
        .download_file("docs/deep/d.txt", dest.path(), &DownloadParams::none())
        .await
        .unwrap();

    assert_eq!(written, dest.path().join("docs/deep/d.txt"));
    assert_eq!(std::fs::read(&written).unwrap(), b"remote body");
}

#[tokio::test]
async fn test_download_signature_with_meta_param() {
    let (server, store) = setup_filer_mock().await;
    let dest = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/alice/v.txt.sig.v"))
        .and(query_param("meta", ""))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"SIGNATURE".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let written = store
        .download_file("v.txt.sig.v", dest.path(), &DownloadParams::meta())
        .await
        .unwrap();
    assert_eq!(std::fs::read(written).unwrap(), b"SIGNATURE");
}

#[tokio::test]
async fn test_download_missing_file() {
    let (server, store) = setup_filer_mock().await;
    let dest = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/alice/nope.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = store
        .download_file("nope.txt", dest.path(), &DownloadParams::none())
        .await;
    assert!(result.is_err());
    assert!(!dest.path().join("nope.txt").exists());
}

#[tokio::test]
async fn test_truncated_download_leaves_no_file() {
    let url = short_body_filer(1000, b"0123456789").await;
    let store = store_for(&url, unused_endpoints(), CLIENT);
    let dest = TempDir::new().unwrap();

    let result = store
        .download_file("docs/cut.txt", dest.path(), &DownloadParams::none())
        .await;

    assert!(result.is_err());
    assert!(!dest.path().join("docs/cut.txt").exists());
    assert!(!dest.path().join("docs/cut.txt.weedsync-part").exists());
}

#[tokio::test]
async fn test_truncated_download_keeps_previous_copy() {
    let url = short_body_filer(1000, b"0123456789").await;
    let store = store_for(&url, unused_endpoints(), CLIENT);
    let dest = TempDir::new().unwrap();
    let existing = write_file(dest.path(), "kept.txt", b"previous content");

    let result = store
        .download_file("kept.txt", dest.path(), &DownloadParams::none())
        .await;

    assert!(result.is_err());
    assert_eq!(std::fs::read(&existing).unwrap(), b"previous content");
    let leftovers: Vec<_> = std::fs::read_dir(dest.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("kept.txt")]);
}

// ============================================================================
// Transfer sessions
// ============================================================================

#[tokio::test]
async fn test_make_version_delta_pushes_signature() {
    let peer = TransferPeer::bind(Dialect::Tagged).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let scratch = TempDir::new().unwrap();
    let received = TempDir::new().unwrap();
    let sig = write_file(scratch.path(), "v.txt.sig", b"local signature");

    let dest = received.path().to_path_buf();
    let filer = tokio::spawn(async move {
        let (mut link, mut data) = peer.accept().await;
        let op = link.accept().await.unwrap();
        let (announced, receipt) = receive_pushed_file(&mut link, &mut data, &dest)
            .await
            .unwrap();
        (op, announced, receipt)
    });

    store.make_version_delta(&sig, &rel("docs/v.txt")).await.unwrap();

    let (op, announced, receipt) = filer.await.unwrap();
    assert_eq!(op, Some(Operation::MakeVersionDelta));
    assert_eq!(announced, "docs/v.txt");
    assert!(receipt.is_complete());
    assert_eq!(
        std::fs::read(received.path().join("docs/v.txt")).unwrap(),
        b"local signature"
    );
}

#[tokio::test]
async fn test_upload_new_version_legacy_dialect() {
    let peer = TransferPeer::bind(Dialect::Legacy).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let scratch = TempDir::new().unwrap();
    let received = TempDir::new().unwrap();
    let delta = write_file(scratch.path(), "v.txt.delta", b"delta bytes");

    let dest = received.path().to_path_buf();
    let filer = tokio::spawn(async move {
        let (mut link, mut data) = peer.accept().await;
        receive_pushed_file(&mut link, &mut data, &dest).await.unwrap().0
    });

    store.upload_new_version(&delta, &rel("v.txt")).await.unwrap();

    assert_eq!(filer.await.unwrap(), "v.txt");
    assert_eq!(std::fs::read(received.path().join("v.txt")).unwrap(), b"delta bytes");
}

#[tokio::test]
async fn test_download_new_version_receives_delta() {
    let peer = TransferPeer::bind(Dialect::Tagged).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let scratch = TempDir::new().unwrap();
    let received = TempDir::new().unwrap();
    let sig = write_file(scratch.path(), "p.txt.sig", b"sig of stale copy");
    let delta_out = scratch.path().join("p.txt.delta");

    let dest = received.path().to_path_buf();
    let filer = tokio::spawn(async move {
        let (mut link, mut data) = peer.accept().await;
        let op = link.accept().await.unwrap();
        receive_pushed_file(&mut link, &mut data, &dest).await.unwrap();
        data.write_all(b"computed delta").await.unwrap();
        data.shutdown().await.unwrap();
        op
    });

    let out = store
        .download_new_version(&sig, &rel("p.txt"), &delta_out)
        .await
        .unwrap();

    assert_eq!(filer.await.unwrap(), Some(Operation::DownloadNewVersion));
    assert_eq!(out, delta_out);
    assert_eq!(std::fs::read(&delta_out).unwrap(), b"computed delta");
    assert_eq!(
        std::fs::read(received.path().join("p.txt")).unwrap(),
        b"sig of stale copy"
    );
}

#[tokio::test]
async fn test_declined_push_is_an_error() {
    let peer = TransferPeer::bind(Dialect::Legacy).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let scratch = TempDir::new().unwrap();
    let delta = write_file(scratch.path(), "v.txt.delta", b"delta");

    let filer = tokio::spawn(async move {
        let (mut link, _data) = peer.accept().await;
        link.send(&ControlMessage::Terminate).await.unwrap();
        // Hold the sockets until the client has read the refusal
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let err = store
        .upload_new_version(&delta, &rel("v.txt"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FilerError>(),
        Some(FilerError::Unconfirmed { .. })
    ));
    filer.await.unwrap();
}

#[tokio::test]
async fn test_transfer_endpoint_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let store = store_for(
        "http://127.0.0.1:9",
        weedsync_filer::TransferEndpoints::new(addr.clone(), addr, Dialect::Legacy),
        CLIENT,
    );
    let scratch = TempDir::new().unwrap();
    let sig = write_file(scratch.path(), "a.sig", b"s");

    assert!(store.make_version_delta(&sig, &rel("a.txt")).await.is_err());
}

#[tokio::test]
async fn test_push_folder_mirrors_tree() {
    let peer = TransferPeer::bind(Dialect::Tagged).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let base = TempDir::new().unwrap();
    let received = TempDir::new().unwrap();
    write_file(base.path(), "docs/a.txt", b"a");
    write_file(base.path(), "docs/sub/b.txt", b"bb");

    let dest = received.path().to_path_buf();
    let filer = tokio::spawn(async move {
        let (mut link, mut data) = peer.accept().await;
        let op = link.accept().await.unwrap();
        // The client hangs up after its last file; how the final grant
        // fails depends on timing, so only the files on disk are checked.
        let _ = receive_folder(&mut link, &mut data, &dest).await;
        op
    });

    let summary = store
        .push_folder(&base.path().join("docs"), base.path(), true)
        .await
        .unwrap();

    assert_eq!(filer.await.unwrap(), Some(Operation::PushFolder));
    assert_eq!(summary.levels, 2);
    assert_eq!(summary.files, 2);
    assert!(!summary.interrupted);
    assert_eq!(std::fs::read(received.path().join("docs/a.txt")).unwrap(), b"a");
    assert_eq!(
        std::fs::read(received.path().join("docs/sub/b.txt")).unwrap(),
        b"bb"
    );
}

#[tokio::test]
async fn test_push_single_file() {
    let peer = TransferPeer::bind(Dialect::Legacy).await;
    let store = store_for("http://127.0.0.1:9", peer.endpoints(), CLIENT);
    let base = TempDir::new().unwrap();
    let received = TempDir::new().unwrap();
    let local = write_file(base.path(), "notes/n.txt", b"note");

    let dest = received.path().to_path_buf();
    let filer = tokio::spawn(async move {
        let (mut link, mut data) = peer.accept().await;
        receive_pushed_file(&mut link, &mut data, &dest).await.unwrap()
    });

    store
        .push_single_file(&local, &rel("notes/n.txt"))
        .await
        .unwrap();

    let (announced, receipt) = filer.await.unwrap();
    assert_eq!(announced, "notes/n.txt");
    assert_eq!(receipt.written, 4);
}
