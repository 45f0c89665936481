//! Content-hash and lock tags against a mock filer

use weedsync_core::domain::{ContentDigest, RelativePath};
use weedsync_core::ports::IRemoteStore;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{setup_filer_mock, CLIENT};

const DIGEST_B64: &str = "XUFAKrxLKna5cZ2REBfFkg==";

fn rel(path: &str) -> RelativePath {
    RelativePath::new(path.to_string()).unwrap()
}

#[tokio::test]
async fn test_get_content_hash() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/alice/docs/a.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Md5", DIGEST_B64))
        .mount(&server)
        .await;

    let digest = store.get_content_hash(&rel("docs/a.txt")).await.unwrap();
    assert_eq!(digest, Some(ContentDigest::from_base64(DIGEST_B64).unwrap()));
}

#[tokio::test]
async fn test_get_content_hash_unset_or_none_marker() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/alice/plain.txt"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/alice/marked.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Md5", "none"))
        .mount(&server)
        .await;

    assert_eq!(store.get_content_hash(&rel("plain.txt")).await.unwrap(), None);
    assert_eq!(store.get_content_hash(&rel("marked.txt")).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_content_hash_sends_header() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("PUT"))
        .and(path("/alice/a.txt"))
        .and(query_param("tagging", ""))
        .and(header("Seaweed-Md5", DIGEST_B64))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let digest = ContentDigest::from_base64(DIGEST_B64).unwrap();
    store.set_content_hash(&rel("a.txt"), &digest).await.unwrap();
}

#[tokio::test]
async fn test_remove_tags_deletes_lock() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/alice/a.txt"))
        .and(query_param("tagging", "Lock"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.remove_tags(&rel("a.txt")).await.unwrap();
}

#[tokio::test]
async fn test_set_lock_writes_client_id() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("PUT"))
        .and(path("/alice/a.txt"))
        .and(query_param("tagging", ""))
        .and(header("Seaweed-Lock", CLIENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store.set_lock(&rel("a.txt")).await.unwrap();
}

#[tokio::test]
async fn test_get_lock_ignores_empty_owner() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/alice/held.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Lock", "client-b"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/alice/empty.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Lock", ""))
        .mount(&server)
        .await;

    assert_eq!(
        store.get_lock(&rel("held.txt")).await.unwrap().as_deref(),
        Some("client-b")
    );
    assert_eq!(store.get_lock(&rel("empty.txt")).await.unwrap(), None);
}

#[tokio::test]
async fn test_release_lock_only_when_owned() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/alice/mine.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Lock", CLIENT))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/alice/theirs.txt"))
        .respond_with(ResponseTemplate::new(200).insert_header("Seaweed-Lock", "client-b"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/alice/mine.txt"))
        .and(query_param("tagging", "Lock"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/alice/theirs.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    store.release_lock(&rel("mine.txt")).await.unwrap();
    store.release_lock(&rel("theirs.txt")).await.unwrap();
}

#[tokio::test]
async fn test_tag_on_missing_file_fails() {
    let (server, store) = setup_filer_mock().await;

    Mock::given(method("HEAD"))
        .and(path("/alice/gone.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store.get_lock(&rel("gone.txt")).await.unwrap_err();
    assert!(format!("{err:#}").contains("404"));
}
