//! Cancelled passes: locks are given back and the sync tree is left whole

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use weedsync_core::domain::RelativePath;
use weedsync_sync::lock::{LockCoordinator, LockOutcome};

use crate::common::{minute_retries, now_secs, FakeStore, Harness, StallingDelta};

/// Cancel the orchestrator's pass after `after`
fn cancel_after(h: &Harness, after: Duration) {
    let token = h.orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        token.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_version_upload_releases_lock() {
    let store = FakeStore::new("client-a");
    store.put_remote("c.txt", b"old remote", None, now_secs() - 1000);
    let h = Harness::with_delta(
        &store,
        minute_retries(3),
        Arc::new(StallingDelta { stall: "signature" }),
    );
    h.write_local("c.txt", b"newer local edit");
    cancel_after(&h, Duration::from_millis(200));

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_clean());
    assert_eq!(report.uploaded, 0);
    assert_eq!(store.lock_owner("c.txt"), None);
    assert_eq!(store.content("c.txt").unwrap(), b"old remote");

    // Another client can take the file straight away
    let other = LockCoordinator::new(Arc::new(store.with_client("client-b")));
    let rel: RelativePath = "c.txt".parse().unwrap();
    assert_eq!(other.try_acquire(&rel).await.unwrap(), LockOutcome::Acquired);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_patch_keeps_local_file() {
    let store = FakeStore::new("client-a");
    store.put_remote("docs/p.txt", b"remote version wins", None, now_secs() + 1000);
    let h = Harness::with_delta(
        &store,
        minute_retries(3),
        Arc::new(StallingDelta { stall: "patch" }),
    );
    h.write_local("docs/p.txt", b"stale local");
    cancel_after(&h, Duration::from_millis(200));

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.downloaded, 0);
    assert_eq!(h.read_local("docs/p.txt"), b"stale local");
    assert!(!h.base.path().join("docs/p.txt_2").exists());
    assert_eq!(store.lock_owner("docs/p.txt"), None);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_retry_wait() {
    let store = FakeStore::new("client-a");
    store.put_remote("held.txt", b"remote", None, now_secs() - 1000);
    store.hold_lock("held.txt", "other", None);
    let h = Harness::new(&store, minute_retries(5));
    h.write_local("held.txt", b"local version");
    cancel_after(&h, Duration::from_secs(90));

    let start = Instant::now();
    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.retry_rounds, 1);
    assert!(report.given_up.is_empty());
    assert!(start.elapsed() < Duration::from_secs(120));
    assert_eq!(store.call_times("get_lock:held.txt").len(), 2);
}

#[tokio::test]
async fn test_cancelled_token_skips_the_pass() {
    let store = FakeStore::new("client-a");
    store.put_remote("shared.txt", b"remote", None, now_secs() - 1000);
    let h = Harness::new(&store, minute_retries(1));
    h.write_local("fresh.txt", b"never sent");
    h.write_local("shared.txt", b"local");
    h.orchestrator.cancellation_token().cancel();

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.uploaded, 0);
    let calls = store.call_names();
    assert!(!calls.iter().any(|c| c.starts_with("upload_file")));
    assert!(!calls.iter().any(|c| c.starts_with("set_lock")));
}
