//! Lock contention: deferral, retry timing, budget exhaustion and races

use std::sync::Arc;
use std::time::Duration;

use weedsync_core::domain::RelativePath;
use weedsync_sync::digest::digest_bytes;
use weedsync_sync::lock::{LockCoordinator, LockOutcome};

use crate::common::{minute_retries, now_secs, FakeStore, Harness};

#[tokio::test(start_paused = true)]
async fn test_locked_file_is_retried_after_a_minute() {
    let store = FakeStore::new("client-a");
    let content = b"shared";
    store.put_remote("c.txt", content, None, now_secs());
    store.hold_lock("c.txt", "other", Some(1));
    let h = Harness::new(&store, minute_retries(5));
    h.write_local("c.txt", content);

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert_eq!(report.already_synced, 1);
    assert_eq!(report.retry_rounds, 1);
    assert!(report.given_up.is_empty());

    let reads = store.call_times("get_lock:c.txt");
    assert!(reads.len() >= 2);
    assert!(reads[1] - reads[0] >= Duration::from_secs(60));

    // The first round never touched the file
    let calls = store.call_names();
    let first_set = calls.iter().position(|c| c == "set_lock:c.txt").unwrap();
    let second_read = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| *c == "get_lock:c.txt")
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    assert!(first_set > second_read);
}

#[tokio::test(start_paused = true)]
async fn test_permanently_locked_file_is_given_up() {
    let store = FakeStore::new("client-a");
    store.put_remote("held.txt", b"remote", None, now_secs() - 1000);
    store.hold_lock("held.txt", "other", None);
    let h = Harness::new(&store, minute_retries(2));
    h.write_local("held.txt", b"local version");
    h.write_local("free.txt", b"uploaded fine");

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert_eq!(report.retry_rounds, 2);
    assert_eq!(report.uploaded, 1);
    assert_eq!(
        report.given_up,
        vec!["held.txt".parse::<RelativePath>().unwrap()]
    );
    assert_eq!(store.call_times("get_lock:held.txt").len(), 3);
    assert_eq!(store.content("held.txt").unwrap(), b"remote");
    assert!(!report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_grows_with_backoff() {
    let store = FakeStore::new("client-a");
    store.put_remote("g.txt", b"remote", None, now_secs());
    store.hold_lock("g.txt", "other", Some(2));
    let retry = weedsync_sync::retry::RetryPolicy {
        interval: Duration::from_secs(10),
        backoff_factor: 3.0,
        max_interval: Duration::from_secs(600),
        max_rounds: 0,
    };
    let h = Harness::new(&store, retry);
    h.write_local("g.txt", b"remote");

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert_eq!(report.retry_rounds, 2);
    let reads = store.call_times("get_lock:g.txt");
    assert!(reads[1] - reads[0] >= Duration::from_secs(10));
    assert!(reads[2] - reads[1] >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_lock_released_when_tag_clearing_fails() {
    let store = FakeStore::new("client-a");
    let content = b"identical";
    store.put_remote("same.txt", content, Some(digest_bytes(content)), now_secs());
    store.fail_tag_removal("same.txt");
    let h = Harness::new(&store, minute_retries(1));
    h.write_local("same.txt", content);

    let report = h
        .orchestrator
        .sync_folder(h.base.path(), h.base.path(), true)
        .await
        .unwrap();

    assert_eq!(report.already_synced, 1);
    assert!(store.call_names().contains(&"remove_tags:same.txt".to_string()));
    assert_eq!(store.lock_owner("same.txt"), None);
}

#[tokio::test]
async fn test_own_lock_is_reacquired() {
    let store = FakeStore::new("client-a");
    let coordinator = LockCoordinator::new(Arc::new(store.clone()));
    let rel: RelativePath = "mine.txt".parse().unwrap();

    assert_eq!(
        coordinator.try_acquire(&rel).await.unwrap(),
        LockOutcome::Acquired
    );
    assert_eq!(
        coordinator.try_acquire(&rel).await.unwrap(),
        LockOutcome::Acquired
    );
    coordinator.release(&rel).await;
    assert_eq!(store.lock_owner("mine.txt"), None);
}

#[tokio::test]
async fn test_foreign_lock_reports_owner() {
    let store = FakeStore::new("client-a");
    store.hold_lock("x.txt", "client-z", None);
    let coordinator = LockCoordinator::new(Arc::new(store));
    let rel: RelativePath = "x.txt".parse().unwrap();

    assert_eq!(
        coordinator.try_acquire(&rel).await.unwrap(),
        LockOutcome::HeldBy("client-z".into())
    );
}

#[tokio::test]
async fn test_second_client_loses_after_first_acquires() {
    let store_a = FakeStore::new("client-a");
    let store_b = store_a.with_client("client-b");
    let a = LockCoordinator::new(Arc::new(store_a));
    let b = LockCoordinator::new(Arc::new(store_b));
    let rel: RelativePath = "race.txt".parse().unwrap();

    assert!(a.try_acquire(&rel).await.unwrap().is_acquired());
    assert_eq!(
        b.try_acquire(&rel).await.unwrap(),
        LockOutcome::HeldBy("client-a".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquisition_has_at_most_one_winner() {
    for round in 0..20 {
        let base = FakeStore::new("client-0");
        let rel: RelativePath = format!("race-{round}.txt").parse().unwrap();

        let mut tasks = Vec::new();
        for i in 0..4 {
            let coordinator = LockCoordinator::new(Arc::new(base.with_client(&format!("client-{i}"))));
            let rel = rel.clone();
            tasks.push(tokio::spawn(async move {
                coordinator.try_acquire(&rel).await.unwrap()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_acquired() {
                winners += 1;
            }
        }
        assert!(winners <= 1, "round {round}: {winners} winners");
        assert!(base.lock_owner(rel.as_str()).is_some());
    }
}
