mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use common::{
    make_position, settings_for, user_config, FakeResolver, FakeSource, RecordingNotifier,
};
use polywatch::config::MonitorSettings;
use polywatch::db::{InMemoryStore, JsonFileStore, SnapshotStore};
use polywatch::models::EventType;
use polywatch::services::{run_poll_loop, Monitor, UserOutcome};

struct Harness {
    resolver: Arc<FakeResolver>,
    source: Arc<FakeSource>,
    store: Arc<InMemoryStore>,
    notifier: Arc<RecordingNotifier>,
    monitor: Monitor,
}

fn harness(resolver: FakeResolver) -> Harness {
    let resolver = Arc::new(resolver);
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = Monitor::new(
        resolver.clone(),
        source.clone(),
        store.clone(),
        notifier.clone(),
    );
    Harness {
        resolver,
        source,
        store,
        notifier,
        monitor,
    }
}

#[tokio::test]
async fn test_first_run_suppressed_stores_baseline() {
    let h = harness(FakeResolver::default());
    h.source.set("0xA", vec![make_position("t1", 10), make_position("t2", 20)]);
    let settings = settings_for(vec![user_config("alice", "0xA")]);

    let report = h.monitor.run_cycle(&settings).await;

    assert_eq!(report.baselines, 1);
    assert_eq!(report.events_detected, 0);
    assert_eq!(h.notifier.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.get("0xA").unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_first_run_unsuppressed_reports_every_position() {
    let h = harness(FakeResolver::default());
    h.source.set("0xA", vec![make_position("t1", 10), make_position("t2", 20)]);
    let settings = MonitorSettings {
        first_run_suppress_notifications: false,
        ..settings_for(vec![user_config("alice", "0xA")])
    };

    let report = h.monitor.run_cycle(&settings).await;

    assert_eq!(report.baselines, 0);
    assert_eq!(report.events_detected, 2);
    assert_eq!(report.notifications_sent, 2);
    let delivered = h.notifier.delivered();
    assert!(delivered.iter().all(|e| e.event_type == EventType::NewPosition));
    assert!(delivered.iter().all(|e| e.previous_size.is_none()));
    assert_eq!(h.store.get("0xA").unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_snapshot_is_not_first_run() {
    let h = harness(FakeResolver::default());
    h.store.put("0xA", &[]).unwrap();
    h.source.set("0xA", vec![make_position("t1", 50)]);
    let cfg = user_config("alice", "0xA");

    let outcome = h
        .monitor
        .process_user(&cfg, &settings_for(vec![cfg.clone()]))
        .await
        .unwrap();

    assert_eq!(outcome, UserOutcome::Reconciled { events: 1, sent: 1 });
    let delivered = h.notifier.delivered();
    assert_eq!(delivered[0].event_type, EventType::NewPosition);
    assert_eq!(delivered[0].user.wallet_address, "0xA");
}

#[tokio::test]
async fn test_increase_then_unchanged_across_cycles() {
    let h = harness(FakeResolver::default());
    let settings = settings_for(vec![user_config("alice", "0xA")]);

    h.source.set("0xA", vec![make_position("t1", 100)]);
    h.monitor.run_cycle(&settings).await;

    h.source.set("0xA", vec![make_position("t1", 200)]);
    let report = h.monitor.run_cycle(&settings).await;
    assert_eq!(report.events_detected, 1);

    let delivered = h.notifier.delivered();
    assert_eq!(delivered[0].event_type, EventType::PositionIncreased);
    assert_eq!(delivered[0].previous_size, Some(Decimal::from(100)));
    assert_eq!(delivered[0].position.size, Decimal::from(200));

    // Snapshot was replaced, so the same data is quiet next time.
    let report = h.monitor.run_cycle(&settings).await;
    assert_eq!(report.events_detected, 0);
    assert_eq!(h.notifier.delivered().len(), 1);
}

#[tokio::test]
async fn test_closures_follow_toggle() {
    let h = harness(FakeResolver::default());
    h.store.put("0xA", &[make_position("t1", 10)]).unwrap();
    h.source.set("0xA", vec![]);

    let quiet = settings_for(vec![user_config("alice", "0xA")]);
    let report = h.monitor.run_cycle(&quiet).await;
    assert_eq!(report.events_detected, 0);
    assert_eq!(h.store.get("0xA").unwrap(), Some(vec![]));

    h.store.put("0xA", &[make_position("t1", 10)]).unwrap();
    let mut loud = quiet.clone();
    loud.notifications.on_position_closed = true;
    let report = h.monitor.run_cycle(&loud).await;
    assert_eq!(report.events_detected, 1);
    assert_eq!(h.notifier.delivered()[0].event_type, EventType::PositionClosed);
}

#[tokio::test]
async fn test_disabled_type_detected_but_not_sent() {
    let h = harness(FakeResolver::default());
    h.store.put("0xA", &[]).unwrap();
    h.source.set("0xA", vec![make_position("t1", 10)]);

    let mut settings = settings_for(vec![user_config("alice", "0xA")]);
    settings.notifications.on_new_position = false;

    let report = h.monitor.run_cycle(&settings).await;
    assert_eq!(report.events_detected, 1);
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(h.notifier.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.get("0xA").unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delivery_failure_does_not_block_persistence() {
    let h = harness(FakeResolver::default());
    h.store.put("0xA", &[]).unwrap();
    h.source.set("0xA", vec![make_position("bad", 1), make_position("good", 1)]);
    h.notifier.fail_on("bad");

    let report = h
        .monitor
        .run_cycle(&settings_for(vec![user_config("alice", "0xA")]))
        .await;

    assert_eq!(report.events_detected, 2);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.users_failed, 0);
    assert_eq!(h.notifier.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.get("0xA").unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failing_user_is_isolated() {
    let h = harness(FakeResolver::with(&[("bob", "0xB")]));
    h.store.put("0xA", &[make_position("old", 1)]).unwrap();
    h.store.put("0xB", &[]).unwrap();
    // 0xA has no canned response, so its fetch fails.
    h.source.set("0xB", vec![make_position("t1", 5)]);

    let settings = settings_for(vec![
        user_config("alice", "0xA"),
        user_config("ghost", ""),
        user_config("bob", ""),
    ]);
    let report = h.monitor.run_cycle(&settings).await;

    assert_eq!(report.users_failed, 2);
    assert_eq!(report.users_processed, 1);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 2);

    // The failed user's snapshot is left exactly as it was.
    assert_eq!(h.store.get("0xA").unwrap().unwrap()[0].token_id, "old");
    assert_eq!(h.store.get("0xB").unwrap().unwrap().len(), 1);
    assert_eq!(h.notifier.delivered()[0].user.username, "bob");
}

#[tokio::test]
async fn test_resolution_failure_leaves_store_untouched() {
    let h = harness(FakeResolver::default());
    let cfg = user_config("nobody", "");

    let err = h
        .monitor
        .process_user(&cfg, &settings_for(vec![cfg.clone()]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("nobody"));
    assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_untracked_positions_persisted_but_never_reported() {
    let h = harness(FakeResolver::default());
    h.store.put("0xA", &[]).unwrap();
    h.source.set("0xA", vec![make_position("", 100), make_position("t1", 1)]);

    let report = h
        .monitor
        .run_cycle(&settings_for(vec![user_config("alice", "0xA")]))
        .await;

    assert_eq!(report.events_detected, 1);
    assert!(h
        .notifier
        .delivered()
        .iter()
        .all(|e| !e.position.token_id.is_empty()));
    assert_eq!(h.store.get("0xA").unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_json_store_backs_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let source = Arc::new(FakeSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = settings_for(vec![user_config("alice", "0xA")]);

    source.set("0xA", vec![make_position("t1", 10)]);
    let monitor = Monitor::new(
        Arc::new(FakeResolver::default()),
        source.clone(),
        Arc::new(JsonFileStore::new(&path)),
        notifier.clone(),
    );
    monitor.run_cycle(&settings).await;

    // A restarted process picks up the persisted baseline.
    source.set("0xA", vec![make_position("t1", 10), make_position("t2", 3)]);
    let restarted = Monitor::new(
        Arc::new(FakeResolver::default()),
        source.clone(),
        Arc::new(JsonFileStore::new(&path)),
        notifier.clone(),
    );
    let report = restarted.run_cycle(&settings).await;

    assert_eq!(report.baselines, 0);
    assert_eq!(report.events_detected, 1);
    assert_eq!(notifier.delivered()[0].position.token_id, "t2");
}

#[tokio::test]
async fn test_poll_loop_stops_on_shutdown() {
    let h = harness(FakeResolver::default());
    h.source.set("0xA", vec![make_position("t1", 1)]);
    let settings = MonitorSettings {
        polling_interval_seconds: 3600,
        ..settings_for(vec![user_config("alice", "0xA")])
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        run_poll_loop(
            &h.monitor,
            None,
            settings,
            tokio::time::sleep(Duration::from_millis(100)),
        ),
    )
    .await
    .expect("poll loop should stop when shutdown resolves");

    assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
    assert!(h.store.get("0xA").unwrap().is_some());
}
