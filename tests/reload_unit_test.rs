use hearth::{
    bus::EventBus,
    config::ConfigStore,
    events::Event,
    status::{fingerprint, ServiceState, StatusStore},
    uptime::HealthChecker,
    watcher::reload_and_notify,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const ONE_SERVICE: &str = r#"{
    settings: { probe_timeout_secs: 1 },
    services: [ { group: "Lab", items: [ { name: "A", url: "http://fake-target" } ] } ],
}"#;

const TWO_SERVICES: &str = r#"{
    settings: { probe_timeout_secs: 1 },
    services: [
        { group: "Lab", items: [ { name: "A", url: "http://fake-target" } ] },
        { group: "More", items: [ { name: "B", url: "http://fake-target/" } ] },
    ],
}"#;

#[tokio::test]
async fn test_invalid_reload_keeps_serving_previous_snapshot() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("config.json5");
    fs::write(&path, ONE_SERVICE).expect("Failed to write initial config");

    let store = ConfigStore::open(path.clone()).expect("Initial config should load");
    let bus = EventBus::new(8);
    let mut sub = bus.subscribe();

    fs::write(&path, "services: [ oops").expect("Failed to write broken config");
    assert_err!(reload_and_notify(&store, &bus, None));
    assert!(sub.try_recv().is_none());
    assert_eq!(store.snapshot().targets().len(), 1);

    fs::write(&path, TWO_SERVICES).expect("Failed to write new config");
    assert_ok!(reload_and_notify(&store, &bus, None));
    assert_eq!(sub.try_recv(), Some(Event::Reload));
    assert_eq!(store.snapshot().targets().len(), 2);
}

#[tokio::test]
async fn test_reload_wakes_health_checker_for_new_targets() {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("config.json5");
    fs::write(&path, ONE_SERVICE).expect("Failed to write initial config");

    let store = Arc::new(ConfigStore::open(path.clone()).expect("Initial config should load"));
    let status = Arc::new(StatusStore::new());
    let bus = EventBus::new(16);
    let mut sub = bus.subscribe();
    let checker = Arc::new(HealthChecker::new(
        Arc::clone(&store),
        Arc::clone(&status),
        bus.clone(),
    ));
    let token = CancellationToken::new();

    let task = {
        let checker = Arc::clone(&checker);
        let token = token.clone();
        tokio::spawn(async move { checker.run(Duration::from_secs(3600), token).await })
    };

    let first = timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("First probe cycle did not finish");
    assert_eq!(
        first,
        Some(Event::status_changed(
            fingerprint("http://fake-target"),
            ServiceState::Down
        ))
    );

    fs::write(&path, TWO_SERVICES).expect("Failed to write new config");
    let waker = checker.waker();
    assert_ok!(reload_and_notify(&store, &bus, Some(waker.as_ref())));
    assert_eq!(sub.recv().await, Some(Event::Reload));

    // Only the new URL (differing by a trailing slash) changes state.
    let second = timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("Reload did not trigger a probe cycle");
    assert_eq!(
        second,
        Some(Event::status_changed(
            fingerprint("http://fake-target/"),
            ServiceState::Down
        ))
    );
    assert_eq!(status.snapshot().len(), 2);

    token.cancel();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("Health checker did not stop")
        .expect("Health checker task failed");
}
