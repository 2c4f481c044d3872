//! Backend integration tests
//!
//! These tests drive `NotificationBackend` through its public contract:
//! initialize from an open string, queue notifications, force reloads and
//! deliveries, and shut down. A recording notifier stands in for real
//! delivery mechanisms.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use herald_notification_service::config::Settings;
use herald_notification_service::dispatch::{DeliveryError, DispatchMode};
use herald_notification_service::notification::{Notification, Priority};
use herald_notification_service::notifier::{NotifierRegistry, RecordingNotifier};
use herald_notification_service::{BackendError, NotificationBackend};

const WAIT: Duration = Duration::from_secs(2);

const ROUTING_CONFIG: &str = r#"{
    "channels": [
        {
            "name": "Channel1",
            "subscribers": ["jimmy", "timmy"],
            "notifiers": ["testnotify"],
            "time_to_notify": "@immediately"
        },
        {
            "name": "EverySecond",
            "subscribers": ["jimmy"],
            "notifiers": ["testnotify"],
            "time_to_notify": "* * * * * *"
        },
        {
            "name": "FarFuture",
            "subscribers": ["jimmy"],
            "notifiers": ["testnotify"],
            "time_to_notify": "0 0 0 1 1 * 2099"
        },
        {
            "name": "Mixed",
            "subscribers": ["jimmy"],
            "notifiers": ["eager", "testnotify"],
            "time_to_notify": "0 0 0 1 1 * 2099"
        }
    ],
    "subscribers": [
        {"unique_name": "jimmy", "name": "Jimmy the Cat", "email": "jimmy@the.cat"},
        {"unique_name": "timmy", "name": "Timmy the Dog", "email": "timmy@the.dog"}
    ]
}"#;

struct TestEnvironment {
    backend: NotificationBackend,
    notifier: Arc<RecordingNotifier>,
    config: tempfile::NamedTempFile,
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn create_environment_with(
    store: &str,
    notifier: RecordingNotifier,
    settings: Settings,
) -> TestEnvironment {
    let config = write_config(ROUTING_CONFIG);
    let notifier = Arc::new(notifier);
    let registry = Arc::new(NotifierRegistry::new());
    registry.register(notifier.clone());

    let open_string = format!("{},{}", store, config.path().display());
    let backend = assert_ok!(NotificationBackend::initialize(&open_string, registry, &settings).await);

    TestEnvironment {
        backend,
        notifier,
        config,
    }
}

async fn create_environment() -> TestEnvironment {
    create_environment_with("memory", RecordingNotifier::new(), Settings::default()).await
}

fn notification(channel: &str) -> Notification {
    Notification::builder(channel, "integration")
        .subject("Disk almost full")
        .content("/var is at 95%")
        .tag("disk")
        .build()
}

async fn is_delivered(env: &TestEnvironment, id: i64) -> bool {
    env.backend
        .store()
        .get(id)
        .await
        .unwrap()
        .expect("notification should be stored")
        .notification
        .delivered
}

#[tokio::test]
async fn test_immediate_channel_sends_and_marks_delivered() {
    let env = create_environment().await;

    let stored = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);

    assert!(env.notifier.wait_for(2, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let deliveries = env.notifier.deliveries().await;
    assert_eq!(deliveries[0].subscriber.unique_name, "jimmy");
    assert_eq!(deliveries[1].subscriber.unique_name, "timmy");
    assert_eq!(deliveries[0].notification_ids(), [stored.id]);
    assert!(is_delivered(&env, stored.id).await);
}

#[tokio::test]
async fn test_scheduled_channel_waits_for_its_window() {
    let env = create_environment().await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;

    let far = assert_ok!(env.backend.queue_notification(notification("FarFuture")).await);
    let due = assert_ok!(env.backend.queue_notification(notification("EverySecond")).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(env.notifier.attempts().await, 0);

    env.backend.force_notification_delivery().await.unwrap();
    assert!(env.notifier.wait_for(1, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let deliveries = env.notifier.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].notification_ids(), [due.id]);
    assert!(is_delivered(&env, due.id).await);
    assert!(!is_delivered(&env, far.id).await);

    env.backend.shutdown().await;
}

#[tokio::test]
async fn test_scheduled_delivery_sends_backlog_as_one_batch() {
    let env = create_environment().await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(env.backend.queue_notification(notification("EverySecond")).await.unwrap().id);
    }

    env.backend.force_notification_delivery().await.unwrap();
    assert!(env.notifier.wait_for(1, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let deliveries = env.notifier.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].notification_ids(), ids);

    // Already delivered; a second pass sends nothing
    env.backend.force_notification_delivery().await.unwrap();
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);
    assert_eq!(env.notifier.attempts().await, 1);

    env.backend.shutdown().await;
}

#[tokio::test]
async fn test_urgent_notification_bypasses_schedule() {
    let env = create_environment().await;

    let urgent = Notification::builder("FarFuture", "integration")
        .subject("Service down")
        .priority(Priority::Urgent)
        .build();
    let stored = assert_ok!(env.backend.queue_notification(urgent).await);

    assert!(env.notifier.wait_for(1, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);
    assert!(is_delivered(&env, stored.id).await);
}

#[tokio::test]
async fn test_unknown_channel_returns_not_found_without_sending() {
    let env = create_environment().await;

    let err = assert_err!(env.backend.queue_notification(notification("Nowhere")).await);
    assert!(matches!(err, BackendError::ChannelNotFound(ref name) if name == "Nowhere"));

    // Persisted for later inspection
    let pending = env.backend.store().list_undelivered("Nowhere").await.unwrap();
    assert_eq!(pending.len(), 1);

    assert!(env.backend.dispatcher().wait_idle(WAIT).await);
    assert_eq!(env.notifier.attempts().await, 0);
}

#[tokio::test]
async fn test_partial_failure_marks_delivered_and_names_failed_subscriber() {
    let env = create_environment_with(
        "memory",
        RecordingNotifier::new().failing_for("jimmy"),
        Settings::default(),
    )
    .await;

    let stored = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);
    assert!(env.notifier.wait_for(2, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let deliveries = env.notifier.deliveries().await;
    assert!(!deliveries[0].succeeded);
    assert!(deliveries[1].succeeded);
    assert!(is_delivered(&env, stored.id).await);
    assert_eq!(env.backend.stats().sends_failed, 1);

    // The same dispatch run directly surfaces the aggregate error
    let resolved = env.backend.routing().resolve("Channel1").await.unwrap();
    let err = env
        .backend
        .dispatcher()
        .dispatch(&[stored], &resolved, DispatchMode::Immediate)
        .await
        .unwrap_err();
    let DeliveryError::PartialFailure(failures) = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(failures.failed_subscribers(), ["jimmy"]);
}

#[tokio::test]
async fn test_never_send_only_persists() {
    let mut settings = Settings::default();
    settings.backend.never_send = true;
    let env = create_environment_with("memory", RecordingNotifier::new(), settings).await;

    let stored = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);
    assert_ok!(env.backend.queue_notification(notification("Nowhere")).await);

    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;
    env.backend.force_notification_delivery().await.unwrap();
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    assert_eq!(env.notifier.attempts().await, 0);
    assert!(!is_delivered(&env, stored.id).await);

    env.backend.shutdown().await;
}

#[tokio::test]
async fn test_notifier_override_sends_immediately_without_settling() {
    let config = write_config(ROUTING_CONFIG);
    let eager = Arc::new(RecordingNotifier::with_name("eager").immediate());
    let regular = Arc::new(RecordingNotifier::new());
    let registry = Arc::new(NotifierRegistry::new());
    registry.register(eager.clone());
    registry.register(regular.clone());

    let open_string = format!("memory,{}", config.path().display());
    let backend = NotificationBackend::initialize(&open_string, registry, &Settings::default())
        .await
        .unwrap();

    let stored = backend.queue_notification(notification("Mixed")).await.unwrap();
    assert!(eager.wait_for(1, WAIT).await);
    assert!(backend.dispatcher().wait_idle(WAIT).await);

    assert_eq!(regular.attempts().await, 0);
    let pending = backend.store().list_undelivered("Mixed").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, stored.id);
}

#[tokio::test]
async fn test_forced_reload_applies_new_config_and_keeps_it_on_error() {
    let env = create_environment().await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;
    assert_eq!(env.backend.channels().await.len(), 4);

    std::fs::write(
        env.config.path(),
        r#"{
            "channels": [
                {"name": "Only", "subscribers": ["kimmy"], "notifiers": ["testnotify"], "time_to_notify": "@immediately"}
            ],
            "subscribers": [{"unique_name": "kimmy", "name": "Kimmy the Bird"}]
        }"#,
    )
    .unwrap();
    env.backend.force_config_reload().await.unwrap();

    let channels = env.backend.channels().await;
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name(), "Only");
    assert_eq!(env.backend.subscribers().await[0].unique_name, "kimmy");

    // Invalid schedule: the reload is rejected and the snapshot stays
    std::fs::write(
        env.config.path(),
        r#"{"channels": [{"name": "Broken", "subscribers": [], "notifiers": [], "time_to_notify": "every tuesday"}]}"#,
    )
    .unwrap();
    env.backend.force_config_reload().await.unwrap();

    let snapshot = env.backend.snapshot().await;
    assert!(snapshot.channel("Only").is_some());
    assert!(snapshot.channel("Broken").is_none());
    assert!(snapshot.subscriber("kimmy").is_some());

    env.backend.shutdown().await;
}

#[tokio::test]
async fn test_sqlite_store_from_open_string() {
    let env = create_environment_with(":memory:", RecordingNotifier::new(), Settings::default()).await;
    assert_eq!(env.backend.store().backend_name(), "sqlite");

    let stored = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);
    assert!(env.notifier.wait_for(2, WAIT).await);
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let reloaded = env.backend.store().get(stored.id).await.unwrap().unwrap();
    assert!(reloaded.notification.delivered);
    assert_eq!(reloaded.notification.tags, vec!["disk".to_string()]);
}

async fn initialize_error(open_string: &str) -> BackendError {
    let registry = Arc::new(NotifierRegistry::new());
    match NotificationBackend::initialize(open_string, registry, &Settings::default()).await {
        Ok(_) => panic!("initialize should fail for '{}'", open_string),
        Err(e) => e,
    }
}

#[tokio::test]
async fn test_initialize_rejects_bad_inputs() {
    let err = initialize_error("memory").await;
    assert!(matches!(err, BackendError::InvalidOpenString(_)));

    let err = initialize_error("memory,/nonexistent/herald.json").await;
    assert!(matches!(err, BackendError::Reload(_)));

    let broken = write_config(
        r#"{"channels": [{"name": "Broken", "subscribers": [], "notifiers": [], "time_to_notify": "61 * * * * *"}]}"#,
    );
    let err = initialize_error(&format!("memory,{}", broken.path().display())).await;
    assert!(err.to_string().contains("Broken"));
}

#[tokio::test]
async fn test_shutdown_waits_for_tasks_and_in_flight_dispatches() {
    let env = create_environment().await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;

    env.backend.queue_notification(notification("Channel1")).await.unwrap();

    tokio::time::timeout(WAIT, env.backend.shutdown())
        .await
        .expect("shutdown should finish");

    assert_eq!(env.backend.dispatcher().in_flight(), 0);
    assert_eq!(env.notifier.attempts().await, 2);
    assert!(matches!(
        env.backend.force_config_reload().await,
        Err(BackendError::NotRunning)
    ));
}

#[tokio::test]
async fn test_forced_delivery_does_not_resend_notifications_being_sent() {
    let slow = RecordingNotifier::new().with_delay(Duration::from_millis(300));
    let env = create_environment_with("memory", slow, Settings::default()).await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;

    let immediate = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);
    let scheduled = assert_ok!(env.backend.queue_notification(notification("EverySecond")).await);

    // Passes overlapping the slow sends must leave both notifications alone
    for _ in 0..3 {
        env.backend.force_notification_delivery().await.unwrap();
    }
    assert!(env.backend.dispatcher().wait_idle(WAIT).await);

    let deliveries = env.notifier.deliveries().await;
    let sends_of = |id: i64| {
        deliveries
            .iter()
            .filter(|delivery| delivery.notification_ids().contains(&id))
            .count()
    };
    assert_eq!(sends_of(immediate.id), 2);
    assert_eq!(sends_of(scheduled.id), 1);
    assert!(is_delivered(&env, immediate.id).await);
    assert!(is_delivered(&env, scheduled.id).await);
    assert_eq!(env.backend.dispatcher().claimed().await, 0);

    env.backend.shutdown().await;
}

#[tokio::test]
async fn test_in_flight_dispatch_keeps_the_subscribers_it_started_with() {
    let slow = RecordingNotifier::new().with_delay(Duration::from_millis(200));
    let env = create_environment_with("memory", slow, Settings::default()).await;
    env.backend.start().await.unwrap();
    env.backend.block_until_ready().await;

    let stored = assert_ok!(env.backend.queue_notification(notification("Channel1")).await);
    assert!(env.notifier.wait_for(1, WAIT).await);

    std::fs::write(
        env.config.path(),
        r#"{
            "channels": [
                {"name": "Channel1", "subscribers": ["kimmy"], "notifiers": ["testnotify"], "time_to_notify": "@immediately"}
            ],
            "subscribers": [{"unique_name": "kimmy", "name": "Kimmy the Bird"}]
        }"#,
    )
    .unwrap();
    env.backend.force_config_reload().await.unwrap();
    assert_eq!(env.backend.subscribers().await[0].unique_name, "kimmy");

    assert!(env.backend.dispatcher().wait_idle(WAIT).await);
    let recipients: Vec<String> = env
        .notifier
        .deliveries()
        .await
        .into_iter()
        .map(|delivery| delivery.subscriber.unique_name)
        .collect();
    assert_eq!(recipients, ["jimmy", "timmy"]);
    assert!(is_delivered(&env, stored.id).await);

    env.backend.shutdown().await;
}
