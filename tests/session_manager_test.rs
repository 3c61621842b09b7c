//! Session lifecycle, device directory and SDK teardown tests against the
//! mock camera backend.

use grab_daq::backend::mock::{MockBackend, MockCameraConfig};
use grab_daq::{
    BackendError, CameraStatus, FeatureNode, GrabConfig, GrabError, NodeValue, SessionManager,
    StatusKind, StatusSnapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Helper to create a manager over named mock cameras.
fn create_manager(names: &[&str]) -> (Arc<MockBackend>, SessionManager) {
    let backend = Arc::new(MockBackend::new(
        names
            .iter()
            .map(|name| MockCameraConfig::named(*name).with_frame_interval(Duration::ZERO))
            .collect(),
    ));
    let mut config = GrabConfig::default();
    config.acquisition.retrieve_timeout_ms = 50;
    let manager = SessionManager::new(backend.clone(), &config).expect("Failed to create manager");
    (backend, manager)
}

/// Test that opening binds the named device and closing releases it.
#[test]
fn test_open_close_lifecycle() {
    let (backend, manager) = create_manager(&["cam0", "cam1"]);
    let session = manager.create_session();
    assert!(!session.is_opened());

    session.open(Some("cam1")).expect("Failed to open cam1");
    assert!(session.is_opened());
    assert_eq!(session.device_name().as_deref(), Some("cam1"));
    let device = backend.device("cam1").expect("Device handle missing");
    assert!(device.has_event_sink());

    session.close();
    session.close();
    assert!(!session.is_opened());
    assert_eq!(session.device_name(), None);
    assert!(!device.has_event_sink());
}

/// Test that opening an unknown camera fails with NotFound and changes nothing.
#[test]
fn test_open_unknown_camera_leaves_state() {
    let (_backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open first camera");

    let err = session.open(Some("missing")).unwrap_err();
    assert!(matches!(err, GrabError::NotFound(ref name) if name == "missing"));
    assert!(session.is_opened());
    assert_eq!(session.device_name().as_deref(), Some("cam0"));
}

/// Test that a device that refuses to open surfaces a Device error.
#[test]
fn test_open_failure_is_device_error() {
    let backend = Arc::new(MockBackend::new(vec![
        MockCameraConfig::named("broken").failing_open()
    ]));
    let manager =
        SessionManager::new(backend, &GrabConfig::default()).expect("Failed to create manager");
    let session = manager.create_session();

    assert!(matches!(session.open(None), Err(GrabError::Device(_))));
    assert!(!session.is_opened());
}

/// Test that reopening a session switches devices.
#[test]
fn test_reopen_switches_device() {
    let (backend, manager) = create_manager(&["cam0", "cam1"]);
    let session = manager.create_session();
    session.open(Some("cam0")).expect("Failed to open cam0");
    session.open(Some("cam1")).expect("Failed to open cam1");

    assert_eq!(session.device_name().as_deref(), Some("cam1"));
    assert!(backend.device("cam0").is_none(), "old handle released");
}

/// Test connection status events and the watch channel across open and close.
#[test]
fn test_connection_status_events() {
    let (_backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    let events = Arc::new(Mutex::new(Vec::<CameraStatus>::new()));
    let sink = events.clone();
    session.on_camera_status(Some(Arc::new(move |status: CameraStatus| {
        sink.lock().push(status)
    })));
    let status = session.watch_status();

    session.open(None).expect("Failed to open");
    assert_eq!(
        *status.borrow(),
        StatusSnapshot {
            connected: true,
            grabbing: false
        }
    );

    session.close();
    assert!(!status.borrow().connected);

    let connection: Vec<bool> = events
        .lock()
        .iter()
        .filter(|status| status.kind == StatusKind::Connection)
        .map(|status| status.active)
        .collect();
    // attached, opened, closed, detached, destroyed
    assert_eq!(connection, vec![true, true, false, false, false]);
}

/// Test that readable leaves of available categories are subscribed on open.
#[test]
fn test_open_subscribes_readable_nodes() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open");

    let subscribed = backend
        .device("cam0")
        .expect("Device handle missing")
        .subscribed_nodes();
    assert!(subscribed.contains(&"ExposureTime".to_string()));
    assert!(subscribed.contains(&"DeviceModelName".to_string()));
    assert!(subscribed.contains(&"LUTValueAll".to_string()));
    assert!(!subscribed.contains(&"TriggerSoftware".to_string()), "write-only");
    assert!(!subscribed.contains(&"DeviceReset".to_string()), "write-only");
    assert!(!subscribed.contains(&"EventSelector".to_string()), "unavailable category");
    assert!(!subscribed.contains(&"AcquisitionControl".to_string()), "category");
}

/// Test node reads, validated writes and change callbacks.
#[test]
fn test_node_access_and_updates() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    let updates = Arc::new(Mutex::new(Vec::<FeatureNode>::new()));
    let sink = updates.clone();
    session.on_node_updated(Some(Arc::new(move |node: &FeatureNode| {
        sink.lock().push(node.clone())
    })));

    assert!(matches!(session.node("Width"), Err(GrabError::State(_))));
    session.open(None).expect("Failed to open");

    let width = session.node("Width").expect("Node read failed");
    assert_eq!(width.map(|node| node.value), Some(NodeValue::Integer(64)));
    assert!(session.node("Gain").expect("Node read failed").is_none());

    session
        .set_node("ExposureTime", NodeValue::Float(250.0))
        .expect("Write failed");
    assert!(matches!(
        session.set_node("DeviceModelName", NodeValue::String("x".into())),
        Err(GrabError::Backend(BackendError::NodeNotWritable(_)))
    ));

    backend
        .device("cam0")
        .expect("Device handle missing")
        .simulate_node_change("DeviceTemperature", NodeValue::Float(41.0))
        .expect("Simulated change failed");

    let updates = updates.lock();
    let names: Vec<&str> = updates.iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["ExposureTime", "DeviceTemperature"]);
    assert_eq!(
        updates[0].describe().as_deref(),
        Some("Exposure Time ( ExposureTime ) : 250.000000")
    );

    let nodes = session.nodes().expect("Node listing failed");
    assert!(nodes.iter().any(|node| node.name == "Root" && node.is_category()));
}

/// Test that removing a session closes it and frees its index for good.
#[test]
fn test_remove_session() {
    let (_backend, manager) = create_manager(&["cam0"]);
    let first = manager.create_session();
    let second = manager.create_session();
    first.open(None).expect("Failed to open");
    assert!(first.grab(0));

    assert!(manager.remove_session(&first));
    assert!(!first.is_opened());
    assert!(!first.is_grabbing());
    assert!(manager.lookup_by_index(first.index()).is_none());
    assert_eq!(
        manager.lookup_by_index(second.index()).map(|s| s.index()),
        Some(second.index())
    );
    assert_eq!(manager.create_session().index(), 2);
    let indices: Vec<usize> = manager.sessions().iter().map(|s| s.index()).collect();
    assert_eq!(indices, vec![1, 2]);
}

/// Test that removing a session re-enumerates devices.
#[test]
fn test_remove_session_refreshes_device_list() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open");

    backend.plug(MockCameraConfig::named("cam1"));
    assert_eq!(manager.device_list(), vec!["cam0"]);

    assert!(manager.remove_session(&session));
    assert_eq!(manager.device_list(), vec!["cam0", "cam1"]);
    assert!(manager.sessions().is_empty());
}

/// Test that refreshing the list does not disturb open sessions.
#[test]
fn test_refresh_keeps_open_sessions() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open");

    backend.plug(MockCameraConfig::named("cam1"));
    let names = session.updated_camera_list().expect("Refresh failed");
    assert_eq!(names, vec!["cam0", "cam1"]);
    assert_eq!(manager.device_list(), vec!["cam0", "cam1"]);
    assert!(session.is_opened());
}

/// Test that concurrent refreshes all succeed.
#[test]
fn test_concurrent_refresh() {
    let (_backend, manager) = create_manager(&["cam0", "cam1"]);
    let manager = Arc::new(manager);
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.refresh_device_list())
        })
        .collect();
    for worker in workers {
        let names = worker.join().expect("Refresh thread panicked").expect("Refresh failed");
        assert_eq!(names.len(), 2);
    }
}

/// Test that unplugging a camera ends acquisition and reports the removal.
#[test]
fn test_unplugged_camera() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open");
    let status = session.watch_status();
    assert!(session.grab(0));

    assert!(backend.unplug("cam0"));
    session
        .wait_until_idle(Duration::from_secs(5))
        .expect("Loop did not end after removal");

    assert!(!status.borrow().connected);
    assert!(!session.is_opened());
    assert_eq!(session.device_name(), None);
    assert!(!session.grab(1));
}

/// Test that the SDK stays initialized until the last session is dropped.
#[test]
fn test_sdk_terminates_after_last_session() {
    let (backend, manager) = create_manager(&["cam0"]);
    let session = manager.create_session();
    session.open(None).expect("Failed to open");
    assert_eq!(backend.initialize_calls(), 1);

    drop(manager);
    assert!(backend.is_initialized(), "session still holds the library");
    assert!(!session.is_opened(), "manager shutdown closes sessions");

    drop(session);
    assert_eq!(backend.terminate_calls(), 1);
    assert!(!backend.is_initialized());
}

/// Test the async adapters: frame stream and status watch.
#[tokio::test]
async fn test_frame_stream_and_status_watch() {
    let backend = Arc::new(MockBackend::new(vec![
        MockCameraConfig::named("cam0").triggered()
    ]));
    let mut config = GrabConfig::default();
    config.acquisition.retrieve_timeout_ms = 50;
    let manager = SessionManager::new(backend, &config).expect("Failed to create manager");
    let session = manager.create_session();
    let mut status = session.watch_status();
    session.open(None).expect("Failed to open");

    let mut stream = session.frame_stream(8);
    session.try_grab(2).expect("Grab failed");
    session.execute_command("TriggerSoftware").expect("Trigger failed");
    session.execute_command("TriggerSoftware").expect("Trigger failed");

    for expected in 1..=2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.recv())
            .await
            .expect("Timed out waiting for frame")
            .expect("Stream closed");
        assert_eq!(frame.sequence(), expected);
    }
    assert_eq!(stream.dropped(), 0);

    assert!(status.has_changed().expect("Status sender dropped"));
    assert!(status.borrow_and_update().connected);

    drop(stream);
    assert_eq!(session.observer_count(), 0);
}
