//! Acquisition loop behavior through the public session API, against the
//! mock camera backend.

use grab_daq::backend::mock::{MockBackend, MockCameraConfig};
use grab_daq::backend::Device;
use grab_daq::{
    AcquisitionPhase, AcquisitionStrategy, CameraStatus, GrabConfig, GrabError, Session,
    SessionManager, StateError, StatusKind,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper to create a manager with fast retrieval timeouts and one open session.
fn open_session(camera: MockCameraConfig) -> (Arc<MockBackend>, SessionManager, Arc<Session>) {
    let backend = Arc::new(MockBackend::new(vec![camera]));
    let mut config = GrabConfig::default();
    config.acquisition.retrieve_timeout_ms = 50;
    let manager = SessionManager::new(backend.clone(), &config).expect("Failed to create manager");
    let session = manager.create_session();
    session.open(None).expect("Failed to open session");
    (backend, manager, session)
}

fn free_run() -> MockCameraConfig {
    MockCameraConfig::named("cam0").with_frame_interval(Duration::ZERO)
}

/// Record sequences and hand a permit back after every frame.
fn record_and_release(session: &Arc<Session>) -> Arc<Mutex<Vec<u64>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let weak = Arc::downgrade(session);
    session.subscribe(move |frame| {
        sink.lock().push(frame.sequence());
        if let Some(session) = weak.upgrade() {
            session.ready();
        }
    });
    seen
}

fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Test that grab(N) delivers exactly N frames numbered 1..N and goes idle on its own.
#[test]
fn test_grab_delivers_exact_target() {
    let (_backend, _manager, session) = open_session(free_run());
    let seen = record_and_release(&session);

    assert!(session.grab(5));
    session
        .wait_until_idle(IDLE_TIMEOUT)
        .expect("Loop did not go idle");

    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    assert!(!session.is_grabbing());
    assert_eq!(session.acquisition_phase(), AcquisitionPhase::Idle);
    assert_eq!(session.acquisition_stats().delivered, 5);
}

/// Test that sequence numbers restart at 1 on every grab.
#[test]
fn test_sequence_resets_per_grab() {
    let (_backend, _manager, session) = open_session(free_run());
    let seen = record_and_release(&session);

    session.try_grab(2).expect("First grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("First grab did not finish");
    session.try_grab(3).expect("Second grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Second grab did not finish");

    assert_eq!(*seen.lock(), vec![1, 2, 1, 2, 3]);
}

/// Test that grab(0) runs until stop() and nothing is dispatched afterwards.
#[test]
fn test_unbounded_grab_until_stop() {
    let (_backend, _manager, session) = open_session(free_run());
    let seen = record_and_release(&session);

    assert!(session.grab(0));
    assert!(wait_for(|| seen.lock().len() >= 10, IDLE_TIMEOUT));
    session.stop();

    let after_stop = seen.lock().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.lock().len(), after_stop);
    assert_eq!(session.acquisition_phase(), AcquisitionPhase::Idle);

    let sequences = seen.lock().clone();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
}

/// Test that N ready() calls yield at most N + 1 free-run frames.
#[test]
fn test_free_run_is_permit_paced() {
    let (_backend, _manager, session) = open_session(free_run());
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    session.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(session.grab(0));
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 1, IDLE_TIMEOUT));
    for _ in 0..3 {
        session.ready();
    }
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 4, IDLE_TIMEOUT));
    std::thread::sleep(Duration::from_millis(50));
    session.stop();

    assert_eq!(count.load(Ordering::SeqCst), 4);
    assert_eq!(
        session.acquisition_stats().strategy,
        Some(AcquisitionStrategy::FreeRun)
    );
}

/// Test that triggered cameras dispatch one frame per trigger without permits.
#[test]
fn test_triggered_grab_needs_no_permits() {
    let (_backend, _manager, session) = open_session(
        MockCameraConfig::named("cam0").triggered(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.subscribe(move |frame| sink.lock().push(frame.sequence()));

    session.try_grab(3).expect("Grab failed");
    assert_eq!(
        session.acquisition_stats().strategy,
        Some(AcquisitionStrategy::Triggered)
    );
    for _ in 0..3 {
        session
            .execute_command("TriggerSoftware")
            .expect("Trigger failed");
    }
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
}

/// Test that a second grab while running is a silent no-op.
#[test]
fn test_grab_while_running_is_rejected() {
    let (_backend, _manager, session) = open_session(free_run());
    assert!(session.grab(0));
    assert!(!session.grab(0));
    assert!(matches!(
        session.try_grab(0),
        Err(GrabError::State(StateError::AlreadyRunning))
    ));
    session.stop();
    session.stop();
}

/// Test that grabbing a closed session fails with a state error.
#[test]
fn test_grab_requires_open_session() {
    let (_backend, _manager, session) = open_session(free_run());
    session.close();
    assert!(!session.grab(1));
    assert!(matches!(
        session.try_grab(1),
        Err(GrabError::State(StateError::NotOpen))
    ));
}

/// Test that close() while running stops the loop before releasing the device.
#[test]
fn test_close_while_running_stops_delivery() {
    let (backend, _manager, session) = open_session(free_run());
    let seen = record_and_release(&session);

    assert!(session.grab(0));
    assert!(wait_for(|| seen.lock().len() >= 3, IDLE_TIMEOUT));
    session.close();

    let after_close = seen.lock().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.lock().len(), after_close);
    assert!(!session.is_opened());
    assert_eq!(session.device_name(), None);
    assert!(backend.device("cam0").is_none(), "handle released after close");
}

/// Test that observers added or removed mid-dispatch only affect later frames.
#[test]
fn test_observer_changes_during_dispatch() {
    let (_backend, _manager, session) = open_session(free_run());
    let removed_seen = Arc::new(Mutex::new(Vec::new()));
    let added_seen = Arc::new(Mutex::new(Vec::new()));

    let sink = removed_seen.clone();
    let removable = session.subscribe(move |frame| sink.lock().push(frame.sequence()));

    let weak = Arc::downgrade(&session);
    let added = added_seen.clone();
    session.subscribe(move |frame| {
        let Some(session) = weak.upgrade() else {
            return;
        };
        if frame.sequence() == 1 {
            session.remove_observer(removable);
            let added = added.clone();
            session.subscribe(move |frame| added.lock().push(frame.sequence()));
        }
        session.ready();
    });

    session.try_grab(3).expect("Grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");

    assert_eq!(*removed_seen.lock(), vec![1]);
    assert_eq!(*added_seen.lock(), vec![2, 3]);
}

/// Test the two-observer scenario: both see 1..3, then the survivor sees 1..2.
#[test]
fn test_two_observers_then_one() {
    let (_backend, _manager, session) = open_session(free_run());
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let sink = first.clone();
    let first_id = session.subscribe(move |frame| sink.lock().push(frame.sequence()));
    let sink = second.clone();
    session.subscribe(move |frame| sink.lock().push(frame.sequence()));
    let weak = Arc::downgrade(&session);
    session.subscribe(move |_| {
        if let Some(session) = weak.upgrade() {
            session.ready();
        }
    });

    session.try_grab(3).expect("Grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("First grab did not finish");
    assert_eq!(*first.lock(), vec![1, 2, 3]);
    assert_eq!(*second.lock(), vec![1, 2, 3]);

    assert!(session.remove_observer(first_id));
    session.try_grab(2).expect("Grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Second grab did not finish");
    assert_eq!(*first.lock(), vec![1, 2, 3]);
    assert_eq!(*second.lock(), vec![1, 2, 3, 1, 2]);
}

/// Test that stop() from inside an observer does not deadlock.
#[test]
fn test_stop_from_observer() {
    let (_backend, _manager, session) = open_session(free_run());
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let weak = Arc::downgrade(&session);
    session.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = weak.upgrade() {
            session.ready();
            session.stop();
        }
    });

    assert!(session.grab(0));
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // The next grab joins the finished workers and runs normally.
    assert!(session.grab(0));
    session.stop();
}

/// Test that a fatal backend error ends the loop without stop().
#[test]
fn test_backend_fault_ends_loop() {
    let (_backend, _manager, session) = open_session(free_run().faulting_after(2));
    let seen = record_and_release(&session);

    assert!(session.grab(0));
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");
    assert_eq!(*seen.lock(), vec![1, 2]);
    assert!(session.is_opened(), "faults end acquisition, not the session");
}

/// Test that failed grab results are skipped without breaking the sequence.
#[test]
fn test_failed_grab_results_are_retried() {
    let (_backend, _manager, session) = open_session(free_run().failing_every(3));
    let seen = record_and_release(&session);

    session.try_grab(4).expect("Grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");
    assert_eq!(*seen.lock(), vec![1, 2, 3, 4]);
}

/// Test that retrieval timeouts are retried rather than treated as errors.
#[test]
fn test_timeouts_keep_loop_running() {
    let (_backend, _manager, session) = open_session(
        MockCameraConfig::named("cam0").triggered(),
    );
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    session.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(session.grab(1));
    // Several 50ms retrieval timeouts elapse with no trigger
    std::thread::sleep(Duration::from_millis(200));
    assert!(session.is_grabbing());

    session.execute_command("TriggerSoftware").expect("Trigger failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// Test grabbing status events around a bounded grab.
#[test]
fn test_grabbing_status_events() {
    let (_backend, _manager, session) = open_session(free_run());
    let events = Arc::new(Mutex::new(Vec::<CameraStatus>::new()));
    let sink = events.clone();
    session.on_camera_status(Some(Arc::new(move |status: CameraStatus| {
        sink.lock().push(status)
    })));
    let _ = record_and_release(&session);

    session.try_grab(2).expect("Grab failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");

    let grabbing: Vec<bool> = events
        .lock()
        .iter()
        .filter(|status| status.kind == StatusKind::Grabbing)
        .map(|status| status.active)
        .collect();
    assert_eq!(grabbing, vec![true, false]);
}

/// Test that stop() from the grab-started status callback cancels the grab
/// before any frame is retrieved.
#[test]
fn test_stop_from_grab_started_status() {
    let (backend, _manager, session) = open_session(free_run());
    let weak = Arc::downgrade(&session);
    session.on_camera_status(Some(Arc::new(move |status: CameraStatus| {
        if status.kind == StatusKind::Grabbing && status.active {
            if let Some(session) = weak.upgrade() {
                session.stop();
            }
        }
    })));
    let seen = record_and_release(&session);

    assert!(session.grab(0));
    std::thread::sleep(Duration::from_millis(100));

    assert!(!session.is_grabbing());
    assert_eq!(session.acquisition_phase(), AcquisitionPhase::Idle);
    let device = backend.device("cam0").expect("Device handle missing");
    assert!(!device.is_acquiring());
    assert_eq!(device.delivered_frames(), 0);
    assert!(seen.lock().is_empty());

    session.on_camera_status(None);
    session.try_grab(2).expect("Grab after early stop failed");
    session.wait_until_idle(IDLE_TIMEOUT).expect("Loop did not go idle");
    assert_eq!(*seen.lock(), vec![1, 2]);
    assert_eq!(device.delivered_frames(), 2);
}
