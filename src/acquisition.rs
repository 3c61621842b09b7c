//! Acquisition Loop
//!
//! One acquisition run per `grab()`, executed by two threads joined by a
//! rendezvous channel:
//!
//! ```text
//! ┌────────────────────────────┐  GrabEvent::Frame   ┌─────────────────────────┐
//! │ producer (grab-producer-N) │ ──────────────────► │ dispatcher              │
//! │ ├─ retrieve_next(timeout)  │  GrabEvent::Finished│ (grab-dispatch-N)       │
//! │ ├─ PermitGate::acquire     │ ──────────────────► │ └─ ObserverRegistry     │
//! │ └─ target / stop / fault   │   sync_channel(0)   │      ::dispatch         │
//! └────────────────────────────┘                     └─────────────────────────┘
//! ```
//!
//! The producer owns the device while grabbing: it retrieves frames with a
//! bounded wait, retries timeouts and failed grab results, gates free-run
//! frames on consumer permits and stops the device grab on exit. The
//! dispatcher owns fan-out. Because the channel has no buffer, at most one
//! frame is in flight and sequence order is preserved.
//!
//! Phases: `Idle → Starting → Running → Draining → Idle`. The run is back to
//! `Idle` once both threads have exited.
//!
//! `stop()` from any thread other than the workers clears the running flag,
//! closes the permit gate, joins both threads and waits for `Idle`; after it
//! returns no observer is called again. From a callback running on a worker
//! thread it only signals; the workers are joined by the next `grab()`,
//! `stop()` or `close()` issued elsewhere. A `stop()` from the grab-started
//! status callback cancels the run before any worker is spawned.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::backend::{AcquisitionStrategy, Device, GrabResult};
use crate::config::AcquisitionConfig;
use crate::error::{AppResult, BackendError, GrabError, StateError};
use crate::frame::Frame;
use crate::observer::ObserverRegistry;
use crate::permit::PermitGate;

/// Lifecycle phase of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AcquisitionPhase {
    /// No run active
    Idle,
    /// Device grab starting, workers not yet spawned
    Starting,
    /// Frames are being retrieved
    Running,
    /// Producer finished, workers winding down
    Draining,
}

/// Snapshot of the current (or last) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Phase of the current or last run
    pub phase: AcquisitionPhase,
    /// Strategy of the current or last run, `None` before the first grab
    pub strategy: Option<AcquisitionStrategy>,
    /// Requested frame count, 0 for unbounded
    pub target: u64,
    /// Frames handed to the dispatcher
    pub delivered: u64,
    /// Free-run permits currently available
    pub permits: u64,
}

#[derive(Debug)]
enum LoopExit {
    TargetReached,
    Stopped,
    DeviceStopped,
    Fault(BackendError),
}

enum GrabEvent {
    Frame(Frame),
    Finished(LoopExit),
}

struct PhaseState {
    phase: AcquisitionPhase,
    workers: usize,
}

/// Shared state of one run. A fresh instance per `grab()` keeps late
/// workers of a previous run from observing the new run's flags.
struct RunState {
    running: AtomicBool,
    /// Set only by an external stop; the dispatcher discards frames once set
    cancelled: AtomicBool,
    target: u64,
    strategy: AcquisitionStrategy,
    delivered: AtomicU64,
    sequence: AtomicU64,
    gate: PermitGate,
    phase: Mutex<PhaseState>,
    idle: Condvar,
}

impl RunState {
    fn new(target: u64, strategy: AcquisitionStrategy, permits: u64) -> Self {
        Self {
            running: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
            target,
            strategy,
            delivered: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            gate: PermitGate::new(permits),
            phase: Mutex::new(PhaseState {
                phase: AcquisitionPhase::Starting,
                workers: 2,
            }),
            idle: Condvar::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.gate.close();
    }

    fn phase(&self) -> AcquisitionPhase {
        self.phase.lock().phase
    }

    fn set_phase(&self, phase: AcquisitionPhase) {
        let mut state = self.phase.lock();
        if state.phase != AcquisitionPhase::Idle {
            state.phase = phase;
        }
    }

    /// Retire a run whose workers never started.
    fn abandon(&self) {
        self.request_stop();
        self.worker_exited();
        self.worker_exited();
    }

    fn worker_exited(&self) {
        let mut state = self.phase.lock();
        state.workers = state.workers.saturating_sub(1);
        if state.workers == 0 {
            state.phase = AcquisitionPhase::Idle;
            self.idle.notify_all();
        }
    }

    /// Wait for both workers to exit. Returns false on timeout.
    fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.phase.lock();
        while state.phase != AcquisitionPhase::Idle {
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut state, deadline).timed_out() {
                        return state.phase == AcquisitionPhase::Idle;
                    }
                }
                None => self.idle.wait(&mut state),
            }
        }
        true
    }
}

/// Marks a worker as gone, even if it unwinds.
struct WorkerExit {
    run: Arc<RunState>,
    producer: bool,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if self.producer {
            self.run.running.store(false, Ordering::SeqCst);
            self.run.gate.close();
        }
        self.run.worker_exited();
    }
}

#[derive(Default)]
struct Workers {
    handles: Vec<JoinHandle<()>>,
    threads: Vec<ThreadId>,
    /// Caller of `start()` while the device is starting
    starting: Option<ThreadId>,
}

/// Per-session acquisition loop.
pub struct AcquisitionLoop {
    session: usize,
    config: AcquisitionConfig,
    observers: Arc<ObserverRegistry>,
    run: Mutex<Option<Arc<RunState>>>,
    workers: Mutex<Workers>,
    control: Mutex<()>,
}

impl AcquisitionLoop {
    /// Create an idle loop for session `session`.
    pub fn new(session: usize, config: AcquisitionConfig, observers: Arc<ObserverRegistry>) -> Self {
        Self {
            session,
            config,
            observers,
            run: Mutex::new(None),
            workers: Mutex::new(Workers::default()),
            control: Mutex::new(()),
        }
    }

    /// Start grabbing `target` frames (0 = until stopped).
    ///
    /// # Errors
    ///
    /// - `StateError::AlreadyRunning` if a run is active or the call comes
    ///   from one of this loop's own callbacks
    /// - `GrabError::Backend` if the trigger mode cannot be read
    /// - `GrabError::Device` if the device refuses to start or a worker
    ///   thread cannot be spawned
    ///
    /// On error nothing is left running.
    pub fn start(&self, device: &Arc<dyn Device>, target: u64) -> AppResult<()> {
        if self.on_callback_thread() {
            warn!(session = self.session, "grab() requested from an acquisition callback");
            return Err(StateError::AlreadyRunning.into());
        }

        let _control = self.control.lock();

        if let Some(previous) = self.current() {
            if previous.is_running() {
                return Err(StateError::AlreadyRunning.into());
            }
            self.join_workers();
            previous.wait_idle(None);
        }

        let camera = device.descriptor().friendly_name.clone();
        let (strategy, policy) = if device.trigger_mode()? {
            (AcquisitionStrategy::Triggered, self.config.triggered_policy())
        } else {
            (AcquisitionStrategy::FreeRun, self.config.free_run_policy())
        };

        // Published before the device starts so a stop() issued from the
        // grab-started notification reaches this run.
        let run = Arc::new(RunState::new(target, strategy, self.config.initial_permits));
        *self.run.lock() = Some(Arc::clone(&run));

        self.workers.lock().starting = Some(thread::current().id());
        let started = device.start_acquisition(strategy, policy);
        self.workers.lock().starting = None;

        if let Err(e) = started {
            run.abandon();
            return Err(GrabError::Device(format!(
                "cannot start grabbing on '{camera}': {e}"
            )));
        }
        if run.is_cancelled() {
            if let Err(e) = device.stop_acquisition() {
                warn!(session = self.session, error = %e, "Failed to stop grabbing after early stop");
            }
            run.abandon();
            info!(session = self.session, camera = %camera, "Acquisition stopped while starting");
            return Ok(());
        }

        // Thread ids must be recorded before any callback can call back in.
        let mut workers = self.workers.lock();
        let (events_tx, events_rx) = sync_channel::<GrabEvent>(0);

        let dispatcher = {
            let run = Arc::clone(&run);
            let observers = Arc::clone(&self.observers);
            let session = self.session;
            thread::Builder::new()
                .name(format!("grab-dispatch-{}", self.session))
                .spawn(move || run_dispatcher(session, run, observers, events_rx))
        };
        let dispatcher = match dispatcher {
            Ok(handle) => handle,
            Err(e) => {
                drop(workers);
                run.abandon();
                if let Err(stop_err) = device.stop_acquisition() {
                    warn!(session = self.session, error = %stop_err, "Failed to stop grabbing after spawn failure");
                }
                return Err(GrabError::Device(format!("cannot spawn dispatcher: {e}")));
            }
        };

        let producer = {
            let run = Arc::clone(&run);
            let device = Arc::clone(device);
            let timeout = self.config.retrieve_timeout();
            let session = self.session;
            thread::Builder::new()
                .name(format!("grab-producer-{}", self.session))
                .spawn(move || run_producer(session, run, device, timeout, events_tx))
        };

        workers.threads = vec![dispatcher.thread().id()];
        workers.handles = vec![dispatcher];

        match producer {
            Ok(handle) => {
                workers.threads.push(handle.thread().id());
                workers.handles.push(handle);
                debug!(session = self.session, camera = %camera, ?strategy, ?policy, target, "Acquisition workers spawned");
                Ok(())
            }
            Err(e) => {
                drop(workers);
                run.request_stop();
                run.worker_exited();
                if let Err(stop_err) = device.stop_acquisition() {
                    warn!(session = self.session, error = %stop_err, "Failed to stop grabbing after spawn failure");
                }
                Err(GrabError::Device(format!("cannot spawn producer: {e}")))
            }
        }
    }

    /// Stop the current run. Idempotent.
    pub fn stop(&self) {
        let Some(run) = self.current() else {
            return;
        };
        let was_running = run.is_running();
        run.request_stop();

        if self.on_callback_thread() {
            debug!(session = self.session, "stop() from acquisition callback; workers joined later");
            return;
        }

        self.join_workers();
        run.wait_idle(None);
        if was_running {
            info!(
                session = self.session,
                delivered = run.delivered.load(Ordering::SeqCst),
                "Acquisition stopped"
            );
        }
    }

    /// Hand one permit back to a free-running grab.
    pub fn ready(&self) {
        if let Some(run) = self.current() {
            run.gate.release();
        }
    }

    /// Whether the current run is still producing frames.
    pub fn is_running(&self) -> bool {
        self.current().is_some_and(|run| run.is_running())
    }

    /// Phase of the current run, `Idle` before the first grab.
    pub fn phase(&self) -> AcquisitionPhase {
        self.current()
            .map_or(AcquisitionPhase::Idle, |run| run.phase())
    }

    /// Snapshot of the current or last run.
    pub fn stats(&self) -> AcquisitionStats {
        match self.current() {
            Some(run) => AcquisitionStats {
                phase: run.phase(),
                strategy: Some(run.strategy),
                target: run.target,
                delivered: run.delivered.load(Ordering::SeqCst),
                permits: run.gate.available(),
            },
            None => AcquisitionStats {
                phase: AcquisitionPhase::Idle,
                strategy: None,
                target: 0,
                delivered: 0,
                permits: 0,
            },
        }
    }

    /// Block until the current run has fully wound down.
    ///
    /// # Errors
    ///
    /// `GrabError::Timeout` if the run is still active after `timeout`.
    pub fn wait_until_idle(&self, timeout: Duration) -> AppResult<()> {
        let Some(run) = self.current() else {
            return Ok(());
        };
        if run.wait_idle(Some(Instant::now() + timeout)) {
            Ok(())
        } else {
            Err(GrabError::Timeout(timeout))
        }
    }

    fn current(&self) -> Option<Arc<RunState>> {
        self.run.lock().clone()
    }

    /// True on a worker thread, or on the thread inside `start()` while the
    /// device delivers its grab-started notification.
    fn on_callback_thread(&self) -> bool {
        let current = thread::current().id();
        let workers = self.workers.lock();
        workers.starting == Some(current) || workers.threads.contains(&current)
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut self.workers.lock().handles);
        for handle in handles {
            let name = handle.thread().name().unwrap_or("grab-worker").to_string();
            if handle.join().is_err() {
                error!(session = self.session, thread = %name, "Acquisition worker panicked");
            }
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_producer(
    session: usize,
    run: Arc<RunState>,
    device: Arc<dyn Device>,
    timeout: Duration,
    events: SyncSender<GrabEvent>,
) {
    let _exit = WorkerExit {
        run: Arc::clone(&run),
        producer: true,
    };
    run.set_phase(AcquisitionPhase::Running);

    let camera = device.descriptor().friendly_name.clone();
    info!(session, camera = %camera, strategy = ?run.strategy, target = run.target, "Acquisition started");

    let exit = produce_frames(&run, device.as_ref(), timeout, &events);

    run.set_phase(AcquisitionPhase::Draining);
    if device.is_acquiring() {
        if let Err(e) = device.stop_acquisition() {
            warn!(session, camera = %camera, error = %e, "Failed to stop grabbing");
        }
    }
    run.running.store(false, Ordering::SeqCst);
    run.gate.close();

    let delivered = run.delivered.load(Ordering::SeqCst);
    match &exit {
        LoopExit::Fault(e) => {
            error!(session, camera = %camera, delivered, error = %e, "Acquisition ended by backend error")
        }
        LoopExit::DeviceStopped => {
            warn!(session, camera = %camera, delivered, "Device stopped grabbing")
        }
        _ => info!(session, camera = %camera, delivered, reason = ?exit, "Acquisition finished"),
    }

    // The dispatcher may already be gone after an external stop.
    let _ = events.send(GrabEvent::Finished(exit));
}

fn produce_frames(
    run: &RunState,
    device: &dyn Device,
    timeout: Duration,
    events: &SyncSender<GrabEvent>,
) -> LoopExit {
    let gated = run.strategy.is_permit_gated();

    loop {
        if !run.is_running() {
            return LoopExit::Stopped;
        }
        if !device.is_acquiring() {
            return LoopExit::DeviceStopped;
        }

        let buffer = match device.retrieve_next(timeout) {
            Ok(GrabResult::Succeeded(buffer)) => buffer,
            Ok(GrabResult::TimedOut) => {
                trace!(?timeout, "Retrieval timed out, retrying");
                continue;
            }
            Ok(GrabResult::Failed { code, message }) => {
                warn!(code, %message, "Grab failed");
                continue;
            }
            Err(_) if !run.is_running() => return LoopExit::Stopped,
            Err(e) => return LoopExit::Fault(e),
        };

        if gated && !run.gate.acquire() {
            return LoopExit::Stopped;
        }
        if !run.is_running() {
            return LoopExit::Stopped;
        }

        let sequence = run.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if events
            .send(GrabEvent::Frame(Frame::new(sequence, buffer)))
            .is_err()
        {
            return LoopExit::Stopped;
        }

        let delivered = run.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        if run.target != 0 && delivered >= run.target {
            return LoopExit::TargetReached;
        }
    }
}

fn run_dispatcher(
    session: usize,
    run: Arc<RunState>,
    observers: Arc<ObserverRegistry>,
    events: Receiver<GrabEvent>,
) {
    let _exit = WorkerExit {
        run: Arc::clone(&run),
        producer: false,
    };

    for event in events.iter() {
        if run.is_cancelled() {
            debug!(session, "Discarding frames after stop");
            break;
        }
        match event {
            GrabEvent::Frame(frame) => observers.dispatch(&frame),
            GrabEvent::Finished(exit) => {
                debug!(session, reason = ?exit, "Dispatcher finished");
                break;
            }
        }
    }
}
