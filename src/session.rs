//! Device Session
//!
//! One logical camera slot: binds a device handle, owns its acquisition loop
//! and observer registry, and turns backend lifecycle notifications into
//! status events.
//!
//! # Lifecycle
//!
//! ```text
//! create_session() ──► closed ──open(name)──► open ──grab(n)──► grabbing
//!                        ▲                     │  ◄──target/stop──┘
//!                        └──────close()────────┘
//! ```
//!
//! `close()` always stops and joins the acquisition loop before the device is
//! released, so no frame is delivered after it returns.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = manager.create_session();
//! session.open(Some("acA1920-40gm"))?;
//! let id = session.subscribe(|frame| println!("frame {}", frame.sequence()));
//! session.try_grab(10)?;
//! session.wait_until_idle(Duration::from_secs(5))?;
//! session.remove_observer(id);
//! session.close();
//! ```

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::acquisition::{AcquisitionLoop, AcquisitionPhase, AcquisitionStats};
use crate::backend::{Device, DeviceDescriptor, DeviceEvent, DeviceEventSink};
use crate::error::{AppResult, GrabError, StateError};
use crate::frame::Frame;
use crate::manager::DeviceDirectory;
use crate::node::{FeatureNode, NodeValue};
use crate::observer::{FrameCallback, FrameStream, ObserverRegistry, SubscriptionId};

/// Which aspect of the camera a status event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Attached/opened versus closed/detached/removed
    Connection,
    /// Grab started versus stopped
    Grabbing,
}

/// A `(kind, active)` status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    /// Aspect of the camera
    pub kind: StatusKind,
    /// New state of that aspect
    pub active: bool,
}

/// Latest status per kind, published on the watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Camera attached or open
    pub connected: bool,
    /// Grab engine running
    pub grabbing: bool,
}

/// Receives `(kind, active)` status events.
pub type StatusCallback = Arc<dyn Fn(CameraStatus) + Send + Sync>;
/// Receives feature node changes.
pub type NodeCallback = Arc<dyn Fn(&FeatureNode) + Send + Sync>;

/// State shared with the device through the event sink.
struct SessionShared {
    index: usize,
    device_name: RwLock<Option<String>>,
    status_callback: Mutex<Option<StatusCallback>>,
    node_callback: Mutex<Option<NodeCallback>>,
    status_tx: watch::Sender<StatusSnapshot>,
    acquisition: Weak<AcquisitionLoop>,
}

impl SessionShared {
    fn publish(&self, status: CameraStatus) {
        self.status_tx.send_modify(|snapshot| match status.kind {
            StatusKind::Connection => snapshot.connected = status.active,
            StatusKind::Grabbing => snapshot.grabbing = status.active,
        });

        let callback = self.status_callback.lock().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                error!(session = self.index, ?status, "Status callback panicked");
            }
        }
    }
}

impl DeviceEventSink for SessionShared {
    fn on_device_event(&self, device: &DeviceDescriptor, event: DeviceEvent) {
        let camera = device.friendly_name.as_str();
        let status = match event {
            DeviceEvent::Attached => {
                debug!(session = self.index, camera, "Camera attached");
                Some((StatusKind::Connection, true))
            }
            DeviceEvent::Detached => {
                debug!(session = self.index, camera, "Camera detached");
                Some((StatusKind::Connection, false))
            }
            DeviceEvent::Opened => {
                info!(session = self.index, camera, "Camera opened");
                Some((StatusKind::Connection, true))
            }
            DeviceEvent::Closed => {
                info!(session = self.index, camera, "Camera closed");
                Some((StatusKind::Connection, false))
            }
            DeviceEvent::Destroyed => {
                debug!(session = self.index, camera, "Camera handle destroyed");
                Some((StatusKind::Connection, false))
            }
            DeviceEvent::Removed => {
                warn!(session = self.index, camera, "Camera removed");
                self.device_name.write().take();
                if let Some(acquisition) = self.acquisition.upgrade() {
                    acquisition.stop();
                }
                Some((StatusKind::Connection, false))
            }
            DeviceEvent::GrabStarted => {
                info!(session = self.index, camera, "Grab started");
                Some((StatusKind::Grabbing, true))
            }
            DeviceEvent::GrabStopped => {
                info!(session = self.index, camera, "Grab stopped");
                Some((StatusKind::Grabbing, false))
            }
            DeviceEvent::GrabError(message) => {
                error!(session = self.index, camera, %message, "Grab error");
                None
            }
        };

        if let Some((kind, active)) = status {
            self.publish(CameraStatus { kind, active });
        }
    }

    fn on_node_changed(&self, device: &DeviceDescriptor, node: &FeatureNode) {
        let Some(line) = node.describe() else {
            return;
        };
        info!(session = self.index, camera = %device.friendly_name, "{line}");

        let callback = self.node_callback.lock().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(node))).is_err() {
                error!(session = self.index, node = %node.name, "Node callback panicked");
            }
        }
    }
}

/// A logical camera slot managed by [`crate::SessionManager`].
pub struct Session {
    index: usize,
    directory: Arc<DeviceDirectory>,
    device: RwLock<Option<Arc<dyn Device>>>,
    shared: Arc<SessionShared>,
    observers: Arc<ObserverRegistry>,
    acquisition: Arc<AcquisitionLoop>,
}

impl Session {
    pub(crate) fn new(index: usize, directory: Arc<DeviceDirectory>) -> Self {
        let observers = Arc::new(ObserverRegistry::new());
        let acquisition = Arc::new(AcquisitionLoop::new(
            index,
            directory.acquisition_config().clone(),
            Arc::clone(&observers),
        ));
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        Self {
            index,
            directory,
            device: RwLock::new(None),
            shared: Arc::new(SessionShared {
                index,
                device_name: RwLock::new(None),
                status_callback: Mutex::new(None),
                node_callback: Mutex::new(None),
                status_tx,
                acquisition: Arc::downgrade(&acquisition),
            }),
            observers,
            acquisition,
        }
    }

    /// Logical index assigned by the manager.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Friendly name of the bound device, if any.
    pub fn device_name(&self) -> Option<String> {
        self.shared.device_name.read().clone()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Bind and open a device: the named one, the configured default, or the
    /// first enumerated.
    ///
    /// A previously open device is closed first, but only once the new name
    /// has been resolved.
    ///
    /// # Errors
    ///
    /// - `GrabError::NotFound` if the name is not in the last enumeration;
    ///   the session is left as it was
    /// - `GrabError::Device` if the handle cannot be created or opened
    pub fn open(&self, name: Option<&str>) -> AppResult<()> {
        let device = self.directory.resolve(name)?;
        let camera = device.descriptor().friendly_name.clone();

        if self.device.read().is_some() {
            debug!(session = self.index, camera = %camera, "Replacing open device");
            self.close();
        }

        device.register_event_sink(Arc::clone(&self.shared) as Arc<dyn DeviceEventSink>);
        if let Err(e) = device.open() {
            error!(session = self.index, camera = %camera, error = %e, "Failed to open camera");
            device.detach();
            return Err(GrabError::Device(format!("cannot open '{camera}': {e}")));
        }

        self.subscribe_nodes(device.as_ref());
        *self.shared.device_name.write() = Some(camera.clone());
        *self.device.write() = Some(device);
        info!(session = self.index, camera = %camera, "Session opened");
        Ok(())
    }

    /// Stop acquisition, then release the device. No-op when closed.
    pub fn close(&self) {
        self.acquisition.stop();

        let Some(device) = self.device.write().take() else {
            return;
        };
        let camera = device.descriptor().friendly_name.clone();
        if let Err(e) = device.close() {
            warn!(session = self.index, camera = %camera, error = %e, "Error closing camera");
        }
        device.detach();
        self.shared.device_name.write().take();
        info!(session = self.index, camera = %camera, "Session closed");
    }

    /// Whether the bound device reports itself open. Never fails.
    pub fn is_opened(&self) -> bool {
        let device = self.device.read().clone();
        match device {
            Some(device) => match device.is_open() {
                Ok(open) => open,
                Err(e) => {
                    warn!(session = self.index, error = %e, "Cannot query camera state");
                    false
                }
            },
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    /// Start grabbing `target` frames (0 = until stopped).
    ///
    /// # Errors
    ///
    /// `StateError::NotOpen`, `StateError::AlreadyRunning`, or the device and
    /// backend errors of [`AcquisitionLoop::start`].
    pub fn try_grab(&self, target: u64) -> AppResult<()> {
        let device = self.device.read().clone();
        let device = device.ok_or(StateError::NotOpen)?;
        if !self.is_opened() {
            return Err(StateError::NotOpen.into());
        }
        self.acquisition.start(&device, target)
    }

    /// Boolean form of [`Session::try_grab`]: state errors are silent,
    /// everything else is logged.
    pub fn grab(&self, target: u64) -> bool {
        match self.try_grab(target) {
            Ok(()) => true,
            Err(e) if e.is_state() => {
                debug!(session = self.index, reason = %e, "grab() ignored");
                false
            }
            Err(e) => {
                error!(session = self.index, error = %e, "grab() failed");
                false
            }
        }
    }

    /// Stop acquisition and join the workers. Idempotent.
    pub fn stop(&self) {
        self.acquisition.stop();
    }

    /// Hand one permit back to a free-running grab.
    pub fn ready(&self) {
        self.acquisition.ready();
    }

    /// Whether an acquisition run is producing frames.
    pub fn is_grabbing(&self) -> bool {
        self.acquisition.is_running()
    }

    /// Phase of the acquisition loop.
    pub fn acquisition_phase(&self) -> AcquisitionPhase {
        self.acquisition.phase()
    }

    /// Snapshot of the current or last acquisition run.
    pub fn acquisition_stats(&self) -> AcquisitionStats {
        self.acquisition.stats()
    }

    /// Block until the loop is idle.
    ///
    /// # Errors
    ///
    /// `GrabError::Timeout` if it is still active after `timeout`.
    pub fn wait_until_idle(&self, timeout: Duration) -> AppResult<()> {
        self.acquisition.wait_until_idle(timeout)
    }

    // ------------------------------------------------------------------
    // Observers and callbacks
    // ------------------------------------------------------------------

    /// Register a frame callback. `None` registers nothing and returns [`SubscriptionId::INVALID`].
    pub fn add_observer(&self, callback: Option<FrameCallback>) -> SubscriptionId {
        self.observers.add_observer(callback)
    }

    /// Register a frame closure.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Remove one observer. Returns false if the id was unknown.
    pub fn remove_observer(&self, id: SubscriptionId) -> bool {
        self.observers.remove_observer(id)
    }

    /// Remove every frame observer.
    pub fn clear_observers(&self) {
        self.observers.clear_observers();
    }

    /// Make `callback` the only frame observer.
    pub fn on_grabbed(&self, callback: Option<FrameCallback>) -> SubscriptionId {
        self.observers.on_grabbed(callback)
    }

    /// Number of frame observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Bounded async frame stream; see [`ObserverRegistry::frame_stream`].
    pub fn frame_stream(&self, capacity: usize) -> FrameStream {
        self.observers.frame_stream(capacity)
    }

    /// Replace the status callback.
    pub fn on_camera_status(&self, callback: Option<StatusCallback>) {
        *self.shared.status_callback.lock() = callback;
    }

    /// Replace the node-change callback.
    pub fn on_node_updated(&self, callback: Option<NodeCallback>) {
        *self.shared.node_callback.lock() = callback;
    }

    /// Receiver for the latest status per kind.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Devices and nodes
    // ------------------------------------------------------------------

    /// Re-enumerate and return the friendly names.
    pub fn updated_camera_list(&self) -> AppResult<Vec<String>> {
        self.directory.refresh()
    }

    /// A feature node of the open device by name.
    pub fn node(&self, name: &str) -> AppResult<Option<FeatureNode>> {
        Ok(self.open_device()?.node(name)?)
    }

    /// Every feature node of the open device.
    pub fn nodes(&self) -> AppResult<Vec<FeatureNode>> {
        Ok(self.open_device()?.nodes()?)
    }

    /// Write a node value; the backend validates access, type and range.
    pub fn set_node(&self, name: &str, value: NodeValue) -> AppResult<()> {
        self.open_device()?.set_node_value(name, value)?;
        debug!(session = self.index, node = name, "Node written");
        Ok(())
    }

    /// Execute a command node such as `TriggerSoftware`.
    pub fn execute_command(&self, name: &str) -> AppResult<()> {
        self.set_node(name, NodeValue::Command)
    }

    fn open_device(&self) -> AppResult<Arc<dyn Device>> {
        let device = self.device.read().clone();
        Ok(device.ok_or(StateError::NotOpen)?)
    }

    /// Subscribe every readable leaf of every available category (except the
    /// root) for change notification.
    fn subscribe_nodes(&self, device: &dyn Device) {
        let nodes = match device.nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(session = self.index, error = %e, "Cannot read node map");
                return;
            }
        };

        let mut subscribed = 0usize;
        for category in nodes
            .iter()
            .filter(|node| node.is_category() && node.access.available && node.name != "Root")
        {
            for child in &category.children {
                let Some(leaf) = nodes.iter().find(|node| &node.name == child) else {
                    continue;
                };
                if leaf.is_category() || !leaf.access.readable {
                    continue;
                }
                match device.subscribe_node(&leaf.name) {
                    Ok(()) => subscribed += 1,
                    Err(e) => warn!(session = self.index, node = %leaf.name, error = %e, "Node subscription failed"),
                }
            }
        }
        debug!(session = self.index, subscribed, "Node change subscriptions registered");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("index", &self.index)
            .field("device_name", &self.device_name())
            .field("phase", &self.acquisition.phase())
            .finish()
    }
}
