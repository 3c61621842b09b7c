//! Mock Camera Backend
//!
//! Simulates a GenICam-style vendor SDK for testing without hardware.
//!
//! - Free-run cameras produce a frame every `frame_interval_ms`
//! - Triggered cameras (`TriggerMode = On`) produce one frame per software
//!   trigger, queued up to the buffer depth requested at grab start
//! - A small node tree with the usual acquisition and image-format features
//! - Fault injection: failed opens, failed grab results, fatal retrieval
//!   faults after N frames, and physical removal

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    AcquisitionStrategy, BufferPolicy, CameraBackend, Device, DeviceDescriptor, DeviceEvent,
    DeviceEventSink, FrameBuffer, GrabResult, PixelFormat,
};
use crate::error::BackendError;
use crate::node::{FeatureNode, NodeAccess, NodeValue};

/// Simulated camera definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockCameraConfig {
    /// Friendly name (enumeration key)
    pub name: String,
    /// Reported model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Serial number, derived from the position when omitted
    #[serde(default)]
    pub serial: Option<String>,
    /// Image width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Image height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    /// Free-run frame period; 0 delivers as fast as frames are requested
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
    /// Start with `TriggerMode = On`
    #[serde(default)]
    pub trigger_mode: bool,
    /// `open()` fails
    #[serde(default)]
    pub fail_open: bool,
    /// Every Nth retrieval yields a failed grab result
    #[serde(default)]
    pub fail_every: Option<u64>,
    /// Retrieval reports a fatal transport fault once this many frames were delivered
    #[serde(default)]
    pub fault_after_frames: Option<u64>,
    /// Reported by `is_accessible`
    #[serde(default = "default_accessible")]
    pub accessible: bool,
}

fn default_model() -> String {
    "Mock Camera".to_string()
}

fn default_width() -> u32 {
    64
}

fn default_height() -> u32 {
    48
}

fn default_frame_interval() -> u64 {
    5
}

fn default_accessible() -> bool {
    true
}

impl MockCameraConfig {
    /// A free-running camera with default geometry.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: default_model(),
            serial: None,
            width: default_width(),
            height: default_height(),
            frame_interval_ms: default_frame_interval(),
            trigger_mode: false,
            fail_open: false,
            fail_every: None,
            fault_after_frames: None,
            accessible: true,
        }
    }

    /// Start with `TriggerMode = On`.
    pub fn triggered(mut self) -> Self {
        self.trigger_mode = true;
        self
    }

    /// Free-run frame period.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Image size in pixels.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Refuse every `open()`.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Report a failed grab result for every `n`th frame.
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    /// Fail retrieval fatally once `frames` frames were delivered.
    pub fn faulting_after(mut self, frames: u64) -> Self {
        self.fault_after_frames = Some(frames);
        self
    }

    fn descriptor(&self, position: usize) -> DeviceDescriptor {
        DeviceDescriptor {
            friendly_name: self.name.clone(),
            model_name: self.model.clone(),
            serial_number: self
                .serial
                .clone()
                .unwrap_or_else(|| format!("MOCK{:05}", position + 1)),
        }
    }
}

// ============================================================================
// MockBackend
// ============================================================================

/// Simulated SDK entry point.
pub struct MockBackend {
    cameras: Mutex<Vec<MockCameraConfig>>,
    initialized: Mutex<bool>,
    initialize_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
    created: Mutex<HashMap<String, Weak<MockDevice>>>,
}

impl MockBackend {
    /// Backend exposing `cameras` in enumeration order.
    pub fn new(cameras: Vec<MockCameraConfig>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
            initialized: Mutex::new(false),
            initialize_calls: AtomicUsize::new(0),
            terminate_calls: AtomicUsize::new(0),
            created: Mutex::new(HashMap::new()),
        }
    }

    /// Plug in another camera; visible after the next enumeration.
    pub fn plug(&self, camera: MockCameraConfig) {
        info!(camera = %camera.name, "Mock camera plugged in");
        self.cameras.lock().push(camera);
    }

    /// Physically remove a camera. Live handles report `Removed` and fail
    /// subsequent retrievals.
    pub fn unplug(&self, name: &str) -> bool {
        let removed = {
            let mut cameras = self.cameras.lock();
            let before = cameras.len();
            cameras.retain(|camera| camera.name != name);
            before != cameras.len()
        };
        if let Some(device) = self.device(name) {
            device.mark_removed();
        }
        removed
    }

    /// Most recently created live handle for a camera.
    pub fn device(&self, name: &str) -> Option<Arc<MockDevice>> {
        self.created.lock().get(name).and_then(Weak::upgrade)
    }

    /// Whether `initialize()` was called without a matching `terminate()`.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock()
    }

    /// Number of `initialize()` calls.
    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Number of `terminate()` calls.
    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<(), BackendError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(BackendError::NotInitialized)
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CameraBackend for MockBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Err(BackendError::sdk(-1, "SDK already initialized"));
        }
        *initialized = true;
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        info!("Mock camera SDK initialized");
        Ok(())
    }

    fn terminate(&self) {
        let mut initialized = self.initialized.lock();
        if *initialized {
            *initialized = false;
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            info!("Mock camera SDK terminated");
        }
    }

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, BackendError> {
        self.ensure_initialized()?;
        Ok(self
            .cameras
            .lock()
            .iter()
            .enumerate()
            .map(|(position, camera)| camera.descriptor(position))
            .collect())
    }

    fn is_accessible(&self, descriptor: &DeviceDescriptor) -> bool {
        self.cameras
            .lock()
            .iter()
            .any(|camera| camera.name == descriptor.friendly_name && camera.accessible)
    }

    fn create_device(
        &self,
        descriptor: Option<&DeviceDescriptor>,
    ) -> Result<Arc<dyn Device>, BackendError> {
        self.ensure_initialized()?;

        let (position, config) = {
            let cameras = self.cameras.lock();
            let found = match descriptor {
                None => cameras.iter().enumerate().next(),
                Some(wanted) => cameras
                    .iter()
                    .enumerate()
                    .find(|(_, camera)| camera.name == wanted.friendly_name),
            };
            let (position, config) = found.ok_or(BackendError::NoDevice)?;
            (position, config.clone())
        };

        let device = Arc::new(MockDevice::new(config.descriptor(position), config));
        self.created
            .lock()
            .insert(device.descriptor.friendly_name.clone(), Arc::downgrade(&device));
        debug!(camera = %device.descriptor.friendly_name, "Mock device created");
        Ok(device)
    }
}

// ============================================================================
// MockDevice
// ============================================================================

struct MockDeviceState {
    open: bool,
    removed: bool,
    acquiring: bool,
    strategy: AcquisitionStrategy,
    policy: BufferPolicy,
    nodes: BTreeMap<String, FeatureNode>,
    node_order: Vec<String>,
    subscribed: HashSet<String>,
    pending_triggers: usize,
    retrievals: u64,
    delivered: u64,
    next_frame_due: Option<Instant>,
}

/// Simulated camera handle.
pub struct MockDevice {
    descriptor: DeviceDescriptor,
    config: MockCameraConfig,
    state: Mutex<MockDeviceState>,
    frame_ready: Condvar,
    sink: Mutex<Option<Arc<dyn DeviceEventSink>>>,
}

impl MockDevice {
    fn new(descriptor: DeviceDescriptor, config: MockCameraConfig) -> Self {
        let nodes = build_node_tree(&descriptor, &config);
        let node_order = nodes.iter().map(|node| node.name.clone()).collect();
        let nodes = nodes
            .into_iter()
            .map(|node| (node.name.clone(), node))
            .collect();

        Self {
            descriptor,
            config,
            state: Mutex::new(MockDeviceState {
                open: false,
                removed: false,
                acquiring: false,
                strategy: AcquisitionStrategy::FreeRun,
                policy: BufferPolicy::LatestImageOnly { depth: 1 },
                nodes,
                node_order,
                subscribed: HashSet::new(),
                pending_triggers: 0,
                retrievals: 0,
                delivered: 0,
                next_frame_due: None,
            }),
            frame_ready: Condvar::new(),
            sink: Mutex::new(None),
        }
    }

    /// Fire a software trigger. Ignored unless grabbing in triggered mode;
    /// triggers beyond the buffer depth are dropped.
    pub fn trigger(&self) -> bool {
        let mut state = self.state.lock();
        if !state.acquiring || state.strategy != AcquisitionStrategy::Triggered {
            debug!(camera = %self.descriptor.friendly_name, "Trigger ignored (not grabbing triggered)");
            return false;
        }
        if state.pending_triggers >= state.policy.depth() {
            debug!(camera = %self.descriptor.friendly_name, "Trigger dropped (buffers full)");
            return false;
        }
        state.pending_triggers += 1;
        self.frame_ready.notify_all();
        true
    }

    /// Change a node as if the camera itself updated it (e.g. a temperature
    /// reading), bypassing access checks.
    pub fn simulate_node_change(&self, name: &str, value: NodeValue) -> Result<(), BackendError> {
        let changed = {
            let mut state = self.state.lock();
            let node = state
                .nodes
                .get_mut(name)
                .ok_or_else(|| BackendError::UnknownNode(name.to_string()))?;
            node.value = value;
            let node = node.clone();
            state.subscribed.contains(name).then_some(node)
        };
        if let Some(node) = changed {
            self.emit_node_changed(&node);
        }
        Ok(())
    }

    /// Frames handed out since the handle was created.
    pub fn delivered_frames(&self) -> u64 {
        self.state.lock().delivered
    }

    /// Names of nodes with an active change subscription.
    pub fn subscribed_nodes(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.subscribed.iter().cloned().collect();
        names.sort();
        names
    }

    /// Whether a lifecycle sink is attached.
    pub fn has_event_sink(&self) -> bool {
        self.sink.lock().is_some()
    }

    fn mark_removed(&self) {
        {
            let mut state = self.state.lock();
            state.removed = true;
            self.frame_ready.notify_all();
        }
        info!(camera = %self.descriptor.friendly_name, "Mock camera removed");
        self.emit(DeviceEvent::Removed);
    }

    fn emit(&self, event: DeviceEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_device_event(&self.descriptor, event);
        }
    }

    fn emit_node_changed(&self, node: &FeatureNode) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_node_changed(&self.descriptor, node);
        }
    }

    fn require_open(state: &MockDeviceState) -> Result<(), BackendError> {
        if state.removed {
            return Err(BackendError::sdk(-1004, "device removed"));
        }
        if !state.open {
            return Err(BackendError::NotOpen);
        }
        Ok(())
    }

    fn build_frame(&self, state: &mut MockDeviceState) -> FrameBuffer {
        state.delivered += 1;
        let block_id = state.delivered;

        let width = node_integer(state, "Width").unwrap_or(i64::from(self.config.width)) as u32;
        let height = node_integer(state, "Height").unwrap_or(i64::from(self.config.height)) as u32;
        let pixel_format = match state.nodes.get("PixelFormat").map(|node| &node.value) {
            Some(NodeValue::Enumeration(name)) => {
                PixelFormat::from_name(name).unwrap_or(PixelFormat::Mono8)
            }
            _ => PixelFormat::Mono8,
        };

        let row_bytes = width as usize * pixel_format.bytes_per_pixel();
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            for x in 0..row_bytes {
                data.push(((x + y) as u64).wrapping_add(block_id) as u8);
            }
        }

        FrameBuffer {
            block_id,
            width,
            height,
            pixel_format,
            data: Bytes::from(data),
            timestamp: chrono::Utc::now(),
        }
    }
}

fn node_integer(state: &MockDeviceState, name: &str) -> Option<i64> {
    match state.nodes.get(name).map(|node| &node.value) {
        Some(NodeValue::Integer(v)) => Some(*v),
        _ => None,
    }
}

impl Device for MockDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn register_event_sink(&self, sink: Arc<dyn DeviceEventSink>) {
        *self.sink.lock() = Some(sink);
        self.emit(DeviceEvent::Attached);
    }

    fn detach(&self) {
        self.emit(DeviceEvent::Detached);
        self.emit(DeviceEvent::Destroyed);
        self.sink.lock().take();
        self.state.lock().subscribed.clear();
    }

    fn open(&self) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock();
            if state.removed {
                return Err(BackendError::sdk(-1004, "device removed"));
            }
            if self.config.fail_open {
                return Err(BackendError::sdk(-1001, "device could not be opened"));
            }
            if state.open {
                return Ok(());
            }
            state.open = true;
        }
        self.emit(DeviceEvent::Opened);
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        let was_acquiring = {
            let mut state = self.state.lock();
            if !state.open {
                return Ok(());
            }
            let was_acquiring = state.acquiring;
            state.acquiring = false;
            state.open = false;
            self.frame_ready.notify_all();
            was_acquiring
        };
        if was_acquiring {
            self.emit(DeviceEvent::GrabStopped);
        }
        self.emit(DeviceEvent::Closed);
        Ok(())
    }

    fn is_open(&self) -> Result<bool, BackendError> {
        let state = self.state.lock();
        if state.removed {
            return Err(BackendError::sdk(-1004, "device removed"));
        }
        Ok(state.open)
    }

    fn trigger_mode(&self) -> Result<bool, BackendError> {
        let state = self.state.lock();
        Self::require_open(&state)?;
        Ok(matches!(
            state.nodes.get("TriggerMode").map(|node| &node.value),
            Some(NodeValue::Enumeration(mode)) if mode == "On"
        ))
    }

    fn start_acquisition(
        &self,
        strategy: AcquisitionStrategy,
        policy: BufferPolicy,
    ) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock();
            Self::require_open(&state)?;
            if state.acquiring {
                return Err(BackendError::sdk(-1005, "device is already grabbing"));
            }
            state.acquiring = true;
            state.strategy = strategy;
            state.policy = policy;
            state.pending_triggers = 0;
            state.next_frame_due = None;
        }
        self.emit(DeviceEvent::GrabStarted);
        Ok(())
    }

    fn stop_acquisition(&self) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock();
            if !state.acquiring {
                return Ok(());
            }
            state.acquiring = false;
            state.pending_triggers = 0;
            self.frame_ready.notify_all();
        }
        self.emit(DeviceEvent::GrabStopped);
        Ok(())
    }

    fn is_acquiring(&self) -> bool {
        self.state.lock().acquiring
    }

    fn retrieve_next(&self, timeout: Duration) -> Result<GrabResult, BackendError> {
        let deadline = Instant::now() + timeout;
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        let mut state = self.state.lock();

        loop {
            if state.removed {
                return Err(BackendError::sdk(-1004, "device removed"));
            }
            if !state.acquiring {
                return Err(BackendError::sdk(-1002, "device is not grabbing"));
            }
            if let Some(limit) = self.config.fault_after_frames {
                if state.delivered >= limit {
                    return Err(BackendError::sdk(-1003, "transport layer fault"));
                }
            }

            let now = Instant::now();
            let ready_at = match state.strategy {
                AcquisitionStrategy::Triggered => {
                    if state.pending_triggers > 0 {
                        state.pending_triggers -= 1;
                        break;
                    }
                    deadline
                }
                AcquisitionStrategy::FreeRun => {
                    let due = *state.next_frame_due.get_or_insert(now);
                    if now >= due {
                        state.next_frame_due = Some(now + interval);
                        break;
                    }
                    due.min(deadline)
                }
            };

            if now >= deadline {
                return Ok(GrabResult::TimedOut);
            }
            self.frame_ready.wait_until(&mut state, ready_at);
        }

        state.retrievals += 1;
        if let Some(n) = self.config.fail_every {
            if n > 0 && state.retrievals % n == 0 {
                return Ok(GrabResult::Failed {
                    code: -2001,
                    message: "incomplete frame".to_string(),
                });
            }
        }

        Ok(GrabResult::Succeeded(self.build_frame(&mut state)))
    }

    fn nodes(&self) -> Result<Vec<FeatureNode>, BackendError> {
        let state = self.state.lock();
        Self::require_open(&state)?;
        Ok(state
            .node_order
            .iter()
            .filter_map(|name| state.nodes.get(name).cloned())
            .collect())
    }

    fn node(&self, name: &str) -> Result<Option<FeatureNode>, BackendError> {
        let state = self.state.lock();
        Self::require_open(&state)?;
        Ok(state.nodes.get(name).cloned())
    }

    fn set_node_value(&self, name: &str, value: NodeValue) -> Result<(), BackendError> {
        let (changed, fire_trigger) = {
            let mut state = self.state.lock();
            Self::require_open(&state)?;
            let acquiring = state.acquiring;
            let node = state
                .nodes
                .get_mut(name)
                .ok_or_else(|| BackendError::UnknownNode(name.to_string()))?;

            if !node.access.writable {
                return Err(BackendError::NodeNotWritable(name.to_string()));
            }
            if node.kind() != value.kind() {
                return Err(BackendError::InvalidNodeValue {
                    node: name.to_string(),
                    reason: format!("expected {:?}, got {:?}", node.kind(), value.kind()),
                });
            }
            if acquiring && matches!(name, "Width" | "Height" | "PixelFormat" | "TriggerMode") {
                return Err(BackendError::InvalidNodeValue {
                    node: name.to_string(),
                    reason: "locked while grabbing".to_string(),
                });
            }
            validate_value(node, &value)?;

            let fire_trigger = name == "TriggerSoftware";
            if value != NodeValue::Command {
                node.value = value;
            }
            let node = node.clone();
            (state.subscribed.contains(name).then_some(node), fire_trigger)
        };

        if fire_trigger {
            self.trigger();
        }
        if let Some(node) = changed {
            self.emit_node_changed(&node);
        }
        Ok(())
    }

    fn subscribe_node(&self, name: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(name) {
            return Err(BackendError::UnknownNode(name.to_string()));
        }
        state.subscribed.insert(name.to_string());
        Ok(())
    }
}

fn validate_value(node: &FeatureNode, value: &NodeValue) -> Result<(), BackendError> {
    let invalid = |reason: String| BackendError::InvalidNodeValue {
        node: node.name.clone(),
        reason,
    };
    match value {
        NodeValue::Enumeration(entry) if !node.entries.contains(entry) => Err(invalid(format!(
            "'{}' is not one of: {}",
            entry,
            node.entries.join(", ")
        ))),
        NodeValue::Integer(v) => check_range(node, *v as f64).map_err(invalid),
        NodeValue::Float(v) => check_range(node, *v).map_err(invalid),
        _ => Ok(()),
    }
}

fn check_range(node: &FeatureNode, value: f64) -> Result<(), String> {
    match node.range {
        Some((min, max)) if value < min || value > max => {
            Err(format!("{value} out of range [{min}, {max}]"))
        }
        _ => Ok(()),
    }
}

fn build_node_tree(descriptor: &DeviceDescriptor, config: &MockCameraConfig) -> Vec<FeatureNode> {
    let trigger_mode = if config.trigger_mode { "On" } else { "Off" };
    vec![
        FeatureNode::category(
            "Root",
            true,
            [
                "DeviceControl",
                "ImageFormatControl",
                "AcquisitionControl",
                "EventControl",
            ],
        ),
        FeatureNode::category(
            "DeviceControl",
            true,
            [
                "DeviceModelName",
                "DeviceSerialNumber",
                "DeviceUserID",
                "DeviceTemperature",
                "DeviceReset",
            ],
        )
        .with_display_name("Device Control"),
        FeatureNode::new(
            "DeviceModelName",
            NodeAccess::READ_ONLY,
            NodeValue::String(descriptor.model_name.clone()),
        )
        .with_display_name("Device Model Name"),
        FeatureNode::new(
            "DeviceSerialNumber",
            NodeAccess::READ_ONLY,
            NodeValue::String(descriptor.serial_number.clone()),
        )
        .with_display_name("Device Serial Number"),
        FeatureNode::new(
            "DeviceUserID",
            NodeAccess::READ_WRITE,
            NodeValue::String(String::new()),
        )
        .with_display_name("Device User ID"),
        FeatureNode::new(
            "DeviceTemperature",
            NodeAccess::READ_ONLY,
            NodeValue::Float(38.5),
        )
        .with_display_name("Device Temperature"),
        FeatureNode::new("DeviceReset", NodeAccess::WRITE_ONLY, NodeValue::Command)
            .with_display_name("Device Reset"),
        FeatureNode::category(
            "ImageFormatControl",
            true,
            ["Width", "Height", "PixelFormat", "ReverseX", "LUTValueAll"],
        )
        .with_display_name("Image Format Control"),
        FeatureNode::new(
            "Width",
            NodeAccess::READ_WRITE,
            NodeValue::Integer(i64::from(config.width)),
        )
        .with_range(1.0, 4096.0),
        FeatureNode::new(
            "Height",
            NodeAccess::READ_WRITE,
            NodeValue::Integer(i64::from(config.height)),
        )
        .with_range(1.0, 4096.0),
        FeatureNode::new(
            "PixelFormat",
            NodeAccess::READ_WRITE,
            NodeValue::Enumeration("Mono8".to_string()),
        )
        .with_display_name("Pixel Format")
        .with_entries(["Mono8", "Mono16", "BayerRG8", "RGB8"]),
        FeatureNode::new("ReverseX", NodeAccess::READ_WRITE, NodeValue::Boolean(false))
            .with_display_name("Reverse X"),
        FeatureNode::new(
            "LUTValueAll",
            NodeAccess::READ_ONLY,
            NodeValue::Register {
                address: 0x0001_0000,
                length: 4096,
            },
        )
        .with_display_name("LUT Value All"),
        FeatureNode::category(
            "AcquisitionControl",
            true,
            [
                "TriggerMode",
                "TriggerSource",
                "TriggerSoftware",
                "ExposureTime",
                "AcquisitionFrameRate",
            ],
        )
        .with_display_name("Acquisition Control"),
        FeatureNode::new(
            "TriggerMode",
            NodeAccess::READ_WRITE,
            NodeValue::Enumeration(trigger_mode.to_string()),
        )
        .with_display_name("Trigger Mode")
        .with_entries(["Off", "On"]),
        FeatureNode::new(
            "TriggerSource",
            NodeAccess::READ_WRITE,
            NodeValue::Enumeration("Software".to_string()),
        )
        .with_display_name("Trigger Source")
        .with_entries(["Software", "Line1"]),
        FeatureNode::new("TriggerSoftware", NodeAccess::WRITE_ONLY, NodeValue::Command)
            .with_display_name("Trigger Software"),
        FeatureNode::new(
            "ExposureTime",
            NodeAccess::READ_WRITE,
            NodeValue::Float(5000.0),
        )
        .with_display_name("Exposure Time")
        .with_range(10.0, 1_000_000.0),
        FeatureNode::new(
            "AcquisitionFrameRate",
            NodeAccess::READ_WRITE,
            NodeValue::Float(100.0),
        )
        .with_display_name("Acquisition Frame Rate")
        .with_range(0.1, 1000.0),
        FeatureNode::category("EventControl", false, ["EventSelector"])
            .with_display_name("Event Control"),
        FeatureNode::new(
            "EventSelector",
            NodeAccess::UNAVAILABLE,
            NodeValue::Enumeration("ExposureEnd".to_string()),
        )
        .with_entries(["ExposureEnd", "FrameStart"]),
    ]
}
