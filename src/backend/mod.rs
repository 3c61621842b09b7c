//! Camera Backend Adapter
//!
//! The vendor SDK sits behind two traits: [`CameraBackend`] for process-wide
//! discovery and [`Device`] for one physical camera. Sessions and the
//! acquisition loop only talk to these traits, so any transport layer that
//! can enumerate devices, hand out frame buffers and report lifecycle events
//! can drive them. [`mock::MockBackend`] simulates a GenICam-style SDK for
//! tests and the CLI.

pub mod mock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BackendError;
use crate::node::{FeatureNode, NodeValue};

/// Identifying information for an enumerated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Human-readable name; the key used for lookups
    pub friendly_name: String,
    /// Model name reported by the device
    pub model_name: String,
    /// Serial number
    pub serial_number: String,
}

/// Pixel layout of a frame buffer. Decoding is left to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit monochrome
    Mono8,
    /// 12-bit monochrome
    Mono12,
    /// 16-bit monochrome
    Mono16,
    /// 8-bit Bayer RG
    BayerRg8,
    /// 12-bit Bayer RG
    BayerRg12,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit BGR
    Bgr8,
    /// YUV 4:2:2 packed
    Yuv422,
}

impl PixelFormat {
    /// GenICam symbolic name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::BayerRg8 => "BayerRG8",
            PixelFormat::BayerRg12 => "BayerRG12",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Yuv422 => "YUV422_8",
        }
    }

    /// Parse a GenICam symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            PixelFormat::Mono8,
            PixelFormat::Mono12,
            PixelFormat::Mono16,
            PixelFormat::BayerRg8,
            PixelFormat::BayerRg12,
            PixelFormat::Rgb8,
            PixelFormat::Bgr8,
            PixelFormat::Yuv422,
        ]
        .into_iter()
        .find(|format| format.as_str() == name)
    }

    /// Storage size of one pixel in bytes (unpacked).
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRg8 => 1,
            PixelFormat::Mono12
            | PixelFormat::Mono16
            | PixelFormat::BayerRg12
            | PixelFormat::Yuv422 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }
}

/// A successfully grabbed image as handed out by the backend.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Backend frame counter (block id); independent of the session sequence
    pub block_id: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub pixel_format: PixelFormat,
    /// Raw image bytes, shared without copying
    pub data: Bytes,
    /// Time the backend delivered the buffer
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one bounded retrieval attempt.
///
/// Timeouts and failed grabs are ordinary values: the loop retries them.
/// Only `Err(BackendError)` from [`Device::retrieve_next`] ends acquisition.
#[derive(Debug, Clone)]
pub enum GrabResult {
    /// A frame arrived
    Succeeded(FrameBuffer),
    /// The device reported an incomplete or corrupt frame
    Failed {
        /// Vendor status code
        code: i32,
        /// Vendor description
        message: String,
    },
    /// Nothing arrived within the timeout
    TimedOut,
}

/// Acquisition strategy, chosen once per grab from the device trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionStrategy {
    /// Externally paced; every frame is dispatched, no permit gating
    Triggered,
    /// Continuous; each dispatch consumes one consumer permit
    FreeRun,
}

impl AcquisitionStrategy {
    /// Whether frames must wait for a consumer permit.
    pub fn is_permit_gated(&self) -> bool {
        matches!(self, AcquisitionStrategy::FreeRun)
    }
}

/// Buffer handling requested from the backend when grabbing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferPolicy {
    /// Queue frames in order, up to `depth` in flight
    OneByOne {
        /// Buffer count
        depth: usize,
    },
    /// Keep only the newest frame; stale frames are discarded
    LatestImageOnly {
        /// Buffer count
        depth: usize,
    },
}

impl BufferPolicy {
    /// Number of buffers the backend allocates.
    pub fn depth(&self) -> usize {
        match *self {
            BufferPolicy::OneByOne { depth } | BufferPolicy::LatestImageOnly { depth } => depth,
        }
    }
}

/// Lifecycle notifications raised by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Event sink registered
    Attached,
    /// Event sink detached
    Detached,
    /// Device opened
    Opened,
    /// Device closed
    Closed,
    /// Handle released
    Destroyed,
    /// Device physically removed
    Removed,
    /// Grab started
    GrabStarted,
    /// Grab stopped
    GrabStopped,
    /// Error reported by the grab engine
    GrabError(String),
}

/// Receiver of device lifecycle and node-change notifications.
///
/// Registered with a device through [`Device::register_event_sink`]. Calls may
/// arrive on any thread, including the acquisition worker.
pub trait DeviceEventSink: Send + Sync {
    /// A lifecycle transition happened on the device.
    fn on_device_event(&self, device: &DeviceDescriptor, event: DeviceEvent);

    /// A subscribed feature node changed value.
    fn on_node_changed(&self, device: &DeviceDescriptor, node: &FeatureNode);
}

/// Process-wide SDK entry point: initialization and device discovery.
pub trait CameraBackend: Send + Sync {
    /// Initialize the SDK. Called once per [`crate::library::SdkLibrary`].
    fn initialize(&self) -> Result<(), BackendError>;

    /// Tear the SDK down. Called when the last library handle is dropped.
    fn terminate(&self);

    /// Enumerate attached devices.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, BackendError>;

    /// Whether a device can currently be opened by this process.
    fn is_accessible(&self, descriptor: &DeviceDescriptor) -> bool;

    /// Create a device handle for `descriptor`, or for the first available
    /// device when `None`.
    fn create_device(
        &self,
        descriptor: Option<&DeviceDescriptor>,
    ) -> Result<Arc<dyn Device>, BackendError>;
}

/// One physical camera.
///
/// All methods take `&self`; implementations synchronize internally so the
/// handle can be shared between the session and its acquisition worker.
pub trait Device: Send + Sync {
    /// Descriptor this handle was created from.
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Attach a lifecycle sink, replacing any previous one.
    fn register_event_sink(&self, sink: Arc<dyn DeviceEventSink>);

    /// Detach the lifecycle sink and release the handle.
    fn detach(&self);

    /// Open the device.
    fn open(&self) -> Result<(), BackendError>;
    /// Close the device. Closing a closed device is not an error.
    fn close(&self) -> Result<(), BackendError>;
    /// Whether the device is open.
    fn is_open(&self) -> Result<bool, BackendError>;

    /// Whether the device is paced by a hardware or software trigger.
    fn trigger_mode(&self) -> Result<bool, BackendError>;

    /// Start the device grab engine.
    fn start_acquisition(
        &self,
        strategy: AcquisitionStrategy,
        policy: BufferPolicy,
    ) -> Result<(), BackendError>;
    /// Stop the device grab engine. No-op when not grabbing.
    fn stop_acquisition(&self) -> Result<(), BackendError>;
    /// Whether the grab engine is running.
    fn is_acquiring(&self) -> bool;

    /// Wait up to `timeout` for the next frame.
    fn retrieve_next(&self, timeout: Duration) -> Result<GrabResult, BackendError>;

    /// Every node in the device's feature tree.
    fn nodes(&self) -> Result<Vec<FeatureNode>, BackendError>;

    /// A single node by name.
    fn node(&self, name: &str) -> Result<Option<FeatureNode>, BackendError>;

    /// Write a node value. Command nodes execute on `NodeValue::Command`.
    fn set_node_value(&self, name: &str, value: NodeValue) -> Result<(), BackendError>;

    /// Ask for change notifications on a node via the registered sink.
    fn subscribe_node(&self, name: &str) -> Result<(), BackendError>;
}
