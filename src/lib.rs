//! Camera session and frame acquisition core.
//!
//! A thin layer over a machine-vision camera SDK. A [`SessionManager`] owns
//! the SDK lifetime and the device enumeration and hands out [`Session`]s.
//! Each session binds one camera, runs a background acquisition loop on
//! `grab()`, paces free-run frames with consumer permits (`ready()`), and
//! fans every frame out to its observers.
//!
//! The SDK itself is reached through the [`backend::CameraBackend`] and
//! [`backend::Device`] traits; [`backend::mock`] provides a simulated
//! GenICam-style camera.
//!
//! ```rust,ignore
//! let backend = Arc::new(MockBackend::new(vec![MockCameraConfig::named("cam0")]));
//! let manager = SessionManager::new(backend, &GrabConfig::default())?;
//! let session = manager.create_session();
//! session.open(None)?;
//! session.subscribe(|frame| println!("{} bytes", frame.data().len()));
//! session.try_grab(3)?;
//! ```

pub mod acquisition;
pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod library;
pub mod logging;
pub mod manager;
pub mod node;
pub mod observer;
pub mod permit;
pub mod session;

pub use acquisition::{AcquisitionLoop, AcquisitionPhase, AcquisitionStats};
pub use backend::{AcquisitionStrategy, BufferPolicy, DeviceDescriptor, DeviceEvent, GrabResult};
pub use config::GrabConfig;
pub use error::{AppResult, BackendError, GrabError, StateError};
pub use frame::Frame;
pub use library::SdkLibrary;
pub use manager::SessionManager;
pub use node::{FeatureNode, NodeValue};
pub use observer::{FrameCallback, FrameStream, ObserverRegistry, SubscriptionId};
pub use permit::PermitGate;
pub use session::{CameraStatus, Session, StatusKind, StatusSnapshot};
