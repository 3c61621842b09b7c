//! Session Manager
//!
//! Owns the SDK library handle, the cached device enumeration and the table
//! of live sessions.
//!
//! ## Features
//!
//! - **Serialized refresh**: concurrent `refresh_device_list()` calls run one
//!   at a time; open sessions keep their handles across refreshes
//! - **Monotonic indices**: every `create_session()` gets the next index;
//!   indices of removed sessions are never handed out again
//! - **Ordered teardown**: sessions are closed before the library handle is
//!   released, and each session holds its own library clone, so the SDK is
//!   terminated only after the last session is gone

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{CameraBackend, Device, DeviceDescriptor};
use crate::config::{AcquisitionConfig, GrabConfig};
use crate::error::{AppResult, GrabError};
use crate::library::SdkLibrary;
use crate::session::Session;

/// Cached enumeration plus device resolution, shared by the manager and its
/// sessions.
pub struct DeviceDirectory {
    library: SdkLibrary,
    devices: RwLock<Vec<DeviceDescriptor>>,
    refresh_lock: Mutex<()>,
    acquisition: AcquisitionConfig,
    default_camera: Option<String>,
}

impl DeviceDirectory {
    fn new(library: SdkLibrary, config: &GrabConfig) -> Self {
        Self {
            library,
            devices: RwLock::new(Vec::new()),
            refresh_lock: Mutex::new(()),
            acquisition: config.acquisition.clone(),
            default_camera: config.devices.default_camera.clone(),
        }
    }

    pub(crate) fn acquisition_config(&self) -> &AcquisitionConfig {
        &self.acquisition
    }

    /// Re-enumerate devices and return their friendly names.
    pub(crate) fn refresh(&self) -> AppResult<Vec<String>> {
        let _guard = self.refresh_lock.lock();

        let devices = self
            .library
            .backend()
            .enumerate()
            .map_err(|e| GrabError::Device(format!("device enumeration failed: {e}")))?;

        info!(count = devices.len(), "Cameras enumerated");
        for device in &devices {
            debug!(
                camera = %device.friendly_name,
                model = %device.model_name,
                serial = %device.serial_number,
                "Camera found"
            );
        }

        let names = devices.iter().map(|d| d.friendly_name.clone()).collect();
        *self.devices.write() = devices;
        Ok(names)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.devices
            .read()
            .iter()
            .map(|d| d.friendly_name.clone())
            .collect()
    }

    pub(crate) fn descriptor(&self, name: &str) -> Option<DeviceDescriptor> {
        self.devices
            .read()
            .iter()
            .find(|d| d.friendly_name == name)
            .cloned()
    }

    /// Create a device handle for `name`.
    ///
    /// An empty or missing name selects the configured default camera, or
    /// the first enumerated one if none is configured.
    pub(crate) fn resolve(&self, name: Option<&str>) -> AppResult<Arc<dyn Device>> {
        let requested = name
            .filter(|n| !n.is_empty())
            .or(self.default_camera.as_deref());

        let descriptor = match requested {
            Some(name) => self
                .descriptor(name)
                .ok_or_else(|| GrabError::NotFound(name.to_string()))?,
            None => self
                .devices
                .read()
                .first()
                .cloned()
                .ok_or_else(|| GrabError::NotFound("<first available>".to_string()))?,
        };

        self.library
            .backend()
            .create_device(Some(&descriptor))
            .map_err(|e| {
                GrabError::Device(format!(
                    "cannot create device '{}': {e}",
                    descriptor.friendly_name
                ))
            })
    }
}

/// Tracks live sessions by logical index.
pub struct SessionManager {
    directory: Arc<DeviceDirectory>,
    sessions: RwLock<BTreeMap<usize, Arc<Session>>>,
    next_index: AtomicUsize,
}

impl SessionManager {
    /// Initialize the SDK and enumerate devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to initialize or enumerate.
    pub fn new(backend: Arc<dyn CameraBackend>, config: &GrabConfig) -> AppResult<Self> {
        let library = SdkLibrary::initialize(backend)?;
        let directory = Arc::new(DeviceDirectory::new(library, config));
        directory.refresh()?;

        Ok(Self {
            directory,
            sessions: RwLock::new(BTreeMap::new()),
            next_index: AtomicUsize::new(0),
        })
    }

    /// Re-enumerate devices. Open sessions are unaffected.
    pub fn refresh_device_list(&self) -> AppResult<Vec<String>> {
        self.directory.refresh()
    }

    /// Friendly names from the last enumeration.
    pub fn device_list(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Descriptor of a camera from the last enumeration.
    pub fn device_info(&self, name: &str) -> Option<DeviceDescriptor> {
        self.directory.descriptor(name)
    }

    /// Whether a camera from the last enumeration can be opened now.
    pub fn is_accessible(&self, name: &str) -> bool {
        self.directory
            .descriptor(name)
            .is_some_and(|descriptor| self.directory.library.backend().is_accessible(&descriptor))
    }

    /// Device handle for a name, or the first enumerated device when the
    /// name is empty or missing.
    ///
    /// # Errors
    ///
    /// `GrabError::NotFound` if nothing matches, `GrabError::Device` if the
    /// backend cannot create the handle.
    pub fn resolve_device_handle(&self, name: Option<&str>) -> AppResult<Arc<dyn Device>> {
        self.directory.resolve(name)
    }

    /// Create a closed session at the next logical index.
    pub fn create_session(&self) -> Arc<Session> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(index, Arc::clone(&self.directory)));
        self.sessions.write().insert(index, Arc::clone(&session));
        debug!(session = index, "Session created");
        session
    }

    /// Untrack a session, close it, then refresh the device list.
    ///
    /// Returns false if the session was not tracked by this manager.
    pub fn remove_session(&self, session: &Arc<Session>) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            let tracked = sessions
                .get(&session.index())
                .is_some_and(|tracked| Arc::ptr_eq(tracked, session));
            if tracked {
                sessions.remove(&session.index())
            } else {
                None
            }
        };
        let Some(removed) = removed else {
            return false;
        };

        removed.close();
        debug!(session = removed.index(), "Session removed");
        if let Err(e) = self.directory.refresh() {
            warn!(error = %e, "Device list refresh after session removal failed");
        }
        true
    }

    /// Session at a logical index, if it is still tracked.
    pub fn lookup_by_index(&self, index: usize) -> Option<Arc<Session>> {
        self.sessions.read().get(&index).cloned()
    }

    /// Live sessions in index order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Close and untrack every session.
    pub fn shutdown(&self) {
        let sessions = std::mem::take(&mut *self.sessions.write());
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "Closing sessions");
        for session in sessions.values() {
            session.close();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
