//! SDK Library Handle
//!
//! The vendor SDK needs one process-wide initialize/terminate pair. Instead of
//! a global constructor/destructor, [`SdkLibrary`] is a cloneable handle that
//! initializes the backend when first created and terminates it when the last
//! clone is dropped. The manager and every session hold a clone, so the SDK
//! outlives any session that is still closing.

use std::sync::Arc;
use tracing::info;

use crate::backend::CameraBackend;
use crate::error::AppResult;

struct LibraryInner {
    backend: Arc<dyn CameraBackend>,
}

impl Drop for LibraryInner {
    fn drop(&mut self) {
        self.backend.terminate();
        info!("Camera SDK terminated");
    }
}

/// Reference-counted SDK lifetime guard.
#[derive(Clone)]
pub struct SdkLibrary {
    inner: Arc<LibraryInner>,
}

impl SdkLibrary {
    /// Initialize the backend and return the first handle.
    ///
    /// # Errors
    ///
    /// Returns `GrabError::Backend` if the SDK refuses to initialize.
    pub fn initialize(backend: Arc<dyn CameraBackend>) -> AppResult<Self> {
        backend.initialize()?;
        info!("Camera SDK initialized");
        Ok(Self {
            inner: Arc::new(LibraryInner { backend }),
        })
    }

    /// Backend behind this library.
    pub fn backend(&self) -> &Arc<dyn CameraBackend> {
        &self.inner.backend
    }

    /// Number of live handles, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for SdkLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkLibrary")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
