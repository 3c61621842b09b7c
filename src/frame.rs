//! Delivered frames.

use bytes::Bytes;

use crate::backend::{FrameBuffer, PixelFormat};

/// A grabbed image tagged with its position in the current grab.
///
/// The sequence is 1-based and restarts at every `grab()`. Cloning shares the
/// pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    image: FrameBuffer,
}

impl Frame {
    /// Wrap a backend buffer with its grab sequence number.
    pub fn new(sequence: u64, image: FrameBuffer) -> Self {
        Self { sequence, image }
    }

    /// 1-based sequence number within the grab that produced this frame.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Backend buffer, including its own block id and timestamp.
    pub fn image(&self) -> &FrameBuffer {
        &self.image
    }

    /// Raw pixel data.
    pub fn data(&self) -> &Bytes {
        &self.image.data
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Pixel layout of `data()`.
    pub fn pixel_format(&self) -> PixelFormat {
        self.image.pixel_format
    }
}
