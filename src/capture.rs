//! Camera and landmark-model collaborators
//!
//! The controller only talks to the outside world through these traits:
//! a capture device that hands out a stream handle, and a model loader that
//! produces a landmark detector. Both handles are owned exclusively by one
//! session.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SignalError;
use crate::types::LandmarkFrame;

/// One captured video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Monotonic frame counter assigned by the capture handle
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    /// A frame without pixel data, for sources that only carry a sequence
    pub fn empty(sequence: u64) -> Self {
        Self {
            sequence,
            width: 0,
            height: 0,
            data: Arc::from(Vec::<u8>::new()),
        }
    }
}

/// Live capture stream
pub trait CaptureHandle: Send {
    /// Latest frame, or `None` while the stream has nothing decodable yet
    fn grab(&mut self) -> Option<VideoFrame>;

    /// Stop every track. Must be safe to call more than once.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Source of capture streams (the user-facing camera)
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request the camera; fails with [`SignalError::DeviceUnavailable`]
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, SignalError>;

    /// Release a stream handed out by [`CaptureDevice::acquire`]. Idempotent.
    fn release(&self, handle: &mut dyn CaptureHandle) {
        handle.stop();
    }
}

/// A loaded face-landmark detector
#[async_trait]
pub trait LandmarkModel: Send {
    /// Detect the first face in a frame; `None` when there is none
    async fn detect(&mut self, frame: &VideoFrame, timestamp_ms: f64) -> Option<LandmarkFrame>;

    /// Free model resources. Called once when the session ends.
    fn close(&mut self) {}
}

/// Loads landmark models
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model; fails with [`SignalError::ModelLoadFailure`]
    async fn load(&self) -> Result<Box<dyn LandmarkModel>, SignalError>;
}
