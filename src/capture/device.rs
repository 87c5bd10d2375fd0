//! Audio device seam

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::CaptureError;
use crate::permission::Permission;

/// Opaque handle to a recording in progress
///
/// Not `Clone`: the handle is consumed by `stop_recording`, so a recording
/// can only be finalized once.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordingHandle(u64);

impl RecordingHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Platform audio recorder
#[async_trait]
pub trait AudioDevice: Send + Sync {
    /// Ask the platform for microphone access
    async fn request_permission(&self) -> Permission;

    /// Begin recording a new segment
    async fn start_recording(&self) -> Result<RecordingHandle, CaptureError>;

    /// Finalize a recording and return its encoded audio
    async fn stop_recording(&self, handle: RecordingHandle) -> Result<Vec<u8>, CaptureError>;
}

/// Device used when no hardware backend is wired in
///
/// Grants permission and produces empty segments, so the analysis cycle
/// runs end to end but the classifier never hears anything.
#[derive(Debug, Default)]
pub struct SilentDevice {
    next_handle: AtomicU64,
}

impl SilentDevice {
    pub fn new() -> Self {
        warn!("no audio backend configured, capture segments will be silent");
        Self::default()
    }
}

#[async_trait]
impl AudioDevice for SilentDevice {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn start_recording(&self) -> Result<RecordingHandle, CaptureError> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        debug!(handle = id, "silent recording started");
        Ok(RecordingHandle::new(id))
    }

    async fn stop_recording(&self, handle: RecordingHandle) -> Result<Vec<u8>, CaptureError> {
        debug!(handle = handle.id(), "silent recording stopped");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_silent_device_hands_out_distinct_handles() {
        let device = SilentDevice::new();
        assert!(device.request_permission().await.is_granted());

        let first = device.start_recording().await.unwrap();
        let second = device.start_recording().await.unwrap();
        assert_ne!(first, second);

        let audio = device.stop_recording(first).await.unwrap();
        assert!(audio.is_empty());
    }
}
