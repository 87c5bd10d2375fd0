//! Single-segment capture session
//!
//! The session owns at most one open recording. `close` hands the finished
//! segment to the caller by value, so ownership moves linearly from the
//! session to the analysis cycle and ends at `CaptureSegment::release`.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::debug;

use super::device::{AudioDevice, RecordingHandle};
use super::CaptureError;

/// A finished capture segment awaiting classification
#[derive(Debug)]
pub struct CaptureSegment {
    id: u64,
    created_at: SystemTime,
    recorded_for: std::time::Duration,
    audio: Vec<u8>,
}

impl CaptureSegment {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// How long the segment was open before it was closed
    pub fn recorded_for(&self) -> std::time::Duration {
        self.recorded_for
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    /// Drop the segment's audio once classification is over
    pub fn release(self) {
        let age = self.created_at.elapsed().unwrap_or_default();
        debug!(segment_id = self.id, bytes = self.audio.len(), ?age, "capture segment released");
    }
}

/// The recording currently held open by the session
#[derive(Debug)]
struct OpenSegment {
    id: u64,
    created_at: SystemTime,
    opened: Instant,
    handle: RecordingHandle,
}

/// Capture session over one audio device
pub struct CaptureSession {
    device: Arc<dyn AudioDevice>,
    current: Option<OpenSegment>,
    permission_granted: bool,
    next_segment_id: u64,
}

impl CaptureSession {
    pub fn new(device: Arc<dyn AudioDevice>) -> Self {
        Self {
            device,
            current: None,
            permission_granted: false,
            next_segment_id: 1,
        }
    }

    /// Whether a segment is currently recording
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Open a new segment, requesting permission first if not yet granted
    ///
    /// Returns the new segment's id.
    pub async fn open(&mut self) -> Result<u64, CaptureError> {
        if self.current.is_some() {
            return Err(CaptureError::DeviceBusy);
        }

        if !self.permission_granted {
            if !self.device.request_permission().await.is_granted() {
                return Err(CaptureError::PermissionDenied);
            }
            self.permission_granted = true;
        }

        let handle = self.device.start_recording().await?;
        let id = self.next_segment_id;
        self.next_segment_id += 1;

        debug!(segment_id = id, handle = handle.id(), "capture segment opened");
        self.current = Some(OpenSegment {
            id,
            created_at: SystemTime::now(),
            opened: Instant::now(),
            handle,
        });
        Ok(id)
    }

    /// Finalize the open segment and hand it to the caller
    ///
    /// Returns `Ok(None)` when nothing is open. The session is closed
    /// afterwards even if the device fails to finalize.
    pub async fn close(&mut self) -> Result<Option<CaptureSegment>, CaptureError> {
        let Some(open) = self.current.take() else {
            return Ok(None);
        };

        let audio = self.device.stop_recording(open.handle).await?;
        debug!(segment_id = open.id, bytes = audio.len(), "capture segment closed");

        Ok(Some(CaptureSegment {
            id: open.id,
            created_at: open.created_at,
            recorded_for: open.opened.elapsed(),
            audio,
        }))
    }

    /// Forget a previous grant so the next `open` asks again
    pub fn forget_permission(&mut self) {
        self.permission_granted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDevice;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_open_close_hands_segment_over_once() {
        let device = FakeDevice::granting();
        let mut session = CaptureSession::new(device.clone());

        let id = assert_ok!(session.open().await);
        assert!(session.is_open());

        let segment = session.close().await.unwrap().expect("segment");
        assert_eq!(segment.id(), id);
        assert!(!session.is_open());

        assert!(session.close().await.unwrap().is_none());
        segment.release();
        assert_eq!(device.open_count(), 0);
    }

    #[tokio::test]
    async fn test_open_twice_is_busy() {
        let device = FakeDevice::granting();
        let mut session = CaptureSession::new(device.clone());

        assert_ok!(session.open().await);
        assert_eq!(session.open().await, Err(CaptureError::DeviceBusy));
        assert_eq!(device.open_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_opens_nothing() {
        let device = FakeDevice::denying();
        let mut session = CaptureSession::new(device.clone());

        assert_eq!(session.open().await, Err(CaptureError::PermissionDenied));
        assert!(!session.is_open());
        assert_eq!(device.started(), 0);
    }

    #[tokio::test]
    async fn test_permission_requested_once_after_grant() {
        let device = FakeDevice::granting();
        let mut session = CaptureSession::new(device.clone());

        for _ in 0..3 {
            assert_ok!(session.open().await);
            session.close().await.unwrap().unwrap().release();
        }
        assert_eq!(device.permission_requests(), 1);

        session.forget_permission();
        assert_ok!(session.open().await);
        assert_eq!(device.permission_requests(), 2);
    }

    #[tokio::test]
    async fn test_segment_ids_increase() {
        let device = FakeDevice::granting();
        let mut session = CaptureSession::new(device);

        let first = assert_ok!(session.open().await);
        session.close().await.unwrap().unwrap().release();
        let second = assert_ok!(session.open().await);
        assert!(second > first);

        session.close().await.unwrap().unwrap().release();
        assert_err!(CaptureSession::new(FakeDevice::denying()).open().await);
    }
}
