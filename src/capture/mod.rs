//! Audio capture module
//!
//! Provides the device seam and the single-segment capture session:
//! - `AudioDevice`: platform recorder (permission, start, stop)
//! - `CaptureSession`: Closed -> Open -> Closed lifecycle, one segment at a time
//! - `CaptureSegment`: finished audio handed to the analysis cycle exactly once

mod device;
mod session;

pub use device::{AudioDevice, SilentDevice};
#[cfg(test)]
pub use device::RecordingHandle;
pub use session::{CaptureSegment, CaptureSession};

/// Errors from the capture device or session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("a capture segment is already open")]
    DeviceBusy,

    #[error("audio device error: {0}")]
    Device(String),
}
