/// Frame source boundary.
///
/// The camera driver is an external collaborator: it fills a caller-owned
/// buffer with one raw frame. The detection controller owns that buffer and
/// reuses it every cycle.
use core::fmt;

use crate::defaults::FRAME_LEN;

/// Sensor output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u16,
    pub height: u16,
    pub channels: u8,
}

impl FrameFormat {
    /// Size of one frame in bytes.
    pub const fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Raw frame storage, one byte per pixel channel.
pub type FrameBuffer = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The sensor did not deliver a frame in time.
    Timeout,
    /// The driver returned a frame of a different size.
    SizeMismatch { expected: usize, found: usize },
    /// Driver-level error code.
    Driver(i32),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::Timeout => write!(f, "frame capture timed out"),
            AcquireError::SizeMismatch { expected, found } => {
                write!(f, "frame is {} bytes, expected {}", found, expected)
            }
            AcquireError::Driver(code) => write!(f, "camera driver error {}", code),
        }
    }
}

/// Produces raw frames.
pub trait FrameSource {
    /// One-time sensor bring-up.
    fn init(&mut self) -> Result<(), AcquireError>;

    /// Capture the next frame into `out`, which is exactly `format.len()` bytes.
    fn acquire(&mut self, format: &FrameFormat, out: &mut [u8]) -> Result<(), AcquireError>;
}
