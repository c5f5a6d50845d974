//! Video frame data structures

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bytes per pixel of the packed RGB frames moved through the relay
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Frame resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD720: Resolution = Resolution::new(1280, 720);
    pub const NHD: Resolution = Resolution::new(640, 360);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of a packed RGB frame at this resolution
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capture timestamp as seconds + nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct CaptureTimestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl CaptureTimestamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Wall clock now
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .into()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 / 1e9
    }

    /// This timestamp advanced by `elapsed`
    pub fn after(&self, elapsed: Duration) -> Self {
        (Duration::new(self.secs, self.nanos) + elapsed).into()
    }
}

impl From<Duration> for CaptureTimestamp {
    fn from(d: Duration) -> Self {
        Self::new(d.as_secs(), d.subsec_nanos())
    }
}

/// A captured frame: packed RGB pixels plus capture time
///
/// Frames are immutable once built; the data is reference counted so a
/// frame can be handed across threads without copying pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    pub resolution: Resolution,
    pub timestamp: CaptureTimestamp,
    /// Per-source sequence number
    pub sequence: u64,
}

impl Frame {
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            timestamp,
            sequence,
        }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the buffer holds exactly height x width x 3 bytes
    pub fn is_packed_rgb(&self) -> bool {
        self.data.len() == self.resolution.rgb_len()
    }
}
