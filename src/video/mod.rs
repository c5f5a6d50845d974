//! Video capture and relay
//!
//! Architecture:
//! ```text
//! CaptureSource (V4L2 / test pattern), one std thread per camera
//!        |
//!        v
//! VideoSinks --> FrameRelay (single slot, latest wins)
//!                      |
//!                      v
//!             RelayTrackSender (media clock, WebRTC sample track)
//! ```

pub mod capture;
pub mod clock;
pub mod frame;
pub mod relay;
pub mod sinks;

use serde::{Deserialize, Serialize};

pub use capture::{
    source_from_config, spawn_capture, CaptureHandle, CaptureSource, FrameStream, TestPatternSource,
    V4l2Source,
};
pub use clock::{MediaClock, MediaTime, VIDEO_CLOCK_RATE};
pub use frame::{CaptureTimestamp, Frame, Resolution};
pub use relay::{FeedOutcome, FrameReceiver, FrameRelay, RelayStats};
pub use sinks::VideoSinks;

/// Logical outbound video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamId {
    Head,
    WristLeft,
    WristRight,
}

impl StreamId {
    /// All streams in transceiver order (mid 0, 1, 2)
    pub const ALL: [StreamId; 3] = [StreamId::Head, StreamId::WristLeft, StreamId::WristRight];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamId::Head => "head",
            StreamId::WristLeft => "wrist_left",
            StreamId::WristRight => "wrist_right",
        }
    }

    /// Position in [`StreamId::ALL`]
    pub fn index(&self) -> usize {
        match self {
            StreamId::Head => 0,
            StreamId::WristLeft => 1,
            StreamId::WristRight => 2,
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
