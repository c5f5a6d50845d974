//! Per-stream frame sinks handed to capture threads
//!
//! Capture threads outlive operator sessions. They always feed through
//! `VideoSinks`; while no session is connected the frames are simply
//! discarded, and when one connects its relays are swapped in.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use super::frame::Frame;
use super::relay::{FeedOutcome, FrameRelay};
use super::StreamId;

/// Lock-free slots for the current session's relays
#[derive(Default)]
pub struct VideoSinks {
    slots: [ArcSwapOption<FrameRelay>; 3],
}

impl VideoSinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `stream`'s frames into `relay`
    pub fn attach(&self, relay: Arc<FrameRelay>) {
        self.slots[relay.stream().index()].store(Some(relay));
    }

    /// Stop routing `stream` and close its relay
    pub fn detach(&self, stream: StreamId) {
        if let Some(relay) = self.slots[stream.index()].swap(None) {
            relay.close();
        }
    }

    pub fn detach_all(&self) {
        for stream in StreamId::ALL {
            self.detach(stream);
        }
    }

    pub fn is_attached(&self, stream: StreamId) -> bool {
        self.slots[stream.index()].load().is_some()
    }

    /// Current relay for `stream`, if any
    pub fn relay(&self, stream: StreamId) -> Option<Arc<FrameRelay>> {
        self.slots[stream.index()].load_full()
    }

    /// Feed a frame; `Closed` when no session is attached
    pub fn feed(&self, stream: StreamId, frame: Frame) -> FeedOutcome {
        match self.slots[stream.index()].load().as_ref() {
            Some(relay) => relay.feed(frame),
            None => FeedOutcome::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::{CaptureTimestamp, Resolution};
    use bytes::Bytes;

    fn frame() -> Frame {
        Frame::new(
            Bytes::from_static(&[0; 3]),
            Resolution::new(1, 1),
            CaptureTimestamp::default(),
            0,
        )
    }

    #[test]
    fn test_feed_without_session_is_discarded() {
        let sinks = VideoSinks::new();
        assert_eq!(sinks.feed(StreamId::Head, frame()), FeedOutcome::Closed);
    }

    #[tokio::test]
    async fn test_attach_routes_and_detach_closes() {
        let sinks = VideoSinks::new();
        let (relay, mut rx) = FrameRelay::channel(StreamId::WristLeft);
        sinks.attach(relay.clone());

        assert!(sinks.is_attached(StreamId::WristLeft));
        assert!(!sinks.is_attached(StreamId::Head));
        assert_eq!(sinks.feed(StreamId::WristLeft, frame()), FeedOutcome::Queued);
        assert!(rx.take().await.is_some());

        sinks.detach_all();
        assert!(relay.is_closed());
        assert!(rx.take().await.is_none());
        assert_eq!(sinks.feed(StreamId::WristLeft, frame()), FeedOutcome::Closed);
    }
}
