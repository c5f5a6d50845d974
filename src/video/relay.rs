//! Single-slot, latest-wins frame relay
//!
//! Bridges a blocking camera thread to the async track sender. The producer
//! never waits: feeding over an unconsumed frame replaces it and counts a
//! drop. The consumer awaits the next frame and always gets the freshest one.
//!
//! ```text
//! capture thread --feed()--> [ slot ] --take().await--> track sender
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::frame::Frame;
use super::StreamId;
use crate::utils::LogThrottler;

/// What happened to a fed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Slot was empty
    Queued,
    /// An unconsumed frame was discarded to make room
    ReplacedStale,
    /// Relay is closed; the frame was discarded
    Closed,
}

/// Relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub fed: u64,
    pub dropped: u64,
    pub taken: u64,
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    closed: bool,
}

/// Producer side of a relay, shareable across threads
pub struct FrameRelay {
    stream: StreamId,
    slot: Mutex<Slot>,
    notify: Notify,
    fed: AtomicU64,
    dropped: AtomicU64,
    taken: AtomicU64,
    drop_log: LogThrottler,
}

impl FrameRelay {
    /// Create a relay and its single consumer
    pub fn channel(stream: StreamId) -> (Arc<FrameRelay>, FrameReceiver) {
        let relay = Arc::new(FrameRelay {
            stream,
            slot: Mutex::new(Slot::default()),
            notify: Notify::new(),
            fed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            taken: AtomicU64::new(0),
            drop_log: LogThrottler::with_secs(5),
        });
        let receiver = FrameReceiver {
            relay: relay.clone(),
        };
        (relay, receiver)
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Store `frame`, replacing any unconsumed one. Never blocks on the
    /// consumer; safe to call from a non-async thread.
    pub fn feed(&self, frame: Frame) -> FeedOutcome {
        let outcome = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return FeedOutcome::Closed;
            }
            match slot.frame.replace(frame) {
                Some(_) => FeedOutcome::ReplacedStale,
                None => FeedOutcome::Queued,
            }
        };

        self.fed.fetch_add(1, Ordering::Relaxed);
        if outcome == FeedOutcome::ReplacedStale {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if self.drop_log.should_log("dropped") {
                debug!("Relay {} dropped stale frame ({} total)", self.stream, dropped);
            }
        }
        self.notify.notify_one();
        outcome
    }

    /// Stop accepting frames and wake the consumer. A frame already in the
    /// slot is discarded.
    pub fn close(&self) {
        {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.frame = None;
        }
        trace!("Relay {} closed", self.stream);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            fed: self.fed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
        }
    }
}

/// Consumer side of a relay
///
/// There is exactly one receiver per relay and `take` needs `&mut self`, so
/// at most one take can be pending at a time. Dropping the receiver closes
/// the relay.
pub struct FrameReceiver {
    relay: Arc<FrameRelay>,
}

impl std::fmt::Debug for FrameReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver")
            .field("stream", &self.relay.stream)
            .field("closed", &self.relay.is_closed())
            .finish()
    }
}

impl FrameReceiver {
    /// Wait for the next frame. Returns `None` once the relay is closed.
    pub async fn take(&mut self) -> Option<Frame> {
        loop {
            let notified = self.relay.notify.notified();
            {
                let mut slot = self.relay.slot.lock();
                if let Some(frame) = slot.frame.take() {
                    self.relay.taken.fetch_add(1, Ordering::Relaxed);
                    return Some(frame);
                }
                if slot.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take a frame if one is waiting
    pub fn try_take(&mut self) -> Option<Frame> {
        let frame = self.relay.slot.lock().frame.take();
        if frame.is_some() {
            self.relay.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn relay(&self) -> &Arc<FrameRelay> {
        &self.relay
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.relay.close();
    }
}
