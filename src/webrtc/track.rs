//! Relay-backed outbound video tracks
//!
//! One `RelayTrackSender` per stream pulls the freshest frame from its
//! relay, places it on the media clock and writes it to the track. When the
//! relay closes (session teardown) the sender finishes.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::video::{FrameReceiver, MediaClock, StreamId};
use crate::warn_throttled;

/// Stream label shared by all camera tracks
pub const MEDIA_STREAM_ID: &str = "teleop-cameras";

/// Destination for timestamped samples
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn send_sample(&self, data: Bytes, duration: Duration) -> Result<()>;
}

#[async_trait]
impl SampleSink for TrackLocalStaticSample {
    async fn send_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.write_sample(&sample)
            .await
            .map_err(|e| AppError::WebRtcError(format!("write_sample failed: {}", e)))
    }
}

/// Build the sample track for `stream`
pub fn camera_track(stream: StreamId, mime_type: &str, clock_rate: u32) -> Arc<TrackLocalStaticSample> {
    let capability = RTCRtpCodecCapability {
        mime_type: mime_type.to_string(),
        clock_rate,
        ..Default::default()
    };
    Arc::new(TrackLocalStaticSample::new(
        capability,
        stream.as_str().to_string(),
        MEDIA_STREAM_ID.to_string(),
    ))
}

/// Counters reported when a sender finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub write_errors: u64,
    pub last_ticks: u64,
}

/// Pumps one relay into one sample sink
pub struct RelayTrackSender {
    stream: StreamId,
    receiver: FrameReceiver,
    clock: MediaClock,
    sink: Arc<dyn SampleSink>,
}

impl RelayTrackSender {
    pub fn new(
        stream: StreamId,
        receiver: FrameReceiver,
        clock: MediaClock,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        Self {
            stream,
            receiver,
            clock,
            sink,
        }
    }

    /// Run until the relay closes
    pub async fn run(mut self) -> SenderStats {
        let mut stats = SenderStats::default();
        let throttler = LogThrottler::with_secs(5);
        let frame_interval = self.clock.ticks_to_duration(self.clock.clock_rate() as u64 / 30);

        while let Some(frame) = self.receiver.take().await {
            let time = self.clock.stamp(frame.timestamp);
            let duration = if time.delta == 0 {
                frame_interval
            } else {
                self.clock.ticks_to_duration(time.delta)
            };

            trace!(
                "{} frame #{} ticks={} delta={}",
                self.stream,
                frame.sequence,
                time.ticks,
                time.delta
            );

            match self.sink.send_sample(frame.data_bytes(), duration).await {
                Ok(()) => stats.frames_sent += 1,
                Err(e) => {
                    stats.write_errors += 1;
                    warn_throttled!(throttler, "write", "{} track: {}", self.stream, e);
                }
            }
            stats.last_ticks = time.ticks;
        }

        let relay = self.receiver.relay().stats();
        info!(
            "{} track finished: {} sent, {} dropped at relay",
            self.stream, stats.frames_sent, relay.dropped
        );
        stats
    }

    pub fn spawn(self) -> JoinHandle<SenderStats> {
        debug!("Starting {} track sender", self.stream);
        tokio::spawn(self.run())
    }
}
