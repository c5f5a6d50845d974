//! Camera capture threads
//!
//! Each configured stream gets one named std thread. The thread opens its
//! `CaptureSource`, pulls frames with a blocking `next_frame`, and feeds them
//! into `VideoSinks`. Open or read failures are logged, reported to the
//! operator, and retried with backoff.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::frame::{CaptureTimestamp, Frame, Resolution};
use super::relay::FeedOutcome;
use super::sinks::VideoSinks;
use super::StreamId;
use crate::config::{CaptureConfig, CaptureSourceConfig};
use crate::error::{AppError, Result};
use crate::events::StatusBus;
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Number of mmap buffers requested from the driver
const BUFFER_COUNT: u32 = 2;
/// Driver dequeue timeout
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);
/// First reopen delay; doubles up to `MAX_RETRY_DELAY`
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(200);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Something that can be opened into a stream of frames
pub trait CaptureSource: Send {
    /// Human readable source name for logs
    fn describe(&self) -> String;

    /// Open the source. The returned stream may borrow the source.
    fn open(&mut self) -> Result<Box<dyn FrameStream + '_>>;
}

/// An opened source
pub trait FrameStream {
    /// Block until the next frame is available
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Build the source described by a stream's configuration
pub fn source_from_config(config: &CaptureConfig) -> Option<Box<dyn CaptureSource>> {
    let resolution = Resolution::new(config.width, config.height);
    match &config.source {
        CaptureSourceConfig::V4l2 { device } => Some(Box::new(V4l2Source::new(
            device.clone(),
            resolution,
            config.fps,
        ))),
        CaptureSourceConfig::TestPattern => {
            Some(Box::new(TestPatternSource::new(resolution, config.fps)))
        }
        CaptureSourceConfig::Disabled => None,
    }
}

// ============================================================================
// V4L2
// ============================================================================

/// Packed RGB capture from a V4L2 device node
pub struct V4l2Source {
    device_path: String,
    resolution: Resolution,
    fps: u32,
    device: Option<v4l::Device>,
}

impl V4l2Source {
    pub fn new(device_path: impl Into<String>, resolution: Resolution, fps: u32) -> Self {
        Self {
            device_path: device_path.into(),
            resolution,
            fps,
            device: None,
        }
    }

    fn configure(&self, device: &v4l::Device) -> Result<Resolution> {
        use v4l::video::Capture;

        let mut format = device
            .format()
            .map_err(|e| AppError::VideoError(format!("{}: read format: {}", self.device_path, e)))?;
        format.width = self.resolution.width;
        format.height = self.resolution.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let actual = device
            .set_format(&format)
            .map_err(|e| AppError::VideoError(format!("{}: set format: {}", self.device_path, e)))?;
        if actual.fourcc != format.fourcc {
            return Err(AppError::VideoError(format!(
                "{}: driver refused RGB3, offered {}",
                self.device_path, actual.fourcc
            )));
        }

        if self.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.fps);
            if let Err(e) = device.set_params(&params) {
                warn!("{}: failed to set {} fps: {}", self.device_path, self.fps, e);
            }
        }

        Ok(Resolution::new(actual.width, actual.height))
    }
}

impl CaptureSource for V4l2Source {
    fn describe(&self) -> String {
        format!("v4l2 {} {}@{}", self.device_path, self.resolution, self.fps)
    }

    fn open(&mut self) -> Result<Box<dyn FrameStream + '_>> {
        use v4l::buffer::Type;

        // Drop any previous handle before reopening
        self.device = None;
        let device = v4l::Device::with_path(&self.device_path)
            .map_err(|e| AppError::VideoError(format!("open {}: {}", self.device_path, e)))?;
        let resolution = self.configure(&device)?;
        if resolution != self.resolution {
            warn!(
                "{}: requested {}, driver chose {}",
                self.device_path, self.resolution, resolution
            );
        }

        let device = self.device.insert(device);
        let mut stream = v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| AppError::VideoError(format!("{}: create buffers: {}", self.device_path, e)))?;
        stream.set_timeout(CAPTURE_TIMEOUT);

        info!("{}: capturing RGB3 {}", self.device_path, resolution);
        Ok(Box::new(V4l2Stream {
            stream,
            resolution,
            sequence: 0,
            clock: StreamClock::default(),
        }))
    }
}

struct V4l2Stream<'a> {
    stream: v4l::prelude::MmapStream<'a>,
    resolution: Resolution,
    sequence: u64,
    clock: StreamClock,
}

/// Keeps every frame of one stream on one clock
///
/// The first frame decides: with a driver timestamp the stream follows the
/// driver's monotonic clock, and a later frame missing one is placed after
/// the last driver timestamp by the time elapsed since it arrived. Without
/// one the stream counts from its first frame and ignores driver stamps.
#[derive(Debug, Clone, Copy, Default)]
enum StreamClock {
    #[default]
    Unlatched,
    Driver { last: CaptureTimestamp, at: Instant },
    Local { origin: Instant },
}

impl StreamClock {
    fn stamp(&mut self, driver: Option<CaptureTimestamp>, now: Instant) -> CaptureTimestamp {
        match (*self, driver) {
            (Self::Unlatched | Self::Driver { .. }, Some(ts)) => {
                *self = Self::Driver { last: ts, at: now };
                ts
            }
            (Self::Driver { last, at }, None) => last.after(now.saturating_duration_since(at)),
            (Self::Unlatched, None) => {
                *self = Self::Local { origin: now };
                CaptureTimestamp::default()
            }
            (Self::Local { origin }, _) => now.saturating_duration_since(origin).into(),
        }
    }
}

impl FrameStream for V4l2Stream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        loop {
            let (buf, meta) = self
                .stream
                .next()
                .map_err(|e| AppError::VideoError(format!("capture: {}", e)))?;

            let used = (meta.bytesused as usize).min(buf.len());
            let expected = self.resolution.rgb_len();
            if used != expected {
                debug!("Dropping short frame: {} of {} bytes", used, expected);
                continue;
            }

            let driver = (meta.timestamp.sec > 0 || meta.timestamp.usec > 0).then(|| {
                CaptureTimestamp::new(
                    meta.timestamp.sec as u64,
                    (meta.timestamp.usec as u32).saturating_mul(1000),
                )
            });
            let timestamp = self.clock.stamp(driver, Instant::now());

            self.sequence += 1;
            return Ok(Frame::new(
                Bytes::copy_from_slice(&buf[..used]),
                self.resolution,
                timestamp,
                self.sequence,
            ));
        }
    }
}

// ============================================================================
// Test pattern
// ============================================================================

/// Synthetic moving gradient, paced at the configured frame rate
pub struct TestPatternSource {
    resolution: Resolution,
    fps: u32,
}

impl TestPatternSource {
    pub fn new(resolution: Resolution, fps: u32) -> Self {
        Self {
            resolution,
            fps: fps.max(1),
        }
    }
}

impl CaptureSource for TestPatternSource {
    fn describe(&self) -> String {
        format!("test pattern {}@{}", self.resolution, self.fps)
    }

    fn open(&mut self) -> Result<Box<dyn FrameStream + '_>> {
        Ok(Box::new(TestPatternStream {
            resolution: self.resolution,
            interval: Duration::from_secs_f64(1.0 / self.fps as f64),
            next_due: Instant::now(),
            sequence: 0,
        }))
    }
}

struct TestPatternStream {
    resolution: Resolution,
    interval: Duration,
    next_due: Instant,
    sequence: u64,
}

impl TestPatternStream {
    fn render(&self) -> Vec<u8> {
        let Resolution { width, height } = self.resolution;
        let shift = (self.sequence % 256) as u32;
        let mut data = Vec::with_capacity(self.resolution.rgb_len());
        for y in 0..height {
            for x in 0..width {
                data.push(((x * 255 / width.max(1) + shift) % 256) as u8);
                data.push(((y * 255 / height.max(1)) % 256) as u8);
                data.push((255 - shift) as u8);
            }
        }
        data
    }
}

impl FrameStream for TestPatternStream {
    fn next_frame(&mut self) -> Result<Frame> {
        let now = Instant::now();
        if self.next_due > now {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + self.interval;

        let frame = Frame::new(
            Bytes::from(self.render()),
            self.resolution,
            CaptureTimestamp::now(),
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }
}

// ============================================================================
// Capture thread
// ============================================================================

/// Running capture thread
pub struct CaptureHandle {
    stream: StreamId,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Ask the thread to stop after its current frame
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Stop and wait for the thread to exit
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Capture thread for {} panicked", self.stream);
            }
        }
    }
}

/// Spawn the capture thread for `stream`
pub fn spawn_capture(
    stream: StreamId,
    source: Box<dyn CaptureSource>,
    sinks: Arc<VideoSinks>,
    status: StatusBus,
) -> Result<CaptureHandle> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let flag = stop_flag.clone();

    let thread = std::thread::Builder::new()
        .name(format!("capture-{}", stream))
        .spawn(move || capture_loop(stream, source, &sinks, &status, &flag))?;

    Ok(CaptureHandle {
        stream,
        stop_flag,
        thread: Some(thread),
    })
}

fn capture_loop(
    stream: StreamId,
    mut source: Box<dyn CaptureSource>,
    sinks: &VideoSinks,
    status: &StatusBus,
    stop_flag: &AtomicBool,
) {
    let throttler = LogThrottler::with_secs(5);
    let key = format!("capture_{}", stream);
    let mut retry_delay = INITIAL_RETRY_DELAY;
    let description = source.describe();
    info!("Capture thread for {} started ({})", stream, description);

    while !stop_flag.load(Ordering::Relaxed) {
        let err = match source.open() {
            Ok(mut frames) => {
                throttler.clear(&key);
                retry_delay = INITIAL_RETRY_DELAY;
                pump(stream, frames.as_mut(), sinks, stop_flag)
            }
            Err(e) => e,
        };

        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        if throttler.should_log(&key) {
            warn!("Camera {} failed: {}", stream, err);
            status.warn(format!("Camera {} unavailable: {}", stream, err));
        }
        sleep_unless_stopped(retry_delay, stop_flag);
        retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
    }

    info!("Capture thread for {} stopped", stream);
}

/// Feed frames until the stream errors or a stop is requested
fn pump(
    stream: StreamId,
    frames: &mut dyn FrameStream,
    sinks: &VideoSinks,
    stop_flag: &AtomicBool,
) -> AppError {
    let throttler = LogThrottler::with_secs(10);
    while !stop_flag.load(Ordering::Relaxed) {
        match frames.next_frame() {
            Ok(frame) => {
                if sinks.feed(stream, frame) == FeedOutcome::ReplacedStale {
                    warn_throttled!(
                        throttler,
                        "stale",
                        "{} consumer is behind, dropping frames",
                        stream
                    );
                }
            }
            Err(e) => return e,
        }
    }
    AppError::Cancelled(format!("{} capture", stream))
}

fn sleep_unless_stopped(total: Duration, stop_flag: &AtomicBool) {
    let step = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while !stop_flag.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}
