use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::video::StreamId;
use crate::webrtc::WebRtcConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// ICE servers
    pub webrtc: WebRtcConfig,
    /// Camera capture and relay settings
    pub video: VideoConfig,
    /// Teleoperation tuning
    pub teleop: TeleopConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.video.validate()?;
        self.teleop.validate()
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
    /// Directory holding the operator UI
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9443,
            static_dir: "static".to_string(),
        }
    }
}

/// Where a stream's frames come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureSourceConfig {
    /// V4L2 device node
    V4l2 { device: String },
    /// Synthetic moving gradient
    TestPattern,
    /// Stream is not fed
    Disabled,
}

/// Per-stream capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub stream: StreamId,
    pub source: CaptureSourceConfig,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureConfig {
    fn v4l2(stream: StreamId, width: u32, height: u32) -> Self {
        Self {
            stream,
            source: CaptureSourceConfig::V4l2 {
                device: format!("/dev/video_{}", stream),
            },
            width,
            height,
            fps: 30,
        }
    }
}

/// Video relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Media clock rate in Hz
    pub clock_rate: u32,
    /// Bump a frame whose media timestamp does not advance by one tick
    pub strict_timestamps: bool,
    pub streams: Vec<CaptureConfig>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            clock_rate: 90_000,
            strict_timestamps: true,
            streams: vec![
                CaptureConfig::v4l2(StreamId::Head, 1280, 720),
                CaptureConfig::v4l2(StreamId::WristLeft, 640, 360),
                CaptureConfig::v4l2(StreamId::WristRight, 640, 360),
            ],
        }
    }
}

impl VideoConfig {
    fn validate(&self) -> Result<()> {
        if self.clock_rate == 0 {
            return Err(AppError::Config("video.clock_rate must be > 0".into()));
        }
        for (i, s) in self.streams.iter().enumerate() {
            if self.streams[..i].iter().any(|o| o.stream == s.stream) {
                return Err(AppError::Config(format!(
                    "video stream '{}' configured twice",
                    s.stream
                )));
            }
            if s.width == 0 || s.height == 0 || s.fps == 0 {
                return Err(AppError::Config(format!(
                    "video stream '{}' needs non-zero width, height and fps",
                    s.stream
                )));
            }
        }
        Ok(())
    }

    pub fn stream(&self, id: StreamId) -> Option<&CaptureConfig> {
        self.streams.iter().find(|s| s.stream == id)
    }
}

/// Teleoperation tuning constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopConfig {
    /// Pedal dead zone around the axis centre
    pub dead_zone: f64,
    /// Fully open gripper position (m)
    pub gripper_max: f64,
    /// Lift height after a full reset (m)
    pub initial_lift: f64,
    pub lift_min: f64,
    pub lift_max: f64,
    /// Lift speed at full pedal deflection (m/s)
    pub lift_vel_max: f64,
    /// Integration step for pedal-driven lift (s)
    pub pedal_tick_secs: f64,
    pub linear_vel_max: f64,
    pub angular_vel_max: f64,
    /// Low-pass coefficients toward each new pose sample
    pub low_pass_position: f64,
    pub low_pass_rotation: f64,
    /// Polling period of calibration and reset waits (ms)
    pub poll_interval_ms: u64,
    /// Reset converges once both arms are this close (m / rad)
    pub reset_position_tolerance: f64,
    pub reset_rotation_tolerance: f64,
    /// Head tilt while driving the base (rad)
    pub far_seeing_tilt: f64,
    /// Head tilt calibration points `(lift m, tilt rad)`
    pub head_tilt_low: (f64, f64),
    pub head_tilt_high: (f64, f64),
    /// Elbow bend for the arm-teleop neutral pose (rad)
    pub arm_elbow_bend: f64,
    /// Elbow bend for the base-drive tucked pose (rad)
    pub base_elbow_bend: f64,
    /// Give up waiting for both markers after this long; 0 waits forever
    pub calibration_timeout_secs: u64,
    /// Give up waiting for the arms to settle after this long; 0 waits forever
    pub reset_timeout_secs: u64,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.1,
            gripper_max: 0.055,
            initial_lift: 0.8,
            lift_min: 0.0,
            lift_max: 1.2,
            lift_vel_max: 0.5,
            pedal_tick_secs: 0.1,
            linear_vel_max: 1.0,
            angular_vel_max: 1.0,
            low_pass_position: 0.1,
            low_pass_rotation: 0.1,
            poll_interval_ms: 100,
            reset_position_tolerance: 0.02,
            reset_rotation_tolerance: 0.03,
            far_seeing_tilt: 0.26,
            head_tilt_low: (0.0, 1.36),
            head_tilt_high: (0.8, 1.06),
            arm_elbow_bend: std::f64::consts::FRAC_PI_4,
            base_elbow_bend: std::f64::consts::FRAC_PI_2 * 0.9,
            calibration_timeout_secs: 60,
            reset_timeout_secs: 30,
        }
    }
}

impl TeleopConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.dead_zone) {
            return Err(AppError::Config("teleop.dead_zone must be in [0, 0.5)".into()));
        }
        if self.lift_min > self.lift_max {
            return Err(AppError::Config("teleop.lift_min exceeds lift_max".into()));
        }
        if !(self.lift_min..=self.lift_max).contains(&self.initial_lift) {
            return Err(AppError::Config(
                "teleop.initial_lift outside lift range".into(),
            ));
        }
        if self.head_tilt_low.0 == self.head_tilt_high.0 {
            return Err(AppError::Config(
                "teleop head tilt calibration points share a lift value".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("teleop.poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Head tilt for a lift height, linear through the two calibration
    /// points and extrapolated outside them
    pub fn head_tilt(&self, lift: f64) -> f64 {
        let (l0, t0) = self.head_tilt_low;
        let (l1, t1) = self.head_tilt_high;
        t0 + (t1 - t0) * (lift - l0) / (l1 - l0)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn calibration_timeout(&self) -> Option<std::time::Duration> {
        (self.calibration_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.calibration_timeout_secs))
    }

    pub fn reset_timeout(&self) -> Option<std::time::Duration> {
        (self.reset_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.reset_timeout_secs))
    }
}
