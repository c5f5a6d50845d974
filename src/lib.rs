//! teleop-relay - camera relay and teleoperation bridge
//!
//! Streams three robot cameras to a single browser operator over WebRTC and
//! turns the operator's hand poses, pedal axes and control commands into
//! robot motion.

pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod teleop;
pub mod utils;
pub mod video;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
