//! Operator control tokens

use std::str::FromStr;

use super::types::{PrecisionTier, Side, TeleopMode};
use crate::error::AppError;

/// Command received on the `control` channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Drive both arms to neutral, then notify the robot side
    Reset,
    Done,
    SetMode(TeleopMode),
    SetPrecision(PrecisionTier),
    LockGripper(Side),
}

impl FromStr for ControlCommand {
    type Err = AppError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let cmd = match token {
            "reset" => Self::Reset,
            "done" => Self::Done,
            "teleop_mode_none" => Self::SetMode(TeleopMode::Idle),
            "teleop_mode_base" => Self::SetMode(TeleopMode::BaseDrive),
            "teleop_mode_arm" => Self::SetMode(TeleopMode::ArmTeleop),
            "precise_mode_false" => Self::SetPrecision(PrecisionTier::Normal),
            "precise_mode_true" => Self::SetPrecision(PrecisionTier::Precise),
            "precise_mode_more_precise" => Self::SetPrecision(PrecisionTier::MorePrecise),
            "gripper_lock_left" => Self::LockGripper(Side::Left),
            "gripper_lock_right" => Self::LockGripper(Side::Right),
            other => return Err(AppError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

impl ControlCommand {
    /// Wire token
    pub fn token(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Done => "done",
            Self::SetMode(TeleopMode::Idle) => "teleop_mode_none",
            Self::SetMode(TeleopMode::BaseDrive) => "teleop_mode_base",
            Self::SetMode(TeleopMode::ArmTeleop) => "teleop_mode_arm",
            Self::SetPrecision(PrecisionTier::Normal) => "precise_mode_false",
            Self::SetPrecision(PrecisionTier::Precise) => "precise_mode_true",
            Self::SetPrecision(PrecisionTier::MorePrecise) => "precise_mode_more_precise",
            Self::LockGripper(Side::Left) => "gripper_lock_left",
            Self::LockGripper(Side::Right) => "gripper_lock_right",
        }
    }
}
