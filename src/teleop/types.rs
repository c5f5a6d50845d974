//! Teleoperation state types

use serde::{Deserialize, Serialize};

/// Arm side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, left first
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per arm side
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerSide<T> {
    pub left: T,
    pub right: T,
}

impl<T> PerSide<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Side, T) -> U) -> PerSide<U> {
        PerSide {
            left: f(Side::Left, self.left),
            right: f(Side::Right, self.right),
        }
    }
}

impl<T> std::ops::Index<Side> for PerSide<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        self.get(side)
    }
}

impl<T> std::ops::IndexMut<Side> for PerSide<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        self.get_mut(side)
    }
}

/// Which robot subsystem the pedals currently drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeleopMode {
    #[default]
    Idle,
    BaseDrive,
    ArmTeleop,
}

/// Motion-scale setting for arm teleoperation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionTier {
    #[default]
    Normal,
    Precise,
    MorePrecise,
}

impl PrecisionTier {
    /// Pose samples are low-pass filtered above `Normal`
    pub fn filters_pose(&self) -> bool {
        *self > PrecisionTier::Normal
    }

    /// Amplification handed to the pose solver
    pub fn solver_scale(&self) -> f64 {
        match self {
            PrecisionTier::MorePrecise => 0.5,
            _ => 1.0,
        }
    }
}

/// Operator-facing description of the active mode
pub fn mode_banner(mode: TeleopMode, tier: PrecisionTier) -> &'static str {
    match (mode, tier) {
        (TeleopMode::Idle, _) => "Teleop Mode: None",
        (TeleopMode::BaseDrive, _) => "Teleop Mode: Base Move",
        (TeleopMode::ArmTeleop, PrecisionTier::Normal) => "Teleop Mode: Arm Move",
        (TeleopMode::ArmTeleop, PrecisionTier::Precise) => "Teleop Mode: Precise Arm Move",
        (TeleopMode::ArmTeleop, PrecisionTier::MorePrecise) => {
            "Teleop Mode: More Precise Arm Move"
        }
    }
}
