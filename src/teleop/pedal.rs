//! Pedal axis interpretation
//!
//! Four analog axes arrive in `[0, 1]`. Their meaning depends on the
//! teleoperation mode:
//!
//! | axis | ArmTeleop      | BaseDrive    |
//! |------|----------------|--------------|
//! | 0    | left gripper   | angular +    |
//! | 1    | lift down      | angular -    |
//! | 2    | lift up        | linear -     |
//! | 3    | right gripper  | linear +     |

use serde::{Deserialize, Serialize};

/// Number of pedal axes
pub const PEDAL_AXES: usize = 4;

/// Rescale a raw axis value so deflection within `dead_zone` of the centre
/// is compressed and the outer range is stretched back to `[0, 1]`.
pub fn apply_dead_zone(raw: f64, dead_zone: f64) -> f64 {
    ((raw - 0.5) / (0.5 - dead_zone) * 0.5 + 0.5).clamp(0.0, 1.0)
}

/// Apply [`apply_dead_zone`] to every axis
pub fn clip_axes(raw: [f64; PEDAL_AXES], dead_zone: f64) -> [f64; PEDAL_AXES] {
    raw.map(|v| apply_dead_zone(v, dead_zone))
}

/// Arm-mode axis assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmPedals {
    pub left_gripper: f64,
    pub lift_down: f64,
    pub lift_up: f64,
    pub right_gripper: f64,
}

impl From<[f64; PEDAL_AXES]> for ArmPedals {
    fn from(v: [f64; PEDAL_AXES]) -> Self {
        Self {
            left_gripper: v[0],
            lift_down: v[1],
            lift_up: v[2],
            right_gripper: v[3],
        }
    }
}

/// Base-mode axis assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasePedals {
    pub angular_pos: f64,
    pub angular_neg: f64,
    pub linear_neg: f64,
    pub linear_pos: f64,
}

impl From<[f64; PEDAL_AXES]> for BasePedals {
    fn from(v: [f64; PEDAL_AXES]) -> Self {
        Self {
            angular_pos: v[0],
            angular_neg: v[1],
            linear_neg: v[2],
            linear_pos: v[3],
        }
    }
}

impl BasePedals {
    /// `(linear, angular)` velocity command. Turning is mirrored while
    /// reversing so the pedal that turns left still turns the nose left.
    pub fn velocity(&self, linear_max: f64, angular_max: f64) -> (f64, f64) {
        let linear = (self.linear_pos - self.linear_neg) * linear_max;
        let sign = if linear < 0.0 { -1.0 } else { 1.0 };
        let angular = (self.angular_pos - self.angular_neg) * angular_max * sign;
        (linear, angular)
    }
}

/// Gripper opening commanded by a pedal value (pressed = closed)
pub fn gripper_position(axis: f64, gripper_max: f64) -> f64 {
    (1.0 - axis) * gripper_max
}

/// Hysteresis state of a gripper lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GripperLockState {
    #[default]
    Unlocked,
    Locked,
    ReadyToUnlock,
}

/// Freezes a gripper at its current opening until the operator releases the
/// pedal and then presses back down to the frozen grip.
#[derive(Debug, Clone, Copy)]
pub struct GripperLock {
    state: GripperLockState,
    frozen: f64,
    release_threshold: f64,
}

impl GripperLock {
    /// `gripper_max` is the fully open position; release is detected above
    /// 90% of it.
    pub fn new(gripper_max: f64) -> Self {
        Self {
            state: GripperLockState::Unlocked,
            frozen: gripper_max,
            release_threshold: 0.9 * gripper_max,
        }
    }

    pub fn state(&self) -> GripperLockState {
        self.state
    }

    pub fn frozen(&self) -> f64 {
        self.frozen
    }

    /// Freeze at the last commanded position
    pub fn lock(&mut self) {
        if self.state == GripperLockState::Unlocked {
            self.state = GripperLockState::Locked;
        }
    }

    /// Feed the live pedal-derived position, get the position to command
    pub fn update(&mut self, live: f64) -> f64 {
        match self.state {
            GripperLockState::Unlocked => {
                self.frozen = live;
            }
            GripperLockState::Locked => {
                if live > self.release_threshold {
                    self.state = GripperLockState::ReadyToUnlock;
                }
            }
            GripperLockState::ReadyToUnlock => {
                if live <= self.frozen {
                    self.state = GripperLockState::Unlocked;
                    self.frozen = live;
                }
            }
        }
        self.frozen
    }
}

/// Tracks the robot lift height from integrated pedal velocity
#[derive(Debug, Clone, Copy)]
pub struct LiftIntegrator {
    distance: f64,
    min: f64,
    max: f64,
}

/// Result of one lift integration tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiftStep {
    /// Lift moved by the given delta
    Moved(f64),
    /// No pedal input
    Idle,
    /// The delta would leave the travel range; nothing changed
    OverLimit,
}

/// Slack for accumulated floating-point error at the travel limits
const LIFT_EPSILON: f64 = 1e-9;

impl LiftIntegrator {
    pub fn new(distance: f64, min: f64, max: f64) -> Self {
        Self { distance, min, max }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
    }

    /// Integrate `velocity` over `dt` seconds
    pub fn step(&mut self, velocity: f64, dt: f64) -> LiftStep {
        let change = velocity * dt;
        let next = self.distance + change;
        if next < self.min - LIFT_EPSILON || next > self.max + LIFT_EPSILON {
            LiftStep::OverLimit
        } else if change != 0.0 {
            self.distance = next;
            LiftStep::Moved(change)
        } else {
            LiftStep::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRIPPER_MAX: f64 = 0.055;

    #[test]
    fn test_dead_zone_endpoints_and_centre() {
        for dz in [0.01, 0.1, 0.25, 0.49] {
            assert!((apply_dead_zone(0.5, dz) - 0.5).abs() < 1e-12);
            assert_eq!(apply_dead_zone(0.0, dz), 0.0);
            assert_eq!(apply_dead_zone(1.0, dz), 1.0);
        }
    }

    #[test]
    fn test_dead_zone_stretches() {
        // 0.1 dead zone: raw 0.95 already saturates
        assert_eq!(apply_dead_zone(0.95, 0.1), 1.0);
        assert_eq!(apply_dead_zone(0.05, 0.1), 0.0);
        assert!((apply_dead_zone(0.7, 0.1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_base_velocity_reverse_mirrors_turn() {
        let fwd = BasePedals::from([1.0, 0.0, 0.0, 0.5]);
        assert_eq!(fwd.velocity(1.0, 1.0), (0.5, 1.0));

        let rev = BasePedals::from([1.0, 0.0, 0.5, 0.0]);
        assert_eq!(rev.velocity(1.0, 1.0), (-0.5, -1.0));
    }

    #[test]
    fn test_gripper_position() {
        assert_eq!(gripper_position(0.0, GRIPPER_MAX), GRIPPER_MAX);
        assert_eq!(gripper_position(1.0, GRIPPER_MAX), 0.0);
    }

    #[test]
    fn test_gripper_lock_hysteresis_trace() {
        let mut lock = GripperLock::new(GRIPPER_MAX);

        // Operator squeezes to 0.02 while unlocked
        assert_eq!(lock.update(0.03), 0.03);
        assert_eq!(lock.update(0.02), 0.02);

        lock.lock();
        assert_eq!(lock.state(), GripperLockState::Locked);

        // Pedal released: live opens, command stays frozen
        let trace = [0.03, 0.045, 0.049];
        for live in trace {
            assert_eq!(lock.update(live), 0.02);
            assert_eq!(lock.state(), GripperLockState::Locked);
        }
        assert_eq!(lock.update(0.054), 0.02);
        assert_eq!(lock.state(), GripperLockState::ReadyToUnlock);

        // Pressing back down, still above the frozen grip
        for live in [0.05, 0.03, 0.021] {
            assert_eq!(lock.update(live), 0.02);
            assert_eq!(lock.state(), GripperLockState::ReadyToUnlock);
        }

        // Reaches the frozen grip: unlock and follow the pedal again
        assert_eq!(lock.update(0.019), 0.019);
        assert_eq!(lock.state(), GripperLockState::Unlocked);
        assert_eq!(lock.update(0.01), 0.01);
    }

    #[test]
    fn test_lock_is_idempotent_while_locked() {
        let mut lock = GripperLock::new(GRIPPER_MAX);
        lock.update(0.01);
        lock.lock();
        lock.update(0.055);
        assert_eq!(lock.state(), GripperLockState::ReadyToUnlock);
        lock.lock();
        assert_eq!(lock.state(), GripperLockState::ReadyToUnlock);
    }

    #[test]
    fn test_lift_integration_clamps_at_max() {
        let mut lift = LiftIntegrator::new(0.8, 0.0, 1.2);
        for i in 1..=8 {
            assert!(matches!(lift.step(0.5, 0.1), LiftStep::Moved(_)));
            assert!((lift.distance() - (0.8 + 0.05 * i as f64)).abs() < 1e-9);
        }
        assert!((lift.distance() - 1.2).abs() < 1e-9);

        for _ in 0..3 {
            assert_eq!(lift.step(0.5, 0.1), LiftStep::OverLimit);
            assert!((lift.distance() - 1.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_lift_rejects_below_min() {
        let mut lift = LiftIntegrator::new(0.0, 0.0, 1.2);
        assert_eq!(lift.step(-0.5, 0.1), LiftStep::OverLimit);
        assert_eq!(lift.distance(), 0.0);
        assert_eq!(lift.step(0.0, 0.1), LiftStep::Idle);
    }
}
