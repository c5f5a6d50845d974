//! Teleoperation control
//!
//! Hand poses, pedal axes and control tokens from the operator are turned
//! into end-effector goals, gripper positions, head tilt and base velocity.

pub mod command;
pub mod controller;
pub mod pedal;
pub mod pose;
pub mod robot;
pub mod types;

pub use command::ControlCommand;
pub use controller::{ControllerSnapshot, TeleopController};
pub use pedal::{GripperLock, GripperLockState, LiftIntegrator, LiftStep, PEDAL_AXES};
pub use pose::{Pose, Quaternion};
pub use robot::{HandObservation, JointSeed, LoopbackRobot, NullSolver, PoseSolver, RobotInterface};
pub use types::{mode_banner, PerSide, PrecisionTier, Side, TeleopMode};
