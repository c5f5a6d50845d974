//! Collaborator interfaces the controller drives
//!
//! The robot side (kinematics, actuator publishing) and the fiducial pose
//! solver live outside this crate. The controller only talks to them through
//! these traits.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::pose::Pose;
use super::types::{PerSide, Side};

/// Joint-space seed for the neutral arm pose: lift plus five arm joints
pub type JointSeed = [f64; 6];

/// Commands and queries toward the physical robot
pub trait RobotInterface: Send + Sync {
    /// Publish an end-effector goal. `goal` is `None` when the arm should hold
    /// still; `inactive_goal` still carries where it would go so the robot
    /// side can visualize intent.
    fn publish_goal_pose(
        &self,
        side: Side,
        goal: Option<&Pose>,
        calibration: Option<&Pose>,
        inactive_goal: Option<&Pose>,
    );

    fn publish_gripper(&self, side: Side, position: f64);

    fn publish_head_tilt(&self, pan: f64, tilt: f64);

    fn publish_cmd_vel(&self, linear: f64, angular: f64);

    fn current_ee_pose(&self, side: Side) -> Pose;

    /// Forward kinematics of a joint seed
    fn initial_ee_pose(&self, side: Side, seed: &JointSeed) -> Pose;

    fn on_reset_complete(&self);

    fn on_done(&self);
}

/// Marker detections reported by the operator's browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub camera_matrix: [[f64; 3]; 3],
    pub distortion: Vec<f64>,
    /// Image-space corners, one list per detected marker
    pub corners: Vec<Vec<[f64; 2]>>,
    pub ids: Vec<i64>,
}

/// Turns marker detections into camera-frame goal poses
pub trait PoseSolver: Send + Sync {
    /// `scale` amplifies operator motion; either side may be missing when
    /// its marker is out of view.
    fn solve(&self, observation: &HandObservation, scale: f64) -> PerSide<Option<Pose>>;
}

/// Solver used when no marker solver is linked in. Every observation
/// resolves to "not visible".
#[derive(Debug, Default)]
pub struct NullSolver;

impl PoseSolver for NullSolver {
    fn solve(&self, _observation: &HandObservation, _scale: f64) -> PerSide<Option<Pose>> {
        PerSide::default()
    }
}

/// Simulated robot whose end effectors settle on their commanded goal
/// immediately. Used for bench runs without hardware.
#[derive(Debug, Default)]
pub struct LoopbackRobot {
    state: Mutex<LoopbackState>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    ee: PerSide<Pose>,
    gripper: PerSide<f64>,
    head: (f64, f64),
    cmd_vel: (f64, f64),
}

impl LoopbackRobot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gripper(&self, side: Side) -> f64 {
        self.state.lock().gripper[side]
    }

    pub fn head(&self) -> (f64, f64) {
        self.state.lock().head
    }

    pub fn cmd_vel(&self) -> (f64, f64) {
        self.state.lock().cmd_vel
    }
}

impl RobotInterface for LoopbackRobot {
    fn publish_goal_pose(
        &self,
        side: Side,
        goal: Option<&Pose>,
        _calibration: Option<&Pose>,
        _inactive_goal: Option<&Pose>,
    ) {
        if let Some(goal) = goal {
            self.state.lock().ee[side] = *goal;
        }
    }

    fn publish_gripper(&self, side: Side, position: f64) {
        self.state.lock().gripper[side] = position;
    }

    fn publish_head_tilt(&self, pan: f64, tilt: f64) {
        self.state.lock().head = (pan, tilt);
    }

    fn publish_cmd_vel(&self, linear: f64, angular: f64) {
        self.state.lock().cmd_vel = (linear, angular);
    }

    fn current_ee_pose(&self, side: Side) -> Pose {
        self.state.lock().ee[side]
    }

    fn initial_ee_pose(&self, side: Side, seed: &JointSeed) -> Pose {
        // Crude planar stand-in for forward kinematics: lift sets height,
        // the elbow bend pulls the gripper toward the body.
        let lateral = match side {
            Side::Left => 0.3,
            Side::Right => -0.3,
        };
        let reach = 0.4 * seed[1].abs().cos() + 0.2;
        Pose::from_translation([reach, lateral, seed[0]])
    }

    fn on_reset_complete(&self) {
        tracing::info!("Loopback robot reset complete");
    }

    fn on_done(&self) {
        tracing::info!("Loopback robot done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_settles_on_goal() {
        let robot = LoopbackRobot::new();
        let seed = [0.8, 0.5, -0.5, 0.0, 0.0, 0.0];
        let goal = robot.initial_ee_pose(Side::Left, &seed);
        robot.publish_goal_pose(Side::Left, Some(&goal), None, None);
        assert_eq!(robot.current_ee_pose(Side::Left), goal);
        assert_eq!(robot.current_ee_pose(Side::Right), Pose::identity());
    }

    #[test]
    fn test_inactive_goal_does_not_move() {
        let robot = LoopbackRobot::new();
        let goal = Pose::from_translation([1.0, 0.0, 0.0]);
        robot.publish_goal_pose(Side::Right, None, None, Some(&goal));
        assert_eq!(robot.current_ee_pose(Side::Right), Pose::identity());
    }
}
