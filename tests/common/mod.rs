#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use teleop_relay::config::TeleopConfig;
use teleop_relay::events::StatusBus;
use teleop_relay::teleop::{
    HandObservation, JointSeed, PerSide, Pose, PoseSolver, RobotInterface, Side, TeleopController,
};

/// One `publish_goal_pose` call
#[derive(Debug, Clone, Copy)]
pub struct GoalCall {
    pub side: Side,
    pub goal: Option<Pose>,
    pub calibration: Option<Pose>,
}

/// Robot whose end effectors settle on the commanded goal immediately and
/// which records everything it was told
#[derive(Default)]
pub struct ScriptedRobot {
    ee: Mutex<PerSide<Pose>>,
    pub goals: Mutex<Vec<GoalCall>>,
    pub grippers: Mutex<Vec<(Side, f64)>>,
    pub head: Mutex<Vec<(f64, f64)>>,
    pub cmd_vel: Mutex<Vec<(f64, f64)>>,
    pub resets: Mutex<usize>,
}

impl ScriptedRobot {
    pub fn ee(&self, side: Side) -> Pose {
        self.ee.lock()[side]
    }

    pub fn calibrated_goals(&self) -> Vec<GoalCall> {
        self.goals
            .lock()
            .iter()
            .filter(|c| c.calibration.is_some())
            .copied()
            .collect()
    }

    pub fn last_gripper(&self, side: Side) -> Option<f64> {
        self.grippers
            .lock()
            .iter()
            .rev()
            .find(|(s, _)| *s == side)
            .map(|(_, p)| *p)
    }
}

impl RobotInterface for ScriptedRobot {
    fn publish_goal_pose(
        &self,
        side: Side,
        goal: Option<&Pose>,
        calibration: Option<&Pose>,
        _inactive_goal: Option<&Pose>,
    ) {
        if let Some(goal) = goal {
            self.ee.lock()[side] = *goal;
        }
        self.goals.lock().push(GoalCall {
            side,
            goal: goal.copied(),
            calibration: calibration.copied(),
        });
    }

    fn publish_gripper(&self, side: Side, position: f64) {
        self.grippers.lock().push((side, position));
    }

    fn publish_head_tilt(&self, pan: f64, tilt: f64) {
        self.head.lock().push((pan, tilt));
    }

    fn publish_cmd_vel(&self, linear: f64, angular: f64) {
        self.cmd_vel.lock().push((linear, angular));
    }

    fn current_ee_pose(&self, side: Side) -> Pose {
        self.ee.lock()[side]
    }

    fn initial_ee_pose(&self, side: Side, seed: &JointSeed) -> Pose {
        let lateral = match side {
            Side::Left => 0.3,
            Side::Right => -0.3,
        };
        // Bending the elbow pulls the gripper toward the body
        let reach = 0.3 + 0.2 * seed[1].abs().cos();
        Pose::from_translation([reach, lateral, seed[0]])
    }

    fn on_reset_complete(&self) {
        *self.resets.lock() += 1;
    }

    fn on_done(&self) {}
}

/// Solver that returns whatever the test scripted last
#[derive(Default)]
pub struct ScriptedSolver {
    next: Mutex<PerSide<Option<Pose>>>,
}

impl ScriptedSolver {
    pub fn show(&self, left: Option<Pose>, right: Option<Pose>) {
        *self.next.lock() = PerSide::new(left, right);
    }
}

impl PoseSolver for ScriptedSolver {
    fn solve(&self, _observation: &HandObservation, _scale: f64) -> PerSide<Option<Pose>> {
        *self.next.lock()
    }
}

pub struct Rig {
    pub robot: Arc<ScriptedRobot>,
    pub solver: Arc<ScriptedSolver>,
    pub status: StatusBus,
    pub controller: Arc<TeleopController>,
}

pub fn rig() -> Rig {
    let robot = Arc::new(ScriptedRobot::default());
    let solver = Arc::new(ScriptedSolver::default());
    let status = StatusBus::new();
    let controller = TeleopController::spawn(
        robot.clone(),
        solver.clone(),
        status.clone(),
        TeleopConfig::default(),
    );
    Rig {
        robot,
        solver,
        status,
        controller,
    }
}

pub fn observation() -> HandObservation {
    HandObservation {
        camera_matrix: [[600.0, 0.0, 320.0], [0.0, 600.0, 240.0], [0.0, 0.0, 1.0]],
        distortion: vec![0.0; 5],
        corners: vec![vec![[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0]]],
        ids: vec![0],
    }
}

/// Wait (in paused time) until no control command is queued or running
pub async fn settle(controller: &TeleopController) {
    while !controller.is_idle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn last_head_tilt(robot: &ScriptedRobot) -> f64 {
    robot.head.lock().last().map(|(_, tilt)| *tilt).unwrap_or(f64::NAN)
}

pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

pub fn assert_pose_close(a: &Pose, b: &Pose) {
    for i in 0..3 {
        assert_close(a.position[i], b.position[i]);
    }
    assert!(a.rotation_distance(b) < 1e-9);
}
