//! Teleoperation controller
//!
//! Turns operator input into robot commands. Hand and pedal messages are
//! handled inline on the caller's task under a short lock. Control commands
//! are queued to a dedicated task and run one at a time, so a reset or
//! calibration wait never stalls hand or pedal dispatch.
//!
//! Calibration pins the operator's current gesture to the robot's current
//! end-effector pose:
//!
//! ```text
//! side_to_camera = current_ee_pose(side) * inverse(last_goal(side))
//! robot_goal     = side_to_camera * last_goal(side)
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::ControlCommand;
use super::pedal::{
    clip_axes, gripper_position, ArmPedals, BasePedals, GripperLock, GripperLockState,
    LiftIntegrator, LiftStep, PEDAL_AXES,
};
use super::pose::Pose;
use super::robot::{HandObservation, JointSeed, PoseSolver, RobotInterface};
use super::types::{mode_banner, PerSide, PrecisionTier, Side, TeleopMode};
use crate::config::TeleopConfig;
use crate::error::{AppError, Result};
use crate::events::StatusBus;
use crate::utils::LogThrottler;
use crate::webrtc::TeleopHandler;

/// Read-only view of the controller state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSnapshot {
    pub mode: TeleopMode,
    pub tier: PrecisionTier,
    pub lift: f64,
    pub calibrated: PerSide<bool>,
    pub gripper_locks: PerSide<GripperLockState>,
}

struct ControllerState {
    mode: TeleopMode,
    tier: PrecisionTier,
    /// `side_to_camera` per side
    calibration: PerSide<Option<Pose>>,
    /// Latest (filtered) camera-frame goal per side
    last_goal: PerSide<Option<Pose>>,
    grippers: PerSide<GripperLock>,
    lift: LiftIntegrator,
    /// Bumped whenever the tier or calibration restarts; hand samples
    /// solved under an older epoch are dropped
    epoch: u64,
}

impl ControllerState {
    fn set_tier(&mut self, tier: PrecisionTier) {
        self.tier = tier;
        self.epoch += 1;
    }

    fn restart_calibration(&mut self) {
        self.calibration = PerSide::default();
        self.last_goal = PerSide::default();
        self.epoch += 1;
    }
}

type QueuedCommand = (ControlCommand, CancellationToken);

/// Commands computed under the state lock, published after it is released
#[derive(Default)]
struct Outbox {
    goals: Vec<(Side, Pose, Pose)>,
    grippers: Vec<(Side, f64)>,
    head_tilt: Option<f64>,
    cmd_vel: Option<(f64, f64)>,
    warnings: Vec<AppError>,
}

/// The teleoperation state machine
pub struct TeleopController {
    robot: Arc<dyn RobotInterface>,
    solver: Arc<dyn PoseSolver>,
    status: StatusBus,
    config: TeleopConfig,
    state: Mutex<ControllerState>,
    commands: mpsc::UnboundedSender<QueuedCommand>,
    /// Cancelled when the operator session closes, then replaced
    session_token: Mutex<CancellationToken>,
    pending: AtomicUsize,
    warn_throttle: LogThrottler,
}

impl TeleopController {
    /// Create the controller and start its control task
    pub fn spawn(
        robot: Arc<dyn RobotInterface>,
        solver: Arc<dyn PoseSolver>,
        status: StatusBus,
        config: TeleopConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ControllerState {
            mode: TeleopMode::Idle,
            tier: PrecisionTier::Normal,
            calibration: PerSide::default(),
            last_goal: PerSide::default(),
            grippers: PerSide::new(
                GripperLock::new(config.gripper_max),
                GripperLock::new(config.gripper_max),
            ),
            lift: LiftIntegrator::new(config.initial_lift, config.lift_min, config.lift_max),
            epoch: 0,
        };

        let controller = Arc::new(Self {
            robot,
            solver,
            status,
            config,
            state: Mutex::new(state),
            commands: tx,
            session_token: Mutex::new(CancellationToken::new()),
            pending: AtomicUsize::new(0),
            warn_throttle: LogThrottler::with_secs(1),
        });

        tokio::spawn(Self::control_loop(Arc::downgrade(&controller), rx));
        controller
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.lock();
        ControllerSnapshot {
            mode: state.mode,
            tier: state.tier,
            lift: state.lift.distance(),
            calibrated: PerSide::new(
                state.calibration.left.is_some(),
                state.calibration.right.is_some(),
            ),
            gripper_locks: PerSide::new(
                state.grippers.left.state(),
                state.grippers.right.state(),
            ),
        }
    }

    /// Current `side_to_camera` transform
    pub fn calibration(&self, side: Side) -> Option<Pose> {
        self.state.lock().calibration[side]
    }

    /// No control command is queued or running
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// Report an inverse kinematics failure from the robot layer. Safe to
    /// call from any thread.
    pub fn report_ik_failure(&self, side: Side) {
        info!("IK failed: {}", side);
        self.status.warn(format!("IK failed: {}", side));
    }

    // ========================================================================
    // Hand and pedal input
    // ========================================================================

    fn handle_hand(&self, observation: &HandObservation) {
        let (scale, epoch) = {
            let state = self.state.lock();
            (state.tier.solver_scale(), state.epoch)
        };
        let solved = self.solver.solve(observation, scale);

        let mut out = Outbox::default();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                debug!("Dropping hand sample solved before a tier or calibration change");
                return;
            }
            let filter = state.tier.filters_pose();

            for side in Side::ALL {
                let Some(sample) = solved[side] else {
                    continue;
                };
                let goal = match state.last_goal[side] {
                    Some(last) if filter => last.low_pass(
                        &sample,
                        self.config.low_pass_position,
                        self.config.low_pass_rotation,
                    ),
                    _ => sample,
                };
                state.last_goal[side] = Some(goal);
            }

            if state.mode == TeleopMode::ArmTeleop {
                for side in Side::ALL {
                    match (state.last_goal[side], state.calibration[side]) {
                        (None, _) => out.warnings.push(AppError::MarkerNotVisible(side)),
                        (Some(_), None) => out.warnings.push(AppError::NotCalibrated(side)),
                        (Some(goal), Some(calibration)) => {
                            out.goals.push((side, calibration.compose(&goal), calibration))
                        }
                    }
                }
                out.head_tilt = Some(self.config.head_tilt(state.lift.distance()));
            }
        }

        self.publish(out);
    }

    fn handle_pedal(&self, values: [f64; PEDAL_AXES]) {
        let axes = clip_axes(values, self.config.dead_zone);

        let mut out = Outbox::default();
        {
            let mut state = self.state.lock();
            match state.mode {
                TeleopMode::Idle => return,
                TeleopMode::ArmTeleop => {
                    let pedals = ArmPedals::from(axes);
                    let velocity = (pedals.lift_up - pedals.lift_down) * self.config.lift_vel_max;
                    match state.lift.step(velocity, self.config.pedal_tick_secs) {
                        LiftStep::Moved(delta) => {
                            for side in Side::ALL {
                                if let Some(c) = state.calibration[side].as_mut() {
                                    c.position[2] += delta;
                                }
                            }
                            debug!("lift_distance changed: {:.3}", state.lift.distance());
                        }
                        LiftStep::OverLimit => {
                            out.warnings
                                .push(AppError::OutOfRange("Lift over limit".to_string()));
                        }
                        LiftStep::Idle => {}
                    }

                    for (side, axis) in [
                        (Side::Left, pedals.left_gripper),
                        (Side::Right, pedals.right_gripper),
                    ] {
                        let live = gripper_position(axis, self.config.gripper_max);
                        let commanded = state.grippers[side].update(live);
                        out.grippers.push((side, commanded));
                    }
                }
                TeleopMode::BaseDrive => {
                    out.cmd_vel = Some(BasePedals::from(axes).velocity(
                        self.config.linear_vel_max,
                        self.config.angular_vel_max,
                    ));
                    out.head_tilt = Some(self.config.far_seeing_tilt);
                }
            }
        }

        self.publish(out);
    }

    fn publish(&self, out: Outbox) {
        for error in out.warnings {
            let message = match &error {
                AppError::OutOfRange(what) => what.clone(),
                other => other.to_string(),
            };
            if self.warn_throttle.should_log(&message) {
                warn!("{}", message);
                self.status.warn(message);
            }
        }
        for (side, goal, calibration) in &out.goals {
            self.robot
                .publish_goal_pose(*side, Some(goal), Some(calibration), Some(goal));
        }
        for (side, position) in out.grippers {
            self.robot.publish_gripper(side, position);
        }
        if let Some((linear, angular)) = out.cmd_vel {
            self.robot.publish_cmd_vel(linear, angular);
        }
        if let Some(tilt) = out.head_tilt {
            self.robot.publish_head_tilt(0.0, tilt);
        }
    }

    // ========================================================================
    // Control commands
    // ========================================================================

    fn enqueue(&self, token: &str) {
        info!("Cmd: {}", token);
        self.status.info(format!("Cmd: {}", token));

        let command = match token.parse::<ControlCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                self.status.warn(e.to_string());
                return;
            }
        };

        let cancel = self.session_token.lock().clone();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.commands.send((command, cancel)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Control task is gone, dropping {}", command.token());
        }
    }

    async fn control_loop(controller: Weak<Self>, mut rx: mpsc::UnboundedReceiver<QueuedCommand>) {
        while let Some((command, cancel)) = rx.recv().await {
            let Some(controller) = controller.upgrade() else {
                break;
            };

            if cancel.is_cancelled() {
                debug!("Skipping {} queued by a closed session", command.token());
            } else if let Err(e) = controller.execute(command, &cancel).await {
                warn!("{} aborted: {}", command.token(), e);
                if !matches!(e, AppError::Cancelled(_)) {
                    controller.status.warn(format!("{} aborted: {}", command.token(), e));
                }
            }
            controller.pending.fetch_sub(1, Ordering::SeqCst);
        }
        debug!("Control task stopped");
    }

    async fn execute(&self, command: ControlCommand, cancel: &CancellationToken) -> Result<()> {
        let cfg = &self.config;
        match command {
            ControlCommand::Reset => {
                self.set_mode(TeleopMode::Idle, cancel)?;
                self.reset_arm(cfg.initial_lift, cfg.arm_elbow_bend, false, cancel)
                    .await?;
                self.commit(cancel, "reset", |_| ())?;
                self.robot.on_reset_complete();
                info!("Reset event");
                self.status.info("Reset event");
            }
            ControlCommand::Done => {
                self.robot.on_done();
                info!("Done event");
                self.status.info("Done event");
            }
            ControlCommand::SetMode(TeleopMode::Idle) => self.set_mode(TeleopMode::Idle, cancel)?,
            ControlCommand::SetMode(TeleopMode::BaseDrive) => {
                self.set_mode(TeleopMode::Idle, cancel)?;
                let lift = self.state.lock().lift.distance();
                self.reset_arm(lift, cfg.base_elbow_bend, true, cancel).await?;
                self.set_mode(TeleopMode::BaseDrive, cancel)?;
            }
            ControlCommand::SetMode(TeleopMode::ArmTeleop) => {
                self.set_mode(TeleopMode::Idle, cancel)?;
                let lift = self.state.lock().lift.distance();
                self.reset_arm(lift, cfg.arm_elbow_bend, false, cancel).await?;
                self.commit(cancel, "tier change", |s| s.set_tier(PrecisionTier::Precise))?;
                self.recalibrate(cancel).await?;
                self.set_mode(TeleopMode::ArmTeleop, cancel)?;
            }
            ControlCommand::SetPrecision(tier) => {
                self.set_mode(TeleopMode::Idle, cancel)?;
                self.commit(cancel, "tier change", |s| s.set_tier(tier))?;
                self.recalibrate(cancel).await?;
                self.set_mode(TeleopMode::ArmTeleop, cancel)?;
            }
            ControlCommand::LockGripper(side) => {
                self.commit(cancel, "gripper lock", |s| s.grippers[side].lock())?;
                info!("Gripper {} locked", side);
                self.status.info(format!("Gripper {} locked", side));
            }
        }
        Ok(())
    }

    /// Apply `f` to the state unless `cancel` has fired. Check and write
    /// share one lock hold; `on_session_closed` cancels before it locks.
    fn commit<R>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        f: impl FnOnce(&mut ControllerState) -> R,
    ) -> Result<R> {
        let mut state = self.state.lock();
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(what.to_string()));
        }
        Ok(f(&mut state))
    }

    fn set_mode(&self, mode: TeleopMode, cancel: &CancellationToken) -> Result<()> {
        let tier = self.commit(cancel, "mode change", |state| {
            state.mode = mode;
            state.tier
        })?;
        let banner = mode_banner(mode, tier);
        info!("{}", banner);
        self.status.info(banner);
        Ok(())
    }

    /// Sleep one poll interval, failing on cancellation or past `deadline`
    async fn pause(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        what: &str,
    ) -> Result<()> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AppError::Timeout(what.to_string()));
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled(what.to_string())),
            _ = tokio::time::sleep(self.config.poll_interval()) => Ok(()),
        }
    }

    /// Clear calibration, wait until both markers have been seen, then pin
    /// both sides at once
    async fn recalibrate(&self, cancel: &CancellationToken) -> Result<()> {
        self.commit(cancel, "calibration", ControllerState::restart_calibration)?;

        let deadline = self.config.calibration_timeout().map(|t| Instant::now() + t);
        loop {
            let goals = self.state.lock().last_goal;
            if let (Some(left), Some(right)) = (goals.left, goals.right) {
                let calibration = PerSide::new(left, right).map(|side, goal| {
                    self.robot.current_ee_pose(side).compose(&goal.inverse())
                });
                for side in Side::ALL {
                    debug!("side_to_camera ({}): {:?}", side, calibration[side].to_matrix());
                }
                self.commit(cancel, "calibration", |s| {
                    s.calibration = calibration.map(|_, c| Some(c))
                })?;
                info!("Calibration complete");
                return Ok(());
            }

            for side in Side::ALL {
                if goals[side].is_none() {
                    debug!("Waiting for new camera goal {}", side);
                }
            }
            self.pause(cancel, deadline, "calibration").await?;
        }
    }

    /// Drive both arms to the neutral pose for `lift` and `elbow_bend`
    async fn reset_arm(
        &self,
        lift: f64,
        elbow_bend: f64,
        far_seeing: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.commit(cancel, "arm reset", |s| s.lift.set_distance(lift))?;

        let seeds: PerSide<JointSeed> = PerSide::new(
            [lift, elbow_bend, -elbow_bend, 0.0, 0.0, 0.0],
            [lift, -elbow_bend, elbow_bend, 0.0, 0.0, 0.0],
        );
        let goals = seeds.map(|side, seed| self.robot.initial_ee_pose(side, &seed));
        let tilt = if far_seeing {
            self.config.far_seeing_tilt
        } else {
            self.config.head_tilt(lift)
        };

        let deadline = self.config.reset_timeout().map(|t| Instant::now() + t);
        loop {
            let mut settled = true;
            for side in Side::ALL {
                let current = self.robot.current_ee_pose(side);
                let pos_dist = goals[side].position_distance(&current);
                let rot_dist = goals[side].rotation_distance(&current);
                if pos_dist >= self.config.reset_position_tolerance
                    || rot_dist >= self.config.reset_rotation_tolerance
                {
                    debug!(
                        "Resetting {}: pos_dist {:.4}m, rot_dist {:.4}rad",
                        side, pos_dist, rot_dist
                    );
                    settled = false;
                }
            }
            if settled {
                return Ok(());
            }

            for side in Side::ALL {
                self.robot.publish_goal_pose(side, Some(&goals[side]), None, None);
                self.robot.publish_gripper(side, self.config.gripper_max);
            }
            self.robot.publish_head_tilt(0.0, tilt);

            self.pause(cancel, deadline, "arm reset").await?;
        }
    }
}

impl TeleopHandler for TeleopController {
    fn on_hand(&self, observation: HandObservation) {
        self.handle_hand(&observation);
    }

    fn on_pedal(&self, values: [f64; PEDAL_AXES]) {
        self.handle_pedal(values);
    }

    fn on_control(&self, token: &str) {
        self.enqueue(token);
    }

    fn on_session_closed(&self) {
        let previous = std::mem::replace(&mut *self.session_token.lock(), CancellationToken::new());
        previous.cancel();

        let was = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.mode, TeleopMode::Idle)
        };
        if was == TeleopMode::BaseDrive {
            self.robot.publish_cmd_vel(0.0, 0.0);
        }
        if was != TeleopMode::Idle {
            info!("Operator left, {}", mode_banner(TeleopMode::Idle, PrecisionTier::Normal));
        }
    }
}
