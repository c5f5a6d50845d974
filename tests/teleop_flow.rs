mod common;

use std::time::Duration;

use common::{
    assert_close, assert_pose_close, last_head_tilt, observation, rig, settle, Rig,
};
use teleop_relay::events::StatusLevel;
use teleop_relay::teleop::{
    GripperLockState, PrecisionTier, Pose, Quaternion, Side, TeleopMode,
};
use teleop_relay::webrtc::TeleopHandler;

fn left_marker() -> Pose {
    Pose::new([0.1, 0.05, 0.4], Quaternion::from_axis_angle([0.0, 0.0, 1.0], 0.3))
}

fn right_marker() -> Pose {
    Pose::new([-0.1, 0.05, 0.4], Quaternion::from_axis_angle([0.0, 1.0, 0.0], -0.2))
}

/// Enter arm mode and complete calibration with both markers in view
async fn calibrated() -> Rig {
    let rig = rig();
    rig.controller.on_control("teleop_mode_arm");
    tokio::time::sleep(Duration::from_millis(300)).await;

    rig.solver.show(Some(left_marker()), Some(right_marker()));
    rig.controller.on_hand(observation());
    settle(&rig.controller).await;
    assert_eq!(rig.controller.snapshot().mode, TeleopMode::ArmTeleop);
    rig
}

#[tokio::test(start_paused = true)]
async fn arm_mode_waits_for_both_markers_then_pins_calibration() {
    let rig = rig();

    rig.controller.on_control("teleop_mode_arm");
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Arm reset done, calibration still waiting: no hand goal reached the robot
    assert!(!rig.controller.is_idle());
    assert_eq!(rig.controller.snapshot().mode, TeleopMode::Idle);
    assert!(rig.robot.calibrated_goals().is_empty());
    let neutral_left = rig.robot.ee(Side::Left);
    let neutral_right = rig.robot.ee(Side::Right);
    assert_close(neutral_left.position[2], 0.8);

    // Markers out of view keep it waiting
    rig.controller.on_hand(observation());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!rig.controller.is_idle());
    assert!(rig.controller.calibration(Side::Left).is_none());

    // Only one side in view is not enough either
    rig.solver.show(Some(left_marker()), None);
    rig.controller.on_hand(observation());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!rig.controller.is_idle());
    assert!(rig.controller.calibration(Side::Left).is_none());

    rig.solver.show(Some(left_marker()), Some(right_marker()));
    rig.controller.on_hand(observation());
    settle(&rig.controller).await;

    let snap = rig.controller.snapshot();
    assert_eq!(snap.mode, TeleopMode::ArmTeleop);
    assert_eq!(snap.tier, PrecisionTier::Precise);
    assert!(snap.calibrated.left && snap.calibrated.right);

    // side_to_camera = ee * inverse(goal) with the last filtered goal
    let calib_left = rig.controller.calibration(Side::Left).unwrap();
    let calib_right = rig.controller.calibration(Side::Right).unwrap();
    let first_left = left_marker().low_pass(&left_marker(), 0.1, 0.1);
    assert_pose_close(&calib_left, &neutral_left.compose(&first_left.inverse()));
    assert_pose_close(
        &calib_right,
        &neutral_right.compose(&right_marker().inverse()),
    );

    // A calibrated goal maps the current gesture back onto the neutral pose
    assert_pose_close(&calib_left.compose(&first_left), &neutral_left);
}

#[tokio::test(start_paused = true)]
async fn later_goals_use_fixed_calibration_and_filtering() {
    let rig = calibrated().await;
    let calib_left = rig.controller.calibration(Side::Left).unwrap();
    let calib_right = rig.controller.calibration(Side::Right).unwrap();

    let moved_left = Pose::new(
        [0.2, 0.1, 0.5],
        Quaternion::from_axis_angle([0.0, 0.0, 1.0], 0.5),
    );
    rig.solver.show(Some(moved_left), None);
    rig.controller.on_hand(observation());

    let calls = rig.robot.calibrated_goals();
    assert_eq!(calls.len(), 2);

    // Precise tier low-passes the new sample toward the last goal
    let filtered = left_marker().low_pass(&moved_left, 0.1, 0.1);
    let left = calls.iter().find(|c| c.side == Side::Left).unwrap();
    assert_pose_close(&left.calibration.unwrap(), &calib_left);
    assert_pose_close(&left.goal.unwrap(), &calib_left.compose(&filtered));
    assert!(left.goal.unwrap().position_distance(&calib_left.compose(&moved_left)) > 1e-3);

    // Right marker out of view: its previous goal is held
    let right = calls.iter().find(|c| c.side == Side::Right).unwrap();
    assert_pose_close(&right.goal.unwrap(), &calib_right.compose(&right_marker()));

    // Head follows the lift
    assert_close(last_head_tilt(&rig.robot), 1.06);
    assert_eq!(rig.controller.calibration(Side::Left), Some(calib_left));
}

#[tokio::test(start_paused = true)]
async fn lift_pedal_climbs_to_limit_then_rejects() {
    let rig = calibrated().await;
    let mut events = rig.status.subscribe();
    let calib_z = rig.controller.calibration(Side::Left).unwrap().position[2];

    for step in 1..=8 {
        rig.controller.on_pedal([0.0, 0.0, 1.0, 0.0]);
        assert_close(rig.controller.snapshot().lift, 0.8 + 0.05 * step as f64);
    }
    assert_close(rig.controller.snapshot().lift, 1.2);
    assert_close(
        rig.controller.calibration(Side::Left).unwrap().position[2],
        calib_z + 0.4,
    );

    rig.controller.on_pedal([0.0, 0.0, 1.0, 0.0]);
    assert_close(rig.controller.snapshot().lift, 1.2);
    assert_close(
        rig.controller.calibration(Side::Left).unwrap().position[2],
        calib_z + 0.4,
    );

    let warning = events.recv().await.unwrap();
    assert_eq!(warning.level, StatusLevel::Warn);
    assert_eq!(warning.message, "Lift over limit");

    // Released pedals open both grippers
    assert_eq!(rig.robot.last_gripper(Side::Left), Some(0.055));
    assert_eq!(rig.robot.last_gripper(Side::Right), Some(0.055));
}

#[tokio::test(start_paused = true)]
async fn gripper_lock_holds_until_pedal_returns_to_grip() {
    let rig = calibrated().await;

    // Squeeze to half
    rig.controller.on_pedal([0.5, 0.0, 0.0, 0.0]);
    assert_close(rig.robot.last_gripper(Side::Left).unwrap(), 0.0275);

    rig.controller.on_control("gripper_lock_left");
    settle(&rig.controller).await;
    assert_eq!(
        rig.controller.snapshot().gripper_locks.left,
        GripperLockState::Locked
    );

    // Releasing the pedal keeps the grip
    rig.controller.on_pedal([0.0, 0.0, 0.0, 0.0]);
    assert_close(rig.robot.last_gripper(Side::Left).unwrap(), 0.0275);
    assert_close(rig.robot.last_gripper(Side::Right).unwrap(), 0.055);
    assert_eq!(
        rig.controller.snapshot().gripper_locks.left,
        GripperLockState::ReadyToUnlock
    );

    // Pressing back, not yet to the frozen grip
    rig.controller.on_pedal([0.25, 0.0, 0.0, 0.0]);
    assert_close(rig.robot.last_gripper(Side::Left).unwrap(), 0.0275);

    // Past the frozen grip: follows the pedal again
    rig.controller.on_pedal([0.7, 0.0, 0.0, 0.0]);
    assert_close(rig.robot.last_gripper(Side::Left).unwrap(), 0.01375);
    assert_eq!(
        rig.controller.snapshot().gripper_locks.left,
        GripperLockState::Unlocked
    );
}

#[tokio::test(start_paused = true)]
async fn session_close_cancels_wait_and_drops_queued_commands() {
    let rig = rig();

    rig.controller.on_control("teleop_mode_arm");
    rig.controller.on_control("teleop_mode_base");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!rig.controller.is_idle());

    rig.controller.on_session_closed();
    settle(&rig.controller).await;

    let snap = rig.controller.snapshot();
    assert_eq!(snap.mode, TeleopMode::Idle);
    assert!(!snap.calibrated.left && !snap.calibrated.right);
    assert!(rig.robot.cmd_vel.lock().is_empty());

    // The next operator starts from a fresh token
    rig.controller.on_control("teleop_mode_base");
    settle(&rig.controller).await;
    assert_eq!(rig.controller.snapshot().mode, TeleopMode::BaseDrive);
    assert_close(last_head_tilt(&rig.robot), 0.26);
}

#[tokio::test(start_paused = true)]
async fn reset_restores_neutral_pose_and_notifies_robot() {
    let rig = calibrated().await;
    for _ in 0..4 {
        rig.controller.on_pedal([0.0, 0.0, 1.0, 0.0]);
    }
    let neutral = rig.robot.ee(Side::Left);
    rig.solver.show(Some(Pose::from_translation([0.3, 0.2, 0.1])), None);
    rig.controller.on_hand(observation());
    assert!(rig.robot.ee(Side::Left).position_distance(&neutral) > 0.02);

    rig.controller.on_control("reset");
    settle(&rig.controller).await;

    let snap = rig.controller.snapshot();
    assert_eq!(snap.mode, TeleopMode::Idle);
    assert_close(snap.lift, 0.8);
    assert_eq!(*rig.robot.resets.lock(), 1);
    assert_close(rig.robot.ee(Side::Left).position[2], 0.8);
    assert_close(last_head_tilt(&rig.robot), 1.06);
}
