use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::state::AppState;
use crate::teleop::{GripperLockState, PrecisionTier, TeleopMode};
use crate::webrtc::{AnswerResponse, OfferRequest, SessionState};

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
    pub teleop: TeleopStatus,
}

#[derive(Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: SessionState,
    pub age_secs: u64,
    pub status_channel: bool,
}

#[derive(Serialize)]
pub struct TeleopStatus {
    pub mode: TeleopMode,
    pub precision: PrecisionTier,
    pub lift: f64,
    pub calibrated_left: bool,
    pub calibrated_right: bool,
    pub gripper_lock_left: GripperLockState,
    pub gripper_lock_right: GripperLockState,
    pub busy: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let session = state.webrtc.manager().session_info().map(|s| SessionStatus {
        session_id: s.session_id,
        state: s.state,
        age_secs: s.created_at.elapsed().as_secs(),
        status_channel: s.status_channel,
    });

    let snap = state.controller.snapshot();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        session,
        teleop: TeleopStatus {
            mode: snap.mode,
            precision: snap.tier,
            lift: snap.lift,
            calibrated_left: snap.calibrated.left,
            calibrated_right: snap.calibrated.right,
            gripper_lock_left: snap.gripper_locks.left,
            gripper_lock_right: snap.gripper_locks.right,
            busy: !state.controller.is_idle(),
        },
    })
}

// ============================================================================
// WebRTC
// ============================================================================

/// Handle the operator's SDP offer. Answers once ICE gathering completes;
/// a second operator gets 409 while a session is active.
pub async fn webrtc_offer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OfferRequest>,
) -> Result<Json<AnswerResponse>> {
    info!("Received offer ({} bytes of SDP)", req.sdp.len());
    let answer = state.webrtc.handle_offer(req).await?;
    Ok(Json(answer))
}
