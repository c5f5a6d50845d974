use std::sync::Arc;
use std::time::Instant;

use crate::config::ConfigStore;
use crate::events::StatusBus;
use crate::teleop::TeleopController;
use crate::webrtc::WebRtcService;

/// Application-wide state shared across handlers
///
/// Session lifecycle goes through `webrtc` (and its `SessionManager`);
/// `controller` is only read here for status reporting.
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Offer/answer entry point for the operator session
    pub webrtc: Arc<WebRtcService>,
    /// Teleoperation state machine
    pub controller: Arc<TeleopController>,
    /// Operator status bus
    pub status: StatusBus,
    /// Process start, reported by the health endpoint
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        webrtc: Arc<WebRtcService>,
        controller: Arc<TeleopController>,
        status: StatusBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            webrtc,
            controller,
            status,
            started_at: Instant::now(),
        })
    }
}
