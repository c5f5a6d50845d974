//! WebRTC peer connection glue
//!
//! Builds the `RTCPeerConnection` for an operator offer and wires its events
//! into the [`SessionManager`]: connection state changes, inbound data
//! channels and their messages. Camera tracks are fed by one
//! [`RelayTrackSender`] per stream.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use super::config::WebRtcConfig;
use super::session::{SessionHandle, SessionManager, SessionTransport, StatusChannel};
use super::signaling::{AnswerResponse, ConnectionState, OfferRequest};
use super::track::{camera_track, RelayTrackSender};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::video::MediaClock;

/// Accepts operator offers and produces answers
pub struct WebRtcService {
    manager: Arc<SessionManager>,
    webrtc: WebRtcConfig,
    clock_rate: u32,
    strict_timestamps: bool,
}

impl WebRtcService {
    pub fn new(manager: Arc<SessionManager>, config: &AppConfig) -> Self {
        Self {
            manager,
            webrtc: config.webrtc.clone(),
            clock_rate: config.video.clock_rate,
            strict_timestamps: config.video.strict_timestamps,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Negotiate a new operator session. Rejected with [`AppError::Busy`]
    /// while another session is active.
    pub async fn handle_offer(&self, offer: OfferRequest) -> Result<AnswerResponse> {
        if !offer.is_offer() {
            return Err(AppError::BadRequest(format!(
                "Expected SDP offer, got '{}'",
                offer.sdp_type
            )));
        }

        let handle = self.manager.open_session()?;
        let session_id = handle.session_id().to_string();

        match self.negotiate(handle, offer).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!("Negotiation for session {} failed: {}", session_id, e);
                self.manager.fail_session(&session_id, &e);
                Err(e)
            }
        }
    }

    async fn negotiate(
        &self,
        handle: SessionHandle,
        offer: OfferRequest,
    ) -> Result<AnswerResponse> {
        let session_id = handle.session_id().to_string();
        let pc = Arc::new(new_peer_connection(&self.webrtc).await?);
        self.manager
            .bind_transport(&session_id, Arc::new(RtcPeer { pc: pc.clone() }));

        // mids 0, 1, 2 follow StreamId::ALL
        for (stream, receiver) in handle.into_receivers() {
            let track = camera_track(stream, self.webrtc.video_mime_type(), self.clock_rate);
            let rtp_sender = pc
                .add_track(track.clone() as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| AppError::WebRtcError(format!("Failed to add {} track: {}", stream, e)))?;

            // Drain RTCP so interceptors keep running
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while rtp_sender.read(&mut buf).await.is_ok() {}
            });

            let clock = MediaClock::new(self.clock_rate, self.strict_timestamps);
            RelayTrackSender::new(stream, receiver, clock, track).spawn();
        }

        self.register_handlers(&pc, &session_id);

        let sdp = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| AppError::BadRequest(format!("Invalid SDP offer: {}", e)))?;
        pc.set_remote_description(sdp).await.map_err(|e| {
            AppError::WebRtcError(format!("Failed to set remote description: {}", e))
        })?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create answer: {}", e)))?;

        // Answer once gathering completes so the operator needs no trickle ICE
        let mut gathered = pc.gathering_complete_promise().await;
        pc.set_local_description(answer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))?;
        let _ = gathered.recv().await;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| AppError::WebRtcError("No local description".to_string()))?;

        info!("Session {} answered", session_id);
        Ok(AnswerResponse::new(local.sdp))
    }

    fn register_handlers(&self, pc: &Arc<RTCPeerConnection>, session_id: &str) {
        let manager = self.manager.clone();
        let id = session_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            let manager = manager.clone();
            let id = id.clone();

            Box::pin(async move {
                let state = match s {
                    RTCPeerConnectionState::New => ConnectionState::New,
                    RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectionState::Failed,
                    RTCPeerConnectionState::Closed => ConnectionState::Closed,
                    _ => return,
                };

                info!("Connection state is {} (session {})", state, id);
                manager.on_connection_state(&id, state);
            })
        }));

        let manager = self.manager.clone();
        let id = session_id.to_string();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let manager = manager.clone();
            let id = id.clone();

            Box::pin(async move {
                let status = Arc::new(DataChannelStatus(dc.clone()));
                let Ok(label) = manager.on_channel_open(&id, dc.label(), status) else {
                    return;
                };

                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    debug!("channel({}) message: {} bytes", label, msg.data.len());
                    manager.on_channel_message(&id, label, &msg.data);
                    Box::pin(async {})
                }));
            })
        }));
    }
}

async fn new_peer_connection(config: &WebRtcConfig) -> Result<RTCPeerConnection> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)
        .map_err(|e| AppError::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: config.ice_servers(),
        ..Default::default()
    };

    api.new_peer_connection(rtc_config)
        .await
        .map_err(|e| AppError::WebRtcError(format!("Failed to create peer connection: {}", e)))
}

/// Peer connection as seen by the session manager
struct RtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl SessionTransport for RtcPeer {
    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

/// The retained `control` channel
struct DataChannelStatus(Arc<RTCDataChannel>);

#[async_trait]
impl StatusChannel for DataChannelStatus {
    async fn send_text(&self, text: String) -> Result<()> {
        self.0
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| AppError::WebRtcError(format!("Failed to send status: {}", e)))
    }
}
