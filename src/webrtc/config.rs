//! WebRTC configuration

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// WebRTC configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs. Empty is fine on a LAN, host candidates work directly.
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// MIME type announced for the camera tracks
    pub video_mime_type: Option<String>,
}

impl WebRtcConfig {
    /// MIME type used when none is configured
    pub const DEFAULT_VIDEO_MIME_TYPE: &'static str = "video/VP8";

    pub fn video_mime_type(&self) -> &str {
        self.video_mime_type
            .as_deref()
            .unwrap_or(Self::DEFAULT_VIDEO_MIME_TYPE)
    }

    /// ICE servers in the form the peer connection expects
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = Vec::with_capacity(self.stun_servers.len() + self.turn_servers.len());

        for stun_url in &self.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &self.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        ice_servers
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs, e.g. `turn:turn.example.com:3478?transport=udp`
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}
