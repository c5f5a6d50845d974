//! WebRTC signaling types

use serde::{Deserialize, Serialize};

/// Session description posted by the operator UI to `/offer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl OfferRequest {
    pub fn is_offer(&self) -> bool {
        self.sdp_type.eq_ignore_ascii_case("offer")
    }
}

/// Answer returned from `/offer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl AnswerResponse {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }
}

/// Transport-level connection state reported by the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Lifecycle of an operator session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl SessionState {
    /// A session in this state blocks new offers
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Negotiating | SessionState::Connected)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let offer: OfferRequest = serde_json::from_str(r#"{"sdp":"v=0","type":"offer"}"#).unwrap();
        assert!(offer.is_offer());
        assert_eq!(offer.sdp, "v=0");

        let answer = serde_json::to_value(AnswerResponse::new("v=0")).unwrap();
        assert_eq!(answer["type"], "answer");
        assert_eq!(answer["sdp"], "v=0");
    }

    #[test]
    fn test_active_states() {
        assert!(SessionState::Negotiating.is_active());
        assert!(SessionState::Connected.is_active());
        assert!(!SessionState::Failed.is_active());
        assert!(!SessionState::Closed.is_active());
    }
}
