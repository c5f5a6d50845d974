//! Operator status event types

use serde::{Deserialize, Serialize};

/// Severity of a status line shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warn,
}

/// A status line destined for the operator's control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warn,
            message: message.into(),
        }
    }

    /// Payload written to the control channel. The operator UI prints plain
    /// JSON strings, so only the message text goes on the wire.
    pub fn to_wire(&self) -> String {
        serde_json::Value::String(self.message.clone()).to_string()
    }
}
