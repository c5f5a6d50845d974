//! Inbound data channel decoding
//!
//! The operator UI opens up to three channels, each carrying JSON text:
//!
//! - `hand`: `[cameraMatrix, distortion, corners, ids]` marker detections
//! - `pedal`: `[v0, v1, v2, v3]`, each in `[0, 1]`
//! - `control`: a command token string
//!
//! Any other label, or a payload that does not decode, is a protocol
//! violation for the session that sent it.

use serde_json::Value;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::teleop::pedal::PEDAL_AXES;
use crate::teleop::robot::HandObservation;

/// Receiver of decoded operator input
///
/// The session layer holds one of these and calls it for every message; the
/// teleoperation controller is the production implementation. Calls come from
/// the async runtime and must not block.
pub trait TeleopHandler: Send + Sync {
    fn on_hand(&self, observation: HandObservation);

    fn on_pedal(&self, values: [f64; PEDAL_AXES]);

    fn on_control(&self, token: &str);

    /// The operator session is gone; abort pending waits
    fn on_session_closed(&self);
}

/// Known inbound channel labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLabel {
    Hand,
    Pedal,
    Control,
}

impl ChannelLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelLabel::Hand => "hand",
            ChannelLabel::Pedal => "pedal",
            ChannelLabel::Control => "control",
        }
    }
}

impl FromStr for ChannelLabel {
    type Err = AppError;

    fn from_str(label: &str) -> Result<Self> {
        match label {
            "hand" => Ok(ChannelLabel::Hand),
            "pedal" => Ok(ChannelLabel::Pedal),
            "control" => Ok(ChannelLabel::Control),
            other => Err(protocol(other, "Unknown label")),
        }
    }
}

impl std::fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Hand(HandObservation),
    Pedal([f64; PEDAL_AXES]),
    Control(String),
}

/// Decode one message received on `label`
pub fn decode_message(label: ChannelLabel, data: &[u8]) -> Result<ChannelMessage> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| protocol(label.as_str(), format!("invalid JSON: {}", e)))?;

    match label {
        ChannelLabel::Hand => decode_hand(&value).map(ChannelMessage::Hand),
        ChannelLabel::Pedal => decode_pedal(&value).map(ChannelMessage::Pedal),
        ChannelLabel::Control => match value {
            Value::String(token) => Ok(ChannelMessage::Control(token)),
            other => Err(protocol("control", format!("expected string, got {}", other))),
        },
    }
}

fn protocol(channel: &str, reason: impl Into<String>) -> AppError {
    AppError::Protocol {
        channel: channel.to_string(),
        reason: reason.into(),
    }
}

fn decode_hand(value: &Value) -> Result<HandObservation> {
    let err = |reason: &str| protocol("hand", reason);

    let parts = value
        .as_array()
        .filter(|parts| parts.len() == 4)
        .ok_or_else(|| err("expected [cameraMatrix, distortion, corners, ids]"))?;

    let matrix = numbers(&parts[0]).ok_or_else(|| err("camera matrix must be numeric"))?;
    if matrix.len() != 9 {
        return Err(err("camera matrix must be 3x3"));
    }
    let mut camera_matrix = [[0.0; 3]; 3];
    for (i, v) in matrix.into_iter().enumerate() {
        camera_matrix[i / 3][i % 3] = v;
    }

    let distortion = numbers(&parts[1]).ok_or_else(|| err("distortion must be numeric"))?;

    let corners = parts[2]
        .as_array()
        .ok_or_else(|| err("corners must be a list"))?
        .iter()
        .map(marker_corners)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| err("corners must be lists of (x, y) points"))?;

    let ids = parts[3]
        .as_array()
        .ok_or_else(|| err("ids must be a list"))?
        .iter()
        .map(|id| match id {
            // detectors report ids either flat or as single-element rows
            Value::Array(row) if row.len() == 1 => row[0].as_i64(),
            other => other.as_i64(),
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| err("ids must be integers"))?;

    if ids.len() != corners.len() {
        return Err(err("corners and ids differ in length"));
    }

    Ok(HandObservation {
        camera_matrix,
        distortion,
        corners,
        ids,
    })
}

fn decode_pedal(value: &Value) -> Result<[f64; PEDAL_AXES]> {
    let values = numbers(value)
        .filter(|v| v.len() == PEDAL_AXES)
        .ok_or_else(|| protocol("pedal", format!("expected {} numbers", PEDAL_AXES)))?;

    let mut axes = [0.0; PEDAL_AXES];
    axes.copy_from_slice(&values);
    Ok(axes)
}

/// Flatten arbitrarily nested numeric arrays
fn numbers(value: &Value) -> Option<Vec<f64>> {
    fn walk(value: &Value, out: &mut Vec<f64>) -> Option<()> {
        match value {
            Value::Array(items) => items.iter().try_for_each(|v| walk(v, out)),
            Value::Number(n) => {
                out.push(n.as_f64().filter(|v| v.is_finite())?);
                Some(())
            }
            _ => None,
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out)?;
    Some(out)
}

/// One marker's corners, accepting `[[x, y], ...]` or `[[[x, y], ...]]`
fn marker_corners(value: &Value) -> Option<Vec<[f64; 2]>> {
    let flat = numbers(value)?;
    if flat.len() % 2 != 0 {
        return None;
    }
    Some(flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAND: &str = r#"[
        [[600, 0, 320], [0, 600, 240], [0, 0, 1]],
        [0.1, -0.2, 0, 0, 0],
        [[[[1, 2], [3, 4], [5, 6], [7, 8]]], [[10, 20], [30, 40], [50, 60], [70, 80]]],
        [[0], 1]
    ]"#;

    #[test]
    fn test_decode_hand() {
        let msg = decode_message(ChannelLabel::Hand, HAND.as_bytes()).unwrap();
        let ChannelMessage::Hand(obs) = msg else {
            panic!("expected hand message");
        };
        assert_eq!(obs.camera_matrix[0][2], 320.0);
        assert_eq!(obs.camera_matrix[2], [0.0, 0.0, 1.0]);
        assert_eq!(obs.distortion.len(), 5);
        assert_eq!(obs.corners.len(), 2);
        assert_eq!(obs.corners[0][3], [7.0, 8.0]);
        assert_eq!(obs.corners[1][0], [10.0, 20.0]);
        assert_eq!(obs.ids, vec![0, 1]);
    }

    #[test]
    fn test_decode_hand_without_markers() {
        let data = r#"[[1,0,0,0,1,0,0,0,1], [], [], []]"#;
        let ChannelMessage::Hand(obs) = decode_message(ChannelLabel::Hand, data.as_bytes()).unwrap()
        else {
            panic!("expected hand message");
        };
        assert!(obs.corners.is_empty());
        assert!(obs.ids.is_empty());
    }

    #[test]
    fn test_malformed_hand_is_protocol_error() {
        for data in [r#"[1, 2, 3]"#, r#"[[1,2], [], [], []]"#, r#"{"sdp": 1}"#, "not json"] {
            let err = decode_message(ChannelLabel::Hand, data.as_bytes()).unwrap_err();
            assert!(matches!(err, AppError::Protocol { .. }), "{}", data);
        }
    }

    #[test]
    fn test_decode_pedal() {
        let msg = decode_message(ChannelLabel::Pedal, b"[0.5, 0, 1, 0.25]").unwrap();
        assert_eq!(msg, ChannelMessage::Pedal([0.5, 0.0, 1.0, 0.25]));
        assert!(decode_message(ChannelLabel::Pedal, b"[0.5, 0, 1]").is_err());
        assert!(decode_message(ChannelLabel::Pedal, b"[\"a\", 0, 1, 0]").is_err());
    }

    #[test]
    fn test_decode_control() {
        let msg = decode_message(ChannelLabel::Control, br#""teleop_mode_arm""#).unwrap();
        assert_eq!(msg, ChannelMessage::Control("teleop_mode_arm".into()));
        assert!(decode_message(ChannelLabel::Control, b"42").is_err());
    }

    #[test]
    fn test_unknown_label() {
        let err = "video".parse::<ChannelLabel>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Protocol violation on channel 'video': Unknown label"
        );
        assert_eq!("control".parse::<ChannelLabel>().unwrap(), ChannelLabel::Control);
    }
}
