use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::SECONDS_SCALE_CEILING;
use crate::models::{Message, Notification};

/// Frames received on the account-wide user socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// A notification addressed to the connected user.
    Notification { notification: Notification },

    /// Any other frame type.  Ignored, but never closes the socket.
    #[serde(other)]
    Unknown,
}

/// Frames received on a chat socket: the raw message object.
pub type ChatFrame = Message;

impl PushFrame {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Rescale a timestamp to milliseconds.
///
/// Values below 10^12 are read as seconds (10^12 ms is September 2001, so no
/// genuine millisecond value from this system falls under it).
pub fn normalize_timestamp_ms(raw: f64) -> i64 {
    if raw < SECONDS_SCALE_CEILING {
        (raw * 1000.0).round() as i64
    } else {
        raw.round() as i64
    }
}

pub(crate) fn deserialize_timestamp_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(normalize_timestamp_ms).unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .parse::<f64>()
            .map(normalize_timestamp_ms)
            .or_else(|_| {
                chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.timestamp_millis())
            })
            .unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Key;

    #[test]
    fn seconds_are_rescaled() {
        assert_eq!(normalize_timestamp_ms(1_700_000_000.0), 1_700_000_000_000);
        assert_eq!(normalize_timestamp_ms(1_700_000_000.25), 1_700_000_000_250);
        assert_eq!(normalize_timestamp_ms(1_700_000_000_000.0), 1_700_000_000_000);
    }

    #[test]
    fn push_frame_normalizes_seconds_timestamp() {
        let frame = PushFrame::from_json(
            r#"{"type": "notification", "notification": {"id": "fr-1", "type": "friend_request", "from": "Ada", "fromId": 1, "status": "pending", "timestamp": 1700000000}}"#,
        )
        .unwrap();
        match frame {
            PushFrame::Notification { notification } => {
                assert_eq!(notification.id, Key::text("fr-1"));
                assert_eq!(notification.timestamp, 1_700_000_000_000);
            }
            PushFrame::Unknown => panic!("expected notification frame"),
        }
    }

    #[test]
    fn unknown_frame_type_is_tolerated() {
        let frame = PushFrame::from_json(r#"{"type": "presence", "userId": 4}"#).unwrap();
        assert!(matches!(frame, PushFrame::Unknown));
    }

    #[test]
    fn string_timestamps_are_accepted() {
        let n: Notification = serde_json::from_str(
            r#"{"id": 1, "type": "info", "timestamp": "2023-11-14T22:13:20Z"}"#,
        )
        .unwrap();
        assert_eq!(n.timestamp, 1_700_000_000_000);
    }
}
