use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

// Numeric ids are millisecond clock values assigned by whichever client
// created the record, so they sort by creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SpaceId(pub i64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_inner!(UserId, SpaceId, ChannelId);

/// Opaque record key.
///
/// Messages, notifications, attachments, calls and events are keyed by
/// whatever the creating client chose: an integer clock value, a fractional
/// one, or a string such as `fr-1700000000000-0.42`.  The incoming JSON
/// representation is preserved on the way back out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

pub type MessageId = Key;
pub type NotificationId = Key;
pub type AttachmentId = Key;
pub type CallId = Key;
pub type EventId = Key;

impl Key {
    pub fn text(s: impl Into<String>) -> Self {
        Key::Text(s.into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer, float or string key")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Key, E> {
                Ok(Key::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Key, E> {
                i64::try_from(v)
                    .map(Key::Int)
                    .or_else(|_| Ok(Key::Text(v.to_string())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Key, E> {
                if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    Ok(Key::Int(v as i64))
                } else {
                    Ok(Key::Text(v.to_string()))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Key, E> {
                Ok(Key::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

// ---------------------------------------------------------------------------
// Chat identifiers
// ---------------------------------------------------------------------------

/// Identifier of a message thread, used both in REST paths and socket URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChatId {
    /// A space channel; rendered as the bare channel id.
    Channel(ChannelId),
    /// A two-party thread; rendered as `dm_<low>_<high>`.
    Direct { low: UserId, high: UserId },
    /// The account-wide push feed.
    Notifications,
}

impl ChatId {
    /// Deterministic DM id: both participants compute the same value.
    pub fn direct(a: UserId, b: UserId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        ChatId::Direct { low, high }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ChatId::Direct { .. })
    }

    /// The other participant of a DM thread, seen from `me`.
    pub fn peer_of(&self, me: UserId) -> Option<UserId> {
        match *self {
            ChatId::Direct { low, high } if low == me => Some(high),
            ChatId::Direct { low, high } if high == me => Some(low),
            _ => None,
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Channel(id) => write!(f, "{id}"),
            ChatId::Direct { low, high } => write!(f, "dm_{low}_{high}"),
            ChatId::Notifications => f.write_str("notifications"),
        }
    }
}

impl std::str::FromStr for ChatId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "notifications" {
            return Ok(ChatId::Notifications);
        }
        if let Some(rest) = s.strip_prefix("dm_") {
            let (a, b) = rest
                .split_once('_')
                .ok_or_else(|| format!("malformed dm id: {s}"))?;
            let a = a.parse::<i64>().map_err(|e| format!("malformed dm id {s}: {e}"))?;
            let b = b.parse::<i64>().map_err(|e| format!("malformed dm id {s}: {e}"))?;
            return Ok(ChatId::direct(UserId(a), UserId(b)));
        }
        s.parse::<i64>()
            .map(|n| ChatId::Channel(ChannelId(n)))
            .map_err(|e| format!("malformed chat id {s}: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Id generation
// ---------------------------------------------------------------------------

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond clock id, strictly increasing within this process so that
/// records created in the same millisecond never collide.
pub fn next_id() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Accepts an RFC-3339 string; anything else (missing, null, garbage) is `None`.
pub(crate) fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_id_is_symmetric() {
        let a = UserId(1);
        let b = UserId(2);
        assert_eq!(ChatId::direct(a, b), ChatId::direct(b, a));
        assert_eq!(ChatId::direct(b, a).to_string(), "dm_1_2");
    }

    #[test]
    fn dm_id_sorts_numerically() {
        let id = ChatId::direct(UserId(1700000000123), UserId(99));
        assert_eq!(id.to_string(), "dm_99_1700000000123");
        assert_eq!(id.peer_of(UserId(99)), Some(UserId(1700000000123)));
        assert_eq!(id.peer_of(UserId(5)), None);
    }

    #[test]
    fn chat_id_parses_back() {
        for raw in ["7", "dm_1_2", "notifications"] {
            let parsed: ChatId = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        assert!("dm_x_2".parse::<ChatId>().is_err());
    }

    #[test]
    fn key_accepts_mixed_json() {
        let keys: Vec<Key> = serde_json::from_str(r#"[12, "fr-1", 3.0, 1.5]"#).unwrap();
        assert_eq!(keys[0], Key::Int(12));
        assert_eq!(keys[1], Key::text("fr-1"));
        assert_eq!(keys[2], Key::Int(3));
        assert_eq!(keys[3], Key::text("1.5"));
        assert_eq!(serde_json::to_string(&keys[0]).unwrap(), "12");
    }

    #[test]
    fn next_id_is_strictly_increasing() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }
}
