//! Response-shape normalization.
//!
//! List endpoints answer either with a bare JSON array or with an object that
//! wraps the array under one of a fixed set of keys.  Everything else becomes
//! an empty list so merge code never sees an unexpected type.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Wrapper keys accepted around a list payload, checked in order.
pub const WRAPPER_KEYS: [&str; 4] = ["items", "spaces", "users", "messages"];

/// Accepted payload shapes.
#[derive(Debug, PartialEq)]
enum Shape {
    Bare(Vec<Value>),
    Wrapped(&'static str, Vec<Value>),
    Absent,
    Unrecognized,
}

fn classify(body: Option<Value>) -> Shape {
    match body {
        None | Some(Value::Null) => Shape::Absent,
        Some(Value::Array(items)) => Shape::Bare(items),
        Some(Value::Object(mut map)) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(_)) = map.get(key) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return Shape::Wrapped(key, items);
                    }
                }
            }
            Shape::Unrecognized
        }
        Some(_) => Shape::Unrecognized,
    }
}

/// Normalize a list response into `Vec<T>`.
///
/// Elements that fail to decode are dropped individually.  `what` names the
/// resource in log lines.
pub fn normalize_sequence<T: DeserializeOwned>(body: Option<Value>, what: &str) -> Vec<T> {
    let items = match classify(body) {
        Shape::Bare(items) => items,
        Shape::Wrapped(key, items) => {
            debug!(what, key, "unwrapped list payload");
            items
        }
        Shape::Absent => return Vec::new(),
        Shape::Unrecognized => {
            warn!(what, "unrecognized list payload shape, treating as empty");
            return Vec::new();
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(what, error = %e, "dropping malformed list element");
                None
            }
        })
        .collect();

    if decoded.len() != total {
        debug!(what, total, kept = decoded.len(), "partial list decode");
    }
    decoded
}

/// Decode a single-object response.  `null`, an absent body or a body that
/// does not match `T` yield `None`.
pub fn normalize_object<T: DeserializeOwned>(body: Option<Value>, what: &str) -> Option<T> {
    match body {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(what, error = %e, "malformed object payload");
                None
            }
        },
    }
}
