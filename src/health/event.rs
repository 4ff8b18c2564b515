//! Health event wire format

use crate::health::state::HealthState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of the `etype` field on every health event
pub const EVENT_TYPE: &str = "health";

/// Value of the `event` field on status snapshots
pub const STATUS_EVENT: &str = "status";

/// Point-in-time health snapshot as published to the broker.
///
/// ```json
/// {"hostname":"host123","timestamp":1559761560,"etype":"health","event":"status",
///  "service":"gather","version":"v0.0.1","state":"green","msg":"a-ok",
///  "data":{"testmode":"off","kernel":true}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HealthEvent {
    /// Emitting host
    pub hostname: String,

    /// Unix seconds
    pub timestamp: i64,

    /// Always [`EVENT_TYPE`]
    #[serde(rename = "etype")]
    pub event_type: String,

    /// Name of the event (status, startup, shutdown)
    #[serde(rename = "event")]
    pub name: String,

    pub service: String,

    pub version: String,

    pub state: HealthState,

    /// User actionable message
    #[serde(rename = "msg")]
    pub message: String,

    /// Merged stats; omitted when there are none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

#[derive(Serialize)]
struct MarshalFailure<'a> {
    error: &'a str,
    msg: String,
}

/// Serialize to JSON, degrading to `{"error":"internal","msg":...}` instead
/// of failing
pub fn safe_marshal<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Health payload failed to serialize");
            let failure = MarshalFailure {
                error: "internal",
                msg: e.to_string(),
            };
            serde_json::to_vec(&failure)
                .unwrap_or_else(|_| br#"{"error":"internal","msg":"marshal failure"}"#.to_vec())
        }
    }
}

/// Re-indent a JSON document; input that is not JSON is returned unchanged
pub fn pretty_json(raw: &[u8]) -> Vec<u8> {
    serde_json::from_slice::<Value>(raw)
        .and_then(|v| serde_json::to_vec_pretty(&v))
        .unwrap_or_else(|_| raw.to_vec())
}
