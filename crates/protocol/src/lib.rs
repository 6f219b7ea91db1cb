//! Gateway control protocol definitions.
//!
//! One request/response exchange per connection, JSON on both sides:
//! the client writes a [`ControlRequest`], shuts down its write half, and
//! reads exactly one [`ControlResponse`].

pub mod endpoint;
pub mod process;

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

// ── Constants ────────────────────────────────────────────────────────────────

/// Upper bound on a request body.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
/// Upper bound on a response body the client will accept.
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

pub const INVALID_JSON: &str = "Invalid JSON";

// ── Actions ──────────────────────────────────────────────────────────────────

/// The commands a gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Status,
    Stop,
    Reload,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Stop => "stop",
            Self::Reload => "reload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(Self::Status),
            "stop" => Some(Self::Stop),
            "reload" => Some(Self::Reload),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Client → gateway. The action stays a string so unknown names can be
/// reported back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

impl ControlRequest {
    pub fn new(action: ControlAction) -> Self {
        Self {
            action: action.as_str().to_string(),
        }
    }

    /// Parse a request body. Anything that is not a JSON object with a string
    /// `action` is reported as invalid JSON.
    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(bytes).map_err(|_| INVALID_JSON.to_string())
    }
}

/// Gateway → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::failure(format!("Unknown action: {action}"))
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serializing plain JSON values cannot fail.
        serde_json::to_vec(self).unwrap_or_else(|_| br#"{"ok":false}"#.to_vec())
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Point-in-time view of a gateway, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub running: bool,
    pub pid: u32,
    pub uptime_ms: u64,
    /// Loaded configuration; `null` when not running.
    pub config: Option<Value>,
    /// Names of currently loaded plugins.
    pub plugins: Vec<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn request_roundtrip_shape() {
        let req = ControlRequest::new(ControlAction::Reload);
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({ "action": "reload" }));
        assert_eq!(ControlRequest::decode(br#"{"action":"reload"}"#).unwrap(), req);
    }

    #[test]
    fn malformed_requests() {
        assert_eq!(ControlRequest::decode(b"{nope").unwrap_err(), "Invalid JSON");
        assert_eq!(ControlRequest::decode(b"[]").unwrap_err(), "Invalid JSON");
        assert_eq!(ControlRequest::decode(b"").unwrap_err(), "Invalid JSON");
    }

    #[test]
    fn response_omits_absent_fields() {
        let ok = ControlResponse::success(json!({ "message": "Stopping" }));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "ok": true, "data": { "message": "Stopping" } })
        );

        let err = ControlResponse::unknown_action("dance");
        assert_eq!(
            serde_json::from_slice::<Value>(&err.encode()).unwrap(),
            json!({ "ok": false, "error": "Unknown action: dance" })
        );
    }

    #[test]
    fn status_snapshot_is_camel_case() {
        let snap = StatusSnapshot {
            running: true,
            pid: 42,
            uptime_ms: 1500,
            config: None,
            plugins: vec!["echo".into()],
        };
        assert_eq!(
            serde_json::to_value(&snap).unwrap(),
            json!({ "running": true, "pid": 42, "uptimeMs": 1500, "config": null, "plugins": ["echo"] })
        );
    }

    #[test]
    fn action_names() {
        for action in [ControlAction::Status, ControlAction::Stop, ControlAction::Reload] {
            assert_eq!(ControlAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(ControlAction::parse("restart"), None);
    }
}
