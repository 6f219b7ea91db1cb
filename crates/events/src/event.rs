//! Event vocabulary and typed payloads.

use std::{fmt, str::FromStr};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

// ── EventKind ───────────────────────────────────────────────────────────────

/// Every event the gateway knows about. The set is closed: plugins and
/// domain managers pick from it, they cannot mint new names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "gateway:started")]
    GatewayStarted,
    #[serde(rename = "gateway:stopping")]
    GatewayStopping,
    #[serde(rename = "gateway:reloaded")]
    GatewayReloaded,
    #[serde(rename = "plugin:loaded")]
    PluginLoaded,
    #[serde(rename = "plugin:unloaded")]
    PluginUnloaded,
    #[serde(rename = "plugin:error")]
    PluginError,
    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat,
    #[serde(rename = "message:received")]
    MessageReceived,
    #[serde(rename = "message:sent")]
    MessageSent,
    #[serde(rename = "task:created")]
    TaskCreated,
    #[serde(rename = "task:updated")]
    TaskUpdated,
    #[serde(rename = "session:started")]
    SessionStarted,
    #[serde(rename = "session:ended")]
    SessionEnded,
    #[serde(rename = "notification:created")]
    NotificationCreated,
}

impl EventKind {
    /// All variants, for iteration.
    pub const ALL: &'static [EventKind] = &[
        Self::GatewayStarted,
        Self::GatewayStopping,
        Self::GatewayReloaded,
        Self::PluginLoaded,
        Self::PluginUnloaded,
        Self::PluginError,
        Self::AgentHeartbeat,
        Self::MessageReceived,
        Self::MessageSent,
        Self::TaskCreated,
        Self::TaskUpdated,
        Self::SessionStarted,
        Self::SessionEnded,
        Self::NotificationCreated,
    ];

    /// Wire name, e.g. `plugin:loaded`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatewayStarted => "gateway:started",
            Self::GatewayStopping => "gateway:stopping",
            Self::GatewayReloaded => "gateway:reloaded",
            Self::PluginLoaded => "plugin:loaded",
            Self::PluginUnloaded => "plugin:unloaded",
            Self::PluginError => "plugin:error",
            Self::AgentHeartbeat => "agent:heartbeat",
            Self::MessageReceived => "message:received",
            Self::MessageSent => "message:sent",
            Self::TaskCreated => "task:created",
            Self::TaskUpdated => "task:updated",
            Self::SessionStarted => "session:started",
            Self::SessionEnded => "session:ended",
            Self::NotificationCreated => "notification:created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a plain event name is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// ── HeartbeatAction ─────────────────────────────────────────────────────────

/// What the woken agent is expected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatAction {
    #[default]
    Heartbeat,
    Task,
    Custom,
}

impl fmt::Display for HeartbeatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat => f.write_str("heartbeat"),
            Self::Task => f.write_str("task"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

// ── Event ───────────────────────────────────────────────────────────────────

/// An event together with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum Event {
    #[serde(rename = "gateway:started")]
    GatewayStarted,
    #[serde(rename = "gateway:stopping")]
    GatewayStopping,
    #[serde(rename = "gateway:reloaded")]
    GatewayReloaded,
    #[serde(rename = "plugin:loaded")]
    PluginLoaded { name: String, version: String },
    #[serde(rename = "plugin:unloaded")]
    PluginUnloaded { name: String },
    #[serde(rename = "plugin:error")]
    PluginError { name: String, error: String },
    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat {
        job_id: String,
        agent_id: String,
        action: HeartbeatAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        fired_at_ms: u64,
    },
    #[serde(rename = "message:received")]
    MessageReceived {
        channel: String,
        sender: String,
        text: String,
    },
    #[serde(rename = "message:sent")]
    MessageSent {
        channel: String,
        recipient: String,
        text: String,
    },
    #[serde(rename = "task:created")]
    TaskCreated {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        status: String,
    },
    #[serde(rename = "task:updated")]
    TaskUpdated {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        status: String,
    },
    #[serde(rename = "session:started")]
    SessionStarted {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    #[serde(rename = "session:ended")]
    SessionEnded {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    #[serde(rename = "notification:created")]
    NotificationCreated {
        notification_id: String,
        message: String,
    },
}

impl Event {
    /// Returns the [`EventKind`] that matches this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::GatewayStarted => EventKind::GatewayStarted,
            Self::GatewayStopping => EventKind::GatewayStopping,
            Self::GatewayReloaded => EventKind::GatewayReloaded,
            Self::PluginLoaded { .. } => EventKind::PluginLoaded,
            Self::PluginUnloaded { .. } => EventKind::PluginUnloaded,
            Self::PluginError { .. } => EventKind::PluginError,
            Self::AgentHeartbeat { .. } => EventKind::AgentHeartbeat,
            Self::MessageReceived { .. } => EventKind::MessageReceived,
            Self::MessageSent { .. } => EventKind::MessageSent,
            Self::TaskCreated { .. } => EventKind::TaskCreated,
            Self::TaskUpdated { .. } => EventKind::TaskUpdated,
            Self::SessionStarted { .. } => EventKind::SessionStarted,
            Self::SessionEnded { .. } => EventKind::SessionEnded,
            Self::NotificationCreated { .. } => EventKind::NotificationCreated,
        }
    }
}
