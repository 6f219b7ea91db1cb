//! Scheduled job model.

use {
    hive_config::JobConfig,
    hive_events::HeartbeatAction,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// A cron-triggered recurring heartbeat targeting one agent.
///
/// While `enabled`, `next_run_at_ms` holds the next firing time; while
/// disabled it is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    /// Five-field cron expression.
    pub cron: String,
    pub agent_id: String,
    #[serde(default)]
    pub action: HeartbeatAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub enabled: bool,
    #[serde(default)]
    pub last_run_at_ms: Option<u64>,
    #[serde(default)]
    pub next_run_at_ms: Option<u64>,
}

impl ScheduledJob {
    /// An enabled heartbeat job with no run history.
    pub fn new(
        id: impl Into<String>,
        cron: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            cron: cron.into(),
            agent_id: agent_id.into(),
            action: HeartbeatAction::Heartbeat,
            payload: None,
            enabled: true,
            last_run_at_ms: None,
            next_run_at_ms: None,
        }
    }

    pub fn with_action(mut self, action: HeartbeatAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl From<&JobConfig> for ScheduledJob {
    fn from(cfg: &JobConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            name: cfg.name.clone().unwrap_or_else(|| cfg.id.clone()),
            cron: cfg.cron.clone(),
            agent_id: cfg.agent_id.clone(),
            action: cfg.action,
            payload: cfg.payload.clone(),
            enabled: cfg.enabled,
            last_run_at_ms: None,
            next_run_at_ms: None,
        }
    }
}

/// Snapshot returned by [`crate::Scheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub job_count: usize,
    pub enabled_count: usize,
    pub next_run_at_ms: Option<u64>,
}
