//! Semantic checks run after parsing.

use std::collections::HashSet;

use crate::{
    error::{Error, Result},
    schema::HiveConfig,
};

/// Validate a parsed config, reporting the first problem found.
///
/// Cron expressions are only checked for shape here; the scheduler parses
/// them fully when the jobs are added.
pub fn validate(config: &HiveConfig) -> Result<()> {
    if config.storage.path.as_os_str().is_empty() {
        return Err(Error::invalid("storage.path", "must not be empty"));
    }
    if config.gateway.shutdown_grace_ms == 0 {
        return Err(Error::invalid(
            "gateway.shutdownGraceMs",
            "must be greater than zero",
        ));
    }
    if let Some(tz) = &config.scheduler.timezone
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        return Err(Error::invalid(
            "scheduler.timezone",
            format!("unknown timezone '{tz}'"),
        ));
    }

    let mut seen = HashSet::new();
    for (i, job) in config.jobs.iter().enumerate() {
        let field = |name: &str| format!("jobs[{i}].{name}");
        if job.id.trim().is_empty() {
            return Err(Error::invalid(field("id"), "must not be empty"));
        }
        if !seen.insert(job.id.as_str()) {
            return Err(Error::invalid(
                field("id"),
                format!("duplicate job id '{}'", job.id),
            ));
        }
        if job.agent_id.trim().is_empty() {
            return Err(Error::invalid(field("agentId"), "must not be empty"));
        }
        let fields = job.cron.split_whitespace().count();
        if fields != 5 {
            return Err(Error::invalid(
                field("cron"),
                format!("expected 5 fields, got {fields}"),
            ));
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::JobConfig,
        hive_common::ErrorCode,
        hive_events::HeartbeatAction,
    };

    fn job(id: &str, cron: &str) -> JobConfig {
        JobConfig {
            id: id.into(),
            name: None,
            cron: cron.into(),
            agent_id: "agent".into(),
            action: HeartbeatAction::Heartbeat,
            payload: None,
            enabled: true,
        }
    }

    #[test]
    fn default_config_is_valid() {
        validate(&HiveConfig::default()).unwrap();
    }

    #[test]
    fn zero_grace_rejected() {
        let mut cfg = HiveConfig::default();
        cfg.gateway.shutdown_grace_ms = 0;
        let err = validate(&cfg).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
        assert!(err.to_string().contains("gateway.shutdownGraceMs"));
    }

    #[test]
    fn bad_timezone_rejected() {
        let mut cfg = HiveConfig::default();
        cfg.scheduler.timezone = Some("Mars/Olympus".into());
        assert!(validate(&cfg).unwrap_err().to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn duplicate_job_ids_rejected() {
        let mut cfg = HiveConfig::default();
        cfg.jobs = vec![job("a", "* * * * *"), job("a", "0 * * * *")];
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("jobs[1].id"));
    }

    #[test]
    fn cron_shape_checked() {
        let mut cfg = HiveConfig::default();
        cfg.jobs = vec![job("a", "* * * *")];
        let err = validate(&cfg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: jobs[0].cron: expected 5 fields, got 4"
        );
    }
}
