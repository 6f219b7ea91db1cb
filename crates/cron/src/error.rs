use {hive_common::ErrorCode, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] hive_storage::Error),

    #[error("invalid cron expression '{expression}': {reason}")]
    CronParse { expression: String, reason: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },
}

impl Error {
    #[must_use]
    pub fn cron_parse(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CronParse {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        match self {
            Self::Json(_) => "SCHEDULER_CORRUPT_JOB",
            Self::Storage(e) => e.code(),
            Self::CronParse { .. } => "CRON_PARSE",
            Self::UnknownTimezone { .. } => "SCHEDULER_TIMEZONE",
            Self::JobNotFound { .. } => "JOB_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
