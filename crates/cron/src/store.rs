//! Job persistence over the shared key/value store.

use std::sync::Arc;

use {hive_storage::Store, tracing::warn};

use crate::{Result, types::ScheduledJob};

/// Key prefix for persisted jobs: `scheduler:job:<id>`.
pub const JOB_KEY_PREFIX: &str = "scheduler:job:";

#[derive(Clone)]
pub struct JobStore {
    store: Arc<dyn Store>,
}

impl JobStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{JOB_KEY_PREFIX}{id}")
    }

    /// Every persisted job. Records that no longer deserialize are skipped.
    pub async fn load_jobs(&self) -> Result<Vec<ScheduledJob>> {
        let entries = self.store.scan_prefix(JOB_KEY_PREFIX).await?;
        let mut jobs = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_value(value) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(%key, error = %e, "skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    pub async fn save_job(&self, job: &ScheduledJob) -> Result<()> {
        self.store
            .set(&Self::key(&job.id), serde_json::to_value(job)?)
            .await?;
        Ok(())
    }

    pub async fn delete_job(&self, id: &str) -> Result<bool> {
        Ok(self.store.delete(&Self::key(id)).await?)
    }
}
