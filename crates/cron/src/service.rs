//! The scheduler: one timer task per enabled job.
//!
//! Each task sleeps until its job's `next_run_at_ms`, fires, and loops with
//! the recomputed next run. Stopping the scheduler aborts every task; the
//! persisted job records are untouched and recovered on the next start.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    chrono_tz::Tz,
    hive_events::{Event, EventBus},
    hive_storage::Store,
    tokio::{sync::RwLock, task::JoinHandle},
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    clock::{Clock, SystemClock},
    parse::parse_cron,
    schedule::next_run,
    store::JobStore,
    types::{ScheduledJob, SchedulerStatus},
};

pub struct Scheduler {
    store: JobStore,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    jobs: RwLock<BTreeMap<String, ScheduledJob>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>) -> Self {
        Self {
            store: JobStore::new(store),
            bus,
            clock: Arc::new(SystemClock),
            tz: Tz::UTC,
            jobs: RwLock::new(BTreeMap::new()),
            timers: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Timezone in which cron fields are evaluated.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    fn compute_next(&self, cron: &str, after_ms: u64) -> Result<u64> {
        next_run(&parse_cron(cron)?, after_ms, self.tz)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Recover persisted jobs and arm a timer for each enabled one.
    ///
    /// Next runs are recomputed from now; persisted values are not trusted.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("scheduler already running");
            return Ok(());
        }

        let loaded = match self.store.load_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            },
        };
        let now = self.clock.now_ms();
        let mut recovered = BTreeMap::new();

        for mut job in loaded {
            if job.enabled {
                match self.compute_next(&job.cron, now) {
                    Ok(next) => job.next_run_at_ms = Some(next),
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "cannot schedule recovered job, disabling");
                        job.enabled = false;
                        job.next_run_at_ms = None;
                    },
                }
            } else {
                job.next_run_at_ms = None;
            }
            if let Err(e) = self.store.save_job(&job).await {
                warn!(job_id = %job.id, error = %e, "failed to persist recovered job");
            }
            recovered.insert(job.id.clone(), job);
        }

        let to_arm: Vec<(String, u64)> = recovered
            .values()
            .filter(|j| j.enabled)
            .filter_map(|j| j.next_run_at_ms.map(|n| (j.id.clone(), n)))
            .collect();
        let count = recovered.len();
        *self.jobs.write().await = recovered;

        for (id, next) in &to_arm {
            self.arm(id, *next);
        }
        info!(jobs = count, armed = to_arm.len(), "scheduler started");
        Ok(())
    }

    /// Cancel every timer. Persisted jobs are kept.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let timers: Vec<JoinHandle<()>> = {
            let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
            timers.drain().map(|(_, h)| h).collect()
        };
        for handle in &timers {
            handle.abort();
        }
        info!(cancelled = timers.len(), "scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Job management ──────────────────────────────────────────────────────

    /// Add or replace a job. An empty id gets a generated one.
    pub async fn add_job(self: &Arc<Self>, mut job: ScheduledJob) -> Result<ScheduledJob> {
        if job.id.is_empty() {
            job.id = uuid::Uuid::new_v4().to_string();
        }
        let expr = parse_cron(&job.cron)?;
        if job.enabled {
            if job.next_run_at_ms.is_none() {
                job.next_run_at_ms = Some(next_run(&expr, self.clock.now_ms(), self.tz)?);
            }
        } else {
            job.next_run_at_ms = None;
        }

        self.store.save_job(&job).await?;
        self.jobs.write().await.insert(job.id.clone(), job.clone());

        self.cancel(&job.id);
        if self.is_running()
            && job.enabled
            && let Some(next) = job.next_run_at_ms
        {
            self.arm(&job.id, next);
        }
        info!(job_id = %job.id, cron = %job.cron, agent_id = %job.agent_id, enabled = job.enabled, "job added");
        Ok(job)
    }

    /// Cancel, forget, and delete a job.
    pub async fn remove_job(&self, id: &str) -> Result<()> {
        self.cancel(id);
        let removed = self.jobs.write().await.remove(id);
        let deleted = self.store.delete_job(id).await?;
        if removed.is_none() && !deleted {
            return Err(Error::job_not_found(id));
        }
        info!(job_id = %id, "job removed");
        Ok(())
    }

    pub async fn enable_job(self: &Arc<Self>, id: &str) -> Result<ScheduledJob> {
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(id).ok_or_else(|| Error::job_not_found(id))?;
            let next = self.compute_next(&job.cron, self.clock.now_ms())?;
            job.enabled = true;
            job.next_run_at_ms = Some(next);
            job.clone()
        };
        self.store.save_job(&job).await?;

        self.cancel(id);
        if self.is_running()
            && let Some(next) = job.next_run_at_ms
        {
            self.arm(id, next);
        }
        info!(job_id = %id, "job enabled");
        Ok(job)
    }

    pub async fn disable_job(&self, id: &str) -> Result<ScheduledJob> {
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(id).ok_or_else(|| Error::job_not_found(id))?;
            job.enabled = false;
            job.next_run_at_ms = None;
            job.clone()
        };
        self.cancel(id);
        self.store.save_job(&job).await?;
        info!(job_id = %id, "job disabled");
        Ok(job)
    }

    /// Publish a heartbeat for `id` right away without touching its schedule.
    pub async fn run_now(&self, id: &str) -> Result<()> {
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(id).ok_or_else(|| Error::job_not_found(id))?;
            job.last_run_at_ms = Some(self.clock.now_ms());
            job.clone()
        };
        self.store.save_job(&job).await?;
        self.bus.publish(heartbeat(&job, self.clock.now_ms())).await;
        Ok(())
    }

    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn get_job(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.read().await;
        SchedulerStatus {
            running: self.is_running(),
            job_count: jobs.len(),
            enabled_count: jobs.values().filter(|j| j.enabled).count(),
            next_run_at_ms: jobs.values().filter_map(|j| j.next_run_at_ms).min(),
        }
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    fn arm(self: &Arc<Self>, id: &str, next_run_at_ms: u64) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let clock = Arc::clone(&self.clock);
        let job_id = id.to_string();

        let handle = tokio::spawn(async move {
            let mut next = next_run_at_ms;
            loop {
                let delay = next.saturating_sub(clock.now_ms());
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                match scheduler.fire(&job_id).await {
                    Some(n) => next = n,
                    None => break,
                }
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = timers.insert(id.to_string(), handle) {
            old.abort();
        }
        debug!(job_id = %id, next_run_at_ms, "job timer armed");
    }

    fn cancel(&self, id: &str) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timers.remove(id) {
            handle.abort();
        }
    }

    /// Stamp, reschedule, persist, and publish. Returns the next run if the
    /// timer should keep going.
    async fn fire(&self, id: &str) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        let now = self.clock.now_ms();
        let job = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(id)?;
            if !job.enabled {
                return None;
            }
            job.last_run_at_ms = Some(now);
            job.next_run_at_ms = match self.compute_next(&job.cron, now) {
                Ok(next) => Some(next),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "job has no further runs, disabling");
                    job.enabled = false;
                    None
                },
            };
            job.clone()
        };

        if let Err(e) = self.store.save_job(&job).await {
            warn!(job_id = %id, error = %e, "failed to persist job state");
        }

        debug!(job_id = %id, agent_id = %job.agent_id, "job fired");
        // Publish outside the timer task so cancelling the timer never
        // cancels in-flight handlers.
        let bus = Arc::clone(&self.bus);
        let event = heartbeat(&job, now);
        tokio::spawn(async move { bus.publish(event).await });

        if self.is_running() {
            job.next_run_at_ms
        } else {
            None
        }
    }
}

fn heartbeat(job: &ScheduledJob, fired_at_ms: u64) -> Event {
    Event::AgentHeartbeat {
        job_id: job.id.clone(),
        agent_id: job.agent_id.clone(),
        action: job.action,
        payload: job.payload.clone(),
        fired_at_ms,
    }
}
