//! Cron-driven heartbeats for agents.
//!
//! Jobs are persisted in the shared store under `scheduler:job:<id>` and
//! publish `agent:heartbeat` events on the bus when they fire.

pub mod clock;
pub mod error;
pub mod parse;
pub mod schedule;
pub mod service;
pub mod store;
pub mod types;

pub use {
    clock::{Clock, SystemClock, TokioClock},
    error::{Error, Result},
    parse::{CronExpr, parse_cron},
    schedule::{next_run, parse_timezone},
    service::Scheduler,
    store::JobStore,
    types::{ScheduledJob, SchedulerStatus},
};
