//! In-process publish/subscribe for the gateway.
//!
//! Every event belongs to a closed vocabulary ([`EventKind`]) and carries a
//! typed payload ([`Event`]). The [`EventBus`] fans each published event out
//! to all current subscribers concurrently and isolates their failures.

pub mod bus;
pub mod event;

pub use {
    bus::{ErrorSink, EventBus, EventHandler, HandlerFailure, SubscriptionId},
    event::{Event, EventKind, HeartbeatAction, UnknownEventKind},
};
