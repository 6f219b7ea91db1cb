//! Gateway daemon core.
//!
//! [`Gateway`] owns the event bus, opens storage, starts the scheduler and
//! plugins, and serves the control protocol on a local endpoint.

pub mod error;
pub mod gateway;
pub(crate) mod server;
pub mod state;

pub use {
    error::{Error, Result},
    gateway::{Gateway, STOP_DELAY},
    state::GatewayState,
};
