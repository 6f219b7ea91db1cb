//! Shared helpers used across all hive crates.

pub mod error;
pub mod time;

pub use {error::ErrorCode, time::now_ms};
