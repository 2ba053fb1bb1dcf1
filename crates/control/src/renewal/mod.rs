//! Automatic certificate renewal.
//!
//! - [`RenewalManager`]: one sweep over every host with a bounded worker pool
//! - [`RenewalScheduler`]: runs sweeps on an interval, one at a time
//! - [`RenewalLogWriter`]: where per-host outcomes end up

mod log;
mod manager;
mod scheduler;

pub use log::{FanoutLogWriter, FileLogWriter, RenewalLogRecord, RenewalLogWriter, TracingLogWriter};
pub use manager::{
    RenewalManager, RenewalResult, SweepSummary, DEFAULT_MAX_WORKERS, DEFAULT_RENEW_BEFORE,
};
pub use scheduler::{RenewalScheduler, Sweep, DEFAULT_CHECK_INTERVAL};
