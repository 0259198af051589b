//! Purpose: Carry background maintenance failures out of timer threads.
//! Exports: `FailureReporter`, `MaintenanceFailure`, `TimerKind`, `LogReporter`.
//! Role: Side channel for errors that have no synchronous caller.
//! Invariants: Reporting never panics and never blocks pool progress.
use std::fmt;

use crate::core::error::Error;
use crate::core::key::ResourceKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimerKind {
    Flush,
    Evict,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Flush => f.write_str("flush"),
            TimerKind::Evict => f.write_str("evict"),
        }
    }
}

#[derive(Debug)]
pub struct MaintenanceFailure {
    pub timer: TimerKind,
    pub key: ResourceKey,
    pub resource_id: u64,
    pub error: Error,
}

pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: MaintenanceFailure);
}

/// Default reporter: emits one `tracing` error event per failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, failure: MaintenanceFailure) {
        tracing::error!(
            timer = %failure.timer,
            key = %failure.key,
            resource_id = failure.resource_id,
            error = %failure.error,
            "background maintenance failed"
        );
    }
}
