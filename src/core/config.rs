//! Purpose: Hold the tunables of a writer pool as one explicit value.
//! Exports: `PoolConfig` and the `DEFAULT_*` constants.
//! Role: Passed into `WriterPool` at construction; read-only afterwards.
//! Invariants: `flush_threshold` stays below `buffer_capacity` so a threshold flush
//! happens before the buffer is forced to spill on its own.
//! Invariants: Timer delays are non-zero.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_STORAGE_ROOT: &str = "data";
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 2048;
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_EVICT_DELAY: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    pub storage_root: PathBuf,
    pub buffer_capacity: usize,
    pub flush_threshold: usize,
    pub flush_delay: Duration,
    pub evict_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            flush_delay: DEFAULT_FLUSH_DELAY,
            evict_delay: DEFAULT_EVICT_DELAY,
        }
    }
}

impl PoolConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn with_flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    pub fn with_evict_delay(mut self, delay: Duration) -> Self {
        self.evict_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_capacity == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("buffer capacity must be non-zero"));
        }
        if self.flush_threshold >= self.buffer_capacity {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "flush threshold ({}) must be smaller than buffer capacity ({})",
                    self.flush_threshold, self.buffer_capacity
                ))
                .with_hint("Lower --flush-threshold or raise --buffer-capacity."));
        }
        if self.flush_delay.is_zero() || self.evict_delay.is_zero() {
            return Err(Error::new(ErrorKind::Usage).with_message("timer delays must be non-zero"));
        }
        Ok(())
    }
}
