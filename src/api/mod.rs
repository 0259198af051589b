//! Purpose: Define the stable public Rust API boundary for writerpool.
//! Exports: Pool, configuration, storage seam, reporting, and error types.
//! Role: Public, additive-only surface used by the CLI and embedders.
//! Invariants: Resource and timer internals stay private to `core`.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::config::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_EVICT_DELAY, DEFAULT_FLUSH_DELAY, DEFAULT_FLUSH_THRESHOLD,
    DEFAULT_STORAGE_ROOT, PoolConfig,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::key::ResourceKey;
pub use crate::core::pool::{PoolStatus, ResourceInfo, WriterPool};
pub use crate::core::report::{FailureReporter, LogReporter, MaintenanceFailure, TimerKind};
pub use crate::core::storage::{FsStorage, Storage};
