// Core modules implementing the pool, its resources, timers, and error modeling.
pub mod config;
pub mod error;
pub mod key;
pub mod pool;
pub mod report;
pub(crate) mod resource;
pub mod storage;
pub(crate) mod timer;
