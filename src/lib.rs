//! Purpose: Library crate behind the `writerpool` CLI and its tests.
//! Exports: `core` (pool, resources, timers, errors) and `api` (public surface).
//! Role: Buffered append-only writers keyed by (directory, name), one file each.
//! Invariants: At most one open resource per key; buffers drain before handles close.
//! Invariants: Background failures are reported, never propagated or panicked.
pub mod api;
pub mod core;
