// src/exec/mod.rs

//! Executor seam.
//!
//! jobdag never runs payloads itself. The runtime hands ready jobs to an
//! [`ExecutorBackend`] and waits for completion events.

pub mod backend;

pub use backend::{ChannelExecutorBackend, ExecutorBackend};
