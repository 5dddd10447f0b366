// src/stream/mod.rs

//! Stream pool, stream assignment and cross-stream synchronization.

pub mod manager;

pub use manager::{StreamManager, StreamUsage};
