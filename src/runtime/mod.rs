// src/runtime/mod.rs

//! Device runtime layer.
//!
//! The scheduler never talks to a driver directly; it goes through the
//! [`DeviceRuntime`] trait:
//!
//! - [`backend`] defines the trait and the stream/event identifiers.
//! - [`simulated`] provides [`SimulatedRuntime`], a deterministic in-memory
//!   device used by tests and by the `streamdag` replay tool.

pub mod backend;
pub mod simulated;

pub use backend::{DeviceRuntime, EventId, EventStatus, StreamId};
pub use simulated::SimulatedRuntime;
