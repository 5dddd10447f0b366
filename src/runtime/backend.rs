// src/runtime/backend.rs

//! Pluggable device runtime abstraction.
//!
//! The execution context and the stream manager talk to a `DeviceRuntime`
//! instead of a concrete driver. Production bindings wrap a real accelerator
//! API; tests use [`SimulatedRuntime`](super::SimulatedRuntime), optionally
//! wrapped to record the calls it receives.
//!
//! All methods take `&self` so one runtime can be shared behind an `Arc`
//! between the context and whoever allocates memory.

use std::fmt;

use crate::computation::{BufferId, ComputationalElement};
use crate::errors::Result;

/// Handle of a hardware queue. Operations on one stream execute in order;
/// operations on different streams are unordered unless synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream{}", self.0)
    }
}

/// Handle of a completion marker that can be recorded on one stream and
/// waited on by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Recorded, and the work before it has not completed yet.
    Pending,
    /// Never recorded, or all work before it completed.
    Complete,
    /// Work before it failed on the device.
    Failed,
}

/// Capabilities the scheduler needs from an accelerator runtime.
pub trait DeviceRuntime: Send + Sync + fmt::Debug {
    fn create_stream(&self) -> Result<StreamId>;

    fn destroy_stream(&self, stream: StreamId) -> Result<()>;

    fn create_event(&self) -> Result<EventId>;

    fn destroy_event(&self, event: EventId) -> Result<()>;

    /// Mark `event` as reached once everything issued so far on `stream` is done.
    fn record_event(&self, event: EventId, stream: StreamId) -> Result<()>;

    /// Make future work on `stream` wait until `event` is reached.
    fn stream_wait_event(&self, stream: StreamId, event: EventId) -> Result<()>;

    /// Enqueue the hardware work of `element` on `stream`.
    ///
    /// An error means the launch was rejected outright; failures during
    /// execution surface through the status of the next recorded event.
    fn issue(&self, element: &ComputationalElement, stream: StreamId) -> Result<()>;

    fn event_status(&self, event: EventId) -> Result<EventStatus>;

    /// Block until all work on `stream` has completed.
    fn synchronize_stream(&self, stream: StreamId) -> Result<()>;

    /// Block until all work on every stream has completed.
    fn device_synchronize(&self) -> Result<()>;

    fn allocate(&self, bytes: usize) -> Result<BufferId>;

    fn free(&self, buffer: BufferId) -> Result<()>;
}
