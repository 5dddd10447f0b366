use std::sync::Mutex;

use streamdag::computation::{BufferId, ComputationalElement};
use streamdag::errors::Result;
use streamdag::runtime::{DeviceRuntime, EventId, EventStatus, SimulatedRuntime, StreamId};

/// One call a [`RecordingRuntime`] received. Failed calls are recorded too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateStream,
    DestroyStream(StreamId),
    CreateEvent,
    DestroyEvent(EventId),
    RecordEvent { event: EventId, stream: StreamId },
    WaitEvent { stream: StreamId, event: EventId },
    Issue { label: String, stream: StreamId },
    SynchronizeStream(StreamId),
    DeviceSynchronize,
    Allocate(usize),
    Free(BufferId),
}

/// [`SimulatedRuntime`] that logs every call it receives.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    sim: SimulatedRuntime,
    calls: Mutex<Vec<RuntimeCall>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped simulator, for driving it and injecting failures.
    pub fn sim(&self) -> &SimulatedRuntime {
        &self.sim
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// `(label, stream)` of every issued computation, in issue order.
    pub fn issued(&self) -> Vec<(String, StreamId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::Issue { label, stream } => Some((label, stream)),
                _ => None,
            })
            .collect()
    }

    /// Events that `stream` was told to wait on, in order.
    pub fn waits_on(&self, stream: StreamId) -> Vec<EventId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::WaitEvent { stream: s, event } if s == stream => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Total number of cross-stream waits.
    pub fn wait_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::WaitEvent { .. }))
            .count()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceRuntime for RecordingRuntime {
    fn create_stream(&self) -> Result<StreamId> {
        self.record(RuntimeCall::CreateStream);
        self.sim.create_stream()
    }

    fn destroy_stream(&self, stream: StreamId) -> Result<()> {
        self.record(RuntimeCall::DestroyStream(stream));
        self.sim.destroy_stream(stream)
    }

    fn create_event(&self) -> Result<EventId> {
        self.record(RuntimeCall::CreateEvent);
        self.sim.create_event()
    }

    fn destroy_event(&self, event: EventId) -> Result<()> {
        self.record(RuntimeCall::DestroyEvent(event));
        self.sim.destroy_event(event)
    }

    fn record_event(&self, event: EventId, stream: StreamId) -> Result<()> {
        self.record(RuntimeCall::RecordEvent { event, stream });
        self.sim.record_event(event, stream)
    }

    fn stream_wait_event(&self, stream: StreamId, event: EventId) -> Result<()> {
        self.record(RuntimeCall::WaitEvent { stream, event });
        self.sim.stream_wait_event(stream, event)
    }

    fn issue(&self, element: &ComputationalElement, stream: StreamId) -> Result<()> {
        self.record(RuntimeCall::Issue {
            label: element.label().to_string(),
            stream,
        });
        self.sim.issue(element, stream)
    }

    fn event_status(&self, event: EventId) -> Result<EventStatus> {
        self.sim.event_status(event)
    }

    fn synchronize_stream(&self, stream: StreamId) -> Result<()> {
        self.record(RuntimeCall::SynchronizeStream(stream));
        self.sim.synchronize_stream(stream)
    }

    fn device_synchronize(&self) -> Result<()> {
        self.record(RuntimeCall::DeviceSynchronize);
        self.sim.device_synchronize()
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId> {
        self.record(RuntimeCall::Allocate(bytes));
        self.sim.allocate(bytes)
    }

    fn free(&self, buffer: BufferId) -> Result<()> {
        self.record(RuntimeCall::Free(buffer));
        self.sim.free(buffer)
    }
}
