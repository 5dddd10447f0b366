// src/runtime/simulated.rs

//! Deterministic in-memory device.
//!
//! Every stream is a FIFO of operations (`wait`, `launch`, `record`). Nothing
//! runs on its own: work only progresses when the owner drives the device
//! through [`SimulatedRuntime::step`], [`SimulatedRuntime::run_until_idle`] or
//! one of the synchronize calls of [`DeviceRuntime`]. This lets tests look at
//! the scheduler while work is still in flight.
//!
//! Failures propagate through completion events: a failed launch poisons its
//! stream, so every launch queued behind it fails and every event recorded
//! behind it is `Failed`. A stream that waits on a failed event is poisoned
//! the same way. A stream recovers once its queue has drained.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::computation::{BufferId, ComputationalElement};
use crate::errors::{Result, SchedError};
use crate::runtime::backend::{DeviceRuntime, EventId, EventStatus, StreamId};

#[derive(Debug, Clone)]
enum SimOp {
    Wait(EventId),
    Launch { label: String, fails: bool },
    Record(EventId),
}

#[derive(Debug, Default)]
struct SimStream {
    ops: VecDeque<SimOp>,
    /// Set by a failed launch or a wait on a failed event; cleared when the
    /// queue runs empty.
    poisoned: bool,
}

#[derive(Debug, Default)]
struct SimState {
    next_stream: u32,
    next_event: u64,
    next_buffer: u64,
    streams: BTreeMap<StreamId, SimStream>,
    events: HashMap<EventId, EventStatus>,
    buffers: HashSet<BufferId>,
    rejected_kernels: HashSet<String>,
    failing_kernels: HashSet<String>,
    /// Streams the device can hold at once; unbounded if `None`.
    stream_limit: Option<usize>,
    executed: Vec<String>,
}

impl SimState {
    fn stream_mut(&mut self, stream: StreamId) -> Result<&mut SimStream> {
        self.streams
            .get_mut(&stream)
            .ok_or(SchedError::UnknownStream(stream))
    }

    fn pending_operations(&self) -> usize {
        self.streams.values().map(|s| s.ops.len()).sum()
    }

    /// One pass over all streams, executing at most one operation each.
    fn step(&mut self) -> usize {
        let ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.into_iter().filter(|id| self.advance(*id)).count()
    }

    fn advance(&mut self, id: StreamId) -> bool {
        let Some(op) = self.streams.get(&id).and_then(|s| s.ops.front()).cloned() else {
            return false;
        };

        match op {
            SimOp::Wait(event) => match self.events.get(&event).copied() {
                Some(EventStatus::Pending) => return false,
                Some(EventStatus::Failed) => {
                    trace!(%id, %event, "waited on failed event; poisoning stream");
                    if let Some(s) = self.streams.get_mut(&id) {
                        s.poisoned = true;
                    }
                }
                // Unknown (destroyed) events and complete ones do not block.
                Some(EventStatus::Complete) | None => {}
            },
            SimOp::Launch { label, fails } => {
                let Some(s) = self.streams.get_mut(&id) else {
                    return false;
                };
                if s.poisoned || fails {
                    s.poisoned = true;
                    debug!(%id, kernel = %label, "simulated launch failed");
                } else {
                    trace!(%id, kernel = %label, "simulated launch completed");
                    self.executed.push(label);
                }
            }
            SimOp::Record(event) => {
                let Some(s) = self.streams.get_mut(&id) else {
                    return false;
                };
                let status = if s.poisoned {
                    EventStatus::Failed
                } else {
                    EventStatus::Complete
                };
                self.events.insert(event, status);
            }
        }

        if let Some(s) = self.streams.get_mut(&id) {
            s.ops.pop_front();
            if s.ops.is_empty() {
                s.poisoned = false;
            }
        }
        true
    }

    fn run_until_idle(&mut self) -> Result<()> {
        while self.step() > 0 {}
        match self.pending_operations() {
            0 => Ok(()),
            n => Err(SchedError::Device(format!(
                "simulated device stalled with {n} pending operations"
            ))),
        }
    }
}

/// Deterministic, manually driven implementation of [`DeviceRuntime`].
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    state: Mutex<SimState>,
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| SchedError::Device("simulated device state poisoned".to_string()))
    }

    /// Reject every future launch of kernels named `name` at issue time.
    pub fn fail_launches_of(&self, name: &str) -> Result<()> {
        self.state()?.rejected_kernels.insert(name.to_string());
        Ok(())
    }

    /// Accept launches of `name`, but fail them when they execute.
    pub fn fail_executions_of(&self, name: &str) -> Result<()> {
        self.state()?.failing_kernels.insert(name.to_string());
        Ok(())
    }

    /// Refuse to create streams once `limit` of them are alive.
    pub fn limit_streams(&self, limit: usize) -> Result<()> {
        self.state()?.stream_limit = Some(limit);
        Ok(())
    }

    /// Execute at most one operation per stream. Returns how many ran.
    pub fn step(&self) -> Result<usize> {
        Ok(self.state()?.step())
    }

    /// Run until no stream can make progress. Fails if work is left blocked.
    pub fn run_until_idle(&self) -> Result<()> {
        self.state()?.run_until_idle()
    }

    pub fn pending_operations(&self) -> Result<usize> {
        Ok(self.state()?.pending_operations())
    }

    /// Labels of successfully executed launches, in execution order.
    pub fn executed(&self) -> Result<Vec<String>> {
        Ok(self.state()?.executed.clone())
    }

    pub fn live_streams(&self) -> Result<usize> {
        Ok(self.state()?.streams.len())
    }

    pub fn live_events(&self) -> Result<usize> {
        Ok(self.state()?.events.len())
    }

    pub fn is_allocated(&self, buffer: BufferId) -> Result<bool> {
        Ok(self.state()?.buffers.contains(&buffer))
    }

    pub fn live_buffers(&self) -> Result<usize> {
        Ok(self.state()?.buffers.len())
    }
}

impl DeviceRuntime for SimulatedRuntime {
    fn create_stream(&self) -> Result<StreamId> {
        let mut st = self.state()?;
        if st.stream_limit.is_some_and(|limit| st.streams.len() >= limit) {
            return Err(SchedError::Device(format!(
                "out of streams ({} alive)",
                st.streams.len()
            )));
        }
        let id = StreamId(st.next_stream);
        st.next_stream += 1;
        st.streams.insert(id, SimStream::default());
        Ok(id)
    }

    fn destroy_stream(&self, stream: StreamId) -> Result<()> {
        let mut st = self.state()?;
        match st.streams.remove(&stream) {
            Some(s) if !s.ops.is_empty() => {
                warn!(%stream, pending = s.ops.len(), "destroying stream with pending work");
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(SchedError::UnknownStream(stream)),
        }
    }

    fn create_event(&self) -> Result<EventId> {
        let mut st = self.state()?;
        let id = EventId(st.next_event);
        st.next_event += 1;
        st.events.insert(id, EventStatus::Complete);
        Ok(id)
    }

    fn destroy_event(&self, event: EventId) -> Result<()> {
        self.state()?.events.remove(&event);
        Ok(())
    }

    fn record_event(&self, event: EventId, stream: StreamId) -> Result<()> {
        let mut st = self.state()?;
        if !st.events.contains_key(&event) {
            return Err(SchedError::Device(format!("record of unknown {event}")));
        }
        st.stream_mut(stream)?.ops.push_back(SimOp::Record(event));
        st.events.insert(event, EventStatus::Pending);
        Ok(())
    }

    fn stream_wait_event(&self, stream: StreamId, event: EventId) -> Result<()> {
        self.state()?
            .stream_mut(stream)?
            .ops
            .push_back(SimOp::Wait(event));
        Ok(())
    }

    fn issue(&self, element: &ComputationalElement, stream: StreamId) -> Result<()> {
        let mut st = self.state()?;
        let label = element.label().to_string();

        if st.rejected_kernels.contains(&label) {
            return Err(SchedError::Device(format!(
                "launch of '{label}' rejected by device"
            )));
        }
        if let Some(missing) = element
            .arguments()
            .iter()
            .filter_map(|arg| arg.buffer_id())
            .find(|id| !st.buffers.contains(id))
        {
            return Err(SchedError::InvalidBuffer(missing.0));
        }

        let fails = st.failing_kernels.contains(&label);
        st.stream_mut(stream)?
            .ops
            .push_back(SimOp::Launch { label, fails });
        Ok(())
    }

    fn event_status(&self, event: EventId) -> Result<EventStatus> {
        self.state()?
            .events
            .get(&event)
            .copied()
            .ok_or_else(|| SchedError::Device(format!("status of unknown {event}")))
    }

    fn synchronize_stream(&self, stream: StreamId) -> Result<()> {
        let mut st = self.state()?;
        loop {
            let remaining = st
                .streams
                .get(&stream)
                .map(|s| s.ops.len())
                .ok_or(SchedError::UnknownStream(stream))?;
            if remaining == 0 {
                return Ok(());
            }
            if st.step() == 0 {
                return Err(SchedError::Device(format!(
                    "{stream} stalled with {remaining} pending operations"
                )));
            }
        }
    }

    fn device_synchronize(&self) -> Result<()> {
        self.state()?.run_until_idle()
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId> {
        let mut st = self.state()?;
        let id = BufferId(st.next_buffer);
        st.next_buffer += 1;
        st.buffers.insert(id);
        trace!(buffer = %id, bytes, "simulated allocation");
        Ok(id)
    }

    fn free(&self, buffer: BufferId) -> Result<()> {
        if self.state()?.buffers.remove(&buffer) {
            Ok(())
        } else {
            Err(SchedError::InvalidBuffer(buffer.0))
        }
    }
}
