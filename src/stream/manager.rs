// src/stream/manager.rs

//! Per-session pool of streams and the assignment discipline built on it.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::{debug, trace, warn};

use crate::dag::{ExecutionDag, VertexId};
use crate::errors::{Result, SchedError};
use crate::runtime::{DeviceRuntime, EventId, StreamId};

/// Bookkeeping for one stream.
#[derive(Debug, Default)]
struct StreamSlot {
    /// Vertices bound to this stream that have not been seen to finish.
    active: BTreeSet<VertexId>,
    /// Most recent vertex bound to this stream.
    tail: Option<VertexId>,
    bound_total: usize,
}

/// Usage statistics of one stream, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUsage {
    pub stream: StreamId,
    pub bound_total: usize,
    pub active: usize,
}

/// Owns every stream and completion event of a session.
///
/// Vertices only hold a [`StreamId`]; streams go back to the free pool once
/// all of their vertices have finished, and are destroyed in
/// [`StreamManager::cleanup`].
#[derive(Debug, Default)]
pub struct StreamManager {
    slots: BTreeMap<StreamId, StreamSlot>,
    /// Idle streams, oldest first.
    free: VecDeque<StreamId>,
    events: HashSet<EventId>,
    max_streams: Option<usize>,
    /// Next stream to hand out once `max_streams` is reached.
    round_robin: usize,
}

impl StreamManager {
    pub fn new(max_streams: Option<usize>) -> Self {
        Self {
            max_streams,
            ..Self::default()
        }
    }

    pub fn num_streams(&self) -> usize {
        self.slots.len()
    }

    pub fn free_streams(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.free.iter().copied()
    }

    pub fn usage(&self) -> Vec<StreamUsage> {
        self.slots
            .iter()
            .map(|(&stream, slot)| StreamUsage {
                stream,
                bound_total: slot.bound_total,
                active: slot.active.len(),
            })
            .collect()
    }

    /// Allocate a new stream through the runtime and add it to the pool.
    pub fn create_stream(&mut self, runtime: &dyn DeviceRuntime) -> Result<StreamId> {
        let stream = runtime.create_stream()?;
        self.slots.insert(stream, StreamSlot::default());
        debug!(%stream, total = self.slots.len(), "created stream");
        Ok(stream)
    }

    /// Choose a stream for `vertex` and bind it.
    ///
    /// A vertex with exactly one unfinished parent continues on the parent's
    /// stream, as long as nothing else was bound there after the parent.
    /// Everything else gets an idle stream, or a new one.
    pub fn assign(
        &mut self,
        dag: &mut ExecutionDag,
        vertex: VertexId,
        runtime: &dyn DeviceRuntime,
    ) -> Result<StreamId> {
        let unfinished: Vec<VertexId> = dag
            .parent_vertices(vertex)
            .filter(|&p| !dag.element(p).is_computation_finished())
            .collect();

        let reused = match unfinished.as_slice() {
            [parent] => self.chain_stream(dag, *parent),
            _ => None,
        };
        let stream = match reused {
            Some(stream) => {
                trace!(vertex, %stream, "continuing parent chain");
                stream
            }
            None => self.acquire(runtime)?,
        };

        self.bind(stream, vertex);
        dag.element_mut(vertex).bind_stream(stream);
        debug!(
            vertex,
            %stream,
            unfinished_parents = unfinished.len(),
            "assigned stream"
        );
        Ok(stream)
    }

    /// Parent's stream, if the parent is still its last vertex.
    fn chain_stream(&self, dag: &ExecutionDag, parent: VertexId) -> Option<StreamId> {
        let stream = dag.element(parent).stream()?;
        let slot = self.slots.get(&stream)?;
        (slot.tail == Some(parent)).then_some(stream)
    }

    fn acquire(&mut self, runtime: &dyn DeviceRuntime) -> Result<StreamId> {
        while let Some(stream) = self.free.pop_front() {
            if self.slots.get(&stream).is_some_and(|s| s.active.is_empty()) {
                trace!(%stream, "reusing idle stream");
                return Ok(stream);
            }
        }

        match self.max_streams {
            Some(max) if self.slots.len() >= max && max > 0 => {
                // Ordering stays correct through the per-parent event waits.
                let stream = *self
                    .slots
                    .keys()
                    .nth(self.round_robin % self.slots.len())
                    .ok_or_else(|| SchedError::Device("stream pool is empty".to_string()))?;
                self.round_robin += 1;
                trace!(%stream, max, "stream limit reached; sharing a busy stream");
                Ok(stream)
            }
            _ => self.create_stream(runtime),
        }
    }

    fn bind(&mut self, stream: StreamId, vertex: VertexId) {
        self.free.retain(|&s| s != stream);
        let slot = self.slots.entry(stream).or_default();
        slot.active.insert(vertex);
        slot.tail = Some(vertex);
        slot.bound_total += 1;
    }

    /// Make the stream of `vertex` wait for every unfinished parent that runs
    /// on a different stream. Returns the number of waits inserted.
    ///
    /// Fails closed: a failed parent, or an unfinished one without a
    /// completion event, is an error and nothing is enqueued for `vertex`.
    pub fn synchronize_parents(
        &self,
        dag: &ExecutionDag,
        vertex: VertexId,
        runtime: &dyn DeviceRuntime,
    ) -> Result<usize> {
        let stream = dag
            .element(vertex)
            .stream()
            .ok_or(SchedError::UnboundVertex(vertex))?;

        let mut waits = Vec::new();
        for parent in dag.parent_vertices(vertex) {
            let element = dag.element(parent);
            if element.is_failed() {
                return Err(SchedError::ParentFailed { vertex, parent });
            }
            if element.is_computation_finished() || element.stream() == Some(stream) {
                continue;
            }
            let event = element
                .completion_event()
                .ok_or(SchedError::MissingParentEvent { vertex, parent })?;
            waits.push((parent, event));
        }

        for &(parent, event) in &waits {
            trace!(vertex, parent, %event, %stream, "inserting cross-stream wait");
            runtime.stream_wait_event(stream, event)?;
        }
        Ok(waits.len())
    }

    /// Record the completion event of `vertex` on its stream, right after its
    /// work was issued.
    pub fn record_completion(
        &mut self,
        dag: &ExecutionDag,
        vertex: VertexId,
        runtime: &dyn DeviceRuntime,
    ) -> Result<EventId> {
        let stream = dag
            .element(vertex)
            .stream()
            .ok_or(SchedError::UnboundVertex(vertex))?;
        let event = runtime.create_event()?;
        self.events.insert(event);
        runtime.record_event(event, stream)?;
        Ok(event)
    }

    /// `vertex` on `stream` reached a terminal state.
    pub fn on_finished(&mut self, stream: StreamId, vertex: VertexId) {
        let Some(slot) = self.slots.get_mut(&stream) else {
            return;
        };
        slot.active.remove(&vertex);
        if slot.active.is_empty() && !self.free.contains(&stream) {
            trace!(%stream, "stream idle; returned to pool");
            self.free.push_back(stream);
        }
    }

    /// Destroy a completion event nobody can wait on any more.
    pub fn release_event(&mut self, event: EventId, runtime: &dyn DeviceRuntime) -> Result<()> {
        if self.events.remove(&event) {
            runtime.destroy_event(event)?;
        }
        Ok(())
    }

    /// Destroy every event and stream. Safe to call repeatedly.
    pub fn cleanup(&mut self, runtime: &dyn DeviceRuntime) -> Result<()> {
        let mut first_error = None;

        for event in self.events.drain() {
            if let Err(e) = runtime.destroy_event(event) {
                warn!(%event, error = %e, "failed to destroy event");
                first_error.get_or_insert(e);
            }
        }
        for (stream, slot) in std::mem::take(&mut self.slots) {
            if !slot.active.is_empty() {
                warn!(%stream, active = slot.active.len(), "destroying stream with unfinished work");
            }
            if let Err(e) = runtime.destroy_stream(stream) {
                warn!(%stream, error = %e, "failed to destroy stream");
                first_error.get_or_insert(e);
            }
        }
        self.free.clear();
        self.round_robin = 0;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::{Argument, ArgumentType, BufferId, ComputationKind, ComputationalElement};
    use crate::runtime::SimulatedRuntime;

    fn touching(ids: &[u64]) -> ComputationalElement {
        ComputationalElement::new(
            ComputationKind::ArrayAccess {
                buffer: BufferId(0),
                write: true,
            },
            ids.iter()
                .map(|&id| Argument::array(ArgumentType::Float, &BufferId(id), false))
                .collect(),
        )
    }

    #[test]
    fn chain_stays_on_one_stream_and_independent_work_fans_out() {
        let rt = SimulatedRuntime::new();
        let mut dag = ExecutionDag::default();
        let mut streams = StreamManager::new(None);

        let a = dag.append(touching(&[1]));
        let sa = streams.assign(&mut dag, a, &rt).unwrap();
        let b = dag.append(touching(&[1]));
        let sb = streams.assign(&mut dag, b, &rt).unwrap();
        let c = dag.append(touching(&[2]));
        let sc = streams.assign(&mut dag, c, &rt).unwrap();

        assert_eq!(sa, sb);
        assert_ne!(sa, sc);
        assert_eq!(streams.num_streams(), 2);
    }

    #[test]
    fn second_child_of_a_parent_gets_its_own_stream() {
        let rt = SimulatedRuntime::new();
        let mut dag = ExecutionDag::default();
        let mut streams = StreamManager::new(None);

        // Writer of 1 and 2, then two readers that each continue from it.
        let a = dag.append(touching(&[1, 2]));
        let sa = streams.assign(&mut dag, a, &rt).unwrap();
        let b = dag.append(touching(&[1]));
        let sb = streams.assign(&mut dag, b, &rt).unwrap();
        let c = dag.append(touching(&[2]));
        let sc = streams.assign(&mut dag, c, &rt).unwrap();

        assert_eq!(sa, sb);
        assert_ne!(sc, sa);
    }

    #[test]
    fn streams_return_to_pool_only_when_all_work_finished() {
        let rt = SimulatedRuntime::new();
        let mut dag = ExecutionDag::default();
        let mut streams = StreamManager::new(None);

        let a = dag.append(touching(&[1]));
        let sa = streams.assign(&mut dag, a, &rt).unwrap();
        let b = dag.append(touching(&[1]));
        streams.assign(&mut dag, b, &rt).unwrap();

        streams.on_finished(sa, a);
        assert_eq!(streams.free_streams().count(), 0);
        streams.on_finished(sa, b);
        assert_eq!(streams.free_streams().collect::<Vec<_>>(), vec![sa]);

        let c = dag.append(touching(&[9]));
        assert_eq!(streams.assign(&mut dag, c, &rt).unwrap(), sa);
        assert_eq!(streams.free_streams().count(), 0);
    }

    #[test]
    fn stream_limit_shares_existing_streams() {
        let rt = SimulatedRuntime::new();
        let mut dag = ExecutionDag::default();
        let mut streams = StreamManager::new(Some(2));

        for id in 0..5 {
            let v = dag.append(touching(&[id]));
            streams.assign(&mut dag, v, &rt).unwrap();
        }
        assert_eq!(streams.num_streams(), 2);
        assert_eq!(rt.live_streams().unwrap(), 2);
    }

    #[test]
    fn failed_parent_fails_closed() {
        let rt = SimulatedRuntime::new();
        let mut dag = ExecutionDag::default();
        let mut streams = StreamManager::new(None);

        let a = dag.append(touching(&[1]));
        streams.assign(&mut dag, a, &rt).unwrap();
        dag.element_mut(a)
            .mark_failed(crate::computation::FailureCause::Launch("boom".into()));
        let b = dag.append(touching(&[1]));
        streams.assign(&mut dag, b, &rt).unwrap();

        let err = streams.synchronize_parents(&dag, b, &rt).unwrap_err();
        assert!(matches!(err, SchedError::ParentFailed { vertex: 1, parent: 0 }));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let rt = SimulatedRuntime::new();
        let mut streams = StreamManager::new(None);
        streams.create_stream(&rt).unwrap();
        streams.create_stream(&rt).unwrap();

        streams.cleanup(&rt).unwrap();
        streams.cleanup(&rt).unwrap();
        assert_eq!(streams.num_streams(), 0);
        assert_eq!(rt.live_streams().unwrap(), 0);
    }
}
