// src/context/mod.rs

//! The execution context: entry point for submitting work.
//!
//! Registration inserts an element into the [`ExecutionDag`], binds it to a
//! stream through the [`StreamManager`] and hands it to the configured
//! [`IssuePolicy`]. Issuing a vertex means emitting the event waits on its
//! off-stream parents, enqueuing its work and recording its completion event.
//!
//! Completions are observed lazily: the context polls the completion events
//! of running work when new work is registered and when it is queried.

pub mod issue;
pub mod summary;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::computation::dependency::policy_for;
use crate::computation::{
    ArgumentType, BufferId, BufferIdentity, CallValue, ComputationalElement, DeviceArray,
    ElementState, FailureCause, Kernel, KernelId, LaunchConfig,
};
use crate::dag::{ExecutionDag, VertexId};
use crate::errors::{Result, SchedError};
use crate::runtime::{DeviceRuntime, EventStatus};
use crate::stream::StreamManager;
use crate::types::{DependencyPolicyKind, IssuePolicyKind};

pub use issue::{issue_policy_for, DeferredIssue, EagerIssue, IssuePolicy};
pub use summary::{ContextSummary, VertexSummary};

/// Construction-time choices for an [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub dependency_policy: DependencyPolicyKind,
    pub issue_policy: IssuePolicyKind,
    /// Only used by deferred issue.
    pub batch_size: usize,
    pub max_streams: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            dependency_policy: DependencyPolicyKind::default(),
            issue_policy: IssuePolicyKind::default(),
            batch_size: 8,
            max_streams: None,
        }
    }
}

/// Refers to one registered computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationHandle {
    vertex: VertexId,
}

impl ComputationHandle {
    pub fn vertex(&self) -> VertexId {
        self.vertex
    }
}

/// Single-writer owner of a scheduling session.
#[derive(Debug)]
pub struct ExecutionContext {
    runtime: Arc<dyn DeviceRuntime>,
    dag: ExecutionDag,
    streams: StreamManager,
    issue: Box<dyn IssuePolicy>,
    arrays: HashMap<BufferId, DeviceArray>,
    kernels: HashMap<KernelId, Kernel>,
    /// Issued vertices not yet seen to finish, in issue order.
    running: Vec<VertexId>,
}

impl ExecutionContext {
    pub fn new(runtime: Arc<dyn DeviceRuntime>, options: ContextOptions) -> Self {
        let dag = ExecutionDag::new(policy_for(options.dependency_policy));
        let issue = issue_policy_for(options.issue_policy, options.batch_size);
        info!(
            dependency_policy = dag.policy().name(),
            issue_policy = issue.name(),
            max_streams = ?options.max_streams,
            "execution context created"
        );
        Self {
            runtime,
            dag,
            streams: StreamManager::new(options.max_streams),
            issue,
            arrays: HashMap::new(),
            kernels: HashMap::new(),
            running: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    pub fn dag(&self) -> &ExecutionDag {
        &self.dag
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    /// Insert `element` in the DAG, bind it to a stream and let the issue
    /// policy decide when it reaches the device.
    ///
    /// A launch the runtime rejects does not make this call fail: the element
    /// is marked failed and [`ExecutionContext::wait`] reports it.
    pub fn register_execution(
        &mut self,
        element: ComputationalElement,
    ) -> Result<ComputationHandle> {
        self.observe_completions()?;

        let host_access = element.kind().requires_host_sync();
        let vertex = self.dag.append(element);
        let stream = match self.streams.assign(&mut self.dag, vertex, self.runtime.as_ref()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(vertex, error = %e, "no stream available for vertex");
                self.fail_vertex(vertex, FailureCause::Launch(e.to_string()));
                return Err(e);
            }
        };

        for ready in self.issue.on_registered(vertex, host_access) {
            self.issue_vertex(ready)?;
        }

        if host_access && !self.dag.element(vertex).is_computation_finished() {
            trace!(vertex, %stream, "host access; synchronizing its stream");
            self.runtime.synchronize_stream(stream)?;
            self.observe_completions()?;
        }

        Ok(ComputationHandle { vertex })
    }

    /// Issue everything the issue policy is holding back.
    pub fn flush(&mut self) -> Result<()> {
        // Parents that failed since the last poll must fail their children
        // here rather than on the device.
        self.observe_completions()?;
        let pending = self.issue.drain();
        if !pending.is_empty() {
            debug!(count = pending.len(), "flushing deferred vertices");
        }
        for vertex in pending {
            self.issue_vertex(vertex)?;
        }
        Ok(())
    }

    /// Full barrier: issue all pending work, wait for the device and observe
    /// every completion.
    pub fn synchronize(&mut self) -> Result<()> {
        self.flush()?;
        self.runtime.device_synchronize()?;
        self.observe_completions()
    }

    /// Block until the computation behind `handle` has completed.
    pub fn wait(&mut self, handle: ComputationHandle) -> Result<()> {
        let vertex = handle.vertex;
        self.flush()?;

        let element = self.dag.element(vertex);
        if !element.is_computation_finished() {
            if let Some(stream) = element.stream() {
                self.runtime.synchronize_stream(stream)?;
            }
            self.observe_completions()?;
        }

        let element = self.dag.element(vertex);
        match (element.state(), element.failure()) {
            (ElementState::Finished, _) => Ok(()),
            (ElementState::Failed, Some(FailureCause::Parent(parent))) => {
                Err(SchedError::ParentFailed {
                    vertex,
                    parent: *parent,
                })
            }
            (ElementState::Failed, cause) => Err(SchedError::LaunchFailed {
                vertex,
                reason: cause.map(|c| c.to_string()).unwrap_or_default(),
            }),
            (state, _) => Err(SchedError::Device(format!(
                "vertex {vertex} still {state:?} after synchronizing its stream"
            ))),
        }
    }

    /// Current lifecycle state of the computation behind `handle`.
    pub fn state(&mut self, handle: ComputationHandle) -> Result<ElementState> {
        self.observe_completions()?;
        Ok(self.dag.element(handle.vertex).state())
    }

    /// True iff some issued computation has not been seen to finish.
    pub fn is_any_computation_active(&mut self) -> Result<bool> {
        self.observe_completions()?;
        Ok(!self.running.is_empty())
    }

    /// True iff the issue policy holds vertices not yet issued.
    pub fn has_pending_work(&self) -> bool {
        self.issue.pending() > 0
    }

    /// Wait for outstanding work, then release every stream and event.
    /// Safe to call repeatedly.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.has_pending_work() || !self.running.is_empty() {
            self.synchronize()?;
        }
        self.streams.cleanup(self.runtime.as_ref())?;
        debug!(vertices = self.dag.num_vertices(), "execution context cleaned up");
        Ok(())
    }

    pub fn register_array(&mut self, array: &DeviceArray) {
        self.arrays
            .entry(array.buffer_id())
            .or_insert_with(|| array.clone());
    }

    pub fn register_kernel(&mut self, kernel: &Kernel) {
        self.kernels
            .entry(kernel.id())
            .or_insert_with(|| kernel.clone());
    }

    pub fn arrays(&self) -> impl Iterator<Item = &DeviceArray> + '_ {
        self.arrays.values()
    }

    pub fn kernels(&self) -> impl Iterator<Item = &Kernel> + '_ {
        self.kernels.values()
    }

    pub fn kernel(&self, id: KernelId) -> Option<&Kernel> {
        self.kernels.get(&id)
    }

    /// Allocate a device array and register it.
    pub fn allocate_array(&mut self, element_type: ArgumentType, len: usize) -> Result<DeviceArray> {
        let array = DeviceArray::allocate(self.runtime.as_ref(), element_type, len)?;
        self.register_array(&array);
        Ok(array)
    }

    /// Parse `signature`, register the kernel and return its id.
    pub fn declare_kernel(&mut self, name: &str, signature: &str) -> Result<KernelId> {
        let kernel = Kernel::new(name, signature)?;
        let id = kernel.id();
        debug!(kernel = name, signature, "declared kernel");
        self.kernels.insert(id, kernel);
        Ok(id)
    }

    /// Launch a registered kernel with `values` bound to its parameters.
    pub fn launch(
        &mut self,
        kernel_id: KernelId,
        config: LaunchConfig,
        values: &[CallValue],
    ) -> Result<ComputationHandle> {
        let kernel = self
            .kernels
            .get_mut(&kernel_id)
            .ok_or_else(|| SchedError::UnknownKernel(format!("#{}", kernel_id.0)))?;
        let element = ComputationalElement::kernel_launch(kernel, config, values)?;
        self.register_execution(element)
    }

    /// Host read (`write == false`) or write of `array`. Returns after the
    /// access and everything it depends on has completed.
    pub fn access_array(&mut self, array: &DeviceArray, write: bool) -> Result<ComputationHandle> {
        self.register_array(array);
        let element = ComputationalElement::array_access(array, array.element_type(), write);
        self.register_execution(element)
    }

    pub fn summary(&self) -> ContextSummary {
        let vertices = self
            .dag
            .vertices()
            .iter()
            .map(|v| VertexSummary {
                vertex: v.id(),
                label: v.element().label().to_string(),
                stream: v.element().stream(),
                state: v.element().state(),
                parents: self.dag.parent_vertices(v.id()).collect(),
            })
            .collect::<Vec<_>>();

        ContextSummary {
            num_vertices: self.dag.num_vertices(),
            num_edges: self.dag.num_edges(),
            frontier: self.dag.frontier().to_vec(),
            num_streams: self.streams.num_streams(),
            active: self.running.len(),
            pending: self.issue.pending(),
            failed: vertices
                .iter()
                .filter(|v| v.state == ElementState::Failed)
                .count(),
            vertices,
        }
    }

    /// Wait on off-stream parents, enqueue the work, record its completion.
    fn issue_vertex(&mut self, vertex: VertexId) -> Result<()> {
        let rt = Arc::clone(&self.runtime);
        let element = self.dag.element(vertex);
        if element.is_computation_finished() {
            trace!(vertex, "skipping issue of a vertex that already failed");
            return Ok(());
        }
        let stream = element.stream().ok_or(SchedError::UnboundVertex(vertex))?;

        match self.streams.synchronize_parents(&self.dag, vertex, rt.as_ref()) {
            Ok(waits) => trace!(vertex, waits, "parents synchronized"),
            Err(
                SchedError::ParentFailed { parent, .. }
                | SchedError::MissingParentEvent { parent, .. },
            ) => {
                warn!(vertex, parent, "not issuing vertex; parent cannot complete");
                self.fail_vertex(vertex, FailureCause::Parent(parent));
                return Ok(());
            }
            Err(e) => {
                warn!(vertex, error = %e, "cross-stream synchronization failed");
                self.fail_vertex(vertex, FailureCause::Launch(e.to_string()));
                return Ok(());
            }
        }

        if let Err(e) = rt.issue(self.dag.element(vertex), stream) {
            warn!(vertex, %stream, error = %e, "launch rejected");
            self.fail_vertex(vertex, FailureCause::Launch(e.to_string()));
            return Ok(());
        }

        let event = match self.streams.record_completion(&self.dag, vertex, rt.as_ref()) {
            Ok(event) => event,
            Err(e) => {
                // The launch is queued but untracked: keep its stream busy so
                // no other work is placed behind it.
                warn!(vertex, %stream, error = %e, "could not record completion event");
                self.dag
                    .element_mut(vertex)
                    .mark_failed(FailureCause::Launch(e.to_string()));
                self.fail_descendants(vertex);
                return Err(e);
            }
        };
        self.dag.element_mut(vertex).mark_running(event);
        self.running.push(vertex);
        debug!(vertex, %stream, %event, "issued vertex");
        Ok(())
    }

    /// Poll the completion event of every running vertex.
    fn observe_completions(&mut self) -> Result<()> {
        if self.running.is_empty() {
            return Ok(());
        }

        let mut statuses = Vec::with_capacity(self.running.len());
        for &vertex in &self.running {
            let status = match self.dag.element(vertex).completion_event() {
                Some(event) => self.runtime.event_status(event)?,
                None => EventStatus::Complete,
            };
            statuses.push((vertex, status));
        }

        let mut failed = Vec::new();
        for (vertex, status) in statuses {
            match status {
                EventStatus::Pending => {}
                EventStatus::Complete => self.finish_vertex(vertex)?,
                EventStatus::Failed => failed.push(vertex),
            }
        }
        // Issue order puts parents first, so a child whose event failed
        // because of its parent is blamed on that parent.
        for vertex in failed {
            let cause = self
                .dag
                .parent_vertices(vertex)
                .find(|&p| self.dag.element(p).is_failed())
                .map(FailureCause::Parent)
                .unwrap_or_else(|| {
                    FailureCause::Launch("device reported a failed execution".to_string())
                });
            self.fail_vertex(vertex, cause);
        }
        Ok(())
    }

    fn finish_vertex(&mut self, vertex: VertexId) -> Result<()> {
        self.running.retain(|&v| v != vertex);
        let element = self.dag.element_mut(vertex);
        if element.is_computation_finished() {
            return Ok(());
        }
        element.mark_finished();
        let stream = element.stream();
        let event = element.take_completion_event();

        if let Some(stream) = stream {
            self.streams.on_finished(stream, vertex);
        }
        if let Some(event) = event {
            self.streams.release_event(event, self.runtime.as_ref())?;
        }
        trace!(vertex, "vertex finished");
        Ok(())
    }

    /// Mark `vertex` failed and fail its descendants.
    ///
    /// `vertex` must have no work left on its stream: it was never issued, or
    /// its completion event has fired.
    fn fail_vertex(&mut self, vertex: VertexId, cause: FailureCause) {
        let element = self.dag.element_mut(vertex);
        if element.is_computation_finished() {
            return;
        }
        warn!(vertex, label = element.label(), %cause, "vertex failed");
        element.mark_failed(cause);
        if let Some(stream) = element.stream() {
            self.streams.on_finished(stream, vertex);
        }
        self.running.retain(|&r| r != vertex);
        self.fail_descendants(vertex);
    }

    /// Fail every descendant of `vertex` that has not been issued yet.
    ///
    /// Issued descendants keep their stream until their own completion event
    /// reports the failure; the walk stops at them.
    fn fail_descendants(&mut self, vertex: VertexId) {
        let mut queue: VecDeque<VertexId> = VecDeque::from([vertex]);
        while let Some(parent) = queue.pop_front() {
            let children: Vec<VertexId> = self.dag.child_vertices(parent).collect();
            for child in children {
                let element = self.dag.element_mut(child);
                if element.is_computation_started() {
                    continue;
                }
                let cause = FailureCause::Parent(parent);
                debug!(vertex = child, %cause, "failing unissued descendant");
                element.mark_failed(cause);
                if let Some(stream) = element.stream() {
                    self.streams.on_finished(stream, child);
                }
                queue.push_back(child);
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if let Err(e) = self.streams.cleanup(self.runtime.as_ref()) {
            warn!(error = %e, "failed to release streams on drop");
        }
    }
}
