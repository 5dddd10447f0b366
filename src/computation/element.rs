// src/computation/element.rs

//! Computational elements: the units of work the scheduler orders.

use std::fmt;

use crate::computation::argument::{Argument, BufferId, BufferIdentity, ArgumentType};
use crate::computation::dependency::DependencyPolicy;
use crate::computation::kernel::{CallValue, Kernel, KernelId, LaunchConfig};
use crate::context::{ComputationHandle, ExecutionContext};
use crate::dag::VertexId;
use crate::errors::Result;
use crate::runtime::{EventId, StreamId};

/// Lifecycle of an element.
///
/// `Created → Scheduled → Running → Finished`, with `Failed` reachable from
/// any non-terminal state. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Built but not yet registered with a context.
    Created,
    /// Inserted in the DAG and bound to a stream, not yet issued.
    Scheduled,
    /// Issued to the device.
    Running,
    Finished,
    Failed,
}

impl ElementState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ElementState::Finished | ElementState::Failed)
    }
}

/// Why an element ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The runtime rejected the launch, or the device reported an error.
    Launch(String),
    /// A vertex this element depends on failed.
    Parent(VertexId),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Launch(reason) => write!(f, "launch failed: {reason}"),
            FailureCause::Parent(parent) => write!(f, "parent vertex {parent} failed"),
        }
    }
}

/// What hardware work an element stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputationKind {
    KernelLaunch {
        kernel: KernelId,
        name: String,
        config: LaunchConfig,
    },
    /// Host-side read or write of device memory. The host blocks until it is
    /// done, so it always ends with a stream synchronization.
    ArrayAccess { buffer: BufferId, write: bool },
}

impl ComputationKind {
    pub fn label(&self) -> &str {
        match self {
            ComputationKind::KernelLaunch { name, .. } => name,
            ComputationKind::ArrayAccess { write: true, .. } => "array-write",
            ComputationKind::ArrayAccess { write: false, .. } => "array-read",
        }
    }

    pub fn requires_host_sync(&self) -> bool {
        matches!(self, ComputationKind::ArrayAccess { .. })
    }
}

/// A unit of work with an ordered, typed argument list.
#[derive(Debug, Clone)]
pub struct ComputationalElement {
    id: Option<VertexId>,
    kind: ComputationKind,
    arguments: Vec<Argument>,
    /// Array arguments, one entry per distinct buffer; an entry is const only
    /// if every argument on that buffer is const.
    accesses: Vec<Argument>,
    /// Subset of `accesses` that may still cause dependencies.
    active: Vec<Argument>,
    state: ElementState,
    stream: Option<StreamId>,
    completion_event: Option<EventId>,
    failure: Option<FailureCause>,
}

impl ComputationalElement {
    pub fn new(kind: ComputationKind, arguments: Vec<Argument>) -> Self {
        let accesses = merge_accesses(&arguments);
        Self {
            id: None,
            kind,
            active: accesses.clone(),
            accesses,
            arguments,
            state: ElementState::Created,
            stream: None,
            completion_event: None,
            failure: None,
        }
    }

    /// Validate `values` against the kernel signature and build a launch.
    pub fn kernel_launch(
        kernel: &mut Kernel,
        config: LaunchConfig,
        values: &[CallValue],
    ) -> Result<Self> {
        let arguments = kernel.bind(values)?;
        kernel.increment_launch_count();
        Ok(Self::new(
            ComputationKind::KernelLaunch {
                kernel: kernel.id(),
                name: kernel.name().to_string(),
                config,
            },
            arguments,
        ))
    }

    /// Host access to `array`; `write` marks the access as modifying it.
    pub fn array_access(array: &impl BufferIdentity, element_type: ArgumentType, write: bool) -> Self {
        let buffer = array.buffer_id();
        Self::new(
            ComputationKind::ArrayAccess { buffer, write },
            vec![Argument::array(element_type, &buffer, !write)],
        )
    }

    /// Submit this element to `ctx`. Returns once it is in the DAG and bound
    /// to a stream, not when the device work completes.
    pub fn schedule(self, ctx: &mut ExecutionContext) -> Result<ComputationHandle> {
        ctx.register_execution(self)
    }

    /// Position in submission order, once registered.
    pub fn id(&self) -> Option<VertexId> {
        self.id
    }

    pub fn kind(&self) -> &ComputationKind {
        &self.kind
    }

    pub fn label(&self) -> &str {
        self.kind.label()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Arguments that can still cause a dependency with future work.
    pub fn active_arguments(&self) -> &[Argument] {
        &self.active
    }

    pub fn state(&self) -> ElementState {
        self.state
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    pub fn completion_event(&self) -> Option<EventId> {
        self.completion_event
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    pub fn is_computation_started(&self) -> bool {
        matches!(
            self.state,
            ElementState::Running | ElementState::Finished | ElementState::Failed
        )
    }

    /// Terminal, successfully or not.
    pub fn is_computation_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.state == ElementState::Failed
    }

    pub fn has_possible_dependencies(&self) -> bool {
        !self.active.is_empty()
    }

    /// Arguments of `self` that `other`, submitted later, must wait on.
    ///
    /// Only active arguments are considered, in argument order. Arguments the
    /// policy considers superseded by `other` leave the active set.
    pub fn compute_dependencies(
        &mut self,
        other: &ComputationalElement,
        policy: &dyn DependencyPolicy,
    ) -> Vec<Argument> {
        let mut dependencies = Vec::new();
        let mut still_active = Vec::with_capacity(self.active.len());

        for arg in self.active.drain(..) {
            match other.accesses.iter().find(|later| policy.conflicts(&arg, later)) {
                Some(later) => {
                    if !policy.supersedes(&arg, later) {
                        still_active.push(arg.clone());
                    }
                    dependencies.push(arg);
                }
                None => still_active.push(arg),
            }
        }

        self.active = still_active;
        dependencies
    }

    pub(crate) fn set_id(&mut self, id: VertexId) {
        assert!(self.id.is_none(), "element registered twice");
        self.id = Some(id);
    }

    pub(crate) fn bind_stream(&mut self, stream: StreamId) {
        self.stream = Some(stream);
        if self.state == ElementState::Created {
            self.state = ElementState::Scheduled;
        }
    }

    pub(crate) fn mark_running(&mut self, event: EventId) {
        self.completion_event = Some(event);
        self.state = ElementState::Running;
    }

    pub(crate) fn mark_finished(&mut self) {
        self.state = ElementState::Finished;
    }

    pub(crate) fn mark_failed(&mut self, cause: FailureCause) {
        self.state = ElementState::Failed;
        self.failure = Some(cause);
    }

    pub(crate) fn take_completion_event(&mut self) -> Option<EventId> {
        self.completion_event.take()
    }
}

/// One entry per buffer, keeping first-occurrence order.
fn merge_accesses(arguments: &[Argument]) -> Vec<Argument> {
    let mut accesses: Vec<Argument> = Vec::new();
    for arg in arguments.iter().filter(|a| a.is_array()) {
        match accesses.iter_mut().find(|seen| seen.aliases(arg)) {
            Some(seen) => {
                let merged = seen.is_const() && arg.is_const();
                *seen = seen.clone().with_const(merged);
            }
            None => accesses.push(arg.clone()),
        }
    }
    accesses
}
