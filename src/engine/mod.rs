// src/engine/mod.rs

//! Async front-end for an [`ExecutionContext`](crate::context::ExecutionContext).
//!
//! The context is single-writer. A [`Session`] owns it inside one task and
//! serves [`SessionRequest`]s arriving over an mpsc channel, so any number of
//! producers can submit work through cloned [`SessionHandle`]s. Replies travel
//! back on oneshot channels.

use tokio::sync::oneshot;

use crate::computation::{
    ArgumentType, CallValue, ComputationalElement, DeviceArray, ElementState, KernelId,
    LaunchConfig,
};
use crate::context::{ComputationHandle, ContextSummary};
use crate::errors::Result;

pub mod session;

pub use session::{Session, SessionHandle};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests a [`Session`] understands.
#[derive(Debug)]
pub enum SessionRequest {
    Register {
        element: ComputationalElement,
        reply: Reply<ComputationHandle>,
    },
    DeclareKernel {
        name: String,
        signature: String,
        reply: Reply<KernelId>,
    },
    AllocateArray {
        element_type: ArgumentType,
        len: usize,
        reply: Reply<DeviceArray>,
    },
    Launch {
        kernel: KernelId,
        config: LaunchConfig,
        values: Vec<CallValue>,
        reply: Reply<ComputationHandle>,
    },
    AccessArray {
        array: DeviceArray,
        write: bool,
        reply: Reply<ComputationHandle>,
    },
    Wait {
        handle: ComputationHandle,
        reply: Reply<()>,
    },
    State {
        handle: ComputationHandle,
        reply: Reply<ElementState>,
    },
    Flush {
        reply: Reply<()>,
    },
    Synchronize {
        reply: Reply<()>,
    },
    Summary {
        reply: oneshot::Sender<ContextSummary>,
    },
    /// Stop serving. Work still in flight is synchronized before the session
    /// releases its streams.
    Shutdown,
}
