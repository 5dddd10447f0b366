// src/engine/session.rs

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::computation::{
    ArgumentType, CallValue, ComputationalElement, DeviceArray, ElementState, KernelId,
    LaunchConfig,
};
use crate::context::{ComputationHandle, ContextSummary, ExecutionContext};
use crate::errors::{Result, SchedError};

use super::SessionRequest;

/// Owns an [`ExecutionContext`] and applies requests to it one at a time.
#[derive(Debug)]
pub struct Session {
    ctx: ExecutionContext,
    rx: mpsc::Receiver<SessionRequest>,
}

impl Session {
    /// Wrap `ctx`; `capacity` bounds the number of queued requests.
    pub fn new(ctx: ExecutionContext, capacity: usize) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { ctx, rx }, SessionHandle { tx })
    }

    /// Serve requests until a shutdown request arrives or every handle is
    /// dropped. Releases the context's streams and hands the context back.
    pub async fn run(mut self) -> ExecutionContext {
        info!("session started");

        while let Some(request) = self.rx.recv().await {
            if matches!(request, SessionRequest::Shutdown) {
                info!("shutdown requested; stopping session");
                break;
            }
            self.handle(request);
        }

        if let Err(e) = self.ctx.cleanup() {
            warn!(error = %e, "session cleanup failed");
        }
        info!(vertices = self.ctx.dag().num_vertices(), "session exiting");
        self.ctx
    }

    fn handle(&mut self, request: SessionRequest) {
        let ctx = &mut self.ctx;
        // A dropped reply receiver only means the caller stopped waiting.
        match request {
            SessionRequest::Register { element, reply } => {
                let _ = reply.send(ctx.register_execution(element));
            }
            SessionRequest::DeclareKernel {
                name,
                signature,
                reply,
            } => {
                let _ = reply.send(ctx.declare_kernel(&name, &signature));
            }
            SessionRequest::AllocateArray {
                element_type,
                len,
                reply,
            } => {
                let _ = reply.send(ctx.allocate_array(element_type, len));
            }
            SessionRequest::Launch {
                kernel,
                config,
                values,
                reply,
            } => {
                let _ = reply.send(ctx.launch(kernel, config, &values));
            }
            SessionRequest::AccessArray {
                array,
                write,
                reply,
            } => {
                let _ = reply.send(ctx.access_array(&array, write));
            }
            SessionRequest::Wait { handle, reply } => {
                let _ = reply.send(ctx.wait(handle));
            }
            SessionRequest::State { handle, reply } => {
                let _ = reply.send(ctx.state(handle));
            }
            SessionRequest::Flush { reply } => {
                let _ = reply.send(ctx.flush());
            }
            SessionRequest::Synchronize { reply } => {
                let _ = reply.send(ctx.synchronize());
            }
            SessionRequest::Summary { reply } => {
                let _ = reply.send(ctx.summary());
            }
            SessionRequest::Shutdown => {
                debug!("shutdown handled by the run loop");
            }
        }
    }
}

/// Cloneable producer side of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> SessionRequest,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SchedError::SessionClosed)?;
        rx.await.map_err(|_| SchedError::SessionClosed)?
    }

    pub async fn register(&self, element: ComputationalElement) -> Result<ComputationHandle> {
        self.call(|reply| SessionRequest::Register { element, reply })
            .await
    }

    pub async fn declare_kernel(&self, name: &str, signature: &str) -> Result<KernelId> {
        let (name, signature) = (name.to_string(), signature.to_string());
        self.call(|reply| SessionRequest::DeclareKernel {
            name,
            signature,
            reply,
        })
        .await
    }

    pub async fn allocate_array(&self, element_type: ArgumentType, len: usize) -> Result<DeviceArray> {
        self.call(|reply| SessionRequest::AllocateArray {
            element_type,
            len,
            reply,
        })
        .await
    }

    pub async fn launch(
        &self,
        kernel: KernelId,
        config: LaunchConfig,
        values: Vec<CallValue>,
    ) -> Result<ComputationHandle> {
        self.call(|reply| SessionRequest::Launch {
            kernel,
            config,
            values,
            reply,
        })
        .await
    }

    pub async fn access_array(&self, array: &DeviceArray, write: bool) -> Result<ComputationHandle> {
        let array = array.clone();
        self.call(|reply| SessionRequest::AccessArray {
            array,
            write,
            reply,
        })
        .await
    }

    pub async fn wait(&self, handle: ComputationHandle) -> Result<()> {
        self.call(|reply| SessionRequest::Wait { handle, reply })
            .await
    }

    pub async fn state(&self, handle: ComputationHandle) -> Result<ElementState> {
        self.call(|reply| SessionRequest::State { handle, reply })
            .await
    }

    pub async fn flush(&self) -> Result<()> {
        self.call(|reply| SessionRequest::Flush { reply }).await
    }

    pub async fn synchronize(&self) -> Result<()> {
        self.call(|reply| SessionRequest::Synchronize { reply })
            .await
    }

    pub async fn summary(&self) -> Result<ContextSummary> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::Summary { reply })
            .await
            .map_err(|_| SchedError::SessionClosed)?;
        rx.await.map_err(|_| SchedError::SessionClosed)
    }

    /// Ask the session to stop. Requests already queued are served first.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(SessionRequest::Shutdown)
            .await
            .map_err(|_| SchedError::SessionClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::ContextOptions;
    use crate::runtime::SimulatedRuntime;

    #[tokio::test]
    async fn requests_are_served_in_order() {
        let rt = Arc::new(SimulatedRuntime::new());
        let ctx = ExecutionContext::new(rt.clone(), ContextOptions::default());
        let (session, handle) = Session::new(ctx, 16);
        let task = tokio::spawn(session.run());

        let x = handle.allocate_array(ArgumentType::Float, 8).await.unwrap();
        let k = handle.declare_kernel("k", "pointer float").await.unwrap();
        let a = handle
            .launch(k, LaunchConfig::default(), vec![(&x).into()])
            .await
            .unwrap();
        handle.wait(a).await.unwrap();
        assert_eq!(handle.state(a).await.unwrap(), ElementState::Finished);

        handle.shutdown().await.unwrap();
        let ctx = task.await.unwrap();
        assert_eq!(ctx.dag().num_vertices(), 1);
        assert_eq!(rt.live_streams().unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_session_reports_session_closed() {
        let rt = Arc::new(SimulatedRuntime::new());
        let ctx = ExecutionContext::new(rt, ContextOptions::default());
        let (session, handle) = Session::new(ctx, 4);
        let task = tokio::spawn(session.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let err = handle.synchronize().await.unwrap_err();
        assert!(matches!(err, SchedError::SessionClosed));
    }
}
