// src/context/issue.rs

//! When registered work is handed to the device.
//!
//! Registration always inserts into the DAG and binds a stream right away.
//! An [`IssuePolicy`] only decides when the context then issues it.

use std::collections::VecDeque;
use std::fmt;

use crate::dag::VertexId;
use crate::types::IssuePolicyKind;

pub trait IssuePolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// `vertex` was just registered. Returns the vertices to issue now, in
    /// registration order. `must_flush` is set for work the host blocks on.
    fn on_registered(&mut self, vertex: VertexId, must_flush: bool) -> Vec<VertexId>;

    /// Everything registered but not yet issued, in registration order.
    fn drain(&mut self) -> Vec<VertexId>;

    fn pending(&self) -> usize;
}

/// Issue every vertex as soon as it is registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct EagerIssue;

impl IssuePolicy for EagerIssue {
    fn name(&self) -> &'static str {
        "eager"
    }

    fn on_registered(&mut self, vertex: VertexId, _must_flush: bool) -> Vec<VertexId> {
        vec![vertex]
    }

    fn drain(&mut self) -> Vec<VertexId> {
        Vec::new()
    }

    fn pending(&self) -> usize {
        0
    }
}

/// Hold vertices back and issue them in batches.
#[derive(Debug, Clone)]
pub struct DeferredIssue {
    batch_size: usize,
    queue: VecDeque<VertexId>,
}

impl DeferredIssue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            queue: VecDeque::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl IssuePolicy for DeferredIssue {
    fn name(&self) -> &'static str {
        "deferred"
    }

    fn on_registered(&mut self, vertex: VertexId, must_flush: bool) -> Vec<VertexId> {
        self.queue.push_back(vertex);
        if must_flush || self.queue.len() >= self.batch_size {
            self.drain()
        } else {
            Vec::new()
        }
    }

    fn drain(&mut self) -> Vec<VertexId> {
        self.queue.drain(..).collect()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

pub fn issue_policy_for(kind: IssuePolicyKind, batch_size: usize) -> Box<dyn IssuePolicy> {
    match kind {
        IssuePolicyKind::Eager => Box::new(EagerIssue),
        IssuePolicyKind::Deferred => Box::new(DeferredIssue::new(batch_size)),
    }
}
