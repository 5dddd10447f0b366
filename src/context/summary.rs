// src/context/summary.rs

use std::fmt;

use crate::computation::ElementState;
use crate::dag::VertexId;
use crate::runtime::StreamId;

/// Where one vertex ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexSummary {
    pub vertex: VertexId,
    pub label: String,
    pub stream: Option<StreamId>,
    pub state: ElementState,
    pub parents: Vec<VertexId>,
}

/// Point-in-time snapshot of a context, detached from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSummary {
    pub num_vertices: usize,
    pub num_edges: usize,
    pub frontier: Vec<VertexId>,
    pub num_streams: usize,
    pub active: usize,
    pub pending: usize,
    pub failed: usize,
    pub vertices: Vec<VertexSummary>,
}

impl ContextSummary {
    /// Distinct streams that vertices were bound to.
    pub fn streams_used(&self) -> usize {
        let mut streams: Vec<StreamId> = self.vertices.iter().filter_map(|v| v.stream).collect();
        streams.sort();
        streams.dedup();
        streams.len()
    }
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "vertices: {}  edges: {}  streams: {}  failed: {}",
            self.num_vertices, self.num_edges, self.num_streams, self.failed
        )?;
        writeln!(f, "frontier: {:?}", self.frontier)?;
        for v in &self.vertices {
            let stream = v
                .stream
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            write!(f, "  #{:<3} {:<16} {:<9} {:?}", v.vertex, v.label, stream, v.state)?;
            if !v.parents.is_empty() {
                write!(f, "  after {:?}", v.parents)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
