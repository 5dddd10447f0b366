// src/dag/mod.rs

//! Execution DAG.
//!
//! - [`graph`] holds the append-only DAG of computations and its frontier.
//! - [`export`] converts it to `petgraph` / Graphviz for diagnostics.

pub mod export;
pub mod graph;

pub use graph::{Edge, EdgeId, ExecutionDag, Vertex, VertexId};
