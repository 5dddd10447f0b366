// src/dag/graph.rs

use std::fmt;

use tracing::{debug, trace};

use crate::computation::{Argument, ComputationalElement, DependencyPolicy, WithConstDependency};

/// Index of a vertex in the append-only vertex list.
pub type VertexId = usize;

/// Index of an edge in the append-only edge list.
pub type EdgeId = usize;

/// One computation in the DAG.
#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    element: ComputationalElement,
    /// False once the vertex has gained a parent.
    is_start: bool,
    /// Edges whose end is this vertex.
    parents: Vec<EdgeId>,
    /// Edges whose start is this vertex.
    children: Vec<EdgeId>,
}

impl Vertex {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn element(&self) -> &ComputationalElement {
        &self.element
    }

    pub fn is_start(&self) -> bool {
        self.is_start
    }

    /// Whether this vertex could still be the source of a dependency: some of
    /// its array arguments have not been superseded, and it has not finished.
    pub fn is_frontier(&self) -> bool {
        self.element.has_possible_dependencies() && !self.element.is_computation_finished()
    }

    pub fn parents(&self) -> &[EdgeId] {
        &self.parents
    }

    pub fn children(&self) -> &[EdgeId] {
        &self.children
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "V(id={}, label={}, isStart={}, isFrontier={}, parents={:?}, children={:?})",
            self.id,
            self.element.label(),
            self.is_start,
            self.is_frontier(),
            self.parents,
            self.children
        )
    }
}

/// `end` must wait for `start`, because of `dependencies`.
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    start: VertexId,
    end: VertexId,
    dependencies: Vec<Argument>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn start(&self) -> VertexId {
        self.start
    }

    pub fn end(&self) -> VertexId {
        self.end
    }

    /// Arguments of the start vertex that caused this edge. Never empty.
    pub fn dependencies(&self) -> &[Argument] {
        &self.dependencies
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E(id={}, start={}, end={})", self.id, self.start, self.end)
    }
}

/// Append-only DAG of computations.
///
/// Vertices and edges live in two arenas indexed by id; adjacency is stored
/// as edge ids on each vertex. Edges always go from a lower to a higher
/// vertex id, so the graph is acyclic by construction.
///
/// The frontier is recomputed only inside [`ExecutionDag::append`]. A vertex
/// whose element finished in the meantime stays in [`ExecutionDag::frontier`]
/// until the next append, and still takes part in that append's dependency
/// check.
#[derive(Debug)]
pub struct ExecutionDag {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    frontier: Vec<VertexId>,
    policy: Box<dyn DependencyPolicy>,
}

impl Default for ExecutionDag {
    fn default() -> Self {
        Self::new(Box::new(WithConstDependency))
    }
}

impl ExecutionDag {
    pub fn new(policy: Box<dyn DependencyPolicy>) -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            frontier: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &dyn DependencyPolicy {
        self.policy.as_ref()
    }

    /// Add a computation, connect it to the frontier vertices it depends on,
    /// and rebuild the frontier.
    pub fn append(&mut self, mut element: ComputationalElement) -> VertexId {
        let new_id = self.vertices.len();
        element.set_id(new_id);
        self.vertices.push(Vertex {
            id: new_id,
            element,
            is_start: true,
            parents: Vec::new(),
            children: Vec::new(),
        });

        // Oldest open work first; edge ids follow this order.
        let frontier = std::mem::take(&mut self.frontier);
        for &start in &frontier {
            let dependencies = {
                let (before, after) = self.vertices.split_at_mut(new_id);
                before[start]
                    .element
                    .compute_dependencies(&after[0].element, self.policy.as_ref())
            };
            if !dependencies.is_empty() {
                self.add_edge(start, new_id, dependencies, &frontier);
            }
        }

        let mut rebuilt: Vec<VertexId> = frontier
            .into_iter()
            .filter(|&id| self.vertices[id].is_frontier())
            .collect();
        if self.vertices[new_id].is_frontier() {
            rebuilt.push(new_id);
        }
        self.frontier = rebuilt;

        debug!(
            vertex = new_id,
            label = self.vertices[new_id].element.label(),
            parents = self.vertices[new_id].parents.len(),
            frontier = self.frontier.len(),
            "appended vertex to DAG"
        );

        new_id
    }

    fn add_edge(
        &mut self,
        start: VertexId,
        end: VertexId,
        dependencies: Vec<Argument>,
        frontier: &[VertexId],
    ) {
        assert!(start < end, "edge {start} -> {end} does not increase vertex id");
        assert!(
            frontier.contains(&start),
            "edge {start} -> {end} starts outside the frontier"
        );
        assert!(
            !self.vertices[end]
                .parents
                .iter()
                .any(|&e| self.edges[e].start == start),
            "duplicate edge {start} -> {end}"
        );

        let id = self.edges.len();
        trace!(edge = id, start, end, deps = dependencies.len(), "new DAG edge");
        self.edges.push(Edge {
            id,
            start,
            end,
            dependencies,
        });
        self.vertices[start].children.push(id);
        let end_vertex = &mut self.vertices[end];
        end_vertex.parents.push(id);
        end_vertex.is_start = false;
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Frontier as of the last append, oldest first.
    pub fn frontier(&self) -> &[VertexId] {
        &self.frontier
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn element(&self, id: VertexId) -> &ComputationalElement {
        &self.vertices[id].element
    }

    pub(crate) fn element_mut(&mut self, id: VertexId) -> &mut ComputationalElement {
        &mut self.vertices[id].element
    }

    pub fn parent_vertices(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices[id]
            .parents
            .iter()
            .map(|&e| self.edges[e].start)
    }

    pub fn child_vertices(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices[id].children.iter().map(|&e| self.edges[e].end)
    }

    /// Not started yet, and every parent has finished.
    pub fn is_executable(&self, id: VertexId) -> bool {
        !self.vertices[id].element.is_computation_started()
            && self
                .parent_vertices(id)
                .all(|p| self.vertices[p].element.is_computation_finished())
    }
}

impl fmt::Display for ExecutionDag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DAG(|V|={}, |E|={}", self.vertices.len(), self.edges.len())?;
        for v in &self.vertices {
            writeln!(f, "  {v}")?;
        }
        write!(f, ")")
    }
}
