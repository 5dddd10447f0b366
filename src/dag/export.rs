// src/dag/export.rs

//! Diagnostics export of the execution DAG through `petgraph`.

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::graph::ExecutionDag;

impl ExecutionDag {
    /// Copy the DAG into a `petgraph` graph.
    ///
    /// Node `i` corresponds to vertex `i`; node weights are human readable
    /// labels, edge weights the number of conflicting arguments.
    pub fn to_petgraph(&self) -> DiGraph<String, usize> {
        let mut graph = DiGraph::with_capacity(self.num_vertices(), self.num_edges());

        for v in self.vertices() {
            let element = v.element();
            let stream = element
                .stream()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            graph.add_node(format!(
                "#{} {} [{:?}] @{}",
                v.id(),
                element.label(),
                element.state(),
                stream
            ));
        }

        for e in self.edges() {
            graph.add_edge(
                NodeIndex::new(e.start()),
                NodeIndex::new(e.end()),
                e.dependencies().len(),
            );
        }

        graph
    }

    /// Graphviz rendering of [`ExecutionDag::to_petgraph`].
    pub fn to_dot(&self) -> String {
        let graph = self.to_petgraph();
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod tests {
    use petgraph::algo::{is_cyclic_directed, toposort};

    use crate::computation::{Argument, ArgumentType, BufferId, ComputationKind, ComputationalElement};
    use crate::dag::ExecutionDag;

    fn touching(ids: &[u64]) -> ComputationalElement {
        ComputationalElement::new(
            ComputationKind::ArrayAccess {
                buffer: BufferId(0),
                write: true,
            },
            ids.iter()
                .map(|&id| Argument::array(ArgumentType::Sint32, &BufferId(id), false))
                .collect(),
        )
    }

    #[test]
    fn exported_graph_is_acyclic_and_in_submission_order() {
        let mut dag = ExecutionDag::default();
        for ids in [&[1, 2][..], &[1], &[2], &[1, 3], &[1, 4], &[4]] {
            dag.append(touching(ids));
        }

        let graph = dag.to_petgraph();
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 5);
        assert!(!is_cyclic_directed(&graph));

        let order = toposort(&graph, None).expect("DAG has no cycles");
        assert_eq!(order.len(), 6);
    }

    #[test]
    fn dot_output_mentions_every_vertex() {
        let mut dag = ExecutionDag::default();
        dag.append(touching(&[1]));
        dag.append(touching(&[1]));

        let dot = dag.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("#0 array-write"));
        assert!(dot.contains("#1 array-write"));
        assert!(dot.contains("0 -> 1"));
    }
}
