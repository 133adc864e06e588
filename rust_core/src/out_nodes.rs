//! Reverse index from a node to the nodes that consume it.
//!
//! Two query forms share one structure: by node reference, consumers come
//! back in the order their edges were added; by index, as a sorted set.

use std::collections::BTreeSet;

use crate::graph::{Graph, Node, NodeId};

static NO_CONSUMERS: BTreeSet<usize> = BTreeSet::new();

#[derive(Debug, Clone, Default)]
pub struct OutNodes {
    ordered: Vec<Vec<NodeId>>,
    sorted: Vec<BTreeSet<usize>>,
}

impl OutNodes {
    /// Rebuild from scratch from the graph's edge lists.
    pub fn build(nodes: &[Node]) -> Self {
        let mut index = Self::default();
        for node in nodes {
            index.push_node(node.id, &node.inputs);
        }
        index
    }

    /// Record a newly appended node and its edges. An input listed twice
    /// yields a single edge.
    pub(crate) fn push_node(&mut self, id: NodeId, inputs: &[NodeId]) {
        debug_assert_eq!(id.0, self.ordered.len());
        self.ordered.push(Vec::new());
        self.sorted.push(BTreeSet::new());
        for input in inputs {
            if self.sorted[input.0].insert(id.0) {
                self.ordered[input.0].push(id);
            }
        }
    }

    pub fn consumers(&self, node: NodeId) -> &[NodeId] {
        self.ordered.get(node.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn consumer_set(&self, index: usize) -> &BTreeSet<usize> {
        self.sorted.get(index).unwrap_or(&NO_CONSUMERS)
    }
}

/// Nodes that take `node` as an input, in edge insertion order.
pub fn out_nodes<'g>(graph: &'g Graph, node: &Node) -> Vec<&'g Node> {
    graph
        .out_index()
        .consumers(node.id)
        .iter()
        .filter_map(|&id| graph.node(id))
        .collect()
}

/// Indices of the nodes that take node `index` as an input.
pub fn out_node_indices(graph: &Graph, index: usize) -> &BTreeSet<usize> {
    graph.out_index().consumer_set(index)
}
