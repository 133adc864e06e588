use std::collections::HashMap;

use crate::distributions::DistributionKind;
use crate::error::{GraphError, Result};
use crate::operator::UnaryOp;
use crate::out_nodes::OutNodes;
use crate::value::{AtomicType, AtomicValue};

/// Unique identifier for a node in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// What a node computes.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A fixed value baked into the graph.
    Constant(AtomicValue),
    /// A unary operator applied to the single input.
    Operator(UnaryOp),
    /// A distribution over its parameter inputs. Carries no value itself.
    Distribution(DistributionKind),
    /// A draw from the distribution input; latent unless observed.
    Sample,
}

/// A single node in the computation graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Ordered inputs. Every input precedes this node in the graph.
    pub inputs: Vec<NodeId>,
    /// Declared type, fixed at construction. `None` for distributions.
    pub value_type: Option<AtomicType>,
    pub name: Option<String>,
}

impl Node {
    pub fn is_sample(&self) -> bool {
        matches!(self.kind, NodeKind::Sample)
    }
}

/// The computational graph representing a probabilistic model.
///
/// Nodes are stored in topological order (each node only references
/// earlier nodes) and are owned exclusively by the graph; edges are index
/// lists. Observations and queries are recorded next to the structure.
/// The reverse index is maintained as nodes are added, so the node list
/// is only reachable through shared references.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    observations: HashMap<NodeId, AtomicValue>,
    queries: Vec<NodeId>,
    out_nodes: OutNodes,
    name_to_node: HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if an input does not refer to an existing node.
    fn add_node(
        &mut self,
        kind: NodeKind,
        inputs: Vec<NodeId>,
        value_type: Option<AtomicType>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        for input in &inputs {
            assert!(
                input.0 < id.0,
                "node {} refers to input {} which does not precede it",
                id.0,
                input.0
            );
        }
        self.out_nodes.push_node(id, &inputs);
        self.nodes.push(Node {
            id,
            kind,
            inputs,
            value_type,
            name: None,
        });
        id
    }

    pub fn add_constant(&mut self, value: AtomicValue) -> NodeId {
        self.add_node(NodeKind::Constant(value), Vec::new(), Some(value.ty()))
    }

    pub fn add_constant_real(&mut self, value: f64) -> NodeId {
        self.add_constant(AtomicValue::real(value))
    }

    pub fn add_constant_pos_real(&mut self, value: f64) -> Result<NodeId> {
        Ok(self.add_constant(AtomicValue::pos_real(value)?))
    }

    pub fn add_constant_probability(&mut self, value: f64) -> Result<NodeId> {
        Ok(self.add_constant(AtomicValue::probability(value)?))
    }

    /// Add a unary operator node.
    ///
    /// The input's type is not checked here; an input outside the
    /// operator's allow-list fails when the node is evaluated.
    pub fn add_operator(&mut self, op: UnaryOp, input: NodeId) -> NodeId {
        let declared = self
            .nodes
            .get(input.0)
            .and_then(|n| n.value_type)
            .and_then(|ty| op.result_type(ty))
            .unwrap_or_else(|| op.nominal_type());
        self.add_node(NodeKind::Operator(op), vec![input], Some(declared))
    }

    pub fn add_distribution(&mut self, kind: DistributionKind, params: Vec<NodeId>) -> NodeId {
        self.add_node(NodeKind::Distribution(kind), params, None)
    }

    pub fn add_normal(&mut self, mean: NodeId, stddev: NodeId) -> NodeId {
        self.add_distribution(DistributionKind::Normal, vec![mean, stddev])
    }

    pub fn add_half_normal(&mut self, stddev: NodeId) -> NodeId {
        self.add_distribution(DistributionKind::HalfNormal, vec![stddev])
    }

    pub fn add_bernoulli(&mut self, probability: NodeId) -> NodeId {
        self.add_distribution(DistributionKind::Bernoulli, vec![probability])
    }

    /// Add a sample drawn from a distribution node.
    pub fn add_sample(&mut self, distribution: NodeId) -> Result<NodeId> {
        let kind = match self.nodes.get(distribution.0).map(|n| &n.kind) {
            Some(NodeKind::Distribution(kind)) => *kind,
            _ => return Err(GraphError::NotADistribution(distribution.0)),
        };
        Ok(self.add_node(NodeKind::Sample, vec![distribution], Some(kind.sample_type())))
    }

    /// Attach a name used by diagnostics and lookups.
    pub fn set_name(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.name = Some(name.to_string());
            self.name_to_node.insert(name.to_string(), node);
        }
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_to_node.get(name).copied()
    }

    /// Fix the value of a sample node.
    pub fn observe(&mut self, node: NodeId, value: AtomicValue) -> Result<()> {
        let n = self.nodes.get(node.0).ok_or(GraphError::NotASample(node.0))?;
        if !n.is_sample() {
            return Err(GraphError::NotASample(node.0));
        }
        let expected = n.value_type.unwrap_or(value.ty());
        if expected != value.ty() {
            return Err(GraphError::ObservationTypeMismatch {
                node: node.0,
                expected,
                got: value.ty(),
            });
        }
        if self.observations.contains_key(&node) {
            return Err(GraphError::AlreadyObserved(node.0));
        }
        self.observations.insert(node, value);
        Ok(())
    }

    /// Mark a node whose value should be reported; returns the query index.
    /// Querying the same node twice returns the original index.
    pub fn query(&mut self, node: NodeId) -> usize {
        assert!(node.0 < self.nodes.len(), "query of unknown node {}", node.0);
        if let Some(pos) = self.queries.iter().position(|&q| q == node) {
            return pos;
        }
        self.queries.push(node);
        self.queries.len() - 1
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn observation(&self, node: NodeId) -> Option<&AtomicValue> {
        self.observations.get(&node)
    }

    pub fn queries(&self) -> &[NodeId] {
        &self.queries
    }

    pub(crate) fn out_index(&self) -> &OutNodes {
        &self.out_nodes
    }

    /// Unobserved sample nodes, in graph order.
    pub fn latent_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_sample() && !self.observations.contains_key(&n.id))
            .map(|n| n.id)
            .collect()
    }

    /// Display label for a node: its name, or `node_<index>`.
    pub fn label(&self, node: NodeId) -> String {
        self.nodes
            .get(node.0)
            .and_then(|n| n.name.clone())
            .unwrap_or_else(|| format!("node_{}", node.0))
    }
}
