//! The state of one global MCMC chain.

use rand::Rng;

use crate::error::{GraphError, Result};
use crate::eval;
use crate::graph::{Graph, NodeId};
use crate::number::Elementary;
use crate::value::{AtomicType, AtomicValue};

/// Map between a latent node's typed value and the unconstrained real
/// coordinate the proposers move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// REAL latents.
    Identity,
    /// POS_REAL latents: x = exp(y).
    Log,
}

impl Transform {
    fn for_latent(node: NodeId, ty: AtomicType) -> Result<Self> {
        match ty {
            AtomicType::Real => Ok(Transform::Identity),
            AtomicType::PosReal => Ok(Transform::Log),
            _ => Err(GraphError::UnsupportedLatent { node: node.0, ty }),
        }
    }

    /// Unconstrained → constrained.
    pub fn forward<N: Elementary>(self, y: &N) -> N {
        match self {
            Transform::Identity => y.clone(),
            Transform::Log => y.exp(),
        }
    }

    /// Constrained → unconstrained.
    pub fn inverse(self, x: f64) -> f64 {
        match self {
            Transform::Identity => x,
            Transform::Log => x.ln(),
        }
    }

    /// log |dx/dy| at `y`.
    pub fn log_abs_det_jacobian<N: Elementary>(self, y: &N) -> N {
        match self {
            Transform::Identity => N::from_f64(0.0),
            Transform::Log => y.clone(),
        }
    }
}

/// Current value of every latent node plus the cached log-density.
///
/// `values` are the typed values reported in samples; `position` holds the
/// same point in unconstrained coordinates. `log_prob` is the target
/// density in those coordinates: the joint log-density plus the
/// log-Jacobian of the POS_REAL transforms, so it equals the joint
/// log-density when every latent is REAL.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalState {
    nodes: Vec<NodeId>,
    transforms: Vec<Transform>,
    values: Vec<AtomicValue>,
    position: Vec<f64>,
    log_prob: f64,
}

impl GlobalState {
    /// Build a state from explicit latent values, in latent order.
    pub fn from_values(graph: &Graph, values: Vec<AtomicValue>) -> Result<Self> {
        let nodes = graph.latent_nodes();
        if nodes.len() != values.len() {
            return Err(GraphError::LatentCount {
                expected: nodes.len(),
                got: values.len(),
            });
        }

        let mut transforms = Vec::with_capacity(nodes.len());
        for (&node, value) in nodes.iter().zip(&values) {
            let expected = graph
                .node(node)
                .and_then(|n| n.value_type)
                .unwrap_or(value.ty());
            let transform = Transform::for_latent(node, expected)?;
            if value.ty() != expected {
                return Err(GraphError::LatentTypeMismatch {
                    node: node.0,
                    expected,
                    got: value.ty(),
                });
            }
            transforms.push(transform);
        }

        let position: Vec<f64> = transforms
            .iter()
            .zip(&values)
            .map(|(t, v)| t.inverse(v.as_double()))
            .collect();

        let mut state = Self {
            nodes,
            transforms,
            values,
            position,
            log_prob: 0.0,
        };
        state.log_prob = state.log_density(graph, &state.position)?;
        Ok(state)
    }

    /// Build a state by drawing every latent node from its prior.
    pub fn from_prior<R: Rng + ?Sized>(graph: &Graph, rng: &mut R) -> Result<Self> {
        for node in graph.latent_nodes() {
            if let Some(ty) = graph.node(node).and_then(|n| n.value_type) {
                Transform::for_latent(node, ty)?;
            }
        }
        let values = eval::sample_prior(graph, rng)?;
        Self::from_values(graph, values)
    }

    /// Target log-density at unconstrained point `y`, in any numeric
    /// representation. Evaluated over dual numbers it yields the gradient.
    pub fn log_density<N: Elementary>(&self, graph: &Graph, y: &[N]) -> Result<N> {
        let x: Vec<N> = self
            .transforms
            .iter()
            .zip(y)
            .map(|(t, yi)| t.forward(yi))
            .collect();
        let mut lp = eval::log_prob(graph, &x)?;
        for (t, yi) in self.transforms.iter().zip(y) {
            if *t != Transform::Identity {
                lp = lp + t.log_abs_det_jacobian(yi);
            }
        }
        Ok(lp)
    }

    /// A new state at unconstrained point `y`, with its log-density
    /// computed. Constrained values go through the validating constructor.
    pub fn with_position(&self, graph: &Graph, y: &[f64]) -> Result<Self> {
        if y.len() != self.position.len() {
            return Err(GraphError::LatentCount {
                expected: self.position.len(),
                got: y.len(),
            });
        }
        let values = self
            .transforms
            .iter()
            .zip(&self.values)
            .zip(y)
            .map(|((t, old), yi)| AtomicValue::new(old.ty(), t.forward(yi)))
            .collect::<Result<Vec<_>>>()?;
        let log_prob = self.log_density(graph, y)?;
        Ok(Self {
            nodes: self.nodes.clone(),
            transforms: self.transforms.clone(),
            values,
            position: y.to_vec(),
            log_prob,
        })
    }

    /// Candidate for a proposal at `y`. A point where some value leaves its
    /// domain (a POS_REAL latent whose `exp` underflows to zero, an operator
    /// result out of range) is outside the support: it comes back as this
    /// state with log-density −∞, which the acceptance test always rejects.
    pub fn candidate_at(&self, graph: &Graph, y: &[f64]) -> Result<Self> {
        match self.with_position(graph, y) {
            Err(err) if err.is_out_of_domain() => {
                log::debug!("candidate outside the support: {}", err);
                Ok(Self {
                    log_prob: f64::NEG_INFINITY,
                    ..self.clone()
                })
            }
            other => other,
        }
    }

    /// Copy `other` into this state field by field. Both must come from the
    /// same graph, so the lengths never change.
    pub fn accept(&mut self, other: &GlobalState) {
        debug_assert_eq!(self.values.len(), other.values.len());
        self.values.copy_from_slice(&other.values);
        self.position.copy_from_slice(&other.position);
        self.log_prob = other.log_prob;
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn values(&self) -> &[AtomicValue] {
        &self.values
    }

    pub fn position(&self) -> &[f64] {
        &self.position
    }

    pub fn log_prob(&self) -> f64 {
        self.log_prob
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> Vec<AtomicValue> {
        self.values.clone()
    }
}
