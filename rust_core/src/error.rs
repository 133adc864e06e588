//! Error types for graph construction, evaluation and sampling.

use thiserror::Error;

use crate::value::AtomicType;

/// Errors raised while building, evaluating or sampling a graph.
///
/// None of these are recovered internally: they propagate to the caller of
/// the evaluation entry point or of `GlobalMH::infer`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A value outside the domain of its type tag.
    #[error("invalid value {value} for type {ty}")]
    InvalidValue { ty: AtomicType, value: f64 },

    /// An operator or distribution received an input outside its allow-list.
    #[error("invalid parent type {parent} for {op} operator at node_id {node}")]
    InvalidParentType {
        op: &'static str,
        parent: AtomicType,
        node: usize,
    },

    /// An input node that carries no value (e.g. a distribution read as a number).
    #[error("node {input} has no value but is read by node {node}")]
    MissingValue { node: usize, input: usize },

    #[error("{op} at node_id {node} expects {expected} inputs, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
        node: usize,
    },

    #[error("node {0} is not a sample node")]
    NotASample(usize),

    #[error("node {0} is not a distribution node")]
    NotADistribution(usize),

    #[error("node {0} is already observed")]
    AlreadyObserved(usize),

    #[error("observation of type {got} for node {node} of type {expected}")]
    ObservationTypeMismatch {
        node: usize,
        expected: AtomicType,
        got: AtomicType,
    },

    #[error("expected {expected} latent values, got {got}")]
    LatentCount { expected: usize, got: usize },

    #[error("latent value of type {got} for node {node} of type {expected}")]
    LatentTypeMismatch {
        node: usize,
        expected: AtomicType,
        got: AtomicType,
    },

    /// A latent node whose type no global proposer can move.
    #[error("latent node {node} of type {ty} is not supported by global proposers")]
    UnsupportedLatent { node: usize, ty: AtomicType },

    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),
}

impl GraphError {
    /// A value outside its type's domain, as opposed to a fault in the
    /// graph's structure or the configuration.
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, GraphError::InvalidValue { .. })
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
