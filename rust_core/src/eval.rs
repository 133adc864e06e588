//! Forward evaluation of a graph.
//!
//! Node values never live on the nodes: each evaluation owns an
//! [`Evaluation`] context indexed by node, so repeated or concurrent
//! evaluations of one graph cannot alias. The walk also accumulates the
//! joint log-density (every sample node, latent or observed, scored under
//! its distribution) in graph order.

use rand::Rng;

use crate::distributions::{Dist, Distribution};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId, NodeKind};
use crate::number::Elementary;
use crate::operator;
use crate::value::{AtomicType, AtomicValue, TypedNumber};

/// Per-node values and the joint log-density of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation<N> {
    values: Vec<Option<TypedNumber<N>>>,
    log_prob: N,
}

impl<N: Elementary> Evaluation<N> {
    /// Value of `node`; `None` for distribution nodes.
    pub fn value(&self, node: NodeId) -> Option<&TypedNumber<N>> {
        self.values.get(node.0).and_then(Option::as_ref)
    }

    pub fn log_prob(&self) -> &N {
        &self.log_prob
    }

    pub fn into_log_prob(self) -> N {
        self.log_prob
    }
}

/// Walk the graph in order. `latent` supplies the value of each
/// unobserved sample node given its distribution.
fn walk<N, F>(graph: &Graph, mut latent: F) -> Result<Evaluation<N>>
where
    N: Elementary,
    F: FnMut(NodeId, AtomicType, &Dist<N>) -> Result<N>,
{
    let mut values: Vec<Option<TypedNumber<N>>> = Vec::with_capacity(graph.len());
    let mut log_prob = N::from_f64(0.0);

    for node in graph.nodes() {
        let read = |values: &[Option<TypedNumber<N>>], input: NodeId| {
            values[input.0].clone().ok_or(GraphError::MissingValue {
                node: node.id.0,
                input: input.0,
            })
        };

        let val = match &node.kind {
            NodeKind::Constant(v) => Some(v.to_number()),
            NodeKind::Operator(op) => {
                let input = read(&values, node.inputs[0])?;
                Some(operator::eval(*op, &input, node.id)?)
            }
            NodeKind::Distribution(_) => None,
            NodeKind::Sample => {
                let dist_node = &graph.nodes()[node.inputs[0].0];
                let kind = match dist_node.kind {
                    NodeKind::Distribution(kind) => kind,
                    _ => return Err(GraphError::NotADistribution(dist_node.id.0)),
                };
                let params = dist_node
                    .inputs
                    .iter()
                    .map(|&i| read(&values, i))
                    .collect::<Result<Vec<_>>>()?;
                let param_refs: Vec<&TypedNumber<N>> = params.iter().collect();
                let dist = kind.build(&param_refs, dist_node.id)?;

                let ty = kind.sample_type();
                let value = match graph.observation(node.id) {
                    Some(obs) => obs.to_number(),
                    None => TypedNumber::new(ty, latent(node.id, ty, &dist)?)?,
                };
                log_prob = log_prob + dist.log_prob(value.value().clone());
                Some(value)
            }
        };
        values.push(val);
    }

    Ok(Evaluation { values, log_prob })
}

/// Evaluate every node with the latent nodes set to `latents` (in
/// [`Graph::latent_nodes`] order).
pub fn evaluate<N: Elementary>(graph: &Graph, latents: &[N]) -> Result<Evaluation<N>> {
    let expected = graph.latent_nodes().len();
    if expected != latents.len() {
        return Err(GraphError::LatentCount {
            expected,
            got: latents.len(),
        });
    }
    let mut next = latents.iter();
    walk(graph, |_, _, _| {
        next.next().cloned().ok_or(GraphError::LatentCount {
            expected,
            got: latents.len(),
        })
    })
}

/// Joint log-density of the graph with the given latent values.
pub fn log_prob<N: Elementary>(graph: &Graph, latents: &[N]) -> Result<N> {
    Ok(evaluate(graph, latents)?.into_log_prob())
}

/// Plain-value evaluation: one entry per node, `None` for distributions.
pub fn evaluate_values(graph: &Graph, latents: &[AtomicValue]) -> Result<Vec<Option<AtomicValue>>> {
    let x: Vec<f64> = latents.iter().map(AtomicValue::as_double).collect();
    let eval = evaluate(graph, &x)?;
    eval.values
        .iter()
        .map(|v| v.as_ref().map(TypedNumber::to_atomic).transpose())
        .collect()
}

/// Draw every latent node from its prior, ancestrally, in graph order.
pub fn sample_prior<R: Rng + ?Sized>(graph: &Graph, rng: &mut R) -> Result<Vec<AtomicValue>> {
    let mut drawn = Vec::new();
    walk::<f64, _>(graph, |_, ty, dist| {
        let x = dist.sample(rng);
        drawn.push(AtomicValue::new(ty, x)?);
        Ok(x)
    })?;
    Ok(drawn)
}

/// Values of the graph's queried nodes for one sample of latent values.
pub fn query_values(graph: &Graph, latents: &[AtomicValue]) -> Result<Vec<AtomicValue>> {
    let values = evaluate_values(graph, latents)?;
    graph
        .queries()
        .iter()
        .map(|q| {
            values[q.0].ok_or(GraphError::MissingValue {
                node: q.0,
                input: q.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Dual;
    use crate::distributions::Normal;
    use crate::operator::UnaryOp;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// x ~ Normal(0, 1); y ~ Normal(x, 2) observed at 1.0
    fn regression() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let zero = g.add_constant_real(0.0);
        let one = g.add_constant_pos_real(1.0).unwrap();
        let prior = g.add_normal(zero, one);
        let x = g.add_sample(prior).unwrap();
        let two = g.add_constant_pos_real(2.0).unwrap();
        let lik = g.add_normal(x, two);
        let y = g.add_sample(lik).unwrap();
        g.observe(y, AtomicValue::real(1.0)).unwrap();
        (g, x)
    }

    #[test]
    fn test_joint_log_prob_sums_prior_and_likelihood() {
        let (g, _) = regression();
        let lp = log_prob(&g, &[0.4]).unwrap();
        let expected = Normal::new(0.0, 1.0).log_prob(0.4) + Normal::new(0.4, 2.0).log_prob(1.0);
        assert_eq!(lp.to_bits(), expected.to_bits());
    }

    #[test]
    fn test_dual_evaluation_gives_gradient() {
        let (g, _) = regression();
        let out = log_prob(&g, &[Dual::variable(0.4)]).unwrap();
        // d/dx = -x + (1 - x) / 4
        assert!((out.tangent - (-0.4 + 0.6 / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_latent_count_is_checked() {
        let (g, _) = regression();
        assert!(matches!(
            log_prob::<f64>(&g, &[]),
            Err(GraphError::LatentCount { .. })
        ));
        assert!(matches!(
            log_prob(&g, &[0.0, 1.0]),
            Err(GraphError::LatentCount { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_operator_chain_values() {
        let (mut g, x) = regression();
        let p = g.add_operator(UnaryOp::Logistic, x);
        let q = g.add_operator(UnaryOp::Complement, p);
        let values = evaluate_values(&g, &[AtomicValue::real(0.0)]).unwrap();
        assert_eq!(values[q.0], Some(AtomicValue::probability(0.5).unwrap()));
        assert_eq!(values[2], None);
    }

    #[test]
    fn test_invalid_parent_reported_at_evaluation() {
        let (mut g, x) = regression();
        let bad = g.add_operator(UnaryOp::Log, x);
        let err = evaluate_values(&g, &[AtomicValue::real(1.0)]).unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidParentType {
                op: "LOG",
                parent: AtomicType::Real,
                node: bad.0
            }
        );
    }

    #[test]
    fn test_operator_reading_distribution_fails() {
        let mut g = Graph::new();
        let sd = g.add_constant_pos_real(1.0).unwrap();
        let d = g.add_half_normal(sd);
        g.add_operator(UnaryOp::Exp, d);
        assert!(matches!(
            evaluate_values(&g, &[]),
            Err(GraphError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_sample_prior_is_seeded() {
        let (g, _) = regression();
        let a = sample_prior(&g, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let b = sample_prior(&g, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(a[0].ty(), AtomicType::Real);
    }

    #[test]
    fn test_query_values() {
        let (mut g, x) = regression();
        let e = g.add_operator(UnaryOp::Exp, x);
        g.query(e);
        g.query(x);
        let out = query_values(&g, &[AtomicValue::real(0.0)]).unwrap();
        assert_eq!(out, vec![AtomicValue::pos_real(1.0).unwrap(), AtomicValue::real(0.0)]);
    }
}
