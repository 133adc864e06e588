use rand::Rng;
use rand_distr::{Distribution as _, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::number::Number;
use crate::value::{AtomicType, TypedNumber};

/// log(√(2π)), computed once.
const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// A probability distribution whose parameters live in a generic numeric
/// representation `N`.
///
/// `log_prob` stays in `N` end to end, so evaluating it over a dual number
/// differentiates the density for free. `sample` works on doubles and
/// advances the caller's random source.
pub trait Distribution<N: Number> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64;
    fn log_prob(&self, value: N) -> N;
}

// ── Normal ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Normal<N> {
    pub mean: N,
    pub stddev: N,
}

impl<N: Number> Normal<N> {
    pub fn new(mean: N, stddev: N) -> Self {
        Self { mean, stddev }
    }
}

impl<N: Number> Distribution<N> for Normal<N> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        self.mean.as_double() + self.stddev.as_double() * z
    }

    /// -(v-m)^2 / (2 s^2) - log(s) - log(sqrt(2 pi)); the operation order is
    /// fixed so the f64 result is reproducible bit for bit.
    fn log_prob(&self, value: N) -> N {
        let vmm = value - self.mean.clone();
        let t2 = vmm.clone() * vmm;
        -t2 / (N::from_f64(2.0) * self.stddev.clone() * self.stddev.clone())
            - self.stddev.log()
            - N::from_f64(LOG_SQRT_2PI)
    }
}

// ── HalfNormal (x > 0) ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HalfNormal<N> {
    pub stddev: N,
}

impl<N: Number> HalfNormal<N> {
    pub fn new(stddev: N) -> Self {
        Self { stddev }
    }
}

impl<N: Number> Distribution<N> for HalfNormal<N> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        (self.stddev.as_double() * z).abs()
    }

    fn log_prob(&self, value: N) -> N {
        let t2 = value.clone() * value;
        N::from_f64(std::f64::consts::LN_2)
            - t2 / (N::from_f64(2.0) * self.stddev.clone() * self.stddev.clone())
            - self.stddev.log()
            - N::from_f64(LOG_SQRT_2PI)
    }
}

// ── Bernoulli (x ∈ {0, 1}) ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Bernoulli<N> {
    pub probability: N,
}

impl<N: Number> Bernoulli<N> {
    pub fn new(probability: N) -> Self {
        Self { probability }
    }
}

impl<N: Number> Distribution<N> for Bernoulli<N> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if rng.gen::<f64>() < self.probability.as_double() {
            1.0
        } else {
            0.0
        }
    }

    fn log_prob(&self, value: N) -> N {
        if value.as_double() == 1.0 {
            self.probability.log()
        } else {
            (N::from_f64(1.0) - self.probability.clone()).log()
        }
    }
}

// ── Graph-level dispatch ────────────────────────────────────────────

/// The closed set of distributions a graph can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionKind {
    Normal,
    HalfNormal,
    Bernoulli,
}

impl DistributionKind {
    pub fn name(self) -> &'static str {
        match self {
            DistributionKind::Normal => "NORMAL",
            DistributionKind::HalfNormal => "HALF_NORMAL",
            DistributionKind::Bernoulli => "BERNOULLI",
        }
    }

    /// Type of the values this distribution produces.
    pub fn sample_type(self) -> AtomicType {
        match self {
            DistributionKind::Normal => AtomicType::Real,
            DistributionKind::HalfNormal => AtomicType::PosReal,
            DistributionKind::Bernoulli => AtomicType::Boolean,
        }
    }

    /// Required tag of each parameter, in input order.
    pub fn param_types(self) -> &'static [AtomicType] {
        match self {
            DistributionKind::Normal => &[AtomicType::Real, AtomicType::PosReal],
            DistributionKind::HalfNormal => &[AtomicType::PosReal],
            DistributionKind::Bernoulli => &[AtomicType::Probability],
        }
    }

    /// Instantiate from evaluated parameters, checking their tags.
    pub fn build<N: Number>(self, params: &[&TypedNumber<N>], node: NodeId) -> Result<Dist<N>> {
        let expected = self.param_types();
        if params.len() != expected.len() {
            return Err(GraphError::Arity {
                op: self.name(),
                expected: expected.len(),
                got: params.len(),
                node: node.0,
            });
        }
        for (param, &ty) in params.iter().zip(expected) {
            if param.ty() != ty {
                return Err(GraphError::InvalidParentType {
                    op: self.name(),
                    parent: param.ty(),
                    node: node.0,
                });
            }
        }
        let v = |i: usize| params[i].value().clone();
        Ok(match self {
            DistributionKind::Normal => Dist::Normal(Normal::new(v(0), v(1))),
            DistributionKind::HalfNormal => Dist::HalfNormal(HalfNormal::new(v(0))),
            DistributionKind::Bernoulli => Dist::Bernoulli(Bernoulli::new(v(0))),
        })
    }
}

/// A distribution instance, dispatched by `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum Dist<N> {
    Normal(Normal<N>),
    HalfNormal(HalfNormal<N>),
    Bernoulli(Bernoulli<N>),
}

impl<N: Number> Distribution<N> for Dist<N> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Dist::Normal(d) => d.sample(rng),
            Dist::HalfNormal(d) => d.sample(rng),
            Dist::Bernoulli(d) => d.sample(rng),
        }
    }

    fn log_prob(&self, value: N) -> N {
        match self {
            Dist::Normal(d) => d.log_prob(value),
            Dist::HalfNormal(d) => d.log_prob(value),
            Dist::Bernoulli(d) => d.log_prob(value),
        }
    }
}
