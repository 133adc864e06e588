//! Global proposers: strategies that move every latent node at once.

use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::hmc::Hmc;
use crate::state::GlobalState;

/// A candidate state and the log of the proposal's acceptance
/// adjustment (zero for symmetric proposals).
pub type Proposal = (GlobalState, f64);

/// Strategy injected into [`crate::sampler::GlobalMH`].
///
/// `propose` may draw from `rng` as often as it likes; the driver makes
/// its single acceptance draw only after `propose` returns.
pub trait GlobalProposer {
    fn name(&self) -> &'static str;

    /// Called once per run, before `initialize_proposer`, to precompute
    /// per-graph quantities.
    fn prepare_graph(&mut self, _graph: &Graph) -> Result<()> {
        Ok(())
    }

    /// Called once per run, before the first warm-up step.
    fn initialize_proposer(&mut self, _graph: &Graph, _state: &GlobalState) -> Result<()> {
        Ok(())
    }

    fn propose(
        &mut self,
        graph: &Graph,
        state: &GlobalState,
        rng: &mut ChaCha8Rng,
    ) -> Result<Proposal>;

    /// Called after every warm-up step with that step's acceptance
    /// probability. Adaptive variants retune here.
    fn adapt(&mut self, _iteration: usize, _accept_prob: f64) {}
}

/// Random-walk Metropolis-Hastings: Gaussian noise on every coordinate.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    step_size: f64,
}

impl RandomWalk {
    pub fn new(step_size: f64) -> Result<Self> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(GraphError::InvalidConfig(format!(
                "random walk step_size must be positive and finite, got {}",
                step_size
            )));
        }
        Ok(Self { step_size })
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }
}

impl GlobalProposer for RandomWalk {
    fn name(&self) -> &'static str {
        "random_walk"
    }

    fn propose(
        &mut self,
        graph: &Graph,
        state: &GlobalState,
        rng: &mut ChaCha8Rng,
    ) -> Result<Proposal> {
        let y: Vec<f64> = state
            .position()
            .iter()
            .map(|&yi| {
                let z: f64 = StandardNormal.sample(rng);
                yi + self.step_size * z
            })
            .collect();
        let candidate = state.candidate_at(graph, &y)?;
        Ok((candidate, 0.0))
    }
}

/// Selects a proposer by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposerConfig {
    RandomWalk { step_size: f64 },
    Hmc { path_length: f64, step_size: f64 },
}

impl Default for ProposerConfig {
    fn default() -> Self {
        ProposerConfig::RandomWalk { step_size: 1.0 }
    }
}

impl ProposerConfig {
    pub fn build(&self) -> Result<Box<dyn GlobalProposer>> {
        let proposer: Box<dyn GlobalProposer> = match *self {
            ProposerConfig::RandomWalk { step_size } => Box::new(RandomWalk::new(step_size)?),
            ProposerConfig::Hmc {
                path_length,
                step_size,
            } => Box::new(Hmc::new(path_length, step_size)?),
        };
        log::debug!("built {} proposer from {:?}", proposer.name(), self);
        Ok(proposer)
    }
}
