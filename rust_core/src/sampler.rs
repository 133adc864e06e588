use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, DiagnosticsReport};
use crate::error::Result;
use crate::graph::Graph;
use crate::hmc::Hmc;
use crate::progress::{self, ProgressState};
use crate::proposer::{GlobalProposer, ProposerConfig, RandomWalk};
use crate::state::GlobalState;
use crate::value::AtomicValue;

/// Arguments of one [`GlobalMH::infer`] run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    pub num_samples: usize,
    pub seed: u64,
    pub num_warmup: usize,
    pub save_warmup: bool,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            seed: 42,
            num_warmup: 0,
            save_warmup: false,
        }
    }
}

/// Result of one Metropolis-Hastings step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub accepted: bool,
    /// log of the Metropolis-Hastings ratio the step was judged on.
    pub log_ratio: f64,
}

impl StepOutcome {
    /// min(1, exp(log_ratio)); zero when the ratio is undefined.
    pub fn accept_prob(&self) -> f64 {
        if self.log_ratio.is_nan() {
            0.0
        } else {
            self.log_ratio.min(0.0).exp()
        }
    }
}

/// Global Metropolis-Hastings driver: one chain over every latent node of
/// a graph, moved by an injected [`GlobalProposer`].
///
/// The graph is borrowed read-only, so independent chains can share it.
pub struct GlobalMH<'g> {
    graph: &'g Graph,
    state: GlobalState,
    initial: GlobalState,
    proposer: Box<dyn GlobalProposer>,
    rng: ChaCha8Rng,
    show_progress: bool,
    accepted: usize,
    recorded: usize,
}

impl<'g> GlobalMH<'g> {
    /// Initialise the chain by drawing every latent node from its prior
    /// with `seed`.
    pub fn new(graph: &'g Graph, seed: u64, proposer: Box<dyn GlobalProposer>) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let state = GlobalState::from_prior(graph, &mut rng)?;
        log::debug!(
            "initialised {} latent nodes from the prior (seed {}, log_prob {:.4})",
            state.len(),
            seed,
            state.log_prob()
        );
        Ok(Self {
            graph,
            initial: state.clone(),
            state,
            proposer,
            rng,
            show_progress: false,
            accepted: 0,
            recorded: 0,
        })
    }

    pub fn random_walk(graph: &'g Graph, seed: u64, step_size: f64) -> Result<Self> {
        Self::new(graph, seed, Box::new(RandomWalk::new(step_size)?))
    }

    pub fn hmc(graph: &'g Graph, seed: u64, path_length: f64, step_size: f64) -> Result<Self> {
        Self::new(graph, seed, Box::new(Hmc::new(path_length, step_size)?))
    }

    pub fn from_config(graph: &'g Graph, seed: u64, config: &ProposerConfig) -> Result<Self> {
        Self::new(graph, seed, config.build()?)
    }

    /// Render a live progress bar to stderr during `infer`.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn proposer_name(&self) -> &'static str {
        self.proposer.name()
    }

    /// Fraction of accepted steps among the recorded (post-warm-up) steps
    /// of the last `infer` run.
    pub fn acceptance_rate(&self) -> f64 {
        if self.recorded == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.recorded as f64
    }

    /// Propose, then accept with probability min(1, exp(Δ)).
    ///
    /// The proposer draws first; the acceptance uniform is always the
    /// step's last draw. The state is only written on acceptance.
    pub fn single_mh_step(&mut self) -> Result<StepOutcome> {
        let (candidate, adjustment) =
            self.proposer
                .propose(self.graph, &self.state, &mut self.rng)?;
        let log_ratio = candidate.log_prob() - self.state.log_prob() + adjustment;

        let u: f64 = self.rng.gen();
        let accepted = u.ln() < log_ratio;
        if accepted {
            self.state.accept(&candidate);
        }
        log::trace!(
            "{} step: log_ratio {:.4}, {}",
            self.proposer.name(),
            log_ratio,
            if accepted { "accepted" } else { "rejected" }
        );
        Ok(StepOutcome {
            accepted,
            log_ratio,
        })
    }

    /// Run `num_warmup` then `num_samples` steps from the initial state,
    /// reseeding the random source with `seed`. Returns one snapshot of
    /// the latent values per recorded step, warm-up first when
    /// `save_warmup` is set.
    pub fn infer(
        &mut self,
        num_samples: usize,
        seed: u64,
        num_warmup: usize,
        save_warmup: bool,
    ) -> Result<Vec<Vec<AtomicValue>>> {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.state = self.initial.clone();
        self.accepted = 0;
        self.recorded = 0;

        log::info!(
            "starting {} inference: {} latent nodes, {} warm-up + {} samples, seed {}",
            self.proposer.name(),
            self.state.len(),
            num_warmup,
            num_samples,
            seed
        );

        let progress = self
            .show_progress
            .then(|| Arc::new(ProgressState::new(self.proposer.name(), num_warmup, num_samples)));
        let handle = progress
            .as_ref()
            .map(|p| progress::spawn_progress_thread(Arc::clone(p)));

        let result = self.run(num_samples, num_warmup, save_warmup, progress.as_deref());

        if let Some(p) = &progress {
            p.finish();
        }
        if let Some(h) = handle {
            if h.join().is_err() {
                log::warn!("progress thread panicked; sampling results are unaffected");
            }
        }

        let samples = result?;
        log::info!(
            "finished {} inference: {} samples recorded, acceptance rate {:.3}",
            self.proposer.name(),
            samples.len(),
            self.acceptance_rate()
        );
        Ok(samples)
    }

    pub fn infer_with(&mut self, config: &InferConfig) -> Result<Vec<Vec<AtomicValue>>> {
        self.infer(
            config.num_samples,
            config.seed,
            config.num_warmup,
            config.save_warmup,
        )
    }

    fn run(
        &mut self,
        num_samples: usize,
        num_warmup: usize,
        save_warmup: bool,
        progress: Option<&ProgressState>,
    ) -> Result<Vec<Vec<AtomicValue>>> {
        self.proposer.prepare_graph(self.graph)?;
        self.proposer.initialize_proposer(self.graph, &self.state)?;

        let capacity = num_samples + if save_warmup { num_warmup } else { 0 };
        let mut samples = Vec::with_capacity(capacity);

        for i in 0..num_warmup {
            let outcome = self.single_mh_step()?;
            self.proposer.adapt(i, outcome.accept_prob());
            if save_warmup {
                samples.push(self.state.snapshot());
            }
            if let Some(p) = progress {
                p.increment(outcome.accepted);
            }
        }

        for _ in 0..num_samples {
            let outcome = self.single_mh_step()?;
            self.recorded += 1;
            if outcome.accepted {
                self.accepted += 1;
            }
            samples.push(self.state.snapshot());
            if let Some(p) = progress {
                p.increment(outcome.accepted);
            }
        }

        Ok(samples)
    }

    /// Diagnostics for samples produced by this driver, labelled with the
    /// latent nodes' names.
    pub fn summarize(&self, samples: &[Vec<AtomicValue>]) -> DiagnosticsReport {
        let labels = self
            .state
            .nodes()
            .iter()
            .map(|&n| self.graph.label(n))
            .collect();
        diagnostics::summarize(samples, self.acceptance_rate()).with_labels(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    fn standard_normal() -> Graph {
        let mut g = Graph::new();
        let m = g.add_constant_real(0.0);
        let sd = g.add_constant_pos_real(1.0).unwrap();
        let d = g.add_normal(m, sd);
        let x = g.add_sample(d).unwrap();
        g.set_name(x, "x");
        g
    }

    #[test]
    fn test_sample_counts() {
        let g = standard_normal();
        let mut mh = GlobalMH::random_walk(&g, 1, 1.0).unwrap();
        assert_eq!(mh.infer(100, 42, 10, false).unwrap().len(), 100);
        assert_eq!(mh.infer(100, 42, 10, true).unwrap().len(), 110);
        assert_eq!(mh.infer(0, 42, 0, false).unwrap().len(), 0);
    }

    #[test]
    fn test_infer_is_reproducible() {
        let g = standard_normal();
        let mut mh = GlobalMH::random_walk(&g, 7, 0.5).unwrap();
        let a = mh.infer(50, 3, 5, false).unwrap();
        let b = mh.infer(50, 3, 5, false).unwrap();
        assert_eq!(a, b);
        let c = mh.infer(50, 4, 5, false).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_acceptance_rate_in_unit_interval() {
        let g = standard_normal();
        let mut mh = GlobalMH::random_walk(&g, 1, 1.0).unwrap();
        assert_eq!(mh.acceptance_rate(), 0.0);
        mh.infer(200, 42, 0, false).unwrap();
        let rate = mh.acceptance_rate();
        assert!(rate > 0.0 && rate < 1.0, "rate {}", rate);
    }

    #[test]
    fn test_infer_with_config() {
        let g = standard_normal();
        let mut mh = GlobalMH::from_config(&g, 1, &ProposerConfig::default()).unwrap();
        let cfg = InferConfig {
            num_samples: 20,
            num_warmup: 5,
            save_warmup: true,
            ..InferConfig::default()
        };
        assert_eq!(mh.infer_with(&cfg).unwrap().len(), 25);
    }

    #[test]
    fn test_infer_config_defaults_from_json() {
        let cfg: InferConfig = serde_json::from_str(r#"{"num_samples": 10}"#).unwrap();
        assert_eq!(cfg.num_samples, 10);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.num_warmup, 0);
        assert!(!cfg.save_warmup);
    }

    #[test]
    fn test_accept_prob() {
        let o = |log_ratio| StepOutcome {
            accepted: false,
            log_ratio,
        };
        assert_eq!(o(1.0).accept_prob(), 1.0);
        assert!((o(-1.0).accept_prob() - (-1.0f64).exp()).abs() < 1e-15);
        assert_eq!(o(f64::NEG_INFINITY).accept_prob(), 0.0);
        assert_eq!(o(f64::NAN).accept_prob(), 0.0);
    }

    /// Re-run each step by hand on a clone of the driver's random source:
    /// all proposer draws, then one uniform.
    fn assert_draw_order(mut mh: GlobalMH<'_>, mut proposer: Box<dyn GlobalProposer>) {
        for _ in 0..25 {
            let mut replay = mh.rng.clone();
            let state = mh.state().clone();
            let (candidate, adjustment) = proposer
                .propose(mh.graph(), &state, &mut replay)
                .unwrap();
            let log_ratio = candidate.log_prob() - state.log_prob() + adjustment;
            let u: f64 = replay.gen();

            let outcome = mh.single_mh_step().unwrap();
            assert_eq!(outcome.log_ratio.to_bits(), log_ratio.to_bits());
            assert_eq!(outcome.accepted, u.ln() < log_ratio);
            assert_eq!(mh.rng.get_word_pos(), replay.get_word_pos());
            assert_eq!(mh.rng.gen::<u64>(), replay.gen::<u64>());
        }
    }

    #[test]
    fn test_acceptance_draw_follows_proposer_draws() {
        let g = standard_normal();
        let mh = GlobalMH::random_walk(&g, 7, 0.8).unwrap();
        assert_draw_order(mh, Box::new(RandomWalk::new(0.8).unwrap()));

        let mh = GlobalMH::hmc(&g, 7, 1.0, 0.25).unwrap();
        assert_draw_order(mh, Box::new(Hmc::new(1.0, 0.25).unwrap()));
    }

    #[test]
    fn test_bad_step_size_is_a_config_error() {
        let g = standard_normal();
        assert!(matches!(
            GlobalMH::random_walk(&g, 1, 0.0),
            Err(GraphError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_summary_uses_node_names() {
        let g = standard_normal();
        let mut mh = GlobalMH::random_walk(&g, 1, 1.0).unwrap();
        let samples = mh.infer(200, 42, 50, false).unwrap();
        let report = mh.summarize(&samples);
        assert_eq!(report.params.len(), 1);
        assert_eq!(report.params[0].name, "x");
        assert_eq!(report.num_draws, 200);
    }
}
