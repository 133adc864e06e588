use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::autodiff;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::proposer::{GlobalProposer, Proposal};
use crate::state::GlobalState;

/// Longest trajectory `Hmc::new` accepts, in leapfrog steps.
pub const MAX_LEAPFROG_STEPS: usize = 100_000;

/// Hamiltonian Monte Carlo proposer with an identity mass matrix.
///
/// Each proposal resamples the momentum, runs
/// `ceil(path_length / step_size)` leapfrog steps driven by the gradient
/// of the state's log-density, and proposes the end of the trajectory.
/// The acceptance adjustment is the kinetic energy lost along the way, so
/// the driver's ratio is the change in total energy.
#[derive(Debug, Clone)]
pub struct Hmc {
    path_length: f64,
    step_size: f64,
    num_steps: usize,
}

impl Hmc {
    pub fn new(path_length: f64, step_size: f64) -> Result<Self> {
        if !(path_length.is_finite() && path_length > 0.0) {
            return Err(GraphError::InvalidConfig(format!(
                "hmc path_length must be positive and finite, got {}",
                path_length
            )));
        }
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(GraphError::InvalidConfig(format!(
                "hmc step_size must be positive and finite, got {}",
                step_size
            )));
        }
        let steps = (path_length / step_size).ceil();
        if !(steps.is_finite() && steps <= MAX_LEAPFROG_STEPS as f64) {
            return Err(GraphError::InvalidConfig(format!(
                "hmc path_length / step_size = {} exceeds {} leapfrog steps",
                steps, MAX_LEAPFROG_STEPS
            )));
        }
        Ok(Self {
            path_length,
            step_size,
            num_steps: (steps as usize).max(1),
        })
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }
}

fn kinetic_energy(p: &[f64]) -> f64 {
    p.iter().map(|pi| 0.5 * pi * pi).sum()
}

/// Gradient at `q`, or `None` when `q` leaves the support.
fn grad_log_density(graph: &Graph, state: &GlobalState, q: &[f64]) -> Result<Option<Vec<f64>>> {
    match autodiff::gradient(q, |y| state.log_density(graph, y)) {
        Ok((_, grad)) => Ok(Some(grad)),
        Err(err) if err.is_out_of_domain() => Ok(None),
        Err(err) => Err(err),
    }
}

impl GlobalProposer for Hmc {
    fn name(&self) -> &'static str {
        "hmc"
    }

    fn propose(
        &mut self,
        graph: &Graph,
        state: &GlobalState,
        rng: &mut ChaCha8Rng,
    ) -> Result<Proposal> {
        let dim = state.len();
        let eps = self.step_size;

        // Sample momentum
        let p0: Vec<f64> = (0..dim).map(|_| StandardNormal.sample(rng)).collect();

        let mut q = state.position().to_vec();
        let mut p = p0.clone();
        let mut grad = match grad_log_density(graph, state, &q)? {
            Some(grad) => grad,
            None => return Ok((state.clone(), f64::NEG_INFINITY)),
        };

        // Half step for momentum
        for i in 0..dim {
            p[i] += 0.5 * eps * grad[i];
        }

        for step in 0..self.num_steps {
            for i in 0..dim {
                q[i] += eps * p[i];
            }
            grad = match grad_log_density(graph, state, &q)? {
                Some(grad) => grad,
                None => {
                    log::debug!("hmc trajectory left the support at leapfrog step {}", step);
                    return Ok((state.clone(), f64::NEG_INFINITY));
                }
            };

            if grad.iter().chain(q.iter()).any(|v| !v.is_finite()) {
                log::debug!("hmc trajectory diverged at leapfrog step {}", step);
                return Ok((state.clone(), f64::NEG_INFINITY));
            }

            // Full step for momentum (except at end)
            if step < self.num_steps - 1 {
                for i in 0..dim {
                    p[i] += eps * grad[i];
                }
            }
        }

        // Half step for momentum at end
        for i in 0..dim {
            p[i] += 0.5 * eps * grad[i];
        }

        let candidate = state.candidate_at(graph, &q)?;
        let adjustment = kinetic_energy(&p0) - kinetic_energy(&p);
        Ok((candidate, adjustment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AtomicValue;
    use rand::SeedableRng;

    fn standard_normal() -> Graph {
        let mut g = Graph::new();
        let m = g.add_constant_real(0.0);
        let sd = g.add_constant_pos_real(1.0).unwrap();
        let d = g.add_normal(m, sd);
        g.add_sample(d).unwrap();
        g
    }

    #[test]
    fn test_num_steps_rounds_up() {
        assert_eq!(Hmc::new(1.0, 0.3).unwrap().num_steps(), 4);
        assert_eq!(Hmc::new(1.0, 0.5).unwrap().num_steps(), 2);
        assert_eq!(Hmc::new(0.1, 1.0).unwrap().num_steps(), 1);
    }

    #[test]
    fn test_unbounded_trajectories_are_rejected() {
        assert!(matches!(
            Hmc::new(1e300, 1e-300),
            Err(GraphError::InvalidConfig(_))
        ));
        assert!(Hmc::new(1.0, 1e-6).is_err());
        assert_eq!(
            Hmc::new(MAX_LEAPFROG_STEPS as f64, 1.0).unwrap().num_steps(),
            MAX_LEAPFROG_STEPS
        );
    }

    #[test]
    fn test_trajectory_leaving_the_support_is_rejected() {
        // With a huge step the first position update lands far below the
        // log-space underflow point for most momentum draws.
        let mut g = Graph::new();
        let sd = g.add_constant_pos_real(1.0).unwrap();
        let d = g.add_half_normal(sd);
        g.add_sample(d).unwrap();
        let s = GlobalState::from_values(&g, vec![AtomicValue::pos_real(1.0).unwrap()]).unwrap();
        let mut hmc = Hmc::new(2000.0, 1000.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut rejected = 0;
        for _ in 0..50 {
            let (candidate, adjustment) = hmc.propose(&g, &s, &mut rng).unwrap();
            let delta = candidate.log_prob() - s.log_prob() + adjustment;
            if delta == f64::NEG_INFINITY {
                rejected += 1;
            }
            assert!(candidate.values()[0].as_double() > 0.0);
        }
        assert!(rejected > 0);
    }

    #[test]
    fn test_energy_is_nearly_conserved() {
        // With a small step the total energy change, which is what the
        // driver's acceptance ratio measures, is close to zero.
        let g = standard_normal();
        let s = GlobalState::from_values(&g, vec![AtomicValue::real(0.8)]).unwrap();
        let mut hmc = Hmc::new(1.0, 0.01).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (candidate, adjustment) = hmc.propose(&g, &s, &mut rng).unwrap();
        let delta = candidate.log_prob() - s.log_prob() + adjustment;
        assert!(delta.abs() < 1e-3, "energy error {}", delta);
        assert_ne!(candidate.position()[0], s.position()[0]);
    }

    #[test]
    fn test_divergent_trajectory_is_rejected() {
        let g = standard_normal();
        let s = GlobalState::from_values(&g, vec![AtomicValue::real(1e200)]).unwrap();
        let mut hmc = Hmc::new(1.0, 1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (_, adjustment) = hmc.propose(&g, &s, &mut rng).unwrap();
        assert_eq!(adjustment, f64::NEG_INFINITY);
    }
}
