/*!
# Affine-Invariant Ensemble Sampler

The stretch move of Goodman & Weare (2010), in the split-ensemble form used by
`emcee`. The walkers are split into two halves; each half is moved using only
the committed positions of the other half, so within a generation no walker
sees another walker's half-finished update.

For a walker `x` and a randomly chosen walker `c` of the complementary half,
the proposal is `y = c + z (x - c)` with `z` drawn from `g(z) ∝ 1/sqrt(z)` on
`[1/a, a]`, accepted with probability `min(1, z^(P-1) p(y) / p(x))`.

```rust
use blackbody_mcmc::config::EnsembleConfig;
use blackbody_mcmc::core::Sampler;
use blackbody_mcmc::distributions::Target;
use blackbody_mcmc::ensemble::EnsembleSampler;

struct Normal2D;
impl Target for Normal2D {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        -0.5 * theta.iter().map(|x| x * x).sum::<f64>()
    }
}

let sampler = EnsembleSampler::new(EnsembleConfig::new(8, 200, 50).seed(3)).unwrap();
let chain = sampler.run(&Normal2D, &[1.0, 1.0]).unwrap();
// Flattened post-burn-in chain: (200 - 50) generations x 8 walkers.
assert_eq!(chain.n_samples(), 150 * 8);
```
*/

use indicatif::ProgressBar;
use ndarray::{Array2, Array3, Axis};
use rand::prelude::*;
use rand_distr::StandardNormal;
use tracing::{debug, info};

use crate::config::EnsembleConfig;
use crate::core::{Chain, Sampler};
use crate::distributions::Target;
use crate::error::McmcError;

/// Redraws allowed per walker when its initial position has zero density.
const MAX_INIT_ATTEMPTS: usize = 100;

/// Per-walker output of an ensemble run.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerRun {
    /// Positions after every generation, `n_steps x n_walkers x n_params`.
    pub positions: Array3<f64>,
    /// Accepted moves over total moves, across all walkers.
    pub acceptance_rate: f64,
}

/// The ensemble backend. Holds a validated [`EnsembleConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleSampler {
    pub config: EnsembleConfig,
}

struct Ensemble<'a, T: ?Sized> {
    target: &'a T,
    positions: Array2<f64>,
    log_probs: Vec<f64>,
    stretch: f64,
    rng: SmallRng,
    n_accepted: u64,
}

impl EnsembleSampler {
    pub fn new(config: EnsembleConfig) -> Result<Self, McmcError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs the ensemble and returns every walker's full trajectory, burn-in included.
    pub fn run_walkers<T: Target + ?Sized>(
        &self,
        target: &T,
        initial: &[f64],
        pb: &ProgressBar,
    ) -> Result<WalkerRun, McmcError> {
        let config = &self.config;
        config.validate()?;
        let dim = initial.len();
        if dim == 0 {
            return Err(McmcError::Configuration(
                "initial state must not be empty".to_string(),
            ));
        }
        if config.n_walkers < 2 * dim {
            return Err(McmcError::Configuration(format!(
                "need at least {} walkers for {} parameters, got {}",
                2 * dim,
                dim,
                config.n_walkers
            )));
        }
        if !target.unnorm_log_prob(initial).is_finite() {
            return Err(McmcError::InvalidParameter(format!(
                "log-posterior at initial state {initial:?} is not finite"
            )));
        }

        let seed = config.seed.unwrap_or_else(|| thread_rng().gen::<u64>());
        debug!(
            n_walkers = config.n_walkers,
            n_steps = config.n_steps,
            seed,
            "starting ensemble run"
        );
        let mut ensemble = Ensemble::initialize(target, initial, config, seed)?;

        let mut positions = Array3::<f64>::zeros((config.n_steps, config.n_walkers, dim));
        pb.set_length(config.n_steps as u64);
        for mut generation in positions.axis_iter_mut(Axis(0)) {
            ensemble.step();
            generation.assign(&ensemble.positions);
            pb.inc(1);
        }

        let acceptance_rate =
            ensemble.n_accepted as f64 / (config.n_steps * config.n_walkers) as f64;
        info!(
            n_walkers = config.n_walkers,
            n_steps = config.n_steps,
            acceptance_rate,
            "ensemble run finished"
        );
        Ok(WalkerRun {
            positions,
            acceptance_rate,
        })
    }
}

impl Sampler for EnsembleSampler {
    /// Flattens the post-burn-in generations, generation-major then walker order.
    fn run_with_progress<T: Target + ?Sized>(
        &self,
        target: &T,
        initial: &[f64],
        pb: &ProgressBar,
    ) -> Result<Chain, McmcError> {
        let run = self.run_walkers(target, initial, pb)?;
        let (n_steps, n_walkers, dim) = run.positions.dim();
        let kept = n_steps - self.config.discard;
        let flat = run
            .positions
            .slice_move(ndarray::s![self.config.discard.., .., ..])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((kept * n_walkers, dim))
            .map_err(|e| McmcError::Configuration(format!("cannot flatten walkers: {e}")))?;
        Ok(Chain::new(flat, run.acceptance_rate))
    }
}

impl<'a, T: Target + ?Sized> Ensemble<'a, T> {
    /// Scatters the walkers around `initial` by a relative Gaussian jitter;
    /// zero coordinates get an absolute jitter of the same size.
    fn initialize(
        target: &'a T,
        initial: &[f64],
        config: &EnsembleConfig,
        seed: u64,
    ) -> Result<Self, McmcError> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let dim = initial.len();
        let mut positions = Array2::<f64>::zeros((config.n_walkers, dim));
        let mut log_probs = Vec::with_capacity(config.n_walkers);

        for mut walker in positions.axis_iter_mut(Axis(0)) {
            let mut placed = false;
            for _ in 0..MAX_INIT_ATTEMPTS {
                for (w, &x0) in walker.iter_mut().zip(initial) {
                    let eps: f64 = rng.sample(StandardNormal);
                    let scale = if x0 == 0.0 { 1.0 } else { x0.abs() };
                    *w = x0 + config.init_spread * scale * eps;
                }
                let lp = target.unnorm_log_prob(&walker.to_vec());
                if lp.is_finite() {
                    log_probs.push(lp);
                    placed = true;
                    break;
                }
            }
            if !placed {
                return Err(McmcError::InvalidParameter(format!(
                    "could not place a walker with finite log-posterior near {initial:?}"
                )));
            }
        }

        Ok(Self {
            target,
            positions,
            log_probs,
            stretch: config.stretch,
            rng,
            n_accepted: 0,
        })
    }

    /// One generation: update the first half against the second, then the
    /// second half against the freshly updated first.
    fn step(&mut self) {
        let half = self.positions.nrows() / 2;
        let n = self.positions.nrows();
        self.update_half(0..half, half..n);
        self.update_half(half..n, 0..half);
    }

    fn update_half(&mut self, active: std::ops::Range<usize>, complement: std::ops::Range<usize>) {
        let dim = self.positions.ncols();
        let a = self.stretch;
        // Frozen copy: the active half only sees committed complementary positions.
        let others = self
            .positions
            .slice(ndarray::s![complement.clone(), ..])
            .to_owned();
        let mut proposal = vec![0.0; dim];

        for k in active {
            let u: f64 = self.rng.gen();
            let z = ((a - 1.0) * u + 1.0).powi(2) / a;
            let j = self.rng.gen_range(0..complement.len());
            let other = others.row(j);
            let walker = self.positions.row(k);
            for ((y, &c), &x) in proposal.iter_mut().zip(other.iter()).zip(walker.iter()) {
                *y = c + z * (x - c);
            }

            let lp = self.target.unnorm_log_prob(&proposal);
            let log_accept = (dim as f64 - 1.0) * z.ln() + lp - self.log_probs[k];
            let log_u: f64 = self.rng.gen::<f64>().ln();
            if lp.is_finite() && log_u < log_accept {
                self.positions
                    .row_mut(k)
                    .iter_mut()
                    .zip(&proposal)
                    .for_each(|(x, &y)| *x = y);
                self.log_probs[k] = lp;
                self.n_accepted += 1;
            }
        }
    }
}
