/*!
# Metropolis–Hastings Sampler

Random-walk Metropolis over the `(T, A)` parameter space. Each step proposes
`candidate = current + N(0, diag(sigma_T, sigma_A))` and accepts it when its
log-posterior is at least the current one, or otherwise with probability
`exp(lp_candidate - lp_current)`. [`MHMarkovChain`] also takes other
[`Proposal`]s and adds the Hastings term `log q(x | x') - log q(x' | x)`,
which vanishes for the symmetric Gaussian. Rejected steps repeat the current state in
the chain, so a run of `n_steps` always yields `n_steps` samples. No burn-in
or thinning is applied here.

## Example Usage

```rust
use blackbody_mcmc::config::{MetropolisConfig, ProposalScale};
use blackbody_mcmc::core::Sampler;
use blackbody_mcmc::metropolis_hastings::MetropolisHastings;
use blackbody_mcmc::model::{synthetic_observations, wavelength_grid, BlackbodyPosterior, Params};
use rand::rngs::SmallRng;
use rand::SeedableRng;

let truth = Params::new(5000.0, 1.0).unwrap();
let mut rng = SmallRng::seed_from_u64(1);
let obs = synthetic_observations(&truth, &wavelength_grid(300.0, 2500.0, 50), 0.2, &mut rng).unwrap();
let posterior = BlackbodyPosterior::new(obs);

let config = MetropolisConfig::new(1_000, ProposalScale::new(50.0, 0.1).unwrap()).seed(42);
let mh = MetropolisHastings::new(config).unwrap();
let chain = mh.run(&posterior, &[4000.0, 0.5]).unwrap();
assert_eq!(chain.n_samples(), 1_000);
```
*/

use indicatif::ProgressBar;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::config::MetropolisConfig;
use crate::core::{run_chain_with_progress, Chain, MarkovChain, Sampler};
use crate::distributions::{DiagonalGaussian, Proposal, Target};
use crate::error::McmcError;

/// Acceptance rates outside this band usually mean a badly tuned proposal.
const HEALTHY_ACCEPTANCE: std::ops::RangeInclusive<f64> = 0.01..=0.9;

/// The hand-written Metropolis–Hastings backend.
///
/// Holds only a validated [`MetropolisConfig`]; every run builds its own
/// [`MHMarkovChain`] with a fresh random stream.
#[derive(Debug, Clone, PartialEq)]
pub struct MetropolisHastings {
    pub config: MetropolisConfig,
}

impl MetropolisHastings {
    /// Validates `config` up front so a bad step count or proposal scale fails
    /// before any sampling.
    pub fn new(config: MetropolisConfig) -> Result<Self, McmcError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs one independent chain per entry of `initial_states`, one after the
    /// other. Chain `i` is seeded with `seed + i` when the config has a seed.
    pub fn run_chains<T: Target + ?Sized>(
        &self,
        target: &T,
        initial_states: &[Vec<f64>],
    ) -> Result<Vec<Chain>, McmcError> {
        self.run_chains_with_progress(target, initial_states, |_| ProgressBar::hidden())
    }

    /// Like [`MetropolisHastings::run_chains`], asking `make_pb` for a progress
    /// bar per chain index.
    pub fn run_chains_with_progress<T, F>(
        &self,
        target: &T,
        initial_states: &[Vec<f64>],
        mut make_pb: F,
    ) -> Result<Vec<Chain>, McmcError>
    where
        T: Target + ?Sized,
        F: FnMut(usize) -> ProgressBar,
    {
        initial_states
            .iter()
            .enumerate()
            .map(|(i, initial)| {
                let mut config = self.config;
                config.seed = self.config.seed.map(|seed| seed.wrapping_add(i as u64));
                let pb = make_pb(i);
                let chain = MetropolisHastings { config }.run_with_progress(target, initial, &pb);
                pb.finish_with_message("Done!");
                chain
            })
            .collect()
    }
}

impl Sampler for MetropolisHastings {
    fn run_with_progress<T: Target + ?Sized>(
        &self,
        target: &T,
        initial: &[f64],
        pb: &ProgressBar,
    ) -> Result<Chain, McmcError> {
        self.config.validate()?;
        let proposal = DiagonalGaussian::from(self.config.proposal_scale);
        if initial.len() != proposal.dim() {
            return Err(McmcError::Configuration(format!(
                "initial state has {} parameters, proposal scale has {}",
                initial.len(),
                proposal.dim()
            )));
        }
        let seed = self.config.seed.unwrap_or_else(|| thread_rng().gen::<u64>());
        debug!(
            n_steps = self.config.n_steps,
            seed,
            ?initial,
            "starting Metropolis-Hastings run"
        );

        let mut chain = MHMarkovChain::new(target, proposal, initial, seed)?;
        let samples = run_chain_with_progress(&mut chain, self.config.n_steps, pb);
        let acceptance_rate = chain.acceptance_rate();

        info!(
            n_steps = self.config.n_steps,
            acceptance_rate, "Metropolis-Hastings run finished"
        );
        if !HEALTHY_ACCEPTANCE.contains(&acceptance_rate) {
            warn!(
                acceptance_rate,
                "acceptance rate is unusual; consider rescaling the proposal"
            );
        }
        Ok(Chain::new(samples, acceptance_rate))
    }
}

/// A single Metropolis–Hastings chain: the current state, its log-posterior and
/// the random stream driving the proposals.
pub struct MHMarkovChain<'a, T: ?Sized, Q = DiagonalGaussian> {
    /// The target distribution to sample from.
    pub target: &'a T,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    /// The current state of the chain.
    pub current_state: Vec<f64>,
    /// Log-posterior of `current_state`, always finite.
    pub current_log_prob: f64,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
    n_steps: u64,
    n_accepted: u64,
}

impl<'a, T, Q> MHMarkovChain<'a, T, Q>
where
    T: Target + ?Sized,
    Q: Proposal,
{
    /// Creates a chain at `initial_state`, failing if its log-posterior is not finite.
    pub fn new(
        target: &'a T,
        proposal: Q,
        initial_state: &[f64],
        seed: u64,
    ) -> Result<Self, McmcError> {
        let current_log_prob = target.unnorm_log_prob(initial_state);
        if !current_log_prob.is_finite() {
            return Err(McmcError::InvalidParameter(format!(
                "log-posterior at initial state {initial_state:?} is {current_log_prob}"
            )));
        }
        Ok(Self {
            target,
            proposal,
            current_state: initial_state.to_vec(),
            current_log_prob,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            n_steps: 0,
            n_accepted: 0,
        })
    }

    /// Fraction of steps so far whose candidate was accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_steps == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_steps as f64
        }
    }

    fn accept(&mut self, candidate: &[f64], candidate_log_prob: f64) -> bool {
        if !candidate_log_prob.is_finite() {
            return false;
        }
        let log_q_forward = self.proposal.log_prob(&self.current_state, candidate);
        let log_q_backward = self.proposal.log_prob(candidate, &self.current_state);
        let log_ratio =
            candidate_log_prob - self.current_log_prob + log_q_backward - log_q_forward;
        if log_ratio >= 0.0 {
            return true;
        }
        let u: f64 = self.rng.gen();
        u < log_ratio.exp()
    }
}

impl<T, Q> MarkovChain for MHMarkovChain<'_, T, Q>
where
    T: Target + ?Sized,
    Q: Proposal,
{
    /// Performs one Metropolis update and returns the (possibly unchanged) state.
    fn step(&mut self) -> &[f64] {
        let candidate = self.proposal.sample(&self.current_state, &mut self.rng);
        let candidate_log_prob = self.target.unnorm_log_prob(&candidate);
        self.n_steps += 1;
        if self.accept(&candidate, candidate_log_prob) {
            self.current_state = candidate;
            self.current_log_prob = candidate_log_prob;
            self.n_accepted += 1;
        }
        &self.current_state
    }

    fn current_state(&self) -> &[f64] {
        &self.current_state
    }
}
