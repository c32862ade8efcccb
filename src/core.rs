//! Chain value type and the traits shared by both sampling backends.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::distributions::Target;
use crate::error::McmcError;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> &[f64];

    /// Get the current state without stepping.
    fn current_state(&self) -> &[f64];
}

/// "Configuration in, chain out": the contract both backends satisfy.
///
/// A sampler carries its configuration; each call to [`Sampler::run`] owns a
/// fresh random stream, so runs with a fixed seed are reproducible and runs
/// never share state.
pub trait Sampler {
    /// Samples `target` starting from `initial`, reporting progress on `pb`.
    fn run_with_progress<T: Target + ?Sized>(
        &self,
        target: &T,
        initial: &[f64],
        pb: &ProgressBar,
    ) -> Result<Chain, McmcError>;

    /// Samples `target` starting from `initial`.
    fn run<T: Target + ?Sized>(&self, target: &T, initial: &[f64]) -> Result<Chain, McmcError> {
        self.run_with_progress(target, initial, &ProgressBar::hidden())
    }
}

/// The samples of one run, `n_samples x n_params`, plus its acceptance rate.
///
/// A chain never changes after the run that produced it; burn-in removal
/// returns a new chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    samples: Array2<f64>,
    acceptance_rate: f64,
}

impl Chain {
    pub fn new(samples: Array2<f64>, acceptance_rate: f64) -> Self {
        Self {
            samples,
            acceptance_rate,
        }
    }

    pub fn samples(&self) -> ArrayView2<'_, f64> {
        self.samples.view()
    }

    pub fn into_samples(self) -> Array2<f64> {
        self.samples
    }

    pub fn n_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The trace of parameter `p`.
    pub fn param(&self, p: usize) -> ArrayView1<'_, f64> {
        self.samples.column(p)
    }

    /// Fraction of proposals accepted during the run.
    pub fn acceptance_rate(&self) -> f64 {
        self.acceptance_rate
    }

    /// Per-parameter mean, `None` for an empty chain.
    pub fn mean(&self) -> Option<Array1<f64>> {
        self.samples.mean_axis(Axis(0))
    }

    /// Per-parameter sample standard deviation (`n - 1` divisor).
    pub fn std(&self) -> Option<Array1<f64>> {
        if self.n_samples() < 2 {
            return None;
        }
        Some(self.samples.std_axis(Axis(0), 1.0))
    }

    /// Drops the first `n` samples.
    pub fn discard(&self, n: usize) -> Chain {
        let n = n.min(self.n_samples());
        Chain::new(self.samples.slice(s![n.., ..]).to_owned(), self.acceptance_rate)
    }

    /// Drops the leading `fraction` of the samples, `0 <= fraction < 1`.
    pub fn discard_fraction(&self, fraction: f64) -> Result<Chain, McmcError> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(McmcError::InvalidArgument(format!(
                "burn-in fraction must lie in [0, 1), got {fraction}"
            )));
        }
        let n = (fraction * self.n_samples() as f64).floor() as usize;
        Ok(self.discard(n))
    }
}

/// Style of the per-run progress bars.
pub fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Runs `chain` for `n_steps` and stacks every state into an `n_steps x dim` array.
pub fn run_chain<M: MarkovChain>(chain: &mut M, n_steps: usize) -> Array2<f64> {
    run_chain_with_progress(chain, n_steps, &ProgressBar::hidden())
}

pub fn run_chain_with_progress<M: MarkovChain>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Array2<f64> {
    let dim = chain.current_state().len();
    let mut out = Array2::<f64>::zeros((n_steps, dim));

    pb.set_length(n_steps as u64);

    for mut row in out.axis_iter_mut(Axis(0)) {
        let state = chain.step();
        row.assign(&ArrayView1::from(state));
        pb.inc(1);
    }

    out
}
