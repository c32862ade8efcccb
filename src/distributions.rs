/*!
Traits for target densities and proposal distributions, and the diagonal
Gaussian random-walk proposal used by the Metropolis–Hastings sampler.

States are plain `&[f64]` slices in parameter order. For the blackbody model
that order is `[T, A]`.

```rust
use blackbody_mcmc::distributions::{DiagonalGaussian, Proposal};
use rand::rngs::SmallRng;
use rand::SeedableRng;

let proposal = DiagonalGaussian::new(vec![50.0, 0.1]);
let mut rng = SmallRng::seed_from_u64(42);
let candidate = proposal.sample(&[5000.0, 1.0], &mut rng);
assert_eq!(candidate.len(), 2);
```
*/

use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::config::ProposalScale;

/// A continuous distribution we want to sample from.
pub trait Target {
    /// Returns the log of the unnormalized density at `theta`.
    ///
    /// States outside the support map to `f64::NEG_INFINITY`; implementations
    /// must not panic on them.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64;
}

impl<T: Target + ?Sized> Target for &T {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        (**self).unnorm_log_prob(theta)
    }
}

/// A trait for generating proposals in Metropolis–Hastings.
pub trait Proposal {
    /// Samples a new point from q(x' | x).
    fn sample<R: Rng + ?Sized>(&self, current: &[f64], rng: &mut R) -> Vec<f64>;

    /// Evaluates log q(x' | x).
    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64;
}

/**
Independent Gaussian steps with a separate standard deviation per coordinate.

The proposal is symmetric, so `log_prob(a, b) == log_prob(b, a)` and the
Hastings correction cancels.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussian {
    pub std: Vec<f64>,
}

impl DiagonalGaussian {
    pub fn new(std: Vec<f64>) -> Self {
        Self { std }
    }

    pub fn dim(&self) -> usize {
        self.std.len()
    }
}

impl From<ProposalScale> for DiagonalGaussian {
    fn from(scale: ProposalScale) -> Self {
        Self::new(scale.to_vec())
    }
}

impl Proposal for DiagonalGaussian {
    fn sample<R: Rng + ?Sized>(&self, current: &[f64], rng: &mut R) -> Vec<f64> {
        current
            .iter()
            .zip(&self.std)
            .map(|(&x, &std)| {
                let eps: f64 = rng.sample(StandardNormal);
                x + std * eps
            })
            .collect()
    }

    fn log_prob(&self, from: &[f64], to: &[f64]) -> f64 {
        from.iter()
            .zip(to)
            .zip(&self.std)
            .map(|((&f, &t), &std)| {
                let z = (t - f) / std;
                -0.5 * z * z - std.ln() - 0.5 * (2.0 * PI).ln()
            })
            .sum()
    }
}
