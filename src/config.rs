/*!
Run configuration for both sampling backends.

Configurations are plain values handed to a sampler when it is built. Nothing
here carries hidden defaults into a run: the Metropolis proposal scale in
particular must always be supplied by the caller.

```rust
use blackbody_mcmc::config::{MetropolisConfig, ProposalScale};

let scale = ProposalScale::new(50.0, 0.1).unwrap();
let config = MetropolisConfig::new(20_000, scale).seed(42);
assert!(config.validate().is_ok());
assert_eq!(config.seed, Some(42));
```
*/

use serde::{Deserialize, Serialize};

use crate::error::McmcError;

/// Standard deviations of the Gaussian random-walk proposal, one per parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposalScale {
    /// Step scale for the temperature, in kelvin.
    pub temperature: f64,
    /// Step scale for the amplitude.
    pub amplitude: f64,
}

impl ProposalScale {
    /// Creates a proposal scale, failing unless both values are positive and finite.
    pub fn new(temperature: f64, amplitude: f64) -> Result<Self, McmcError> {
        let scale = Self {
            temperature,
            amplitude,
        };
        scale.validate()?;
        Ok(scale)
    }

    pub fn validate(&self) -> Result<(), McmcError> {
        for (name, value) in [("temperature", self.temperature), ("amplitude", self.amplitude)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(McmcError::Configuration(format!(
                    "proposal scale for {name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// The scales in parameter order `[T, A]`.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.temperature, self.amplitude]
    }
}

/// Settings of a single random-walk Metropolis run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetropolisConfig {
    /// Number of steps, which is also the length of the produced chain.
    pub n_steps: usize,
    /// Proposal standard deviations.
    pub proposal_scale: ProposalScale,
    /// Seed of the run's random stream. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl MetropolisConfig {
    pub fn new(n_steps: usize, proposal_scale: ProposalScale) -> Self {
        Self {
            n_steps,
            proposal_scale,
            seed: None,
        }
    }

    /// Fixes the seed so the run is reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), McmcError> {
        if self.n_steps == 0 {
            return Err(McmcError::Configuration(
                "number of steps must be positive".to_string(),
            ));
        }
        self.proposal_scale.validate()
    }
}

/// Settings of an affine-invariant ensemble run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of walkers. Must be even and at least twice the dimension.
    pub n_walkers: usize,
    /// Number of generations each walker performs.
    pub n_steps: usize,
    /// Leading generations dropped from the flattened chain.
    pub discard: usize,
    /// Stretch-move scale `a`; the stretch factor lies in `[1/a, a]`.
    pub stretch: f64,
    /// Relative spread of the walkers around the starting guess.
    pub init_spread: f64,
    /// Seed of the run's random stream. `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_walkers: 32,
            n_steps: 10_000,
            discard: 2_000,
            stretch: 2.0,
            init_spread: 1e-3,
            seed: None,
        }
    }
}

impl EnsembleConfig {
    pub fn new(n_walkers: usize, n_steps: usize, discard: usize) -> Self {
        Self {
            n_walkers,
            n_steps,
            discard,
            ..Self::default()
        }
    }

    /// Fixes the seed so the run is reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), McmcError> {
        if self.n_steps == 0 {
            return Err(McmcError::Configuration(
                "number of steps must be positive".to_string(),
            ));
        }
        if self.discard >= self.n_steps {
            return Err(McmcError::Configuration(format!(
                "discard ({}) must be smaller than the number of steps ({})",
                self.discard, self.n_steps
            )));
        }
        if self.n_walkers < 2 || self.n_walkers % 2 != 0 {
            return Err(McmcError::Configuration(format!(
                "number of walkers must be even and at least 2, got {}",
                self.n_walkers
            )));
        }
        if !(self.stretch.is_finite() && self.stretch > 1.0) {
            return Err(McmcError::Configuration(format!(
                "stretch scale must be finite and greater than 1, got {}",
                self.stretch
            )));
        }
        if !(self.init_spread.is_finite() && self.init_spread > 0.0) {
            return Err(McmcError::Configuration(format!(
                "initial spread must be positive and finite, got {}",
                self.init_spread
            )));
        }
        Ok(())
    }
}
