//! Bayesian fitting of a blackbody spectrum with MCMC.
//!
//! Two samplers share one log posterior: a random-walk
//! [`MetropolisHastings`](metropolis_hastings::MetropolisHastings) chain and an
//! affine-invariant [`EnsembleSampler`](ensemble::EnsembleSampler). Both return
//! a [`Chain`](core::Chain) that the [`stats`] module turns into
//! autocorrelation, effective sample size and Gelman–Rubin diagnostics.

pub mod config;
pub mod core;
pub mod distributions;
pub mod ensemble;
pub mod error;
pub mod io;
pub mod metropolis_hastings;
pub mod model;
pub mod plot;
pub mod stats;

pub use crate::core::{Chain, Sampler};
pub use crate::error::McmcError;
