/*!
The blackbody intensity model and its log-posterior.

Wavelengths are in nanometres and intensities in kW·m⁻²·sr⁻¹·nm⁻¹, which puts a
5000 K blackbody at amplitude 1 in the range of a few to a dozen units over
the visible and near infrared.

```rust
use blackbody_mcmc::model::{predicted_intensity, Params};

let p = Params::new(5000.0, 1.0).unwrap();
let peak = predicted_intensity(580.0, p.temperature, p.amplitude);
assert!(peak > 10.0 && peak < 15.0);
```
*/

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::distributions::Target;
use crate::error::McmcError;

/// Planck constant, J·s.
pub const PLANCK: f64 = 6.626_070_15e-34;
/// Speed of light, m/s.
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e8;
/// Boltzmann constant, J/K.
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Largest argument for which `exp` stays finite in `f64`.
const MAX_EXPONENT: f64 = 709.0;
/// W·m⁻²·sr⁻¹·m⁻¹ to kW·m⁻²·sr⁻¹·nm⁻¹.
const INTENSITY_UNIT: f64 = 1e-12;

/// Spectral radiance of a blackbody at `temperature`, scaled by `amplitude`.
///
/// Uses `expm1` for accuracy in the Rayleigh–Jeans regime and returns exactly
/// `0.0` deep in the Wien tail, where `exp` would overflow. Only meaningful for
/// positive `wavelength` and `temperature`.
pub fn predicted_intensity(wavelength: f64, temperature: f64, amplitude: f64) -> f64 {
    let lambda = wavelength * 1e-9;
    let exponent = PLANCK * SPEED_OF_LIGHT / (lambda * BOLTZMANN * temperature);
    if exponent > MAX_EXPONENT {
        return 0.0;
    }
    let prefactor = 2.0 * PLANCK * SPEED_OF_LIGHT * SPEED_OF_LIGHT / lambda.powi(5);
    amplitude * prefactor / exponent.exp_m1() * INTENSITY_UNIT
}

/// A point in parameter space: temperature in kelvin and a positive amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub temperature: f64,
    pub amplitude: f64,
}

impl Params {
    /// Number of model parameters.
    pub const DIM: usize = 2;
    /// Parameter names in slice order.
    pub const NAMES: [&'static str; 2] = ["T", "A"];

    pub fn new(temperature: f64, amplitude: f64) -> Result<Self, McmcError> {
        let params = Self {
            temperature,
            amplitude,
        };
        if !params.is_valid() {
            return Err(McmcError::InvalidParameter(format!(
                "temperature and amplitude must be positive and finite, got T = {temperature}, A = {amplitude}"
            )));
        }
        Ok(params)
    }

    /// Reads `[T, A]` from a sampler state.
    pub fn from_slice(theta: &[f64]) -> Result<Self, McmcError> {
        match theta {
            [t, a] => Self::new(*t, *a),
            _ => Err(McmcError::InvalidParameter(format!(
                "expected {} parameters, got {}",
                Self::DIM,
                theta.len()
            ))),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.temperature.is_finite()
            && self.amplitude.is_finite()
            && self.temperature > 0.0
            && self.amplitude > 0.0
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.temperature, self.amplitude]
    }

    pub fn intensity(&self, wavelength: f64) -> f64 {
        predicted_intensity(wavelength, self.temperature, self.amplitude)
    }
}

/// One measured point of the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub wavelength: f64,
    pub intensity: f64,
    pub uncertainty: Option<f64>,
}

/// A validated, immutable set of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    points: Vec<Observation>,
}

impl Observations {
    pub fn new(points: Vec<Observation>) -> Result<Self, McmcError> {
        if points.is_empty() {
            return Err(McmcError::InvalidData("no observations".to_string()));
        }
        for (i, p) in points.iter().enumerate() {
            if !(p.wavelength.is_finite() && p.wavelength > 0.0) {
                return Err(McmcError::InvalidData(format!(
                    "observation {i}: wavelength must be positive and finite, got {}",
                    p.wavelength
                )));
            }
            if !p.intensity.is_finite() {
                return Err(McmcError::InvalidData(format!(
                    "observation {i}: intensity must be finite, got {}",
                    p.intensity
                )));
            }
            if let Some(sigma) = p.uncertainty {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(McmcError::InvalidData(format!(
                        "observation {i}: uncertainty must be positive and finite, got {sigma}"
                    )));
                }
            }
        }
        Ok(Self { points })
    }

    /// Builds observations without per-point uncertainties.
    pub fn from_pairs(wavelengths: &[f64], intensities: &[f64]) -> Result<Self, McmcError> {
        if wavelengths.len() != intensities.len() {
            return Err(McmcError::InvalidData(format!(
                "{} wavelengths but {} intensities",
                wavelengths.len(),
                intensities.len()
            )));
        }
        Self::new(
            wavelengths
                .iter()
                .zip(intensities)
                .map(|(&wavelength, &intensity)| Observation {
                    wavelength,
                    intensity,
                    uncertainty: None,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.points.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.points
    }

    pub fn wavelengths(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.wavelength).collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }
}

impl<'a> IntoIterator for &'a Observations {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Flat prior on the positive quadrant, optionally truncated from above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prior {
    pub temperature_max: f64,
    pub amplitude_max: f64,
}

impl Default for Prior {
    fn default() -> Self {
        Self {
            temperature_max: f64::INFINITY,
            amplitude_max: f64::INFINITY,
        }
    }
}

impl Prior {
    pub fn log_prior(&self, params: &Params) -> f64 {
        if params.is_valid()
            && params.temperature <= self.temperature_max
            && params.amplitude <= self.amplitude_max
        {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Negative sum of squared standardized residuals, `-sum(((y - I) / sigma)^2)`.
///
/// Points without an uncertainty use `default_sigma`.
pub fn log_likelihood(params: &Params, observations: &Observations, default_sigma: f64) -> f64 {
    -observations
        .iter()
        .map(|obs| {
            let sigma = obs.uncertainty.unwrap_or(default_sigma);
            let r = (obs.intensity - params.intensity(obs.wavelength)) / sigma;
            r * r
        })
        .sum::<f64>()
}

/// Log-posterior under a flat prior with unit noise on uncertainty-less points.
///
/// Returns `f64::NEG_INFINITY` when `T <= 0` or `A <= 0`.
pub fn log_posterior(params: &Params, observations: &Observations) -> f64 {
    let lp = Prior::default().log_prior(params);
    if !lp.is_finite() {
        return f64::NEG_INFINITY;
    }
    lp + log_likelihood(params, observations, 1.0)
}

/// Everything needed to evaluate the posterior of `(T, A)` given data.
#[derive(Debug, Clone, PartialEq)]
pub struct BlackbodyPosterior {
    pub observations: Observations,
    pub prior: Prior,
    /// Noise level for observations that carry no uncertainty.
    pub default_sigma: f64,
}

impl BlackbodyPosterior {
    pub fn new(observations: Observations) -> Self {
        Self {
            observations,
            prior: Prior::default(),
            default_sigma: 1.0,
        }
    }

    pub fn prior(mut self, prior: Prior) -> Self {
        self.prior = prior;
        self
    }

    pub fn default_sigma(mut self, sigma: f64) -> Result<Self, McmcError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(McmcError::InvalidData(format!(
                "default noise level must be positive and finite, got {sigma}"
            )));
        }
        self.default_sigma = sigma;
        Ok(self)
    }

    pub fn log_posterior(&self, params: &Params) -> f64 {
        let lp = self.prior.log_prior(params);
        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        lp + log_likelihood(params, &self.observations, self.default_sigma)
    }
}

impl Target for BlackbodyPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        match theta {
            [temperature, amplitude] => self.log_posterior(&Params {
                temperature: *temperature,
                amplitude: *amplitude,
            }),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Draws observations of a blackbody with Gaussian noise of width `noise_sigma`.
///
/// Each observation records `noise_sigma` as its uncertainty.
pub fn synthetic_observations<R: Rng + ?Sized>(
    params: &Params,
    wavelengths: &[f64],
    noise_sigma: f64,
    rng: &mut R,
) -> Result<Observations, McmcError> {
    let points = wavelengths
        .iter()
        .map(|&wavelength| {
            let noise: f64 = rng.sample(StandardNormal);
            Observation {
                wavelength,
                intensity: params.intensity(wavelength) + noise_sigma * noise,
                uncertainty: Some(noise_sigma),
            }
        })
        .collect();
    Observations::new(points)
}

/// `n` evenly spaced wavelengths from `start` to `end` inclusive.
pub fn wavelength_grid(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
