//! Convergence diagnostics for MCMC chains: autocorrelation, integrated
//! autocorrelation time, effective sample size and the Gelman–Rubin R-hat.
//!
//! None of these substitute a fallback value for an undefined statistic. A
//! constant chain, for instance, has no autocorrelation and is reported as
//! [`McmcError::DegenerateChain`] instead of a NaN.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::McmcError;

/// Normalized autocorrelation of a single-parameter chain for lags `0..max_lag`.
///
/// The chain is mean-centred and zero-padded to a power of two of at least
/// twice its length, so the circular FFT convolution equals the linear one.
/// The autocovariance is the biased estimator (divided by `n`), and the result
/// is divided by its lag-0 value, which makes `acf[0] == 1.0` exactly.
/// `max_lag` defaults to half the chain length.
///
/// # Examples
///
/// ```rust
/// use blackbody_mcmc::stats::autocorrelation;
/// use ndarray::array;
///
/// let chain = array![1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0];
/// let acf = autocorrelation(chain.view(), None).unwrap();
/// assert_eq!(acf.len(), 4);
/// assert_eq!(acf[0], 1.0);
/// ```
pub fn autocorrelation(
    chain: ArrayView1<f64>,
    max_lag: Option<usize>,
) -> Result<Array1<f64>, McmcError> {
    let n = chain.len();
    if n < 2 {
        return Err(McmcError::InsufficientData(format!(
            "autocorrelation needs at least 2 samples, got {n}"
        )));
    }
    let max_lag = max_lag.unwrap_or(n / 2);
    if max_lag == 0 || max_lag > n {
        return Err(McmcError::InvalidArgument(format!(
            "max_lag must lie in 1..={n}, got {max_lag}"
        )));
    }
    if chain.iter().any(|x| !x.is_finite()) {
        return Err(McmcError::InvalidData(
            "chain contains non-finite samples".to_string(),
        ));
    }
    let first = chain[0];
    if chain.iter().all(|&x| x == first) {
        return Err(McmcError::DegenerateChain(
            "constant chain has zero autocovariance at lag 0".to_string(),
        ));
    }

    let acov = autocov_fft(chain);
    let acov0 = acov[0];
    if !(acov0.is_finite() && acov0 > 0.0) {
        return Err(McmcError::DegenerateChain(format!(
            "lag-0 autocovariance is {acov0}"
        )));
    }
    Ok(acov.slice_move(s![..max_lag]).mapv_into(|c| c / acov0))
}

/// Biased autocovariance for lags `0..n` via a zero-padded FFT.
///
/// `rustfft` does not normalize, so the inverse transform is divided by the
/// padded length explicitly.
fn autocov_fft(chain: ArrayView1<f64>) -> Array1<f64> {
    let n = chain.len();
    let n_padded = (2 * n).next_power_of_two();
    let mean = chain.sum() / n as f64;

    let mut buffer: Vec<Complex<f64>> = chain
        .iter()
        .map(|&x| Complex::new(x - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)).take(n_padded - n))
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n_padded).process(&mut buffer);
    buffer
        .iter_mut()
        .for_each(|c| *c = Complex::new(c.norm_sqr(), 0.0));
    planner.plan_fft_inverse(n_padded).process(&mut buffer);

    buffer
        .iter()
        .take(n)
        .map(|c| c.re / n_padded as f64 / n as f64)
        .collect()
}

/// Integrated autocorrelation time `tau = 1 + 2 * sum_k rho_k`, truncated with
/// Sokal's automatic window: the smallest `M` with `M >= window_c * tau(M)`.
///
/// If no lag satisfies the window condition the estimate over the full ACF is
/// returned; it is then a lower bound and the chain is too short to trust it.
pub fn integrated_autocorr_time(chain: ArrayView1<f64>, window_c: f64) -> Result<f64, McmcError> {
    if !(window_c.is_finite() && window_c > 0.0) {
        return Err(McmcError::InvalidArgument(format!(
            "window constant must be positive, got {window_c}"
        )));
    }
    let acf = autocorrelation(chain, Some(chain.len()))?;
    let mut tau = 1.0;
    for (m, rho) in acf.iter().enumerate().skip(1) {
        tau += 2.0 * rho;
        if m as f64 >= window_c * tau {
            return Ok(tau);
        }
    }
    Ok(tau)
}

/// Number of independent draws the chain is worth, `n / tau` with Sokal's
/// window at `c = 5`.
pub fn effective_sample_size(chain: ArrayView1<f64>) -> Result<f64, McmcError> {
    let tau = integrated_autocorr_time(chain, 5.0)?;
    Ok(chain.len() as f64 / tau)
}

/// Gelman–Rubin potential scale reduction factor, one value per parameter.
///
/// Every chain is `n_samples x n_params`. With `m` chains of length `n`:
/// `W` is the mean within-chain variance, `B = n * var(chain means)`,
/// `V = (n - 1) / n * W + B / n` and `R-hat = sqrt(V / W)`. Both variances use
/// the unbiased divisor.
///
/// # Examples
///
/// ```rust
/// use blackbody_mcmc::stats::gelman_rubin;
/// use ndarray::array;
///
/// let a = array![[0.0], [1.0], [0.0], [1.0]];
/// let b = array![[1.0], [0.0], [1.0], [0.0]];
/// let rhat = gelman_rubin(&[a.view(), b.view()]).unwrap();
/// assert!(rhat[0] < 1.0);
/// ```
pub fn gelman_rubin(chains: &[ArrayView2<f64>]) -> Result<Array1<f64>, McmcError> {
    let m = chains.len();
    if m < 2 {
        return Err(McmcError::InsufficientData(format!(
            "Gelman-Rubin needs at least two chains, got {m}"
        )));
    }
    let expected = chains[0].dim();
    for (index, chain) in chains.iter().enumerate() {
        if chain.dim() != expected {
            return Err(McmcError::ShapeMismatch {
                index,
                expected,
                found: chain.dim(),
            });
        }
    }
    let (n, n_params) = expected;
    if n < 2 {
        return Err(McmcError::InsufficientData(format!(
            "Gelman-Rubin needs at least two samples per chain, got {n}"
        )));
    }
    if let Some(index) = chains
        .iter()
        .position(|chain| chain.iter().any(|x| !x.is_finite()))
    {
        return Err(McmcError::InvalidData(format!(
            "chain {index} contains non-finite samples"
        )));
    }

    let mut means = Array2::<f64>::zeros((m, n_params));
    let mut vars = Array2::<f64>::zeros((m, n_params));
    for (i, chain) in chains.iter().enumerate() {
        let mean = chain
            .mean_axis(Axis(0))
            .ok_or_else(|| McmcError::InsufficientData("empty chain".to_string()))?;
        means.row_mut(i).assign(&mean);
        vars.row_mut(i).assign(&chain.var_axis(Axis(0), 1.0));
    }

    let n_f = n as f64;
    let within = vars.sum_axis(Axis(0)) / m as f64;
    let between = means.var_axis(Axis(0), 1.0) * n_f;

    if let Some(p) = within.iter().position(|&w| w <= 0.0) {
        return Err(McmcError::DegenerateChain(format!(
            "parameter {p} has zero within-chain variance"
        )));
    }

    let var_hat = &within * ((n_f - 1.0) / n_f) + &between / n_f;
    Ok((var_hat / &within).mapv_into(f64::sqrt))
}

/// Largest R-hat over all parameters.
pub fn max_rhat(chains: &[ArrayView2<f64>]) -> Result<f64, McmcError> {
    let rhat = gelman_rubin(chains)?;
    let max = rhat
        .max()
        .map_err(|e| McmcError::InvalidData(format!("R-hat is not comparable: {e}")))?;
    Ok(*max)
}

#[cfg(test)]
mod tests {
    use std::f64;

    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn white_noise(n: usize, seed: u64) -> Array1<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        Array1::from_iter((0..n).map(|_| StandardNormal.sample(&mut rng)))
    }

    /// AR(1) process `x_t = phi * x_{t-1} + e_t`, with `tau = (1 + phi) / (1 - phi)`.
    fn ar1(n: usize, phi: f64, seed: u64) -> Array1<f64> {
        let noise = white_noise(n, seed);
        let mut x = Array1::<f64>::zeros(n);
        for t in 1..n {
            x[t] = phi * x[t - 1] + noise[t];
        }
        x
    }

    fn autocov_direct(chain: ArrayView1<f64>) -> Array1<f64> {
        let n = chain.len();
        let mean = chain.sum() / n as f64;
        Array1::from_iter((0..n).map(|k| {
            (0..n - k)
                .map(|t| (chain[t] - mean) * (chain[t + k] - mean))
                .sum::<f64>()
                / n as f64
        }))
    }

    /// Builds chains (samples x params) from per-step (chains x params) arrays.
    fn chains_from_steps(steps: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let (m, p) = steps[0].dim();
        (0..m)
            .map(|c| {
                let mut chain = Array2::<f64>::zeros((steps.len(), p));
                for (t, step) in steps.iter().enumerate() {
                    chain.row_mut(t).assign(&step.row(c));
                }
                chain
            })
            .collect()
    }

    fn run_rhat_test(steps: &[Array2<f64>], expected: Array1<f64>, tol: f64) {
        let chains = chains_from_steps(steps);
        let views: Vec<_> = chains.iter().map(|c| c.view()).collect();
        let rhat = gelman_rubin(&views).unwrap();
        let diff = *(rhat.clone() - expected.clone()).abs().max().unwrap();
        assert!(
            diff < tol,
            "Mismatch in Rhat. Got {:?}, expected {:?}, diff = {:?}",
            rhat,
            expected,
            diff
        );
    }

    #[test]
    fn acf_lag_zero_is_exactly_one() {
        for seed in 0..5 {
            let chain = white_noise(1_000 + seed as usize * 37, seed);
            let acf = autocorrelation(chain.view(), None).unwrap();
            assert_eq!(acf[0], 1.0);
            assert_eq!(acf.len(), chain.len() / 2);
        }
    }

    #[test]
    fn acf_matches_direct_sum() {
        let chain = ar1(300, 0.7, 3);
        let acf = autocorrelation(chain.view(), Some(300)).unwrap();
        let direct = autocov_direct(chain.view());
        let expected = &direct / direct[0];
        assert_abs_diff_eq!(acf, expected, epsilon = 1e-10);
    }

    #[test]
    fn acf_of_white_noise_decays() {
        let chain = white_noise(10_000, 11);
        let acf = autocorrelation(chain.view(), Some(50)).unwrap();
        // Standard error of a white-noise ACF estimate is ~1/sqrt(n) = 0.01.
        for (lag, rho) in acf.iter().enumerate().skip(1) {
            assert!(rho.abs() < 0.05, "lag {lag}: {rho}");
        }
    }

    #[test]
    fn acf_of_ar1_follows_phi() {
        let chain = ar1(50_000, 0.8, 5);
        let acf = autocorrelation(chain.view(), Some(5)).unwrap();
        for (lag, rho) in acf.iter().enumerate() {
            assert_abs_diff_eq!(*rho, 0.8_f64.powi(lag as i32), epsilon = 0.03);
        }
    }

    #[test]
    fn acf_constant_chain_is_degenerate() {
        let chain = Array1::from_elem(100, 0.1);
        assert!(matches!(
            autocorrelation(chain.view(), None),
            Err(McmcError::DegenerateChain(_))
        ));
    }

    #[test]
    fn acf_argument_checks() {
        let chain = white_noise(10, 1);
        assert!(matches!(
            autocorrelation(chain.view(), Some(0)),
            Err(McmcError::InvalidArgument(_))
        ));
        assert!(matches!(
            autocorrelation(chain.view(), Some(11)),
            Err(McmcError::InvalidArgument(_))
        ));
        assert!(matches!(
            autocorrelation(chain.slice(s![..1]), None),
            Err(McmcError::InsufficientData(_))
        ));
        let mut bad = chain.clone();
        bad[3] = f64::NAN;
        assert!(matches!(
            autocorrelation(bad.view(), None),
            Err(McmcError::InvalidData(_))
        ));
    }

    #[test]
    fn iat_of_white_noise_is_about_one() {
        let chain = white_noise(20_000, 2);
        let tau = integrated_autocorr_time(chain.view(), 5.0).unwrap();
        assert_abs_diff_eq!(tau, 1.0, epsilon = 0.15);
        let ess = effective_sample_size(chain.view()).unwrap();
        assert!(ess > 15_000.0, "ess = {ess}");
    }

    #[test]
    fn iat_of_ar1_matches_theory() {
        let phi = 0.9;
        let chain = ar1(200_000, phi, 8);
        let tau = integrated_autocorr_time(chain.view(), 5.0).unwrap();
        let expected = (1.0 + phi) / (1.0 - phi);
        assert!(
            (tau - expected).abs() / expected < 0.15,
            "tau = {tau}, expected {expected}"
        );
    }

    #[test]
    fn iat_rejects_bad_window() {
        let chain = white_noise(100, 1);
        assert!(matches!(
            integrated_autocorr_time(chain.view(), 0.0),
            Err(McmcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rhat_reference_values() {
        // Step 0 data (chains x params)
        let data_step_0 = arr2(&[
            [0.0, 1.0, 0.0, 1.0], // chain 0
            [1.0, 2.0, 0.0, 2.0], // chain 1
            [0.0, 0.0, 0.0, 2.0], // chain 2
        ]);

        // Step 1 data (chains x params)
        let data_step_1 = arr2(&[
            [1.0, 2.0, 2.0, 0.0], // chain 0
            [1.0, 1.0, 1.0, 1.0], // chain 1
            [0.0, 1.0, 0.0, 0.0], // chain 2
        ]);
        let expected = array![f64::consts::SQRT_2, 1.08012345, 0.89442719, 0.8660254];
        run_rhat_test(&[data_step_0, data_step_1], expected, 1e-7);
    }

    #[test]
    fn test_rhat_reference_values_2() {
        let data_step_0 = arr2(&[
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 2.0],
        ]);
        let data_step_1 = arr2(&[
            [1.0, 2.0, 0.0, 2.0],
            [1.0, 2.0, 0.0, 0.0],
            [2.0, 0.0, 1.0, 2.0],
        ]);
        let expected = array![f64::consts::FRAC_1_SQRT_2, 0.74535599, 1.0, 1.5];
        run_rhat_test(&[data_step_0, data_step_1], expected, 1e-7);
    }

    #[test]
    fn rhat_near_one_for_iid_chains() {
        let chains: Vec<Array2<f64>> = (0..4)
            .map(|seed| white_noise(5_000, 100 + seed).into_shape_with_order((5_000, 1)).unwrap())
            .collect();
        let views: Vec<_> = chains.iter().map(|c| c.view()).collect();
        let rhat = gelman_rubin(&views).unwrap();
        assert_abs_diff_eq!(rhat[0], 1.0, epsilon = 0.05);
    }

    #[test]
    fn rhat_large_for_separated_chains() {
        let chains: Vec<Array2<f64>> = (0..4)
            .map(|c| {
                let noise = white_noise(200, 200 + c as u64);
                (noise * 0.1 + 3.0 * c as f64).into_shape_with_order((200, 1)).unwrap()
            })
            .collect();
        let views: Vec<_> = chains.iter().map(|c| c.view()).collect();
        let rhat = max_rhat(&views).unwrap();
        assert!(rhat > 1.1, "rhat = {rhat}");
    }

    #[test]
    fn rhat_shape_and_count_errors() {
        let a = Array2::<f64>::zeros((10, 2));
        let b = Array2::<f64>::zeros((9, 2));
        let c = Array2::<f64>::zeros((10, 3));
        match gelman_rubin(&[a.view(), b.view()]) {
            Err(McmcError::ShapeMismatch {
                index,
                expected,
                found,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(expected, (10, 2));
                assert_eq!(found, (9, 2));
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
        assert!(matches!(
            gelman_rubin(&[a.view(), a.view(), c.view()]),
            Err(McmcError::ShapeMismatch { index: 2, .. })
        ));
        assert!(matches!(
            gelman_rubin(&[a.view()]),
            Err(McmcError::InsufficientData(_))
        ));
        assert!(matches!(
            gelman_rubin(&[]),
            Err(McmcError::InsufficientData(_))
        ));
    }

    #[test]
    fn rhat_constant_chains_are_degenerate() {
        let a = Array2::from_elem((50, 2), 1.0);
        let b = Array2::from_elem((50, 2), 2.0);
        assert!(matches!(
            gelman_rubin(&[a.view(), b.view()]),
            Err(McmcError::DegenerateChain(_))
        ));
    }

    #[test]
    fn rhat_rejects_non_finite_samples() {
        let a = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        for bad in [f64::NAN, f64::INFINITY] {
            let mut b = a.clone();
            b[[7, 1]] = bad;
            match gelman_rubin(&[a.view(), b.view()]) {
                Err(McmcError::InvalidData(msg)) => assert!(msg.contains("chain 1"), "{msg}"),
                other => panic!("expected invalid data, got {other:?}"),
            }
        }
    }

    #[test]
    fn rhat_single_sample_chains() {
        let a = Array2::<f64>::zeros((1, 2));
        assert!(matches!(
            gelman_rubin(&[a.view(), a.view()]),
            Err(McmcError::InsufficientData(_))
        ));
    }
}
