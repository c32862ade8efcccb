//! Interactive HTML figures of the data, the fitted model and the chains.

use std::fs;
use std::path::Path;

use ndarray::ArrayView2;
use plotly::common::Mode;
use plotly::layout::{Axis, BarMode};
use plotly::{Histogram, Layout, Plot, Scatter};
use tracing::debug;

use crate::core::Chain;
use crate::error::McmcError;
use crate::model::{wavelength_grid, Observations, Params};

const PALETTE: [&str; 6] = [
    "rgb(70, 130, 180)",
    "rgb(228, 87, 86)",
    "rgb(89, 161, 79)",
    "rgb(242, 142, 43)",
    "rgb(176, 122, 161)",
    "rgb(118, 183, 178)",
];

/// Number of points on the model curve.
const CURVE_POINTS: usize = 400;

fn param_name(p: usize) -> String {
    Params::NAMES
        .get(p)
        .map_or_else(|| format!("dim_{p}"), |s| s.to_string())
}

fn save(plot: &Plot, path: &Path) -> Result<(), McmcError> {
    fs::write(path, plot.to_html())?;
    debug!(path = %path.display(), "wrote plot");
    Ok(())
}

/// Measured spectrum as markers with the model curve for `params` on top.
pub fn plot_data_and_model(
    observations: &Observations,
    params: &Params,
    path: &Path,
) -> Result<(), McmcError> {
    let wavelengths = observations.wavelengths();
    let lo = wavelengths.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = wavelengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let curve_x = if hi > lo {
        wavelength_grid(lo, hi, CURVE_POINTS)
    } else {
        wavelengths.clone()
    };
    let curve_y: Vec<f64> = curve_x.iter().map(|&wl| params.intensity(wl)).collect();

    let data = Scatter::new(wavelengths, observations.intensities())
        .mode(Mode::Markers)
        .name("observed")
        .marker(plotly::common::Marker::new().size(6).color(PALETTE[0]));
    let model = Scatter::new(curve_x, curve_y)
        .mode(Mode::Lines)
        .name(
            format!(
                "model (T = {:.1} K, A = {:.4})",
                params.temperature, params.amplitude
            )
            .as_str(),
        )
        .line(plotly::common::Line::new().color(PALETTE[1]).width(2.0));

    let mut plot = Plot::new();
    plot.add_trace(data);
    plot.add_trace(model);
    plot.set_layout(
        Layout::new()
            .title("Blackbody spectrum")
            .x_axis(Axis::new().title("wavelength [nm]"))
            .y_axis(Axis::new().title("intensity [kW m^-2 sr^-1 nm^-1]"))
            .show_legend(true)
            .width(900)
            .height(600),
    );
    save(&plot, path)
}

/// Overlaid marginal histograms of parameter `p`, one per labelled run.
pub fn plot_histograms(runs: &[(&str, &Chain)], p: usize, path: &Path) -> Result<(), McmcError> {
    let name = param_name(p);
    let mut plot = Plot::new();
    for (i, (label, chain)) in runs.iter().enumerate() {
        let trace = Histogram::new(chain.param(p).to_vec())
            .name(*label)
            .opacity(0.6)
            .n_bins_x(60)
            .marker(plotly::common::Marker::new().color(PALETTE[i % PALETTE.len()]));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Posterior of {name}").as_str())
            .x_axis(Axis::new().title(name.as_str()))
            .y_axis(Axis::new().title("count"))
            .bar_mode(BarMode::Overlay)
            .width(900)
            .height(600),
    );
    save(&plot, path)
}

/// Trace of parameter `p` against the sample index, one line per labelled run.
pub fn plot_traces(runs: &[(&str, &Chain)], p: usize, path: &Path) -> Result<(), McmcError> {
    let name = param_name(p);
    let mut plot = Plot::new();
    for (i, (label, chain)) in runs.iter().enumerate() {
        let x: Vec<usize> = (0..chain.n_samples()).collect();
        let trace = Scatter::new(x, chain.param(p).to_vec())
            .mode(Mode::Lines)
            .name(*label)
            .line(plotly::common::Line::new().color(PALETTE[i % PALETTE.len()]).width(1.0));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Trace of {name}").as_str())
            .x_axis(Axis::new().title("sample"))
            .y_axis(Axis::new().title(name.as_str()))
            .width(1200)
            .height(500),
    );
    save(&plot, path)
}

/// Autocorrelation functions, `n_lags x n_params`, one line per parameter.
pub fn plot_autocorrelation(acf: ArrayView2<f64>, path: &Path) -> Result<(), McmcError> {
    let lags: Vec<usize> = (0..acf.nrows()).collect();
    let mut plot = Plot::new();
    for (p, column) in acf.columns().into_iter().enumerate() {
        let trace = Scatter::new(lags.clone(), column.to_vec())
            .mode(Mode::Lines)
            .name(param_name(p).as_str())
            .line(plotly::common::Line::new().color(PALETTE[p % PALETTE.len()]));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title("Autocorrelation")
            .x_axis(Axis::new().title("lag"))
            .y_axis(Axis::new().title("ACF"))
            .width(900)
            .height(500),
    );
    save(&plot, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn plots_are_written_as_html() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Observations::from_pairs(&[400.0, 500.0, 600.0], &[10.0, 12.0, 11.0]).unwrap();
        let params = Params::new(5000.0, 1.0).unwrap();
        let chain = Chain::new(array![[5000.0, 1.0], [5010.0, 0.98], [4990.0, 1.02]], 0.4);
        let runs = [("metropolis", &chain), ("ensemble", &chain)];
        let acf = array![[1.0, 1.0], [0.4, 0.3], [0.1, 0.05]];

        let files = [
            dir.path().join("data_model.html"),
            dir.path().join("hist_T.html"),
            dir.path().join("trace_A.html"),
            dir.path().join("autocorrelation.html"),
        ];
        plot_data_and_model(&obs, &params, &files[0]).unwrap();
        plot_histograms(&runs, 0, &files[1]).unwrap();
        plot_traces(&runs, 1, &files[2]).unwrap();
        plot_autocorrelation(acf.view(), &files[3]).unwrap();

        for file in &files {
            let html = fs::read_to_string(file).unwrap();
            assert!(html.contains("plotly"), "{} is not a plotly page", file.display());
        }
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let acf = array![[1.0], [0.5]];
        let path = dir.path().join("no_such_dir").join("acf.html");
        assert!(matches!(
            plot_autocorrelation(acf.view(), &path),
            Err(McmcError::Io(_))
        ));
    }

    #[test]
    fn single_wavelength_still_plots() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Observations::from_pairs(&[500.0], &[12.0]).unwrap();
        let params = Params::new(5000.0, 1.0).unwrap();
        let path = dir.path().join("one.html");
        plot_data_and_model(&obs, &params, &path).unwrap();
        assert!(path.exists());
    }
}
