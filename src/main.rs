use std::error::Error;
use std::fs::{self, File};
use std::path::PathBuf;

use blackbody_mcmc::config::{EnsembleConfig, MetropolisConfig, ProposalScale};
use blackbody_mcmc::core::{progress_style, Chain, Sampler};
use blackbody_mcmc::ensemble::EnsembleSampler;
use blackbody_mcmc::io::csv::{
    load_observations_with_delimiter, save_autocorrelation_csv, save_chains_csv,
};
use blackbody_mcmc::metropolis_hastings::MetropolisHastings;
use blackbody_mcmc::model::{BlackbodyPosterior, Params};
use blackbody_mcmc::{plot, stats};
use clap::Parser;
use indicatif::ProgressBar;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::Serialize;
use tracing::{info, warn};

/// Spread of the log-normal jitter applied to the R-hat chains' starting points.
const START_JITTER: f64 = 0.1;

/// Fit a blackbody spectrum with Metropolis-Hastings and an ensemble sampler.
#[derive(Parser, Debug)]
#[command(name = "blackbody-mcmc", version, about)]
struct Cli {
    /// Observations: `wavelength,intensity[,uncertainty]` rows, wavelength in nm
    #[arg(long)]
    data: PathBuf,

    /// Field delimiter of the data file
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Metropolis-Hastings steps per chain
    #[arg(long, default_value_t = 50_000)]
    n_steps: usize,

    /// Ensemble generations
    #[arg(long, default_value_t = 10_000)]
    n_ensemble_steps: usize,

    /// Directory for CSV, JSON and HTML outputs
    #[arg(long, default_value = "output")]
    outdir: PathBuf,

    /// Proposal standard deviations for T and A
    #[arg(long, num_args = 2, value_names = ["SIGMA_T", "SIGMA_A"], default_values_t = [50.0, 0.1])]
    proposal_scale: Vec<f64>,

    /// Starting point (T in K, A)
    #[arg(long, num_args = 2, value_names = ["T", "A"], default_values_t = [5000.0, 1.0])]
    initial: Vec<f64>,

    /// Ensemble walkers (even, at least 4)
    #[arg(long, default_value_t = 32)]
    walkers: usize,

    /// Leading fraction of every chain discarded as burn-in
    #[arg(long, default_value_t = 0.2)]
    burn_fraction: f64,

    /// Independent Metropolis-Hastings chains for Gelman-Rubin
    #[arg(long, default_value_t = 4)]
    n_chains: usize,

    /// RNG seed; omit for a random run
    #[arg(long)]
    seed: Option<u64>,

    /// Uncertainty assumed for observations without one
    #[arg(long, default_value_t = 1.0)]
    noise_sigma: f64,

    /// Largest autocorrelation lag (default: half the chain)
    #[arg(long)]
    max_lag: Option<usize>,

    /// Log verbosity (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Hide progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Serialize)]
struct ParamSummary {
    name: &'static str,
    mean: f64,
    std: f64,
}

#[derive(Serialize)]
struct BackendSummary<C> {
    config: C,
    n_samples: usize,
    acceptance_rate: f64,
    params: Vec<ParamSummary>,
}

#[derive(Serialize)]
struct MixingSummary {
    name: &'static str,
    integrated_autocorr_time: Option<f64>,
    effective_sample_size: Option<f64>,
}

#[derive(Serialize)]
struct Summary {
    data: PathBuf,
    n_observations: usize,
    seed: Option<u64>,
    burn_fraction: f64,
    metropolis: BackendSummary<MetropolisConfig>,
    ensemble: BackendSummary<EnsembleConfig>,
    mixing: Vec<MixingSummary>,
    n_chains: usize,
    rhat: Option<Vec<f64>>,
}

fn backend_summary<C>(config: C, chain: &Chain) -> BackendSummary<C> {
    let missing = || Array1::from_elem(chain.n_params(), f64::NAN);
    let mean = chain.mean().unwrap_or_else(missing);
    let std = chain.std().unwrap_or_else(missing);
    let params = Params::NAMES
        .iter()
        .zip(mean.iter().zip(std.iter()))
        .map(|(&name, (&mean, &std))| ParamSummary { name, mean, std })
        .collect();
    BackendSummary {
        config,
        n_samples: chain.n_samples(),
        acceptance_rate: chain.acceptance_rate(),
        params,
    }
}

fn progress_bar(hidden: bool, prefix: String) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    ProgressBar::new(0)
        .with_style(progress_style())
        .with_prefix(prefix)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.n_chains < 2 {
        return Err(format!("--n-chains must be at least 2, got {}", cli.n_chains).into());
    }
    if !cli.delimiter.is_ascii() {
        return Err(format!(
            "--delimiter must be a single ASCII character, got {:?}",
            cli.delimiter
        )
        .into());
    }

    let observations = load_observations_with_delimiter(&cli.data, cli.delimiter as u8)?;
    info!(n = observations.len(), path = %cli.data.display(), "loaded observations");
    let posterior =
        BlackbodyPosterior::new(observations.clone()).default_sigma(cli.noise_sigma)?;

    let scale = ProposalScale::new(cli.proposal_scale[0], cli.proposal_scale[1])?;
    let initial = Params::new(cli.initial[0], cli.initial[1])?.to_array();

    // Metropolis-Hastings, single long chain.
    let mut mh_config = MetropolisConfig::new(cli.n_steps, scale);
    if let Some(seed) = cli.seed {
        mh_config = mh_config.seed(seed);
    }
    let mh = MetropolisHastings::new(mh_config)?;
    let pb = progress_bar(cli.no_progress, "metropolis".to_string());
    let mh_chain = mh
        .run_with_progress(&posterior, &initial, &pb)?
        .discard_fraction(cli.burn_fraction)?;
    pb.finish_with_message("Done!");

    // Ensemble backend.
    let discard = (cli.burn_fraction * cli.n_ensemble_steps as f64).floor() as usize;
    let mut ens_config = EnsembleConfig::new(cli.walkers, cli.n_ensemble_steps, discard);
    if let Some(seed) = cli.seed {
        ens_config = ens_config.seed(seed.wrapping_add(1));
    }
    let ensemble = EnsembleSampler::new(ens_config)?;
    let pb = progress_bar(cli.no_progress, "ensemble".to_string());
    let ens_chain = ensemble.run_with_progress(&posterior, &initial, &pb)?;
    pb.finish_with_message("Done!");

    // Independent chains from jittered starts for Gelman-Rubin.
    let mut rng = match cli.seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(2)),
        None => SmallRng::from_entropy(),
    };
    let starts: Vec<Vec<f64>> = (0..cli.n_chains)
        .map(|_| {
            initial
                .iter()
                .map(|&x| {
                    let z: f64 = rng.sample(StandardNormal);
                    x * (START_JITTER * z).exp()
                })
                .collect()
        })
        .collect();
    let mut rhat_config = mh_config;
    rhat_config.seed = cli.seed.map(|seed| seed.wrapping_add(3));
    let rhat_chains: Vec<Chain> = MetropolisHastings::new(rhat_config)?
        .run_chains_with_progress(&posterior, &starts, |i| {
            progress_bar(cli.no_progress, format!("chain {i}"))
        })?
        .into_iter()
        .map(|chain| chain.discard_fraction(cli.burn_fraction))
        .collect::<Result<_, _>>()?;
    let views: Vec<_> = rhat_chains.iter().map(|c| c.samples()).collect();
    let rhat = match stats::gelman_rubin(&views) {
        Ok(rhat) => {
            info!(rhat = ?rhat.to_vec(), "Gelman-Rubin");
            Some(rhat.to_vec())
        }
        Err(e) => {
            warn!(error = %e, "Gelman-Rubin diagnostic unavailable");
            None
        }
    };

    // Mixing of the main Metropolis-Hastings chain.
    let mut acfs = Vec::with_capacity(Params::DIM);
    let mut mixing = Vec::with_capacity(Params::DIM);
    for (p, &name) in Params::NAMES.iter().enumerate() {
        let trace = mh_chain.param(p);
        let acf = stats::autocorrelation(trace, cli.max_lag);
        let tau = stats::integrated_autocorr_time(trace, 5.0);
        match (&acf, &tau) {
            (Ok(_), Ok(tau)) => {
                info!(param = name, tau, ess = trace.len() as f64 / tau, "autocorrelation")
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(param = name, error = %e, "autocorrelation unavailable")
            }
        }
        mixing.push(MixingSummary {
            name,
            integrated_autocorr_time: tau.as_ref().ok().copied(),
            effective_sample_size: tau.as_ref().ok().map(|tau| trace.len() as f64 / tau),
        });
        acfs.push(acf.ok());
    }

    fs::create_dir_all(&cli.outdir)?;
    let out = |name: &str| cli.outdir.join(name);

    save_chains_csv(
        &[
            ("metropolis", std::slice::from_ref(&mh_chain)),
            ("ensemble", std::slice::from_ref(&ens_chain)),
            ("gelman-rubin", &rhat_chains),
        ],
        out("chains.csv"),
    )?;

    if let Some(acfs) = acfs.into_iter().collect::<Option<Vec<Array1<f64>>>>() {
        let n_lags = acfs.iter().map(|a| a.len()).min().unwrap_or(0);
        let acf = Array2::from_shape_fn((n_lags, acfs.len()), |(k, p)| acfs[p][k]);
        save_autocorrelation_csv(acf.view(), out("autocorrelation.csv"))?;
        plot::plot_autocorrelation(acf.view(), &out("autocorrelation.html"))?;
    }

    if let Some(mean) = mh_chain.mean() {
        let fit = Params::from_slice(mean.as_slice().unwrap_or(&initial))?;
        plot::plot_data_and_model(&observations, &fit, &out("data_model.html"))?;
    }
    let runs = [("metropolis", &mh_chain), ("ensemble", &ens_chain)];
    for (p, name) in Params::NAMES.iter().enumerate() {
        plot::plot_histograms(&runs, p, &out(&format!("hist_{name}.html")))?;
        plot::plot_traces(&runs, p, &out(&format!("trace_{name}.html")))?;
    }

    let summary = Summary {
        data: cli.data.clone(),
        n_observations: observations.len(),
        seed: cli.seed,
        burn_fraction: cli.burn_fraction,
        metropolis: backend_summary(mh_config, &mh_chain),
        ensemble: backend_summary(ens_config, &ens_chain),
        mixing,
        n_chains: cli.n_chains,
        rhat,
    };
    serde_json::to_writer_pretty(File::create(out("summary.json"))?, &summary)?;

    let backends = [
        ("Metropolis-Hastings", &summary.metropolis.params),
        ("Ensemble", &summary.ensemble.params),
    ];
    for (label, backend) in backends {
        let line: Vec<String> = backend
            .iter()
            .map(|p| format!("{} = {:.4} ± {:.4}", p.name, p.mean, p.std))
            .collect();
        println!("{label}: {}", line.join(", "));
    }
    println!("Results written to {}", cli.outdir.display());
    Ok(())
}
