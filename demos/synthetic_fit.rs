//! Fits a synthetic 5800 K spectrum with both samplers and plots the result.

use std::error::Error;
use std::fs;
use std::path::Path;

use blackbody_mcmc::config::{EnsembleConfig, MetropolisConfig, ProposalScale};
use blackbody_mcmc::core::{progress_style, Sampler};
use blackbody_mcmc::ensemble::EnsembleSampler;
use blackbody_mcmc::metropolis_hastings::MetropolisHastings;
use blackbody_mcmc::model::{synthetic_observations, wavelength_grid, BlackbodyPosterior, Params};
use blackbody_mcmc::{plot, stats};
use indicatif::ProgressBar;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};

fn main() -> Result<(), Box<dyn Error>> {
    const N_STEPS: usize = 40_000;
    const BURN_FRACTION: f64 = 0.2;
    tracing_subscriber::fmt().with_target(false).init();

    let seed: u64 = thread_rng().gen();
    let truth = Params::new(5800.0, 0.8)?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let observations =
        synthetic_observations(&truth, &wavelength_grid(250.0, 2500.0, 60), 0.1, &mut rng)?;
    let posterior = BlackbodyPosterior::new(observations.clone());
    let start = [4500.0, 0.5];

    let scale = ProposalScale::new(20.0, 0.01)?;
    let mh = MetropolisHastings::new(MetropolisConfig::new(N_STEPS, scale).seed(seed))?;
    let pb = ProgressBar::new(0)
        .with_style(progress_style())
        .with_prefix("metropolis");
    let mh_chain = mh
        .run_with_progress(&posterior, &start, &pb)?
        .discard_fraction(BURN_FRACTION)?;
    pb.finish_with_message("Done!");

    let ensemble = EnsembleSampler::new(EnsembleConfig::new(32, 4_000, 1_000).seed(seed))?;
    let ens_chain = ensemble.run(&posterior, &start)?;

    for (label, chain) in [("Metropolis-Hastings", &mh_chain), ("Ensemble", &ens_chain)] {
        let mean = chain.mean().ok_or("empty chain")?;
        let std = chain.std().ok_or("chain too short")?;
        println!(
            "{label}: T = {:.1} ± {:.1} K, A = {:.4} ± {:.4} (acceptance {:.2})",
            mean[0],
            std[0],
            mean[1],
            std[1],
            chain.acceptance_rate()
        );
    }
    println!(
        "Truth: T = {:.1} K, A = {:.4}",
        truth.temperature, truth.amplitude
    );

    let ess = stats::effective_sample_size(mh_chain.param(0))?;
    println!("Effective sample size of T: {ess:.0} of {}", mh_chain.n_samples());

    let outdir = Path::new("synthetic_fit_output");
    fs::create_dir_all(outdir)?;
    let mean = mh_chain.mean().ok_or("empty chain")?;
    let fit = Params::new(mean[0], mean[1])?;
    plot::plot_data_and_model(&observations, &fit, &outdir.join("data_model.html"))?;
    let runs = [("metropolis", &mh_chain), ("ensemble", &ens_chain)];
    plot::plot_histograms(&runs, 0, &outdir.join("hist_T.html"))?;
    plot::plot_histograms(&runs, 1, &outdir.join("hist_A.html"))?;
    println!("Saved plots to {}", outdir.display());
    Ok(())
}
