//! Command-line driver: builds a model, evolves it frame by frame and writes
//! every frame to an output directory.
//!
//! ```text
//! superhydro --model bec_vortices --set nx=128 --set n_vortex=4 --frames 50 --png
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::PathBuf;

use superhydro::model::get_params_and_docs;
use superhydro::params::parse_assignment;
use superhydro::utils::*;
use superhydro::{build_model, run, Interrupt, Model, ModelKind, ParamValue, RunConfig};

#[derive(Parser, Debug)]
#[command(version, about = "Split-step GPE solver for superfluid dynamics")]
struct Cli {
    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model to run; overrides the configuration file.
    #[arg(long)]
    model: Option<String>,

    /// Parameter override, applied after the configuration file.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, ParamValue)>,

    /// Number of frames to compute.
    #[arg(long)]
    frames: Option<usize>,

    /// Time steps per frame.
    #[arg(long)]
    steps: Option<usize>,

    /// Directory the frames are written to.
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Also render each density frame as a PNG.
    #[arg(long)]
    png: bool,

    /// Number of tracer particles; defaults to the model's `tracer_particles`.
    #[arg(long)]
    tracers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    verbosity: log::LevelFilter,

    /// Worker threads for the FFTs.
    #[arg(long)]
    threads: Option<usize>,

    /// Print the parameters of the selected model and exit.
    #[arg(long)]
    list_params: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbosity)
        .init();

    if let Some(threads) = cli.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the thread pool")?;
    }

    let config = match &cli.config {
        Some(path) => RunConfig::read(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RunConfig::default(),
    };
    let kind: ModelKind = cli.model.as_deref().unwrap_or(&config.model).parse()?;

    if cli.list_params {
        for (name, value, doc) in get_params_and_docs(kind)? {
            println!("{name:>16} = {value:<10} {doc}");
        }
        return Ok(());
    }

    let overrides = config.params.clone().into_iter().chain(cli.set.clone());
    let mut model = build_model(kind, overrides)?;
    let frames = cli.frames.unwrap_or(config.frames);
    let steps = cli.steps.unwrap_or(config.steps_per_frame);

    let n_tracers = cli.tracers.unwrap_or(model.params().tracer_particles);
    let mut tracers = if n_tracers > 0 {
        Some(model.seed_tracers(n_tracers)?)
    } else {
        None
    };

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    write_coords(&model.grid().axis_values(0), cli.output.join("x.txt"))?;
    write_coords(&model.grid().axis_values(1), cli.output.join("y.txt"))?;
    write_params(
        kind.name(),
        model.params(),
        &model.diagnostics(),
        cli.output.join("params.txt"),
    )?;
    write_frame(&cli, 0, model.as_ref(), tracers.as_ref())?;

    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    ctrlc::set_handler(move || handle.trigger()).context("failed to install Ctrl-C handler")?;

    log::info!("running {kind}: {frames} frames of {steps} steps");
    let done = run(
        model.as_mut(),
        frames,
        steps,
        tracers.as_mut(),
        &interrupt,
        |frame, model, tracers| {
            write_frame(&cli, frame + 1, model, tracers)?;
            log::info!(
                "frame {}: t = {:.4}, E = {:.6e}",
                frame + 1,
                model.diagnostics().t,
                model.energy()
            );
            Ok(())
        },
    )?;

    write_phi(model.psi(), cli.output.join("psi.csv"))?;
    println!(
        "{done} of {frames} frames written to {} (t = {:.4})",
        cli.output.display(),
        model.diagnostics().t
    );
    Ok(())
}

fn write_frame(
    cli: &Cli,
    frame: usize,
    model: &dyn Model,
    tracers: Option<&superhydro::TracerParticles>,
) -> std::io::Result<()> {
    let density = model.density();
    write_density(&density, cli.output.join(format!("density_{frame:05}.csv")))?;
    if cli.png {
        write_density_png(&density, cli.output.join(format!("density_{frame:05}.png")))?;
    }
    if let Some(tracers) = tracers {
        write_tracers(tracers, cli.output.join(format!("tracers_{frame:05}.csv")))?;
    }
    Ok(())
}
