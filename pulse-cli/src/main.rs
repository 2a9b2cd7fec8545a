// pulse: host binary
// Assembles a control kernel from a host config, runs the demo pipeline
// (sensor -> sine generator -> velocity controller) and shuts down
// cleanly. Exit code 0 on clean shutdown, non-zero when any component or
// extension fails to come up.

mod components;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulse_core::{Property, PropertyBag};
use pulse_kernel::{
    ControlKernel, EventExtension, KernelConfig, PropertyExtension, ReportingExtension, EVENT_SLIP,
};

use components::{JointSensor, SineGenerator, VelocityController};

#[derive(Parser)]
#[command(name = "pulse", about = "Run a Pulse control kernel")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demo kernel described by a host config.
    Run {
        /// Host configuration file (TOML).
        #[arg(long, default_value = "pulse.toml")]
        config: PathBuf,

        /// How long to run, in seconds.
        #[arg(long, default_value_t = 2.0)]
        duration: f64,

        /// Number of controlled axes.
        #[arg(long, default_value_t = 3)]
        axes: usize,

        /// Report variables every N periods.
        #[arg(long, default_value_t = 100)]
        report_every: u64,
    },
    /// Write a starter host config and demo property files.
    Scaffold {
        /// Directory to populate.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Number of controlled axes.
        #[arg(long, default_value_t = 3)]
        axes: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Run {
            config,
            duration,
            axes,
            report_every,
        } => run(&config, duration, axes, report_every),
        Command::Scaffold { dir, axes } => scaffold(&dir, axes),
    }
}

fn run(config_path: &Path, duration: f64, axes: usize, report_every: u64) -> Result<()> {
    let config = KernelConfig::load(config_path)?;
    let kernel = ControlKernel::from_config(&config);

    kernel
        .add_extension(Box::new(PropertyExtension::new(config.properties.clone())))
        .context("registering property extension")?;
    kernel
        .add_extension(Box::new(EventExtension::new(&kernel)))
        .context("registering event extension")?;
    kernel
        .add_extension(Box::new(ReportingExtension::new(report_every)))
        .context("registering reporting extension")?;

    kernel
        .events()
        .connect_sync(EVENT_SLIP, |args| {
            warn!(?args, "kernel slipped");
        })
        .context("connecting slip handler")?;

    kernel
        .load_component(JointSensor::new(axes))
        .context("loading sensor")?;
    kernel
        .load_component(SineGenerator::new(axes))
        .context("loading generator")?;
    kernel
        .load_component(VelocityController::new(axes))
        .context("loading controller")?;

    kernel.start().context("starting kernel")?;
    info!(
        kernel = kernel.name(),
        period_secs = config.period_secs,
        duration,
        "running"
    );
    std::thread::sleep(Duration::from_secs_f64(duration));
    kernel.stop().context("stopping kernel")?;

    let stats = kernel.stats();
    info!(
        periods = stats.periods,
        missed_steps = stats.missed_steps,
        "clean shutdown"
    );
    Ok(())
}

fn scaffold(dir: &Path, axes: usize) -> Result<()> {
    fs::create_dir_all(dir)?;

    let host = format!(
        "name = \"demo\"\nperiod_secs = 0.001\npriority = \"non-real-time\"\n\n\
         [properties]\nconfigureOnLoad = true\nsave_props = false\ndirectory = \"{}\"\n",
        dir.display()
    );
    fs::write(dir.join("pulse.toml"), host)?;

    let per_axis = |value: f64| vec![value; axes];
    write_properties(
        &dir.join("generator.xml"),
        "generator",
        &[
            ("amplitude", "Amplitude of sine", per_axis(0.1)),
            ("frequency", "Frequency of sine", per_axis(1.0)),
            ("phase", "Phase of sine", per_axis(0.0)),
        ],
    )?;
    write_properties(
        &dir.join("controller.xml"),
        "controller",
        &[("K", "Proportional Gain", per_axis(5.0))],
    )?;

    info!(dir = %dir.display(), "scaffold written; run: pulse run --config {}/pulse.toml", dir.display());
    Ok(())
}

fn write_properties(
    path: &Path,
    component: &str,
    entries: &[(&str, &str, Vec<f64>)],
) -> Result<()> {
    let mut bag = PropertyBag::with_type(component.to_string());
    for (name, description, values) in entries {
        let prop = Property::new(*name, *description, values.clone());
        bag.add(pulse_core::decompose_property(&prop));
    }
    let xml = pulse_core::marshal_to_string(&bag)
        .with_context(|| format!("marshalling {}", path.display()))?;
    fs::write(path, xml)?;
    Ok(())
}
