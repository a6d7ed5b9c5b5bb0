//! LANDMARK PF: particle filter localization of a simulated robot against fixed range landmarks.
//!
//! The `run` command builds a filter from the default textbook setup (or a configuration file),
//! runs it for the configured number of steps and prints the mean particle-to-robot distance after
//! every move and resample. The `config` command writes the default configuration to a file as a
//! starting point for experiments.
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use std::error::Error;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use landmark_pf::ParticleFilter;
use landmark_pf::particle::PoseEstimator;
use landmark_pf::sim::SimulationConfig;

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Particle filter localization against fixed range landmarks.")]
struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the particle filter and report the error after every phase"
    )]
    Run(RunArgs),
    #[command(name = "config", about = "Write the default configuration to a file")]
    CreateConfig(CreateConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Configuration file (JSON/YAML/TOML); the textbook defaults are used if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,
    /// Override the number of particles
    #[arg(long)]
    particles: Option<usize>,
    /// Override the number of steps
    #[arg(long)]
    steps: Option<usize>,
    /// Override the pose estimator used in the step diagnostics
    #[arg(long, value_enum)]
    estimator: Option<PoseEstimator>,
    /// Write the per-snapshot error curve to this CSV file
    #[arg(long)]
    errors_csv: Option<PathBuf>,
    /// Write the per-step diagnostics to this CSV file
    #[arg(long)]
    diagnostics_csv: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output path; the format is chosen by extension (.json/.yaml/.yml/.toml)
    #[arg(short, long, default_value = "landmark_pf.toml")]
    output: PathBuf,
}

/// Open the log file for appending, creating it and any missing parent directories.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global logger.
///
/// Records are formatted as `timestamp [LEVEL] target - message` so per-step filter output can be
/// told apart from the CLI's own messages. Logs go to stderr unless `log_file` is given.
fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        let file = open_log_file(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SimulationConfig::from_file(path)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(particles) = args.particles {
        config.num_particles = particles;
    }
    if let Some(steps) = args.steps {
        config.num_steps = steps;
    }
    if let Some(estimator) = args.estimator {
        config.estimator = estimator;
    }

    let mut filter = ParticleFilter::new(config)?;
    let history = filter.run()?;

    println!("{:>5}  {:<10}  {:>12}", "step", "phase", "mean error");
    for (snapshot, error) in history.snapshots.iter().zip(history.mean_errors()?) {
        println!(
            "{:>5}  {:<10}  {:>12.4}",
            snapshot.step,
            format!("{:?}", snapshot.phase),
            error
        );
    }
    if let Some(estimate) = history.diagnostics.last().map(|d| d.estimate) {
        println!("Final estimate: {}", estimate);
        println!("Final truth:    {}", filter.robot().get_current_position());
    }

    if let Some(path) = &args.errors_csv {
        history.errors_to_csv(path)?;
        info!("Error curve written to {}", path.display());
    }
    if let Some(path) = &args.diagnostics_csv {
        history.diagnostics_to_csv(path)?;
        info!("Diagnostics written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(cli.log_level, cli.log_file.as_deref())?;

    match &cli.command {
        Command::Run(args) => run(args),
        Command::CreateConfig(args) => {
            SimulationConfig::default().to_file(&args.output)?;
            info!("Default configuration written to {}", args.output.display());
            Ok(())
        }
    }
}
