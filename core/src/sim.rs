//! Simulation configuration, run history and CSV reports.
//!
//! This module provides:
//! - `SimulationConfig`, the full set of parameters for one localization run, readable from and
//!   writable to JSON, YAML or TOML files
//! - `History`, the recording of every snapshot and per-step diagnostic a run produces
//! - CSV export of the error curve and the per-step diagnostics
use crate::{Landmark, Pose};
use crate::agent::{Agent, NoiseParameters};
use crate::error::{FilterError, Result};
use crate::particle::{PoseEstimator, evaluate};

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_WORLD_SIZE: f64 = 100.0;
pub const DEFAULT_NUM_PARTICLES: usize = 1000;
pub const DEFAULT_NUM_STEPS: usize = 15;
pub const DEFAULT_FORWARD_DISTANCE: f64 = 2.0;
pub const DEFAULT_TURN_ANGLE: f64 = PI / 6.0;
pub const DEFAULT_SEED: u64 = 42;

/// Four landmarks at 20% and 80% of the world extent along each axis.
pub fn default_landmarks(world_size: f64) -> Vec<Landmark> {
    vec![
        Landmark::new(0.2 * world_size, 0.2 * world_size),
        Landmark::new(0.2 * world_size, 0.8 * world_size),
        Landmark::new(0.8 * world_size, 0.2 * world_size),
        Landmark::new(0.8 * world_size, 0.8 * world_size),
    ]
}

/// Parameters of one localization run.
///
/// Every field has a default, so a configuration file only needs to name the values it changes.
///
/// ```
/// use landmark_pf::sim::SimulationConfig;
///
/// let config: SimulationConfig = toml::from_str("num_particles = 250\nseed = 7").unwrap();
/// assert_eq!(config.num_particles, 250);
/// assert_eq!(config.num_steps, 15);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Side length of the square world the particles are scattered over at start-up
    pub world_size: f64,
    /// Number of particles in the population
    pub num_particles: usize,
    /// Number of predict/weight/resample steps to run
    pub num_steps: usize,
    /// Commanded turn per step, in radians
    pub turn_angle: f64,
    /// Commanded forward distance per step
    pub forward_distance: f64,
    /// Seed of the random source used by [crate::ParticleFilter::new]
    pub seed: u64,
    /// How the population is reduced to a pose estimate in the step diagnostics
    pub estimator: PoseEstimator,
    /// Starting pose of the robot as `[x, y, heading]`; drawn uniformly over the world if absent
    pub initial_pose: Option<Pose>,
    /// Known landmark positions, in measurement order
    pub landmarks: Vec<Landmark>,
    /// Motion and sensing noise of every particle. The sense noise also serves as the likelihood
    /// standard deviation.
    pub particle_noise: NoiseParameters,
    /// Motion and sensing noise of the ground-truth robot
    pub robot_noise: NoiseParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            world_size: DEFAULT_WORLD_SIZE,
            num_particles: DEFAULT_NUM_PARTICLES,
            num_steps: DEFAULT_NUM_STEPS,
            turn_angle: DEFAULT_TURN_ANGLE,
            forward_distance: DEFAULT_FORWARD_DISTANCE,
            seed: DEFAULT_SEED,
            estimator: PoseEstimator::default(),
            initial_pose: Some(Pose::new(50.0, 50.0, PI / 2.0)),
            landmarks: default_landmarks(DEFAULT_WORLD_SIZE),
            particle_noise: NoiseParameters {
                forward_noise: 0.05,
                turn_noise: 0.05,
                sense_noise: 5.0,
            },
            robot_noise: NoiseParameters::noiseless(),
        }
    }
}

impl SimulationConfig {
    /// Standard deviation used to score particles against the robot's measurements.
    pub fn likelihood_noise(&self) -> f64 {
        self.particle_noise.sense_noise
    }

    /// Check every precondition of the filter before one is built.
    ///
    /// # Errors
    /// * [FilterError::InvalidConfig] for a non-positive world size, an empty or non-finite
    ///   landmark set, a non-finite motion command or a non-finite initial pose.
    /// * [FilterError::InvalidNoise] for any negative or non-finite noise, or a zero likelihood noise.
    /// * [FilterError::EmptyPopulation] if `num_particles` is zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.world_size.is_finite() && self.world_size > 0.0) {
            return Err(FilterError::InvalidConfig(format!(
                "world_size must be positive and finite, got {}",
                self.world_size
            )));
        }
        if self.landmarks.is_empty() {
            return Err(FilterError::InvalidConfig(
                "at least one landmark is required".to_string(),
            ));
        }
        if let Some(landmark) = self
            .landmarks
            .iter()
            .find(|l| !(l.x.is_finite() && l.y.is_finite()))
        {
            return Err(FilterError::InvalidConfig(format!(
                "landmark ({}, {}) is not finite",
                landmark.x, landmark.y
            )));
        }
        if !(self.turn_angle.is_finite() && self.forward_distance.is_finite()) {
            return Err(FilterError::InvalidConfig(format!(
                "motion command must be finite, got turn {} and forward {}",
                self.turn_angle, self.forward_distance
            )));
        }
        if let Some(pose) = self.initial_pose {
            if !(pose.x().is_finite() && pose.y().is_finite() && pose.heading().is_finite()) {
                return Err(FilterError::InvalidConfig(format!(
                    "initial pose {pose} is not finite"
                )));
            }
        }
        self.particle_noise.validate()?;
        self.robot_noise.validate()?;
        if self.likelihood_noise() <= 0.0 {
            return Err(FilterError::InvalidNoise {
                name: "likelihood_noise",
                value: self.likelihood_noise(),
            });
        }
        if self.num_particles == 0 {
            return Err(FilterError::EmptyPopulation);
        }
        Ok(())
    }

    /// Serialize the configuration in the given file format.
    pub fn to_string_as(&self, format: ConfigFormat) -> io::Result<String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(io::Error::other),
            ConfigFormat::Toml => toml::to_string(self).map_err(io::Error::other),
        }
    }
    /// Parse a configuration in the given file format. Missing fields take their defaults.
    pub fn from_str_as(contents: &str, format: ConfigFormat) -> io::Result<Self> {
        match format {
            ConfigFormat::Json => serde_json::from_str(contents).map_err(io::Error::other),
            ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(io::Error::other),
            ConfigFormat::Toml => toml::from_str(contents).map_err(io::Error::other),
        }
    }
    /// Write the configuration to a file, choosing the format by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let contents = self.to_string_as(ConfigFormat::from_path(path)?)?;
        fs::write(path, contents)
    }
    /// Read the configuration from a file, choosing the format by extension.
    ///
    /// The result is not validated; [crate::ParticleFilter] construction does that.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        SimulationConfig::from_str_as(&fs::read_to_string(path)?, format)
    }
}

/// File formats a [SimulationConfig] can be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}
impl ConfigFormat {
    /// Format implied by a file extension (`.json`, `.yaml`/`.yml` or `.toml`, any case).
    pub fn from_path(path: &Path) -> io::Result<ConfigFormat> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "unsupported config extension for '{}' (expected .json, .yaml, .yml or .toml)",
                    path.display()
                ),
            )),
        }
    }
}

/// Point of the filter loop at which a snapshot was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the first step
    Initial,
    /// After the robot and every particle moved and sensed
    Moved,
    /// After the population was resampled
    Resampled,
}

/// Copy of the robot and the whole population at one point of the run.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub step: usize,
    pub phase: Phase,
    pub robot: Agent,
    pub particles: Vec<Agent>,
}
impl Snapshot {
    pub fn new(step: usize, phase: Phase, robot: &Agent, particles: &[Agent]) -> Snapshot {
        Snapshot {
            step,
            phase,
            robot: robot.clone(),
            particles: particles.to_vec(),
        }
    }
    /// Mean particle-to-robot distance of this snapshot.
    pub fn mean_error(&self) -> Result<f64> {
        evaluate(&self.robot, &self.particles)
    }
}

/// Summary of one filter step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepDiagnostics {
    pub step: usize,
    /// Effective sample size of the weights before resampling
    pub effective_sample_size: f64,
    /// Largest normalized weight before resampling
    pub max_weight: f64,
    /// Pose estimate from the weighted population before resampling
    pub estimate: Pose,
    /// Mean particle-to-robot distance after the move
    pub error_after_move: f64,
    /// Mean particle-to-robot distance after resampling
    pub error_after_resample: f64,
}

/// Everything recorded during a run: an initial snapshot, then a moved and a resampled snapshot
/// plus one diagnostics entry per step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    pub snapshots: Vec<Snapshot>,
    pub diagnostics: Vec<StepDiagnostics>,
}

#[derive(Serialize)]
struct ErrorRecord {
    step: usize,
    phase: Phase,
    robot_x: f64,
    robot_y: f64,
    robot_heading: f64,
    mean_error: f64,
}

#[derive(Serialize)]
struct DiagnosticsRecord {
    step: usize,
    effective_sample_size: f64,
    max_weight: f64,
    estimate_x: f64,
    estimate_y: f64,
    estimate_heading: f64,
    error_after_move: f64,
    error_after_resample: f64,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }
    pub fn record(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
    /// Snapshots taken at the given phase, in run order.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().filter(move |s| s.phase == phase)
    }
    /// Mean particle-to-robot distance of every snapshot, in run order.
    pub fn mean_errors(&self) -> Result<Vec<f64>> {
        self.snapshots.iter().map(Snapshot::mean_error).collect()
    }
    /// Mean particle-to-robot distance of the last snapshot, if any.
    pub fn final_error(&self) -> Option<Result<f64>> {
        self.snapshots.last().map(Snapshot::mean_error)
    }

    /// Writes the error curve to a CSV file, one row per snapshot.
    ///
    /// Columns: `step, phase, robot_x, robot_y, robot_heading, mean_error`.
    pub fn errors_to_csv<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut writer = csv::Writer::from_path(path)?;
        for snapshot in &self.snapshots {
            let robot = snapshot.robot.get_current_position();
            writer.serialize(ErrorRecord {
                step: snapshot.step,
                phase: snapshot.phase,
                robot_x: robot.x(),
                robot_y: robot.y(),
                robot_heading: robot.heading(),
                mean_error: snapshot.mean_error()?,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the per-step diagnostics to a CSV file, one row per step.
    pub fn diagnostics_to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for d in &self.diagnostics {
            writer.serialize(DiagnosticsRecord {
                step: d.step,
                effective_sample_size: d.effective_sample_size,
                max_weight: d.max_weight,
                estimate_x: d.estimate.x(),
                estimate_y: d.estimate.y(),
                estimate_heading: d.estimate.heading(),
                error_after_move: d.error_after_move,
                error_after_resample: d.error_after_resample,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}
