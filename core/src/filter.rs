//! Particle filter localization driver
//!
//! This module contains the [ParticleFilter], which owns the ground-truth robot, the particle
//! population and the random source, and runs the filter loop. Each step:
//!
//! 1. The robot executes the commanded move and senses the landmarks with noise, producing the
//!    observed range vector.
//! 2. Every particle executes the same move with its own noise and senses the landmarks without
//!    noise, producing its predicted range vector.
//! 3. Every particle is scored against the observed ranges by the likelihood evaluator.
//! 4. The population is resampled in proportion to the scores.
//!
//! A snapshot of the robot and the population is recorded after step 2 and after step 4, so the
//! run can be evaluated offline. The particles do not interact until resampling, which only
//! starts once every particle has been weighted.
use crate::Pose;
use crate::agent::Agent;
use crate::error::{FilterError, Result};
use crate::measurements::RangeMeasurement;
use crate::particle::{effective_sample_size, evaluate, normalize_weights, resample};
use crate::sim::{History, Phase, SimulationConfig, Snapshot, StepDiagnostics};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::{self, Debug};

/// Effective sample size, as a fraction of the population, below which a step is logged as degenerate.
const DEGENERACY_WARNING_FRACTION: f64 = 0.1;

/// Sequential Monte Carlo localization against a fixed landmark set.
///
/// The random source is a type parameter so tests and callers can inject their own. The default
/// is a [StdRng] seeded from [SimulationConfig::seed], which makes runs with the same
/// configuration reproducible.
pub struct ParticleFilter<R: Rng = StdRng> {
    config: SimulationConfig,
    robot: Agent,
    particles: Vec<Agent>,
    weights: Vec<f64>,
    rng: R,
    steps_taken: usize,
}
impl<R: Rng> Debug for ParticleFilter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("steps_taken", &self.steps_taken)
            .field("robot", &format_args!("{}", self.robot.get_current_position()))
            .field("mean_error", &self.evaluate().ok())
            .finish()
    }
}
impl ParticleFilter<StdRng> {
    /// Build a filter whose random source is seeded from `config.seed`.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        ParticleFilter::with_rng(config, rng)
    }
}
impl<R: Rng> ParticleFilter<R> {
    /// Build a filter with an injected random source.
    ///
    /// The robot starts at `config.initial_pose`, or at a uniformly drawn pose if there is none.
    /// The particles start at uniformly drawn poses over the world extent, all with equal weight.
    ///
    /// # Errors
    /// Returns whatever [SimulationConfig::validate] rejects.
    pub fn with_rng(config: SimulationConfig, mut rng: R) -> Result<Self> {
        config.validate()?;
        let robot = match config.initial_pose {
            Some(pose) => Agent::new(pose, config.robot_noise)?,
            None => Agent::random(config.world_size, config.robot_noise, &mut rng)?,
        };
        let particles = (0..config.num_particles)
            .map(|_| Agent::random(config.world_size, config.particle_noise, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(ParticleFilter::assemble(config, robot, particles, rng))
    }
    /// Build a filter around an explicit robot and population.
    ///
    /// `config.num_particles` is overwritten with the population size; `initial_pose` and
    /// `world_size` are not used to place anything.
    ///
    /// # Errors
    /// * [FilterError::EmptyPopulation] if `particles` is empty.
    /// * Whatever else [SimulationConfig::validate] rejects.
    pub fn from_population(
        mut config: SimulationConfig,
        robot: Agent,
        particles: Vec<Agent>,
        rng: R,
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(FilterError::EmptyPopulation);
        }
        config.num_particles = particles.len();
        config.validate()?;
        Ok(ParticleFilter::assemble(config, robot, particles, rng))
    }
    fn assemble(config: SimulationConfig, robot: Agent, particles: Vec<Agent>, rng: R) -> Self {
        let weights = vec![1.0; particles.len()];
        ParticleFilter {
            config,
            robot,
            particles,
            weights,
            rng,
            steps_taken: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
    pub fn robot(&self) -> &Agent {
        &self.robot
    }
    pub fn particles(&self) -> &[Agent] {
        &self.particles
    }
    /// Importance weights from the last prediction; all ones after construction or resampling.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Move the robot and every particle, sense, and weight each particle.
    ///
    /// Returns the observed measurement. The new weights are available from [Self::weights].
    pub fn predict_and_weight(&mut self) -> Result<RangeMeasurement> {
        let turn = self.config.turn_angle;
        let distance = self.config.forward_distance;
        let landmarks = &self.config.landmarks;

        self.robot.move_by(turn, distance, &mut self.rng);
        let observed = RangeMeasurement::new(
            self.robot.sense(landmarks, true, &mut self.rng),
            self.config.likelihood_noise(),
        );

        let mut weights = Vec::with_capacity(self.particles.len());
        for particle in self.particles.iter_mut() {
            particle.move_by(turn, distance, &mut self.rng);
            let predicted = particle.sense(landmarks, false, &mut self.rng);
            weights.push(observed.likelihood(&predicted)?);
        }
        self.weights = weights;
        Ok(observed)
    }

    /// Replace the population by resampling it in proportion to the current weights.
    pub fn resample(&mut self) -> Result<()> {
        self.particles = resample(&self.particles, &self.weights, &mut self.rng)?;
        self.weights = vec![1.0; self.particles.len()];
        Ok(())
    }

    /// Pose estimate of the population under the configured [crate::particle::PoseEstimator].
    pub fn get_estimate(&self) -> Result<Pose> {
        self.config.estimator.estimate(&self.particles, &self.weights)
    }

    /// Mean particle-to-robot distance of the current population.
    pub fn evaluate(&self) -> Result<f64> {
        evaluate(&self.robot, &self.particles)
    }

    /// Run one full filter step, recording the moved and resampled snapshots in `history`.
    pub fn step(&mut self, history: &mut History) -> Result<StepDiagnostics> {
        self.predict_and_weight()?;
        self.steps_taken += 1;
        let step = self.steps_taken;

        let probabilities = normalize_weights(&self.weights)?;
        let max_weight = probabilities.iter().cloned().fold(0.0, f64::max);
        let ess = effective_sample_size(&self.weights)?;
        let estimate = self.get_estimate()?;
        let error_after_move = self.evaluate()?;
        history.record(Snapshot::new(step, Phase::Moved, &self.robot, &self.particles));

        if ess < DEGENERACY_WARNING_FRACTION * self.particles.len() as f64 {
            warn!(
                "Step {}: effective sample size {:.1} of {} particles",
                step,
                ess,
                self.particles.len()
            );
        }

        self.resample()?;
        let error_after_resample = self.evaluate()?;
        history.record(Snapshot::new(
            step,
            Phase::Resampled,
            &self.robot,
            &self.particles,
        ));

        debug!(
            "Step {}: robot {}, estimate {}, ess {:.1}, error {:.3} -> {:.3}",
            step,
            self.robot.get_current_position(),
            estimate,
            ess,
            error_after_move,
            error_after_resample
        );
        let diagnostics = StepDiagnostics {
            step,
            effective_sample_size: ess,
            max_weight,
            estimate,
            error_after_move,
            error_after_resample,
        };
        history.diagnostics.push(diagnostics.clone());
        Ok(diagnostics)
    }

    /// Run `config.num_steps` steps and return the full history, starting with the initial state.
    pub fn run(&mut self) -> Result<History> {
        info!(
            "Running particle filter: {} particles, {} landmarks, {} steps",
            self.particles.len(),
            self.config.landmarks.len(),
            self.config.num_steps
        );
        let mut history = History::new();
        history.record(Snapshot::new(
            self.steps_taken,
            Phase::Initial,
            &self.robot,
            &self.particles,
        ));
        for _ in 0..self.config.num_steps {
            self.step(&mut history)?;
        }
        info!(
            "Particle filter finished after {} steps, mean error {:.3}",
            self.steps_taken,
            self.evaluate()?
        );
        Ok(history)
    }
}
