//! Robot and particle agents.
//!
//! The ground-truth robot and every particle in the filter are the same kind of entity: a planar
//! [Pose] plus a triple of noise standard deviations. Only the noise values and the role the agent
//! plays in the filter differ. The robot's noise makes the simulated truth and its sensor readings
//! realistic; a particle's noise spreads the population during prediction.
use crate::{Landmark, Pose, distance};
use crate::error::{FilterError, Result};

use nalgebra::DVector;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt::{self, Display};

/// Standard deviations of the three noise sources of an agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseParameters {
    /// Noise on the distance driven by [Agent::forward]
    pub forward_noise: f64,
    /// Noise on the angle turned by [Agent::turn], in radians
    pub turn_noise: f64,
    /// Noise on each range returned by [Agent::sense]
    pub sense_noise: f64,
}
impl NoiseParameters {
    /// Create a validated noise triple.
    ///
    /// # Example
    /// ```rust
    /// use landmark_pf::NoiseParameters;
    ///
    /// assert!(NoiseParameters::new(0.05, 0.05, 5.0).is_ok());
    /// assert!(NoiseParameters::new(-0.05, 0.05, 5.0).is_err());
    /// ```
    pub fn new(forward_noise: f64, turn_noise: f64, sense_noise: f64) -> Result<NoiseParameters> {
        let noise = NoiseParameters {
            forward_noise,
            turn_noise,
            sense_noise,
        };
        noise.validate()?;
        Ok(noise)
    }
    /// All three sources switched off; the agent moves and senses deterministically.
    pub fn noiseless() -> NoiseParameters {
        NoiseParameters::default()
    }
    /// Check that every standard deviation is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        check_std_dev("forward_noise", self.forward_noise)?;
        check_std_dev("turn_noise", self.turn_noise)?;
        check_std_dev("sense_noise", self.sense_noise)?;
        Ok(())
    }
}

fn check_std_dev(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidNoise { name, value })
    }
}

/// Draw a sample from $N(0, \sigma^2)$. A zero standard deviation yields exactly zero.
pub(crate) fn gaussian_noise<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    std_dev * z
}

/// A robot or particle: a pose that moves through the noisy motion model and senses landmark ranges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Agent {
    pose: Pose,
    noise: NoiseParameters,
}
impl Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} noise (forward {}, turn {}, sense {})",
            self.pose, self.noise.forward_noise, self.noise.turn_noise, self.noise.sense_noise
        )
    }
}
impl Agent {
    /// Create a new agent at `pose` with the given noise.
    ///
    /// # Errors
    /// Returns [FilterError::InvalidNoise] if any noise standard deviation is negative or not finite.
    ///
    /// # Example
    /// ```rust
    /// use landmark_pf::{Agent, NoiseParameters, Pose};
    /// use std::f64::consts::PI;
    ///
    /// let start = Pose::new(50.0, 50.0, PI / 2.0);
    /// let robot = Agent::new(start, NoiseParameters::noiseless()).unwrap();
    /// assert_eq!(robot.get_current_position().x(), 50.0);
    /// ```
    pub fn new(pose: Pose, noise: NoiseParameters) -> Result<Agent> {
        noise.validate()?;
        Ok(Agent { pose, noise })
    }
    /// Create an agent at a pose drawn uniformly over a `world_size` x `world_size` square with a
    /// uniformly random heading.
    pub fn random<R: Rng + ?Sized>(
        world_size: f64,
        noise: NoiseParameters,
        rng: &mut R,
    ) -> Result<Agent> {
        let x = rng.random::<f64>() * world_size;
        let y = rng.random::<f64>() * world_size;
        let heading = rng.random::<f64>() * TAU;
        Agent::new(Pose::new(x, y, heading), noise)
    }
    /// Overwrite the pose. The heading is wrapped to $[0, 2\pi)$.
    pub fn set_position(&mut self, x: f64, y: f64, heading: f64) {
        self.pose = Pose::new(x, y, heading);
    }
    /// Overwrite the three noise standard deviations.
    ///
    /// # Errors
    /// Returns [FilterError::InvalidNoise] and leaves the agent unchanged if any value is negative
    /// or not finite.
    pub fn set_noise(
        &mut self,
        forward_noise: f64,
        turn_noise: f64,
        sense_noise: f64,
    ) -> Result<()> {
        self.noise = NoiseParameters::new(forward_noise, turn_noise, sense_noise)?;
        Ok(())
    }
    pub fn noise(&self) -> &NoiseParameters {
        &self.noise
    }
    /// Snapshot of the current pose.
    pub fn get_current_position(&self) -> Pose {
        self.pose
    }
    /// Turn by `angle` plus $N(0, \sigma_t^2)$ noise.
    pub fn turn<R: Rng + ?Sized>(&mut self, angle: f64, rng: &mut R) {
        let noisy_angle = angle + gaussian_noise(rng, self.noise.turn_noise);
        self.pose.rotate(noisy_angle);
    }
    /// Drive `distance` plus $N(0, \sigma_f^2)$ noise along the current heading.
    pub fn forward<R: Rng + ?Sized>(&mut self, distance: f64, rng: &mut R) {
        let noisy_distance = distance + gaussian_noise(rng, self.noise.forward_noise);
        self.pose.advance(noisy_distance);
    }
    /// One motion model step: turn first, then drive along the new heading.
    pub fn move_by<R: Rng + ?Sized>(&mut self, angle: f64, distance: f64, rng: &mut R) {
        self.turn(angle, rng);
        self.forward(distance, rng);
    }
    /// Exact ranges from the current position to each landmark, in landmark order.
    pub fn ranges(&self, landmarks: &[Landmark]) -> DVector<f64> {
        let position = self.pose.position();
        DVector::from_iterator(
            landmarks.len(),
            landmarks
                .iter()
                .map(|landmark| distance(&position, &landmark.position())),
        )
    }
    /// Sense the range to each landmark, in landmark order.
    ///
    /// With `with_noise` set, every range is perturbed by an independent $N(0, \sigma_s^2)$ sample.
    /// Without it the exact ranges are returned and `rng` is not touched.
    pub fn sense<R: Rng + ?Sized>(
        &self,
        landmarks: &[Landmark],
        with_noise: bool,
        rng: &mut R,
    ) -> DVector<f64> {
        let mut measurements = self.ranges(landmarks);
        if with_noise {
            for range in measurements.iter_mut() {
                *range += gaussian_noise(rng, self.noise.sense_noise);
            }
        }
        measurements
    }
}
