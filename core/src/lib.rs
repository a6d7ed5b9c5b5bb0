//! Landmark particle filter toolbox
//!
//! This crate implements Sequential Monte Carlo (particle filter) localization for a robot moving on
//! a bounded plane. The robot senses ranges to a fixed, known set of landmarks and a population of
//! weighted hypotheses ("particles") tracks its unknown pose by alternating a noisy motion model
//! prediction with importance weighted resampling. It is a simulation: the ground-truth robot is
//! itself an [agent::Agent] driven through the same motion model as the particles, so the filter can
//! be evaluated against the true pose at every step.
//!
//! This crate is primarily built off of two crate dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the vector types for positions and measurements.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for the motion model, sensor noise and resampling.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [agent]: The robot/particle entity: noise parameters, the motion model and range sensing.
//! - [measurements]: The likelihood evaluator that scores predicted ranges against observed ranges.
//! - [particle]: Resampling, population diagnostics, pose estimation and the [particle::evaluate] metric.
//! - [filter]: The [filter::ParticleFilter] driver that runs the predict/weight/resample loop.
//! - [sim]: Simulation configuration, run history and CSV reports.
//! - [error]: The [error::FilterError] type returned by every fallible operation.
//!
//! ## State definition
//!
//! The state of every agent is the planar pose
//!
//! $$
//! x = [p_x, p_y, \psi]
//! $$
//!
//! where $p_x$ and $p_y$ are world coordinates and $\psi$ is the heading in radians, measured
//! counter-clockwise from the x-axis. The heading is always stored wrapped to $[0, 2\pi)$. The world
//! extent is only used to scatter the initial particles; positions are never clamped to it.
//!
//! ## Motion model
//!
//! Each step an agent first turns and then drives forward:
//!
//! $$
//! \psi(+) = \psi(-) + \Delta\psi + \epsilon_t, \quad \epsilon_t \sim N(0, \sigma_t^2)
//! $$
//! $$
//! d = \Delta d + \epsilon_f, \quad \epsilon_f \sim N(0, \sigma_f^2)
//! $$
//! $$
//! p(+) = p(-) + d \begin{bmatrix} \cos\psi(+) \\\\ \sin\psi(+) \end{bmatrix}
//! $$
//!
//! ## Measurement model
//!
//! An agent senses the Euclidean range to each landmark in order, optionally perturbed by
//! independent $N(0, \sigma_s^2)$ noise. A particle's importance weight is the product of the
//! one-dimensional Gaussian densities of the observed ranges about the particle's predicted ranges.

pub mod agent;
pub mod error;
pub mod filter;
pub mod measurements;
pub mod particle;
pub mod sim;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt::{self, Display};

pub use agent::{Agent, NoiseParameters};
pub use error::{FilterError, Result};
pub use filter::ParticleFilter;

/// Planar pose of an agent: world position plus heading.
///
/// The heading is normalized to $[0, 2\pi)$ on construction and after every mutation, so a `Pose`
/// can never hold an unwrapped heading. Serialized as `[x, y, heading]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Pose {
    x: f64,
    y: f64,
    heading: f64,
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.2}°)",
            self.x,
            self.y,
            self.heading.to_degrees()
        )
    }
}
impl Pose {
    /// Create a new pose, wrapping the heading to $[0, 2\pi)$.
    ///
    /// # Example
    /// ```rust
    /// use landmark_pf::Pose;
    /// use std::f64::consts::PI;
    ///
    /// let pose = Pose::new(1.0, 2.0, -PI / 2.0);
    /// assert_eq!(pose.x(), 1.0);
    /// assert!((pose.heading() - 3.0 * PI / 2.0).abs() < 1e-12);
    /// ```
    pub fn new(x: f64, y: f64, heading: f64) -> Pose {
        Pose {
            x,
            y,
            heading: wrap_to_2pi(heading),
        }
    }
    pub fn x(&self) -> f64 {
        self.x
    }
    pub fn y(&self) -> f64 {
        self.y
    }
    pub fn heading(&self) -> f64 {
        self.heading
    }
    /// World position as an nalgebra vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
    /// Euclidean distance between the positions of two poses; headings are ignored.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        distance(&self.position(), &other.position())
    }
    /// Rotate by `angle` radians, keeping the heading wrapped.
    pub fn rotate(&mut self, angle: f64) {
        self.heading = wrap_to_2pi(self.heading + angle);
    }
    /// Translate `distance` units along the current heading.
    pub fn advance(&mut self, distance: f64) {
        self.x += distance * self.heading.cos();
        self.y += distance * self.heading.sin();
    }
}
impl From<[f64; 3]> for Pose {
    fn from(values: [f64; 3]) -> Self {
        Pose::new(values[0], values[1], values[2])
    }
}
impl From<Pose> for [f64; 3] {
    fn from(pose: Pose) -> Self {
        [pose.x, pose.y, pose.heading]
    }
}

/// Fixed, known beacon position in world coordinates.
///
/// Landmarks are shared read-only by the robot and every particle, and the order of a landmark set
/// fixes the order of every measurement vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(x: f64, y: f64) -> Landmark {
        Landmark { x, y }
    }
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

/// Euclidean distance between two points.
pub fn distance(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    (a - b).norm()
}

/// Wrap an angle to the half-open range $[0, 2\pi)$ radians
///
/// Unlike a plain `rem_euclid`, this never returns exactly $2\pi$: tiny negative inputs whose
/// remainder rounds up to $2\pi$ are mapped to zero.
///
/// # Arguments
/// * `angle` - The angle to be wrapped, in radians.
/// # Returns
/// * The wrapped angle, in the range $[0, 2\pi)$.
/// # Example
/// ```rust
/// use landmark_pf::wrap_to_2pi;
/// use std::f64::consts::PI;
/// let angle = 5.0 * PI; // radians
/// let wrapped_angle = wrap_to_2pi(angle);
/// assert!((wrapped_angle - PI).abs() < 1e-12); // 5π radians wrapped to π radians
/// ```
pub fn wrap_to_2pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}
