//! Resampling, population diagnostics and pose estimation for the particle population.
use crate::{Pose, wrap_to_2pi};
use crate::agent::Agent;
use crate::error::{FilterError, Result};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Normalize a non-negative weight vector so it sums to one.
///
/// # Errors
/// * [FilterError::InvalidWeight] for the first weight that is negative or not finite.
/// * [FilterError::NonPositiveWeightSum] if the weights do not sum to a positive, finite value.
pub fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>> {
    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
    {
        return Err(FilterError::InvalidWeight { index, value });
    }
    let sum: f64 = weights.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(FilterError::NonPositiveWeightSum(sum));
    }
    Ok(weights.iter().map(|w| w / sum).collect())
}

/// Lower bounds of each particle's selection interval on $[0, 1)$.
///
/// `C[0] = 0` and `C[i] = C[i - 1] + p[i - 1]`; the upper bound of the last interval is one.
pub fn cumulative_lower_bounds(probabilities: &[f64]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(probabilities.len());
    let mut current = 0.0;
    for p in probabilities {
        cumulative.push(current);
        current += p;
    }
    cumulative
}

/// Largest index `j` with `cumulative[j] <= u`, clamped to zero when round-off leaves `u` below
/// every bound.
fn select_index(cumulative: &[f64], u: f64) -> usize {
    cumulative.partition_point(|&c| c <= u).saturating_sub(1)
}

/// Draw a new population of the same size by weighted sampling with replacement.
///
/// Each draw samples $u \sim U(0, 1)$ and inverts the cumulative distribution of the normalized
/// weights. Selected particles are cloned, so two copies of the same source particle evolve
/// independently afterwards. The interval search is a binary search over the cumulative bounds.
///
/// # Arguments
/// * `particles` - The current population.
/// * `weights` - One non-negative importance weight per particle, in population order.
/// * `rng` - Random source for the uniform draws.
///
/// # Errors
/// * [FilterError::EmptyPopulation] if `particles` is empty.
/// * [FilterError::WeightCountMismatch] if the lengths differ.
/// * [FilterError::InvalidWeight] if any weight is negative or not finite.
/// * [FilterError::NonPositiveWeightSum] if the weights do not sum to a positive, finite value.
///
/// # Example
/// ```rust
/// use landmark_pf::particle::resample;
/// use landmark_pf::{Agent, NoiseParameters, Pose};
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
///
/// let particles = vec![
///     Agent::new(Pose::new(0.0, 0.0, 0.0), NoiseParameters::noiseless()).unwrap(),
///     Agent::new(Pose::new(1.0, 0.0, 0.0), NoiseParameters::noiseless()).unwrap(),
/// ];
/// let mut rng = StdRng::seed_from_u64(42);
/// let resampled = resample(&particles, &[0.0, 1.0], &mut rng).unwrap();
/// assert_eq!(resampled.len(), 2);
/// assert!(resampled.iter().all(|p| p.get_current_position().x() == 1.0));
/// ```
pub fn resample<R: Rng + ?Sized>(
    particles: &[Agent],
    weights: &[f64],
    rng: &mut R,
) -> Result<Vec<Agent>> {
    if particles.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    if weights.len() != particles.len() {
        return Err(FilterError::WeightCountMismatch {
            particles: particles.len(),
            weights: weights.len(),
        });
    }
    let probabilities = normalize_weights(weights)?;
    let cumulative = cumulative_lower_bounds(&probabilities);
    let mut resampled = Vec::with_capacity(particles.len());
    for _ in 0..particles.len() {
        let u = rng.random::<f64>();
        resampled.push(particles[select_index(&cumulative, u)].clone());
    }
    Ok(resampled)
}

/// Effective sample size $1 / \sum p_i^2$ of a weight vector.
///
/// Ranges from one (all weight on a single particle) to the population size (uniform weights).
pub fn effective_sample_size(weights: &[f64]) -> Result<f64> {
    let probabilities = normalize_weights(weights)?;
    let sum_of_squares: f64 = probabilities.iter().map(|p| p * p).sum();
    Ok(1.0 / sum_of_squares)
}

/// Mean Euclidean distance from each particle's position to the robot's position.
///
/// A read-only diagnostic of filter performance; headings are ignored.
///
/// # Errors
/// Returns [FilterError::EmptyPopulation] if there are no particles.
pub fn evaluate(robot: &Agent, particles: &[Agent]) -> Result<f64> {
    if particles.is_empty() {
        return Err(FilterError::EmptyPopulation);
    }
    let truth = robot.get_current_position();
    let total: f64 = particles
        .iter()
        .map(|p| p.get_current_position().distance_to(&truth))
        .sum();
    Ok(total / particles.len() as f64)
}

/// Strategy for collapsing the particle population into a single pose estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PoseEstimator {
    /// Importance weighted mean
    #[default]
    WeightedAverage,
    /// Plain mean, ignoring the weights
    UnweightedAverage,
    /// Pose of the single most heavily weighted particle
    HighestWeight,
}
impl PoseEstimator {
    /// Estimate the pose of the population.
    ///
    /// Positions are averaged linearly. Headings are averaged on the circle, as the angle of the
    /// (weighted) sum of unit heading vectors, so headings on either side of zero do not cancel out.
    ///
    /// # Errors
    /// * [FilterError::EmptyPopulation] if `particles` is empty.
    /// * [FilterError::WeightCountMismatch] if the lengths differ.
    /// * [FilterError::InvalidWeight] for weighted strategies if any weight is negative or not finite.
    /// * [FilterError::NonPositiveWeightSum] for weighted strategies if the weights do not sum to a
    ///   positive, finite value.
    pub fn estimate(&self, particles: &[Agent], weights: &[f64]) -> Result<Pose> {
        if particles.is_empty() {
            return Err(FilterError::EmptyPopulation);
        }
        if weights.len() != particles.len() {
            return Err(FilterError::WeightCountMismatch {
                particles: particles.len(),
                weights: weights.len(),
            });
        }
        match self {
            PoseEstimator::WeightedAverage => {
                let probabilities = normalize_weights(weights)?;
                Ok(weighted_mean_pose(particles, &probabilities))
            }
            PoseEstimator::UnweightedAverage => {
                let uniform = vec![1.0 / particles.len() as f64; particles.len()];
                Ok(weighted_mean_pose(particles, &uniform))
            }
            PoseEstimator::HighestWeight => {
                normalize_weights(weights)?;
                let (best, _) = weights
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(best, max), (i, &w)| {
                        if w > max { (i, w) } else { (best, max) }
                    });
                Ok(particles[best].get_current_position())
            }
        }
    }
}

fn weighted_mean_pose(particles: &[Agent], probabilities: &[f64]) -> Pose {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    for (particle, &p) in particles.iter().zip(probabilities.iter()) {
        let pose = particle.get_current_position();
        x += p * pose.x();
        y += p * pose.y();
        sin_sum += p * pose.heading().sin();
        cos_sum += p * pose.heading().cos();
    }
    Pose::new(x, y, wrap_to_2pi(sin_sum.atan2(cos_sum)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoiseParameters;
    use crate::measurements::WEIGHT_FLOOR;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::PI;

    /// Particles laid out along the x-axis so each one is identified by its x coordinate.
    fn line_of_particles(n: usize) -> Vec<Agent> {
        (0..n)
            .map(|i| {
                Agent::new(Pose::new(i as f64, 0.0, 0.0), NoiseParameters::noiseless()).unwrap()
            })
            .collect()
    }
    fn source_index(particle: &Agent) -> usize {
        particle.get_current_position().x().round() as usize
    }

    #[test]
    fn test_normalize_weights() {
        let p = normalize_weights(&[1.0, 3.0]).unwrap();
        assert_approx_eq!(p[0], 0.25, 1e-15);
        assert_approx_eq!(p[1], 0.75, 1e-15);
        assert_eq!(
            normalize_weights(&[0.0, 0.0]),
            Err(FilterError::NonPositiveWeightSum(0.0))
        );
        assert!(normalize_weights(&[]).is_err());
        assert_eq!(
            normalize_weights(&[1.0, f64::INFINITY]),
            Err(FilterError::InvalidWeight {
                index: 1,
                value: f64::INFINITY
            })
        );
        assert!(matches!(
            normalize_weights(&[f64::NAN, 1.0]),
            Err(FilterError::InvalidWeight { index: 0, .. })
        ));
    }
    #[test]
    fn test_negative_weights_rejected() {
        let mut rng = StdRng::seed_from_u64(6);
        let particles = line_of_particles(3);
        // the sum is positive, but a negative entry makes the cumulative bounds non-monotonic
        let weights = [-1.0, 0.5, 1.5];
        let err = FilterError::InvalidWeight {
            index: 0,
            value: -1.0,
        };
        assert_eq!(normalize_weights(&weights), Err(err.clone()));
        assert_eq!(resample(&particles, &weights, &mut rng), Err(err.clone()));
        assert_eq!(effective_sample_size(&weights), Err(err.clone()));
        assert_eq!(
            PoseEstimator::WeightedAverage.estimate(&particles, &weights),
            Err(err)
        );
        assert!(resample(&particles, &[0.0, -0.0, 1.0], &mut rng).is_ok());
    }
    #[test]
    fn test_cumulative_lower_bounds() {
        let c = cumulative_lower_bounds(&[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(c.len(), 4);
        assert_eq!(c[0], 0.0);
        assert_approx_eq!(c[1], 0.1, 1e-15);
        assert_approx_eq!(c[2], 0.3, 1e-15);
        assert_approx_eq!(c[3], 0.6, 1e-15);
    }
    #[test]
    fn test_select_index() {
        let c = [0.0, 0.25, 0.5, 0.75];
        assert_eq!(select_index(&c, 0.0), 0);
        assert_eq!(select_index(&c, 0.2499), 0);
        assert_eq!(select_index(&c, 0.25), 1);
        assert_eq!(select_index(&c, 0.6), 2);
        assert_eq!(select_index(&c, 0.9999), 3);
    }
    #[test]
    fn test_select_index_clamps_to_zero() {
        // round-off can leave the first bound above a tiny draw
        let c = [1.0e-17, 0.5];
        assert_eq!(select_index(&c, 0.0), 0);
    }
    #[test]
    fn test_select_index_skips_zero_width_intervals() {
        let c = [0.0, 0.0, 0.0, 1.0];
        assert_eq!(select_index(&c, 0.0), 2);
        assert_eq!(select_index(&c, 0.5), 2);
    }
    #[test]
    fn test_resample_preserves_population_size() {
        let mut rng = StdRng::seed_from_u64(1);
        let particles = line_of_particles(37);
        let weight_sets: Vec<Vec<f64>> = vec![
            vec![1.0; 37],
            (0..37).map(|i| i as f64 + WEIGHT_FLOOR).collect(),
            (0..37).map(|i| if i == 5 { 1.0 } else { WEIGHT_FLOOR }).collect(),
            (0..37).map(|i| (-(i as f64)).exp()).collect(),
        ];
        for weights in weight_sets {
            let resampled = resample(&particles, &weights, &mut rng).unwrap();
            assert_eq!(resampled.len(), particles.len());
        }
    }
    #[test]
    fn test_resample_single_particle() {
        let mut rng = StdRng::seed_from_u64(1);
        let particles = line_of_particles(1);
        let resampled = resample(&particles, &[WEIGHT_FLOOR], &mut rng).unwrap();
        assert_eq!(resampled, particles);
    }
    #[test]
    fn test_resample_degenerate_weights() {
        let mut rng = StdRng::seed_from_u64(2);
        let particles = line_of_particles(20);
        for weights in [
            (0..20).map(|i| if i == 13 { 1.0 } else { WEIGHT_FLOOR }).collect::<Vec<_>>(),
            (0..20).map(|i| if i == 13 { 1.0 } else { 0.0 }).collect::<Vec<_>>(),
        ] {
            let mut resampled = resample(&particles, &weights, &mut rng).unwrap();
            assert!(resampled.iter().all(|p| source_index(p) == 13));
            // copies are independent
            resampled[0].set_position(-100.0, -100.0, 0.0);
            assert_eq!(resampled[1].get_current_position().x(), 13.0);
            assert_eq!(particles[13].get_current_position().x(), 13.0);
        }
    }
    #[test]
    fn test_resample_uniform_fairness() {
        let mut rng = StdRng::seed_from_u64(3);
        let n = 5;
        let particles = line_of_particles(n);
        let weights = vec![1.0; n];
        let mut counts = vec![0usize; n];
        let rounds = 4000;
        for _ in 0..rounds {
            for particle in resample(&particles, &weights, &mut rng).unwrap() {
                counts[source_index(&particle)] += 1;
            }
        }
        let total = (rounds * n) as f64;
        for count in counts {
            assert_approx_eq!(count as f64 / total, 1.0 / n as f64, 0.015);
        }
    }
    #[test]
    fn test_resample_follows_weights() {
        let mut rng = StdRng::seed_from_u64(4);
        let particles = line_of_particles(2);
        let weights = [1.0, 3.0];
        let mut second = 0usize;
        let rounds = 10000;
        for _ in 0..rounds {
            second += resample(&particles, &weights, &mut rng)
                .unwrap()
                .iter()
                .filter(|p| source_index(p) == 1)
                .count();
        }
        assert_approx_eq!(second as f64 / (2 * rounds) as f64, 0.75, 0.01);
    }
    #[test]
    fn test_resample_errors() {
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            resample(&[], &[], &mut rng),
            Err(FilterError::EmptyPopulation)
        );
        let particles = line_of_particles(3);
        assert_eq!(
            resample(&particles, &[1.0, 1.0], &mut rng),
            Err(FilterError::WeightCountMismatch {
                particles: 3,
                weights: 2
            })
        );
        assert_eq!(
            resample(&particles, &[0.0, 0.0, 0.0], &mut rng),
            Err(FilterError::NonPositiveWeightSum(0.0))
        );
    }
    #[test]
    fn test_effective_sample_size() {
        assert_approx_eq!(effective_sample_size(&[1.0; 10]).unwrap(), 10.0, 1e-9);
        let mut weights = vec![0.0; 10];
        weights[3] = 2.0;
        assert_approx_eq!(effective_sample_size(&weights).unwrap(), 1.0, 1e-12);
        assert!(effective_sample_size(&[0.0]).is_err());
    }
    #[test]
    fn test_evaluate() {
        let robot = Agent::new(Pose::new(0.0, 0.0, 0.0), NoiseParameters::noiseless()).unwrap();
        let particles = vec![
            Agent::new(Pose::new(3.0, 4.0, 1.0), NoiseParameters::noiseless()).unwrap(),
            Agent::new(Pose::new(0.0, -1.0, 2.0), NoiseParameters::noiseless()).unwrap(),
        ];
        assert_approx_eq!(evaluate(&robot, &particles).unwrap(), 3.0, 1e-12);
        assert_eq!(evaluate(&robot, &[]), Err(FilterError::EmptyPopulation));
    }
    #[test]
    fn test_weighted_average_estimate() {
        let particles = line_of_particles(2);
        let pose = PoseEstimator::WeightedAverage
            .estimate(&particles, &[1.0, 3.0])
            .unwrap();
        assert_approx_eq!(pose.x(), 0.75, 1e-12);
        assert_approx_eq!(pose.y(), 0.0, 1e-12);
        assert_approx_eq!(pose.heading(), 0.0, 1e-12);
    }
    #[test]
    fn test_unweighted_average_ignores_weights() {
        let particles = line_of_particles(4);
        let pose = PoseEstimator::UnweightedAverage
            .estimate(&particles, &[0.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_approx_eq!(pose.x(), 1.5, 1e-12);
    }
    #[test]
    fn test_highest_weight_estimate() {
        let particles = line_of_particles(4);
        let pose = PoseEstimator::HighestWeight
            .estimate(&particles, &[0.1, 0.5, 0.2, 0.2])
            .unwrap();
        assert_eq!(pose.x(), 1.0);
    }
    #[test]
    fn test_heading_average_wraps_around_zero() {
        let particles = vec![
            Agent::new(Pose::new(0.0, 0.0, 0.1), NoiseParameters::noiseless()).unwrap(),
            Agent::new(Pose::new(0.0, 0.0, 2.0 * PI - 0.1), NoiseParameters::noiseless()).unwrap(),
        ];
        let pose = PoseEstimator::UnweightedAverage
            .estimate(&particles, &[1.0, 1.0])
            .unwrap();
        let heading = pose.heading();
        assert!(heading < 1e-9 || (2.0 * PI - heading) < 1e-9, "heading {heading}");
    }
    #[test]
    fn test_estimate_errors() {
        assert_eq!(
            PoseEstimator::WeightedAverage.estimate(&[], &[]),
            Err(FilterError::EmptyPopulation)
        );
        let particles = line_of_particles(2);
        assert!(
            PoseEstimator::HighestWeight
                .estimate(&particles, &[1.0])
                .is_err()
        );
    }
}
