//! Landmark range measurements and the likelihood evaluator.
//!
//! A particle is scored by comparing the ranges it predicts to each landmark against the ranges
//! the robot actually observed. Each landmark contributes an independent one-dimensional Gaussian
//! density and the importance weight is their product:
//!
//! $$
//! w = \prod_i \frac{1}{\sqrt{2\pi\sigma^2}} \exp\left(-\frac{(\hat{z}_i - z_i)^2}{2\sigma^2}\right) + w_{floor}
//! $$
//!
//! The floor keeps every weight strictly positive when all densities underflow, so normalizing a
//! weight vector never divides by zero.

use crate::error::{FilterError, Result};

use nalgebra::DVector;
use std::f64::consts::PI;
use std::fmt::{self, Display};

/// Added to every importance weight to avoid round-off to zero.
pub const WEIGHT_FLOOR: f64 = 1.0e-300;

/// Probability density of `x` under a one dimensional Gaussian with mean `mu` and standard
/// deviation `sigma`.
///
/// # Example
/// ```rust
/// use landmark_pf::measurements::gaussian_probability;
///
/// let peak = gaussian_probability(0.0, 1.0, 0.0);
/// assert!((peak - 0.3989422804014327).abs() < 1e-12);
/// ```
pub fn gaussian_probability(mu: f64, sigma: f64, x: f64) -> f64 {
    let variance = sigma * sigma;
    (-(mu - x).powi(2) / variance / 2.0).exp() / (2.0 * PI * variance).sqrt()
}

/// Importance weight of a particle given its predicted ranges and the observed ranges.
///
/// # Arguments
/// * `predicted` - Ranges predicted by the particle, one per landmark.
/// * `observed` - Ranges sensed by the robot, in the same landmark order.
/// * `noise` - Standard deviation of the range sensor.
///
/// # Returns
/// * The product of the per-landmark densities plus [WEIGHT_FLOOR], always `>= WEIGHT_FLOOR`.
///
/// # Errors
/// * [FilterError::MeasurementLengthMismatch] if the two vectors differ in length.
/// * [FilterError::InvalidNoise] if `noise` is not strictly positive and finite.
pub fn importance_weight(predicted: &[f64], observed: &[f64], noise: f64) -> Result<f64> {
    if predicted.len() != observed.len() {
        return Err(FilterError::MeasurementLengthMismatch {
            predicted: predicted.len(),
            observed: observed.len(),
        });
    }
    if !(noise.is_finite() && noise > 0.0) {
        return Err(FilterError::InvalidNoise {
            name: "likelihood_noise",
            value: noise,
        });
    }
    let likelihood: f64 = predicted
        .iter()
        .zip(observed.iter())
        .map(|(&mu, &x)| gaussian_probability(mu, noise, x))
        .product();
    Ok(likelihood + WEIGHT_FLOOR)
}

/// Ranges observed by the robot in one step, together with the sensor noise used to score them.
#[derive(Clone, Debug)]
pub struct RangeMeasurement {
    pub ranges: DVector<f64>,
    pub noise_std: f64,
}
impl Display for RangeMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RangeMeasurement(ranges: {:.3?}, noise: {})",
            self.ranges.as_slice(),
            self.noise_std
        )
    }
}
impl RangeMeasurement {
    pub fn new(ranges: DVector<f64>, noise_std: f64) -> RangeMeasurement {
        RangeMeasurement { ranges, noise_std }
    }
    /// Get the dimension of the measurement vector (one entry per landmark)
    pub fn get_dimension(&self) -> usize {
        self.ranges.len()
    }
    /// Get the measurement in a vector format
    pub fn get_vector(&self) -> &DVector<f64> {
        &self.ranges
    }
    /// Importance weight of a particle that predicts `expected` for this measurement.
    pub fn likelihood(&self, expected: &DVector<f64>) -> Result<f64> {
        importance_weight(expected.as_slice(), self.ranges.as_slice(), self.noise_std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_gaussian_probability() {
        assert_approx_eq!(gaussian_probability(0.0, 1.0, 0.0), 0.3989422804014327, 1e-15);
        assert_approx_eq!(gaussian_probability(2.0, 1.0, 3.0), 0.24197072451914337, 1e-15);
        assert_approx_eq!(
            gaussian_probability(3.0, 1.0, 2.0),
            gaussian_probability(2.0, 1.0, 3.0),
            1e-15
        );
        assert_approx_eq!(gaussian_probability(10.0, 5.0, 10.0), 0.07978845608028654, 1e-15);
    }
    #[test]
    fn test_weight_is_product_of_densities() {
        let predicted = [10.0, 20.0];
        let observed = [11.0, 18.0];
        let expected =
            gaussian_probability(10.0, 2.0, 11.0) * gaussian_probability(20.0, 2.0, 18.0);
        let w = importance_weight(&predicted, &observed, 2.0).unwrap();
        assert_approx_eq!(w, expected + WEIGHT_FLOOR, 1e-18);
    }
    #[test]
    fn test_weight_floor_on_underflow() {
        let predicted = [0.0, 0.0, 0.0, 0.0];
        let observed = [1.0e6, 1.0e6, 1.0e6, 1.0e6];
        let w = importance_weight(&predicted, &observed, 1.0).unwrap();
        assert_eq!(w, WEIGHT_FLOOR);
    }
    #[test]
    fn test_weight_positivity() {
        let observed = [14.1, 67.3, 62.9, 91.5];
        for offset in [0.0, 0.5, 3.0, 40.0, 1.0e3, 1.0e150] {
            let predicted: Vec<f64> = observed.iter().map(|z| z + offset).collect();
            for noise in [1.0e-3, 0.1, 5.0, 1.0e3] {
                let w = importance_weight(&predicted, &observed, noise).unwrap();
                assert!(w >= WEIGHT_FLOOR, "weight {w} below floor");
            }
        }
    }
    #[test]
    fn test_weight_monotonic_in_distance() {
        let observed = [30.0, 50.0, 60.0, 75.0];
        let direction = [0.5, -0.5, 0.5, -0.5];
        let mut previous = f64::INFINITY;
        for step in 0..40 {
            let scale = step as f64 * 0.5;
            let predicted: Vec<f64> = observed
                .iter()
                .zip(direction.iter())
                .map(|(z, d)| z + scale * d)
                .collect();
            let w = importance_weight(&predicted, &observed, 5.0).unwrap();
            assert!(w <= previous, "weight increased as distance grew");
            previous = w;
        }
    }
    #[test]
    fn test_weight_length_mismatch() {
        assert_eq!(
            importance_weight(&[1.0, 2.0], &[1.0], 1.0),
            Err(FilterError::MeasurementLengthMismatch {
                predicted: 2,
                observed: 1
            })
        );
    }
    #[test]
    fn test_weight_rejects_non_positive_noise() {
        assert!(importance_weight(&[1.0], &[1.0], 0.0).is_err());
        assert!(importance_weight(&[1.0], &[1.0], -1.0).is_err());
        assert!(importance_weight(&[1.0], &[1.0], f64::NAN).is_err());
    }
    #[test]
    fn test_range_measurement_likelihood() {
        let measurement = RangeMeasurement::new(DVector::from_vec(vec![5.0, 7.0]), 1.0);
        assert_eq!(measurement.get_dimension(), 2);
        let close = measurement
            .likelihood(&DVector::from_vec(vec![5.0, 7.0]))
            .unwrap();
        let far = measurement
            .likelihood(&DVector::from_vec(vec![9.0, 2.0]))
            .unwrap();
        assert!(close > far);
        assert!(
            measurement
                .likelihood(&DVector::from_vec(vec![5.0]))
                .is_err()
        );
    }
}
