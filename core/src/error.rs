//! Error types for the localization filter.
//!
//! Every variant is a precondition violation caught at the boundary of the core operations.
//! None of them are recoverable by retrying; the caller has to fix the inputs or configuration.
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FilterError {
    /// A noise standard deviation was negative or not finite.
    #[error("invalid noise parameter `{name}`: {value} (must be finite and non-negative)")]
    InvalidNoise { name: &'static str, value: f64 },
    /// Predicted and observed measurement vectors have different lengths.
    #[error("measurement length mismatch: predicted {predicted}, observed {observed}")]
    MeasurementLengthMismatch { predicted: usize, observed: usize },
    /// An operation that needs at least one particle was given none.
    #[error("particle population is empty")]
    EmptyPopulation,
    /// The importance weights do not sum to a positive, finite value.
    #[error("importance weights sum to {0}, expected a positive finite value")]
    NonPositiveWeightSum(f64),
    /// A single importance weight was negative or not finite.
    #[error("invalid importance weight {value} at index {index} (must be finite and non-negative)")]
    InvalidWeight { index: usize, value: f64 },
    /// The weight vector does not line up with the particle population.
    #[error("weight count mismatch: {particles} particles but {weights} weights")]
    WeightCountMismatch { particles: usize, weights: usize },
    /// The simulation configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FilterError>;
