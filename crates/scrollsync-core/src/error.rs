//! Channel tuning error types

use thiserror::Error;

/// Rejected channel tuning input
///
/// Tuning setters validate and reject; they never clamp silently.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Reliability percentage outside [0, 100]
    #[error("reliability out of range: {0} (expected 0..=100)")]
    ReliabilityOutOfRange(i64),

    /// Latency must be a non-negative number of seconds
    #[error("negative latency: {0}s")]
    NegativeLatency(f64),

    /// Latency must be a finite number of seconds
    #[error("non-finite latency: {0}")]
    NonFiniteLatency(f64),
}
