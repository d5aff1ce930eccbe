//! Errors surfaced while building a map.
//!
//! Map operations themselves never fail: absent keys are reported through
//! `Option`/`bool` returns. Only a rejected `MapConfig` produces an error.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// The bucket table needs at least one slot for the position function.
    #[error("initial capacity must be at least 1")]
    ZeroCapacity,

    /// Load factor must be finite and at least `MIN_LOAD_FACTOR`.
    #[error("invalid load factor: {0} (expected a finite value >= 0.1)")]
    InvalidLoadFactor(f64),
}
