//! Construction-time settings for `BucketHashMap`.

use crate::error::ConfigError;

/// Bucket count of a freshly built (or cleared) map.
pub const INITIAL_CAPACITY: usize = 16;

/// Ratio of entries to buckets at which `put` grows the table first.
pub const LOAD_FACTOR: f64 = 0.75;

/// Smallest accepted load factor. Below it a single insert could keep
/// demanding a larger table; at 0.1 the table stays within ~20 buckets
/// per entry.
pub const MIN_LOAD_FACTOR: f64 = 0.1;

/// Sizing policy of a map. Defaults match `INITIAL_CAPACITY` and
/// `LOAD_FACTOR`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapConfig {
    /// Bucket count at construction and after `clear`.
    pub initial_capacity: usize,
    /// Growth threshold; `put` doubles the table once
    /// `len >= capacity * load_factor`.
    pub load_factor: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: INITIAL_CAPACITY,
            load_factor: LOAD_FACTOR,
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.load_factor.is_finite() || self.load_factor < MIN_LOAD_FACTOR {
            return Err(ConfigError::InvalidLoadFactor(self.load_factor));
        }
        Ok(())
    }

    /// Whether a table of `capacity` buckets holding `len` entries must grow
    /// before accepting another insert.
    pub(crate) fn needs_growth(&self, len: usize, capacity: usize) -> bool {
        len as f64 >= capacity as f64 * self.load_factor
    }
}
