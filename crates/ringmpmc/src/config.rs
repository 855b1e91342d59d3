/// Default slot count: 32K slots.
pub const DEFAULT_CAPACITY: usize = 32_768;

/// Configuration for [`BoundedQueue`](crate::BoundedQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of value slots. Need not be a power of two.
    pub capacity: usize,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a configuration for `capacity` slots with metrics disabled.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            enable_metrics: false,
        }
    }

    /// Enables or disables metrics collection.
    pub const fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Returns the power-of-two span used for index masking, or `None` when
    /// `capacity` is zero or too large to round up.
    #[inline]
    pub const fn ring_capacity(&self) -> Option<usize> {
        if self.capacity == 0 {
            return None;
        }
        self.capacity.checked_next_power_of_two()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Low latency configuration (4K slots, fits in L1 cache for word-sized values)
pub const LOW_LATENCY_CONFIG: Config = Config::new(4_096);

/// High throughput configuration (256K slots)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(262_144);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_capacity_rounds_up() {
        assert_eq!(Config::new(1).ring_capacity(), Some(1));
        assert_eq!(Config::new(10).ring_capacity(), Some(16));
        assert_eq!(Config::new(16).ring_capacity(), Some(16));
        assert_eq!(Config::new(17).ring_capacity(), Some(32));
    }

    #[test]
    fn test_ring_capacity_rejects_degenerate_sizes() {
        assert_eq!(Config::new(0).ring_capacity(), None);
        assert_eq!(Config::new(usize::MAX).ring_capacity(), None);
    }

    #[test]
    fn test_default_and_presets() {
        let config = Config::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert!(!config.enable_metrics);
        assert!(Config::new(8).with_metrics(true).enable_metrics);
        assert!(LOW_LATENCY_CONFIG.capacity < HIGH_THROUGHPUT_CONFIG.capacity);
    }
}
