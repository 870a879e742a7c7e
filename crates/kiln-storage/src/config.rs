//! Store configuration parameters.

use crate::error::StorageError;

/// Configuration for a [`StatefulPropertyStore`](crate::StatefulPropertyStore)
/// and the element loops that drive it.
///
/// All values are hints or limits fixed at construction.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Expected number of elements per table, used to pre-size the maps.
    ///
    /// Default: 0 (grow on demand).
    pub element_capacity: usize,

    /// Initial quadrature-point count of scratch buffers.
    ///
    /// Default: 8. Must not exceed [`StoreConfig::MAX_QPOINTS`].
    pub scratch_qpoints: usize,

    /// Number of element-loop worker threads. `None` = auto-detect
    /// (`available_parallelism`, clamped to `[1, 64]`).
    pub worker_count: Option<usize>,
}

impl StoreConfig {
    /// Default initial scratch size.
    pub const DEFAULT_SCRATCH_QPOINTS: usize = 8;

    /// Largest quadrature-point count a container may hold. Checkpoints
    /// record point counts as `u32`.
    pub const MAX_QPOINTS: usize = u32::MAX as usize;

    /// Upper bound on explicit worker counts.
    pub const MAX_WORKERS: usize = 64;

    /// Create a config sized for roughly `element_capacity` elements.
    pub fn new(element_capacity: usize) -> Self {
        Self {
            element_capacity,
            scratch_qpoints: Self::DEFAULT_SCRATCH_QPOINTS,
            worker_count: None,
        }
    }

    /// Check the limits documented on each field.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.scratch_qpoints > Self::MAX_QPOINTS {
            return Err(StorageError::InvalidConfig {
                reason: format!(
                    "scratch_qpoints must be <= {} (got {})",
                    Self::MAX_QPOINTS,
                    self.scratch_qpoints
                ),
            });
        }
        if self.worker_count == Some(0) {
            return Err(StorageError::InvalidConfig {
                reason: "worker_count must be at least 1 when set".into(),
            });
        }
        Ok(())
    }

    /// Resolve the worker count, applying auto-detection if `None`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, Self::MAX_WORKERS),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .clamp(1, Self::MAX_WORKERS),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
        assert_eq!(StoreConfig::default().scratch_qpoints, 8);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = StoreConfig {
            worker_count: Some(0),
            ..StoreConfig::new(10)
        };
        assert!(matches!(
            config.validate(),
            Err(StorageError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn worker_count_clamped() {
        let config = StoreConfig {
            worker_count: Some(500),
            ..StoreConfig::default()
        };
        assert_eq!(config.resolved_worker_count(), 64);
        assert!(StoreConfig::default().resolved_worker_count() >= 1);
    }
}
