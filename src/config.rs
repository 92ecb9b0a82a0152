use std::thread;

use crate::error::ContractionError;

/// Fraction of the shared core that every profile pass contracts before the
/// per-filter passes take over. Not contracting all contractable nodes avoids
/// a very dense core; the graph gets slightly larger but contraction is
/// faster and the final hierarchy better.
pub const BASE_CORE: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct ContractorConfig {
    /// Fraction of nodes to contract per pass. 1.0 contracts everything,
    /// 0.0 contracts nothing.
    pub core_factor: f32,
    /// Reuse a level file from an earlier run instead of computing node
    /// priorities from scratch.
    pub use_cached_priority: bool,
    /// Worker pool size for the parallel simulation phase.
    pub threads: usize,
}

impl Default for ContractorConfig {
    fn default() -> Self {
        ContractorConfig {
            core_factor: 1.0,
            use_cached_priority: false,
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl ContractorConfig {
    pub fn validate(&self) -> Result<(), ContractionError> {
        if !self.core_factor.is_finite() || !(0.0..=1.0).contains(&self.core_factor) {
            return Err(ContractionError::InvalidCoreFactor(self.core_factor));
        }

        if self.threads == 0 {
            return Err(ContractionError::InvalidThreadCount(self.threads));
        }

        Ok(())
    }
}
