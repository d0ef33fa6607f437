//! Parallel processing utilities for per-point and per-triangle loops
//!
//! Stages only parallelise loops that read shared, immutable data and write
//! one output slot per input element. Parallelism is opted into per call
//! through [`ParallelConfig`]; there is no process-wide pool state beyond
//! rayon's own global pool.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Parallel execution settings for a single stage invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this run sequentially
    pub min_len: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_len: 256,
        }
    }
}

impl ParallelConfig {
    /// Sequential execution
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the minimum input length for parallel execution
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    fn use_parallel(&self, len: usize) -> bool {
        self.enabled && len >= self.min_len
    }
}

/// Parallel map over `0..len`, preserving order
pub fn parallel_map_range<U, F>(len: usize, config: &ParallelConfig, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    if !config.use_parallel(len) {
        return (0..len).map(f).collect();
    }

    (0..len).into_par_iter().map(f).collect()
}

/// Parallel filter-map, preserving the order of surviving elements
pub fn parallel_filter_map<T, U, F>(data: &[T], config: &ParallelConfig, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Option<U> + Sync + Send,
{
    if !config.use_parallel(data.len()) {
        return data.iter().filter_map(f).collect();
    }

    data.par_iter().filter_map(f).collect()
}
