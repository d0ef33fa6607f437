//! # cloudmesh algorithms
//!
//! Point cloud analysis stages that precede meshing: a KD-tree for k-nearest
//! neighbor queries, covariance-based normal estimation and normal orientation
//! by neighbor-graph propagation.
//!
//! Each stage is a plain function over borrowed, immutable inputs that returns
//! freshly allocated output, so independent point sets can be processed on
//! separate threads without shared state.

pub mod nearest_neighbor;
pub mod normals;
pub mod orientation;
pub mod parallel;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use normals::*;
pub use orientation::*;
pub use parallel::ParallelConfig;
