//! # cloudmesh reconstruction
//!
//! Turns an oriented point cloud into a triangle mesh.
//!
//! Two strategies are provided: a quality-filtered 2D Delaunay mesher for
//! height-field-like surfaces, and a gateway to a volumetric Poisson engine
//! for closed surfaces. [`pipeline`] chains them after normal estimation and
//! [`worker`] runs that chain on a dedicated thread.

pub mod delaunay;
pub mod pipeline;
pub mod poisson;
pub mod worker;

// Re-export commonly used items
pub use delaunay::*;
pub use pipeline::*;
pub use poisson::*;
pub use worker::*;
