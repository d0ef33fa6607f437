//! # cloudmesh
//!
//! Surface meshing for unstructured 3D point clouds.
//!
//! This is the umbrella crate that provides convenient access to all cloudmesh
//! functionality. Use the individual crates for more granular control over
//! dependencies.
//!
//! ## Features
//!
//! - **Core**: point sets, normals, triangles and meshes
//! - **Algorithms**: KD-tree neighbor search, normal estimation and orientation
//! - **Reconstruction**: filtered Delaunay meshing, the Poisson gateway and the
//!   staged pipeline
//!
//! ## Quick Start
//!
//! ```rust
//! use cloudmesh::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let points: PointSet = (0..20)
//!     .flat_map(|i| (0..20).map(move |j| Point3d::new(i as f64 * 0.1, 0.0, j as f64 * 0.1)))
//!     .collect();
//!
//! let pipeline = SurfacePipeline::new(PipelineConfig::heightfield().with_k(8));
//! let output = pipeline.run(&points, &PoissonEngine::new())?;
//! assert_eq!(output.normals.len(), points.len());
//! assert!(output.mesh.face_count() > 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms and reconstruction
//! - `algorithms`: neighbor search, normals and orientation
//! - `reconstruction`: meshing and the pipeline (implies `algorithms`)
//! - `all`: Enables all features

// Re-export core functionality
pub use cloudmesh_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use cloudmesh_algorithms as algorithms;

#[cfg(feature = "reconstruction")]
pub use cloudmesh_reconstruction as reconstruction;

/// Convenient imports for common use cases
pub mod prelude {
    pub use cloudmesh_core::*;

    #[cfg(feature = "algorithms")]
    pub use cloudmesh_algorithms::*;

    #[cfg(feature = "reconstruction")]
    pub use cloudmesh_reconstruction::*;
}
