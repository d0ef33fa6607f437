//! Core data structures and traits for cloudmesh
//!
//! This crate provides the fundamental types shared by every pipeline stage:
//! immutable point sets, normals, neighbor query results, triangles and
//! meshes, along with the nearest neighbor search trait and the error type.

pub mod point;
pub mod point_cloud;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point2, Point3, Vector3};
