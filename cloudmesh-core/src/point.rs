//! Point and normal types

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// A single sample of a point set, materialised from its parallel arrays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Stable index of the point within its [`PointSet`](crate::PointSet)
    pub id: usize,
    pub position: Point3d,
    pub color: Option<[u8; 3]>,
}

impl Point {
    pub fn new(id: usize, position: Point3d) -> Self {
        Self {
            id,
            position,
            color: None,
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = Some(color);
        self
    }
}

/// Surface normal of one point.
///
/// Estimation produces an undirected axis (`oriented == false`); orientation
/// may only negate the direction, never change the axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normal {
    pub point_id: usize,
    /// Unit vector
    pub direction: Vector3d,
    pub oriented: bool,
}

impl Normal {
    /// Create an unoriented normal
    pub fn new(point_id: usize, direction: Vector3d) -> Self {
        Self {
            point_id,
            direction,
            oriented: false,
        }
    }

    /// The same axis pointing the other way
    pub fn flipped(self) -> Self {
        Self {
            direction: -self.direction,
            ..self
        }
    }

    /// Mark the sign of this normal as resolved
    pub fn into_oriented(self) -> Self {
        Self {
            oriented: true,
            ..self
        }
    }

    pub fn dot(&self, other: &Normal) -> f64 {
        self.direction.dot(&other.direction)
    }
}
