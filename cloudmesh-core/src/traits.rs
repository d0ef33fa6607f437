//! Core traits for cloudmesh

use crate::error::Result;
use crate::point::Point3d;
use serde::{Deserialize, Serialize};

/// One entry of a nearest neighbor query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: usize,
    pub squared_distance: f64,
}

/// Neighbors of a query, nearest first, ties ordered by ascending id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    neighbors: Vec<Neighbor>,
}

impl NeighborResult {
    /// Wrap neighbors that are already in query order
    pub fn from_sorted(neighbors: Vec<Neighbor>) -> Self {
        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    /// Neighbor ids in query order
    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.neighbors.iter().map(|n| n.id)
    }

    pub fn as_slice(&self) -> &[Neighbor] {
        &self.neighbors
    }
}

impl<'a> IntoIterator for &'a NeighborResult {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

/// What a nearest neighbor query is centered on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Query {
    /// A point of the indexed set; the point itself is excluded from the result
    Member(usize),
    /// An arbitrary location; nothing is excluded
    Position(Point3d),
}

/// Trait for nearest neighbor search functionality
pub trait NearestNeighborSearch {
    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of an indexed point
    fn position(&self, id: usize) -> Option<Point3d>;

    /// Find exactly `k` nearest neighbors of `query`.
    ///
    /// Fails with [`Error::InvalidK`](crate::Error::InvalidK) unless
    /// `1 <= k < self.len()`.
    fn k_nearest(&self, query: Query, k: usize) -> Result<NeighborResult>;
}
