//! Immutable point sets stored as parallel arrays

use crate::error::{Error, Result};
use crate::point::*;
use serde::Serialize;

/// An immutable set of points, stored struct-of-arrays and addressed by id.
///
/// Point sets are handed in whole by the loader and never mutated afterwards;
/// every derived structure (index, normals, mesh) refers to points by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSet {
    positions: Vec<Point3d>,
    colors: Option<Vec<[u8; 3]>>,
}

impl PointSet {
    /// Create a point set from positions only
    pub fn from_positions(positions: Vec<Point3d>) -> Self {
        Self {
            positions,
            colors: None,
        }
    }

    /// Create a point set with one color per position
    pub fn from_positions_and_colors(positions: Vec<Point3d>, colors: Vec<[u8; 3]>) -> Result<Self> {
        if colors.len() != positions.len() {
            return Err(Error::InvalidData(format!(
                "{} colors for {} positions",
                colors.len(),
                positions.len()
            )));
        }
        Ok(Self {
            positions,
            colors: Some(colors),
        })
    }

    /// Create a point set from a flat `x, y, z, x, y, z, ...` buffer
    pub fn from_flat(buffer: &[f64]) -> Result<Self> {
        if buffer.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "position buffer length {} is not a multiple of 3",
                buffer.len()
            )));
        }
        let positions = buffer
            .chunks_exact(3)
            .map(|c| Point3d::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self::from_positions(positions))
    }

    /// Create a point set from the single precision buffers a loader hands over.
    ///
    /// `colors`, when given, holds three bytes per point.
    pub fn from_flat_f32(positions: &[f32], colors: Option<&[u8]>) -> Result<Self> {
        if positions.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "position buffer length {} is not a multiple of 3",
                positions.len()
            )));
        }
        let points: Vec<Point3d> = positions
            .chunks_exact(3)
            .map(|c| Point3d::new(c[0] as f64, c[1] as f64, c[2] as f64))
            .collect();

        match colors {
            None => Ok(Self::from_positions(points)),
            Some(colors) => {
                if colors.len() != positions.len() {
                    return Err(Error::InvalidData(format!(
                        "color buffer length {} does not match position buffer length {}",
                        colors.len(),
                        positions.len()
                    )));
                }
                let colors = colors.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
                Self::from_positions_and_colors(points, colors)
            }
        }
    }

    /// Get the number of points in the set
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the point set is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Point3d] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    /// Position of the point with the given id
    ///
    /// # Panics
    /// Panics if `id` is out of range, like slice indexing.
    pub fn position(&self, id: usize) -> Point3d {
        self.positions[id]
    }

    /// Materialise a single point, or `None` if the id is out of range
    pub fn point(&self, id: usize) -> Option<Point> {
        let position = *self.positions.get(id)?;
        let color = self.colors.as_ref().map(|c| c[id]);
        Some(Point { id, position, color })
    }

    /// Iterate over all points in id order
    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.len()).filter_map(move |id| self.point(id))
    }

    /// Axis-aligned bounding box, `None` for an empty set
    pub fn bounding_box(&self) -> Option<(Point3d, Point3d)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(min, max), p| {
            (
                Point3d::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z)),
                Point3d::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z)),
            )
        }))
    }
}

impl FromIterator<Point3d> for PointSet {
    fn from_iter<I: IntoIterator<Item = Point3d>>(iter: I) -> Self {
        Self::from_positions(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat() {
        let set = PointSet::from_flat(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.position(1), Point3d::new(3.0, 4.0, 5.0));
        assert!(!set.has_colors());

        assert!(PointSet::from_flat(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_from_flat_f32_with_colors() {
        let set = PointSet::from_flat_f32(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0], Some(&[255, 0, 0, 0, 255, 0])).unwrap();
        let point = set.point(1).unwrap();
        assert_eq!(point.id, 1);
        assert_eq!(point.color, Some([0, 255, 0]));

        let mismatched = PointSet::from_flat_f32(&[0.0, 0.0, 0.0], Some(&[1, 2]));
        assert!(matches!(mismatched, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_point_out_of_range() {
        let set: PointSet = vec![Point3d::origin()].into_iter().collect();
        assert!(set.point(0).is_some());
        assert!(set.point(1).is_none());
    }

    #[test]
    fn test_bounding_box() {
        let set = PointSet::from_positions(vec![
            Point3d::new(0.0, -1.0, 2.0),
            Point3d::new(3.0, 1.0, -2.0),
        ]);
        let (min, max) = set.bounding_box().unwrap();
        assert_eq!(min, Point3d::new(0.0, -1.0, -2.0));
        assert_eq!(max, Point3d::new(3.0, 1.0, 2.0));
        assert!(PointSet::from_positions(Vec::new()).bounding_box().is_none());
    }
}
