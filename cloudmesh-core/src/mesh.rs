//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A triangle of point indices with its derived 3D shape measures.
///
/// `edge_lengths[i]` is the edge opposite corner `i`, and
/// `interior_angle_cosines[i]` is the cosine of the angle at corner `i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub edge_lengths: [f64; 3],
    pub interior_angle_cosines: [f64; 3],
}

impl Triangle {
    /// Build a triangle over `positions`, measuring it in 3D.
    ///
    /// Fails if the corners are not three distinct, in-range indices.
    pub fn new(a: usize, b: usize, c: usize, positions: &[Point3d]) -> Result<Self> {
        if a == b || b == c || a == c {
            return Err(Error::InvalidData(format!("triangle [{}, {}, {}] repeats a corner", a, b, c)));
        }
        let (pa, pb, pc) = match (positions.get(a), positions.get(b), positions.get(c)) {
            (Some(pa), Some(pb), Some(pc)) => (pa, pb, pc),
            _ => {
                return Err(Error::InvalidData(format!(
                    "triangle [{}, {}, {}] out of range for {} points",
                    a,
                    b,
                    c,
                    positions.len()
                )))
            }
        };

        let sq = [
            (pc - pb).norm_squared(),
            (pa - pc).norm_squared(),
            (pb - pa).norm_squared(),
        ];
        let edge_lengths = [sq[0].sqrt(), sq[1].sqrt(), sq[2].sqrt()];

        // Law of cosines at each corner; a collapsed edge makes the angle zero.
        let cosine = |opposite: usize, adj1: usize, adj2: usize| {
            let denom = 2.0 * edge_lengths[adj1] * edge_lengths[adj2];
            if denom <= 0.0 {
                1.0
            } else {
                (sq[adj1] + sq[adj2] - sq[opposite]) / denom
            }
        };
        let interior_angle_cosines = [cosine(0, 1, 2), cosine(1, 2, 0), cosine(2, 0, 1)];

        Ok(Self {
            a,
            b,
            c,
            edge_lengths,
            interior_angle_cosines,
        })
    }

    pub fn indices(&self) -> [usize; 3] {
        [self.a, self.b, self.c]
    }

    pub fn longest_edge(&self) -> f64 {
        self.edge_lengths.iter().copied().fold(0.0, f64::max)
    }

    /// Smallest interior angle in degrees
    pub fn min_angle_degrees(&self) -> f64 {
        self.interior_angle_cosines
            .iter()
            .map(|c| c.clamp(-1.0, 1.0).acos().to_degrees())
            .fold(f64::INFINITY, f64::min)
    }

    pub fn has_degenerate_edge(&self) -> bool {
        self.edge_lengths.iter().any(|&l| l <= 0.0)
    }
}

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3d>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3d>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Check that every face index addresses an existing vertex
    pub fn validate(&self) -> Result<()> {
        let count = self.vertices.len();
        if let Some((i, face)) = self
            .faces
            .iter()
            .enumerate()
            .find(|(_, face)| face.iter().any(|&v| v >= count))
        {
            return Err(Error::InvalidData(format!(
                "face {} {:?} references a vertex outside 0..{}",
                i, face, count
            )));
        }
        Ok(())
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3d>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Vertex positions as a flat single precision buffer, stride 3
    pub fn vertex_buffer(&self) -> Vec<f32> {
        self.vertices
            .iter()
            .flat_map(|v| [v.x as f32, v.y as f32, v.z as f32])
            .collect()
    }

    /// Face indices as a flat buffer, stride 3
    pub fn index_buffer(&self) -> Vec<u32> {
        self.faces
            .iter()
            .flat_map(|f| [f[0] as u32, f[1] as u32, f[2] as u32])
            .collect()
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn right_triangle() -> Vec<Point3d> {
        vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_triangle_measures() {
        let positions = right_triangle();
        let tri = Triangle::new(0, 1, 2, &positions).unwrap();

        assert_relative_eq!(tri.edge_lengths[0], 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(tri.edge_lengths[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(tri.edge_lengths[2], 1.0, epsilon = 1e-12);

        // Right angle at corner a, 45 degrees at b and c
        assert_relative_eq!(tri.interior_angle_cosines[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(tri.interior_angle_cosines[1], 45.0_f64.to_radians().cos(), epsilon = 1e-12);
        assert_relative_eq!(tri.min_angle_degrees(), 45.0, epsilon = 1e-9);
        assert_relative_eq!(tri.longest_edge(), 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_rejects_bad_indices() {
        let positions = right_triangle();
        assert!(Triangle::new(0, 0, 1, &positions).is_err());
        assert!(Triangle::new(0, 1, 3, &positions).is_err());
    }

    #[test]
    fn test_collapsed_edge_has_zero_angle() {
        let positions = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
        ];
        let tri = Triangle::new(0, 1, 2, &positions).unwrap();
        assert!(tri.has_degenerate_edge());
        assert_eq!(tri.min_angle_degrees(), 0.0);
    }

    #[test]
    fn test_mesh_validate() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(right_triangle(), vec![[0, 1, 2]]);
        assert!(mesh.validate().is_ok());

        mesh.faces.push([0, 1, 3]);
        assert!(matches!(mesh.validate(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_flat_buffers() {
        let mesh = TriangleMesh::from_vertices_and_faces(right_triangle(), vec![[0, 1, 2]]);
        assert_eq!(mesh.vertex_buffer(), vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(mesh.index_buffer(), vec![0, 1, 2]);
    }

    #[test]
    fn test_set_attributes_requires_matching_length() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(right_triangle(), vec![[0, 1, 2]]);
        mesh.set_colors(vec![[0, 0, 0]]);
        assert!(mesh.colors.is_none());
        mesh.set_colors(vec![[0, 0, 0]; 3]);
        assert!(mesh.colors.is_some());
    }
}
