//! Quality-filtered Delaunay meshing for height-field-like surfaces
//!
//! Points are projected to 2D by dropping one axis, triangulated with a 2D
//! Delaunay triangulation, and every triangle is then judged on its original
//! 3D shape: triangles with an overlong edge or a too-sharp corner are
//! discarded. Faces index the original, unprojected points.

use cloudmesh_algorithms::parallel::{parallel_filter_map, ParallelConfig};
use cloudmesh_core::{Error, Point3d, PointSet, Result, Triangle, TriangleMesh};
use serde::{Deserialize, Serialize};
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};

/// Projection methods for 3D to 2D mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionMethod {
    /// Project onto XY plane (ignore Z coordinate)
    XY,
    /// Project onto XZ plane (ignore Y coordinate)
    XZ,
    /// Project onto YZ plane (ignore X coordinate)
    YZ,
}

impl ProjectionMethod {
    /// Index of the coordinate that is dropped
    pub fn dropped_axis(&self) -> usize {
        match self {
            ProjectionMethod::YZ => 0,
            ProjectionMethod::XZ => 1,
            ProjectionMethod::XY => 2,
        }
    }

    pub fn project(&self, p: &Point3d) -> Point2<f64> {
        match self {
            ProjectionMethod::XY => Point2::new(p.x, p.y),
            ProjectionMethod::XZ => Point2::new(p.x, p.z),
            ProjectionMethod::YZ => Point2::new(p.y, p.z),
        }
    }
}

/// Configuration for filtered Delaunay meshing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MesherConfig {
    /// Which axis to drop before triangulating; the height axis of the surface
    pub projection: ProjectionMethod,
    /// Triangles with any 3D edge longer than this are discarded
    pub max_edge_length: f64,
    /// Triangles keep only if every interior angle exceeds this
    pub min_interior_angle_degrees: f64,
    pub parallel: ParallelConfig,
}

impl Default for MesherConfig {
    fn default() -> Self {
        Self {
            projection: ProjectionMethod::XZ,
            max_edge_length: 1.0,
            min_interior_angle_degrees: 10.0,
            parallel: ParallelConfig::default(),
        }
    }
}

impl MesherConfig {
    pub fn with_projection(mut self, projection: ProjectionMethod) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_max_edge_length(mut self, max_edge_length: f64) -> Self {
        self.max_edge_length = max_edge_length;
        self
    }

    pub fn with_min_interior_angle(mut self, degrees: f64) -> Self {
        self.min_interior_angle_degrees = degrees;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.max_edge_length.is_finite() && self.max_edge_length > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "max_edge_length must be positive and finite, got {}",
                self.max_edge_length
            )));
        }
        // No triangle has all angles above 60 degrees
        if !(0.0..60.0).contains(&self.min_interior_angle_degrees) {
            return Err(Error::InvalidParameter(format!(
                "min_interior_angle_degrees must be in [0, 60), got {}",
                self.min_interior_angle_degrees
            )));
        }
        Ok(())
    }
}

/// Shape thresholds applied to a single triangle
#[derive(Debug, Clone, Copy)]
struct QualityFilter {
    max_edge_length: f64,
    max_angle_cosine: f64,
}

impl QualityFilter {
    fn new(config: &MesherConfig) -> Self {
        Self {
            max_edge_length: config.max_edge_length,
            max_angle_cosine: config.min_interior_angle_degrees.to_radians().cos(),
        }
    }

    fn accepts(&self, triangle: &Triangle) -> bool {
        if triangle.has_degenerate_edge() {
            return false;
        }
        if triangle.edge_lengths.iter().any(|&l| l > self.max_edge_length) {
            return false;
        }
        // A larger cosine is a sharper angle
        triangle
            .interior_angle_cosines
            .iter()
            .all(|&c| c < self.max_angle_cosine)
    }
}

/// A projected point that remembers which input point it came from
#[derive(Debug, Clone, Copy)]
struct ProjectedVertex {
    position: Point2<f64>,
    id: usize,
}

impl HasPosition for ProjectedVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// 2D Delaunay triangulation using spade crate.
///
/// Returns triangles as indices into `points`, counter-clockwise in 2D.
/// Coincident points are triangulated once.
pub fn delaunay_triangulation_2d(points: &[Point2<f64>]) -> Result<Vec<[usize; 3]>> {
    if points.len() < 3 {
        return Err(Error::InsufficientPoints {
            required: 3,
            actual: points.len(),
        });
    }

    let vertices: Vec<ProjectedVertex> = points
        .iter()
        .enumerate()
        .map(|(id, &position)| ProjectedVertex { position, id })
        .collect();

    let triangulation: DelaunayTriangulation<ProjectedVertex> = DelaunayTriangulation::bulk_load(vertices)
        .map_err(|e| Error::Algorithm(format!("Delaunay triangulation failed: {:?}", e)))?;

    Ok(triangulation
        .inner_faces()
        .map(|face| {
            let [a, b, c] = face.vertices();
            [a.data().id, b.data().id, c.data().id]
        })
        .collect())
}

/// Mesh a point set, dropping the Y axis before triangulation
pub fn filtered_mesh(points: &PointSet, max_edge_length: f64, min_interior_angle_degrees: f64) -> Result<TriangleMesh> {
    let config = MesherConfig::default()
        .with_max_edge_length(max_edge_length)
        .with_min_interior_angle(min_interior_angle_degrees);
    filtered_mesh_with_config(points, &config)
}

/// Mesh a point set with configuration.
///
/// Vertices of the returned mesh are the input positions in input order, and
/// input colors are carried over. Fails with [`Error::EmptyResult`] when no
/// triangle passes the filter.
pub fn filtered_mesh_with_config(points: &PointSet, config: &MesherConfig) -> Result<TriangleMesh> {
    config.validate()?;
    if points.len() < 3 {
        return Err(Error::InsufficientPoints {
            required: 3,
            actual: points.len(),
        });
    }

    let positions = points.positions();
    let projected: Vec<Point2<f64>> = positions.iter().map(|p| config.projection.project(p)).collect();
    let candidates = delaunay_triangulation_2d(&projected)?;

    let filter = QualityFilter::new(config);
    let faces = parallel_filter_map(&candidates, &config.parallel, |&[a, b, c]| {
        let triangle = Triangle::new(a, b, c, positions).ok()?;
        filter.accepts(&triangle).then(|| triangle.indices())
    });

    log::debug!(
        "Delaunay produced {} triangles, {} passed the quality filter",
        candidates.len(),
        faces.len()
    );

    if faces.is_empty() {
        return Err(Error::EmptyResult(format!(
            "none of {} triangles passed max edge length {} and min angle {} degrees",
            candidates.len(),
            config.max_edge_length,
            config.min_interior_angle_degrees
        )));
    }

    let mut mesh = TriangleMesh::from_vertices_and_faces(positions.to_vec(), faces);
    if let Some(colors) = points.colors() {
        mesh.set_colors(colors.to_vec());
    }
    Ok(mesh)
}

/// Automatic projection selection: drop the axis of smallest extent
pub fn auto_select_projection(points: &PointSet) -> ProjectionMethod {
    let Some((min, max)) = points.bounding_box() else {
        return ProjectionMethod::XZ;
    };
    let extents = max - min;

    let (min_extent_idx, _) = extents
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .unwrap_or((1, &0.0));

    match min_extent_idx {
        0 => ProjectionMethod::YZ, // X is smallest, project onto YZ
        2 => ProjectionMethod::XY, // Z is smallest, project onto XY
        _ => ProjectionMethod::XZ,
    }
}
