//! Normal estimation algorithms
//!
//! Each point's normal axis is the minor eigenvector of the covariance of its
//! neighborhood (the point and its k nearest neighbors). The eigenvector is
//! found in closed form: the smallest root of the characteristic cubic via the
//! trigonometric solution, then a cross product of two rows of `C - λI`.
//! Estimated normals are undirected; see [`crate::orientation`] for signs.

use crate::parallel::{parallel_map_range, ParallelConfig};
use cloudmesh_core::{
    Error, NearestNeighborSearch, Normal, Point3d, PointSet, Query, Result, Vector3d,
};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Eigenvectors with a norm below this are treated as numerically degenerate
pub const DEGENERACY_EPSILON: f64 = 1e-6;

/// Axis substituted for the normal of a degenerate neighborhood
pub const DEFAULT_NORMAL_AXIS: [f64; 3] = [1.0, 0.0, 0.0];

/// [`DEFAULT_NORMAL_AXIS`] as a vector
pub fn default_normal_axis() -> Vector3d {
    Vector3d::from(DEFAULT_NORMAL_AXIS)
}

/// Symmetric 3x3 covariance matrix, stored as its upper triangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub c00: f64,
    pub c01: f64,
    pub c02: f64,
    pub c11: f64,
    pub c12: f64,
    pub c22: f64,
}

impl CovarianceMatrix {
    pub fn new(values: [f64; 6]) -> Self {
        let [c00, c01, c02, c11, c12, c22] = values;
        Self { c00, c01, c02, c11, c12, c22 }
    }

    /// Unnormalised covariance of `points` around their centroid
    pub fn from_points(points: &[Point3d]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let centroid = points.iter().fold(Vector3d::zeros(), |acc, p| acc + p.coords) / points.len() as f64;

        points.iter().fold(Self::default(), |acc, p| {
            let d = p.coords - centroid;
            Self {
                c00: acc.c00 + d.x * d.x,
                c01: acc.c01 + d.x * d.y,
                c02: acc.c02 + d.x * d.z,
                c11: acc.c11 + d.y * d.y,
                c12: acc.c12 + d.y * d.z,
                c22: acc.c22 + d.z * d.z,
            }
        })
    }

    pub fn as_array(&self) -> [f64; 6] {
        [self.c00, self.c01, self.c02, self.c11, self.c12, self.c22]
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.c00, self.c01, self.c02,
            self.c01, self.c11, self.c12,
            self.c02, self.c12, self.c22,
        )
    }

    pub fn trace(&self) -> f64 {
        self.c00 + self.c11 + self.c22
    }

    /// Sum of the principal 2x2 minors
    pub fn minor_sum(&self) -> f64 {
        let m_xx = self.c11 * self.c22 - self.c12 * self.c12;
        let m_yy = self.c00 * self.c22 - self.c02 * self.c02;
        let m_zz = self.c00 * self.c11 - self.c01 * self.c01;
        m_xx + m_yy + m_zz
    }

    pub fn determinant(&self) -> f64 {
        self.c00 * (self.c11 * self.c22 - self.c12 * self.c12)
            + self.c01 * (self.c02 * self.c12 - self.c01 * self.c22)
            + self.c02 * (self.c01 * self.c12 - self.c02 * self.c11)
    }

    fn max_abs(&self) -> f64 {
        self.as_array().iter().fold(0.0, |acc, c| acc.max(c.abs()))
    }

    fn scaled(&self, factor: f64) -> Self {
        let mut values = self.as_array();
        values.iter_mut().for_each(|c| *c *= factor);
        Self::new(values)
    }

    /// Smallest eigenvalue, from the trigonometric solution of
    /// `λ³ - mλ² + sλ - det = 0` shifted to the depressed form `t³ + pt + q`.
    pub fn smallest_eigenvalue(&self) -> f64 {
        let m = self.trace();
        let s = self.minor_sum();
        let det = self.determinant();

        let third_m = m / 3.0;
        let p = s - m * third_m;
        let q = -2.0 * third_m * third_m * third_m + third_m * s - det;

        if p >= -f64::EPSILON * m.abs().max(1.0) {
            // All three roots coincide
            return third_m;
        }

        let r = (-p / 3.0).sqrt();
        let cos_theta = (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0);
        let theta = cos_theta.acos();

        third_m + 2.0 * r * (theta / 3.0 + 2.0 * PI / 3.0).cos()
    }

    /// Unit eigenvector of the smallest eigenvalue, or `None` when the
    /// neighborhood does not define a stable axis.
    ///
    /// The matrix is first rescaled by its largest entry so the degeneracy
    /// threshold does not depend on the units of the cloud.
    pub fn minor_eigenvector(&self) -> Option<Vector3d> {
        let scale = self.max_abs();
        if scale <= 0.0 || !scale.is_finite() {
            return None;
        }
        let c = self.scaled(1.0 / scale);
        let lambda = c.smallest_eigenvalue();

        let r0 = Vector3d::new(c.c00 - lambda, c.c01, c.c02);
        let r1 = Vector3d::new(c.c01, c.c11 - lambda, c.c12);
        let r2 = Vector3d::new(c.c02, c.c12, c.c22 - lambda);

        let best = [r0.cross(&r1), r0.cross(&r2), r1.cross(&r2)]
            .into_iter()
            .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;

        let norm = best.norm();
        if norm < DEGENERACY_EPSILON || !norm.is_finite() {
            return None;
        }
        Some(best / norm)
    }
}

/// Configuration for normal estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalConfig {
    /// Number of nearest neighbors per point
    pub k: usize,
    pub parallel: ParallelConfig,
}

impl Default for NormalConfig {
    fn default() -> Self {
        Self {
            k: 20,
            parallel: ParallelConfig::default(),
        }
    }
}

impl NormalConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Unoriented normals plus the points that fell back to the default axis
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEstimation {
    pub normals: Vec<Normal>,
    pub degenerate_points: Vec<usize>,
}

/// Estimate one unoriented normal per point using k nearest neighbors
pub fn estimate_normals<S>(index: &S, points: &PointSet, k: usize) -> Result<Vec<Normal>>
where
    S: NearestNeighborSearch + Sync,
{
    let config = NormalConfig::default().with_k(k);
    estimate_normals_with_config(index, points, &config).map(|estimation| estimation.normals)
}

/// Estimate normals with configuration, reporting degenerate neighborhoods
pub fn estimate_normals_with_config<S>(
    index: &S,
    points: &PointSet,
    config: &NormalConfig,
) -> Result<NormalEstimation>
where
    S: NearestNeighborSearch + Sync,
{
    let k = config.k;
    if index.len() != points.len() {
        return Err(Error::InvalidData(format!(
            "index holds {} points but the point set has {}",
            index.len(),
            points.len()
        )));
    }
    if k == 0 {
        return Err(Error::InvalidK { k, point_count: points.len() });
    }
    if points.len() < k + 1 {
        return Err(Error::InsufficientPoints {
            required: k + 1,
            actual: points.len(),
        });
    }

    let positions = points.positions();
    let fits = parallel_map_range(points.len(), &config.parallel, |id| -> Result<(Normal, bool)> {
        let neighbors = index.k_nearest(Query::Member(id), k)?;

        let mut neighborhood = Vec::with_capacity(k + 1);
        neighborhood.push(positions[id]);
        neighborhood.extend(neighbors.ids().map(|n| positions[n]));

        let covariance = CovarianceMatrix::from_points(&neighborhood);
        Ok(match covariance.minor_eigenvector() {
            Some(axis) => (Normal::new(id, axis), false),
            None => (Normal::new(id, default_normal_axis()), true),
        })
    });

    let mut normals = Vec::with_capacity(points.len());
    let mut degenerate_points = Vec::new();
    for fit in fits {
        let (normal, degenerate) = fit?;
        if degenerate {
            degenerate_points.push(normal.point_id);
        }
        normals.push(normal);
    }

    if !degenerate_points.is_empty() {
        log::warn!(
            "{} of {} neighborhoods were degenerate; used the default normal axis",
            degenerate_points.len(),
            points.len()
        );
    }
    log::debug!("Estimated {} normals with k = {}", normals.len(), k);

    Ok(NormalEstimation {
        normals,
        degenerate_points,
    })
}
