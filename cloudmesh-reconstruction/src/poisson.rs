//! Gateway to an external volumetric (Poisson) reconstruction engine
//!
//! Oriented samples are handed to the engine as a flat `f32` buffer of
//! `(x, y, z, nx, ny, nz)` records. Whatever the engine returns is treated as
//! untrusted: buffer lengths and face indices are checked before a
//! [`TriangleMesh`] is built from it.

use bytemuck::{Pod, Zeroable};
use cloudmesh_core::{Error, Normal, Point3d, PointSet, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Number of `f32` values per oriented sample record
pub const SAMPLE_STRIDE: usize = 6;

/// One interleaved sample record as the engine expects it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OrientedSample {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl OrientedSample {
    pub fn new(position: &Point3d, normal: &Normal) -> Self {
        Self {
            position: [position.x as f32, position.y as f32, position.z as f32],
            normal: [
                normal.direction.x as f32,
                normal.direction.y as f32,
                normal.direction.z as f32,
            ],
        }
    }
}

/// Pack positions and normals into the engine's flat sample layout
pub fn pack_oriented_samples(points: &PointSet, normals: &[Normal]) -> Result<Vec<f32>> {
    if normals.len() != points.len() {
        return Err(Error::InvalidData(format!(
            "{} normals supplied for {} points",
            normals.len(),
            points.len()
        )));
    }

    let samples: Vec<OrientedSample> = points
        .positions()
        .iter()
        .zip(normals)
        .map(|(position, normal)| OrientedSample::new(position, normal))
        .collect();

    Ok(bytemuck::cast_slice::<OrientedSample, f32>(&samples).to_vec())
}

/// Parameters forwarded to the reconstruction engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoissonParams {
    /// Maximum octree depth of the solve
    pub octree_depth: u32,
    /// Minimum number of samples per octree node
    pub samples_per_node: f32,
    /// Ratio of the reconstruction cube to the sample bounding cube
    pub scale: f32,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            octree_depth: 8,
            samples_per_node: 1.5,
            scale: 1.1,
        }
    }
}

impl PoissonParams {
    pub fn with_octree_depth(mut self, octree_depth: u32) -> Self {
        self.octree_depth = octree_depth;
        self
    }

    pub fn with_samples_per_node(mut self, samples_per_node: f32) -> Self {
        self.samples_per_node = samples_per_node;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=16).contains(&self.octree_depth) {
            return Err(Error::InvalidParameter(format!(
                "octree_depth must be in 1..=16, got {}",
                self.octree_depth
            )));
        }
        if !(self.samples_per_node.is_finite() && self.samples_per_node >= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "samples_per_node must be at least 1, got {}",
                self.samples_per_node
            )));
        }
        if !(self.scale.is_finite() && self.scale >= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "scale must be at least 1, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionRequest {
    /// Flat `(x, y, z, nx, ny, nz)` records
    pub samples: Vec<f32>,
    pub params: PoissonParams,
}

impl ReconstructionRequest {
    pub fn sample_count(&self) -> usize {
        self.samples.len() / SAMPLE_STRIDE
    }

    /// The samples viewed as records; `None` if the buffer is not a whole
    /// number of records
    pub fn records(&self) -> Option<&[OrientedSample]> {
        bytemuck::try_cast_slice(&self.samples).ok()
    }
}

/// Raw engine output: flat `f32` vertex coordinates and `i32` face indices
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionResponse {
    pub vertex_count: usize,
    pub face_count: usize,
    pub vertices: Vec<f32>,
    pub faces: Vec<i32>,
}

#[derive(thiserror::Error, Debug, Clone, Default, PartialEq)]
#[error("reconstruction engine failed: {}", .detail.as_deref().unwrap_or("no detail"))]
pub struct EngineError {
    pub detail: Option<String>,
}

impl EngineError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// A volumetric surface reconstruction backend
pub trait ReconstructionEngine: Send + Sync {
    fn reconstruct(&self, request: &ReconstructionRequest) -> std::result::Result<ReconstructionResponse, EngineError>;
}

impl<E: ReconstructionEngine + ?Sized> ReconstructionEngine for &E {
    fn reconstruct(&self, request: &ReconstructionRequest) -> std::result::Result<ReconstructionResponse, EngineError> {
        (**self).reconstruct(request)
    }
}

/// Validates requests going to an engine and responses coming back
#[derive(Debug, Clone)]
pub struct ReconstructionGateway<E> {
    engine: E,
}

impl<E: ReconstructionEngine> ReconstructionGateway<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Pack oriented points and reconstruct
    pub fn reconstruct_points(&self, points: &PointSet, normals: &[Normal], params: &PoissonParams) -> Result<TriangleMesh> {
        let request = ReconstructionRequest {
            samples: pack_oriented_samples(points, normals)?,
            params: *params,
        };
        self.reconstruct(&request)
    }

    pub fn reconstruct(&self, request: &ReconstructionRequest) -> Result<TriangleMesh> {
        if request.samples.len() % SAMPLE_STRIDE != 0 {
            return Err(Error::InvalidData(format!(
                "sample buffer length {} is not a multiple of {}",
                request.samples.len(),
                SAMPLE_STRIDE
            )));
        }
        if request.samples.is_empty() {
            return Err(Error::InsufficientPoints { required: 1, actual: 0 });
        }
        request.params.validate()?;

        log::debug!(
            "Submitting {} samples to reconstruction engine (depth {})",
            request.sample_count(),
            request.params.octree_depth
        );

        // A panicking engine is a failed reconstruction, not a crashed caller
        let response = panic::catch_unwind(AssertUnwindSafe(|| self.engine.reconstruct(request)))
            .map_err(|payload| Error::ReconstructionFailed(format!("engine panicked: {}", panic_detail(payload.as_ref()))))?
            .map_err(|e| {
                Error::ReconstructionFailed(e.detail.unwrap_or_else(|| "engine reported an unspecified error".to_string()))
            })?;

        mesh_from_response(&response)
    }
}

/// Message carried by a caught panic
pub(crate) fn panic_detail(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Convert an engine response into a mesh, rejecting malformed buffers
pub fn mesh_from_response(response: &ReconstructionResponse) -> Result<TriangleMesh> {
    let expected_vertices = response.vertex_count.checked_mul(3);
    if expected_vertices != Some(response.vertices.len()) {
        return Err(Error::ReconstructionFailed(format!(
            "vertex buffer holds {} values for {} vertices",
            response.vertices.len(),
            response.vertex_count
        )));
    }
    let expected_indices = response.face_count.checked_mul(3);
    if expected_indices != Some(response.faces.len()) {
        return Err(Error::ReconstructionFailed(format!(
            "face buffer holds {} indices for {} faces",
            response.faces.len(),
            response.face_count
        )));
    }
    if response.vertex_count == 0 || response.face_count == 0 {
        return Err(Error::EmptyResult(format!(
            "engine returned {} vertices and {} faces",
            response.vertex_count, response.face_count
        )));
    }
    if let Some(v) = response.vertices.iter().find(|v| !v.is_finite()) {
        return Err(Error::ReconstructionFailed(format!("non-finite vertex coordinate {}", v)));
    }

    let vertices: Vec<Point3d> = response
        .vertices
        .chunks_exact(3)
        .map(|v| Point3d::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();

    let faces = response
        .faces
        .chunks_exact(3)
        .map(|face| -> Result<[usize; 3]> {
            let mut indices = [0usize; 3];
            for (slot, &index) in indices.iter_mut().zip(face) {
                *slot = usize::try_from(index)
                    .ok()
                    .filter(|&i| i < response.vertex_count)
                    .ok_or_else(|| {
                        Error::ReconstructionFailed(format!(
                            "face index {} out of range for {} vertices",
                            index, response.vertex_count
                        ))
                    })?;
            }
            Ok(indices)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TriangleMesh::from_vertices_and_faces(vertices, faces))
}

/// Relaxation sweeps per multigrid level
const MAX_RELAXATION_ITERS: usize = 10;

/// Screening weight pulling the implicit function towards the samples
const SCREENING: f64 = 0.0;

/// Fewer samples than this cannot constrain a closed surface
pub const MIN_POISSON_SAMPLES: usize = 10;

/// Reject sample sets the solver cannot turn into a closed surface
fn check_samples(records: &[OrientedSample]) -> std::result::Result<(), EngineError> {
    if records.len() < MIN_POISSON_SAMPLES {
        return Err(EngineError::new(format!(
            "{} samples, at least {} needed",
            records.len(),
            MIN_POISSON_SAMPLES
        )));
    }

    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for (i, sample) in records.iter().enumerate() {
        if sample.position.iter().any(|c| !c.is_finite()) {
            return Err(EngineError::new(format!("sample {} has a non-finite position", i)));
        }
        let magnitude = sample.normal.iter().map(|c| c * c).sum::<f32>().sqrt();
        if !magnitude.is_finite() || (magnitude - 1.0).abs() > 0.1 {
            return Err(EngineError::new(format!("sample {} has normal magnitude {}", i, magnitude)));
        }
        for axis in 0..3 {
            min[axis] = min[axis].min(sample.position[axis]);
            max[axis] = max[axis].max(sample.position[axis]);
        }
    }

    // A flat sample set has no inside
    let extent = (0..3).map(|axis| max[axis] - min[axis]).fold(f32::INFINITY, f32::min);
    if extent <= 0.0 {
        return Err(EngineError::new("samples are flat along one axis"));
    }
    Ok(())
}

/// In-process engine backed by the `poisson_reconstruction` crate.
///
/// `octree_depth` is the solver's maximum depth. The density estimate is taken
/// `log8(samples_per_node)` levels coarser, rounded up. `scale` is validated
/// but not used: this solver always fits its grid to the samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonEngine;

impl PoissonEngine {
    pub fn new() -> Self {
        Self
    }

    fn density_estimation_depth(params: &PoissonParams) -> usize {
        let reduction = (params.samples_per_node.max(1.0) as f64).log(8.0).ceil() as usize;
        (params.octree_depth as usize).saturating_sub(reduction).max(1)
    }
}

impl ReconstructionEngine for PoissonEngine {
    fn reconstruct(&self, request: &ReconstructionRequest) -> std::result::Result<ReconstructionResponse, EngineError> {
        let records = request
            .records()
            .ok_or_else(|| EngineError::new("sample buffer is not a whole number of records"))?;
        check_samples(records)?;

        let points: Vec<nalgebra::Point3<f64>> = records
            .iter()
            .map(|s| nalgebra::Point3::new(s.position[0] as f64, s.position[1] as f64, s.position[2] as f64))
            .collect();
        let normals: Vec<nalgebra::Vector3<f64>> = records
            .iter()
            .map(|s| nalgebra::Vector3::new(s.normal[0] as f64, s.normal[1] as f64, s.normal[2] as f64))
            .collect();

        let max_depth = request.params.octree_depth as usize;
        let density_depth = Self::density_estimation_depth(&request.params);

        let buffers = panic::catch_unwind(AssertUnwindSafe(|| {
            poisson_reconstruction::PoissonReconstruction::from_points_and_normals(
                &points,
                &normals,
                SCREENING,
                density_depth,
                max_depth,
                MAX_RELAXATION_ITERS,
            )
            .reconstruct_mesh_buffers()
        }))
        .map_err(|payload| EngineError::new(format!("solver panicked: {}", panic_detail(payload.as_ref()))))?;

        let vertices: Vec<f32> = buffers
            .vertices()
            .iter()
            .flat_map(|v| [v.x as f32, v.y as f32, v.z as f32])
            .collect();
        let faces = buffers
            .indices()
            .iter()
            .map(|&i| i32::try_from(i).map_err(|_| EngineError::new(format!("vertex index {} overflows i32", i))))
            .collect::<std::result::Result<Vec<i32>, EngineError>>()?;

        Ok(ReconstructionResponse {
            vertex_count: buffers.vertices().len(),
            face_count: faces.len() / 3,
            vertices,
            faces,
        })
    }
}
