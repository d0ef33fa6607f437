//! Staged surface pipeline: index, estimate, orient, then mesh
//!
//! Stages run strictly in data-dependency order. Each stage borrows the
//! output of the previous one and returns new data; the input point set is
//! never modified.

use crate::delaunay::{filtered_mesh_with_config, MesherConfig, ProjectionMethod};
use crate::poisson::{PoissonParams, ReconstructionEngine, ReconstructionGateway};
use cloudmesh_algorithms::{
    estimate_normals_with_config, resolve_orientation_with_config, KdTree, NormalConfig, OrientationConfig,
    OrientationReport, ParallelConfig,
};
use cloudmesh_core::{Error, Normal, Point3d, PointSet, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How the oriented cloud is turned into a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshingStrategy {
    /// Projected Delaunay with edge length and angle filters
    Filtered,
    /// External volumetric reconstruction
    Reconstruction,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    BuildIndex,
    EstimateNormals,
    ResolveOrientation,
    Mesh,
    Reconstruct,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::BuildIndex => "build index",
            Stage::EstimateNormals => "estimate normals",
            Stage::ResolveOrientation => "resolve orientation",
            Stage::Mesh => "filtered mesh",
            Stage::Reconstruct => "reconstruct",
        }
    }
}

/// Start/complete signal for a stage; there is no finer progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Started(Stage),
    Completed(Stage),
}

/// Configuration for the surface pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Neighbors per point for estimation and orientation
    pub k: usize,
    /// After orientation the seed's normal points away from this position
    pub viewpoint: [f64; 3],
    pub orientation_seed: usize,
    pub strategy: MeshingStrategy,
    pub mesher: MesherConfig,
    pub poisson: PoissonParams,
    /// Parallelise per-point and per-triangle loops
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k: 20,
            viewpoint: [0.0, 0.0, 0.0],
            orientation_seed: 0,
            strategy: MeshingStrategy::Filtered,
            mesher: MesherConfig::default(),
            poisson: PoissonParams::default(),
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Terrain-like clouds with Y up: filtered meshing in the XZ plane,
    /// viewpoint far below so normals point up
    pub fn heightfield() -> Self {
        Self {
            viewpoint: [0.0, -1.0e6, 0.0],
            strategy: MeshingStrategy::Filtered,
            mesher: MesherConfig::default().with_projection(ProjectionMethod::XZ),
            ..Self::default()
        }
    }

    /// Closed objects around the origin: volumetric reconstruction with
    /// outward normals
    pub fn closed_surface() -> Self {
        Self {
            k: 12,
            viewpoint: [0.0, 0.0, 0.0],
            strategy: MeshingStrategy::Reconstruction,
            ..Self::default()
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: Point3d) -> Self {
        self.viewpoint = [viewpoint.x, viewpoint.y, viewpoint.z];
        self
    }

    pub fn with_orientation_seed(mut self, seed: usize) -> Self {
        self.orientation_seed = seed;
        self
    }

    pub fn with_strategy(mut self, strategy: MeshingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_mesher(mut self, mesher: MesherConfig) -> Self {
        self.mesher = mesher;
        self
    }

    pub fn with_poisson(mut self, poisson: PoissonParams) -> Self {
        self.poisson = poisson;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn viewpoint(&self) -> Point3d {
        Point3d::from(self.viewpoint)
    }

    fn parallel_config(&self) -> ParallelConfig {
        ParallelConfig::default().with_enabled(self.parallel)
    }

    fn normal_config(&self) -> NormalConfig {
        NormalConfig::default().with_k(self.k).with_parallel(self.parallel_config())
    }

    fn orientation_config(&self) -> OrientationConfig {
        OrientationConfig::default().with_k(self.k).with_seed(self.orientation_seed)
    }
}

/// Point cloud with a consistently oriented normal field
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedCloud {
    pub normals: Vec<Normal>,
    /// Points whose normal fell back to the default axis
    pub degenerate_points: Vec<usize>,
    pub orientation: OrientationReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub point_count: usize,
    pub degenerate_normals: usize,
    pub unreached_points: usize,
    pub vertex_count: usize,
    pub face_count: usize,
    pub index_time: Duration,
    pub normals_time: Duration,
    pub orientation_time: Duration,
    pub meshing_time: Duration,
}

impl PipelineStats {
    pub fn total_time(&self) -> Duration {
        self.index_time + self.normals_time + self.orientation_time + self.meshing_time
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub normals: Vec<Normal>,
    pub mesh: TriangleMesh,
    pub stats: PipelineStats,
}

/// Runs the stages of a surface pipeline with one configuration
#[derive(Debug, Clone, Default)]
pub struct SurfacePipeline {
    config: PipelineConfig,
}

impl SurfacePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the index, estimate normals and orient them
    pub fn estimate_oriented_normals(&self, points: &PointSet) -> Result<OrientedCloud> {
        let mut stats = PipelineStats {
            point_count: points.len(),
            ..PipelineStats::default()
        };
        self.orient_stages(points, &mut stats, &mut |_| Ok(()))
    }

    /// Run every stage and mesh with the configured strategy. `engine` is
    /// only called for [`MeshingStrategy::Reconstruction`].
    pub fn run(&self, points: &PointSet, engine: &dyn ReconstructionEngine) -> Result<PipelineOutput> {
        self.run_observed(points, engine, &mut |_| Ok(()))
    }

    /// Run every stage, reporting each start and completion to `observer`.
    ///
    /// An error from the observer abandons the run before the next stage.
    pub fn run_observed(
        &self,
        points: &PointSet,
        engine: &dyn ReconstructionEngine,
        observer: &mut dyn FnMut(StageEvent) -> Result<()>,
    ) -> Result<PipelineOutput> {
        let mut stats = PipelineStats {
            point_count: points.len(),
            ..PipelineStats::default()
        };
        let oriented = self.orient_stages(points, &mut stats, observer)?;

        let mesh = match self.config.strategy {
            MeshingStrategy::Filtered => {
                let mut mesher = self.config.mesher;
                mesher.parallel = mesher.parallel.with_enabled(self.config.parallel);
                let (mut mesh, elapsed) = timed_stage(Stage::Mesh, observer, || filtered_mesh_with_config(points, &mesher))?;
                mesh.set_normals(oriented.normals.iter().map(|n| n.direction).collect());
                stats.meshing_time = elapsed;
                mesh
            }
            MeshingStrategy::Reconstruction => {
                let gateway = ReconstructionGateway::new(engine);
                let (mesh, elapsed) = timed_stage(Stage::Reconstruct, observer, || {
                    gateway.reconstruct_points(points, &oriented.normals, &self.config.poisson)
                })?;
                stats.meshing_time = elapsed;
                mesh
            }
        };

        stats.vertex_count = mesh.vertex_count();
        stats.face_count = mesh.face_count();
        log::info!(
            "Pipeline finished: {} points, {} faces in {:?}",
            stats.point_count,
            stats.face_count,
            stats.total_time()
        );

        Ok(PipelineOutput {
            normals: oriented.normals,
            mesh,
            stats,
        })
    }

    fn orient_stages(
        &self,
        points: &PointSet,
        stats: &mut PipelineStats,
        observer: &mut dyn FnMut(StageEvent) -> Result<()>,
    ) -> Result<OrientedCloud> {
        let k = self.config.k;
        if k == 0 || k >= points.len() {
            return Err(Error::InvalidK {
                k,
                point_count: points.len(),
            });
        }

        let (index, elapsed) = timed_stage(Stage::BuildIndex, observer, || KdTree::build(points))?;
        stats.index_time = elapsed;

        let (estimation, elapsed) = timed_stage(Stage::EstimateNormals, observer, || {
            estimate_normals_with_config(&index, points, &self.config.normal_config())
        })?;
        stats.normals_time = elapsed;
        stats.degenerate_normals = estimation.degenerate_points.len();

        let (oriented, elapsed) = timed_stage(Stage::ResolveOrientation, observer, || {
            resolve_orientation_with_config(
                &estimation.normals,
                &index,
                points,
                self.config.viewpoint(),
                &self.config.orientation_config(),
            )
        })?;
        stats.orientation_time = elapsed;
        stats.unreached_points = oriented.report.unreached.len();

        Ok(OrientedCloud {
            normals: oriented.normals,
            degenerate_points: estimation.degenerate_points,
            orientation: oriented.report,
        })
    }
}

fn timed_stage<T>(
    stage: Stage,
    observer: &mut dyn FnMut(StageEvent) -> Result<()>,
    f: impl FnOnce() -> Result<T>,
) -> Result<(T, Duration)> {
    observer(StageEvent::Started(stage))?;
    let start = Instant::now();
    let value = f()?;
    let elapsed = start.elapsed();
    log::debug!("Stage '{}' took {:?}", stage.name(), elapsed);
    observer(StageEvent::Completed(stage))?;
    Ok((value, elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poisson::{EngineError, ReconstructionRequest, ReconstructionResponse};
    use rand::prelude::*;

    /// Engine that must never be reached
    struct UnreachableEngine;

    impl ReconstructionEngine for UnreachableEngine {
        fn reconstruct(&self, _request: &ReconstructionRequest) -> std::result::Result<ReconstructionResponse, EngineError> {
            Err(EngineError::new("engine should not be called"))
        }
    }

    /// Engine returning one triangle over the first three samples
    struct FirstTriangleEngine;

    impl ReconstructionEngine for FirstTriangleEngine {
        fn reconstruct(&self, request: &ReconstructionRequest) -> std::result::Result<ReconstructionResponse, EngineError> {
            let records = request.records().ok_or_else(EngineError::default)?;
            let vertices: Vec<f32> = records.iter().take(3).flat_map(|r| r.position).collect();
            Ok(ReconstructionResponse {
                vertex_count: vertices.len() / 3,
                face_count: 1,
                vertices,
                faces: vec![0, 1, 2],
            })
        }
    }

    fn heightfield_cloud(seed: u64) -> PointSet {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..30)
            .flat_map(|i| (0..30).map(move |j| (i, j)))
            .map(|(i, j)| {
                let x = i as f64 * 0.1 + rng.gen_range(-0.01..0.01);
                let z = j as f64 * 0.1 + rng.gen_range(-0.01..0.01);
                Point3d::new(x, 0.1 * (x * 2.0).sin(), z)
            })
            .collect()
    }

    #[test]
    fn test_config_presets() {
        let heightfield = PipelineConfig::heightfield();
        assert_eq!(heightfield.strategy, MeshingStrategy::Filtered);
        assert_eq!(heightfield.mesher.projection, ProjectionMethod::XZ);

        let closed = PipelineConfig::closed_surface();
        assert_eq!(closed.strategy, MeshingStrategy::Reconstruction);
        assert_eq!(closed.poisson, PoissonParams::default());

        let config = PipelineConfig::default().with_k(8).with_viewpoint(Point3d::new(1.0, 2.0, 3.0));
        assert_eq!(config.k, 8);
        assert_eq!(config.viewpoint(), Point3d::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_heightfield_pipeline() {
        let cloud = heightfield_cloud(1);
        let config = PipelineConfig::heightfield()
            .with_k(8)
            .with_mesher(MesherConfig::default().with_max_edge_length(0.3).with_min_interior_angle(15.0));
        let pipeline = SurfacePipeline::new(config);

        let output = pipeline.run(&cloud, &UnreachableEngine).unwrap();

        assert_eq!(output.normals.len(), cloud.len());
        assert!(output.normals.iter().all(|n| n.oriented && n.direction.y > 0.5));
        assert!(output.mesh.face_count() > 1000);
        assert_eq!(output.mesh.normals.as_ref().map(Vec::len), Some(cloud.len()));
        assert_eq!(output.stats.point_count, cloud.len());
        assert_eq!(output.stats.face_count, output.mesh.face_count());
        assert_eq!(output.stats.unreached_points, 0);
    }

    #[test]
    fn test_reconstruction_strategy_uses_engine() {
        let cloud = heightfield_cloud(2);
        let pipeline = SurfacePipeline::new(PipelineConfig::closed_surface().with_k(6));

        let output = pipeline.run(&cloud, &FirstTriangleEngine).unwrap();
        assert_eq!(output.mesh.vertex_count(), 3);
        assert_eq!(output.mesh.faces, vec![[0, 1, 2]]);

        let err = pipeline.run(&cloud, &UnreachableEngine).unwrap_err();
        assert!(matches!(err, Error::ReconstructionFailed(_)));
    }

    #[test]
    fn test_stage_events_in_order() {
        let cloud = heightfield_cloud(3);
        let pipeline = SurfacePipeline::new(PipelineConfig::heightfield().with_k(6));

        let mut events = Vec::new();
        pipeline
            .run_observed(&cloud, &UnreachableEngine, &mut |event| {
                events.push(event);
                Ok(())
            })
            .unwrap();

        let stages = [Stage::BuildIndex, Stage::EstimateNormals, Stage::ResolveOrientation, Stage::Mesh];
        let expected: Vec<StageEvent> = stages
            .iter()
            .flat_map(|&s| [StageEvent::Started(s), StageEvent::Completed(s)])
            .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn test_observer_error_abandons_run() {
        let cloud = heightfield_cloud(4);
        let pipeline = SurfacePipeline::new(PipelineConfig::heightfield().with_k(6));

        let mut started = Vec::new();
        let result = pipeline.run_observed(&cloud, &UnreachableEngine, &mut |event| match event {
            StageEvent::Started(stage) => {
                started.push(stage);
                Ok(())
            }
            StageEvent::Completed(Stage::EstimateNormals) => Err(Error::Cancelled),
            StageEvent::Completed(_) => Ok(()),
        });

        assert_eq!(result.unwrap_err(), Error::Cancelled);
        assert_eq!(started, vec![Stage::BuildIndex, Stage::EstimateNormals]);
    }

    #[test]
    fn test_estimate_oriented_normals() {
        let cloud = heightfield_cloud(5);
        let pipeline = SurfacePipeline::new(PipelineConfig::heightfield().with_k(8).with_parallel(false));

        let oriented = pipeline.estimate_oriented_normals(&cloud).unwrap();
        assert!(oriented.orientation.is_complete());
        assert!(oriented.degenerate_points.is_empty());

        let seed = oriented.orientation.seed;
        let view = pipeline.config().viewpoint() - cloud.position(seed);
        assert!(oriented.normals[seed].direction.dot(&view) <= 0.0);
    }

    #[test]
    fn test_invalid_k() {
        let cloud = PointSet::from_positions(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 1.0),
        ]);
        let pipeline = SurfacePipeline::new(PipelineConfig::default().with_k(5));
        assert_eq!(
            pipeline.run(&cloud, &UnreachableEngine).unwrap_err(),
            Error::InvalidK { k: 5, point_count: 3 }
        );
    }
}
