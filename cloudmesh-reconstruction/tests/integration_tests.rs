//! Integration tests for cloudmesh-reconstruction
//!
//! These tests run the analysis stages from cloudmesh-algorithms and the
//! meshing strategies together on synthetic clouds.

use approx::assert_relative_eq;
use cloudmesh_algorithms::{
    estimate_normals, neighbor_graph_components, resolve_orientation_with_config, KdTree, OrientationConfig,
};
use cloudmesh_core::{Error, NearestNeighborSearch, Point3d, PointSet, Query, Triangle};
use cloudmesh_reconstruction::*;
use rand::prelude::*;
use std::sync::Arc;

/// Unit square in the XY plane plus its center
fn create_test_square() -> PointSet {
    PointSet::from_positions(vec![
        Point3d::new(0.0, 0.0, 0.0),
        Point3d::new(1.0, 0.0, 0.0),
        Point3d::new(1.0, 1.0, 0.0),
        Point3d::new(0.0, 1.0, 0.0),
        Point3d::new(0.5, 0.5, 0.0),
    ])
}

/// Noisy terrain with Y up
fn create_terrain(count: usize, seed: u64) -> PointSet {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x: f64 = rng.gen_range(-2.0..2.0);
            let z: f64 = rng.gen_range(-2.0..2.0);
            let y = 0.2 * (x * 1.5).sin() * (z * 0.8).cos() + rng.gen_range(-0.002..0.002);
            Point3d::new(x, y, z)
        })
        .collect()
}

/// Fibonacci sphere
fn create_sphere(radius: f64, count: usize, center: Point3d) -> Vec<Point3d> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f64;
            center + radius * nalgebra::Vector3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect()
}

#[test]
fn test_square_with_center_gives_four_triangles() {
    let config = MesherConfig::default()
        .with_projection(ProjectionMethod::XY)
        .with_max_edge_length(2.0)
        .with_min_interior_angle(10.0);

    let mesh = filtered_mesh_with_config(&create_test_square(), &config).unwrap();

    assert_eq!(mesh.face_count(), 4);
    assert!(mesh.faces.iter().all(|face| face.contains(&4)));
}

#[test]
fn test_terrain_normals_are_unit_and_oriented() {
    let cloud = create_terrain(1500, 11);
    let pipeline = SurfacePipeline::new(PipelineConfig::heightfield().with_k(12));

    let oriented = pipeline.estimate_oriented_normals(&cloud).unwrap();

    assert_eq!(oriented.normals.len(), cloud.len());
    for (id, normal) in oriented.normals.iter().enumerate() {
        assert_eq!(normal.point_id, id);
        assert!(normal.oriented);
        assert_relative_eq!(normal.direction.norm(), 1.0, epsilon = 1e-6);
        assert!(normal.direction.y > 0.0, "normal {} points down: {:?}", id, normal.direction);
    }

    // Every traversal edge joins agreeing normals
    for (id, parent) in oriented.orientation.traversal_parent.iter().enumerate() {
        if let Some(parent) = parent {
            assert!(oriented.normals[id].dot(&oriented.normals[*parent]) >= 0.0);
        }
    }
}

#[test]
fn test_filtered_mesh_respects_thresholds() {
    let cloud = create_terrain(3000, 12);
    let config = PipelineConfig::heightfield()
        .with_k(10)
        .with_mesher(MesherConfig::default().with_max_edge_length(0.2).with_min_interior_angle(20.0));

    let output = SurfacePipeline::new(config).run(&cloud, &PoissonEngine::new()).unwrap();

    assert!(output.mesh.validate().is_ok());
    assert!(output.mesh.face_count() > 0);
    for face in &output.mesh.faces {
        let triangle = Triangle::new(face[0], face[1], face[2], &output.mesh.vertices).unwrap();
        assert!(triangle.longest_edge() <= 0.2);
        assert!(triangle.min_angle_degrees() > 20.0);
    }

    let buffer = output.mesh.index_buffer();
    assert_eq!(buffer.len(), output.mesh.face_count() * 3);
    assert!(buffer.iter().all(|&i| (i as usize) < cloud.len()));
}

#[test]
fn test_disjoint_clusters_are_consistent_internally() {
    let mut positions = create_sphere(1.0, 300, Point3d::origin());
    positions.extend(create_sphere(1.0, 300, Point3d::new(50.0, 0.0, 0.0)));
    let cloud = PointSet::from_positions(positions);
    let tree = KdTree::build(&cloud).unwrap();
    let k = 8;

    let components = neighbor_graph_components(&tree, k).unwrap();
    assert_eq!(components.len(), 2);

    let normals = estimate_normals(&tree, &cloud, k).unwrap();
    let oriented = resolve_orientation_with_config(
        &normals,
        &tree,
        &cloud,
        Point3d::origin(),
        &OrientationConfig::default().with_k(k),
    )
    .unwrap();

    assert_eq!(oriented.report.visited, 300);
    assert_eq!(oriented.report.unreached, (300..600).collect::<Vec<_>>());

    // The seed's sphere is consistently outward; the other keeps its estimate up to the global flip
    for id in 0..300 {
        let outward = cloud.position(id).coords.normalize();
        assert!(oriented.normals[id].direction.dot(&outward) > 0.0);
    }
    let sign = if oriented.report.globally_flipped { -1.0 } else { 1.0 };
    for id in 300..600 {
        assert_eq!(oriented.normals[id].direction, normals[id].direction * sign);
    }
}

#[test]
fn test_gateway_through_pipeline_with_poisson_engine() {
    let cloud = PointSet::from_positions(create_sphere(1.0, 1000, Point3d::origin()));
    let config = PipelineConfig::closed_surface()
        .with_k(10)
        .with_poisson(PoissonParams::default().with_octree_depth(5));

    let output = SurfacePipeline::new(config).run(&cloud, &PoissonEngine::new()).unwrap();
    assert!(output.mesh.face_count() > 0);
    assert!(output.mesh.validate().is_ok());
    assert!(output.normals.iter().all(|n| n.direction.dot(&cloud.position(n.point_id).coords) > 0.0));
}

#[test]
fn test_worker_processes_independent_clouds() {
    let engine = Arc::new(PoissonEngine::new());
    let config = PipelineConfig::heightfield().with_k(8);
    let workers: Vec<PipelineWorker> = (0..2)
        .map(|_| PipelineWorker::spawn(config.clone(), engine.clone()).unwrap())
        .collect();

    let clouds: Vec<Arc<PointSet>> = (0..2).map(|i| Arc::new(create_terrain(800, 20 + i))).collect();
    let handles: Vec<JobHandle> = workers
        .iter()
        .zip(&clouds)
        .map(|(worker, cloud)| worker.submit(cloud.clone()).unwrap())
        .collect();

    for (handle, cloud) in handles.into_iter().zip(&clouds) {
        let output = handle.wait().into_result().unwrap();
        assert_eq!(output.mesh.vertex_count(), cloud.len());
    }
}

#[test]
fn test_k_larger_than_cloud() {
    let cloud = PointSet::from_positions(vec![
        Point3d::new(0.0, 0.0, 0.0),
        Point3d::new(1.0, 0.0, 0.0),
        Point3d::new(0.0, 1.0, 0.0),
    ]);
    let tree = KdTree::build(&cloud).unwrap();
    assert_eq!(
        tree.k_nearest(Query::Member(0), 5).unwrap_err(),
        Error::InvalidK { k: 5, point_count: 3 }
    );

    let pipeline = SurfacePipeline::new(PipelineConfig::default().with_k(5));
    assert!(matches!(pipeline.estimate_oriented_normals(&cloud), Err(Error::InvalidK { .. })));
}
