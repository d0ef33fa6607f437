//! Normal Estimation Example
//!
//! Estimates and orients normals on a sphere and on two separated spheres,
//! showing what the orientation report says when the neighbor graph is
//! disconnected.

use cloudmesh_algorithms::{
    estimate_normals_with_config, neighbor_graph_components, resolve_orientation_with_config, BruteForceSearch,
    KdTree, NormalConfig, OrientationConfig,
};
use cloudmesh_core::{NearestNeighborSearch, Point3d, PointSet, Query};
use std::time::Instant;

fn sphere(count: usize, center: Point3d) -> Vec<Point3d> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f64;
            Point3d::new(center.x + r * theta.cos(), center.y + y, center.z + r * theta.sin())
        })
        .collect()
}

fn outward_fraction(cloud: &PointSet, normals: &[cloudmesh_core::Normal], center: Point3d, ids: std::ops::Range<usize>) -> f64 {
    let total = ids.len();
    let outward = ids
        .filter(|&id| normals[id].direction.dot(&(cloud.position(id) - center)) > 0.0)
        .count();
    outward as f64 / total as f64
}

fn main() -> cloudmesh_core::Result<()> {
    println!("Normal Estimation Example");
    println!("=========================");

    let k = 12;
    let cloud = PointSet::from_positions(sphere(5000, Point3d::origin()));
    println!("Created sphere with {} points", cloud.len());

    // 1. Index
    let start = Instant::now();
    let tree = KdTree::build(&cloud)?;
    println!("\n1. Built KD-tree in {:?}", start.elapsed());

    let brute = BruteForceSearch::new(&cloud)?;
    let query = Query::Position(Point3d::new(0.0, 1.2, 0.0));
    let same = tree.k_nearest(query, k)? == brute.k_nearest(query, k)?;
    println!("   KD-tree agrees with brute force: {}", same);

    // 2. Estimate
    let start = Instant::now();
    let estimation = estimate_normals_with_config(&tree, &cloud, &NormalConfig::default().with_k(k))?;
    println!("\n2. Estimated {} normals in {:?}", estimation.normals.len(), start.elapsed());
    println!("   Degenerate neighborhoods: {}", estimation.degenerate_points.len());
    println!(
        "   Outward before orientation: {:.1}%",
        100.0 * outward_fraction(&cloud, &estimation.normals, Point3d::origin(), 0..cloud.len())
    );

    // 3. Orient, viewing from the center so normals point outward
    let start = Instant::now();
    let oriented = resolve_orientation_with_config(
        &estimation.normals,
        &tree,
        &cloud,
        Point3d::origin(),
        &OrientationConfig::default().with_k(k),
    )?;
    println!("\n3. Oriented normals in {:?}", start.elapsed());
    println!(
        "   Outward after orientation: {:.1}%",
        100.0 * outward_fraction(&cloud, &oriented.normals, Point3d::origin(), 0..cloud.len())
    );

    // 4. Two clusters: only the seed's cluster is oriented
    let second_center = Point3d::new(20.0, 0.0, 0.0);
    let mut positions = sphere(2000, Point3d::origin());
    positions.extend(sphere(2000, second_center));
    let clusters = PointSet::from_positions(positions);
    let tree = KdTree::build(&clusters)?;
    let components = neighbor_graph_components(&tree, k)?;
    let estimation = estimate_normals_with_config(&tree, &clusters, &NormalConfig::default().with_k(k))?;
    let oriented = resolve_orientation_with_config(
        &estimation.normals,
        &tree,
        &clusters,
        Point3d::origin(),
        &OrientationConfig::default().with_k(k),
    )?;

    println!("\n4. Two separated spheres");
    println!("   Neighbor graph components: {}", components.len());
    println!(
        "   Reached {} of {} points, {} left as estimated",
        oriented.report.visited,
        clusters.len(),
        oriented.report.unreached.len()
    );
    println!(
        "   Outward: first sphere {:.1}%, second sphere {:.1}%",
        100.0 * outward_fraction(&clusters, &oriented.normals, Point3d::origin(), 0..2000),
        100.0 * outward_fraction(&clusters, &oriented.normals, second_center, 2000..4000)
    );

    Ok(())
}
