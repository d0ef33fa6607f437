use cloudmesh_algorithms::{estimate_normals, KdTree};
use cloudmesh_core::{NearestNeighborSearch, Point3d, PointSet, Query};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

const CLOUD_SIZES: [usize; 3] = [1_000, 10_000, 50_000];
const K: usize = 16;

fn random_cloud(count: usize) -> PointSet {
    let mut rng = StdRng::seed_from_u64(0);
    (0..count)
        .map(|_| Point3d::new(rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0), rng.gen_range(0.0..1.0)))
        .collect()
}

fn kd_tree(c: &mut Criterion) {
    let mut g = c.benchmark_group("kd tree");
    g.sample_size(10);

    for size in CLOUD_SIZES {
        let cloud = random_cloud(size);
        g.bench_with_input(BenchmarkId::new("build", size), &cloud, |b, cloud| {
            b.iter(|| KdTree::build(std::hint::black_box(cloud)).unwrap());
        });

        let tree = KdTree::build(&cloud).unwrap();
        g.bench_with_input(BenchmarkId::new("k nearest", size), &tree, |b, tree| {
            b.iter(|| {
                for id in (0..size).step_by(97) {
                    std::hint::black_box(tree.k_nearest(Query::Member(id), K).unwrap());
                }
            });
        });
    }

    g.finish();
}

fn normals(c: &mut Criterion) {
    let mut g = c.benchmark_group("normal estimation");
    g.sample_size(10);

    for size in CLOUD_SIZES {
        let cloud = random_cloud(size);
        let tree = KdTree::build(&cloud).unwrap();
        g.bench_with_input(BenchmarkId::from_parameter(size), &(&tree, &cloud), |b, &(tree, cloud)| {
            b.iter(|| estimate_normals(tree, cloud, K).unwrap());
        });
    }

    g.finish();
}

criterion_group!(benches, kd_tree, normals);
criterion_main!(benches);
