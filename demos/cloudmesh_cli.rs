//! Mesh synthetic point clouds from the command line
//!
//! ```text
//! RUST_LOG=debug cloudmesh-cli heightfield --points 20000 --max-edge 0.2
//! cloudmesh-cli sphere --points 5000 --depth 7
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use rand::prelude::*;

use cloudmesh_core::{Point3d, PointSet};
use cloudmesh_reconstruction::{
    JobOutcome, MesherConfig, PipelineConfig, PipelineWorker, PoissonEngine, PoissonParams, ProjectionMethod,
    StageEvent,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Neighbors per point for normal estimation and orientation
    #[clap(short, long, default_value_t = 16)]
    k: usize,

    /// Seed for the synthetic cloud
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// Run per-point loops on a single thread
    #[clap(long)]
    sequential: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Random terrain with Y up, meshed with the filtered Delaunay mesher
    Heightfield {
        #[clap(short, long, default_value_t = 10_000)]
        points: usize,

        /// Longest allowed triangle edge
        #[clap(long, default_value_t = 0.25)]
        max_edge: f64,

        /// Smallest allowed interior angle, in degrees
        #[clap(long, default_value_t = 10.0)]
        min_angle: f64,

        /// Pick the projection from the cloud's extent instead of dropping Y
        #[clap(long)]
        auto_projection: bool,
    },

    /// Noisy sphere, meshed by Poisson reconstruction
    Sphere {
        #[clap(short, long, default_value_t = 5_000)]
        points: usize,

        /// Octree depth
        #[clap(short, long, default_value_t = 7)]
        depth: u32,

        #[clap(long, default_value_t = 1.5)]
        samples_per_node: f32,
    },
}

fn terrain(count: usize, rng: &mut StdRng) -> PointSet {
    (0..count)
        .map(|_| {
            let x: f64 = rng.gen_range(-5.0..5.0);
            let z: f64 = rng.gen_range(-5.0..5.0);
            let y = 0.5 * (x * 0.8).sin() * (z * 0.6).cos() + rng.gen_range(-0.005..0.005);
            Point3d::new(x, y, z)
        })
        .collect()
}

fn sphere(count: usize, rng: &mut StdRng) -> PointSet {
    (0..count)
        .map(|_| {
            let z: f64 = rng.gen_range(-1.0..1.0);
            let theta: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            let radius = 1.0 + rng.gen_range(-0.002..0.002);
            Point3d::new(radius * r * theta.cos(), radius * r * theta.sin(), radius * z)
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let (points, config) = match args.cmd {
        Command::Heightfield {
            points,
            max_edge,
            min_angle,
            auto_projection,
        } => {
            let cloud = terrain(points, &mut rng);
            let projection = if auto_projection {
                cloudmesh_reconstruction::auto_select_projection(&cloud)
            } else {
                ProjectionMethod::XZ
            };
            let mesher = MesherConfig::default()
                .with_projection(projection)
                .with_max_edge_length(max_edge)
                .with_min_interior_angle(min_angle);
            (cloud, PipelineConfig::heightfield().with_mesher(mesher))
        }
        Command::Sphere {
            points,
            depth,
            samples_per_node,
        } => {
            let poisson = PoissonParams::default()
                .with_octree_depth(depth)
                .with_samples_per_node(samples_per_node);
            (sphere(points, &mut rng), PipelineConfig::closed_surface().with_poisson(poisson))
        }
    };
    let config = config.with_k(args.k).with_parallel(!args.sequential);

    info!("Meshing {} points with k = {}", points.len(), config.k);
    let worker = PipelineWorker::spawn(config, Arc::new(PoissonEngine::new()))?;

    let start = Instant::now();
    let handle = worker.submit(Arc::new(points))?;
    for event in handle.events().iter() {
        match event {
            StageEvent::Started(stage) => info!("{}...", stage.name()),
            StageEvent::Completed(stage) => info!("{} done after {:?}", stage.name(), start.elapsed()),
        }
    }

    match handle.wait() {
        JobOutcome::Ok(output) => {
            let stats = &output.stats;
            println!("points:              {}", stats.point_count);
            println!("degenerate normals:  {}", stats.degenerate_normals);
            println!("unreached by BFS:    {}", stats.unreached_points);
            println!("mesh:                {} vertices, {} faces", stats.vertex_count, stats.face_count);
            println!("total stage time:    {:?}", stats.total_time());
            Ok(())
        }
        JobOutcome::Err(e) => bail!("pipeline failed: {}", e),
        JobOutcome::Cancelled => bail!("pipeline was cancelled"),
    }
}
