//! Normal orientation by sign propagation over the k-nearest-neighbor graph
//!
//! Starting from a seed point, a breadth-first traversal visits the k nearest
//! neighbors of every reached point and flips each newly discovered normal
//! that disagrees with the normal it was discovered from. The whole field is
//! then flipped once, if needed, so that the seed's normal does not point
//! towards the reference viewpoint.
//!
//! Only one traversal is run. When the neighbor graph is disconnected, points
//! outside the seed's component keep the sign they were estimated with; they
//! are listed in [`OrientationReport::unreached`], and
//! [`neighbor_graph_components`] lets callers check connectivity up front.

use cloudmesh_core::{Error, NearestNeighborSearch, Normal, Point3d, PointSet, Query, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Configuration for orientation propagation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationConfig {
    /// Neighbors per point defining the traversal graph
    pub k: usize,
    /// Point the traversal starts from and the viewpoint test is applied to
    pub seed: usize,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self { k: 20, seed: 0 }
    }
}

impl OrientationConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_seed(mut self, seed: usize) -> Self {
        self.seed = seed;
        self
    }
}

/// What the traversal reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationReport {
    pub seed: usize,
    /// Number of points reached from the seed, the seed included
    pub visited: usize,
    /// Points whose sign was left as estimated
    pub unreached: Vec<usize>,
    /// For every reached point but the seed, the point it was discovered from
    pub traversal_parent: Vec<Option<usize>>,
    /// Whether the final viewpoint test negated the whole field
    pub globally_flipped: bool,
}

impl OrientationReport {
    pub fn is_complete(&self) -> bool {
        self.unreached.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrientedNormals {
    pub normals: Vec<Normal>,
    pub report: OrientationReport,
}

/// Orient normals consistently, seeding from point 0
pub fn resolve_orientation<S>(
    normals: &[Normal],
    index: &S,
    points: &PointSet,
    viewpoint: Point3d,
    k: usize,
) -> Result<Vec<Normal>>
where
    S: NearestNeighborSearch,
{
    let config = OrientationConfig::default().with_k(k);
    resolve_orientation_with_config(normals, index, points, viewpoint, &config).map(|o| o.normals)
}

/// Orient normals consistently and report the traversal.
///
/// `normals` is left untouched; a new, fully oriented field is returned.
pub fn resolve_orientation_with_config<S>(
    normals: &[Normal],
    index: &S,
    points: &PointSet,
    viewpoint: Point3d,
    config: &OrientationConfig,
) -> Result<OrientedNormals>
where
    S: NearestNeighborSearch,
{
    let count = points.len();
    if normals.len() != count || index.len() != count {
        return Err(Error::InvalidData(format!(
            "{} normals, {} indexed points and {} points do not match",
            normals.len(),
            index.len(),
            count
        )));
    }
    if let Some((id, normal)) = normals.iter().enumerate().find(|(id, n)| n.point_id != *id) {
        return Err(Error::InvalidData(format!(
            "normal at position {} belongs to point {}",
            id, normal.point_id
        )));
    }
    let k = config.k;
    if k < 1 || k >= count {
        return Err(Error::InvalidK { k, point_count: count });
    }
    let seed = config.seed;
    if seed >= count {
        return Err(Error::InvalidData(format!("seed {} is not one of {} points", seed, count)));
    }

    let mut directions: Vec<_> = normals.iter().map(|n| n.direction).collect();
    let mut visited = vec![false; count];
    let mut parent = vec![None; count];
    let mut queue = VecDeque::new();

    visited[seed] = true;
    queue.push_back(seed);
    let mut visited_count = 1;

    while let Some(current) = queue.pop_front() {
        let current_direction = directions[current];
        let neighbors = index.k_nearest(Query::Member(current), k)?;

        for neighbor in neighbors.ids() {
            if visited[neighbor] {
                continue;
            }
            visited[neighbor] = true;
            visited_count += 1;
            parent[neighbor] = Some(current);

            if current_direction.dot(&directions[neighbor]) < 0.0 {
                directions[neighbor] = -directions[neighbor];
            }
            queue.push_back(neighbor);
        }
    }

    let view = viewpoint - points.position(seed);
    let globally_flipped = directions[seed].dot(&view) > 0.0;
    if globally_flipped {
        directions.iter_mut().for_each(|d| *d = -*d);
    }

    let unreached: Vec<usize> = (0..count).filter(|&id| !visited[id]).collect();
    if !unreached.is_empty() {
        log::warn!(
            "Orientation reached {} of {} points from seed {}; {} keep their estimated sign",
            visited_count,
            count,
            seed,
            unreached.len()
        );
    }
    log::debug!("Oriented {} normals (global flip: {})", count, globally_flipped);

    let normals = normals
        .iter()
        .zip(directions)
        .map(|(normal, direction)| Normal {
            direction,
            ..*normal
        }
        .into_oriented())
        .collect();

    Ok(OrientedNormals {
        normals,
        report: OrientationReport {
            seed,
            visited: visited_count,
            unreached,
            traversal_parent: parent,
            globally_flipped,
        },
    })
}

/// Connected components of the k-nearest-neighbor graph, edges taken as
/// undirected. Components are listed by smallest member, members ascending.
pub fn neighbor_graph_components<S>(index: &S, k: usize) -> Result<Vec<Vec<usize>>>
where
    S: NearestNeighborSearch,
{
    let count = index.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); count];
    for id in 0..count {
        for neighbor in index.k_nearest(Query::Member(id), k)?.ids() {
            adjacency[id].push(neighbor);
            adjacency[neighbor].push(id);
        }
    }

    let mut component_of = vec![None; count];
    let mut components = Vec::new();
    for start in 0..count {
        if component_of[start].is_some() {
            continue;
        }
        let label = components.len();
        let mut members = vec![start];
        component_of[start] = Some(label);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for &next in &adjacency[current] {
                if component_of[next].is_none() {
                    component_of[next] = Some(label);
                    members.push(next);
                    queue.push_back(next);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    Ok(components)
}
