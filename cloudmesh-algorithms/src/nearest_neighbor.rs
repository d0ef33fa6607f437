//! Nearest neighbor search implementations

use cloudmesh_core::{
    Error, NearestNeighborSearch, Neighbor, NeighborResult, Point3d, PointSet, Query, Result,
};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Minimum number of points an index can be built over
pub const MIN_INDEX_POINTS: usize = 2;

/// Balanced KD-tree for k-nearest neighbor queries.
///
/// The tree is stored implicitly: `order` is a permutation of point ids such
/// that, for every subtree occupying `order[lo..hi]`, the splitting point sits
/// at `mid = (lo + hi) / 2`, smaller coordinates on the split axis live in
/// `lo..mid` and the rest in `mid + 1..hi`. Split axes cycle x, y, z with depth.
#[derive(Debug, Clone)]
pub struct KdTree {
    positions: Vec<Point3d>,
    order: Vec<usize>,
}

impl KdTree {
    /// Build a tree over every point of `points`
    pub fn build(points: &PointSet) -> Result<Self> {
        Self::from_positions(points.positions())
    }

    /// Build a tree over a slice of positions, ids being slice indices
    pub fn from_positions(positions: &[Point3d]) -> Result<Self> {
        check_positions(positions)?;

        let positions = positions.to_vec();
        let mut order: Vec<usize> = (0..positions.len()).collect();
        build_subtree(&mut order, &positions, 0);

        Ok(Self { positions, order })
    }

    fn search(&self, lo: usize, hi: usize, depth: usize, target: &Point3d, heap: &mut CandidateHeap) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let id = self.order[mid];
        let pivot = &self.positions[id];

        heap.offer(id, (pivot - target).norm_squared());

        let axis = depth % 3;
        let diff = target[axis] - pivot[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };

        self.search(near.0, near.1, depth + 1, target, heap);
        // `<=` keeps equidistant points with smaller ids reachable
        if heap.accepts(diff * diff) {
            self.search(far.0, far.1, depth + 1, target, heap);
        }
    }
}

impl NearestNeighborSearch for KdTree {
    fn len(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, id: usize) -> Option<Point3d> {
        self.positions.get(id).copied()
    }

    fn k_nearest(&self, query: Query, k: usize) -> Result<NeighborResult> {
        let (target, exclude) = resolve_query(&self.positions, query, k)?;

        let mut heap = CandidateHeap::new(k, exclude);
        self.search(0, self.order.len(), 0, &target, &mut heap);
        Ok(heap.into_result())
    }
}

/// Simple brute force nearest neighbor search for small datasets
#[derive(Debug, Clone)]
pub struct BruteForceSearch {
    positions: Vec<Point3d>,
}

impl BruteForceSearch {
    pub fn new(points: &PointSet) -> Result<Self> {
        check_positions(points.positions())?;
        Ok(Self {
            positions: points.positions().to_vec(),
        })
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn len(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, id: usize) -> Option<Point3d> {
        self.positions.get(id).copied()
    }

    fn k_nearest(&self, query: Query, k: usize) -> Result<NeighborResult> {
        let (target, exclude) = resolve_query(&self.positions, query, k)?;

        let mut distances: Vec<Neighbor> = self
            .positions
            .iter()
            .enumerate()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(id, point)| Neighbor {
                id,
                squared_distance: (point - target).norm_squared(),
            })
            .collect();

        // Sort by distance and take k nearest
        distances.sort_by(compare_neighbors);
        distances.truncate(k);
        Ok(NeighborResult::from_sorted(distances))
    }
}

fn check_positions(positions: &[Point3d]) -> Result<()> {
    if positions.len() < MIN_INDEX_POINTS {
        return Err(Error::InsufficientPoints {
            required: MIN_INDEX_POINTS,
            actual: positions.len(),
        });
    }
    if let Some(id) = positions.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
        return Err(Error::InvalidData(format!("point {} has a non-finite coordinate", id)));
    }
    Ok(())
}

/// Validate `k` and turn a query into a target position plus the id to skip
fn resolve_query(positions: &[Point3d], query: Query, k: usize) -> Result<(Point3d, Option<usize>)> {
    let point_count = positions.len();
    if k < 1 || k >= point_count {
        return Err(Error::InvalidK { k, point_count });
    }

    match query {
        Query::Member(id) => {
            let target = positions.get(id).copied().ok_or_else(|| {
                Error::InvalidData(format!("query point {} is not in an index of {} points", id, point_count))
            })?;
            Ok((target, Some(id)))
        }
        Query::Position(target) => Ok((target, None)),
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.squared_distance
        .total_cmp(&b.squared_distance)
        .then(a.id.cmp(&b.id))
}

fn build_subtree(order: &mut [usize], positions: &[Point3d], depth: usize) {
    if order.len() <= 1 {
        return;
    }
    let axis = depth % 3;
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        positions[a][axis]
            .total_cmp(&positions[b][axis])
            .then(a.cmp(&b))
    });

    let (left, rest) = order.split_at_mut(mid);
    build_subtree(left, positions, depth + 1);
    build_subtree(&mut rest[1..], positions, depth + 1);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate(Neighbor);

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_neighbors(&self.0, &other.0)
    }
}

/// Bounded max-heap holding the best `k` candidates seen so far
struct CandidateHeap {
    k: usize,
    exclude: Option<usize>,
    heap: BinaryHeap<Candidate>,
}

impl CandidateHeap {
    fn new(k: usize, exclude: Option<usize>) -> Self {
        Self {
            k,
            exclude,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    fn offer(&mut self, id: usize, squared_distance: f64) {
        if Some(id) == self.exclude {
            return;
        }
        let candidate = Candidate(Neighbor { id, squared_distance });
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Whether a subtree at this squared distance may still hold a better candidate
    fn accepts(&self, squared_distance: f64) -> bool {
        match self.heap.peek() {
            Some(worst) if self.heap.len() >= self.k => squared_distance <= worst.0.squared_distance,
            _ => true,
        }
    }

    fn into_result(self) -> NeighborResult {
        let neighbors = self.heap.into_sorted_vec().into_iter().map(|c| c.0).collect();
        NeighborResult::from_sorted(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn random_cloud(count: usize, seed: u64) -> PointSet {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| Point3d::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    #[test]
    fn test_build_requires_two_points() {
        let one = PointSet::from_positions(vec![Point3d::origin()]);
        assert_eq!(
            KdTree::build(&one).unwrap_err(),
            Error::InsufficientPoints { required: 2, actual: 1 }
        );
        assert!(KdTree::build(&PointSet::from_positions(Vec::new())).is_err());
    }

    #[test]
    fn test_build_rejects_non_finite() {
        let set = PointSet::from_positions(vec![Point3d::origin(), Point3d::new(f64::NAN, 0.0, 0.0)]);
        assert!(matches!(KdTree::build(&set), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_invalid_k() {
        let set = PointSet::from_positions(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
        ]);
        let tree = KdTree::build(&set).unwrap();

        assert_eq!(
            tree.k_nearest(Query::Member(0), 5).unwrap_err(),
            Error::InvalidK { k: 5, point_count: 3 }
        );
        assert!(matches!(tree.k_nearest(Query::Member(0), 0), Err(Error::InvalidK { .. })));
        assert!(matches!(tree.k_nearest(Query::Member(0), 3), Err(Error::InvalidK { .. })));
        assert!(matches!(tree.k_nearest(Query::Member(7), 1), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_member_query_excludes_itself() {
        let set = PointSet::from_positions(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(3.0, 0.0, 0.0),
            Point3d::new(6.0, 0.0, 0.0),
        ]);
        let tree = KdTree::build(&set).unwrap();

        let result = tree.k_nearest(Query::Member(1), 2).unwrap();
        assert_eq!(result.ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(result.as_slice()[0].squared_distance, 1.0);
        assert_eq!(result.as_slice()[1].squared_distance, 4.0);

        let result = tree.k_nearest(Query::Position(Point3d::new(1.0, 0.0, 0.0)), 2).unwrap();
        assert_eq!(result.ids().collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        // Four points equidistant from the center query
        let set = PointSet::from_positions(vec![
            Point3d::new(0.0, 1.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, -1.0, 0.0),
            Point3d::new(-1.0, 0.0, 0.0),
            Point3d::new(0.0, 0.0, 0.0),
        ]);
        let tree = KdTree::build(&set).unwrap();

        let result = tree.k_nearest(Query::Member(4), 3).unwrap();
        assert_eq!(result.ids().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_matches_brute_force() {
        let set = random_cloud(500, 7);
        let tree = KdTree::build(&set).unwrap();
        let brute = BruteForceSearch::new(&set).unwrap();

        for id in (0..set.len()).step_by(13) {
            for k in [1, 4, 16] {
                let fast = tree.k_nearest(Query::Member(id), k).unwrap();
                let slow = brute.k_nearest(Query::Member(id), k).unwrap();
                assert_eq!(fast, slow, "query {} with k = {}", id, k);
                assert_eq!(fast.len(), k);
            }
        }

        let target = Point3d::new(0.1, -0.2, 0.3);
        assert_eq!(
            tree.k_nearest(Query::Position(target), 10).unwrap(),
            brute.k_nearest(Query::Position(target), 10).unwrap()
        );
    }

    #[test]
    fn test_duplicate_points() {
        let set = PointSet::from_positions(vec![Point3d::new(1.0, 1.0, 1.0); 6]);
        let tree = KdTree::build(&set).unwrap();

        let result = tree.k_nearest(Query::Member(2), 5).unwrap();
        assert_eq!(result.ids().collect::<Vec<_>>(), vec![0, 1, 3, 4, 5]);
        assert!(result.iter().all(|n| n.squared_distance == 0.0));
    }

    #[test]
    fn test_queries_are_deterministic() {
        let set = random_cloud(200, 42);
        let tree = KdTree::build(&set).unwrap();
        let rebuilt = KdTree::build(&set).unwrap();

        let first = tree.k_nearest(Query::Member(17), 8).unwrap();
        assert_eq!(first, tree.k_nearest(Query::Member(17), 8).unwrap());
        assert_eq!(first, rebuilt.k_nearest(Query::Member(17), 8).unwrap());
    }
}
