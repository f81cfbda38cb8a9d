//! 2D k-d tree for nearest-neighbour queries on pixel positions.
//!
//! Built once over the reference (simulated) source positions and queried
//! for every detected peak. Ties on distance resolve to the lower point
//! index so repeated queries always return the same neighbour.


use std::cmp::Ordering;

use nalgebra::Vector2;
use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur while querying a [`KdTree`]
#[derive(Error, Debug)]
pub enum KdTreeError {
    #[error("Failed to build a worker pool with {workers} threads: {source}")]
    WorkerPool {
        workers: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// Result of a nearest-neighbour query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the slice the tree was built from
    pub index: usize,
    /// Squared Euclidean distance to the query point
    pub distance_squared: f64,
}

impl Neighbor {
    /// Euclidean distance to the query point
    pub fn distance(&self) -> f64 {
        self.distance_squared.sqrt()
    }

    fn closer_than(&self, other: &Neighbor) -> bool {
        match self.distance_squared.total_cmp(&other.distance_squared) {
            Ordering::Less => true,
            Ordering::Equal => self.index < other.index,
            Ordering::Greater => false,
        }
    }
}

#[derive(Debug, Clone)]
struct KdNode {
    /// Index into the points array
    point_idx: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// Split dimension (0 = x, 1 = y)
    split_dim: usize,
}

/// A balanced 2D k-d tree over a fixed set of points.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<Vector2<f64>>,
}

impl KdTree {
    /// Build a tree from a list of points using median splits.
    ///
    /// Points with a non-finite coordinate are left out of the tree and are
    /// never returned by a query; indices still refer to `points`. Returns
    /// `None` when no finite point remains.
    pub fn build(points: &[Vector2<f64>]) -> Option<Self> {
        let mut indices: Vec<usize> = (0..points.len())
            .filter(|&i| points[i].iter().all(|c| c.is_finite()))
            .collect();
        if indices.is_empty() {
            return None;
        }

        let points = points.to_vec();
        let mut nodes = Vec::with_capacity(points.len());
        Self::build_recursive(&points, &mut indices, 0, &mut nodes);

        Some(Self { nodes, points })
    }

    fn build_recursive(
        points: &[Vector2<f64>],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let split_dim = depth % 2;
        indices.sort_by(|&a, &b| {
            points[a][split_dim]
                .total_cmp(&points[b][split_dim])
                .then(a.cmp(&b))
        });

        let median = indices.len() / 2;
        let node_idx = nodes.len();
        nodes.push(KdNode {
            point_idx: indices[median],
            left: None,
            right: None,
            split_dim,
        });

        let (left_indices, right_part) = indices.split_at_mut(median);
        let left = Self::build_recursive(points, left_indices, depth + 1, nodes);
        let right = Self::build_recursive(points, &mut right_part[1..], depth + 1, nodes);

        nodes[node_idx].left = left;
        nodes[node_idx].right = right;

        Some(node_idx)
    }

    /// Number of searchable (finite) points
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a point by index
    pub fn point(&self, idx: usize) -> Vector2<f64> {
        self.points[idx]
    }

    /// Find the closest point to `query`.
    pub fn nearest(&self, query: &Vector2<f64>) -> Neighbor {
        let mut best = Neighbor {
            index: usize::MAX,
            distance_squared: f64::INFINITY,
        };
        self.nearest_recursive(0, query, &mut best);
        best
    }

    fn nearest_recursive(&self, node_idx: usize, query: &Vector2<f64>, best: &mut Neighbor) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx];

        let candidate = Neighbor {
            index: node.point_idx,
            distance_squared: (query - point).norm_squared(),
        };
        if candidate.closer_than(best) {
            *best = candidate;
        }

        let diff = query[node.split_dim] - point[node.split_dim];
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(first_idx) = first {
            self.nearest_recursive(first_idx, query, best);
        }

        // `<=` keeps equal-distance points on the far side reachable for the index tie-break
        if let Some(second_idx) = second {
            if diff * diff <= best.distance_squared {
                self.nearest_recursive(second_idx, query, best);
            }
        }
    }

    /// Query the nearest neighbour of every point in `queries`.
    ///
    /// `workers` sizes a dedicated rayon pool for the query; `None` uses the
    /// global pool. Output order matches `queries` and does not depend on
    /// the number of workers.
    ///
    /// # Errors
    /// * `KdTreeError::WorkerPool` - if the dedicated pool cannot be created
    pub fn nearest_batch(
        &self,
        queries: &[Vector2<f64>],
        workers: Option<usize>,
    ) -> Result<Vec<Neighbor>, KdTreeError> {
        let run = || {
            queries
                .par_iter()
                .map(|query| self.nearest(query))
                .collect::<Vec<_>>()
        };

        match workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|source| KdTreeError::WorkerPool { workers, source })?;
                Ok(pool.install(run))
            }
            None => Ok(run()),
        }
    }

    /// Find all points within `radius` of `query`, sorted by distance.
    pub fn within_radius(&self, query: &Vector2<f64>, radius: f64) -> Vec<Neighbor> {
        let radius_sq = radius * radius;
        let mut results = Vec::new();
        self.radius_recursive(0, query, radius_sq, &mut results);
        results.sort_by(|a, b| {
            a.distance_squared
                .total_cmp(&b.distance_squared)
                .then(a.index.cmp(&b.index))
        });
        results
    }

    fn radius_recursive(
        &self,
        node_idx: usize,
        query: &Vector2<f64>,
        radius_sq: f64,
        results: &mut Vec<Neighbor>,
    ) {
        let node = &self.nodes[node_idx];
        let point = &self.points[node.point_idx];

        let dist_sq = (query - point).norm_squared();
        if dist_sq <= radius_sq {
            results.push(Neighbor {
                index: node.point_idx,
                distance_squared: dist_sq,
            });
        }

        let diff = query[node.split_dim] - point[node.split_dim];
        let diff_sq = diff * diff;

        if let Some(left_idx) = node.left {
            if diff <= 0.0 || diff_sq <= radius_sq {
                self.radius_recursive(left_idx, query, radius_sq, results);
            }
        }
        if let Some(right_idx) = node.right {
            if diff >= 0.0 || diff_sq <= radius_sq {
                self.radius_recursive(right_idx, query, radius_sq, results);
            }
        }
    }
}
