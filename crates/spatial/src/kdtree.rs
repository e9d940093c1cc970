use kiddo::float::distance::SquaredEuclidean;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use lumgraph_core::PointCloud;
use std::num::NonZero;

/// A KdTree over the points of one scan.
///
/// Built on kiddo v5's `ImmutableKdTree`, which uses a cache-optimized
/// layout for faster queries than the mutable variant. The tree is built once
/// per target cloud and then queried for every source point, so the build
/// cost is amortised over a whole correspondence pass.
///
/// Non-finite points are left out of the tree so they can never be matched;
/// returned indices always refer to the original PointCloud.
#[derive(Debug, Clone)]
pub struct KdTree {
    tree: ImmutableKdTree<f32, u32, 3, 32>,
    /// Tree slot -> cloud index. `None` when every point was finite.
    index_map: Option<Vec<usize>>,
    num_points: usize,
}

/// A single nearest-neighbour hit: index into the indexed cloud and the
/// Euclidean (not squared) distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

impl KdTree {
    /// Build a KdTree from a PointCloud.
    pub fn build(cloud: &PointCloud) -> Self {
        let mut points: Vec<[f32; 3]> = Vec::with_capacity(cloud.len());
        let mut kept: Vec<usize> = Vec::with_capacity(cloud.len());
        for (i, p) in cloud.iter_points().enumerate() {
            if p.iter().all(|v| v.is_finite()) {
                points.push(p);
                kept.push(i);
            }
        }

        let index_map = if kept.len() == cloud.len() {
            None
        } else {
            Some(kept)
        };

        Self {
            tree: ImmutableKdTree::new_from_slice(&points),
            index_map,
            num_points: points.len(),
        }
    }

    /// Returns the number of indexed (finite) points.
    pub fn len(&self) -> usize {
        self.num_points
    }

    /// Returns true if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// Find the `k` nearest neighbours to `query`, sorted by ascending
    /// Euclidean distance.
    ///
    /// Edge cases:
    /// - Returns empty if `k == 0`, the tree is empty, or query contains NaN.
    /// - If `k > len()`, returns all points.
    pub fn knn(&self, query: &[f32; 3], k: usize) -> Vec<Neighbor> {
        if self.is_empty() || !query.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }
        let Some(nz_k) = NonZero::new(k) else {
            return Vec::new();
        };

        self.tree
            .nearest_n::<SquaredEuclidean>(query, nz_k)
            .into_iter()
            .map(|nn| Neighbor {
                index: self.cloud_index(nn.item),
                distance: nn.distance.sqrt(),
            })
            .collect()
    }

    /// Nearest neighbour of `query`, if any.
    pub fn nearest(&self, query: &[f32; 3]) -> Option<Neighbor> {
        self.knn(query, 1).into_iter().next()
    }

    fn cloud_index(&self, item: u32) -> usize {
        let slot = item as usize;
        match &self.index_map {
            Some(map) => map[slot],
            None => slot,
        }
    }
}
