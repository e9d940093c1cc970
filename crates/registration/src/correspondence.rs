use lumgraph_core::PointCloud;
use lumgraph_spatial::KdTree;

/// A putative match between a source point and a target point believed to be
/// the same physical surface point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source_index: usize,
    pub target_index: usize,
    pub distance: f32,
}

/// Nearest-neighbour correspondence estimation between two scans.
///
/// Stateless apart from its threshold, so a single estimator can be shared
/// across threads and used for many cloud pairs at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceEstimator {
    pub max_distance: f32,
}

impl CorrespondenceEstimator {
    pub fn new(max_distance: f32) -> Self {
        Self { max_distance }
    }

    /// Match every source point to its nearest target point within
    /// `max_distance`. Builds one KdTree over `target` per call.
    ///
    /// Empty clouds give an empty result, never an error.
    pub fn estimate(&self, source: &PointCloud, target: &PointCloud) -> Vec<Correspondence> {
        if source.is_empty() || target.is_empty() {
            return Vec::new();
        }
        let tree = KdTree::build(target);
        find_correspondences(source, &tree, self.max_distance)
    }
}

impl Default for CorrespondenceEstimator {
    fn default() -> Self {
        Self::new(f32::INFINITY)
    }
}

/// Find correspondences between source points and the nearest points in the
/// target cloud (represented by its KdTree).
///
/// For each point in `source`, the nearest neighbor in `target_tree` is found.
/// Only correspondences with distance <= `max_distance` are returned, so each
/// source point appears at most once.
pub fn find_correspondences(
    source: &PointCloud,
    target_tree: &KdTree,
    max_distance: f32,
) -> Vec<Correspondence> {
    let mut correspondences = Vec::with_capacity(source.len());

    for (i, query) in source.iter_points().enumerate() {
        let Some(hit) = target_tree.nearest(&query) else {
            continue;
        };
        if hit.distance <= max_distance {
            correspondences.push(Correspondence {
                source_index: i,
                target_index: hit.index,
                distance: hit.distance,
            });
        }
    }

    correspondences
}
