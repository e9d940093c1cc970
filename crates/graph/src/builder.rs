use log::{debug, info, warn};
use lumgraph_core::{PointCloud, Pose, ScanSet};
use lumgraph_registration::{align_pair, apply_transform};
use nalgebra::Isometry3;
use rayon::prelude::*;

use crate::config::CorrespondenceConfig;
use crate::error::GraphError;
use crate::graph::{EdgeKind, PoseGraph, PoseGraphEdge};
use crate::warning::{DegenerateEdgeWarning, RelaxationWarning};

/// A freshly built graph plus any degenerate-edge warnings raised while
/// estimating its edges.
#[derive(Debug, Clone)]
pub struct BuiltGraph {
    pub graph: PoseGraph,
    pub warnings: Vec<RelaxationWarning>,
}

/// Builds the closed-loop pose graph for an ordered scan set.
#[derive(Debug, Clone, Default)]
pub struct PoseGraphBuilder {
    config: CorrespondenceConfig,
}

impl PoseGraphBuilder {
    pub fn new(config: CorrespondenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrespondenceConfig {
        &self.config
    }

    /// `(source, target, kind)` for every edge of an `n`-scan loop: the
    /// sequential chain followed by the closing edge `n-1 -> 0`.
    pub fn edge_pairs(n: usize) -> Vec<(usize, usize, EdgeKind)> {
        if n < 2 {
            return Vec::new();
        }
        let mut pairs: Vec<_> = (0..n - 1)
            .map(|i| (i, i + 1, EdgeKind::Sequential))
            .collect();
        pairs.push((n - 1, 0, EdgeKind::LoopClosure));
        pairs
    }

    /// Estimate every edge and assemble the graph.
    ///
    /// Edges are estimated in parallel; the resulting edge order is always
    /// that of [`edge_pairs`](Self::edge_pairs).
    pub fn build(&self, scans: &ScanSet) -> Result<BuiltGraph, GraphError> {
        let n = scans.len();
        if n < 2 {
            return Err(GraphError::InsufficientScans { count: n });
        }

        info!(
            "building pose graph: {} scans, {} points, max correspondence distance {}",
            n,
            scans.total_points(),
            self.config.max_correspondence_distance
        );

        let world_poses: Vec<Isometry3<f64>> = scans.poses().iter().map(Pose::to_isometry).collect();
        let world_clouds: Vec<PointCloud> = scans
            .clouds()
            .par_iter()
            .zip(world_poses.par_iter())
            .map(|(cloud, pose)| apply_transform(cloud, pose))
            .collect();

        let edges: Vec<PoseGraphEdge> = Self::edge_pairs(n)
            .into_par_iter()
            .map(|(source, target, kind)| {
                self.estimate_edge(
                    source,
                    target,
                    kind,
                    (&world_clouds[source], &world_poses[source]),
                    (&world_clouds[target], &world_poses[target]),
                )
            })
            .collect();

        let mut graph = PoseGraph::new(scans.poses());
        let mut warnings = Vec::new();
        for edge in edges {
            if edge.degenerate {
                let w = DegenerateEdgeWarning {
                    source: edge.source,
                    target: edge.target,
                    kind: edge.kind,
                    correspondences: edge.correspondence_count,
                    min_required: self.config.min_correspondences,
                };
                warn!("{w}");
                warnings.push(RelaxationWarning::DegenerateEdge(w));
            }
            graph.add_edge(edge)?;
        }

        Ok(BuiltGraph { graph, warnings })
    }

    /// Estimate one edge from the two scans placed in the world frame by
    /// their initial poses.
    ///
    /// The alignment yields a world-frame correction `C` that moves the source
    /// scan onto the target scan; the measurement is then
    /// `T_src^-1 * C^-1 * T_tgt`.
    pub fn estimate_edge(
        &self,
        source: usize,
        target: usize,
        kind: EdgeKind,
        (source_cloud, source_pose): (&PointCloud, &Isometry3<f64>),
        (target_cloud, target_pose): (&PointCloud, &Isometry3<f64>),
    ) -> PoseGraphEdge {
        let alignment = align_pair(source_cloud, target_cloud, &self.config.alignment_params());
        let count = alignment.correspondences.len();
        let correction = alignment.transform;

        let measurement = source_pose.inverse() * correction.inverse() * target_pose;
        let (weight, degenerate) = information_weight(count, alignment.rmse, &self.config);

        debug!(
            "{kind} edge {source}->{target}: {count} correspondences, rmse {:.4e} -> {:.4e}, weight {:.4e}, {} rounds",
            alignment.initial_rmse, alignment.rmse, weight, alignment.iterations
        );

        PoseGraphEdge {
            correspondence_count: count,
            rmse: alignment.rmse,
            degenerate,
            ..PoseGraphEdge::new(source, target, kind, measurement, weight)
        }
    }
}

/// Information weight of an edge and whether it is degenerate.
///
/// The weight grows with the correspondence count and shrinks with the
/// residual scatter: `count / max(rmse^2, variance_floor)`. Edges below
/// `min_correspondences` are scaled by `degenerate_weight_scale`; an edge
/// without any correspondence carries no information at all.
pub fn information_weight(count: usize, rmse: f32, config: &CorrespondenceConfig) -> (f64, bool) {
    if count == 0 {
        return (0.0, true);
    }
    let variance = (rmse as f64).powi(2).max(config.variance_floor);
    let weight = count as f64 / variance;
    if count < config.min_correspondences {
        (weight * config.degenerate_weight_scale, true)
    } else {
        (weight, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lumgraph_core::PointXYZ;

    fn grid_cloud() -> PointCloud {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                for k in 0..3 {
                    let jitter = ((i * 17 + j * 5 + k) as f32 * 0.61).sin() * 0.04;
                    points.push(PointXYZ::new(
                        i as f32 + jitter,
                        j as f32 * 1.1 - jitter,
                        k as f32 * 0.9 + 0.5 * jitter,
                    ));
                }
            }
        }
        PointCloud::from_points(&points)
    }

    #[test]
    fn edge_pairs_form_a_loop() {
        assert_eq!(
            PoseGraphBuilder::edge_pairs(3),
            vec![
                (0, 1, EdgeKind::Sequential),
                (1, 2, EdgeKind::Sequential),
                (2, 0, EdgeKind::LoopClosure),
            ]
        );
        assert_eq!(
            PoseGraphBuilder::edge_pairs(2),
            vec![(0, 1, EdgeKind::Sequential), (1, 0, EdgeKind::LoopClosure)]
        );
        assert!(PoseGraphBuilder::edge_pairs(1).is_empty());
    }

    #[test]
    fn single_scan_is_rejected() {
        let scans: ScanSet = std::iter::once((grid_cloud(), Pose::identity())).collect();
        let err = PoseGraphBuilder::default().build(&scans).unwrap_err();
        assert_eq!(err, GraphError::InsufficientScans { count: 1 });
    }

    #[test]
    fn builds_n_nodes_and_n_edges() {
        let scans: ScanSet = (0..4).map(|_| (grid_cloud(), Pose::identity())).collect();
        let built = PoseGraphBuilder::default().build(&scans).unwrap();
        assert_eq!(built.graph.node_count(), 4);
        assert_eq!(built.graph.edge_count(), 4);
        assert!(built.warnings.is_empty());
        assert!(built.graph.is_connected());
        let closing = &built.graph.edges()[3];
        assert_eq!((closing.source, closing.target), (3, 0));
        assert_eq!(closing.kind, EdgeKind::LoopClosure);
    }

    #[test]
    fn measurement_is_relative_pose_when_scans_agree() {
        // Two scans of the same scene from different true poses.
        let scene = grid_cloud();
        let pose_a = Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let pose_b = Pose::new(0.4, -0.2, 0.0, 0.0, 0.0, 0.3);
        let local_b = apply_transform(&scene, &pose_b.to_isometry().inverse());
        let scans = ScanSet::new(vec![scene, local_b], vec![pose_a, pose_b]).unwrap();

        let built = PoseGraphBuilder::default().build(&scans).unwrap();
        let edge = &built.graph.edges()[0];
        let expected = pose_a.to_isometry().inverse() * pose_b.to_isometry();
        let diff = expected.inverse() * edge.measurement;
        assert!(diff.translation.vector.norm() < 1e-4);
        assert!(diff.rotation.angle() < 1e-4);
        assert_eq!(edge.correspondence_count, 90);
        assert!(!edge.degenerate);
    }

    #[test]
    fn drifted_pose_is_corrected_in_measurement() {
        // Scan b was taken at `truth` but its initial pose is off by 0.1 in x.
        let scene = grid_cloud();
        let truth = Pose::from_translation(0.0, 0.0, 0.0);
        let drifted = Pose::from_translation(0.1, 0.0, 0.0);
        let scans = ScanSet::new(vec![scene.clone(), scene], vec![Pose::identity(), drifted]).unwrap();

        let built = PoseGraphBuilder::default().build(&scans).unwrap();
        let edge = &built.graph.edges()[0];
        assert_relative_eq!(edge.measurement.translation.vector.x, truth.x, epsilon = 1e-4);
        assert_relative_eq!(edge.measurement.translation.vector.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn no_overlap_yields_degenerate_zero_weight_edge() {
        let scene = grid_cloud();
        let scans = ScanSet::new(
            vec![scene.clone(), scene],
            vec![Pose::identity(), Pose::from_translation(100.0, 0.0, 0.0)],
        )
        .unwrap();

        let built = PoseGraphBuilder::default().build(&scans).unwrap();
        assert_eq!(built.warnings.len(), 2);
        for edge in built.graph.edges() {
            assert!(edge.degenerate);
            assert_eq!(edge.correspondence_count, 0);
            assert_eq!(edge.weight, 0.0);
        }
        // Falls back to the initial relative pose.
        let edge = &built.graph.edges()[0];
        assert_relative_eq!(edge.measurement.translation.vector.x, 100.0, epsilon = 1e-9);
        match &built.warnings[0] {
            RelaxationWarning::DegenerateEdge(w) => {
                assert_eq!((w.source, w.target), (0, 1));
                assert_eq!(w.correspondences, 0);
                assert_eq!(w.min_required, 3);
            }
            other => panic!("unexpected warning {other:?}"),
        }
    }

    #[test]
    fn few_correspondences_reduce_weight() {
        let config = CorrespondenceConfig::default();
        let (full, full_degenerate) = information_weight(10, 0.0, &config);
        let (low, low_degenerate) = information_weight(2, 0.0, &config);
        assert!(!full_degenerate);
        assert!(low_degenerate);
        assert_relative_eq!(full, 10.0 / config.variance_floor);
        assert_relative_eq!(low, 2.0 / config.variance_floor * config.degenerate_weight_scale);
    }

    #[test]
    fn weight_falls_with_scatter() {
        let config = CorrespondenceConfig::default();
        let (tight, _) = information_weight(50, 0.01, &config);
        let (loose, _) = information_weight(50, 0.2, &config);
        assert!(tight > loose);
        assert_relative_eq!(loose, 50.0 / 0.04, max_relative = 1e-6);
    }
}
