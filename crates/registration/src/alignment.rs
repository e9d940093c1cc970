use lumgraph_core::PointCloud;
use lumgraph_spatial::KdTree;
use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3, SVD};

use crate::correspondence::{find_correspondences, Correspondence};

/// Below this many pairs the rotation is not determined and only the
/// centroid offset is estimated.
const MIN_PAIRS_FOR_ROTATION: usize = 3;

/// Apply a rigid transform to all points in a cloud, returning a new cloud.
pub fn apply_transform(cloud: &PointCloud, transform: &Isometry3<f64>) -> PointCloud {
    let n = cloud.len();
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for p in cloud.iter_points() {
        let tp = transform * to_point(p);
        x.push(tp.x as f32);
        y.push(tp.y as f32);
        z.push(tp.z as f32);
    }

    PointCloud::from_xyz(x, y, z)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentParams {
    pub max_correspondence_distance: f32,
    /// Rounds of correspondence search + closed-form alignment. One round is
    /// a single correspondence pass; more rounds turn this into ICP.
    pub refinement_iterations: usize,
    pub tolerance: f32,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: f32::INFINITY,
            refinement_iterations: 1,
            tolerance: 1e-6,
        }
    }
}

/// Outcome of aligning one scan onto another.
#[derive(Debug, Clone, PartialEq)]
pub struct PairAlignment {
    /// Maps source points onto the target.
    pub transform: Isometry3<f64>,
    /// Correspondences used for the last alignment round.
    pub correspondences: Vec<Correspondence>,
    /// RMSE of the first round's matches, before any alignment.
    pub initial_rmse: f32,
    /// RMSE of the matched pairs after `transform` is applied.
    pub rmse: f32,
    pub iterations: usize,
}

impl PairAlignment {
    fn unmatched(iterations: usize) -> Self {
        Self {
            transform: Isometry3::identity(),
            correspondences: Vec::new(),
            initial_rmse: 0.0,
            rmse: 0.0,
            iterations,
        }
    }
}

/// Align `source` onto `target` from nearest-neighbour correspondences.
///
/// Each round finds correspondences between the current (transformed) source
/// and the target, then solves the rigid transform in closed form. Rounds stop
/// at `refinement_iterations`, when no correspondences are left, or when the
/// aligned RMSE changes by less than `tolerance`.
pub fn align_pair(source: &PointCloud, target: &PointCloud, params: &AlignmentParams) -> PairAlignment {
    if source.is_empty() || target.is_empty() {
        return PairAlignment::unmatched(0);
    }

    let target_tree = KdTree::build(target);
    let rounds = params.refinement_iterations.max(1);

    let mut current = source.clone();
    let mut cumulative = Isometry3::identity();
    let mut last_correspondences = Vec::new();
    let mut initial_rmse = 0.0_f32;
    let mut last_rmse = 0.0_f32;
    let mut prev_rmse = f32::INFINITY;
    let mut iterations = 0;

    for iter in 0..rounds {
        iterations = iter + 1;

        let correspondences =
            find_correspondences(&current, &target_tree, params.max_correspondence_distance);
        if correspondences.is_empty() {
            break;
        }
        if iter == 0 {
            initial_rmse = compute_rmse(&correspondences);
        }

        let incremental = estimate_rigid_transform(&current, target, &correspondences);
        cumulative = incremental * cumulative;
        current = apply_transform(&current, &incremental);

        let rmse = aligned_rmse(&current, target, &correspondences);
        last_rmse = rmse;
        last_correspondences = correspondences;

        if (prev_rmse - rmse).abs() < params.tolerance {
            break;
        }
        prev_rmse = rmse;
    }

    if last_correspondences.is_empty() {
        return PairAlignment::unmatched(iterations);
    }

    PairAlignment {
        transform: cumulative,
        correspondences: last_correspondences,
        initial_rmse,
        rmse: last_rmse,
        iterations,
    }
}

/// Compute the rigid transform (rotation + translation) that best maps the
/// corresponding source points onto their target points, using SVD of the
/// cross-covariance matrix.
///
/// With fewer than three pairs only the centroid offset is returned; with no
/// pairs the identity.
pub fn estimate_rigid_transform(
    source: &PointCloud,
    target: &PointCloud,
    correspondences: &[Correspondence],
) -> Isometry3<f64> {
    let n = correspondences.len();
    if n == 0 {
        return Isometry3::identity();
    }

    let mut src_centroid = Vector3::zeros();
    let mut tgt_centroid = Vector3::zeros();
    for c in correspondences {
        src_centroid += to_point(source.point(c.source_index)).coords;
        tgt_centroid += to_point(target.point(c.target_index)).coords;
    }
    let n_f = n as f64;
    src_centroid /= n_f;
    tgt_centroid /= n_f;

    let offset_only = Isometry3::from_parts(
        Translation3::from(tgt_centroid - src_centroid),
        UnitQuaternion::identity(),
    );
    if n < MIN_PAIRS_FOR_ROTATION {
        return offset_only;
    }

    // H = sum (src_i - src_centroid)(tgt_i - tgt_centroid)^T
    let mut h = Matrix3::<f64>::zeros();
    for c in correspondences {
        let src_pt = to_point(source.point(c.source_index)).coords - src_centroid;
        let tgt_pt = to_point(target.point(c.target_index)).coords - tgt_centroid;
        h += src_pt * tgt_pt.transpose();
    }

    let svd = SVD::new(h, true, true);
    let (Some(u), Some(mut v_t)) = (svd.u, svd.v_t) else {
        return offset_only;
    };

    // Reflection: if det(V * U^T) < 0, flip the last row of V^T.
    let det = (v_t.transpose() * u.transpose()).determinant();
    if det < 0.0 {
        for col in 0..3 {
            v_t[(2, col)] = -v_t[(2, col)];
        }
    }

    let rotation = v_t.transpose() * u.transpose();
    let translation = tgt_centroid - rotation * src_centroid;

    Isometry3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation)),
    )
}

/// Root mean square of the correspondence distances as they were matched.
pub fn compute_rmse(correspondences: &[Correspondence]) -> f32 {
    if correspondences.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = correspondences
        .iter()
        .map(|c| c.distance * c.distance)
        .sum();
    (sum_sq / correspondences.len() as f32).sqrt()
}

/// RMSE of the pairs in `correspondences` measured on the given clouds.
fn aligned_rmse(source: &PointCloud, target: &PointCloud, correspondences: &[Correspondence]) -> f32 {
    if correspondences.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = correspondences
        .iter()
        .map(|c| {
            let s = to_point(source.point(c.source_index));
            let t = to_point(target.point(c.target_index));
            (s - t).norm_squared()
        })
        .sum();
    (sum_sq / correspondences.len() as f64).sqrt() as f32
}

fn to_point(p: [f32; 3]) -> Point3<f64> {
    Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lumgraph_core::{PointCloud, Pose};
    use proptest::prelude::*;

    /// Helper: a small asymmetric 3D cloud (a jittered, skewed grid).
    fn scene_cloud() -> PointCloud {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..5 {
            for j in 0..4 {
                for k in 0..3 {
                    let jitter = ((i * 12 + j * 3 + k) as f32 * 0.37).sin() * 0.05;
                    x.push(i as f32 * 1.1 + jitter);
                    y.push(j as f32 * 0.9 + 0.2 * i as f32 - jitter);
                    z.push(k as f32 * 1.3 + jitter * 0.5);
                }
            }
        }
        PointCloud::from_xyz(x, y, z)
    }

    #[test]
    fn identity_alignment() {
        let cloud = scene_cloud();
        let result = align_pair(&cloud, &cloud, &AlignmentParams::default());

        assert_eq!(result.correspondences.len(), cloud.len());
        assert!(result.rmse < 1e-5, "RMSE should be near 0, got {}", result.rmse);
        assert_relative_eq!(result.transform.translation.vector.norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(result.transform.rotation.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn recovers_small_translation_in_one_round() {
        let source = scene_cloud();
        let shift = Pose::from_translation(0.05, -0.03, 0.02).to_isometry();
        let target = apply_transform(&source, &shift);

        let params = AlignmentParams {
            max_correspondence_distance: 0.3,
            ..AlignmentParams::default()
        };
        let result = align_pair(&source, &target, &params);

        assert_eq!(result.iterations, 1);
        assert_relative_eq!(result.initial_rmse, 0.06164414, epsilon = 1e-4);
        let t = result.transform.translation.vector;
        assert_relative_eq!(t.x, 0.05, epsilon = 1e-4);
        assert_relative_eq!(t.y, -0.03, epsilon = 1e-4);
        assert_relative_eq!(t.z, 0.02, epsilon = 1e-4);
        assert!(result.rmse < 1e-4);
    }

    #[test]
    fn refinement_recovers_small_rotation() {
        let source = scene_cloud();
        let motion = Pose::new(0.1, 0.05, 0.0, 0.0, 0.0, 0.04).to_isometry();
        let target = apply_transform(&source, &motion);

        let params = AlignmentParams {
            max_correspondence_distance: 0.5,
            refinement_iterations: 30,
            tolerance: 1e-9,
        };
        let result = align_pair(&source, &target, &params);

        let aligned = apply_transform(&source, &result.transform);
        for i in 0..source.len() {
            let a = aligned.point(i);
            let b = target.point(i);
            for axis in 0..3 {
                assert_relative_eq!(a[axis], b[axis], epsilon = 1e-3);
            }
        }
        assert_relative_eq!(result.transform.rotation.angle(), 0.04, epsilon = 1e-3);
    }

    #[test]
    fn initial_rmse_reports_the_misalignment_that_was_removed() {
        let source = scene_cloud();
        let target = apply_transform(&source, &Pose::from_translation(0.0, 0.0, 0.1).to_isometry());
        let params = AlignmentParams {
            max_correspondence_distance: 0.3,
            refinement_iterations: 5,
            ..AlignmentParams::default()
        };
        let result = align_pair(&source, &target, &params);

        assert_eq!(result.correspondences.len(), source.len());
        assert_relative_eq!(result.initial_rmse, 0.1, epsilon = 1e-5);
        assert!(result.rmse < 1e-4);
        assert!(result.rmse < result.initial_rmse);
    }

    #[test]
    fn empty_clouds_give_identity() {
        let result = align_pair(&PointCloud::new(), &scene_cloud(), &AlignmentParams::default());
        assert_eq!(result.iterations, 0);
        assert_eq!(result.initial_rmse, 0.0);
        assert!(result.correspondences.is_empty());
        assert_eq!(result.transform, Isometry3::identity());
    }

    #[test]
    fn no_overlap_gives_identity() {
        let source = scene_cloud();
        let far = apply_transform(&source, &Pose::from_translation(100.0, 0.0, 0.0).to_isometry());
        let params = AlignmentParams {
            max_correspondence_distance: 1.0,
            ..AlignmentParams::default()
        };
        let result = align_pair(&source, &far, &params);
        assert!(result.correspondences.is_empty());
        assert_eq!(result.transform, Isometry3::identity());
    }

    #[test]
    fn two_pairs_estimate_translation_only() {
        let source = PointCloud::from_xyz(vec![0.0, 1.0], vec![0.0, 0.0], vec![0.0, 0.0]);
        let target = PointCloud::from_xyz(vec![0.5, 1.5], vec![0.2, 0.2], vec![0.0, 0.0]);
        let corrs = [
            Correspondence { source_index: 0, target_index: 0, distance: 0.0 },
            Correspondence { source_index: 1, target_index: 1, distance: 0.0 },
        ];
        let iso = estimate_rigid_transform(&source, &target, &corrs);
        assert_relative_eq!(iso.rotation.angle(), 0.0);
        assert_relative_eq!(iso.translation.vector.x, 0.5, epsilon = 1e-7);
        assert_relative_eq!(iso.translation.vector.y, 0.2, epsilon = 1e-7);
    }

    #[test]
    fn svd_handles_reflection_case() {
        // Planar points produce a rank-deficient H where a naive SVD solution
        // can be a reflection; the result must stay a proper rotation.
        let source = PointCloud::from_xyz(
            vec![0.0, 1.0, 0.0, 1.0, 0.5],
            vec![0.0, 0.0, 1.0, 1.0, 0.3],
            vec![0.0; 5],
        );
        let corrs: Vec<Correspondence> = (0..5)
            .map(|i| Correspondence { source_index: i, target_index: i, distance: 0.0 })
            .collect();
        let iso = estimate_rigid_transform(&source, &source, &corrs);
        let m = iso.rotation.to_rotation_matrix();
        assert_relative_eq!(m.matrix().determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(iso.rotation.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn compute_rmse_of_matches() {
        let corrs = [
            Correspondence { source_index: 0, target_index: 0, distance: 3.0 },
            Correspondence { source_index: 1, target_index: 1, distance: 4.0 },
        ];
        assert_relative_eq!(compute_rmse(&corrs), (12.5f32).sqrt(), epsilon = 1e-6);
        assert_eq!(compute_rmse(&[]), 0.0);
    }

    #[test]
    fn apply_transform_translation() {
        let cloud = PointCloud::from_xyz(vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]);
        let t = Pose::from_translation(10.0, 20.0, 30.0).to_isometry();
        let result = apply_transform(&cloud, &t);

        assert_relative_eq!(result.x[0], 11.0, epsilon = 1e-6);
        assert_relative_eq!(result.y[0], 23.0, epsilon = 1e-6);
        assert_relative_eq!(result.z[0], 35.0, epsilon = 1e-6);
        assert_relative_eq!(result.x[1], 12.0, epsilon = 1e-6);
        assert_relative_eq!(result.y[1], 24.0, epsilon = 1e-6);
        assert_relative_eq!(result.z[1], 36.0, epsilon = 1e-6);
    }

    proptest! {
        #[test]
        fn exact_pairs_recover_the_motion(
            tx in -1.0f64..1.0, ty in -1.0f64..1.0, tz in -1.0f64..1.0,
            yaw in -0.5f64..0.5, roll in -0.3f64..0.3,
        ) {
            let source = scene_cloud();
            let motion = Pose::new(tx, ty, tz, roll, 0.0, yaw).to_isometry();
            let target = apply_transform(&source, &motion);
            let corrs: Vec<Correspondence> = (0..source.len())
                .map(|i| Correspondence { source_index: i, target_index: i, distance: 0.0 })
                .collect();
            let iso = estimate_rigid_transform(&source, &target, &corrs);
            let delta = iso.inverse() * motion;
            prop_assert!(delta.translation.vector.norm() < 1e-4);
            prop_assert!(delta.rotation.angle() < 1e-4);
        }
    }
}
