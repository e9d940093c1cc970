//! Edge residuals and their linearisation.
//!
//! Poses are perturbed on the left, `T <- exp(delta) * T`, with
//! `delta = [translation; rotation vector]`. The residual of an edge is
//! `log(Z^-1 * T_src^-1 * T_tgt)` in the same 6-vector layout, so its rotation
//! part has magnitude at most pi.

use nalgebra::{Isometry3, Matrix6, Vector3, Vector6};

/// Step size for central-difference Jacobians.
const NUMERICAL_DIFF_EPS: f64 = 1e-6;

/// Apply a 6-vector correction on the left of `pose`.
pub fn retract(delta: &Vector6<f64>, pose: &Isometry3<f64>) -> Isometry3<f64> {
    let translation = Vector3::new(delta[0], delta[1], delta[2]);
    let rotation = Vector3::new(delta[3], delta[4], delta[5]);
    Isometry3::new(translation, rotation) * pose
}

/// Residual between the relative pose predicted by `source`/`target` and the
/// measured one. Zero when the poses agree with the measurement.
pub fn edge_error(
    measurement: &Isometry3<f64>,
    source: &Isometry3<f64>,
    target: &Isometry3<f64>,
) -> Vector6<f64> {
    let predicted = source.inverse() * target;
    let e = measurement.inverse() * predicted;
    let t = e.translation.vector;
    let r = e.rotation.scaled_axis();
    Vector6::new(t.x, t.y, t.z, r.x, r.y, r.z)
}

/// Jacobians of [`edge_error`] with respect to left corrections of the source
/// and target poses, by central differences.
pub fn edge_jacobians(
    measurement: &Isometry3<f64>,
    source: &Isometry3<f64>,
    target: &Isometry3<f64>,
) -> (Matrix6<f64>, Matrix6<f64>) {
    let eps = NUMERICAL_DIFF_EPS;
    let mut j_source = Matrix6::zeros();
    let mut j_target = Matrix6::zeros();

    for axis in 0..6 {
        let mut delta = Vector6::zeros();
        delta[axis] = eps;

        let plus = edge_error(measurement, &retract(&delta, source), target);
        let minus = edge_error(measurement, &retract(&(-delta), source), target);
        j_source.set_column(axis, &((plus - minus) / (2.0 * eps)));

        let plus = edge_error(measurement, source, &retract(&delta, target));
        let minus = edge_error(measurement, source, &retract(&(-delta), target));
        j_target.set_column(axis, &((plus - minus) / (2.0 * eps)));
    }

    (j_source, j_target)
}

/// Weighted squared error `e^T * info * e`.
pub fn chi_squared(error: &Vector6<f64>, information: &Matrix6<f64>) -> f64 {
    error.dot(&(information * error))
}
