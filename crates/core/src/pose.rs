use std::f64::consts::PI;
use std::fmt;

use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// A rigid 6-DoF scan pose in the world frame.
///
/// Orientation uses roll/pitch/yaw in radians with the rotation composed as
/// `Rz(yaw) * Ry(pitch) * Rx(roll)`, which matches
/// [`UnitQuaternion::from_euler_angles`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(x, y, z, 0.0, 0.0, 0.0)
    }

    /// Pose as the 6-vector `[x, y, z, roll, pitch, yaw]`.
    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw),
        )
    }

    /// Convert back from an isometry. Angles come out wrapped into (-pi, pi].
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let (roll, pitch, yaw) = iso.rotation.euler_angles();
        let t = iso.translation.vector;
        Self::new(
            t.x,
            t.y,
            t.z,
            wrap_angle(roll),
            wrap_angle(pitch),
            wrap_angle(yaw),
        )
    }

    /// 4x4 homogeneous matrix of this pose.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.to_isometry().to_homogeneous()
    }

    /// `self * other`: `other` expressed in the frame of `self`, mapped to world.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::from_isometry(&(self.to_isometry() * other.to_isometry()))
    }

    pub fn inverse(&self) -> Pose {
        Pose::from_isometry(&self.to_isometry().inverse())
    }

    /// Pose of `other` expressed in the frame of `self`.
    pub fn between(&self, other: &Pose) -> Pose {
        Pose::from_isometry(&(self.to_isometry().inverse() * other.to_isometry()))
    }

    pub fn translation_distance(&self, other: &Pose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl From<Isometry3<f64>> for Pose {
    fn from(iso: Isometry3<f64>) -> Self {
        Pose::from_isometry(&iso)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6} | {:.6}, {:.6}, {:.6}]",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

/// Wrap an angle into (-pi, pi]. Non-finite input is returned unchanged.
pub fn wrap_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let two_pi = 2.0 * PI;
    let wrapped = angle - two_pi * ((angle - PI) / two_pi).ceil();
    if wrapped <= -PI {
        wrapped + two_pi
    } else {
        wrapped
    }
}
