//! Rigid transforms for calibration and goal poses
//!
//! Poses are stored as translation + unit quaternion `[w, x, y, z]`.
//! Composition follows homogeneous-matrix convention: `a.compose(&b)` is
//! `A @ B`, i.e. `b` is expressed in `a`'s frame.

use serde::{Deserialize, Serialize};

/// Unit quaternion `[w, x, y, z]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Build and normalize. Degenerate input collapses to identity.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        let mut q = Self { w, x, y, z };
        q.normalize();
        q
    }

    /// Rotation of `angle` radians about `axis`
    pub fn from_axis_angle(axis: [f64; 3], angle: f64) -> Self {
        let norm = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
        if norm < 1e-12 {
            return Self::identity();
        }
        let (s, c) = (angle / 2.0).sin_cos();
        Self::new(
            c,
            axis[0] / norm * s,
            axis[1] / norm * s,
            axis[2] / norm * s,
        )
    }

    pub fn normalize(&mut self) {
        let norm = self.dot(self).sqrt();
        if norm > 1e-12 {
            self.w /= norm;
            self.x /= norm;
            self.y /= norm;
            self.z /= norm;
        } else {
            *self = Self::identity();
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn conjugate(&self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Hamilton product `self * other`
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        )
    }

    /// Rotate a vector
    pub fn rotate(&self, v: [f64; 3]) -> [f64; 3] {
        let m = self.to_matrix();
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    /// Angle of the rotation taking `other` to `self`, in `[0, pi]`
    pub fn angular_distance(&self, other: &Self) -> f64 {
        2.0 * self.dot(other).abs().clamp(0.0, 1.0).acos()
    }

    /// Shortest-path spherical interpolation from `self` toward `other`
    pub fn slerp(&self, other: &Self, t: f64) -> Self {
        let mut end = *other;
        let mut cos = self.dot(other);
        if cos < 0.0 {
            end = Self {
                w: -end.w,
                x: -end.x,
                y: -end.y,
                z: -end.z,
            };
            cos = -cos;
        }

        // Nearly parallel: plain lerp is stable and accurate enough
        if cos > 1.0 - 1e-9 {
            return Self::new(
                self.w + (end.w - self.w) * t,
                self.x + (end.x - self.x) * t,
                self.y + (end.y - self.y) * t,
                self.z + (end.z - self.z) * t,
            );
        }

        let theta = cos.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;
        Self::new(
            a * self.w + b * end.w,
            a * self.x + b * end.x,
            a * self.y + b * end.y,
            a * self.z + b * end.z,
        )
    }

    /// Row-major 3x3 rotation matrix
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        let Self { w, x, y, z } = *self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - w * z),
                2.0 * (x * z + w * y),
            ],
            [
                2.0 * (x * y + w * z),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - w * x),
            ],
            [
                2.0 * (x * z - w * y),
                2.0 * (y * z + w * x),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }

    /// From a row-major rotation matrix (Shepperd's method)
    pub fn from_matrix(m: &[[f64; 3]; 3]) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];
        if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Self::new(
                (m[2][1] - m[1][2]) / s,
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Self::new(
                (m[0][2] - m[2][0]) / s,
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Self::new(
                (m[1][0] - m[0][1]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
            )
        }
    }
}

/// Rigid 3D transform
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Translation in meters
    pub position: [f64; 3],
    pub rotation: Quaternion,
}

impl Pose {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(position: [f64; 3], rotation: Quaternion) -> Self {
        let mut rotation = rotation;
        rotation.normalize();
        Self { position, rotation }
    }

    pub fn from_translation(position: [f64; 3]) -> Self {
        Self::new(position, Quaternion::identity())
    }

    /// `self @ other`
    pub fn compose(&self, other: &Pose) -> Pose {
        let rotated = self.rotation.rotate(other.position);
        Pose::new(
            [
                self.position[0] + rotated[0],
                self.position[1] + rotated[1],
                self.position[2] + rotated[2],
            ],
            self.rotation.mul(&other.rotation),
        )
    }

    pub fn inverse(&self) -> Pose {
        let inv_rot = self.rotation.conjugate();
        let t = inv_rot.rotate(self.position);
        Pose::new([-t[0], -t[1], -t[2]], inv_rot)
    }

    /// Euclidean distance between translations
    pub fn position_distance(&self, other: &Pose) -> f64 {
        let dx = self.position[0] - other.position[0];
        let dy = self.position[1] - other.position[1];
        let dz = self.position[2] - other.position[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn rotation_distance(&self, other: &Pose) -> f64 {
        self.rotation.angular_distance(&other.rotation)
    }

    /// Exponential smoothing step: translation is lerped and rotation slerped
    /// from `self` toward `sample` by the given coefficients.
    pub fn low_pass(&self, sample: &Pose, position_coeff: f64, rotation_coeff: f64) -> Pose {
        let mut position = [0.0; 3];
        for (i, p) in position.iter_mut().enumerate() {
            *p = self.position[i] * (1.0 - position_coeff) + sample.position[i] * position_coeff;
        }
        Pose::new(position, self.rotation.slerp(&sample.rotation, rotation_coeff))
    }

    /// 4x4 homogeneous matrix, row-major
    pub fn to_matrix(&self) -> [[f64; 4]; 4] {
        let r = self.rotation.to_matrix();
        let p = self.position;
        [
            [r[0][0], r[0][1], r[0][2], p[0]],
            [r[1][0], r[1][1], r[1][2], p[1]],
            [r[2][0], r[2][1], r[2][2], p[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    pub fn from_matrix(m: &[[f64; 4]; 4]) -> Pose {
        let r = [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ];
        Pose::new([m[0][3], m[1][3], m[2][3]], Quaternion::from_matrix(&r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_pose_eq(a: &Pose, b: &Pose) {
        assert!(a.position_distance(b) < 1e-9, "{:?} != {:?}", a, b);
        assert!(a.rotation_distance(b) < 1e-6, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_compose_inverse_is_identity() {
        let t = Pose::new(
            [0.1, -0.2, 0.3],
            Quaternion::from_axis_angle([1.0, 2.0, 3.0], 0.7),
        );
        assert_pose_eq(&t.compose(&t.inverse()), &Pose::identity());
        assert_pose_eq(&t.inverse().compose(&t), &Pose::identity());
    }

    #[test]
    fn test_compose_rotates_child_translation() {
        let parent = Pose::new(
            [1.0, 0.0, 0.0],
            Quaternion::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2),
        );
        let child = Pose::from_translation([1.0, 0.0, 0.0]);
        let out = parent.compose(&child);
        assert!((out.position[0] - 1.0).abs() < 1e-9);
        assert!((out.position[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_matrix_conversion_preserves_pose() {
        let t = Pose::new(
            [0.5, 0.25, -1.0],
            Quaternion::from_axis_angle([0.0, 1.0, 0.0], 2.9),
        );
        assert_pose_eq(&Pose::from_matrix(&t.to_matrix()), &t);
    }

    #[test]
    fn test_slerp_takes_shortest_path() {
        let a = Quaternion::identity();
        let b = Quaternion::from_axis_angle([0.0, 0.0, 1.0], 0.2);
        let neg_b = Quaternion {
            w: -b.w,
            x: -b.x,
            y: -b.y,
            z: -b.z,
        };
        let half = a.slerp(&neg_b, 0.5);
        assert!((half.angular_distance(&a) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_low_pass_moves_ten_percent() {
        let last = Pose::identity();
        let sample = Pose::new(
            [1.0, 0.0, 0.0],
            Quaternion::from_axis_angle([0.0, 0.0, 1.0], 1.0),
        );
        let out = last.low_pass(&sample, 0.1, 0.1);
        assert!((out.position[0] - 0.1).abs() < 1e-12);
        assert!((out.rotation_distance(&last) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_angular_distance_ignores_sign() {
        let q = Quaternion::from_axis_angle([1.0, 0.0, 0.0], 0.4);
        let neg = Quaternion {
            w: -q.w,
            x: -q.x,
            y: -q.y,
            z: -q.z,
        };
        assert!(q.angular_distance(&neg) < 1e-6);
    }
}
