use glam::{Mat3, Mat4, Quat, Vec3, Vec3A};

/// Basis vectors shorter than this are treated as collapsed.
const DEGENERATE_EPSILON: f32 = 1e-6;

/// A joint transform decomposed into translation and orientation. Keyframes store this form
/// rather than matrices because it interpolates cleanly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTransform {
    pub translation: Vec3A,
    /// Always a unit quaternion.
    pub rotation: Quat,
}

impl JointTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3A::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Splits an affine matrix into its translation column and the orientation of its upper
    /// 3x3 block. Scale is removed from the basis before the rotation is extracted.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        Self {
            translation: matrix.w_axis.truncate().into(),
            rotation: rotation_from_matrix(&Mat3::from_mat4(*matrix)),
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, Vec3::from(self.translation))
    }

    /// Linear interpolation of the translation and spherical interpolation of the rotation.
    /// `t` is the fractional position between `self` (0) and `other` (1).
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        // Take the shortest arc.
        let target = if self.rotation.dot(other.rotation) < 0. {
            -other.rotation
        } else {
            other.rotation
        };

        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(target, t).normalize(),
        }
    }
}

impl Default for JointTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Extracts the unit quaternion of a rotation block with the four-case trace algorithm.
/// Singular or non-finite input yields the identity orientation.
pub fn rotation_from_matrix(matrix: &Mat3) -> Quat {
    let Some(m) = orthonormal_basis(matrix) else {
        return Quat::IDENTITY;
    };

    // `mRC` is the element at row R, column C.
    let (m00, m01, m02) = (m.x_axis.x, m.y_axis.x, m.z_axis.x);
    let (m10, m11, m12) = (m.x_axis.y, m.y_axis.y, m.z_axis.y);
    let (m20, m21, m22) = (m.x_axis.z, m.y_axis.z, m.z_axis.z);

    let trace = m00 + m11 + m22;
    let (x, y, z, w) = if trace > 0. {
        let s = (trace + 1.).sqrt() * 2.;
        ((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
    } else if m00 > m11 && m00 > m22 {
        let s = (1. + m00 - m11 - m22).sqrt() * 2.;
        (0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
    } else if m11 > m22 {
        let s = (1. + m11 - m00 - m22).sqrt() * 2.;
        ((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
    } else {
        let s = (1. + m22 - m00 - m11).sqrt() * 2.;
        ((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
    };

    let length = (x * x + y * y + z * z + w * w).sqrt();
    if !length.is_finite() || length < DEGENERATE_EPSILON {
        return Quat::IDENTITY;
    }

    Quat::from_xyzw(x / length, y / length, z / length, w / length)
}

/// Normalizes each basis vector. Returns `None` when one of them is collapsed or not finite.
fn orthonormal_basis(matrix: &Mat3) -> Option<Mat3> {
    let normalize = |axis: Vec3| {
        let length = axis.length();
        if length.is_finite() && length > DEGENERATE_EPSILON {
            Some(axis / length)
        } else {
            None
        }
    };

    Some(Mat3::from_cols(
        normalize(matrix.x_axis)?,
        normalize(matrix.y_axis)?,
        normalize(matrix.z_axis)?,
    ))
}
