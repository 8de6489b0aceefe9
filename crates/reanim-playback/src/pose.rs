//! Pose - sampled skeletal state handed between host and tracker
//!
//! The host owns the real animation math. This type only carries enough
//! structure for a reference crossfade when the host does not supply one.

use reanim_core::Point3;

/// Joint rotation (quaternion representation)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rotation {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn from_euler(yaw: f32, pitch: f32, roll: f32) -> Self {
        let (sy, cy) = (yaw * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sr, cr) = (roll * 0.5).sin_cos();

        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn dot(&self, other: &Rotation) -> f32 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Spherical linear interpolation along the shortest arc
    pub fn slerp(&self, other: &Rotation, t: f32) -> Rotation {
        let mut dot = self.dot(other);
        let other = if dot < 0.0 {
            dot = -dot;
            Rotation {
                w: -other.w,
                x: -other.x,
                y: -other.y,
                z: -other.z,
            }
        } else {
            *other
        };

        if dot > 0.9995 {
            // Nearly parallel, nlerp is stable here
            return Rotation {
                w: self.w + (other.w - self.w) * t,
                x: self.x + (other.x - self.x) * t,
                y: self.y + (other.y - self.y) * t,
                z: self.z + (other.z - self.z) * t,
            }
            .normalize();
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = (theta_0 - theta).sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;

        Rotation {
            w: self.w * s0 + other.w * s1,
            x: self.x * s0 + other.x * s1,
            y: self.y * s0 + other.y * s1,
            z: self.z * s0 + other.z * s1,
        }
    }

    pub fn normalize(&self) -> Rotation {
        let len = self.dot(self).sqrt();
        if len < 0.0001 {
            return Rotation::identity();
        }
        Rotation {
            w: self.w / len,
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
        }
    }
}

/// Local transform of one bone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointTransform {
    pub translation: Point3,
    pub rotation: Rotation,
    pub scale: f32,
}

impl JointTransform {
    pub fn new(translation: Point3, rotation: Rotation) -> Self {
        Self {
            translation,
            rotation,
            scale: 1.0,
        }
    }

    pub fn lerp(&self, other: &JointTransform, t: f32) -> JointTransform {
        JointTransform {
            translation: self.translation.lerp(&other.translation, t),
            rotation: self.rotation.slerp(&other.rotation, t),
            scale: self.scale + (other.scale - self.scale) * t,
        }
    }
}

/// One sampled frame of a motion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pose {
    pub joints: Vec<JointTransform>,
    /// Root motion accumulated since the previous sample
    pub root_delta: Point3,
}

impl Pose {
    pub fn new(joints: Vec<JointTransform>) -> Self {
        Self {
            joints,
            root_delta: Point3::zero(),
        }
    }

    /// Bind pose with `count` identity joints
    pub fn identity(count: usize) -> Self {
        Self::new(vec![
            JointTransform::new(Point3::zero(), Rotation::identity());
            count
        ])
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Crossfade toward `other`; `weight` 0 is self, 1 is other.
    ///
    /// Joints missing on one side are taken from the other side as-is.
    pub fn blend(&self, other: &Pose, weight: f32) -> Pose {
        let t = weight.clamp(0.0, 1.0);
        let shared = self.joints.len().min(other.joints.len());

        let mut joints: Vec<JointTransform> = self.joints[..shared]
            .iter()
            .zip(&other.joints[..shared])
            .map(|(a, b)| a.lerp(b, t))
            .collect();
        if self.joints.len() > shared {
            joints.extend_from_slice(&self.joints[shared..]);
        } else {
            joints.extend_from_slice(&other.joints[shared..]);
        }

        Pose {
            joints,
            root_delta: self.root_delta.lerp(&other.root_delta, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_at(x: f32, count: usize) -> Pose {
        Pose::new(vec![
            JointTransform::new(Point3::new(x, 0.0, 0.0), Rotation::identity());
            count
        ])
    }

    #[test]
    fn test_blend_endpoints() {
        let a = pose_at(0.0, 3);
        let b = pose_at(10.0, 3);

        assert_eq!(a.blend(&b, 0.0), a);
        assert_eq!(a.blend(&b, 1.0).joints[0].translation.x, 10.0);
        let mid = a.blend(&b, 0.5);
        assert!((mid.joints[2].translation.x - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_blend_mismatched_skeletons() {
        let a = pose_at(0.0, 2);
        let b = pose_at(4.0, 4);
        let blended = a.blend(&b, 0.25);
        assert_eq!(blended.len(), 4);
        assert!((blended.joints[0].translation.x - 1.0).abs() < 0.01);
        assert_eq!(blended.joints[3].translation.x, 4.0);
    }

    #[test]
    fn test_slerp_half_turn() {
        let a = Rotation::identity();
        let b = Rotation::from_euler(std::f32::consts::FRAC_PI_2, 0.0, 0.0);
        let mid = a.slerp(&b, 0.5);
        let expected = Rotation::from_euler(std::f32::consts::FRAC_PI_4, 0.0, 0.0);
        assert!((mid.dot(&expected) - 1.0).abs() < 0.001);
    }
}
