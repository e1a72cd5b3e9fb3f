//! Per-instance joint matrices
//!
//! A [`Pose`] is the mutable half of an animated mesh: the loaded asset keeps
//! the bind pose, while every playing instance owns a pose of its own.

use glam::{Mat4, Quat, Vec3};

use super::keyframe::slerp;
use super::sampler::{ChannelHints, KeyframeSampler};
use crate::skeleton::JointHierarchy;

/// Animated local and global matrices for every joint
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub locals: Vec<Mat4>,
    pub globals: Vec<Mat4>,
    hints: Vec<ChannelHints>,
}

impl Pose {
    /// The bind pose of `hierarchy`
    pub fn bind(hierarchy: &JointHierarchy) -> Self {
        Self {
            locals: hierarchy.iter().map(|j| j.local).collect(),
            globals: hierarchy.iter().map(|j| j.global).collect(),
            hints: vec![ChannelHints::default(); hierarchy.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Sample all joint tracks at `frame` into the local matrices
    pub fn sample(&mut self, hierarchy: &JointHierarchy, sampler: &KeyframeSampler, frame: f32) {
        sampler.sample_all(hierarchy, frame, &mut self.locals, &mut self.hints);
    }

    /// Recompute global matrices from the current local matrices
    pub fn update_globals(&mut self, hierarchy: &JointHierarchy) {
        hierarchy.compose_globals(&self.locals, &mut self.globals);
    }

    /// Blend `from` into the current locals, weighting `from` by `1 - t`
    ///
    /// Each local is decomposed so translation and scale are interpolated
    /// linearly and rotation spherically.
    pub fn blend_from(&mut self, from: &[Mat4], t: f32) {
        let t = t.clamp(0.0, 1.0);
        for (target, source) in self.locals.iter_mut().zip(from) {
            *target = blend_matrices(source, target, t);
        }
    }

    /// Skinning matrices: animated global × bind inverse for each joint
    pub fn skinning_matrices(&self, hierarchy: &JointHierarchy) -> Vec<Mat4> {
        self.globals
            .iter()
            .zip(hierarchy.iter())
            .map(|(global, joint)| *global * joint.global_inverse)
            .collect()
    }
}

fn blend_matrices(from: &Mat4, to: &Mat4, t: f32) -> Mat4 {
    if t <= 0.0 {
        return *from;
    }
    if t >= 1.0 {
        return *to;
    }
    let (s0, r0, t0) = from.to_scale_rotation_translation();
    let (s1, r1, t1) = to.to_scale_rotation_translation();
    let scale: Vec3 = s0.lerp(s1, t);
    let rotation: Quat = slerp(r0, r1, t);
    let translation: Vec3 = t0.lerp(t1, t);
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_pose_matches_hierarchy() {
        let mut skeleton = JointHierarchy::new();
        let root = skeleton.create_joint("root", None);
        skeleton
            .joint_mut(root)
            .unwrap()
            .set_local(Mat4::from_translation(Vec3::Y));
        skeleton.create_joint("child", Some(root));
        skeleton.compute_bind_globals();

        let pose = Pose::bind(&skeleton);
        assert_eq!(pose.len(), 2);
        assert_eq!(pose.globals[1], Mat4::from_translation(Vec3::Y));
        for m in pose.skinning_matrices(&skeleton) {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn test_blend_halfway() {
        let mut skeleton = JointHierarchy::new();
        skeleton.create_joint("j", None);
        let mut pose = Pose::bind(&skeleton);
        pose.locals[0] = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        pose.blend_from(&[Mat4::IDENTITY], 0.5);
        let p = pose.locals[0].transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
    }
}
