//! Per-joint keyframe sampling into local transforms

use glam::{Mat4, Quat, Vec3};

use super::keyframe::InterpolationMode;
use crate::skeleton::{Joint, JointHierarchy};

/// Last segment found on each channel of one joint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelHints {
    pub position: usize,
    pub rotation: usize,
    pub scale: usize,
}

/// Evaluates joint tracks at a frame position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyframeSampler {
    pub mode: InterpolationMode,
}

impl KeyframeSampler {
    pub fn new(mode: InterpolationMode) -> Self {
        Self { mode }
    }

    /// Position at `frame`, or the bind position when the channel has no keys
    pub fn sample_position(&self, joint: &Joint, frame: f32) -> Vec3 {
        joint
            .position_keys
            .sample(frame, self.mode)
            .unwrap_or(joint.bind_position)
    }

    /// Rotation at `frame`, or the bind rotation when the channel has no keys
    pub fn sample_rotation(&self, joint: &Joint, frame: f32) -> Quat {
        joint
            .rotation_keys
            .sample(frame, self.mode)
            .unwrap_or(joint.bind_rotation)
    }

    /// Scale at `frame`, or the bind scale when the channel has no keys
    pub fn sample_scale(&self, joint: &Joint, frame: f32) -> Vec3 {
        joint
            .scale_keys
            .sample(frame, self.mode)
            .unwrap_or(joint.bind_scale)
    }

    /// Local transform at `frame`, composed as translation × rotation × scale
    ///
    /// A joint without any keys keeps its bind-pose local matrix unchanged.
    pub fn sample_local(&self, joint: &Joint, frame: f32) -> Mat4 {
        let mut hints = ChannelHints::default();
        self.sample_local_hinted(joint, frame, &mut hints)
    }

    pub fn sample_local_hinted(&self, joint: &Joint, frame: f32, hints: &mut ChannelHints) -> Mat4 {
        if !joint.has_keys() {
            return joint.local;
        }

        let position = joint
            .position_keys
            .sample_hinted(frame, self.mode, &mut hints.position)
            .unwrap_or(joint.bind_position);
        let rotation = joint
            .rotation_keys
            .sample_hinted(frame, self.mode, &mut hints.rotation)
            .unwrap_or(joint.bind_rotation);
        let scale = joint
            .scale_keys
            .sample_hinted(frame, self.mode, &mut hints.scale)
            .unwrap_or(joint.bind_scale);

        Mat4::from_translation(position) * Mat4::from_quat(rotation) * Mat4::from_scale(scale)
    }

    /// Sample every joint of the hierarchy into `locals`
    pub fn sample_all(
        &self,
        hierarchy: &JointHierarchy,
        frame: f32,
        locals: &mut [Mat4],
        hints: &mut [ChannelHints],
    ) {
        for ((joint, local), hint) in hierarchy
            .iter()
            .zip(locals.iter_mut())
            .zip(hints.iter_mut())
        {
            *local = self.sample_local_hinted(joint, frame, hint);
        }
    }
}
