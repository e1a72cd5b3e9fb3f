//! Joint hierarchy and skin weights
//!
//! Joints live in one flat list owned by [`JointHierarchy`] and refer to each
//! other by index. A joint's skin [`Weight`]s point at vertices by
//! `(buffer, vertex)` so the render buffers stay the sole owners of vertex
//! data.
//!
//! # Example
//!
//! ```
//! use glam::{Mat4, Vec3};
//! use skinned_mesh::skeleton::JointHierarchy;
//!
//! let mut skeleton = JointHierarchy::new();
//! let hip = skeleton.create_joint("Hip", None);
//! let knee = skeleton.create_joint("Knee", Some(hip));
//! skeleton.joint_mut(hip).unwrap().set_local(Mat4::from_translation(Vec3::Y));
//! skeleton.joint_mut(knee).unwrap().set_local(Mat4::from_translation(Vec3::X));
//! skeleton.compute_bind_globals();
//!
//! let knee_global = skeleton.joint(knee).unwrap().global;
//! assert_eq!(knee_global.w_axis.truncate(), Vec3::new(1.0, 1.0, 0.0));
//! assert_eq!(skeleton.find_by_name("Knee"), Some(knee));
//! ```

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use log::warn;

use crate::animation::KeyframeTrack;

/// Totals this close to 1.0 count as already normalized
const UNIT_WEIGHT_TOLERANCE: f32 = 1.0e-5;

/// Influence of one joint on one vertex
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weight {
    /// Joint owning this weight
    pub joint: usize,
    /// Render buffer holding the vertex
    pub buffer: usize,
    /// Vertex index inside that buffer
    pub vertex: usize,
    pub strength: f32,
}

/// A named node of the skeleton
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Bind-pose transform relative to the parent
    pub local: Mat4,
    /// Bind-pose transform in mesh space
    pub global: Mat4,
    /// Inverse of `global`, moves bind-pose vertices into joint space
    pub global_inverse: Mat4,
    /// Bind-space to joint-space matrix supplied by the file, used instead
    /// of inverting `global`
    pub skin_offset: Option<Mat4>,
    /// Channel values used when a track has no keys
    pub bind_position: Vec3,
    pub bind_rotation: Quat,
    pub bind_scale: Vec3,
    pub position_keys: KeyframeTrack<Vec3>,
    pub rotation_keys: KeyframeTrack<Quat>,
    pub scale_keys: KeyframeTrack<Vec3>,
    pub weights: Vec<Weight>,
    /// Render buffers that move rigidly with this joint
    pub attached_buffers: Vec<usize>,
}

impl Joint {
    fn new(name: String, parent: Option<usize>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            local: Mat4::IDENTITY,
            global: Mat4::IDENTITY,
            global_inverse: Mat4::IDENTITY,
            skin_offset: None,
            bind_position: Vec3::ZERO,
            bind_rotation: Quat::IDENTITY,
            bind_scale: Vec3::ONE,
            position_keys: KeyframeTrack::new(),
            rotation_keys: KeyframeTrack::new(),
            scale_keys: KeyframeTrack::new(),
            weights: Vec::new(),
            attached_buffers: Vec::new(),
        }
    }

    /// Set the bind-pose local matrix and derive the static channel values
    pub fn set_local(&mut self, local: Mat4) {
        let (scale, rotation, translation) = local.to_scale_rotation_translation();
        self.local = local;
        self.bind_position = translation;
        self.bind_rotation = rotation;
        self.bind_scale = scale;
    }

    /// Set the bind pose from separate channels, composed as T·R·S
    pub fn set_local_trs(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.local = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        self.bind_position = translation;
        self.bind_rotation = rotation;
        self.bind_scale = scale;
    }

    /// Whether any channel carries keyframes
    pub fn has_keys(&self) -> bool {
        !self.position_keys.is_empty()
            || !self.rotation_keys.is_empty()
            || !self.scale_keys.is_empty()
    }

    /// Frame of the latest key across all channels
    pub fn last_key_frame(&self) -> Option<f32> {
        [
            self.position_keys.end_frame(),
            self.rotation_keys.end_frame(),
            self.scale_keys.end_frame(),
        ]
        .into_iter()
        .flatten()
        .reduce(f32::max)
    }
}

/// Flat, index-linked tree of joints
#[derive(Debug, Clone, Default)]
pub struct JointHierarchy {
    joints: Vec<Joint>,
}

impl JointHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a joint, linking it under `parent` when given
    ///
    /// A parent index that does not exist is logged and the joint becomes a
    /// root.
    pub fn create_joint(&mut self, name: impl Into<String>, parent: Option<usize>) -> usize {
        let index = self.joints.len();
        let name = name.into();
        let parent = match parent {
            Some(p) if p < index => Some(p),
            Some(p) => {
                warn!("Joint '{}' references missing parent {}", name, p);
                None
            }
            None => None,
        };
        if let Some(p) = parent {
            self.joints[p].children.push(index);
        }
        self.joints.push(Joint::new(name, parent));
        index
    }

    /// Re-link `child` under `parent`, refusing links that would form a cycle
    pub fn set_parent(&mut self, child: usize, parent: Option<usize>) -> bool {
        if child >= self.joints.len() {
            return false;
        }
        if let Some(p) = parent {
            if p >= self.joints.len() || self.is_ancestor_or_self(child, p) {
                return false;
            }
        }

        if let Some(old) = self.joints[child].parent {
            self.joints[old].children.retain(|&c| c != child);
        }
        self.joints[child].parent = parent;
        if let Some(p) = parent {
            self.joints[p].children.push(child);
        }
        true
    }

    /// Whether `ancestor` is `joint` or lies on its parent chain
    fn is_ancestor_or_self(&self, ancestor: usize, joint: usize) -> bool {
        let mut current = Some(joint);
        let mut steps = 0;
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.joints.len() {
                return true;
            }
            current = self.joints.get(index).and_then(|j| j.parent);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn joint_mut(&mut self, index: usize) -> Option<&mut Joint> {
        self.joints.get_mut(index)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut [Joint] {
        &mut self.joints
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Joint> {
        self.joints.iter()
    }

    /// First joint with exactly this name
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.joints
            .iter()
            .enumerate()
            .filter(|(_, j)| j.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Joint indices ordered so every parent precedes its children
    pub fn traversal_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.joints.len());
        let mut stack: Vec<usize> = self.roots().collect();
        stack.reverse();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.joints[index].children.iter().rev().copied());
        }
        order
    }

    /// Compute bind-pose global matrices and their inverses
    ///
    /// A joint carrying a `skin_offset` keeps that matrix as its inverse.
    pub fn compute_bind_globals(&mut self) {
        for index in self.traversal_order() {
            let parent_global = self.joints[index]
                .parent
                .map_or(Mat4::IDENTITY, |p| self.joints[p].global);
            let joint = &mut self.joints[index];
            joint.global = parent_global * joint.local;
            joint.global_inverse = joint.skin_offset.unwrap_or_else(|| joint.global.inverse());
        }
    }

    /// Compose animated local matrices into animated global matrices
    ///
    /// `locals` and `globals` are indexed by joint and must both hold one
    /// entry per joint.
    pub fn compose_globals(&self, locals: &[Mat4], globals: &mut [Mat4]) {
        for index in self.traversal_order() {
            let parent_global = self.joints[index]
                .parent
                .map_or(Mat4::IDENTITY, |p| globals[p]);
            globals[index] = parent_global * locals[index];
        }
    }

    /// Total number of skin weights across all joints
    pub fn weight_count(&self) -> usize {
        self.joints.iter().map(|j| j.weights.len()).sum()
    }

    /// Make the weights of every vertex sum to one
    ///
    /// Weights with a non-positive strength are removed first. Vertices whose
    /// total is zero or already one are left untouched, so running the pass
    /// again changes nothing. Returns the number of vertices rescaled.
    pub fn normalize_weights(&mut self) -> usize {
        for joint in &mut self.joints {
            joint.weights.retain(|w| w.strength > 0.0);
        }

        let mut totals: HashMap<(usize, usize), f32> = HashMap::new();
        for weight in self.joints.iter().flat_map(|j| j.weights.iter()) {
            *totals.entry((weight.buffer, weight.vertex)).or_insert(0.0) += weight.strength;
        }

        for weight in self.joints.iter_mut().flat_map(|j| j.weights.iter_mut()) {
            if let Some(&total) = totals.get(&(weight.buffer, weight.vertex))
                && total != 0.0
                && (total - 1.0).abs() > UNIT_WEIGHT_TOLERANCE
            {
                weight.strength /= total;
            }
        }

        totals
            .values()
            .filter(|&&t| t != 0.0 && (t - 1.0).abs() > UNIT_WEIGHT_TOLERANCE)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(joint: usize, vertex: usize, strength: f32) -> Weight {
        Weight {
            joint,
            buffer: 0,
            vertex,
            strength,
        }
    }

    fn two_joint_skeleton() -> JointHierarchy {
        let mut skeleton = JointHierarchy::new();
        let a = skeleton.create_joint("A", None);
        let b = skeleton.create_joint("B", Some(a));
        skeleton.joints[a].weights = vec![weight(a, 0, 1.0), weight(a, 1, 0.5), weight(a, 2, 0.25)];
        skeleton.joints[b].weights = vec![weight(b, 0, 1.0), weight(b, 1, 0.5), weight(b, 3, 0.0)];
        skeleton
    }

    #[test]
    fn test_normalize_weights() {
        let mut skeleton = two_joint_skeleton();
        let rescaled = skeleton.normalize_weights();
        // Vertex 0 totals 2.0 and vertex 2 totals 0.25; vertex 1 already sums to 1
        assert_eq!(rescaled, 2);

        let a = &skeleton.joints[0].weights;
        let b = &skeleton.joints[1].weights;
        assert_eq!(a[0].strength, 0.5);
        assert_eq!(a[1].strength, 0.5);
        assert_eq!(a[2].strength, 1.0);
        assert_eq!(b[0].strength, 0.5);
        assert_eq!(b.len(), 2, "zero-strength weight removed");
    }

    #[test]
    fn test_normalize_weights_idempotent() {
        let mut skeleton = two_joint_skeleton();
        skeleton.joints[0].weights.push(weight(0, 4, 0.3));
        skeleton.joints[1].weights.push(weight(1, 4, 0.4));
        skeleton.normalize_weights();
        let once: Vec<Vec<Weight>> = skeleton.joints.iter().map(|j| j.weights.clone()).collect();

        assert_eq!(skeleton.normalize_weights(), 0);
        let twice: Vec<Vec<Weight>> = skeleton.joints.iter().map(|j| j.weights.clone()).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_bind_globals_follow_parents() {
        let mut skeleton = JointHierarchy::new();
        let root = skeleton.create_joint("root", None);
        let child = skeleton.create_joint("child", Some(root));
        let leaf = skeleton.create_joint("leaf", Some(child));

        skeleton.joints[root].set_local(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
        skeleton.joints[child].set_local_trs(
            Vec3::new(2.0, 0.0, 0.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
        );
        skeleton.joints[leaf].set_local(Mat4::from_translation(Vec3::X));
        skeleton.compute_bind_globals();

        let leaf_pos = skeleton.joints[leaf].global.transform_point3(Vec3::ZERO);
        assert!((leaf_pos - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-5);

        let round_trip = skeleton.joints[leaf].global * skeleton.joints[leaf].global_inverse;
        assert!(round_trip.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_traversal_order_with_reparenting() {
        let mut skeleton = JointHierarchy::new();
        let a = skeleton.create_joint("a", None);
        let b = skeleton.create_joint("b", None);
        let c = skeleton.create_joint("c", Some(a));
        // Move `a` under `b`, created later
        assert!(skeleton.set_parent(a, Some(b)));
        // Cycles are refused
        assert!(!skeleton.set_parent(b, Some(c)));

        let order = skeleton.traversal_order();
        let pos = |i| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(b) < pos(a));
        assert!(pos(a) < pos(c));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let mut skeleton = JointHierarchy::new();
        let j = skeleton.create_joint("orphan", Some(7));
        assert_eq!(skeleton.joint(j).unwrap().parent, None);
        assert_eq!(skeleton.roots().count(), 1);
    }

    #[test]
    fn test_name_lookup_is_case_sensitive() {
        let mut skeleton = JointHierarchy::new();
        skeleton.create_joint("Spine", None);
        assert_eq!(skeleton.find_by_name("Spine"), Some(0));
        assert_eq!(skeleton.find_by_name("spine"), None);
    }
}
