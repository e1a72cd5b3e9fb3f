//! The loaded, immutable skinned mesh asset
//!
//! Loaders populate a [`SkinnedMesh`] and call [`SkinnedMesh::finalize`] once.
//! After that the asset is only read: playing instances keep their own poses
//! and vertex copies (see [`crate::controller`]).

use glam::Mat4;
use log::{debug, warn};

use crate::buffer::{Aabb, Material, RenderBuffer};
use crate::loader::{LoaderOptions, MeshFormat, WeightIndexPolicy};
use crate::skeleton::{JointHierarchy, Weight};

/// Padding added around the merged bounding box, as a fraction of its extent
const BOUNDING_BOX_PADDING: f32 = 0.05;

/// A skeletal mesh: render buffers, materials and a joint hierarchy
#[derive(Debug, Clone)]
pub struct SkinnedMesh {
    name: String,
    format: MeshFormat,
    buffers: Vec<RenderBuffer>,
    materials: Vec<Material>,
    hierarchy: JointHierarchy,
    /// Frame of the last keyframe, in the format's frame unit
    animation_frames: f32,
    /// Frame count announced by the file, if any
    declared_frames: Option<f32>,
    /// Playback speed in frame units per second
    animation_speed: f32,
    bounding_box: Aabb,
    has_animation: bool,
}

impl SkinnedMesh {
    pub fn new(name: impl Into<String>, format: MeshFormat) -> Self {
        Self {
            name: name.into(),
            format,
            buffers: Vec::new(),
            materials: Vec::new(),
            hierarchy: JointHierarchy::new(),
            animation_frames: 0.0,
            declared_frames: None,
            animation_speed: format.default_animation_speed(),
            bounding_box: Aabb::EMPTY,
            has_animation: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> MeshFormat {
        self.format
    }

    pub fn buffers(&self) -> &[RenderBuffer] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut [RenderBuffer] {
        &mut self.buffers
    }

    pub fn buffer(&self, index: usize) -> Option<&RenderBuffer> {
        self.buffers.get(index)
    }

    /// Append a render buffer and return its index
    pub fn add_buffer(&mut self, buffer: RenderBuffer) -> usize {
        self.buffers.push(buffer);
        self.buffers.len() - 1
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, index: usize) -> Option<&Material> {
        self.materials.get(index)
    }

    /// Append a material and return its index
    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn hierarchy(&self) -> &JointHierarchy {
        &self.hierarchy
    }

    pub fn hierarchy_mut(&mut self) -> &mut JointHierarchy {
        &mut self.hierarchy
    }

    /// Make a buffer move rigidly with a joint
    pub fn attach_buffer(&mut self, buffer: usize, joint: usize) {
        if let (Some(b), Some(j)) = (self.buffers.get_mut(buffer), self.hierarchy.joint_mut(joint)) {
            b.attached_joint = Some(joint);
            if !j.attached_buffers.contains(&buffer) {
                j.attached_buffers.push(buffer);
            }
        }
    }

    /// Record a skin weight on `joint`; returns false if the joint does not exist
    pub fn add_weight(&mut self, joint: usize, buffer: usize, vertex: usize, strength: f32) -> bool {
        match self.hierarchy.joint_mut(joint) {
            Some(j) => {
                j.weights.push(Weight {
                    joint,
                    buffer,
                    vertex,
                    strength,
                });
                true
            }
            None => false,
        }
    }

    /// Playback speed in frame units per second
    pub fn animation_speed(&self) -> f32 {
        self.animation_speed
    }

    pub fn set_animation_speed(&mut self, fps: f32) {
        self.animation_speed = fps;
    }

    /// Record the animation length announced by the file
    pub fn set_declared_frames(&mut self, frames: f32) {
        self.declared_frames = Some(frames);
    }

    /// Frame of the last key in the format's frame unit
    pub fn animation_frames(&self) -> f32 {
        self.animation_frames
    }

    /// Number of whole frames; 1 for a static mesh
    pub fn frame_count(&self) -> u32 {
        (self.animation_frames.floor() as u32).max(1)
    }

    pub fn has_animation(&self) -> bool {
        self.has_animation
    }

    /// Bounding box of the bind pose, padded on every side
    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box
    }

    pub fn joint_count(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn joint_name(&self, index: usize) -> Option<&str> {
        self.hierarchy.joint(index).map(|j| j.name.as_str())
    }

    pub fn joint_index_by_name(&self, name: &str) -> Option<usize> {
        self.hierarchy.find_by_name(name)
    }

    /// Bind-pose global matrix of a joint
    pub fn joint_bind_global(&self, index: usize) -> Option<Mat4> {
        self.hierarchy.joint(index).map(|j| j.global)
    }

    pub fn vertex_count(&self) -> usize {
        self.buffers.iter().map(RenderBuffer::vertex_count).sum()
    }

    pub fn index_count(&self) -> usize {
        self.buffers.iter().map(|b| b.indices.len()).sum()
    }

    /// Prepare the mesh for playback after loading
    ///
    /// Computes bind-pose matrices, cleans up keyframes, validates and
    /// normalizes skin weights and derives the animation length and bounds.
    pub fn finalize(&mut self, options: &LoaderOptions) {
        for buffer in &mut self.buffers {
            buffer.recalculate_bounding_box();
        }
        let mut bounds = Aabb::EMPTY;
        for buffer in &self.buffers {
            bounds.merge(&buffer.bounding_box);
        }
        self.bounding_box = bounds.padded(BOUNDING_BOX_PADDING);

        self.hierarchy.compute_bind_globals();
        self.sync_attachments();
        self.prepare_animation();
        self.validate_weights(options.weight_index_policy);

        if self.hierarchy.weight_count() > 0 {
            self.has_animation = true;
            if options.normalize_weights {
                let rescaled = self.hierarchy.normalize_weights();
                if rescaled > 0 {
                    debug!("{}: normalized weights of {} vertices", self.name, rescaled);
                }
            }
        }

        debug!(
            "{}: finalized {} joints, {} buffers, {} weights, {} frames",
            self.name,
            self.hierarchy.len(),
            self.buffers.len(),
            self.hierarchy.weight_count(),
            self.frame_count()
        );
    }

    /// Derive the animation length, then clean and pad all keyframe tracks
    fn prepare_animation(&mut self) {
        let last_key = self
            .hierarchy
            .iter()
            .filter_map(|j| j.last_key_frame())
            .reduce(f32::max);

        self.has_animation = last_key.is_some();
        self.animation_frames = match (last_key, self.declared_frames) {
            (Some(k), Some(d)) => k.max(d),
            (Some(k), None) => k,
            (None, _) => 0.0,
        }
        .max(0.0);

        if !self.has_animation {
            return;
        }

        let end = self.animation_frames;
        let mut removed = 0;
        for joint in self.hierarchy.joints_mut() {
            removed += joint.position_keys.optimize();
            removed += joint.rotation_keys.optimize();
            removed += joint.scale_keys.optimize();
            joint.position_keys.pad(0.0, end);
            joint.rotation_keys.pad(0.0, end);
            joint.scale_keys.pad(0.0, end);
        }
        if removed > 0 {
            debug!("{}: removed {} redundant keyframes", self.name, removed);
        }
    }

    /// Make sure no weight can index outside its buffer
    fn validate_weights(&mut self, policy: WeightIndexPolicy) {
        let buffer_sizes: Vec<usize> = self.buffers.iter().map(RenderBuffer::vertex_count).collect();
        let name = &self.name;

        for joint in self.hierarchy.joints_mut() {
            let joint_name = joint.name.clone();
            joint.weights.retain_mut(|weight| {
                let valid = match buffer_sizes.get(weight.buffer) {
                    None => {
                        warn!(
                            "{}: weight on joint '{}' references missing buffer {}",
                            name, joint_name, weight.buffer
                        );
                        false
                    }
                    Some(&count) if weight.vertex >= count => {
                        warn!(
                            "{}: weight on joint '{}' references vertex {} of buffer {} ({} vertices)",
                            name, joint_name, weight.vertex, weight.buffer, count
                        );
                        false
                    }
                    Some(_) => true,
                };
                if valid {
                    return true;
                }
                match policy {
                    WeightIndexPolicy::Drop => false,
                    WeightIndexPolicy::ResetToZero => {
                        if buffer_sizes.first().copied().unwrap_or(0) == 0 {
                            return false;
                        }
                        weight.buffer = 0;
                        weight.vertex = 0;
                        weight.strength = 0.0;
                        true
                    }
                }
            });
        }
    }

    /// Drop attachments to missing buffers and mirror them onto the buffers
    fn sync_attachments(&mut self) {
        let buffer_count = self.buffers.len();
        for buffer in &mut self.buffers {
            buffer.attached_joint = None;
        }
        for (index, joint) in self.hierarchy.joints_mut().iter_mut().enumerate() {
            joint.attached_buffers.retain(|&b| b < buffer_count);
            for &b in &joint.attached_buffers {
                self.buffers[b].attached_joint = Some(index);
            }
        }
    }

    /// Take keyframes from another mesh, matching joints by name
    ///
    /// Joints without a counterpart keep their own keys. Returns the number
    /// of joints that received animation.
    pub fn use_animation_from(&mut self, other: &Self) -> usize {
        let mut matched = 0;
        for joint in self.hierarchy.joints_mut() {
            match other.hierarchy.find_by_name(&joint.name).and_then(|i| other.hierarchy.joint(i)) {
                Some(source) => {
                    joint.position_keys = source.position_keys.clone();
                    joint.rotation_keys = source.rotation_keys.clone();
                    joint.scale_keys = source.scale_keys.clone();
                    matched += 1;
                }
                None => warn!(
                    "{}: joint '{}' has no counterpart in '{}'",
                    self.name, joint.name, other.name
                ),
            }
        }

        if matched > 0 {
            self.declared_frames = other.declared_frames;
            self.animation_speed = other.animation_speed;
            self.prepare_animation();
            self.has_animation |= self.hierarchy.weight_count() > 0;
        }
        matched
    }

    /// Compute tangent frames for every render buffer
    pub fn compute_tangents(&mut self) {
        for buffer in &mut self.buffers {
            buffer.compute_tangents();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Key;
    use crate::buffer::Vertex;
    use glam::{Quat, Vec2, Vec3};

    fn triangle_buffer() -> RenderBuffer {
        let mut buffer = RenderBuffer::new(0);
        buffer.vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(0.0, 10.0, 0.0), Vec3::Z, Vec2::ZERO),
        ];
        buffer.indices = vec![0, 1, 2];
        buffer
    }

    #[test]
    fn test_static_mesh_has_one_frame() {
        let mut mesh = SkinnedMesh::new("static", MeshFormat::B3d);
        mesh.add_buffer(triangle_buffer());
        mesh.hierarchy_mut().create_joint("root", None);
        mesh.finalize(&LoaderOptions::default());

        assert!(!mesh.has_animation());
        assert_eq!(mesh.frame_count(), 1);
        let bounds = mesh.bounding_box();
        assert_eq!(bounds.min, Vec3::new(-0.5, -0.5, 0.0));
        assert_eq!(bounds.max, Vec3::new(10.5, 10.5, 0.0));
    }

    #[test]
    fn test_keys_padded_to_animation_length() {
        let mut mesh = SkinnedMesh::new("anim", MeshFormat::B3d);
        let a = mesh.hierarchy_mut().create_joint("a", None);
        let b = mesh.hierarchy_mut().create_joint("b", Some(a));
        {
            let joint = mesh.hierarchy_mut().joint_mut(a).unwrap();
            joint.position_keys.push(100.0, Vec3::X);
            joint.position_keys.push(200.0, Vec3::Y);
        }
        mesh.hierarchy_mut()
            .joint_mut(b)
            .unwrap()
            .rotation_keys
            .push(500.0, Quat::IDENTITY);
        mesh.finalize(&LoaderOptions::default());

        assert!(mesh.has_animation());
        assert_eq!(mesh.animation_frames(), 500.0);
        assert_eq!(mesh.frame_count(), 500);

        let keys = mesh.hierarchy().joint(a).unwrap().position_keys.keys().to_vec();
        assert_eq!(
            keys,
            vec![
                Key::new(0.0, Vec3::X),
                Key::new(100.0, Vec3::X),
                Key::new(200.0, Vec3::Y),
                Key::new(500.0, Vec3::Y),
            ]
        );
    }

    #[test]
    fn test_out_of_range_weights_are_dropped() {
        let mut mesh = SkinnedMesh::new("weights", MeshFormat::X);
        mesh.add_buffer(triangle_buffer());
        let j = mesh.hierarchy_mut().create_joint("j", None);
        assert!(mesh.add_weight(j, 0, 1, 1.0));
        assert!(mesh.add_weight(j, 0, 3, 1.0));
        assert!(mesh.add_weight(j, 4, 0, 1.0));
        assert!(!mesh.add_weight(9, 0, 0, 1.0));
        mesh.finalize(&LoaderOptions::default());

        let weights = &mesh.hierarchy().joint(j).unwrap().weights;
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].vertex, 1);
        assert!(mesh.has_animation(), "weighted meshes count as animated");
    }

    #[test]
    fn test_reset_policy_keeps_indices_in_range() {
        let mut mesh = SkinnedMesh::new("weights", MeshFormat::X);
        mesh.add_buffer(triangle_buffer());
        let j = mesh.hierarchy_mut().create_joint("j", None);
        mesh.add_weight(j, 0, 7, 1.0);
        let options = LoaderOptions {
            weight_index_policy: WeightIndexPolicy::ResetToZero,
            normalize_weights: false,
            ..LoaderOptions::default()
        };
        mesh.finalize(&options);

        let weights = &mesh.hierarchy().joint(j).unwrap().weights;
        assert_eq!(weights.len(), 1);
        assert_eq!((weights[0].buffer, weights[0].vertex), (0, 0));
        assert_eq!(weights[0].strength, 0.0);
    }

    #[test]
    fn test_use_animation_from_matches_names() {
        let mut target = SkinnedMesh::new("body", MeshFormat::B3d);
        target.hierarchy_mut().create_joint("Hip", None);
        target.hierarchy_mut().create_joint("Tail", Some(0));
        target.finalize(&LoaderOptions::default());

        let mut source = SkinnedMesh::new("walk", MeshFormat::B3d);
        let hip = source.hierarchy_mut().create_joint("Hip", None);
        source
            .hierarchy_mut()
            .joint_mut(hip)
            .unwrap()
            .position_keys
            .push(300.0, Vec3::Z);
        source.finalize(&LoaderOptions::default());

        assert_eq!(target.use_animation_from(&source), 1);
        assert!(target.has_animation());
        assert_eq!(target.animation_frames(), 300.0);
        assert!(!target.hierarchy().joint(0).unwrap().position_keys.is_empty());
        assert!(!target.hierarchy().joint(1).unwrap().has_keys());
    }

    #[test]
    fn test_joint_introspection() {
        let mut mesh = SkinnedMesh::new("intro", MeshFormat::Ms3d);
        mesh.hierarchy_mut().create_joint("Root", None);
        mesh.hierarchy_mut().create_joint("Hand", Some(0));
        mesh.finalize(&LoaderOptions::default());
        assert_eq!(mesh.joint_count(), 2);
        assert_eq!(mesh.joint_name(1), Some("Hand"));
        assert_eq!(mesh.joint_index_by_name("Hand"), Some(1));
        assert_eq!(mesh.joint_index_by_name("Foot"), None);
        assert_eq!(mesh.joint_bind_global(0), Some(Mat4::IDENTITY));
    }
}
