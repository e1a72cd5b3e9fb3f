//! Vertex skinning
//!
//! This module blends per-joint transforms into final vertex positions and
//! normals. Every joint contributes `animated global × bind inverse`, which
//! carries a bind-pose vertex into the joint's current animated placement.
//!
//! # Features
//!
//! - **Weighted blending**: any number of joint influences per vertex, pre-normalized to sum to one
//! - **Normal skinning**: normals follow the rotational part of the blend and are re-normalized
//! - **Rigid attachment**: unweighted buffers attached to a joint move with that joint
//! - **Per-instance output**: the shared asset is read-only; results go into caller-owned buffers
//!
//! # Example
//!
//! ```rust,no_run
//! use skinned_mesh::skinning::{SkinningEngine, SkinningOptions};
//! use skinned_mesh::animation::Pose;
//! use skinned_mesh::{load_mesh, LoaderOptions};
//!
//! let mesh = load_mesh("models/ninja.b3d", &LoaderOptions::default())?;
//! let pose = Pose::bind(mesh.hierarchy());
//! let mut output = mesh.buffers().to_vec();
//!
//! let mut engine = SkinningEngine::new();
//! engine.skin(&mesh, &pose.globals, &SkinningOptions::default(), &mut output);
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

use glam::{Mat3, Mat4, Vec3};

use crate::buffer::RenderBuffer;
use crate::mesh::SkinnedMesh;

/// Options for controlling the skinning behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinningOptions {
    /// Whether normals are skinned along with positions
    pub update_normals: bool,
    /// When true, vertex blending is left to the GPU and only joint
    /// matrices are produced
    pub hardware_skinning: bool,
}

impl Default for SkinningOptions {
    fn default() -> Self {
        Self {
            update_normals: true,
            hardware_skinning: false,
        }
    }
}

/// Reusable scratch state for skinning passes
#[derive(Debug, Clone, Default)]
pub struct SkinningEngine {
    combined: Vec<Mat4>,
    touched: Vec<Vec<bool>>,
}

impl SkinningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joint matrices last used for skinning (animated global × bind inverse)
    pub fn combined_matrices(&self) -> &[Mat4] {
        &self.combined
    }

    /// Skin `mesh` with the animated joint `globals` into `output`
    ///
    /// `output` must be a per-instance copy of the mesh's render buffers;
    /// bind-pose data is always read from `mesh`, so repeated passes do not
    /// accumulate error.
    pub fn skin(
        &mut self,
        mesh: &SkinnedMesh,
        globals: &[Mat4],
        options: &SkinningOptions,
        output: &mut [RenderBuffer],
    ) {
        let hierarchy = mesh.hierarchy();
        let source = mesh.buffers();

        // 1. Combined matrix per joint
        self.combined.clear();
        self.combined.extend(
            hierarchy
                .iter()
                .enumerate()
                .map(|(i, joint)| globals.get(i).copied().unwrap_or(joint.global) * joint.global_inverse),
        );

        if options.hardware_skinning {
            return;
        }

        // 2. Clear every weighted vertex
        self.touched.resize(source.len(), Vec::new());
        for (flags, buffer) in self.touched.iter_mut().zip(source) {
            flags.clear();
            flags.resize(buffer.vertices.len(), false);
        }

        for weight in hierarchy.iter().flat_map(|j| j.weights.iter()) {
            let Some(flag) = self
                .touched
                .get_mut(weight.buffer)
                .and_then(|f| f.get_mut(weight.vertex))
            else {
                continue;
            };
            let Some(vertex) = output
                .get_mut(weight.buffer)
                .and_then(|b| b.vertices.get_mut(weight.vertex))
            else {
                continue;
            };
            if !*flag {
                *flag = true;
                vertex.position = Vec3::ZERO;
                if options.update_normals {
                    vertex.normal = Vec3::ZERO;
                }
            }
        }

        // 3. Accumulate weighted contributions from the bind pose
        for (joint_index, joint) in hierarchy.iter().enumerate() {
            if joint.weights.is_empty() {
                continue;
            }
            let matrix = self.combined[joint_index];
            let rotation = Mat3::from_mat4(matrix);

            for weight in &joint.weights {
                let Some(bind) = source
                    .get(weight.buffer)
                    .and_then(|b| b.vertices.get(weight.vertex))
                else {
                    continue;
                };
                let Some(vertex) = output
                    .get_mut(weight.buffer)
                    .and_then(|b| b.vertices.get_mut(weight.vertex))
                else {
                    continue;
                };

                vertex.position += matrix.transform_point3(bind.position) * weight.strength;
                if options.update_normals {
                    vertex.normal += (rotation * bind.normal) * weight.strength;
                }
            }
        }

        // 4. Rigid attachment for unweighted vertices of attached buffers
        for (joint_index, joint) in hierarchy.iter().enumerate() {
            if joint.attached_buffers.is_empty() {
                continue;
            }
            let matrix = self.combined[joint_index];
            let rotation = Mat3::from_mat4(matrix);

            for &buffer_index in &joint.attached_buffers {
                let (Some(bind), Some(out), Some(flags)) = (
                    source.get(buffer_index),
                    output.get_mut(buffer_index),
                    self.touched.get(buffer_index),
                ) else {
                    continue;
                };
                for ((vertex, bind_vertex), &weighted) in
                    out.vertices.iter_mut().zip(&bind.vertices).zip(flags)
                {
                    if weighted {
                        continue;
                    }
                    vertex.position = matrix.transform_point3(bind_vertex.position);
                    if options.update_normals {
                        vertex.normal = (rotation * bind_vertex.normal).normalize_or_zero();
                    }
                }
            }
        }

        // 5. Re-normalize blended normals and refresh bounds
        for (buffer, flags) in output.iter_mut().zip(&self.touched) {
            if options.update_normals {
                for (vertex, &weighted) in buffer.vertices.iter_mut().zip(flags) {
                    if weighted {
                        vertex.normal = vertex.normal.normalize_or_zero();
                    }
                }
            }
            buffer.recalculate_bounding_box();
        }
    }
}
