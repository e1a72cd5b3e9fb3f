//! Conversion of a parsed X document into a [`SkinnedMesh`]

use std::collections::HashMap;

use glam::{Mat3, Mat4, Vec2, Vec4};
use log::{debug, info, warn};

use super::parser::{XDocument, XKeys, XMaterial, XMesh};
use crate::buffer::{Material, MaterialKind, RenderBuffer, TextureLayer, Vertex};
use crate::error::{MeshError, Result};
use crate::loader::{LoaderOptions, MeshFormat, WeightIndexPolicy};
use crate::mesh::SkinnedMesh;

/// Where one X vertex ended up: a buffer and an index inside it
#[derive(Debug, Clone, Copy)]
struct VertexCopy {
    buffer: usize,
    index: usize,
}

pub struct MeshBuilder<'a> {
    name: &'a str,
    options: &'a LoaderOptions,
    mesh: SkinnedMesh,
    default_material: Option<usize>,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(name: &'a str, options: &'a LoaderOptions) -> Self {
        Self {
            name,
            options,
            mesh: SkinnedMesh::new(name, MeshFormat::X),
            default_material: None,
        }
    }

    pub fn build(mut self, document: XDocument) -> Result<SkinnedMesh> {
        for frame in &document.frames {
            let hierarchy = self.mesh.hierarchy_mut();
            let index = hierarchy.create_joint(frame.name.clone(), frame.parent);
            if let Some(joint) = hierarchy.joint_mut(index) {
                joint.set_local(frame.transform);
            }
        }
        self.mesh.hierarchy_mut().compute_bind_globals();

        for x_mesh in &document.meshes {
            self.build_mesh(x_mesh)?;
        }

        if let Some(ticks) = document.ticks_per_second {
            self.mesh.set_animation_speed(ticks);
        }
        self.build_animation(&document);

        Ok(self.mesh)
    }

    fn frame_global(&self, frame: Option<usize>) -> Mat4 {
        frame
            .and_then(|f| self.mesh.hierarchy().joint(f))
            .map_or(Mat4::IDENTITY, |j| j.global)
    }

    fn default_material(&mut self) -> usize {
        match self.default_material {
            Some(index) => index,
            None => {
                let index = self.mesh.add_material(Material::named("default"));
                self.default_material = Some(index);
                index
            }
        }
    }

    fn build_mesh(&mut self, x_mesh: &XMesh) -> Result<()> {
        let global = self.frame_global(x_mesh.frame);
        let normal_matrix = Mat3::from_mat4(global);

        // One mesh material slot maps to one mesh-level material
        let material_slots: Vec<usize> = x_mesh
            .materials
            .iter()
            .map(|m| self.mesh.add_material(convert_material(m)))
            .collect();

        let use_normals = if x_mesh.normal_faces.is_empty() {
            false
        } else if x_mesh.normal_faces.len() != x_mesh.faces.len() {
            warn!(
                "{}: mesh '{}' has {} normal faces for {} faces, ignoring normals",
                self.name,
                x_mesh.name,
                x_mesh.normal_faces.len(),
                x_mesh.faces.len()
            );
            false
        } else {
            true
        };

        let mut buffer_for_slot: HashMap<usize, usize> = HashMap::new();
        let mut remaps: HashMap<usize, HashMap<(usize, Option<usize>), u32>> = HashMap::new();
        let mut copies: Vec<Vec<VertexCopy>> = vec![Vec::new(); x_mesh.positions.len()];
        let mut missing_normals: Vec<usize> = Vec::new();
        let mut warned_face_normals = false;

        for (face_index, face) in x_mesh.faces.iter().enumerate() {
            if face.len() < 3 {
                continue;
            }

            let slot = x_mesh.face_materials.get(face_index).copied().unwrap_or(0);
            let material = match material_slots.get(slot) {
                Some(&m) => m,
                None => {
                    if !material_slots.is_empty() {
                        warn!(
                            "{}: face {} of mesh '{}' uses missing material {}",
                            self.name, face_index, x_mesh.name, slot
                        );
                    }
                    self.default_material()
                }
            };
            let buffer = *buffer_for_slot
                .entry(material)
                .or_insert_with(|| self.mesh.add_buffer(RenderBuffer::new(material)));

            let normal_face = if use_normals {
                let normal_face = &x_mesh.normal_faces[face_index];
                if normal_face.len() == face.len() {
                    Some(normal_face)
                } else {
                    if !warned_face_normals {
                        warn!(
                            "{}: mesh '{}' has normal faces that do not match their faces",
                            self.name, x_mesh.name
                        );
                        warned_face_normals = true;
                    }
                    None
                }
            } else {
                None
            };

            let mut corners = Vec::with_capacity(face.len());
            for (corner, &position) in face.iter().enumerate() {
                let Some(&source) = x_mesh.positions.get(position) else {
                    return Err(MeshError::Validation(format!(
                        "{}: face {} of mesh '{}' references vertex {} of {}",
                        self.name,
                        face_index,
                        x_mesh.name,
                        position,
                        x_mesh.positions.len()
                    )));
                };
                let normal_index = normal_face
                    .and_then(|f| f.get(corner).copied())
                    .filter(|&n| n < x_mesh.normals.len());

                let remap = remaps.entry(buffer).or_default();
                let index = match remap.get(&(position, normal_index)) {
                    Some(&index) => index,
                    None => {
                        let render_buffer = &mut self.mesh.buffers_mut()[buffer];
                        let index = render_buffer.vertices.len();
                        let normal = normal_index
                            .map(|n| (normal_matrix * x_mesh.normals[n]).normalize_or_zero())
                            .unwrap_or_default();
                        render_buffer.vertices.push(Vertex {
                            position: global.transform_point3(source),
                            normal,
                            uv: x_mesh.uvs.get(position).copied().unwrap_or(Vec2::ZERO),
                            color: x_mesh.colors.get(&position).copied().unwrap_or(Vec4::ONE),
                            ..Vertex::default()
                        });
                        if normal_index.is_none() && !missing_normals.contains(&buffer) {
                            missing_normals.push(buffer);
                        }
                        remap.insert((position, normal_index), index as u32);
                        copies[position].push(VertexCopy { buffer, index });
                        index as u32
                    }
                };
                corners.push(index);
            }

            let indices = &mut self.mesh.buffers_mut()[buffer].indices;
            for k in 1..corners.len() - 1 {
                if self.options.flip_x_winding {
                    indices.extend_from_slice(&[corners[0], corners[k + 1], corners[k]]);
                } else {
                    indices.extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
                }
            }
        }

        if self.options.generate_missing_normals {
            for &buffer in &missing_normals {
                self.mesh.buffers_mut()[buffer].compute_normals();
            }
        }

        let buffers: Vec<usize> = {
            let mut buffers: Vec<usize> = buffer_for_slot.values().copied().collect();
            buffers.sort_unstable();
            buffers
        };

        if x_mesh.skinned && !x_mesh.skin_weights.is_empty() {
            self.apply_skin_weights(x_mesh, global, &copies);
        } else if let Some(frame) = x_mesh.frame {
            for buffer in buffers {
                self.mesh.attach_buffer(buffer, frame);
            }
        }

        debug!(
            "{}: built mesh '{}' into {} buffers",
            self.name,
            x_mesh.name,
            buffer_for_slot.len()
        );
        Ok(())
    }

    fn apply_skin_weights(&mut self, x_mesh: &XMesh, global: Mat4, copies: &[Vec<VertexCopy>]) {
        let global_inverse = global.inverse();
        let mut covered = vec![false; x_mesh.positions.len()];

        for set in &x_mesh.skin_weights {
            let Some(joint) = self.mesh.joint_index_by_name(&set.frame_name) else {
                warn!(
                    "{}: skin weights reference unknown frame '{}'",
                    self.name, set.frame_name
                );
                continue;
            };
            // Vertices were moved into bind space, so the offset must undo that first
            if let Some(j) = self.mesh.hierarchy_mut().joint_mut(joint) {
                j.skin_offset = Some(set.offset * global_inverse);
            }

            for (&position, &strength) in set.indices.iter().zip(&set.weights) {
                match copies.get(position) {
                    Some(targets) => {
                        covered[position] = true;
                        for copy in targets {
                            self.mesh.add_weight(joint, copy.buffer, copy.index, strength);
                        }
                    }
                    None => {
                        warn!(
                            "{}: skin weight of '{}' references vertex {} of {}",
                            self.name,
                            set.frame_name,
                            position,
                            x_mesh.positions.len()
                        );
                        if self.options.weight_index_policy == WeightIndexPolicy::ResetToZero {
                            self.mesh.add_weight(joint, 0, 0, 0.0);
                        }
                    }
                }
            }
        }

        // Uncovered vertices follow the frame the mesh is declared in
        if let Some(frame) = x_mesh.frame {
            for (position, targets) in copies.iter().enumerate() {
                if covered[position] {
                    continue;
                }
                for copy in targets {
                    self.mesh.add_weight(frame, copy.buffer, copy.index, 1.0);
                }
            }
        }
    }

    fn build_animation(&mut self, document: &XDocument) {
        let Some(set) = document.animation_sets.first() else {
            return;
        };
        for extra in document.animation_sets.iter().skip(1) {
            info!(
                "{}: ignoring animation set '{}', only '{}' is used",
                self.name, extra.name, set.name
            );
        }

        for animation in &set.animations {
            let Some(index) = self.mesh.joint_index_by_name(&animation.frame_name) else {
                warn!(
                    "{}: animation references unknown frame '{}'",
                    self.name, animation.frame_name
                );
                continue;
            };
            let Some(joint) = self.mesh.hierarchy_mut().joint_mut(index) else {
                continue;
            };

            for keys in &animation.keys {
                match keys {
                    XKeys::Rotation(keys) => {
                        for &(frame, rotation) in keys {
                            joint.rotation_keys.push(frame, rotation);
                        }
                    }
                    XKeys::Scale(keys) => {
                        for &(frame, scale) in keys {
                            joint.scale_keys.push(frame, scale);
                        }
                    }
                    XKeys::Position(keys) => {
                        for &(frame, position) in keys {
                            joint.position_keys.push(frame, position);
                        }
                    }
                    XKeys::Matrix(keys) => {
                        for &(frame, matrix) in keys {
                            let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
                            joint.position_keys.push(frame, translation);
                            joint.rotation_keys.push(frame, rotation);
                            joint.scale_keys.push(frame, scale);
                        }
                    }
                }
            }
        }
    }
}

fn convert_material(x: &XMaterial) -> Material {
    let mut material = Material::named(x.name.clone());
    material.diffuse = x.diffuse;
    material.ambient = x.diffuse;
    material.specular = x.specular.extend(1.0);
    material.emissive = x.emissive.extend(1.0);
    material.shininess = x.power;
    if x.diffuse.w < 1.0 {
        material.kind = MaterialKind::VertexAlpha;
    }
    if let Some(texture) = &x.texture {
        material.textures.push(TextureLayer::new(texture.clone()));
    }
    material
}
