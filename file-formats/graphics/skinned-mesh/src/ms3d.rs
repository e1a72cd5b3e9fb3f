//! MilkShape 3D (`.ms3d`) loader
//!
//! MS3D files are a flat sequence of packed little-endian records: vertices,
//! triangles, groups, materials, animation timing and joints. Versions 3 and
//! 4 are accepted; trailing version 4 extensions (comments, extra weights)
//! are ignored.
//!
//! Joint keyframes are stored in seconds, relative to the joint's bind pose.
//! They are converted to milliseconds
//! ([`FrameUnit::Ms3dMillis`](crate::FrameUnit::Ms3dMillis)) and to absolute
//! local channels while loading, so sampling treats them like any other
//! format.

use std::collections::HashMap;
use std::io::{Read, Seek};

use glam::{EulerRot, Quat, Vec2, Vec3, Vec4};
use log::{debug, warn};
use mesh_data::ByteStream;

use crate::buffer::{Material, MaterialKind, RenderBuffer, TextureLayer, Vertex};
use crate::error::{MeshError, Result};
use crate::loader::{LoaderOptions, MeshFormat};
use crate::mesh::SkinnedMesh;

/// File identifier preceding the version number
pub const MAGIC: &[u8; 10] = b"MS3D000000";

const NAME_WIDTH: usize = 32;
const PATH_WIDTH: usize = 128;

#[derive(Debug, Clone, Copy)]
struct Ms3dVertex {
    position: Vec3,
    bone: i8,
}

#[derive(Debug, Clone, Copy)]
struct Ms3dTriangle {
    vertices: [u16; 3],
    normals: [Vec3; 3],
    s: [f32; 3],
    t: [f32; 3],
}

#[derive(Debug, Clone)]
struct Ms3dGroup {
    name: String,
    triangles: Vec<u16>,
    material: Option<usize>,
}

#[derive(Debug, Clone)]
struct Ms3dJoint {
    name: String,
    parent_name: String,
    rotation: Vec3,
    position: Vec3,
    rotation_keys: Vec<(f32, Vec3)>,
    position_keys: Vec<(f32, Vec3)>,
}

/// Rotation of MS3D euler angles in radians, applied X first, then Y, then Z
fn euler_to_quat(angles: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, angles.z, angles.y, angles.x)
}

/// Load an MS3D mesh and finalize it for playback
pub fn load<R: Read + Seek>(stream: &mut ByteStream<R>, options: &LoaderOptions) -> Result<SkinnedMesh> {
    let name = stream.name().to_string();

    let magic = stream.read_bytes(MAGIC.len())?;
    if magic != MAGIC {
        return Err(MeshError::InvalidMagic {
            expected: "MS3D000000".to_string(),
            actual: String::from_utf8_lossy(&magic).into_owned(),
        });
    }
    let version = stream.read_i32()?;
    if !(3..=4).contains(&version) {
        return Err(MeshError::UnsupportedVersion(format!(
            "{name}: MS3D version {version}, only 3 and 4 are supported"
        )));
    }

    let vertex_count = stream.read_u16()?;
    let mut vertices = Vec::with_capacity(usize::from(vertex_count));
    for _ in 0..vertex_count {
        let _flags = stream.read_u8()?;
        let position = stream.read_vec3()?;
        let bone = stream.read_i8()?;
        let _reference_count = stream.read_u8()?;
        vertices.push(Ms3dVertex { position, bone });
    }

    let triangle_count = stream.read_u16()?;
    let mut triangles = Vec::with_capacity(usize::from(triangle_count));
    for _ in 0..triangle_count {
        let _flags = stream.read_u16()?;
        let vertices = [stream.read_u16()?, stream.read_u16()?, stream.read_u16()?];
        let normals = [stream.read_vec3()?, stream.read_vec3()?, stream.read_vec3()?];
        let s = [stream.read_f32()?, stream.read_f32()?, stream.read_f32()?];
        let t = [stream.read_f32()?, stream.read_f32()?, stream.read_f32()?];
        let _smoothing_group = stream.read_u8()?;
        let _group = stream.read_u8()?;
        triangles.push(Ms3dTriangle {
            vertices,
            normals,
            s,
            t,
        });
    }

    let group_count = stream.read_u16()?;
    let mut groups = Vec::with_capacity(usize::from(group_count));
    for _ in 0..group_count {
        let _flags = stream.read_u8()?;
        let group_name = stream.read_fixed_string(NAME_WIDTH)?;
        let count = stream.read_u16()?;
        let mut ids = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            ids.push(stream.read_u16()?);
        }
        let material = stream.read_i8()?;
        groups.push(Ms3dGroup {
            name: group_name,
            triangles: ids,
            material: usize::try_from(material).ok(),
        });
    }

    let mut mesh = SkinnedMesh::new(name.as_str(), MeshFormat::Ms3d);

    let material_count = stream.read_u16()?;
    for _ in 0..material_count {
        let material = read_material(stream)?;
        mesh.add_material(material);
    }
    if mesh.materials().is_empty() {
        mesh.add_material(Material::named("default"));
    }

    let fps = stream.read_f32()?;
    let _current_time = stream.read_f32()?;
    let total_frames = stream.read_i32()?;
    if fps > 0.0 && total_frames > 0 {
        mesh.set_declared_frames(total_frames as f32 / fps * 1000.0);
    }

    let joint_count = stream.read_u16()?;
    let mut joints = Vec::with_capacity(usize::from(joint_count));
    for _ in 0..joint_count {
        joints.push(read_joint(stream)?);
    }

    build_joints(&mut mesh, &joints);
    build_geometry(&mut mesh, &vertices, &triangles, &groups);

    debug!(
        "{}: MS3D v{} with {} vertices, {} triangles, {} groups, {} joints",
        name, version, vertex_count, triangle_count, group_count, joint_count
    );

    mesh.finalize(options);
    Ok(mesh)
}

fn read_material<R: Read + Seek>(stream: &mut ByteStream<R>) -> Result<Material> {
    let name = stream.read_fixed_string(NAME_WIDTH)?;
    let mut read_color = || -> Result<Vec4> {
        Ok(Vec4::new(
            stream.read_f32()?,
            stream.read_f32()?,
            stream.read_f32()?,
            stream.read_f32()?,
        ))
    };
    let ambient = read_color()?;
    let diffuse = read_color()?;
    let specular = read_color()?;
    let emissive = read_color()?;
    let shininess = stream.read_f32()?;
    let transparency = stream.read_f32()?;
    let _mode = stream.read_u8()?;
    let texture = stream.read_fixed_string(PATH_WIDTH)?;
    let alpha_map = stream.read_fixed_string(PATH_WIDTH)?;

    let mut material = Material::named(name);
    material.ambient = ambient;
    material.diffuse = diffuse.truncate().extend(transparency.clamp(0.0, 1.0));
    material.specular = specular;
    material.emissive = emissive;
    material.shininess = shininess;
    if !texture.is_empty() {
        material.textures.push(TextureLayer::new(texture));
    }
    if !alpha_map.is_empty() {
        material.kind = MaterialKind::AlphaChannel;
    } else if transparency < 1.0 {
        material.kind = MaterialKind::VertexAlpha;
    }
    Ok(material)
}

fn read_joint<R: Read + Seek>(stream: &mut ByteStream<R>) -> Result<Ms3dJoint> {
    let _flags = stream.read_u8()?;
    let name = stream.read_fixed_string(NAME_WIDTH)?;
    let parent_name = stream.read_fixed_string(NAME_WIDTH)?;
    let rotation = stream.read_vec3()?;
    let position = stream.read_vec3()?;
    let rotation_count = stream.read_u16()?;
    let position_count = stream.read_u16()?;

    let mut rotation_keys = Vec::with_capacity(usize::from(rotation_count));
    for _ in 0..rotation_count {
        let time = stream.read_f32()? * 1000.0;
        rotation_keys.push((time, stream.read_vec3()?));
    }
    let mut position_keys = Vec::with_capacity(usize::from(position_count));
    for _ in 0..position_count {
        let time = stream.read_f32()? * 1000.0;
        position_keys.push((time, stream.read_vec3()?));
    }

    Ok(Ms3dJoint {
        name,
        parent_name,
        rotation,
        position,
        rotation_keys,
        position_keys,
    })
}

/// Create joints, link parents by name and convert relative keys to absolute
fn build_joints(mesh: &mut SkinnedMesh, joints: &[Ms3dJoint]) {
    let name = mesh.name().to_string();
    let hierarchy = mesh.hierarchy_mut();
    for joint in joints {
        hierarchy.create_joint(joint.name.clone(), None);
    }

    for (index, joint) in joints.iter().enumerate() {
        if joint.parent_name.is_empty() {
            continue;
        }
        let parent = joints
            .iter()
            .enumerate()
            .find(|(other, j)| *other != index && j.name == joint.parent_name)
            .map(|(other, _)| other);
        match parent {
            Some(parent) => {
                if !hierarchy.set_parent(index, Some(parent)) {
                    warn!("{}: joint '{}' would form a cycle with '{}'", name, joint.name, joint.parent_name);
                }
            }
            None => warn!(
                "{}: joint '{}' has unknown parent '{}'",
                name, joint.name, joint.parent_name
            ),
        }
    }

    for (index, source) in joints.iter().enumerate() {
        let Some(joint) = hierarchy.joint_mut(index) else {
            continue;
        };
        let bind_rotation = euler_to_quat(source.rotation);
        joint.set_local_trs(source.position, bind_rotation, Vec3::ONE);

        for &(time, offset) in &source.position_keys {
            joint.position_keys.push(time, source.position + bind_rotation * offset);
        }
        for &(time, angles) in &source.rotation_keys {
            joint
                .rotation_keys
                .push(time, (bind_rotation * euler_to_quat(angles)).normalize());
        }
    }
}

/// Split triangles into one buffer per material and weight vertices to bones
fn build_geometry(
    mesh: &mut SkinnedMesh,
    vertices: &[Ms3dVertex],
    triangles: &[Ms3dTriangle],
    groups: &[Ms3dGroup],
) {
    let name = mesh.name().to_string();
    let material_count = mesh.materials().len();
    let joint_count = mesh.joint_count();

    let mut buffer_for_material: HashMap<usize, usize> = HashMap::new();
    let mut remaps: HashMap<usize, HashMap<(u16, [u32; 5]), u32>> = HashMap::new();
    let mut weights: Vec<(usize, usize, usize)> = Vec::new();
    let mut warned_bones = false;

    for group in groups {
        let material = group.material.filter(|&m| m < material_count).unwrap_or(0);
        let buffer = *buffer_for_material
            .entry(material)
            .or_insert_with(|| mesh.add_buffer(RenderBuffer::new(material)));
        let color = mesh.material(material).map_or(Vec4::ONE, |m| m.diffuse);

        for &triangle_id in &group.triangles {
            let Some(triangle) = triangles.get(usize::from(triangle_id)) else {
                warn!("{}: group '{}' references missing triangle {}", name, group.name, triangle_id);
                continue;
            };
            if triangle.vertices.iter().any(|&v| usize::from(v) >= vertices.len()) {
                warn!("{}: triangle {} references a missing vertex", name, triangle_id);
                continue;
            }

            for corner in 0..3 {
                let vertex_id = triangle.vertices[corner];
                let source = vertices[usize::from(vertex_id)];
                let normal = triangle.normals[corner];
                let uv = Vec2::new(triangle.s[corner], triangle.t[corner]);
                let key = (
                    vertex_id,
                    [
                        normal.x.to_bits(),
                        normal.y.to_bits(),
                        normal.z.to_bits(),
                        uv.x.to_bits(),
                        uv.y.to_bits(),
                    ],
                );

                let remap = remaps.entry(buffer).or_default();
                let index = match remap.get(&key) {
                    Some(&index) => index,
                    None => {
                        let render_buffer = &mut mesh.buffers_mut()[buffer];
                        let index = render_buffer.vertices.len();
                        render_buffer.vertices.push(Vertex {
                            position: source.position,
                            normal: normal.normalize_or_zero(),
                            uv,
                            color,
                            ..Vertex::default()
                        });
                        remap.insert(key, index as u32);

                        match usize::try_from(source.bone) {
                            Ok(bone) if bone < joint_count => weights.push((bone, buffer, index)),
                            Ok(bone) => {
                                if !warned_bones {
                                    warn!("{}: vertex {} references missing joint {}", name, vertex_id, bone);
                                    warned_bones = true;
                                }
                            }
                            // Negative ids leave the vertex in the bind pose
                            Err(_) => {}
                        }
                        index as u32
                    }
                };
                mesh.buffers_mut()[buffer].indices.push(index);
            }
        }
    }

    for (joint, buffer, vertex) in weights {
        mesh.add_weight(joint, buffer, vertex, 1.0);
    }
}
