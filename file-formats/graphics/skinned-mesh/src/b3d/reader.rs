//! Recursive chunk handlers for B3D files

use std::collections::HashSet;
use std::io::{Read, Seek};

use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use log::{debug, trace, warn};
use mesh_data::chunk::tag_to_string;
use mesh_data::{ByteStream, ChunkHeader, ChunkReader};

use super::{BLEND_MULTIPLY_2X, BrushFx, FRAME_SCALE, KeyFlags, MAGIC, TextureFlags, VertexFlags};
use crate::animation::Key;
use crate::buffer::{
    MAX_TEXTURE_LAYERS, Material, MaterialKind, RenderBuffer, RenderFlags, TextureLayer, Vertex,
};
use crate::error::{MeshError, Result};
use crate::loader::{LoaderOptions, MeshFormat, WeightIndexPolicy};
use crate::mesh::SkinnedMesh;

/// Most texture coordinate sets a `VRTS` block may declare
const MAX_TEX_COORD_SETS: i32 = 8;
/// Most components per texture coordinate set
const MAX_TEX_COORD_SIZE: i32 = 4;

/// One buffer-local copy of a file vertex
#[derive(Debug, Clone, Copy)]
struct VertexCopy {
    buffer: usize,
    index: u32,
}

/// Buffers created by one `MESH` chunk and the node that owns them
#[derive(Debug)]
struct MeshNode {
    joint: usize,
    buffers: Vec<usize>,
}

/// Per-brush values applied to vertices as they are copied into a buffer
#[derive(Debug, Clone, Copy)]
struct Surface {
    alpha: f32,
    uv_scale: Vec2,
}

/// Streaming B3D parser producing an unfinalized [`SkinnedMesh`]
pub struct B3dReader<'a, R> {
    stream: &'a mut ByteStream<R>,
    chunks: ChunkReader,
    options: &'a LoaderOptions,
    mesh: SkinnedMesh,
    textures: Vec<TextureLayer>,
    /// Mesh material index of every brush, in file order
    brush_materials: Vec<usize>,
    default_material: Option<usize>,
    /// Every vertex of every `VRTS` block, in bind-world space
    base_vertices: Vec<Vertex>,
    copies: Vec<Vec<VertexCopy>>,
    /// First file vertex of the most recent `MESH`
    vertices_start: usize,
    normals_in_file: bool,
    mesh_nodes: Vec<MeshNode>,
    warned_texture_layers: bool,
}

impl<'a, R: Read + Seek> B3dReader<'a, R> {
    pub fn new(stream: &'a mut ByteStream<R>, options: &'a LoaderOptions) -> Self {
        let name = stream.name().to_string();
        Self {
            stream,
            chunks: ChunkReader::with_max_depth(options.max_chunk_depth),
            options,
            mesh: SkinnedMesh::new(name, MeshFormat::B3d),
            textures: Vec::new(),
            brush_materials: Vec::new(),
            default_material: None,
            base_vertices: Vec::new(),
            copies: Vec::new(),
            vertices_start: 0,
            normals_in_file: false,
            mesh_nodes: Vec::new(),
            warned_texture_layers: false,
        }
    }

    /// Parse the whole file
    pub fn read(mut self) -> Result<SkinnedMesh> {
        let start = self.stream.position();
        let tag = self.stream.read_tag()?;
        if &tag != MAGIC {
            return Err(MeshError::InvalidMagic {
                expected: tag_to_string(MAGIC),
                actual: tag_to_string(&tag),
            });
        }
        self.stream.seek_to(start)?;

        self.chunks.enter_chunk(self.stream)?;
        let version = self.stream.read_i32()?;
        debug!("{}: B3D version {}", self.stream.name(), version);

        while self.has_child() {
            let header = self.chunks.enter_chunk(self.stream)?;
            match &header.tag {
                b"TEXS" => self.read_texs()?,
                b"BRUS" => self.read_brus()?,
                b"NODE" => self.read_node(None)?,
                _ => self.skip_unknown(&header, "BB3D"),
            }
            self.chunks.exit_chunk(self.stream)?;
        }
        self.chunks.exit_chunk(self.stream)?;

        self.attach_unweighted_buffers();
        Ok(self.mesh)
    }

    fn file(&self) -> String {
        self.stream.name().to_string()
    }

    /// Unread body bytes of the innermost open chunk
    fn body_remaining(&self) -> u64 {
        self.chunks
            .current()
            .map_or(self.stream.remaining(), |c| c.end().saturating_sub(self.stream.position()))
    }

    fn has_child(&self) -> bool {
        self.body_remaining() >= ChunkHeader::SIZE
    }

    fn has_record(&self, size: u64) -> bool {
        self.body_remaining() >= size
    }

    fn skip_unknown(&self, header: &ChunkHeader, parent: &str) {
        debug!(
            "{}: skipping unknown chunk '{}' in {} at offset {}",
            self.stream.name(),
            header.tag_str(),
            parent,
            header.start
        );
    }

    fn read_texs(&mut self) -> Result<()> {
        while self.body_remaining() > 0 {
            let mut layer = TextureLayer::new(self.stream.read_cstring()?);
            layer.flags = self.stream.read_i32()?;
            layer.blend = self.stream.read_i32()?;
            layer.offset = self.stream.read_vec2()?;
            layer.scale = self.stream.read_vec2()?;
            layer.rotation = self.stream.read_f32()?.to_radians();
            trace!("{}: texture '{}'", self.stream.name(), layer.path);
            self.textures.push(layer);
        }
        Ok(())
    }

    fn read_brus(&mut self) -> Result<()> {
        let offset = self.stream.position();
        let n_texs = self.stream.read_u32()? as usize;
        if (n_texs as u64) * 4 > self.body_remaining() {
            return Err(MeshError::at_offset(
                &self.file(),
                offset,
                format!("brush table declares {n_texs} textures per brush"),
            ));
        }

        while self.body_remaining() > 0 {
            let name = self.stream.read_cstring()?;
            let color = self.stream.read_vec3()?;
            let alpha = self.stream.read_f32()?;
            let shininess = self.stream.read_f32()?;
            let blend = self.stream.read_i32()?;
            let fx = self.stream.read_i32()?;

            let mut slots: Vec<Option<TextureLayer>> = Vec::with_capacity(MAX_TEXTURE_LAYERS);
            for i in 0..n_texs {
                let id = self.stream.read_i32()?;
                if i < MAX_TEXTURE_LAYERS {
                    slots.push(usize::try_from(id).ok().and_then(|id| self.textures.get(id)).cloned());
                } else if id != -1 && !self.warned_texture_layers {
                    warn!(
                        "{}: brush '{}' uses more than {} texture layers, extra layers ignored",
                        self.stream.name(),
                        name,
                        MAX_TEXTURE_LAYERS
                    );
                    self.warned_texture_layers = true;
                }
            }

            // A lightmap in the first slot belongs in the second
            let secondary = slots
                .first()
                .and_then(Option::as_ref)
                .is_some_and(|t| TextureFlags::from_bits_truncate(t.flags).contains(TextureFlags::SECONDARY_UV));
            if secondary {
                slots.resize(MAX_TEXTURE_LAYERS, None);
                slots.swap(0, 1);
            }
            let textures: Vec<TextureLayer> = slots.into_iter().flatten().collect();

            let material = brush_material(name, color.extend(alpha), shininess, blend, fx, textures);
            trace!(
                "{}: brush '{}' as {:?}",
                self.stream.name(),
                material.name,
                material.kind
            );
            let index = self.mesh.add_material(material);
            self.brush_materials.push(index);
        }
        Ok(())
    }

    fn read_node(&mut self, parent: Option<usize>) -> Result<()> {
        let name = self.stream.read_cstring()?;
        let position = self.stream.read_vec3()?;
        let scale = self.stream.read_vec3()?;
        let rotation = self.stream.read_quat_wxyz()?;
        let rotation = if rotation.length_squared() > 0.0 {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };

        let parent_global = parent
            .and_then(|p| self.mesh.hierarchy().joint(p))
            .map_or(Mat4::IDENTITY, |j| j.global);
        let joint = self.mesh.hierarchy_mut().create_joint(name, parent);
        if let Some(j) = self.mesh.hierarchy_mut().joint_mut(joint) {
            j.set_local_trs(position, rotation, scale);
            j.global = parent_global * j.local;
            trace!("{}: node '{}' ({})", self.stream.name(), j.name, joint);
        }

        while self.has_child() {
            let header = self.chunks.enter_chunk(self.stream)?;
            match &header.tag {
                b"NODE" => self.read_node(Some(joint))?,
                b"MESH" => self.read_mesh(joint)?,
                b"BONE" => self.read_bone(joint)?,
                b"KEYS" => self.read_keys(joint)?,
                b"ANIM" => self.read_anim()?,
                _ => self.skip_unknown(&header, "NODE"),
            }
            self.chunks.exit_chunk(self.stream)?;
        }
        Ok(())
    }

    fn read_mesh(&mut self, joint: usize) -> Result<()> {
        let vertices_start = self.base_vertices.len();
        self.vertices_start = vertices_start;
        self.normals_in_file = false;
        let brush = self.stream.read_i32()?;

        let mut buffers = Vec::new();
        while self.has_child() {
            let header = self.chunks.enter_chunk(self.stream)?;
            match &header.tag {
                b"VRTS" => self.read_vrts(joint)?,
                b"TRIS" => buffers.push(self.read_tris(brush, vertices_start)?),
                _ => self.skip_unknown(&header, "MESH"),
            }
            self.chunks.exit_chunk(self.stream)?;
        }

        self.mesh_nodes.push(MeshNode { joint, buffers });
        Ok(())
    }

    fn read_vrts(&mut self, joint: usize) -> Result<()> {
        let offset = self.stream.position();
        let flags = VertexFlags::from_bits_truncate(self.stream.read_i32()?);
        let sets = self.stream.read_i32()?;
        let set_size = self.stream.read_i32()?;
        if !(0..=MAX_TEX_COORD_SETS).contains(&sets) || !(0..=MAX_TEX_COORD_SIZE).contains(&set_size) {
            return Err(MeshError::at_offset(
                &self.file(),
                offset,
                format!("unsupported texture coordinates: {sets} sets of {set_size} components"),
            ));
        }

        let mut floats = 3 + sets * set_size;
        if flags.contains(VertexFlags::NORMALS) {
            floats += 3;
            self.normals_in_file = true;
        }
        if flags.contains(VertexFlags::COLORS) {
            floats += 4;
        }
        let record = floats as u64 * 4;

        let global = self
            .mesh
            .hierarchy()
            .joint(joint)
            .map_or(Mat4::IDENTITY, |j| j.global);
        let normal_matrix = Mat3::from_mat4(global);

        while self.has_record(record) {
            let position = self.stream.read_vec3()?;
            let normal = if flags.contains(VertexFlags::NORMALS) {
                self.stream.read_vec3()?
            } else {
                Vec3::ZERO
            };
            let color = if flags.contains(VertexFlags::COLORS) {
                Vec4::new(
                    self.stream.read_f32()?,
                    self.stream.read_f32()?,
                    self.stream.read_f32()?,
                    self.stream.read_f32()?,
                )
            } else {
                Vec4::ONE
            };

            let mut coords = [Vec2::ZERO; 2];
            for set in 0..sets as usize {
                let mut values = [0.0f32; 4];
                for value in values.iter_mut().take(set_size as usize) {
                    *value = self.stream.read_f32()?;
                }
                if set < coords.len() && set_size >= 2 {
                    coords[set] = Vec2::new(values[0], values[1]);
                }
            }

            self.base_vertices.push(Vertex {
                position: global.transform_point3(position),
                normal: (normal_matrix * normal).normalize_or_zero(),
                uv: coords[0],
                uv2: coords[1],
                color,
            });
            self.copies.push(Vec::new());
        }
        Ok(())
    }

    fn read_tris(&mut self, mesh_brush: i32, vertices_start: usize) -> Result<usize> {
        let triangle_brush = self.stream.read_i32()?;
        let brush = if triangle_brush == -1 {
            mesh_brush
        } else {
            triangle_brush
        };
        let (material, surface) = self.material_for_brush(brush);

        let buffer_index = self.mesh.buffers().len();
        let mut buffer = RenderBuffer::new(material);
        let mut shared = 0usize;

        while self.has_record(12) {
            let offset = self.stream.position();
            let mut triangle = [0u32; 3];
            for slot in &mut triangle {
                let id = self.stream.read_i32()?;
                let global = usize::try_from(id)
                    .ok()
                    .map(|id| id + vertices_start)
                    .filter(|&g| g < self.base_vertices.len())
                    .ok_or_else(|| {
                        MeshError::at_offset(&self.file(), offset, format!("vertex index {id} out of range"))
                    })?;
                *slot = self.copy_vertex(global, buffer_index, &mut buffer, surface, &mut shared);
            }
            buffer.indices.extend_from_slice(&triangle);
        }

        if shared > 0 {
            debug!(
                "{}: {} vertices shared with other brushes were duplicated",
                self.stream.name(),
                shared
            );
        }
        if !self.normals_in_file && self.options.generate_missing_normals {
            buffer.compute_normals();
        }
        Ok(self.mesh.add_buffer(buffer))
    }

    /// Index of the copy of file vertex `global` inside `buffer`, creating it if needed
    fn copy_vertex(
        &mut self,
        global: usize,
        buffer_index: usize,
        buffer: &mut RenderBuffer,
        surface: Option<Surface>,
        shared: &mut usize,
    ) -> u32 {
        let copies = &mut self.copies[global];
        if let Some(copy) = copies.iter().find(|c| c.buffer == buffer_index) {
            return copy.index;
        }
        if !copies.is_empty() {
            *shared += 1;
        }

        let mut vertex = self.base_vertices[global];
        if let Some(surface) = surface {
            if vertex.color.w == 1.0 {
                vertex.color.w = surface.alpha;
            }
            vertex.uv *= surface.uv_scale;
        }

        let index = buffer.vertices.len() as u32;
        buffer.vertices.push(vertex);
        copies.push(VertexCopy {
            buffer: buffer_index,
            index,
        });
        index
    }

    fn material_for_brush(&mut self, brush: i32) -> (usize, Option<Surface>) {
        if brush != -1 {
            let found = usize::try_from(brush)
                .ok()
                .and_then(|b| self.brush_materials.get(b).copied());
            if let Some(index) = found
                && let Some(material) = self.mesh.material(index)
            {
                let surface = Surface {
                    alpha: material.alpha(),
                    uv_scale: material.textures.first().map_or(Vec2::ONE, |t| t.scale),
                };
                return (index, Some(surface));
            }
            warn!(
                "{}: brush {} does not exist, using the default material",
                self.stream.name(),
                brush
            );
        }

        let index = match self.default_material {
            Some(index) => index,
            None => {
                let index = self.mesh.add_material(Material::named("default"));
                self.default_material = Some(index);
                index
            }
        };
        (index, None)
    }

    fn read_bone(&mut self, joint: usize) -> Result<()> {
        while self.has_record(8) {
            let id = self.stream.read_u32()? as usize;
            let strength = self.stream.read_f32()?;
            let global = id + self.vertices_start;

            match self.copies.get(global).filter(|c| !c.is_empty()) {
                Some(copies) => {
                    for copy in copies {
                        self.mesh
                            .add_weight(joint, copy.buffer, copy.index as usize, strength);
                    }
                }
                None => {
                    warn!(
                        "{}: weight on joint {} has bad vertex id {}",
                        self.stream.name(),
                        joint,
                        id
                    );
                    if self.options.weight_index_policy == WeightIndexPolicy::ResetToZero {
                        self.mesh.add_weight(joint, 0, 0, 0.0);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_keys(&mut self, joint: usize) -> Result<()> {
        let flags = KeyFlags::from_bits_truncate(self.stream.read_i32()?);
        let mut record = 4;
        if flags.contains(KeyFlags::POSITION) {
            record += 12;
        }
        if flags.contains(KeyFlags::SCALE) {
            record += 12;
        }
        if flags.contains(KeyFlags::ROTATION) {
            record += 16;
        }

        let mut positions = Vec::new();
        let mut scales = Vec::new();
        let mut rotations = Vec::new();
        while self.has_record(record) {
            let frame = self.stream.read_i32()? as f32 * FRAME_SCALE;
            if flags.contains(KeyFlags::POSITION) {
                positions.push(Key::new(frame, self.stream.read_vec3()?));
            }
            if flags.contains(KeyFlags::SCALE) {
                scales.push(Key::new(frame, self.stream.read_vec3()?));
            }
            if flags.contains(KeyFlags::ROTATION) {
                let rotation = self.stream.read_quat_wxyz()?;
                let rotation = if rotation.length_squared() > 0.0 {
                    rotation.normalize()
                } else {
                    Quat::IDENTITY
                };
                rotations.push(Key::new(frame, rotation));
            }
        }

        if let Some(j) = self.mesh.hierarchy_mut().joint_mut(joint) {
            for key in positions {
                j.position_keys.push(key.frame, key.value);
            }
            for key in scales {
                j.scale_keys.push(key.frame, key.value);
            }
            for key in rotations {
                j.rotation_keys.push(key.frame, key.value);
            }
        }
        Ok(())
    }

    fn read_anim(&mut self) -> Result<()> {
        if !self.has_record(12) {
            warn!("{}: ANIM chunk is too short", self.stream.name());
            return Ok(());
        }
        let _flags = self.stream.read_i32()?;
        let frames = self.stream.read_i32()?;
        let fps = self.stream.read_f32()?;

        self.mesh.set_declared_frames(frames.max(0) as f32 * FRAME_SCALE);
        if fps > 0.0 {
            self.mesh.set_animation_speed(fps * FRAME_SCALE);
        }
        Ok(())
    }

    /// Buffers without any skin weight follow the node that holds their mesh
    fn attach_unweighted_buffers(&mut self) {
        let weighted: HashSet<usize> = self
            .mesh
            .hierarchy()
            .iter()
            .flat_map(|j| j.weights.iter().map(|w| w.buffer))
            .collect();

        for node in std::mem::take(&mut self.mesh_nodes) {
            for buffer in node.buffers {
                if !weighted.contains(&buffer) {
                    self.mesh.attach_buffer(buffer, node.joint);
                }
            }
        }
    }
}

/// Translate a brush into a material
fn brush_material(
    name: String,
    diffuse: Vec4,
    shininess: f32,
    blend: i32,
    fx: i32,
    textures: Vec<TextureLayer>,
) -> Material {
    let alpha = diffuse.w;
    let mut render_flags = RenderFlags::default();

    let kind = if let Some(second) = textures.get(1) {
        if alpha == 1.0 {
            render_flags.remove(RenderFlags::LIGHTING);
            if second.blend == BLEND_MULTIPLY_2X {
                MaterialKind::LightmapModulate2x
            } else {
                MaterialKind::Lightmap
            }
        } else {
            MaterialKind::VertexAlpha
        }
    } else if let Some(first) = textures.first() {
        let flags = TextureFlags::from_bits_truncate(first.flags);
        if flags.contains(TextureFlags::ALPHA) {
            MaterialKind::AlphaChannel
        } else if flags.contains(TextureFlags::MASKED) {
            MaterialKind::AlphaTest
        } else if flags.intersects(TextureFlags::SPHERE_MAP | TextureFlags::CUBE_MAP) {
            MaterialKind::SphereMap
        } else if alpha == 1.0 {
            MaterialKind::Solid
        } else {
            MaterialKind::VertexAlpha
        }
    } else if alpha == 1.0 {
        MaterialKind::Solid
    } else {
        MaterialKind::VertexAlpha
    };
    if kind.is_transparent() {
        render_flags.remove(RenderFlags::Z_WRITE);
    }

    let fx_flags = BrushFx::from_bits_truncate(fx);
    let ambient = if fx_flags.contains(BrushFx::FULL_BRIGHT) {
        render_flags.remove(RenderFlags::LIGHTING);
        Vec4::ONE
    } else {
        diffuse
    };
    if fx_flags.contains(BrushFx::FLAT_SHADED) {
        render_flags.remove(RenderFlags::GOURAUD_SHADING);
    }
    if fx_flags.contains(BrushFx::NO_CULLING) {
        render_flags.remove(RenderFlags::BACKFACE_CULLING);
    }
    let clamp = TextureFlags::CLAMP_U | TextureFlags::CLAMP_V;
    if textures
        .iter()
        .any(|t| TextureFlags::from_bits_truncate(t.flags).intersects(clamp))
    {
        render_flags.insert(RenderFlags::CLAMP_UV);
    }

    Material {
        name,
        diffuse,
        ambient,
        shininess,
        blend,
        fx,
        kind,
        render_flags,
        textures,
        ..Material::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(flags: i32, blend: i32) -> TextureLayer {
        TextureLayer {
            flags,
            blend,
            ..TextureLayer::new("t.png")
        }
    }

    #[test]
    fn test_brush_kinds() {
        let opaque = Vec4::ONE;
        let faded = Vec4::new(1.0, 1.0, 1.0, 0.5);

        let solid = brush_material("a".into(), opaque, 0.0, 1, 0, vec![]);
        assert_eq!(solid.kind, MaterialKind::Solid);
        assert_eq!(solid.render_flags, RenderFlags::default());

        let glass = brush_material("b".into(), faded, 0.0, 1, 0, vec![]);
        assert_eq!(glass.kind, MaterialKind::VertexAlpha);
        assert!(!glass.render_flags.contains(RenderFlags::Z_WRITE));

        let lightmapped = brush_material("c".into(), opaque, 0.0, 1, 0, vec![layer(1, 2), layer(1, 5)]);
        assert_eq!(lightmapped.kind, MaterialKind::LightmapModulate2x);
        assert!(!lightmapped.render_flags.contains(RenderFlags::LIGHTING));

        let masked = brush_material("d".into(), opaque, 0.0, 1, 0, vec![layer(0x4 | 0x10, 2)]);
        assert_eq!(masked.kind, MaterialKind::AlphaTest);
        assert!(masked.render_flags.contains(RenderFlags::CLAMP_UV));
    }

    #[test]
    fn test_brush_fx() {
        let material = brush_material("fx".into(), Vec4::new(0.5, 0.5, 0.5, 1.0), 0.2, 1, 0x1 | 0x4 | 0x10, vec![]);
        assert_eq!(material.ambient, Vec4::ONE);
        assert!(!material.render_flags.contains(RenderFlags::LIGHTING));
        assert!(!material.render_flags.contains(RenderFlags::GOURAUD_SHADING));
        assert!(!material.render_flags.contains(RenderFlags::BACKFACE_CULLING));
        assert_eq!(material.shininess, 0.2);
    }
}
