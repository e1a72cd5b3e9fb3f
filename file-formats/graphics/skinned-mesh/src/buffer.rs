//! Render buffers, vertices and materials
//!
//! A mesh is split into one [`RenderBuffer`] per material. Each buffer owns its
//! vertices and a triangle list of indices into them.

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use glam::{Vec2, Vec3, Vec4};

/// Maximum number of texture layers kept per material
pub const MAX_TEXTURE_LAYERS: usize = 2;

/// A single mesh vertex
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Primary texture coordinates
    pub uv: Vec2,
    /// Secondary texture coordinates (lightmaps)
    pub uv2: Vec2,
    /// RGBA colour in `[0, 1]`
    pub color: Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            uv2: Vec2::ZERO,
            color: Vec4::ONE,
        }
    }
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            ..Self::default()
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// A box containing nothing; adding any point makes it that point
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.add_point(p);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn add_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn merge(&mut self, other: &Self) {
        if !other.is_empty() {
            self.add_point(other.min);
            self.add_point(other.max);
        }
    }

    /// Size along each axis; zero for an empty box
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// Grow the box by `fraction` of its extent on every side
    #[must_use]
    pub fn padded(&self, fraction: f32) -> Self {
        if self.is_empty() {
            return *self;
        }
        let padding = self.extent() * fraction;
        Self {
            min: self.min - padding,
            max: self.max + padding,
        }
    }
}

/// A texture reference on a material
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureLayer {
    /// Path as written in the model file
    pub path: String,
    pub flags: i32,
    pub blend: i32,
    pub offset: Vec2,
    pub scale: Vec2,
    /// Rotation in radians
    pub rotation: f32,
}

impl TextureLayer {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: 1,
            blend: 2,
            offset: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
        }
    }

    /// Locate the texture file relative to the directory of the model
    ///
    /// Tries the path as written, then relative to `base_dir`, then the bare
    /// file name inside `base_dir`. A missing texture is not an error; the
    /// material is simply rendered untextured.
    pub fn resolved_path(&self, base_dir: &Path) -> Option<PathBuf> {
        let normalized = self.path.replace('\\', "/");
        let written = PathBuf::from(&normalized);

        let mut candidates = vec![written.clone(), base_dir.join(&written)];
        if let Some(file_name) = written.file_name() {
            candidates.push(base_dir.join(file_name));
        }
        candidates.into_iter().find(|p| p.is_file())
    }
}

/// How a material is combined with what is already drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaterialKind {
    #[default]
    Solid,
    /// Second texture layer is a lightmap
    Lightmap,
    /// Lightmap with the result doubled
    LightmapModulate2x,
    /// Blended by the texture's alpha channel
    AlphaChannel,
    /// Texels below an alpha threshold are discarded
    AlphaTest,
    SphereMap,
    /// Blended by the vertex colour alpha
    VertexAlpha,
}

impl MaterialKind {
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::AlphaChannel | Self::VertexAlpha)
    }
}

bitflags! {
    /// Fixed-function render state of a material
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RenderFlags: u32 {
        const LIGHTING = 0x1;
        const BACKFACE_CULLING = 0x2;
        const GOURAUD_SHADING = 0x4;
        const Z_WRITE = 0x8;
        /// Texture coordinates are clamped instead of repeated
        const CLAMP_UV = 0x10;
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::LIGHTING | Self::BACKFACE_CULLING | Self::GOURAUD_SHADING | Self::Z_WRITE
    }
}

/// Surface description shared by the triangles of one render buffer
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub name: String,
    pub diffuse: Vec4,
    pub ambient: Vec4,
    pub specular: Vec4,
    pub emissive: Vec4,
    pub shininess: f32,
    /// Format-specific blend mode
    pub blend: i32,
    /// Format-specific effect flags
    pub fx: i32,
    pub kind: MaterialKind,
    pub render_flags: RenderFlags,
    pub textures: Vec<TextureLayer>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: Vec4::ONE,
            ambient: Vec4::ONE,
            specular: Vec4::new(0.0, 0.0, 0.0, 1.0),
            emissive: Vec4::new(0.0, 0.0, 0.0, 1.0),
            shininess: 0.0,
            blend: 1,
            fx: 0,
            kind: MaterialKind::Solid,
            render_flags: RenderFlags::default(),
            textures: Vec::new(),
        }
    }
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn alpha(&self) -> f32 {
        self.diffuse.w
    }
}

/// Geometry for one material: vertices plus a triangle list
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderBuffer {
    /// Index into the owning mesh's material list
    pub material: usize,
    pub vertices: Vec<Vertex>,
    /// Triangle list, three indices per triangle
    pub indices: Vec<u32>,
    pub bounding_box: Aabb,
    /// Joint this buffer moves with when its vertices carry no weights
    pub attached_joint: Option<usize>,
    /// Per-vertex tangents, filled by [`RenderBuffer::compute_tangents`]
    pub tangents: Vec<Vec3>,
    /// Per-vertex binormals, filled by [`RenderBuffer::compute_tangents`]
    pub binormals: Vec<Vec3>,
}

impl RenderBuffer {
    pub fn new(material: usize) -> Self {
        Self {
            material,
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterate triangles as vertex index triples
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
    }

    pub fn recalculate_bounding_box(&mut self) {
        self.bounding_box = Aabb::from_points(self.vertices.iter().map(|v| v.position));
    }

    /// Replace all normals with area-weighted face normals
    pub fn compute_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = Vec3::ZERO;
        }
        let count = self.vertices.len();
        let faces: Vec<[usize; 3]> = self.triangles().collect();
        for [a, b, c] in faces {
            if a >= count || b >= count || c >= count {
                continue;
            }
            let pa = self.vertices[a].position;
            let pb = self.vertices[b].position;
            let pc = self.vertices[c].position;
            let face = (pb - pa).cross(pc - pa);
            self.vertices[a].normal += face;
            self.vertices[b].normal += face;
            self.vertices[c].normal += face;
        }
        for v in &mut self.vertices {
            v.normal = v.normal.normalize_or_zero();
        }
    }

    /// Compute per-vertex tangent frames from positions and texture coordinates
    pub fn compute_tangents(&mut self) {
        let count = self.vertices.len();
        let mut tangents = vec![Vec3::ZERO; count];
        let mut binormals = vec![Vec3::ZERO; count];

        for [a, b, c] in self.triangles() {
            if a >= count || b >= count || c >= count {
                continue;
            }
            let (va, vb, vc) = (&self.vertices[a], &self.vertices[b], &self.vertices[c]);
            let e1 = vb.position - va.position;
            let e2 = vc.position - va.position;
            let d1 = vb.uv - va.uv;
            let d2 = vc.uv - va.uv;

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (e1 * d2.y - e2 * d1.y) * r;
            let binormal = (e2 * d1.x - e1 * d2.x) * r;

            for i in [a, b, c] {
                tangents[i] += tangent;
                binormals[i] += binormal;
            }
        }

        for (i, v) in self.vertices.iter().enumerate() {
            // Gram-Schmidt against the vertex normal
            let n = v.normal;
            let t = (tangents[i] - n * n.dot(tangents[i])).normalize_or_zero();
            tangents[i] = t;
            binormals[i] = if n == Vec3::ZERO {
                binormals[i].normalize_or_zero()
            } else {
                let b = n.cross(t);
                if b.dot(binormals[i]) < 0.0 { -b } else { b }
            };
        }

        self.tangents = tangents;
        self.binormals = binormals;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RenderBuffer {
        let mut buffer = RenderBuffer::new(0);
        buffer.vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::ZERO, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::X, Vec3::ZERO, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::Y, Vec3::ZERO, Vec2::new(0.0, 1.0)),
        ];
        buffer.indices = vec![0, 1, 2];
        buffer
    }

    #[test]
    fn test_face_normals() {
        let mut buffer = triangle();
        buffer.compute_normals();
        for v in &buffer.vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_tangent_frame() {
        let mut buffer = triangle();
        buffer.compute_normals();
        buffer.compute_tangents();
        assert_eq!(buffer.tangents.len(), 3);
        assert!((buffer.tangents[0] - Vec3::X).length() < 1e-5);
        assert!((buffer.binormals[0] - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_bounding_box_padding() {
        let aabb = Aabb::from_points([Vec3::ZERO, Vec3::new(10.0, 20.0, 0.0)]);
        let padded = aabb.padded(0.05);
        assert_eq!(padded.min, Vec3::new(-0.5, -1.0, 0.0));
        assert_eq!(padded.max, Vec3::new(10.5, 21.0, 0.0));
        assert!(Aabb::EMPTY.is_empty());
        assert!(Aabb::EMPTY.padded(0.05).is_empty());
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let mut buffer = triangle();
        buffer.indices.extend_from_slice(&[0, 1, 99]);
        buffer.compute_normals();
        buffer.compute_tangents();
        assert_eq!(buffer.triangle_count(), 2);
    }
}
