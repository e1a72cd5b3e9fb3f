//! Object-level parser turning a token stream into an [`XDocument`]

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use log::{debug, trace, warn};

use super::tokenizer::{Token, Tokenizer};
use crate::error::Result;
use crate::loader::LoaderOptions;

/// Upper bound for speculative allocations driven by counts in the file
const MAX_PREALLOC: usize = 65536;

/// A `Frame` object; frames become joints one to one
#[derive(Debug, Clone)]
pub struct XFrame {
    pub name: String,
    pub parent: Option<usize>,
    pub transform: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct XMaterial {
    pub name: String,
    pub diffuse: Vec4,
    pub power: f32,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub texture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XSkinWeights {
    /// Name of the frame driving these vertices
    pub frame_name: String,
    pub indices: Vec<usize>,
    pub weights: Vec<f32>,
    /// Mesh space to bone space
    pub offset: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct XMesh {
    pub name: String,
    /// Frame the mesh is declared in
    pub frame: Option<usize>,
    pub positions: Vec<Vec3>,
    pub faces: Vec<Vec<usize>>,
    pub normals: Vec<Vec3>,
    pub normal_faces: Vec<Vec<usize>>,
    pub uvs: Vec<Vec2>,
    pub colors: HashMap<usize, Vec4>,
    /// Material slot of each face
    pub face_materials: Vec<usize>,
    pub materials: Vec<XMaterial>,
    pub skin_weights: Vec<XSkinWeights>,
    /// An `XSkinMeshHeader` was present
    pub skinned: bool,
}

/// Keys of one `AnimationKey` object
#[derive(Debug, Clone)]
pub enum XKeys {
    Rotation(Vec<(f32, Quat)>),
    Scale(Vec<(f32, Vec3)>),
    Position(Vec<(f32, Vec3)>),
    Matrix(Vec<(f32, Mat4)>),
}

#[derive(Debug, Clone, Default)]
pub struct XAnimation {
    pub frame_name: String,
    pub keys: Vec<XKeys>,
}

#[derive(Debug, Clone, Default)]
pub struct XAnimationSet {
    pub name: String,
    pub animations: Vec<XAnimation>,
}

/// Everything the loader understands from one X file
#[derive(Debug, Clone, Default)]
pub struct XDocument {
    pub frames: Vec<XFrame>,
    pub meshes: Vec<XMesh>,
    pub animation_sets: Vec<XAnimationSet>,
    pub ticks_per_second: Option<f32>,
}

/// Recursive descent over X data objects
pub struct XParser {
    tokens: Tokenizer,
    document: XDocument,
    /// Top-level materials, referenced by name from material lists
    named_materials: HashMap<String, XMaterial>,
    /// Deepest allowed `Frame` nesting
    max_depth: usize,
}

impl XParser {
    pub fn new(tokens: Tokenizer, options: &LoaderOptions) -> Self {
        Self {
            tokens,
            document: XDocument::default(),
            named_materials: HashMap::new(),
            max_depth: options.max_chunk_depth,
        }
    }

    pub fn parse(mut self) -> Result<XDocument> {
        loop {
            match self.tokens.next_significant()? {
                Token::Eof => break,
                Token::Name(kind) => self.parse_top_level(&kind)?,
                other => {
                    return Err(self
                        .tokens
                        .error(format!("expected an object, found {}", other.describe())));
                }
            }
        }
        debug!(
            "Parsed X document: {} frames, {} meshes, {} animation sets",
            self.document.frames.len(),
            self.document.meshes.len(),
            self.document.animation_sets.len()
        );
        Ok(self.document)
    }

    fn parse_top_level(&mut self, kind: &str) -> Result<()> {
        match kind {
            "Frame" => self.parse_frame(None, 1),
            "Mesh" => {
                // A mesh outside any frame still needs a joint to move with
                let frame = self.document.frames.len();
                self.document.frames.push(XFrame {
                    name: String::new(),
                    parent: None,
                    transform: Mat4::IDENTITY,
                });
                self.parse_mesh(Some(frame))
            }
            "Material" => {
                let name = self.read_object_header()?;
                let material = self.parse_material_body(name.clone())?;
                self.named_materials.insert(name, material);
                Ok(())
            }
            "AnimationSet" => self.parse_animation_set(),
            "AnimTicksPerSecond" => {
                self.read_object_header()?;
                let ticks = self.tokens.read_int()?;
                self.tokens.expect_close_brace()?;
                if ticks > 0 {
                    self.document.ticks_per_second = Some(ticks as f32);
                } else {
                    warn!("Ignoring AnimTicksPerSecond of {} at {}", ticks, self.tokens.location());
                }
                Ok(())
            }
            _ => self.skip_object(kind),
        }
    }

    /// Consume the optional name and GUID of an object up to its `{`
    fn read_object_header(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            match self.tokens.next_significant()? {
                Token::Name(n) | Token::Str(n) => name = n,
                Token::Guid => {}
                Token::OpenBrace => return Ok(name),
                other => {
                    return Err(self
                        .tokens
                        .error(format!("expected '{{' after object name, found {}", other.describe())));
                }
            }
        }
    }

    fn skip_object(&mut self, kind: &str) -> Result<()> {
        let name = self.read_object_header()?;
        trace!("Skipping X object {} '{}' at {}", kind, name, self.tokens.location());
        self.tokens.skip_block()
    }

    /// Read the body of a `{ Name }` reference after its `{`
    fn read_reference(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            match self.tokens.next_significant()? {
                Token::Name(n) | Token::Str(n) => name = n,
                Token::Guid => {}
                Token::CloseBrace => return Ok(name),
                other => {
                    return Err(self
                        .tokens
                        .error(format!("malformed reference: {}", other.describe())));
                }
            }
        }
    }

    fn parse_frame(&mut self, parent: Option<usize>, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(self
                .tokens
                .error(format!("frame nesting exceeds {} levels", self.max_depth)));
        }
        let name = self.read_object_header()?;
        let index = self.document.frames.len();
        self.document.frames.push(XFrame {
            name,
            parent,
            transform: Mat4::IDENTITY,
        });

        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => return Ok(()),
                Token::Name(kind) => match kind.as_str() {
                    "Frame" => self.parse_frame(Some(index), depth + 1)?,
                    "FrameTransformMatrix" => {
                        self.read_object_header()?;
                        let matrix = self.read_matrix()?;
                        self.tokens.expect_close_brace()?;
                        self.document.frames[index].transform = matrix;
                    }
                    "Mesh" => self.parse_mesh(Some(index))?,
                    _ => self.skip_object(&kind)?,
                },
                Token::OpenBrace => {
                    let reference = self.read_reference()?;
                    debug!("Ignoring reference '{}' inside frame", reference);
                }
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in Frame", other.describe())));
                }
            }
        }
    }

    fn read_matrix(&mut self) -> Result<Mat4> {
        let mut values = [0.0f32; 16];
        for value in &mut values {
            *value = self.tokens.read_float()?;
        }
        Ok(Mat4::from_cols_array(&values))
    }

    fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.tokens.read_float()?,
            self.tokens.read_float()?,
            self.tokens.read_float()?,
        ))
    }

    fn read_faces(&mut self) -> Result<Vec<Vec<usize>>> {
        let count = self.tokens.read_count()?;
        let mut faces = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            let corners = self.tokens.read_count()?;
            let mut face = Vec::with_capacity(corners.min(64));
            for _ in 0..corners {
                face.push(self.tokens.read_count()?);
            }
            faces.push(face);
        }
        Ok(faces)
    }

    fn parse_mesh(&mut self, frame: Option<usize>) -> Result<()> {
        let name = self.read_object_header()?;
        let mut mesh = XMesh {
            name,
            frame,
            ..XMesh::default()
        };

        let vertex_count = self.tokens.read_count()?;
        mesh.positions.reserve(vertex_count.min(MAX_PREALLOC));
        for _ in 0..vertex_count {
            let position = self.read_vec3()?;
            mesh.positions.push(position);
        }
        mesh.faces = self.read_faces()?;

        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => break,
                Token::Name(kind) => match kind.as_str() {
                    "MeshNormals" => {
                        self.read_object_header()?;
                        let count = self.tokens.read_count()?;
                        mesh.normals.reserve(count.min(MAX_PREALLOC));
                        for _ in 0..count {
                            let normal = self.read_vec3()?;
                            mesh.normals.push(normal);
                        }
                        mesh.normal_faces = self.read_faces()?;
                        self.tokens.expect_close_brace()?;
                    }
                    "MeshTextureCoords" => {
                        self.read_object_header()?;
                        let count = self.tokens.read_count()?;
                        mesh.uvs.reserve(count.min(MAX_PREALLOC));
                        for _ in 0..count {
                            let uv = Vec2::new(self.tokens.read_float()?, self.tokens.read_float()?);
                            mesh.uvs.push(uv);
                        }
                        self.tokens.expect_close_brace()?;
                    }
                    "MeshVertexColors" => {
                        self.read_object_header()?;
                        let count = self.tokens.read_count()?;
                        for _ in 0..count {
                            let index = self.tokens.read_count()?;
                            let color = Vec4::new(
                                self.tokens.read_float()?,
                                self.tokens.read_float()?,
                                self.tokens.read_float()?,
                                self.tokens.read_float()?,
                            );
                            mesh.colors.insert(index, color);
                        }
                        self.tokens.expect_close_brace()?;
                    }
                    "MeshMaterialList" => self.parse_material_list(&mut mesh)?,
                    "XSkinMeshHeader" => {
                        mesh.skinned = true;
                        self.skip_object(&kind)?;
                    }
                    "SkinWeights" => {
                        let weights = self.parse_skin_weights()?;
                        mesh.skinned = true;
                        mesh.skin_weights.push(weights);
                    }
                    _ => self.skip_object(&kind)?,
                },
                Token::OpenBrace => {
                    self.read_reference()?;
                }
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in Mesh", other.describe())));
                }
            }
        }

        trace!(
            "X mesh '{}': {} vertices, {} faces, {} weight sets",
            mesh.name,
            mesh.positions.len(),
            mesh.faces.len(),
            mesh.skin_weights.len()
        );
        self.document.meshes.push(mesh);
        Ok(())
    }

    fn parse_material_list(&mut self, mesh: &mut XMesh) -> Result<()> {
        self.read_object_header()?;
        let material_count = self.tokens.read_count()?;
        let index_count = self.tokens.read_count()?;
        let mut indices = Vec::with_capacity(index_count.min(MAX_PREALLOC));
        for _ in 0..index_count {
            indices.push(self.tokens.read_count()?);
        }

        // Exporters may write fewer indices than faces; the last one repeats
        if indices.len() < mesh.faces.len() {
            let last = indices.last().copied().unwrap_or(0);
            indices.resize(mesh.faces.len(), last);
        }
        mesh.face_materials = indices;

        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => break,
                Token::Name(kind) if kind == "Material" => {
                    let name = self.read_object_header()?;
                    let material = self.parse_material_body(name)?;
                    mesh.materials.push(material);
                }
                Token::Name(kind) => self.skip_object(&kind)?,
                Token::OpenBrace => {
                    let name = self.read_reference()?;
                    match self.named_materials.get(&name) {
                        Some(material) => mesh.materials.push(material.clone()),
                        None => {
                            warn!("Mesh '{}' references unknown material '{}'", mesh.name, name);
                            mesh.materials.push(XMaterial {
                                name,
                                diffuse: Vec4::ONE,
                                ..XMaterial::default()
                            });
                        }
                    }
                }
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in MeshMaterialList", other.describe())));
                }
            }
        }

        if mesh.materials.len() != material_count {
            warn!(
                "Mesh '{}' declares {} materials but lists {}",
                mesh.name,
                material_count,
                mesh.materials.len()
            );
        }
        Ok(())
    }

    /// Body of a `Material` after its `{`
    fn parse_material_body(&mut self, name: String) -> Result<XMaterial> {
        let diffuse = Vec4::new(
            self.tokens.read_float()?,
            self.tokens.read_float()?,
            self.tokens.read_float()?,
            self.tokens.read_float()?,
        );
        let power = self.tokens.read_float()?;
        let specular = self.read_vec3()?;
        let emissive = self.read_vec3()?;
        let mut material = XMaterial {
            name,
            diffuse,
            power,
            specular,
            emissive,
            texture: None,
        };

        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => return Ok(material),
                Token::Name(kind) if kind.eq_ignore_ascii_case("TextureFilename") => {
                    self.read_object_header()?;
                    material.texture = Some(self.tokens.read_string()?);
                    self.tokens.expect_close_brace()?;
                }
                Token::Name(kind) => self.skip_object(&kind)?,
                Token::OpenBrace => {
                    self.read_reference()?;
                }
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in Material", other.describe())));
                }
            }
        }
    }

    fn parse_skin_weights(&mut self) -> Result<XSkinWeights> {
        self.read_object_header()?;
        let frame_name = self.tokens.read_string()?;
        let count = self.tokens.read_count()?;
        let mut indices = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            indices.push(self.tokens.read_count()?);
        }
        let mut weights = Vec::with_capacity(count.min(MAX_PREALLOC));
        for _ in 0..count {
            weights.push(self.tokens.read_float()?);
        }
        let offset = self.read_matrix()?;
        self.tokens.expect_close_brace()?;
        Ok(XSkinWeights {
            frame_name,
            indices,
            weights,
            offset,
        })
    }

    fn parse_animation_set(&mut self) -> Result<()> {
        let name = self.read_object_header()?;
        let mut set = XAnimationSet {
            name,
            animations: Vec::new(),
        };
        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => break,
                Token::Name(kind) if kind == "Animation" => {
                    let animation = self.parse_animation()?;
                    set.animations.push(animation);
                }
                Token::Name(kind) => self.skip_object(&kind)?,
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in AnimationSet", other.describe())));
                }
            }
        }
        self.document.animation_sets.push(set);
        Ok(())
    }

    fn parse_animation(&mut self) -> Result<XAnimation> {
        self.read_object_header()?;
        let mut animation = XAnimation::default();
        loop {
            match self.tokens.next_significant()? {
                Token::CloseBrace => return Ok(animation),
                Token::OpenBrace => animation.frame_name = self.read_reference()?,
                Token::Name(kind) if kind == "AnimationKey" => {
                    let keys = self.parse_animation_key()?;
                    animation.keys.push(keys);
                }
                Token::Name(kind) => self.skip_object(&kind)?,
                other => {
                    return Err(self
                        .tokens
                        .error(format!("unexpected {} in Animation", other.describe())));
                }
            }
        }
    }

    fn parse_animation_key(&mut self) -> Result<XKeys> {
        self.read_object_header()?;
        let key_type = self.tokens.read_int()?;
        let count = self.tokens.read_count()?;
        let capacity = count.min(MAX_PREALLOC);

        let keys = match key_type {
            0 => {
                let mut keys = Vec::with_capacity(capacity);
                for _ in 0..count {
                    let time = self.read_key_header(4)?;
                    let w = self.tokens.read_float()?;
                    let x = self.tokens.read_float()?;
                    let y = self.tokens.read_float()?;
                    let z = self.tokens.read_float()?;
                    let rotation = Quat::from_xyzw(x, y, z, w);
                    if rotation.length_squared() > f32::EPSILON {
                        keys.push((time, rotation.normalize()));
                    } else {
                        warn!(
                            "{}: zero-length rotation key at time {} near {}, using identity",
                            self.tokens.name(),
                            time,
                            self.tokens.location()
                        );
                        keys.push((time, Quat::IDENTITY));
                    }
                }
                XKeys::Rotation(keys)
            }
            1 | 2 => {
                let mut keys = Vec::with_capacity(capacity);
                for _ in 0..count {
                    let time = self.read_key_header(3)?;
                    keys.push((time, self.read_vec3()?));
                }
                if key_type == 1 {
                    XKeys::Scale(keys)
                } else {
                    XKeys::Position(keys)
                }
            }
            3 | 4 => {
                let mut keys = Vec::with_capacity(capacity);
                for _ in 0..count {
                    let time = self.read_key_header(16)?;
                    keys.push((time, self.read_matrix()?));
                }
                XKeys::Matrix(keys)
            }
            other => {
                return Err(self.tokens.error(format!("unknown animation key type {other}")));
            }
        };
        self.tokens.expect_close_brace()?;
        Ok(keys)
    }

    /// Read a key's time and value count, failing when the count is unexpected
    fn read_key_header(&mut self, expected: usize) -> Result<f32> {
        let time = self.tokens.read_float()?;
        let values = self.tokens.read_count()?;
        if values != expected {
            return Err(self
                .tokens
                .error(format!("animation key has {values} values, expected {expected}")));
        }
        Ok(time)
    }
}
