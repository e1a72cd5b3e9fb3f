//! Format detection and load dispatch
//!
//! Every supported format is one variant of [`MeshFormat`]. Detection looks at
//! the magic bytes first and falls back to the file extension, so a renamed
//! file still loads and an extension-less buffer can be identified.
//!
//! # Example
//!
//! ```rust,no_run
//! use skinned_mesh::{load_mesh, LoaderOptions, MeshFormat};
//!
//! let options = LoaderOptions::default();
//! let mesh = load_mesh("models/dwarf.x", &options)?;
//! assert_eq!(mesh.format(), MeshFormat::X);
//! println!("{} joints, {} frames", mesh.joint_count(), mesh.frame_count());
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

use std::fmt;
use std::io::{Read, Seek};
use std::path::Path;

use log::{debug, error};
use mesh_data::ByteStream;

use crate::error::{MeshError, Result};
use crate::mesh::SkinnedMesh;
use crate::{b3d, ms3d, x};

/// What to do with a skin weight that points outside its render buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightIndexPolicy {
    /// Remove the weight
    #[default]
    Drop,
    /// Point the weight at vertex 0 of buffer 0 with zero strength
    ResetToZero,
}

/// Options for controlling mesh loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Deepest chunk nesting accepted before the file is rejected
    pub max_chunk_depth: usize,
    pub weight_index_policy: WeightIndexPolicy,
    /// Compute face normals for meshes stored without them
    pub generate_missing_normals: bool,
    /// Reverse the triangle winding of X meshes
    pub flip_x_winding: bool,
    /// Rescale skin weights so each vertex's weights sum to one
    pub normalize_weights: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_chunk_depth: mesh_data::ChunkReader::DEFAULT_MAX_DEPTH,
            weight_index_policy: WeightIndexPolicy::Drop,
            generate_missing_normals: true,
            flip_x_winding: false,
            normalize_weights: true,
        }
    }
}

/// Unit of the frame numbers stored on a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameUnit {
    /// B3D frames multiplied by 100
    B3dFrames,
    /// Raw X animation ticks
    XTicks,
    /// Milliseconds
    Ms3dMillis,
}

impl FrameUnit {
    pub fn name(&self) -> &'static str {
        match self {
            Self::B3dFrames => "B3D frames x100",
            Self::XTicks => "ticks",
            Self::Ms3dMillis => "milliseconds",
        }
    }
}

/// Supported mesh formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// Blitz3D `.b3d`
    B3d,
    /// DirectX `.x`, text or binary
    X,
    /// MilkShape 3D `.ms3d`
    Ms3d,
}

impl MeshFormat {
    pub const ALL: [Self; 3] = [Self::B3d, Self::X, Self::Ms3d];

    /// Identify a format from the first bytes of a file
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b3d::MAGIC) {
            Some(Self::B3d)
        } else if bytes.starts_with(x::MAGIC) {
            Some(Self::X)
        } else if bytes.starts_with(ms3d::MAGIC) {
            Some(Self::Ms3d)
        } else {
            None
        }
    }

    /// Identify a format from a file extension, ignoring case
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "b3d" => Some(Self::B3d),
            "x" => Some(Self::X),
            "ms3d" => Some(Self::Ms3d),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::B3d => "B3D",
            Self::X => "DirectX",
            Self::Ms3d => "MilkShape 3D",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::B3d => "b3d",
            Self::X => "x",
            Self::Ms3d => "ms3d",
        }
    }

    /// Unit of the frame numbers this format's loader produces
    pub fn frame_unit(&self) -> FrameUnit {
        match self {
            Self::B3d => FrameUnit::B3dFrames,
            Self::X => FrameUnit::XTicks,
            Self::Ms3d => FrameUnit::Ms3dMillis,
        }
    }

    /// Playback speed used when a file does not declare one
    pub fn default_animation_speed(&self) -> f32 {
        match self {
            Self::B3d => 100.0 * 60.0,
            Self::X => 4800.0,
            Self::Ms3d => 1000.0,
        }
    }

    /// Parse a mesh of this format from `stream`
    pub fn load<R: Read + Seek>(
        &self,
        stream: &mut ByteStream<R>,
        options: &LoaderOptions,
    ) -> Result<SkinnedMesh> {
        match self {
            Self::B3d => b3d::load(stream, options),
            Self::X => x::load(stream, options),
            Self::Ms3d => ms3d::load(stream, options),
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Load a mesh from a file, detecting its format
pub fn load_mesh<P: AsRef<Path>>(path: P, options: &LoaderOptions) -> Result<SkinnedMesh> {
    let path = path.as_ref();
    let mut stream = ByteStream::open(path)?;
    let format = detect_stream(&mut stream, Some(path))?;
    finish(format.load(&mut stream, options), stream.name())
}

/// Load a mesh from an in-memory buffer
///
/// `name` is used for diagnostics and as an extension hint.
pub fn load_mesh_from_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    options: &LoaderOptions,
) -> Result<SkinnedMesh> {
    let mut stream = ByteStream::from_bytes(name, bytes);
    let hint = stream.name().to_string();
    let format = detect_stream(&mut stream, Some(Path::new(&hint)))?;
    finish(format.load(&mut stream, options), stream.name())
}

/// Load a mesh from an already opened stream, detecting its format
pub fn load_from_stream<R: Read + Seek>(
    stream: &mut ByteStream<R>,
    options: &LoaderOptions,
) -> Result<SkinnedMesh> {
    let format = detect_stream(stream, None)?;
    let name = stream.name().to_string();
    finish(format.load(stream, options), &name)
}

fn detect_stream<R: Read + Seek>(
    stream: &mut ByteStream<R>,
    path: Option<&Path>,
) -> Result<MeshFormat> {
    let start = stream.position();
    let mut magic = [0u8; 10];
    let read = stream.read(&mut magic)?;
    stream.seek_to(start)?;

    let format = MeshFormat::detect(&magic[..read]).or_else(|| path.and_then(MeshFormat::from_extension));
    match format {
        Some(format) => {
            debug!("{}: loading as {}", stream.name(), format);
            Ok(format)
        }
        None => {
            let err = MeshError::UnknownFormat(stream.name().to_string());
            error!("{err}");
            Err(err)
        }
    }
}

fn finish(result: Result<SkinnedMesh>, name: &str) -> Result<SkinnedMesh> {
    if let Err(err) = &result {
        error!("{name}: failed to load mesh: {err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(b"BB3D\x10\0\0\0", Some(MeshFormat::B3d) ; "b3d")]
    #[test_case(b"xof 0303txt 0032", Some(MeshFormat::X) ; "x text")]
    #[test_case(b"MS3D000000\x04\0\0\0", Some(MeshFormat::Ms3d) ; "ms3d")]
    #[test_case(b"OBJ", None ; "unknown")]
    fn test_detect(bytes: &[u8], expected: Option<MeshFormat>) {
        assert_eq!(MeshFormat::detect(bytes), expected);
    }

    #[test_case("ninja.B3D", Some(MeshFormat::B3d))]
    #[test_case("dir/dwarf.x", Some(MeshFormat::X))]
    #[test_case("zombie.ms3d", Some(MeshFormat::Ms3d))]
    #[test_case("readme.txt", None)]
    #[test_case("noext", None)]
    fn test_from_extension(path: &str, expected: Option<MeshFormat>) {
        assert_eq!(MeshFormat::from_extension(path), expected);
    }

    #[test]
    fn test_unknown_buffer_is_rejected() {
        let result = load_mesh_from_bytes("mystery.bin", b"nothing to see".to_vec(), &LoaderOptions::default());
        assert!(matches!(result, Err(MeshError::UnknownFormat(_))));
    }

    #[test]
    fn test_extension_is_a_fallback_only() {
        // An X header inside a .b3d-named buffer is still parsed as X
        let result = load_mesh_from_bytes("wrong.b3d", b"xof 0303tzip0032".to_vec(), &LoaderOptions::default());
        assert!(matches!(result, Err(MeshError::UnsupportedFormat(_))));
    }
}
