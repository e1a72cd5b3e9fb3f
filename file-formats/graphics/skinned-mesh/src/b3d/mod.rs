//! Blitz3D (`.b3d`) loader
//!
//! B3D files are a tree of little-endian tagged chunks:
//!
//! ```text
//! BB3D version
//! ├── TEXS  texture table
//! ├── BRUS  brush (material) table
//! └── NODE  name, position, scale, rotation
//!     ├── MESH  brush id
//!     │   ├── VRTS  vertex block
//!     │   └── TRIS  triangles of one brush
//!     ├── BONE  skin weights of this node
//!     ├── KEYS  keyframes of this node
//!     ├── ANIM  animation length and speed
//!     └── NODE  ...
//! ```
//!
//! Frame numbers in `KEYS` and `ANIM` are multiplied by 100 on load, so B3D
//! meshes use [`FrameUnit::B3dFrames`](crate::FrameUnit::B3dFrames).
//!
//! # Example
//!
//! ```rust,no_run
//! use mesh_data::ByteStream;
//! use skinned_mesh::{b3d, LoaderOptions};
//!
//! let mut stream = ByteStream::open("models/ninja.b3d")?;
//! let mesh = b3d::load(&mut stream, &LoaderOptions::default())?;
//! println!("{} buffers", mesh.buffers().len());
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

mod reader;

use std::io::{Read, Seek};

use bitflags::bitflags;
use mesh_data::ByteStream;

use crate::error::Result;
use crate::loader::LoaderOptions;
use crate::mesh::SkinnedMesh;

pub use reader::B3dReader;

/// Tag of the root chunk
pub const MAGIC: &[u8; 4] = b"BB3D";

/// Multiplier applied to stored frame numbers
pub const FRAME_SCALE: f32 = 100.0;

bitflags! {
    /// Optional fields of a `VRTS` vertex record
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VertexFlags: i32 {
        const NORMALS = 0x1;
        const COLORS = 0x2;
    }
}

bitflags! {
    /// Channels present in each `KEYS` record
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyFlags: i32 {
        const POSITION = 0x1;
        const SCALE = 0x2;
        const ROTATION = 0x4;
    }
}

bitflags! {
    /// `TEXS` texture flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: i32 {
        const COLOR = 0x1;
        const ALPHA = 0x2;
        const MASKED = 0x4;
        const MIPMAPPED = 0x8;
        const CLAMP_U = 0x10;
        const CLAMP_V = 0x20;
        const SPHERE_MAP = 0x40;
        const CUBE_MAP = 0x80;
        /// Texture uses the second coordinate set
        const SECONDARY_UV = 0x10000;
    }
}

bitflags! {
    /// `BRUS` effect flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BrushFx: i32 {
        const FULL_BRIGHT = 0x1;
        const VERTEX_COLORS = 0x2;
        const FLAT_SHADED = 0x4;
        const NO_FOG = 0x8;
        const NO_CULLING = 0x10;
        const FORCE_ALPHA = 0x20;
    }
}

/// Texture blend mode that doubles the modulated result
pub const BLEND_MULTIPLY_2X: i32 = 5;

/// Load a B3D mesh and finalize it for playback
pub fn load<R: Read + Seek>(stream: &mut ByteStream<R>, options: &LoaderOptions) -> Result<SkinnedMesh> {
    let mut mesh = B3dReader::new(stream, options).read()?;
    mesh.finalize(options);
    Ok(mesh)
}
