//! DirectX (`.x`) loader
//!
//! X files start with a 16-byte header followed by either a text or a binary
//! body. Both bodies are read through one [`Tokenizer`], so the object parser
//! never looks at the encoding.
//!
//! Supported objects:
//!
//! - `Frame` and `FrameTransformMatrix`, mapped one to one onto joints
//! - `Mesh` with `MeshNormals`, `MeshTextureCoords`, `MeshVertexColors` and
//!   `MeshMaterialList`
//! - `Material` and `TextureFilename`, inline or referenced by name
//! - `XSkinMeshHeader` and `SkinWeights`
//! - `AnimTicksPerSecond`, `AnimationSet`, `Animation` and `AnimationKey`
//!
//! Templates and unknown objects are skipped by brace matching. Frame numbers
//! are raw animation ticks ([`FrameUnit::XTicks`](crate::FrameUnit::XTicks)).
//!
//! # Example
//!
//! ```rust,no_run
//! use mesh_data::ByteStream;
//! use skinned_mesh::{x, LoaderOptions};
//!
//! let mut stream = ByteStream::open("models/dwarf.x")?;
//! let mesh = x::load(&mut stream, &LoaderOptions::default())?;
//! println!("{} joints at {} ticks/s", mesh.joint_count(), mesh.animation_speed());
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

mod builder;
pub mod header;
mod parser;
mod tokenizer;

use std::io::{Read, Seek};

use log::debug;
use mesh_data::ByteStream;

use crate::error::{MeshError, Result};
use crate::loader::LoaderOptions;
use crate::mesh::SkinnedMesh;

pub use builder::MeshBuilder;
pub use header::{FloatSize, HEADER_SIZE, XEncoding, XHeader};
pub use parser::{XDocument, XParser};
pub use tokenizer::{Token, Tokenizer};

/// First four bytes of every X file
pub const MAGIC: &[u8; 4] = b"xof ";

/// Load an X mesh and finalize it for playback
pub fn load<R: Read + Seek>(stream: &mut ByteStream<R>, options: &LoaderOptions) -> Result<SkinnedMesh> {
    let name = stream.name().to_string();
    let remaining = usize::try_from(stream.remaining())
        .map_err(|_| MeshError::Validation(format!("{name}: file is too large")))?;
    let mut bytes = stream.read_bytes(remaining)?;

    let header = XHeader::parse(&bytes)?;
    debug!("{}: X header {}", name, header);

    let body = bytes.split_off(HEADER_SIZE);
    let tokens = Tokenizer::new(name.clone(), body, HEADER_SIZE, &header);
    let document = XParser::new(tokens, options).parse()?;

    let mut mesh = MeshBuilder::new(&name, options).build(document)?;
    mesh.finalize(options);
    Ok(mesh)
}
