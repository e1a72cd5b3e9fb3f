//! Binary input primitives shared by the mesh format loaders
//!
//! - [`stream::ByteStream`]: seekable byte source with explicit host byte order
//! - [`chunk::ChunkReader`]: stack-based reader for nested tagged chunks

pub mod chunk;
pub mod error;
pub mod stream;

pub use chunk::{ChunkHeader, ChunkReader};
pub use error::{DataError, Result};
pub use stream::{ByteStream, HostOrder};

pub mod prelude {
    pub use crate::chunk::{ChunkHeader, ChunkReader};
    pub use crate::stream::{ByteStream, HostOrder};
    pub use std::io::{Read, Seek};
}
