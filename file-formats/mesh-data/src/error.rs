use std::io;

use thiserror::Error;

/// Errors raised while reading raw bytes and chunk structure
#[derive(Error, Debug)]
pub enum DataError {
    /// I/O error from the underlying reader
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read would have gone past the end of the stream
    #[error("Unexpected end of stream at offset {offset} (wanted {wanted} bytes)")]
    UnexpectedEof { offset: u64, wanted: usize },

    /// A seek target lies outside the stream
    #[error("Seek out of range: offset {offset} in stream of {size} bytes")]
    SeekOutOfRange { offset: i64, size: u64 },

    /// A chunk header declared a negative length
    #[error("Invalid length {length} for chunk '{tag}' at offset {offset}")]
    InvalidChunkLength {
        tag: String,
        length: i32,
        offset: u64,
    },

    /// A chunk declared a length that reaches past its parent or the stream
    #[error("Chunk '{tag}' ends at {end} but only {limit} bytes are available")]
    ChunkOverrun { tag: String, end: u64, limit: u64 },

    /// Chunks are nested deeper than the configured ceiling
    #[error("Chunk nesting exceeds maximum depth of {max}")]
    ChunkDepthExceeded { max: usize },

    /// `exit_chunk` was called with no open chunk
    #[error("No open chunk to exit")]
    NoOpenChunk,
}

pub type Result<T> = std::result::Result<T, DataError>;
