//! Nested, length-prefixed chunk reading
//!
//! A chunk is a four byte ASCII tag followed by a signed 32-bit little-endian
//! body length. The length does not include the 8 header bytes. Chunks nest:
//! a body may hold further chunks, and the reader keeps a stack of the chunks
//! that are currently open so callers can ask whether the innermost one has
//! been fully consumed.

use std::io::{Read, Seek};

use log::{debug, trace, warn};

use crate::error::{DataError, Result};
use crate::stream::ByteStream;

/// Header of one chunk together with its absolute offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Four byte tag, e.g. `NODE`
    pub tag: [u8; 4],
    /// Body length, excluding the header
    pub length: u32,
    /// Absolute offset of the first header byte
    pub start: u64,
}

impl ChunkHeader {
    /// Size of a chunk header in bytes
    pub const SIZE: u64 = 8;

    /// Absolute offset of the first body byte
    pub fn body_start(&self) -> u64 {
        self.start + Self::SIZE
    }

    /// Absolute offset one past the last body byte
    pub fn end(&self) -> u64 {
        self.start + Self::SIZE + u64::from(self.length)
    }

    /// Tag as a printable string
    pub fn tag_str(&self) -> String {
        tag_to_string(&self.tag)
    }

    pub fn is(&self, tag: &[u8; 4]) -> bool {
        &self.tag == tag
    }
}

/// Render a chunk tag for diagnostics
pub fn tag_to_string(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Stack of open chunks over a [`ByteStream`]
#[derive(Debug, Clone)]
pub struct ChunkReader {
    stack: Vec<ChunkHeader>,
    max_depth: usize,
}

impl Default for ChunkReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkReader {
    /// Nesting ceiling used by [`ChunkReader::new`]
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub fn new() -> Self {
        Self::with_max_depth(Self::DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Number of chunks currently open
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Innermost open chunk
    pub fn current(&self) -> Option<&ChunkHeader> {
        self.stack.last()
    }

    /// Open chunk tags joined with `/`, outermost first
    pub fn path(&self) -> String {
        self.stack
            .iter()
            .map(ChunkHeader::tag_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Read a chunk header at the current position and open it
    ///
    /// The declared body must fit inside the enclosing chunk (or the stream
    /// for a top-level chunk); anything else is a structural error.
    pub fn enter_chunk<R: Read + Seek>(&mut self, stream: &mut ByteStream<R>) -> Result<ChunkHeader> {
        if self.stack.len() >= self.max_depth {
            return Err(DataError::ChunkDepthExceeded {
                max: self.max_depth,
            });
        }

        let start = stream.position();
        let tag = stream.read_tag()?;
        let length = stream.read_i32()?;
        if length < 0 {
            return Err(DataError::InvalidChunkLength {
                tag: tag_to_string(&tag),
                length,
                offset: start,
            });
        }

        let header = ChunkHeader {
            tag,
            length: length as u32,
            start,
        };

        let limit = self
            .stack
            .last()
            .map_or(stream.size(), ChunkHeader::end)
            .min(stream.size());
        if header.end() > limit {
            return Err(DataError::ChunkOverrun {
                tag: header.tag_str(),
                end: header.end(),
                limit,
            });
        }

        trace!(
            "{}: entering chunk '{}' at {} ({} bytes)",
            stream.name(),
            header.tag_str(),
            start,
            header.length
        );
        self.stack.push(header);
        Ok(header)
    }

    /// Whether the innermost open chunk has no unread body bytes left
    ///
    /// With no open chunk this reports whether the stream is at its end.
    pub fn is_exhausted<R: Read + Seek>(&self, stream: &ByteStream<R>) -> bool {
        match self.stack.last() {
            Some(header) => stream.position() >= header.end(),
            None => stream.is_eof(),
        }
    }

    /// Close the innermost chunk, moving to its end if the body was not fully read
    pub fn exit_chunk<R: Read + Seek>(&mut self, stream: &mut ByteStream<R>) -> Result<ChunkHeader> {
        let header = self.stack.pop().ok_or(DataError::NoOpenChunk)?;
        let position = stream.position();

        if position < header.end() {
            debug!(
                "{}: skipping {} unread bytes of chunk '{}'",
                stream.name(),
                header.end() - position,
                header.tag_str()
            );
        } else if position > header.end() {
            warn!(
                "{}: read {} bytes past the end of chunk '{}'",
                stream.name(),
                position - header.end(),
                header.tag_str()
            );
        }

        if position != header.end() {
            stream.seek_to(header.end())?;
        }
        Ok(header)
    }

    /// Open the next chunk and immediately close it, skipping its body
    pub fn skip_chunk<R: Read + Seek>(&mut self, stream: &mut ByteStream<R>) -> Result<ChunkHeader> {
        self.enter_chunk(stream)?;
        self.exit_chunk(stream)
    }
}
