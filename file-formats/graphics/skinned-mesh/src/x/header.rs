//! The 16-byte `xof` file header

use std::fmt;

use crate::error::{MeshError, Result};

/// Size of the header in bytes
pub const HEADER_SIZE: usize = 16;

/// Encoding of the body following the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XEncoding {
    Text,
    Binary,
}

/// Width of floating point values in binary bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatSize {
    F32,
    F64,
}

impl FloatSize {
    pub fn bytes(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Parsed `xof MMmmFFFFSSSS` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XHeader {
    pub major: u8,
    pub minor: u8,
    pub encoding: XEncoding,
    pub float_size: FloatSize,
}

impl XHeader {
    /// Parse the header from the first bytes of a file
    ///
    /// Compressed bodies (`tzip`, `bzip`) and float sizes other than 32 or 64
    /// bits are rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(MeshError::Validation(format!(
                "X header needs {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        if &bytes[..4] != super::MAGIC {
            return Err(MeshError::InvalidMagic {
                expected: "xof ".to_string(),
                actual: String::from_utf8_lossy(&bytes[..4]).into_owned(),
            });
        }

        let major = parse_digits(&bytes[4..6])?;
        let minor = parse_digits(&bytes[6..8])?;

        let encoding = match &bytes[8..12] {
            b"txt " => XEncoding::Text,
            b"bin " => XEncoding::Binary,
            b"tzip" | b"bzip" => {
                return Err(MeshError::UnsupportedFormat(
                    "compressed X files are not supported".to_string(),
                ));
            }
            other => {
                return Err(MeshError::UnsupportedFormat(format!(
                    "unknown X encoding '{}'",
                    String::from_utf8_lossy(other)
                )));
            }
        };

        let float_size = match &bytes[12..16] {
            b"0032" => FloatSize::F32,
            b"0064" => FloatSize::F64,
            other => {
                return Err(MeshError::UnsupportedFormat(format!(
                    "unsupported X float size '{}'",
                    String::from_utf8_lossy(other)
                )));
            }
        };

        Ok(Self {
            major,
            minor,
            encoding,
            float_size,
        })
    }
}

impl fmt::Display for XHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoding = match self.encoding {
            XEncoding::Text => "text",
            XEncoding::Binary => "binary",
        };
        write!(
            f,
            "{}.{:02} {} ({}-bit floats)",
            self.major,
            self.minor,
            encoding,
            self.float_size.bytes() * 8
        )
    }
}

fn parse_digits(bytes: &[u8]) -> Result<u8> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            MeshError::UnsupportedVersion(format!(
                "invalid X version digits '{}'",
                String::from_utf8_lossy(bytes)
            ))
        })
}
