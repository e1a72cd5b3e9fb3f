//! Seekable binary input with explicit host byte order
//!
//! Every mesh format on disk stores its multi-byte numbers in little-endian
//! order. [`ByteStream`] decodes each field the way a host of the configured
//! [`HostOrder`] would see it in memory and swaps the bytes when that host is
//! big-endian, so the decoded value is the same on every platform.
//!
//! # Example
//!
//! ```
//! use mesh_data::stream::{ByteStream, HostOrder};
//!
//! let mut data = Vec::new();
//! data.extend_from_slice(&42i32.to_le_bytes());
//! data.extend_from_slice(&1.5f32.to_le_bytes());
//!
//! let mut stream = ByteStream::from_bytes("sample.bin", data).with_host_order(HostOrder::Big);
//! assert_eq!(stream.read_i32()?, 42);
//! assert_eq!(stream.read_f32()?, 1.5);
//! assert!(stream.is_eof());
//! # Ok::<(), mesh_data::DataError>(())
//! ```

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::{Quat, Vec2, Vec3};

use crate::error::{DataError, Result};

/// Byte order of the machine the data is decoded on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOrder {
    /// Little-endian host, file values are used as read
    Little,
    /// Big-endian host, multi-byte values are swapped after reading
    Big,
}

impl HostOrder {
    /// Byte order of the compilation target
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Whether values read on this host need a byte swap
    pub const fn needs_swap(self) -> bool {
        matches!(self, Self::Big)
    }
}

impl Default for HostOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// A named, seekable byte source with little-endian numeric decoding
#[derive(Debug)]
pub struct ByteStream<R> {
    inner: R,
    name: String,
    size: u64,
    position: u64,
    host: HostOrder,
}

impl ByteStream<Cursor<Vec<u8>>> {
    /// Wrap an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            inner: Cursor::new(data),
            name: name.into(),
            size,
            position: 0,
            host: HostOrder::native(),
        }
    }
}

impl ByteStream<BufReader<File>> {
    /// Open a file on disk for buffered reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::new(path.display().to_string(), BufReader::new(file))
    }
}

impl<R: Read + Seek> ByteStream<R> {
    /// Wrap an arbitrary reader, measuring its total size
    pub fn new(name: impl Into<String>, mut inner: R) -> Result<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            name: name.into(),
            size,
            position: 0,
            host: HostOrder::native(),
        })
    }

    /// Override the host byte order used for decoding
    #[must_use]
    pub fn with_host_order(mut self, host: HostOrder) -> Self {
        self.host = host;
        self
    }

    /// Identifier used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length of the stream in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current absolute read offset
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left between the current position and the end
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }

    /// Whether the read position is at or beyond the end
    pub fn is_eof(&self) -> bool {
        self.position >= self.size
    }

    pub fn host_order(&self) -> HostOrder {
        self.host
    }

    /// Read up to `buf.len()` bytes, returning how many were read
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let wanted = buf.len().min(usize::try_from(self.remaining()).unwrap_or(usize::MAX));
        let read = self.inner.read(&mut buf[..wanted])?;
        self.position += read as u64;
        Ok(read)
    }

    /// Fill `buf` completely or fail with [`DataError::UnexpectedEof`]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if (buf.len() as u64) > self.remaining() {
            return Err(DataError::UnexpectedEof {
                offset: self.position,
                wanted: buf.len(),
            });
        }
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Seek to an absolute offset, or relative to the current position
    pub fn seek(&mut self, offset: i64, relative: bool) -> Result<()> {
        let target = if relative {
            self.position as i64 + offset
        } else {
            offset
        };
        if target < 0 || target as u64 > self.size {
            return Err(DataError::SeekOutOfRange {
                offset: target,
                size: self.size,
            });
        }
        self.seek_to(target as u64)
    }

    /// Seek to an absolute offset that is known to be inside the stream
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.size {
            return Err(DataError::SeekOutOfRange {
                offset: position as i64,
                size: self.size,
            });
        }
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Skip `count` bytes forward
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.seek(count as i64, true)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let raw = self.read_array::<2>()?;
        Ok(match self.host {
            HostOrder::Little => LittleEndian::read_u16(&raw),
            HostOrder::Big => BigEndian::read_u16(&raw).swap_bytes(),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_array::<4>()?;
        Ok(match self.host {
            HostOrder::Little => LittleEndian::read_u32(&raw),
            HostOrder::Big => BigEndian::read_u32(&raw).swap_bytes(),
        })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read an 8-byte float (X files with a `0064` float size)
    pub fn read_f64(&mut self) -> Result<f64> {
        let raw = self.read_array::<8>()?;
        let bits = match self.host {
            HostOrder::Little => LittleEndian::read_u64(&raw),
            HostOrder::Big => BigEndian::read_u64(&raw).swap_bytes(),
        };
        Ok(f64::from_bits(bits))
    }

    /// Read a four byte tag; tags are never byte swapped
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        self.read_array::<4>()
    }

    /// Read `count` raw bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a NUL-terminated string
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a fixed-width, NUL-padded string field
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String> {
        let bytes = self.read_bytes(width)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn read_vec2(&mut self) -> Result<Vec2> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read a quaternion stored as `w, x, y, z`
    pub fn read_quat_wxyz(&mut self) -> Result<Quat> {
        let w = self.read_f32()?;
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(bytes: &[u8]) -> ByteStream<Cursor<Vec<u8>>> {
        ByteStream::from_bytes("test.bin", bytes.to_vec())
    }

    #[test]
    fn test_little_and_big_hosts_agree() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-123_456i32).to_le_bytes());
        data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data.extend_from_slice(&3.25f32.to_le_bytes());
        data.extend_from_slice(&0xBEEFu16.to_le_bytes());

        let mut little = stream_of(&data).with_host_order(HostOrder::Little);
        let mut big = stream_of(&data).with_host_order(HostOrder::Big);

        assert_eq!(little.read_i32().unwrap(), big.read_i32().unwrap());
        assert_eq!(little.read_u32().unwrap(), big.read_u32().unwrap());
        assert_eq!(
            little.read_f32().unwrap().to_bits(),
            big.read_f32().unwrap().to_bits()
        );
        assert_eq!(little.read_u16().unwrap(), 0xBEEF);
        assert_eq!(big.read_u16().unwrap(), 0xBEEF);
    }

    #[test]
    fn test_short_read_reports_offset() {
        let mut stream = stream_of(&[1, 2, 3]);
        stream.read_u8().unwrap();
        match stream.read_u32() {
            Err(DataError::UnexpectedEof { offset, wanted }) => {
                assert_eq!(offset, 1);
                assert_eq!(wanted, 4);
            }
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
        // A failed read does not move the cursor
        assert_eq!(stream.position(), 1);
    }

    #[test]
    fn test_cstring_and_fixed_string() {
        let mut data = b"Bip01\0".to_vec();
        let mut fixed = [0u8; 8];
        fixed[..4].copy_from_slice(b"Head");
        data.extend_from_slice(&fixed);

        let mut stream = stream_of(&data);
        assert_eq!(stream.read_cstring().unwrap(), "Bip01");
        assert_eq!(stream.read_fixed_string(8).unwrap(), "Head");
        assert!(stream.is_eof());
    }

    #[test]
    fn test_unterminated_cstring_fails() {
        let mut stream = stream_of(b"abc");
        assert!(stream.read_cstring().is_err());
    }

    #[test]
    fn test_seek_bounds() {
        let mut stream = stream_of(&[0; 16]);
        stream.seek(8, false).unwrap();
        stream.seek(-4, true).unwrap();
        assert_eq!(stream.position(), 4);
        assert!(stream.seek(17, false).is_err());
        assert!(stream.seek(-5, true).is_err());
        stream.seek(16, false).unwrap();
        assert!(stream.is_eof());
    }

    #[test]
    fn test_partial_read_at_end() {
        let mut stream = stream_of(&[9, 8, 7]);
        stream.skip(1).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[8, 7]);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_quaternion_component_order() {
        let mut data = Vec::new();
        for v in [1.0f32, 0.0, 0.5, 0.25] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let q = stream_of(&data).read_quat_wxyz().unwrap();
        assert_eq!(q.w, 1.0);
        assert_eq!(q.x, 0.0);
        assert_eq!(q.y, 0.5);
        assert_eq!(q.z, 0.25);
    }
}
