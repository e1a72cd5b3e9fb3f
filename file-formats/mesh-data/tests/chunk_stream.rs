//! Integration tests for chunk traversal over byte streams

use std::io::Write;

use mesh_data::{ByteStream, ChunkReader, DataError, HostOrder};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn build_chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend(tag);
    buffer.extend(&(body.len() as i32).to_le_bytes());
    buffer.extend(body);
    buffer
}

#[test_case(0 ; "empty body")]
#[test_case(1 ; "single byte")]
#[test_case(12 ; "three words")]
#[test_case(4096 ; "large body")]
fn enter_then_exit_lands_on_declared_end(length: usize) {
    let mut data = build_chunk(b"ANIM", &vec![0xAB; length]);
    data.extend(build_chunk(b"NEXT", &[]));

    let mut stream = ByteStream::from_bytes("roundtrip.b3d", data);
    let mut reader = ChunkReader::new();

    let header = reader.enter_chunk(&mut stream).unwrap();
    reader.exit_chunk(&mut stream).unwrap();

    assert_eq!(stream.position(), header.start + 8 + length as u64);
    assert_eq!(stream.position(), header.end());
    assert_eq!(reader.enter_chunk(&mut stream).unwrap().tag_str(), "NEXT");
}

#[test]
fn partially_read_body_is_skipped() {
    let mut body = Vec::new();
    body.extend(&7i32.to_le_bytes());
    body.extend(build_chunk(b"ZZZZ", &[1, 2, 3]));
    body.extend(&9i32.to_le_bytes());

    let data = build_chunk(b"NODE", &body);
    let mut stream = ByteStream::from_bytes("skip.b3d", data);
    let mut reader = ChunkReader::new();

    reader.enter_chunk(&mut stream).unwrap();
    assert_eq!(stream.read_i32().unwrap(), 7);

    // Unknown tag: open and leave without reading
    let unknown = reader.enter_chunk(&mut stream).unwrap();
    assert_eq!(unknown.tag_str(), "ZZZZ");
    reader.exit_chunk(&mut stream).unwrap();

    assert_eq!(stream.read_i32().unwrap(), 9);
    assert!(reader.is_exhausted(&stream));
    reader.exit_chunk(&mut stream).unwrap();
    assert!(stream.is_eof());
}

#[test_case(HostOrder::Little ; "little endian host")]
#[test_case(HostOrder::Big ; "big endian host")]
fn numeric_fields_decode_identically(host: HostOrder) {
    let mut body = Vec::new();
    body.extend(&(-42i32).to_le_bytes());
    body.extend(&4_000_000_000u32.to_le_bytes());
    body.extend(&(-0.125f32).to_le_bytes());
    let data = build_chunk(b"KEYS", &body);

    let mut stream = ByteStream::from_bytes("endian.b3d", data).with_host_order(host);
    let mut reader = ChunkReader::new();
    let header = reader.enter_chunk(&mut stream).unwrap();

    assert_eq!(header.tag, *b"KEYS");
    assert_eq!(header.length, 12);
    assert_eq!(stream.read_i32().unwrap(), -42);
    assert_eq!(stream.read_u32().unwrap(), 4_000_000_000);
    assert_eq!(stream.read_f32().unwrap(), -0.125);
}

#[test]
fn truncated_header_fails() {
    let mut stream = ByteStream::from_bytes("short.b3d", b"BB3D\x10\x00".to_vec());
    let err = ChunkReader::new().enter_chunk(&mut stream).unwrap_err();
    assert!(matches!(err, DataError::UnexpectedEof { offset: 4, .. }));
}

#[test]
fn length_past_end_of_stream_fails() {
    let mut data = b"BB3D".to_vec();
    data.extend(&64i32.to_le_bytes());
    data.extend(&[0; 10]);
    let mut stream = ByteStream::from_bytes("overrun.b3d", data);
    let err = ChunkReader::new().enter_chunk(&mut stream).unwrap_err();
    assert!(matches!(err, DataError::ChunkOverrun { end: 72, limit: 18, .. }));
}

#[test]
fn stream_from_file_on_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_chunk(b"TEXS", &[0; 6])).unwrap();
    file.flush().unwrap();

    let mut stream = ByteStream::open(file.path()).unwrap();
    assert_eq!(stream.size(), 14);
    assert!(stream.name().ends_with(&*file.path().file_name().unwrap().to_string_lossy()));
    let header = ChunkReader::new().skip_chunk(&mut stream).unwrap();
    assert_eq!(header.length, 6);
    assert!(stream.is_eof());
}
