//! Builders for synthetic mesh files

#![allow(dead_code)]

/// Little-endian writer with nested B3D chunk support
#[derive(Default)]
pub struct B3dWriter {
    data: Vec<u8>,
    open: Vec<usize>,
}

impl B3dWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a chunk; its length is patched in by [`B3dWriter::end`]
    pub fn begin(&mut self, tag: &[u8; 4]) -> &mut Self {
        self.open.push(self.data.len());
        self.data.extend_from_slice(tag);
        self.data.extend_from_slice(&0i32.to_le_bytes());
        self
    }

    pub fn end(&mut self) -> &mut Self {
        let start = self.open.pop().expect("unbalanced chunk");
        let length = (self.data.len() - start - 8) as i32;
        self.data[start + 4..start + 8].copy_from_slice(&length.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for value in values {
            self.data.extend_from_slice(&value.to_le_bytes());
        }
        self
    }

    pub fn cstr(&mut self, s: &str) -> &mut Self {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self
    }

    /// NODE header fields with an identity rotation
    pub fn node_fields(&mut self, name: &str, position: [f32; 3]) -> &mut Self {
        self.cstr(name)
            .f32s(&position)
            .f32s(&[1.0, 1.0, 1.0])
            .f32s(&[1.0, 0.0, 0.0, 0.0])
    }

    /// VRTS chunk with positions only and no texture coordinates
    pub fn vrts(&mut self, positions: &[[f32; 3]]) -> &mut Self {
        self.begin(b"VRTS").i32(0).i32(0).i32(0);
        for p in positions {
            self.f32s(p);
        }
        self.end()
    }

    pub fn tris(&mut self, brush: i32, indices: &[i32]) -> &mut Self {
        self.begin(b"TRIS").i32(brush);
        for &i in indices {
            self.i32(i);
        }
        self.end()
    }

    /// TEXS chunk with default flags and an identity transform per texture
    pub fn texs(&mut self, paths: &[&str]) -> &mut Self {
        self.begin(b"TEXS");
        for path in paths {
            self.cstr(path).i32(1).i32(2).f32s(&[0.0, 0.0, 1.0, 1.0, 0.0]);
        }
        self.end()
    }

    /// BRUS chunk of opaque white brushes, each listing `texture_ids`
    pub fn brus(&mut self, names: &[&str], texture_ids: &[i32]) -> &mut Self {
        self.begin(b"BRUS").i32(texture_ids.len() as i32);
        for name in names {
            self.cstr(name).f32s(&[1.0, 1.0, 1.0, 1.0, 0.0]).i32(1).i32(0);
            for &id in texture_ids {
                self.i32(id);
            }
        }
        self.end()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        assert!(self.open.is_empty(), "unclosed chunks");
        std::mem::take(&mut self.data)
    }
}

/// A single static triangle under an identity NODE
pub fn static_triangle_b3d() -> Vec<u8> {
    let mut w = B3dWriter::new();
    w.begin(b"BB3D").i32(1);
    w.begin(b"NODE").node_fields("root", [0.0, 0.0, 0.0]);
    w.begin(b"MESH").i32(-1);
    w.vrts(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    w.tris(-1, &[0, 1, 2]);
    w.end();
    w.end();
    w.end();
    w.finish()
}

/// Two-node arm: the mesh hangs off `root`, `bone` moves +10 on X over 10 frames
pub fn animated_arm_b3d() -> Vec<u8> {
    let mut w = B3dWriter::new();
    w.begin(b"BB3D").i32(1);
    w.begin(b"NODE").node_fields("root", [0.0, 0.0, 0.0]);
    w.begin(b"MESH").i32(-1);
    w.vrts(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    w.tris(-1, &[0, 1, 2]);
    w.end();
    w.begin(b"ANIM").i32(0).i32(10).f32s(&[25.0]).end();

    w.begin(b"NODE").node_fields("bone", [0.0, 0.0, 0.0]);
    w.begin(b"BONE");
    for vertex in 0..3 {
        w.i32(vertex).f32s(&[1.0]);
    }
    w.end();
    w.begin(b"KEYS").i32(1);
    w.i32(0).f32s(&[0.0, 0.0, 0.0]);
    w.i32(10).f32s(&[10.0, 0.0, 0.0]);
    w.end();
    w.end();

    w.end();
    w.end();
    w.finish()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
