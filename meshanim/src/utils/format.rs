//! Formatting utilities

use glam::{Mat4, Vec3};
use humansize::{DECIMAL, format_size};

/// Format file size in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

pub fn format_vec3(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

/// Translation, rotation (Euler degrees, XYZ) and scale of a transform
pub fn format_transform(matrix: &Mat4) -> (String, String, String) {
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    let (x, y, z) = rotation.to_euler(glam::EulerRot::XYZ);
    let degrees = Vec3::new(x, y, z) * (180.0 / std::f32::consts::PI);
    (
        format_vec3(translation),
        format_vec3(degrees),
        format_vec3(scale),
    )
}

/// Frame count together with its unit and playback length
pub fn format_duration(frames: f32, fps: f32) -> String {
    if fps <= 0.0 {
        return "N/A".to_string();
    }
    format!("{:.2} s", frames / fps)
}
