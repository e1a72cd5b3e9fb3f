//! `info` command: summary of a mesh file

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::utils::{
    add_table_row, create_property_table, create_table, format_bytes, format_duration, format_vec3,
};

pub fn execute(path: &Path, detailed: bool) -> Result<()> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?
        .len();
    let mesh = super::load(path)?;
    let format = mesh.format();
    let bounds = mesh.bounding_box();
    let weighted = mesh.hierarchy().iter().filter(|j| !j.weights.is_empty()).count();
    let keyed = mesh.hierarchy().iter().filter(|j| j.has_keys()).count();

    println!("Mesh: {}", path.display());
    println!();
    create_property_table(&[
        ("Format", format.to_string()),
        ("File size", format_bytes(size)),
        ("Joints", format!("{} ({weighted} weighted, {keyed} animated)", mesh.joint_count())),
        ("Skin weights", mesh.hierarchy().weight_count().to_string()),
        ("Buffers", mesh.buffers().len().to_string()),
        ("Vertices", mesh.vertex_count().to_string()),
        ("Triangles", (mesh.index_count() / 3).to_string()),
        ("Materials", mesh.materials().len().to_string()),
        ("Animated", if mesh.has_animation() { "yes" } else { "no" }.to_string()),
        (
            "Frames",
            format!("{} ({})", mesh.frame_count(), format.frame_unit().name()),
        ),
        ("Speed", format!("{} frames/s", mesh.animation_speed())),
        (
            "Length",
            format_duration(mesh.animation_frames(), mesh.animation_speed()),
        ),
        (
            "Bounds",
            format!("{} .. {}", format_vec3(bounds.min), format_vec3(bounds.max)),
        ),
    ])
    .printstd();

    if detailed {
        println!();
        println!("Materials:");
        let mut table = create_table(&["#", "Name", "Kind", "Diffuse", "Textures"]);
        for (i, material) in mesh.materials().iter().enumerate() {
            let textures: Vec<&str> = material.textures.iter().map(|t| t.path.as_str()).collect();
            add_table_row(
                &mut table,
                vec![
                    i.to_string(),
                    material.name.clone(),
                    format!("{:?}", material.kind),
                    format!(
                        "({:.2}, {:.2}, {:.2}, {:.2})",
                        material.diffuse.x, material.diffuse.y, material.diffuse.z, material.diffuse.w
                    ),
                    textures.join(", "),
                ],
            );
        }
        table.printstd();

        println!();
        println!("Buffers:");
        let mut table = create_table(&["#", "Material", "Vertices", "Triangles", "Attached to"]);
        for (i, buffer) in mesh.buffers().iter().enumerate() {
            let attached = buffer
                .attached_joint
                .and_then(|j| mesh.joint_name(j))
                .unwrap_or("-");
            add_table_row(
                &mut table,
                vec![
                    i.to_string(),
                    buffer.material.to_string(),
                    buffer.vertex_count().to_string(),
                    buffer.triangle_count().to_string(),
                    attached.to_string(),
                ],
            );
        }
        table.printstd();
    }

    Ok(())
}
