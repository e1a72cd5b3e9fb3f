//! `sample` command: animated joint transforms at one frame

use anyhow::{Result, bail};
use skinned_mesh::{AnimatedMeshController, AnimationMode, InterpolationMode, PlaybackOptions};
use std::sync::Arc;
use std::path::Path;

use crate::utils::{add_table_row, create_table, format_transform};

pub fn execute(path: &Path, frame: f32, joint: Option<&str>, constant: bool) -> Result<()> {
    let mesh = Arc::new(super::load(path)?);

    let selected: Vec<usize> = match joint {
        Some(name) => match mesh.joint_index_by_name(name) {
            Some(index) => vec![index],
            None => bail!("No joint named '{}' in {}", name, path.display()),
        },
        None => (0..mesh.joint_count()).collect(),
    };

    let options = PlaybackOptions {
        interpolation: if constant {
            InterpolationMode::Constant
        } else {
            InterpolationMode::Linear
        },
        mode: AnimationMode::NodesOnly,
        ..PlaybackOptions::default()
    };
    let mut instance = AnimatedMeshController::with_options(Arc::clone(&mesh), options);
    instance.get_mesh(frame);

    println!(
        "Frame {} of {} ({})",
        frame,
        mesh.animation_frames(),
        mesh.format().frame_unit().name()
    );
    let mut table = create_table(&["#", "Joint", "Translation", "Rotation (deg)", "Scale"]);
    for index in selected {
        let Some(global) = instance.joint_animated_global(index) else {
            continue;
        };
        let (translation, rotation, scale) = format_transform(&global);
        add_table_row(
            &mut table,
            vec![
                index.to_string(),
                mesh.joint_name(index).unwrap_or_default().to_string(),
                translation,
                rotation,
                scale,
            ],
        );
    }
    table.printstd();
    Ok(())
}
