//! `validate` command: load a mesh and report what went wrong

use anyhow::{Result, bail};
use console::style;
use skinned_mesh::SkinnedMesh;
use std::path::Path;

use crate::utils::logging;

pub fn execute(path: &Path, strict: bool) -> Result<()> {
    let mesh = super::load(path)?;
    let (warnings, errors) = logging::counts();
    let mut problems = check(&mesh);
    if warnings + errors > 0 {
        problems.push(format!("loader reported {warnings} warning(s) and {errors} error(s)"));
    }

    if problems.is_empty() {
        println!("{} {}", style("✓").green(), path.display());
        return Ok(());
    }

    for problem in &problems {
        println!("{} {}", style("!").yellow(), problem);
    }
    if strict {
        bail!("{} failed validation with {} problem(s)", path.display(), problems.len());
    }
    println!("{} {} (with warnings)", style("✓").green(), path.display());
    Ok(())
}

/// Structural checks on a loaded mesh
fn check(mesh: &SkinnedMesh) -> Vec<String> {
    let mut problems = Vec::new();

    if mesh.buffers().is_empty() {
        problems.push("mesh has no render buffers".to_string());
    }
    for (i, buffer) in mesh.buffers().iter().enumerate() {
        if buffer.indices.len() % 3 != 0 {
            problems.push(format!("buffer {i} has a partial triangle"));
        }
        if let Some(bad) = buffer.indices.iter().find(|&&idx| idx as usize >= buffer.vertices.len()) {
            problems.push(format!("buffer {i} references missing vertex {bad}"));
        }
        if buffer.material >= mesh.materials().len() && !mesh.materials().is_empty() {
            problems.push(format!("buffer {i} uses missing material {}", buffer.material));
        }
    }

    for joint in mesh.hierarchy().iter() {
        let bad_keys = joint.position_keys.keys().iter().any(|k| !k.value.is_finite())
            || joint.rotation_keys.keys().iter().any(|k| !k.value.is_finite())
            || joint.scale_keys.keys().iter().any(|k| !k.value.is_finite());
        if bad_keys {
            problems.push(format!("joint '{}' has non-finite keyframes", joint.name));
        }
    }

    if mesh.has_animation() && mesh.animation_speed() <= 0.0 {
        problems.push("animated mesh has no playback speed".to_string());
    }
    problems
}
