//! Command implementations

pub mod info;
pub mod joints;
pub mod sample;
pub mod validate;

use anyhow::{Context, Result};
use skinned_mesh::{LoaderOptions, SkinnedMesh, load_mesh};
use std::path::Path;

/// Load a mesh with default options, attaching the path to any error
pub fn load(path: &Path) -> Result<SkinnedMesh> {
    load_mesh(path, &LoaderOptions::default())
        .with_context(|| format!("Failed to load mesh: {}", path.display()))
}
