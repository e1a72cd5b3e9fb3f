//! Skeletal animation for B3D, X and MS3D meshes
//!
//! This crate loads skinned meshes into one shared data model and plays them
//! back:
//!
//! - [`skeleton`]: index-linked joint hierarchy and skin weights
//! - [`animation`]: keyframe tracks, sampling and per-instance poses
//! - [`skinning`]: weighted vertex blending into per-instance buffers
//! - [`b3d`], [`x`], [`ms3d`]: format loaders, dispatched through [`MeshFormat`]
//! - [`controller`]: playback state and frame-cached evaluation
//! - [`cache`]: caller-owned registry of shared meshes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skinned_mesh::{AnimatedMeshController, LoaderOptions, MeshCache};
//!
//! let mut cache = MeshCache::new();
//! let dwarf = cache.get_or_load("models/dwarf.x", &LoaderOptions::default())?;
//!
//! let mut instance = AnimatedMeshController::new(Arc::clone(&dwarf));
//! instance.advance(33.0);
//! for buffer in instance.current_mesh() {
//!     println!("{} triangles", buffer.triangle_count());
//! }
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

pub mod animation;
pub mod b3d;
pub mod buffer;
pub mod cache;
pub mod controller;
pub mod error;
pub mod loader;
pub mod mesh;
pub mod ms3d;
pub mod skeleton;
pub mod skinning;
pub mod x;

pub use animation::{InterpolationMode, KeyframeSampler, KeyframeTrack, Pose};
pub use buffer::{Aabb, Material, MaterialKind, RenderBuffer, RenderFlags, TextureLayer, Vertex};
pub use cache::MeshCache;
pub use controller::{AnimatedMeshController, AnimationMode, PlaybackEvent, PlaybackOptions};
pub use error::{MeshError, Result};
pub use loader::{
    FrameUnit, LoaderOptions, MeshFormat, WeightIndexPolicy, load_from_stream, load_mesh,
    load_mesh_from_bytes,
};
pub use mesh::SkinnedMesh;
pub use skeleton::{Joint, JointHierarchy, Weight};
pub use skinning::{SkinningEngine, SkinningOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
