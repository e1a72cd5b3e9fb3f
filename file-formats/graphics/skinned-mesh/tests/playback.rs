//! Shared meshes, per-instance playback and loading from disk

mod common;

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use skinned_mesh::{
    AnimatedMeshController, InterpolationMode, LoaderOptions, MeshCache, MeshFormat, PlaybackEvent,
    PlaybackOptions, load_mesh,
};
use tempfile::TempDir;

use common::{animated_arm_b3d, init_logging, static_triangle_b3d};

#[test]
fn test_cache_loads_once_and_shares() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arm.b3d");
    fs::write(&path, animated_arm_b3d()).unwrap();

    let mut cache = MeshCache::new();
    let first = cache.get_or_load(&path, &LoaderOptions::default()).unwrap();
    // Deleting the file proves the second lookup is served from memory
    fs::remove_file(&path).unwrap();
    let second = cache.get_or_load(&path, &LoaderOptions::default()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    let mut walking = AnimatedMeshController::new(Arc::clone(&first));
    let mut idle = AnimatedMeshController::new(Arc::clone(&second));
    walking.set_current_frame(1000.0);
    let moved = walking.current_mesh()[0].vertices[0].position.x;
    assert!((moved - 10.0).abs() < 1e-4);
    assert!(idle.current_mesh()[0].vertices[0].position.x.abs() < 1e-4);

    // The shared asset itself never moves
    assert!(first.buffers()[0].vertices[0].position.x.abs() < 1e-6);
}

#[test]
fn test_extension_mismatch_is_detected_by_magic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("renamed.x");
    fs::write(&path, static_triangle_b3d()).unwrap();

    let mesh = load_mesh(&path, &LoaderOptions::default()).unwrap();
    assert_eq!(mesh.format(), MeshFormat::B3d);
}

#[test]
fn test_non_looping_playback_finishes() {
    let mesh = Arc::new(
        skinned_mesh::load_mesh_from_bytes("arm.b3d", animated_arm_b3d(), &LoaderOptions::default()).unwrap(),
    );
    let options = PlaybackOptions {
        looping: false,
        interpolation: InterpolationMode::Constant,
        frame_range: Some((200.0, 600.0)),
        ..PlaybackOptions::default()
    };
    let mut instance = AnimatedMeshController::with_options(mesh, options);
    assert_eq!(instance.frame_loop(), (200.0, 600.0));

    assert_eq!(instance.advance(100.0), PlaybackEvent::Playing);
    assert_eq!(instance.current_frame(), 450.0);
    assert_eq!(instance.advance(100.0), PlaybackEvent::Finished);
    assert_eq!(instance.current_frame(), 600.0);
    assert!(instance.is_finished());

    // Constant interpolation holds the key at frame 0 until frame 1000
    let x = instance.current_mesh()[0].vertices[0].position.x;
    assert!(x.abs() < 1e-4, "{x}");
}
