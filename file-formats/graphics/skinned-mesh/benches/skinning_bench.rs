use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Quat, Vec2, Vec3};
use skinned_mesh::{
    AnimatedMeshController, KeyframeSampler, LoaderOptions, MeshFormat, Pose, RenderBuffer,
    SkinnedMesh, SkinningEngine, SkinningOptions, Vertex,
};
use std::hint::black_box;
use std::sync::Arc;

/// A strip of `segments` quads driven by a chain of joints, two weights per vertex
fn create_test_mesh(segments: usize, joints: usize) -> SkinnedMesh {
    let mut mesh = SkinnedMesh::new("bench", MeshFormat::B3d);
    let mut buffer = RenderBuffer::new(0);
    for i in 0..=segments {
        let x = i as f32;
        buffer.vertices.push(Vertex::new(Vec3::new(x, 0.0, 0.0), Vec3::Z, Vec2::new(x, 0.0)));
        buffer.vertices.push(Vertex::new(Vec3::new(x, 1.0, 0.0), Vec3::Z, Vec2::new(x, 1.0)));
    }
    for i in 0..segments as u32 {
        let a = i * 2;
        buffer.indices.extend_from_slice(&[a, a + 2, a + 1, a + 1, a + 2, a + 3]);
    }
    let vertex_count = buffer.vertices.len();
    let buffer = mesh.add_buffer(buffer);

    let mut parent = None;
    for j in 0..joints {
        let joint = mesh.hierarchy_mut().create_joint(format!("joint{j}"), parent);
        if let Some(node) = mesh.hierarchy_mut().joint_mut(joint) {
            node.set_local_trs(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE);
            node.rotation_keys.push(0.0, Quat::IDENTITY);
            node.rotation_keys.push(100.0, Quat::from_rotation_z(0.3));
        }
        parent = Some(joint);
    }

    for vertex in 0..vertex_count {
        let segment = vertex / 2;
        let first = segment * joints / (segments + 1);
        let second = (first + 1).min(joints - 1);
        mesh.add_weight(first, buffer, vertex, 0.6);
        mesh.add_weight(second, buffer, vertex, 0.4);
    }

    mesh.finalize(&LoaderOptions::default());
    mesh
}

fn skinning_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("skin");
    for segments in [64, 1024, 8192] {
        let mesh = create_test_mesh(segments, 16);
        let sampler = KeyframeSampler::default();
        let mut pose = Pose::bind(mesh.hierarchy());
        pose.sample(mesh.hierarchy(), &sampler, 50.0);
        pose.update_globals(mesh.hierarchy());
        let mut output = mesh.buffers().to_vec();
        let mut engine = SkinningEngine::new();
        let options = SkinningOptions::default();

        group.bench_with_input(BenchmarkId::from_parameter(segments), &segments, |b, _| {
            b.iter(|| {
                engine.skin(black_box(&mesh), &pose.globals, &options, &mut output);
            })
        });
    }
    group.finish();
}

fn sampling_benchmark(c: &mut Criterion) {
    let mesh = create_test_mesh(64, 64);
    let sampler = KeyframeSampler::default();
    let mut pose = Pose::bind(mesh.hierarchy());

    c.bench_function("sample_pose_64_joints", |b| {
        let mut frame = 0.0;
        b.iter(|| {
            frame = (frame + 1.7) % 100.0;
            pose.sample(mesh.hierarchy(), &sampler, black_box(frame));
            pose.update_globals(mesh.hierarchy());
        })
    });
}

fn controller_benchmark(c: &mut Criterion) {
    let mesh = Arc::new(create_test_mesh(1024, 16));

    c.bench_function("controller_advance_and_skin", |b| {
        let mut instance = AnimatedMeshController::new(Arc::clone(&mesh));
        b.iter(|| {
            instance.advance(black_box(16.0));
            black_box(instance.current_mesh().len());
        })
    });

    c.bench_function("controller_cached_frame", |b| {
        let mut instance = AnimatedMeshController::new(Arc::clone(&mesh));
        instance.get_mesh(50.0);
        b.iter(|| black_box(instance.get_mesh(black_box(50.0)).len()))
    });
}

criterion_group!(benches, skinning_benchmark, sampling_benchmark, controller_benchmark);
criterion_main!(benches);
