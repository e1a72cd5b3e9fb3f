//! Per-instance playback of a shared skinned mesh
//!
//! A [`SkinnedMesh`] is loaded once and shared behind an [`Arc`]. Every
//! playing instance wraps it in an [`AnimatedMeshController`], which owns the
//! mutable half: current frame, loop range, speed, the sampled [`Pose`] and a
//! private copy of the render buffers that skinning writes into.
//!
//! Evaluation is memoized: [`AnimatedMeshController::get_mesh`] only resamples
//! and reskins when the frame, animation mode or interpolation mode differ
//! from the previous call.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skinned_mesh::controller::AnimatedMeshController;
//! use skinned_mesh::{load_mesh, LoaderOptions};
//!
//! let mesh = Arc::new(load_mesh("models/ninja.b3d", &LoaderOptions::default())?);
//! let mut ninja = AnimatedMeshController::new(Arc::clone(&mesh));
//! ninja.set_frame_loop(0.0, 1400.0);
//!
//! // Once per tick
//! ninja.advance(16.0);
//! let buffers = ninja.current_mesh();
//! println!("{} buffers to draw", buffers.len());
//! # Ok::<(), skinned_mesh::MeshError>(())
//! ```

use std::sync::Arc;

use glam::Mat4;
use log::{debug, trace};

use crate::animation::{InterpolationMode, KeyframeSampler, Pose};
use crate::buffer::RenderBuffer;
use crate::mesh::SkinnedMesh;
use crate::skinning::{SkinningEngine, SkinningOptions};

/// Which parts of the mesh an evaluation updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationMode {
    /// Joint matrices only; vertices keep their last skinned state
    NodesOnly,
    /// Reskin from the last pose without resampling keyframes
    SkinOnly,
    /// Resample joints and reskin vertices
    #[default]
    Both,
}

/// Initial playback settings of a controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub interpolation: InterpolationMode,
    pub mode: AnimationMode,
    pub looping: bool,
    /// Frames per second in the mesh's frame unit; `None` uses the mesh speed
    pub fps: Option<f32>,
    /// Loop range; `None` plays the whole animation
    pub frame_range: Option<(f32, f32)>,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            interpolation: InterpolationMode::Linear,
            mode: AnimationMode::Both,
            looping: true,
            fps: None,
            frame_range: None,
        }
    }
}

/// Outcome of [`AnimatedMeshController::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Still inside the loop range
    Playing,
    /// Wrapped around the loop range at least once
    Looped,
    /// A non-looping animation reached the end of its range
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    frame: f32,
    mode: AnimationMode,
    interpolation: InterpolationMode,
}

/// Cross-fade from a captured pose into the running animation
#[derive(Debug, Clone)]
struct Transition {
    from: Vec<Mat4>,
    duration: f32,
    elapsed: f32,
}

impl Transition {
    fn weight(&self) -> f32 {
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }
}

/// Playback state and animated output of one mesh instance
#[derive(Debug, Clone)]
pub struct AnimatedMeshController {
    mesh: Arc<SkinnedMesh>,
    pose: Pose,
    output: Vec<RenderBuffer>,
    engine: SkinningEngine,
    skinning: SkinningOptions,
    sampler: KeyframeSampler,
    mode: AnimationMode,
    start_frame: f32,
    end_frame: f32,
    current_frame: f32,
    /// Signed playback speed in frame units per second
    fps: f32,
    looping: bool,
    finished: bool,
    cache_key: Option<CacheKey>,
    skinning_passes: u64,
    transition: Option<Transition>,
}

impl AnimatedMeshController {
    pub fn new(mesh: Arc<SkinnedMesh>) -> Self {
        Self::with_options(mesh, PlaybackOptions::default())
    }

    pub fn with_options(mesh: Arc<SkinnedMesh>, options: PlaybackOptions) -> Self {
        let pose = Pose::bind(mesh.hierarchy());
        let output = mesh.buffers().to_vec();
        let fps = options.fps.unwrap_or_else(|| mesh.animation_speed());
        let last = mesh.animation_frames().max(0.0);

        let mut controller = Self {
            mesh,
            pose,
            output,
            engine: SkinningEngine::new(),
            skinning: SkinningOptions::default(),
            sampler: KeyframeSampler::new(options.interpolation),
            mode: options.mode,
            start_frame: 0.0,
            end_frame: last,
            current_frame: 0.0,
            fps,
            looping: options.looping,
            finished: false,
            cache_key: None,
            skinning_passes: 0,
            transition: None,
        };
        if let Some((start, end)) = options.frame_range {
            controller.set_frame_loop(start, end);
        }
        controller
    }

    /// The shared asset this instance plays
    pub fn mesh(&self) -> &Arc<SkinnedMesh> {
        &self.mesh
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Last frame a loop range may reach
    fn last_frame(&self) -> f32 {
        self.mesh.animation_frames().max(0.0)
    }

    /// Restrict playback to `[start, end]`
    ///
    /// Both ends are clamped to the animation and swapped when reversed.
    /// Playback restarts at the start, or at the end when playing backwards.
    pub fn set_frame_loop(&mut self, start: f32, end: f32) {
        let last = self.last_frame();
        let mut start = start.clamp(0.0, last);
        let mut end = end.clamp(0.0, last);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        self.start_frame = start;
        self.end_frame = end;
        self.current_frame = if self.fps < 0.0 { end } else { start };
        self.finished = false;
        debug!("{}: frame loop {}..{}", self.mesh.name(), start, end);
    }

    pub fn frame_loop(&self) -> (f32, f32) {
        (self.start_frame, self.end_frame)
    }

    /// Set the signed playback speed; negative values play backwards
    pub fn set_animation_speed(&mut self, fps: f32) {
        self.fps = fps;
    }

    pub fn animation_speed(&self) -> f32 {
        self.fps
    }

    pub fn set_loop_mode(&mut self, looping: bool) {
        self.looping = looping;
        self.finished = false;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Whether a non-looping animation has reached the end of its range
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Jump to `frame`, clamped into the loop range
    pub fn set_current_frame(&mut self, frame: f32) {
        self.current_frame = frame.clamp(self.start_frame, self.end_frame);
        self.finished = false;
    }

    pub fn current_frame(&self) -> f32 {
        self.current_frame
    }

    pub fn set_interpolation(&mut self, mode: InterpolationMode) {
        self.sampler.mode = mode;
    }

    pub fn interpolation(&self) -> InterpolationMode {
        self.sampler.mode
    }

    pub fn set_animation_mode(&mut self, mode: AnimationMode) {
        self.mode = mode;
    }

    pub fn animation_mode(&self) -> AnimationMode {
        self.mode
    }

    pub fn set_skinning_options(&mut self, options: SkinningOptions) {
        self.skinning = options;
        self.cache_key = None;
    }

    /// Cross-fade from the current pose over `duration_frames`
    ///
    /// A non-positive duration cancels a running transition.
    pub fn set_transition(&mut self, duration_frames: f32) {
        self.transition = (duration_frames > 0.0).then(|| Transition {
            from: self.pose.locals.clone(),
            duration: duration_frames,
            elapsed: 0.0,
        });
        self.cache_key = None;
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Move the playhead by `time_ms` milliseconds of wall-clock time
    pub fn advance(&mut self, time_ms: f32) -> PlaybackEvent {
        if self.finished {
            return PlaybackEvent::Finished;
        }

        let delta = self.fps * time_ms / 1000.0;
        if let Some(transition) = &mut self.transition {
            transition.elapsed += delta.abs();
            self.cache_key = None;
        }

        let length = self.end_frame - self.start_frame;
        if length <= 0.0 {
            self.current_frame = self.start_frame;
            return PlaybackEvent::Playing;
        }

        let frame = self.current_frame + delta;
        if self.looping {
            let wrapped = self.start_frame + (frame - self.start_frame).rem_euclid(length);
            let looped = frame < self.start_frame || frame >= self.end_frame;
            self.current_frame = wrapped;
            if looped {
                trace!("{}: animation looped", self.mesh.name());
                return PlaybackEvent::Looped;
            }
            return PlaybackEvent::Playing;
        }

        if self.fps >= 0.0 && frame >= self.end_frame {
            self.current_frame = self.end_frame;
            self.finished = true;
        } else if self.fps < 0.0 && frame <= self.start_frame {
            self.current_frame = self.start_frame;
            self.finished = true;
        } else {
            self.current_frame = frame;
        }

        if self.finished {
            debug!("{}: animation finished at frame {}", self.mesh.name(), self.current_frame);
            PlaybackEvent::Finished
        } else {
            PlaybackEvent::Playing
        }
    }

    /// Animated buffers at the current frame
    pub fn current_mesh(&mut self) -> &[RenderBuffer] {
        self.get_mesh(self.current_frame)
    }

    /// Animated buffers at `frame`
    ///
    /// Calling this twice with the same frame and modes reuses the previous
    /// result without sampling or skinning.
    pub fn get_mesh(&mut self, frame: f32) -> &[RenderBuffer] {
        let key = CacheKey {
            frame,
            mode: self.mode,
            interpolation: self.sampler.mode,
        };
        if self.cache_key != Some(key) {
            self.evaluate(frame);
            self.cache_key = Some(key);
        }
        &self.output
    }

    fn evaluate(&mut self, frame: f32) {
        match self.mode {
            AnimationMode::NodesOnly => self.update_pose(frame),
            AnimationMode::SkinOnly => self.skin(),
            AnimationMode::Both => {
                self.update_pose(frame);
                self.skin();
            }
        }
    }

    fn update_pose(&mut self, frame: f32) {
        let hierarchy = self.mesh.hierarchy();
        self.pose.sample(hierarchy, &self.sampler, frame);

        if let Some(transition) = &self.transition {
            let weight = transition.weight();
            self.pose.blend_from(&transition.from, weight);
            if weight >= 1.0 {
                self.transition = None;
            }
        }
        self.pose.update_globals(hierarchy);
    }

    fn skin(&mut self) {
        // Static meshes keep the bind pose copy as is
        if !self.mesh.has_animation() {
            return;
        }
        self.engine
            .skin(&self.mesh, &self.pose.globals, &self.skinning, &mut self.output);
        self.skinning_passes += 1;
    }

    /// Number of skinning passes executed so far
    pub fn skinning_passes(&self) -> u64 {
        self.skinning_passes
    }

    /// Skinning matrices of the last pass
    pub fn combined_matrices(&self) -> &[Mat4] {
        self.engine.combined_matrices()
    }

    /// Animated global transform of a joint, for attaching other objects
    pub fn joint_animated_global(&self, index: usize) -> Option<Mat4> {
        self.pose.globals.get(index).copied()
    }

    pub fn joint_animated_global_by_name(&self, name: &str) -> Option<Mat4> {
        self.mesh
            .joint_index_by_name(name)
            .and_then(|index| self.joint_animated_global(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Vertex;
    use crate::loader::{LoaderOptions, MeshFormat};
    use glam::{Vec2, Vec3};
    use pretty_assertions::assert_eq;

    /// One joint sliding from x=0 at frame 0 to x=10 at frame 100
    fn sliding_mesh() -> Arc<SkinnedMesh> {
        let mut mesh = SkinnedMesh::new("slide", MeshFormat::B3d);
        let mut buffer = RenderBuffer::new(0);
        buffer.vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::X, Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::Y, Vec3::Z, Vec2::ZERO),
        ];
        buffer.indices = vec![0, 1, 2];
        mesh.add_buffer(buffer);

        let root = mesh.hierarchy_mut().create_joint("root", None);
        {
            let joint = mesh.hierarchy_mut().joint_mut(root).unwrap();
            joint.position_keys.push(0.0, Vec3::ZERO);
            joint.position_keys.push(100.0, Vec3::new(10.0, 0.0, 0.0));
        }
        for vertex in 0..3 {
            mesh.add_weight(root, 0, vertex, 1.0);
        }
        mesh.set_animation_speed(100.0);
        mesh.finalize(&LoaderOptions::default());
        Arc::new(mesh)
    }

    #[test]
    fn test_frame_cache_short_circuit() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        let first = controller.get_mesh(5.0).to_vec();
        let second = controller.get_mesh(5.0).to_vec();
        assert_eq!(first, second);
        assert_eq!(controller.skinning_passes(), 1);

        controller.get_mesh(6.0);
        assert_eq!(controller.skinning_passes(), 2);

        controller.set_interpolation(InterpolationMode::Constant);
        controller.get_mesh(6.0);
        assert_eq!(controller.skinning_passes(), 3, "interpolation is part of the cache key");
    }

    #[test]
    fn test_skinned_positions_follow_joint() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        let buffers = controller.get_mesh(50.0);
        let p = buffers[0].vertices[1].position;
        assert!((p - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-5, "{p:?}");

        let hand = controller.joint_animated_global_by_name("root").unwrap();
        assert!((hand.w_axis.truncate() - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
        assert!(controller.joint_animated_global_by_name("missing").is_none());
    }

    #[test]
    fn test_looping_wraps_into_range() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        controller.set_frame_loop(20.0, 60.0);
        assert_eq!(controller.current_frame(), 20.0);

        // 100 frames per second, 300 ms is 30 frames
        assert_eq!(controller.advance(300.0), PlaybackEvent::Playing);
        assert_eq!(controller.current_frame(), 50.0);
        assert_eq!(controller.advance(300.0), PlaybackEvent::Looped);
        assert!((controller.current_frame() - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_backwards_looping() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        controller.set_animation_speed(-100.0);
        controller.set_frame_loop(20.0, 60.0);
        assert_eq!(controller.current_frame(), 60.0);
        assert_eq!(controller.advance(500.0), PlaybackEvent::Looped);
        assert!((controller.current_frame() - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_non_looping_clamps_and_finishes() {
        let options = PlaybackOptions {
            looping: false,
            ..PlaybackOptions::default()
        };
        let mut controller = AnimatedMeshController::with_options(sliding_mesh(), options);
        assert_eq!(controller.advance(500.0), PlaybackEvent::Playing);
        assert_eq!(controller.advance(800.0), PlaybackEvent::Finished);
        assert_eq!(controller.current_frame(), 100.0);
        assert!(controller.is_finished());
        assert_eq!(controller.advance(100.0), PlaybackEvent::Finished);

        controller.set_current_frame(10.0);
        assert!(!controller.is_finished());
    }

    #[test]
    fn test_frame_loop_is_clamped_and_ordered() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        controller.set_frame_loop(500.0, -20.0);
        assert_eq!(controller.frame_loop(), (0.0, 100.0));
    }

    #[test]
    fn test_nodes_only_leaves_vertices() {
        let mesh = sliding_mesh();
        let options = PlaybackOptions {
            mode: AnimationMode::NodesOnly,
            ..PlaybackOptions::default()
        };
        let mut controller = AnimatedMeshController::with_options(Arc::clone(&mesh), options);
        let buffers = controller.get_mesh(100.0).to_vec();
        assert_eq!(buffers, mesh.buffers().to_vec());
        assert_eq!(controller.skinning_passes(), 0);
        let global = controller.joint_animated_global(0).unwrap();
        assert_eq!(global.w_axis.truncate(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_transition_blends_from_previous_pose() {
        let mut controller = AnimatedMeshController::new(sliding_mesh());
        controller.get_mesh(100.0);
        controller.set_transition(10.0);
        assert!(controller.is_transitioning());

        // Halfway through the fade, between x=10 and the sampled x=0
        controller.advance(50.0);
        controller.get_mesh(0.0);
        let x = controller.joint_animated_global(0).unwrap().w_axis.x;
        assert!((x - 5.0).abs() < 1e-4, "{x}");

        controller.advance(100.0);
        controller.get_mesh(0.0);
        assert!(!controller.is_transitioning());
    }

    #[test]
    fn test_instances_do_not_share_output() {
        let mesh = sliding_mesh();
        let mut a = AnimatedMeshController::new(Arc::clone(&mesh));
        let mut b = AnimatedMeshController::new(Arc::clone(&mesh));
        let pa = a.get_mesh(100.0)[0].vertices[0].position;
        let pb = b.get_mesh(0.0)[0].vertices[0].position;
        assert_ne!(pa, pb);
        assert_eq!(mesh.buffers()[0].vertices[0].position, Vec3::ZERO);
    }
}
