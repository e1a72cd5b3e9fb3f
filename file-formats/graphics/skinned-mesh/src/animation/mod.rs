//! Keyframe animation
//!
//! This module provides the time-varying half of the skeletal system:
//! - Keyframe tracks with clamping, linear and constant interpolation
//! - Quaternion slerp that is exact at segment boundaries
//! - Per-joint sampling into translation × rotation × scale local matrices
//! - Per-instance poses composed through the joint hierarchy
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use skinned_mesh::animation::{InterpolationMode, Key, KeyframeTrack};
//!
//! let track = KeyframeTrack::from_keys(vec![
//!     Key::new(0.0, Vec3::ZERO),
//!     Key::new(10.0, Vec3::new(10.0, 20.0, 30.0)),
//! ]);
//! assert_eq!(
//!     track.sample(5.0, InterpolationMode::Linear),
//!     Some(Vec3::new(5.0, 10.0, 15.0))
//! );
//! ```

mod keyframe;
mod pose;
mod sampler;

pub use keyframe::{
    InterpolationMode, Key, KeyframeTrack, Lerp, PositionKey, RotationKey, ScaleKey, slerp,
};
pub use pose::Pose;
pub use sampler::{ChannelHints, KeyframeSampler};
