//! Keyframe tracks for joint position, rotation and scale channels

use glam::{Quat, Vec3};

/// Trait for values that can be blended between two keyframes
pub trait Lerp: Copy + PartialEq {
    /// Interpolate between `self` (t = 0) and `other` (t = 1)
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        *self + (*other - *self) * t
    }
}

impl Lerp for Quat {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        slerp(*self, *other, t)
    }
}

/// Spherical linear interpolation that is exact at both ends
///
/// `t <= 0` returns `from` unchanged and `t >= 1` returns `to` unchanged.
/// Nearly parallel rotations fall back to a normalized linear blend.
pub fn slerp(from: Quat, to: Quat, t: f32) -> Quat {
    if t <= 0.0 {
        return from;
    }
    if t >= 1.0 {
        return to;
    }

    let mut dot = from.dot(to);

    // Take the shorter arc
    let to = if dot < 0.0 {
        dot = -dot;
        -to
    } else {
        to
    };

    if dot > 0.9995 {
        return (from + (to - from) * t).normalize();
    }

    let theta_0 = dot.acos();
    let theta = theta_0 * t;
    let sin_theta = theta.sin();
    let sin_theta_0 = theta_0.sin();

    let s0 = theta.cos() - dot * sin_theta / sin_theta_0;
    let s1 = sin_theta / sin_theta_0;

    from * s0 + to * s1
}

/// One keyframe: a value at a frame position
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Key<T> {
    /// Frame in the mesh's internal frame unit
    pub frame: f32,
    pub value: T,
}

impl<T> Key<T> {
    pub const fn new(frame: f32, value: T) -> Self {
        Self { frame, value }
    }
}

pub type PositionKey = Key<Vec3>;
pub type ScaleKey = Key<Vec3>;
pub type RotationKey = Key<Quat>;

/// How values between two keyframes are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterpolationMode {
    /// Hold the earlier key's value until the next key is reached
    Constant,
    /// Linear blend for vectors, slerp for rotations
    #[default]
    Linear,
}

/// Time-ordered keyframes for one channel of one joint
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyframeTrack<T> {
    keys: Vec<Key<T>>,
}

impl<T> Default for KeyframeTrack<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T: Lerp> KeyframeTrack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a track, stable-sorting the keys by frame
    pub fn from_keys(mut keys: Vec<Key<T>>) -> Self {
        keys.sort_by(|a, b| a.frame.total_cmp(&b.frame));
        Self { keys }
    }

    /// Append a key, keeping keys ordered by frame
    ///
    /// Keys sharing a frame keep their insertion order.
    pub fn push(&mut self, frame: f32, value: T) {
        let index = self.keys.partition_point(|k| k.frame <= frame);
        self.keys.insert(index, Key::new(frame, value));
    }

    pub fn keys(&self) -> &[Key<T>] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn first(&self) -> Option<&Key<T>> {
        self.keys.first()
    }

    pub fn last(&self) -> Option<&Key<T>> {
        self.keys.last()
    }

    /// Frame of the last key, if any
    pub fn end_frame(&self) -> Option<f32> {
        self.keys.last().map(|k| k.frame)
    }

    /// Remove redundant keys, returning how many were dropped
    ///
    /// The middle of three consecutive keys with equal values carries no
    /// information. A key whose frame does not advance past the previous
    /// kept key would produce a zero-length segment.
    pub fn optimize(&mut self) -> usize {
        let before = self.keys.len();

        let mut i = 0;
        while i + 2 < self.keys.len() {
            if self.keys[i].value == self.keys[i + 1].value
                && self.keys[i + 1].value == self.keys[i + 2].value
            {
                self.keys.remove(i + 1);
            } else {
                i += 1;
            }
        }

        let mut i = 0;
        while i + 1 < self.keys.len() {
            if self.keys[i].frame >= self.keys[i + 1].frame {
                self.keys.remove(i + 1);
            } else {
                i += 1;
            }
        }

        before - self.keys.len()
    }

    /// Extend the track so it covers `[start, end]`
    ///
    /// The first key is duplicated at `start` and the last at `end` when the
    /// track does not already reach them.
    pub fn pad(&mut self, start: f32, end: f32) {
        if let Some(first) = self.keys.first().copied()
            && first.frame > start
        {
            self.keys.insert(0, Key::new(start, first.value));
        }
        if let Some(last) = self.keys.last().copied()
            && last.frame < end
        {
            self.keys.push(Key::new(end, last.value));
        }
    }

    /// Index of the last key at or before `frame`
    ///
    /// Returns 0 for frames before the first key and `None` for an empty track.
    pub fn find_key_index(&self, frame: f32) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        let upper = self.keys.partition_point(|k| k.frame <= frame);
        Some(upper.saturating_sub(1))
    }

    /// Like [`find_key_index`](Self::find_key_index), starting from a previous result
    ///
    /// Sequential playback usually lands on the same or the next segment, so
    /// `hint` is checked first before falling back to a binary search. The
    /// hint is updated to the returned index.
    pub fn find_key_index_hinted(&self, frame: f32, hint: &mut usize) -> Option<usize> {
        let len = self.keys.len();
        if len == 0 {
            return None;
        }

        for candidate in [*hint, *hint + 1] {
            if candidate < len
                && self.keys[candidate].frame <= frame
                && (candidate + 1 == len || frame < self.keys[candidate + 1].frame)
            {
                *hint = candidate;
                return Some(candidate);
            }
        }

        let index = self.find_key_index(frame)?;
        *hint = index;
        Some(index)
    }

    /// Sample the track at `frame`
    ///
    /// Frames outside the keyed range clamp to the first or last value.
    /// Returns `None` only for an empty track.
    pub fn sample(&self, frame: f32, mode: InterpolationMode) -> Option<T> {
        let mut hint = 0;
        self.sample_hinted(frame, mode, &mut hint)
    }

    /// Sample using and updating a segment hint
    pub fn sample_hinted(&self, frame: f32, mode: InterpolationMode, hint: &mut usize) -> Option<T> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;

        if frame <= first.frame {
            return Some(first.value);
        }
        if frame >= last.frame {
            return Some(last.value);
        }

        let index = self.find_key_index_hinted(frame, hint)?;
        let lo = &self.keys[index];
        let Some(hi) = self.keys.get(index + 1) else {
            return Some(lo.value);
        };

        if mode == InterpolationMode::Constant || hi.frame <= lo.frame || lo.value == hi.value {
            return Some(lo.value);
        }

        let t = (frame - lo.frame) / (hi.frame - lo.frame);
        Some(lo.value.lerp(&hi.value, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_track() -> KeyframeTrack<Vec3> {
        KeyframeTrack::from_keys(vec![
            Key::new(0.0, Vec3::ZERO),
            Key::new(10.0, Vec3::new(10.0, 20.0, 30.0)),
        ])
    }

    #[test]
    fn test_linear_midpoint() {
        let v = position_track()
            .sample(5.0, InterpolationMode::Linear)
            .unwrap();
        assert_eq!(v, Vec3::new(5.0, 10.0, 15.0));
    }

    #[test]
    fn test_clamp_outside_range() {
        let track = KeyframeTrack::from_keys(vec![
            Key::new(2.0, Vec3::new(1.0, 2.0, 3.0)),
            Key::new(4.0, Vec3::new(4.0, 5.0, 6.0)),
            Key::new(8.0, Vec3::new(7.0, 8.0, 9.0)),
        ]);
        for frame in [-100.0, 0.0, 1.999, 2.0] {
            assert_eq!(
                track.sample(frame, InterpolationMode::Linear),
                Some(Vec3::new(1.0, 2.0, 3.0))
            );
        }
        for frame in [8.0, 8.001, 1.0e6] {
            assert_eq!(
                track.sample(frame, InterpolationMode::Linear),
                Some(Vec3::new(7.0, 8.0, 9.0))
            );
        }
    }

    #[test]
    fn test_empty_track_has_no_value() {
        let track: KeyframeTrack<Vec3> = KeyframeTrack::new();
        assert_eq!(track.sample(1.0, InterpolationMode::Linear), None);
        assert_eq!(track.find_key_index(1.0), None);
    }

    #[test]
    fn test_constant_mode_holds_previous_key() {
        let track = position_track();
        assert_eq!(
            track.sample(9.9, InterpolationMode::Constant),
            Some(Vec3::ZERO)
        );
        assert_eq!(
            track.sample(10.0, InterpolationMode::Constant),
            Some(Vec3::new(10.0, 20.0, 30.0))
        );
    }

    #[test]
    fn test_duplicate_frames_do_not_divide_by_zero() {
        let track = KeyframeTrack::from_keys(vec![
            Key::new(0.0, Vec3::ZERO),
            Key::new(5.0, Vec3::ONE),
            Key::new(5.0, Vec3::splat(2.0)),
            Key::new(10.0, Vec3::splat(3.0)),
        ]);
        let v = track.sample(5.0, InterpolationMode::Linear).unwrap();
        assert!(v.is_finite());
        assert_eq!(v, Vec3::splat(2.0));
    }

    #[test]
    fn test_rotation_endpoints_are_exact() {
        let lo = Quat::from_rotation_y(0.3);
        let hi = Quat::from_rotation_x(1.2);
        let track = KeyframeTrack::from_keys(vec![Key::new(0.0, lo), Key::new(10.0, hi)]);

        assert_eq!(track.sample(0.0, InterpolationMode::Linear), Some(lo));
        assert_eq!(track.sample(10.0, InterpolationMode::Linear), Some(hi));
        assert_eq!(slerp(lo, hi, 0.0), lo);
        assert_eq!(slerp(lo, hi, 1.0), hi);
    }

    #[test]
    fn test_slerp_halfway_angle() {
        let lo = Quat::IDENTITY;
        let hi = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let mid = slerp(lo, hi, 0.5);
        let expected = Quat::from_rotation_z(std::f32::consts::FRAC_PI_4);
        assert!(mid.abs_diff_eq(expected, 1e-5));
        assert!((mid.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_slerp_takes_short_arc() {
        let lo = Quat::from_rotation_z(0.1);
        let hi = -Quat::from_rotation_z(0.3);
        let mid = slerp(lo, hi, 0.5);
        let expected = Quat::from_rotation_z(0.2);
        assert!(mid.abs_diff_eq(expected, 1e-4) || mid.abs_diff_eq(-expected, 1e-4));
    }

    #[test]
    fn test_optimize_drops_redundant_keys() {
        let mut track = KeyframeTrack::from_keys(vec![
            Key::new(0.0, Vec3::ONE),
            Key::new(1.0, Vec3::ONE),
            Key::new(2.0, Vec3::ONE),
            Key::new(3.0, Vec3::ONE),
            Key::new(3.0, Vec3::ZERO),
            Key::new(4.0, Vec3::ZERO),
        ]);
        let removed = track.optimize();
        assert_eq!(removed, 3);
        let frames: Vec<f32> = track.keys().iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![0.0, 3.0, 4.0]);
        assert_eq!(track.keys()[1].value, Vec3::ONE);
    }

    #[test]
    fn test_pad_to_range() {
        let mut track = KeyframeTrack::from_keys(vec![
            Key::new(100.0, Vec3::X),
            Key::new(200.0, Vec3::Y),
        ]);
        track.pad(0.0, 500.0);
        let frames: Vec<f32> = track.keys().iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![0.0, 100.0, 200.0, 500.0]);
        assert_eq!(track.keys()[0].value, Vec3::X);
        assert_eq!(track.keys()[3].value, Vec3::Y);
    }

    #[test]
    fn test_hinted_search_matches_binary_search() {
        let track = KeyframeTrack::from_keys(
            (0..20).map(|i| Key::new(i as f32 * 3.0, i as f32)).collect(),
        );
        let mut hint = 0;
        let mut frame = -1.0;
        while frame < 70.0 {
            assert_eq!(
                track.find_key_index_hinted(frame, &mut hint),
                track.find_key_index(frame)
            );
            frame += 0.7;
        }
        // Jumping backwards still works
        assert_eq!(track.find_key_index_hinted(4.0, &mut hint), Some(1));
    }

    #[test]
    fn test_push_keeps_order() {
        let mut track = KeyframeTrack::new();
        track.push(5.0, 1.0f32);
        track.push(1.0, 2.0);
        track.push(5.0, 3.0);
        let values: Vec<f32> = track.keys().iter().map(|k| k.value).collect();
        assert_eq!(values, vec![2.0, 1.0, 3.0]);
    }
}
