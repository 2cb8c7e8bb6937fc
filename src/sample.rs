//! Per-frame input samples and channel flattening.
//!
//! The upstream tracker delivers a structured frame (head transform, per-eye
//! orientation, named blend-shape weights). Rules, on the other hand, address
//! everything by flat channel name. This module owns that flattening:
//!
//! ```text
//! RawTrackingFrame ── flatten ──▶ InputSample { "HeadPosX" -> 0.12, ... }
//! ```
//!
//! Channel naming is fixed: `HeadPosX..Z`, `HeadRotX..Z`, `EyeLeftX..Z`,
//! `EyeRightX..Z`, plus one channel per blend shape under its own name.
//! The wire format that produces a `RawTrackingFrame` is out of scope here.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fixed (non-blend-shape) channel names every frame provides.
pub static BASE_CHANNELS: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names = Vec::with_capacity(12);
    for prefix in ["HeadPos", "HeadRot", "EyeLeft", "EyeRight"] {
        for axis in ["X", "Y", "Z"] {
            names.push(format!("{prefix}{axis}"));
        }
    }
    names
});

/// A 3-component vector as delivered by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }
}

/// One structured tracking frame from the upstream source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTrackingFrame {
    /// Whether the tracker considers the subject present this frame.
    pub detected: bool,
    pub head_position: Vec3,
    pub head_rotation: Vec3,
    pub eye_left: Vec3,
    pub eye_right: Vec3,
    /// Blend-shape weights, one entry per named shape (e.g. `"MouthSmile"`).
    pub blend_shapes: Vec<(String, f64)>,
}

/// The flattened per-frame input: channel name → value, plus the detected flag.
///
/// Constructed fresh each frame; the engine keeps no state between samples.
#[derive(Debug, Clone)]
pub struct InputSample {
    detected: bool,
    channels: HashMap<String, f64>,
}

impl InputSample {
    /// Build a sample directly from a channel map. Mostly useful for tests and
    /// callers that already have flat data.
    pub fn new(detected: bool, channels: HashMap<String, f64>) -> Self {
        InputSample { detected, channels }
    }

    /// Flatten a structured frame into named channels.
    pub fn from_frame(frame: &RawTrackingFrame) -> Self {
        let mut channels = HashMap::with_capacity(12 + frame.blend_shapes.len());
        push_axes(&mut channels, "HeadPos", frame.head_position);
        push_axes(&mut channels, "HeadRot", frame.head_rotation);
        push_axes(&mut channels, "EyeLeft", frame.eye_left);
        push_axes(&mut channels, "EyeRight", frame.eye_right);
        for (name, weight) in &frame.blend_shapes {
            // First occurrence wins if the tracker repeats a shape name,
            // matching the resolver's first-writer-wins discipline.
            channels.entry(name.clone()).or_insert(*weight);
        }
        InputSample { detected: frame.detected, channels }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn channels(&self) -> &HashMap<String, f64> {
        &self.channels
    }
}

fn push_axes(channels: &mut HashMap<String, f64>, prefix: &str, v: Vec3) {
    channels.insert(format!("{prefix}X"), v.x);
    channels.insert(format!("{prefix}Y"), v.y);
    channels.insert(format!("{prefix}Z"), v.z);
}
