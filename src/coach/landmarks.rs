//! Body landmark numbering and per-frame landmark points.
//!
//! Models the 33-point human pose numbering used by BlazePose-style
//! detectors.  The detector itself is external; this module only names
//! the points and provides the explicit name → index mapping that the
//! configuration loader hands to the geometry evaluator.

use std::collections::HashMap;

use serde::Deserialize;

// ── Landmark numbering ─────────────────────────────────────

/// The 33 body landmarks, in detector output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyLandmark {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

/// Total number of landmarks per detected body.
pub const LANDMARK_COUNT: usize = 33;

impl BodyLandmark {
    /// Every landmark in index order.
    pub const ALL: [BodyLandmark; LANDMARK_COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    /// Convert landmark enum to frame index (0-32).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Canonical snake_case name used in exercise documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEyeInner => "left_eye_inner",
            Self::LeftEye => "left_eye",
            Self::LeftEyeOuter => "left_eye_outer",
            Self::RightEyeInner => "right_eye_inner",
            Self::RightEye => "right_eye",
            Self::RightEyeOuter => "right_eye_outer",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::MouthLeft => "mouth_left",
            Self::MouthRight => "mouth_right",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftPinky => "left_pinky",
            Self::RightPinky => "right_pinky",
            Self::LeftIndex => "left_index",
            Self::RightIndex => "right_index",
            Self::LeftThumb => "left_thumb",
            Self::RightThumb => "right_thumb",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
            Self::LeftHeel => "left_heel",
            Self::RightHeel => "right_heel",
            Self::LeftFootIndex => "left_foot_index",
            Self::RightFootIndex => "right_foot_index",
        }
    }
}

// ── Landmark point ─────────────────────────────────────────

/// One detected body point in normalized image coordinates (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    /// Relative depth; ignored by the angle math.
    #[serde(default)]
    pub z: Option<f32>,
    /// Likelihood the point is visible (0.0-1.0).  Missing counts as not visible.
    #[serde(default)]
    pub visibility: Option<f32>,
    /// Likelihood the point is inside the frame (0.0-1.0).
    #[serde(default)]
    pub presence: Option<f32>,
}

impl LandmarkPoint {
    /// A fully visible point at (x, y).
    pub fn visible(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: Some(1.0),
            presence: Some(1.0),
        }
    }

    /// Visibility with a missing field treated as zero.
    pub fn visibility_or_zero(&self) -> f32 {
        self.visibility.unwrap_or(0.0)
    }
}

/// All points of one detected body, indexed by `BodyLandmark`.
pub type LandmarkFrame = Vec<LandmarkPoint>;

// ── Name → index mapping ───────────────────────────────────

/// Explicit landmark name → frame index mapping.
///
/// Built once by the configuration loading layer and passed to the
/// geometry evaluator.  Lookups are case-insensitive and accept either
/// `left_elbow` or `LEFT_ELBOW` / `left-elbow` spellings.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkIndex {
    by_name: HashMap<String, usize>,
}

impl LandmarkIndex {
    /// An index with no names.
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    /// The standard 33-point body numbering.
    pub fn body33() -> Self {
        let mut index = Self::empty();
        for landmark in BodyLandmark::ALL {
            index.insert(landmark.as_str(), landmark.index());
        }
        index
    }

    /// Add or replace a name.
    pub fn insert(&mut self, name: &str, index: usize) {
        self.by_name.insert(normalize_name(name), index);
    }

    /// Resolve a landmark name to its frame index.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    /// Number of known names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for LandmarkIndex {
    fn default() -> Self {
        Self::body33()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

// ── Tests ──────────────────────────────────────────────────
