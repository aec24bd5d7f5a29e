//! Exercise configuration: joint definitions, poses, and the pose sequence.
//!
//! An `ExerciseDocument` is the raw deserialized JSON.  `validate` checks
//! every cross-reference against the injected `LandmarkIndex` and yields an
//! immutable `ExerciseConfig`; a session only ever sees validated configs.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::{debug, info};

use super::error::ConfigError;
use super::landmarks::LandmarkIndex;

// ── Document model ─────────────────────────────────────────

/// The three landmarks forming a joint.  `b` is the vertex.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JointLandmarks {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
}

/// A named joint, e.g. `left_elbow` = shoulder → elbow → wrist.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JointDefinition {
    pub landmarks: JointLandmarks,
}

/// Feedback spoken/displayed when a joint angle leaves its range.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CriterionFeedback {
    pub below_min: String,
    pub above_max: String,
}

/// Acceptable angle range for one joint within one pose.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JointCriterion {
    /// `[min, max]` in degrees.
    pub angle_range: [f64; 2],
    pub feedback: CriterionFeedback,
}

/// Outcome of comparing one measured angle against a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
    InRange,
    BelowMin,
    AboveMax,
}

impl JointCriterion {
    pub fn min(&self) -> f64 {
        self.angle_range[0]
    }

    pub fn max(&self) -> f64 {
        self.angle_range[1]
    }

    /// Compare `angle` against `[min - tolerance, max + tolerance]`.
    pub fn check(&self, angle: f64, tolerance_deg: f64) -> RangeCheck {
        let low = self.min() - tolerance_deg;
        let high = self.max() + tolerance_deg;
        if (low..=high).contains(&angle) {
            RangeCheck::InRange
        } else if angle > high {
            RangeCheck::AboveMax
        } else {
            // Below range, or NaN.
            RangeCheck::BelowMin
        }
    }

    /// Feedback text for an out-of-range check, `None` when in range.
    pub fn feedback_for(&self, check: RangeCheck) -> Option<&str> {
        match check {
            RangeCheck::InRange => None,
            RangeCheck::BelowMin => Some(&self.feedback.below_min),
            RangeCheck::AboveMax => Some(&self.feedback.above_max),
        }
    }
}

/// Ordered joint criteria of a pose, in document order.
pub type PoseCriteria = Vec<(String, JointCriterion)>;

/// One pose of the exercise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoseData {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default, deserialize_with = "ordered_criteria")]
    pub criteria: PoseCriteria,
}

impl PoseData {
    /// Text to announce when the pose is introduced.
    pub fn announcement(&self, pose_name: &str) -> String {
        match (&self.display_name, &self.description) {
            (_, Some(description)) if !description.is_empty() => description.clone(),
            (Some(display_name), _) => display_name.clone(),
            (None, _) => pose_name.replace('_', " "),
        }
    }
}

/// Raw exercise document as deserialized from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseDocument {
    pub joint_definitions: HashMap<String, JointDefinition>,
    pub poses: HashMap<String, PoseData>,
    pub sequence: Vec<String>,
}

impl ExerciseDocument {
    /// Parse a document from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Read and parse a document from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Self::from_json_str(&content)?;
        debug!(
            "Loaded exercise document {:?}: {} joint(s), {} pose(s), {} step(s)",
            path,
            doc.joint_definitions.len(),
            doc.poses.len(),
            doc.sequence.len(),
        );
        Ok(doc)
    }

    /// Check every reference and produce an immutable config.
    pub fn validate(self, landmarks: LandmarkIndex) -> Result<ExerciseConfig, ConfigError> {
        if self.sequence.is_empty() {
            return Err(ConfigError::EmptySequence);
        }

        for (position, pose) in self.sequence.iter().enumerate() {
            if !self.poses.contains_key(pose) {
                return Err(ConfigError::UnknownPose {
                    position,
                    pose: pose.clone(),
                });
            }
        }

        for (joint, def) in &self.joint_definitions {
            for name in [&def.landmarks.a, &def.landmarks.b, &def.landmarks.c] {
                if landmarks.resolve(name).is_none() {
                    return Err(ConfigError::UnknownLandmark {
                        joint: joint.clone(),
                        landmark: name.clone(),
                    });
                }
            }
        }

        for (pose_name, pose) in &self.poses {
            let mut seen = HashSet::new();
            for (joint, criterion) in &pose.criteria {
                if !self.joint_definitions.contains_key(joint) {
                    return Err(ConfigError::UnknownJoint {
                        pose: pose_name.clone(),
                        joint: joint.clone(),
                    });
                }
                if !seen.insert(joint.as_str()) {
                    return Err(ConfigError::DuplicateCriterion {
                        pose: pose_name.clone(),
                        joint: joint.clone(),
                    });
                }
                let (min, max) = (criterion.min(), criterion.max());
                if !(0.0..=180.0).contains(&min) || !(0.0..=180.0).contains(&max) || min > max {
                    return Err(ConfigError::InvalidAngleRange {
                        pose: pose_name.clone(),
                        joint: joint.clone(),
                        min,
                        max,
                    });
                }
            }
        }

        info!(
            "Exercise config validated: {} pose(s) in sequence",
            self.sequence.len()
        );
        Ok(ExerciseConfig {
            joint_definitions: self.joint_definitions,
            poses: self.poses,
            sequence: self.sequence,
            landmarks,
        })
    }
}

// ── Validated config ───────────────────────────────────────

/// A validated, read-only exercise configuration.
#[derive(Debug, Clone)]
pub struct ExerciseConfig {
    joint_definitions: HashMap<String, JointDefinition>,
    poses: HashMap<String, PoseData>,
    sequence: Vec<String>,
    landmarks: LandmarkIndex,
}

impl ExerciseConfig {
    /// Parse and validate in one step against the standard body numbering.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        ExerciseDocument::from_json_str(s)?.validate(LandmarkIndex::body33())
    }

    pub fn joint_definitions(&self) -> &HashMap<String, JointDefinition> {
        &self.joint_definitions
    }

    pub fn landmarks(&self) -> &LandmarkIndex {
        &self.landmarks
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    pub fn pose(&self, name: &str) -> Option<&PoseData> {
        self.poses.get(name)
    }

    /// Pose name and data for a sequence position.
    pub fn step(&self, index: usize) -> Option<(&str, &PoseData)> {
        let name = self.sequence.get(index)?;
        self.poses.get(name).map(|pose| (name.as_str(), pose))
    }
}

// ── Session timings ────────────────────────────────────────

/// Session-wide durations and strictness.  Not tunable per pose.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimings {
    /// Time a pose must be held all-correct before advancing (ms).
    pub hold_ms: f64,
    /// How long the description is shown before the image (ms).
    pub description_ms: f64,
    /// How long the demonstration image is shown before correction (ms).
    pub image_ms: f64,
    /// Degrees added to both ends of every criterion range.
    pub tolerance_deg: f64,
    /// Maximum feedback lines surfaced per frame.
    pub max_feedback: usize,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            hold_ms: 3000.0,
            description_ms: 5000.0,
            image_ms: 5000.0,
            tolerance_deg: 10.0,
            max_feedback: 2,
        }
    }
}

// ── Ordered criteria ───────────────────────────────────────

/// Deserialize a JSON object into `(key, value)` pairs in document order.
fn ordered_criteria<'de, D>(deserializer: D) -> Result<PoseCriteria, D::Error>
where
    D: Deserializer<'de>,
{
    struct CriteriaVisitor;

    impl<'de> Visitor<'de> for CriteriaVisitor {
        type Value = PoseCriteria;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of joint names to criteria")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((joint, criterion)) = map.next_entry::<String, JointCriterion>()? {
                entries.push((joint, criterion));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(CriteriaVisitor)
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
pub(crate) const SAMPLE_DOCUMENT: &str = r#"{
    "joint_definitions": {
        "left_elbow": { "landmarks": { "A": "left_shoulder", "B": "left_elbow", "C": "left_wrist" } },
        "right_elbow": { "landmarks": { "A": "right_shoulder", "B": "right_elbow", "C": "right_wrist" } },
        "left_knee": { "landmarks": { "A": "left_hip", "B": "left_knee", "C": "left_ankle" } }
    },
    "poses": {
        "arms_straight": {
            "display_name": "Arms Straight",
            "description": "Stretch both arms out straight.",
            "image_path": "img/arms_straight.png",
            "criteria": {
                "right_elbow": {
                    "angle_range": [160, 180],
                    "feedback": { "below_min": "Straighten your right arm", "above_max": "Relax your right arm" }
                },
                "left_elbow": {
                    "angle_range": [160, 180],
                    "feedback": { "below_min": "Straighten your left arm", "above_max": "Relax your left arm" }
                }
            }
        },
        "knee_bend": {
            "display_name": "Knee Bend",
            "criteria": {
                "left_knee": {
                    "angle_range": [80, 100],
                    "feedback": { "below_min": "Rise up a little", "above_max": "Bend your knee more" }
                }
            }
        }
    },
    "sequence": ["arms_straight", "knee_bend"]
}"#;

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_doc() -> ExerciseDocument {
        ExerciseDocument::from_json_str(SAMPLE_DOCUMENT).unwrap()
    }

    #[test]
    fn test_sample_validates() {
        let config = sample_doc().validate(LandmarkIndex::body33()).unwrap();
        assert_eq!(config.sequence(), ["arms_straight", "knee_bend"]);
        let (name, pose) = config.step(1).unwrap();
        assert_eq!(name, "knee_bend");
        assert_eq!(pose.display_name.as_deref(), Some("Knee Bend"));
        assert!(config.step(2).is_none());
    }

    #[test]
    fn test_criteria_keep_document_order() {
        let doc = sample_doc();
        let pose = &doc.poses["arms_straight"];
        let names: Vec<&str> = pose.criteria.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["right_elbow", "left_elbow"]);
    }

    #[test]
    fn test_undefined_joint_is_config_error() {
        let mut doc = sample_doc();
        let criterion = doc.poses["knee_bend"].criteria[0].1.clone();
        doc.poses
            .get_mut("knee_bend")
            .unwrap()
            .criteria
            .push(("right_hip".to_string(), criterion));
        let err = doc.validate(LandmarkIndex::body33()).unwrap_err();
        assert!(
            matches!(&err, ConfigError::UnknownJoint { pose, joint } if pose == "knee_bend" && joint == "right_hip"),
            "got {err:?}",
        );
    }

    #[test]
    fn test_unknown_pose_in_sequence() {
        let mut doc = sample_doc();
        doc.sequence.push("cartwheel".to_string());
        let err = doc.validate(LandmarkIndex::body33()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPose { position: 2, .. }));
    }

    #[test]
    fn test_empty_sequence() {
        let mut doc = sample_doc();
        doc.sequence.clear();
        assert!(matches!(
            doc.validate(LandmarkIndex::body33()),
            Err(ConfigError::EmptySequence)
        ));
    }

    #[test]
    fn test_unknown_landmark() {
        let mut doc = sample_doc();
        doc.joint_definitions
            .get_mut("left_knee")
            .unwrap()
            .landmarks
            .c = "left_toe".to_string();
        let err = doc.validate(LandmarkIndex::body33()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLandmark { ref landmark, .. } if landmark == "left_toe"));
    }

    #[test]
    fn test_invalid_angle_ranges() {
        for range in [[100.0, 80.0], [-5.0, 90.0], [10.0, 190.0]] {
            let mut doc = sample_doc();
            doc.poses.get_mut("knee_bend").unwrap().criteria[0].1.angle_range = range;
            assert!(
                matches!(
                    doc.validate(LandmarkIndex::body33()),
                    Err(ConfigError::InvalidAngleRange { .. })
                ),
                "range {range:?} should be rejected",
            );
        }
    }

    #[test]
    fn test_duplicate_criterion() {
        let json = SAMPLE_DOCUMENT.replace("\"left_elbow\": {\n                    \"angle_range\"", "\"right_elbow\": {\n                    \"angle_range\"");
        let err = ExerciseConfig::from_json_str(&json).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCriterion { .. }), "got {err:?}");
    }

    #[test]
    fn test_malformed_json() {
        let err = ExerciseConfig::from_json_str("{ \"poses\": ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_DOCUMENT.as_bytes()).unwrap();
        let doc = ExerciseDocument::load(file.path()).unwrap();
        assert_eq!(doc.sequence.len(), 2);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            ExerciseDocument::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_criterion_tolerance_bounds() {
        let criterion = JointCriterion {
            angle_range: [160.0, 180.0],
            feedback: CriterionFeedback {
                below_min: "straighten".to_string(),
                above_max: "relax".to_string(),
            },
        };
        assert_eq!(criterion.check(145.0, 20.0), RangeCheck::InRange);
        assert_eq!(criterion.check(140.0, 20.0), RangeCheck::InRange);
        assert_eq!(criterion.check(139.9, 20.0), RangeCheck::BelowMin);
        assert_eq!(criterion.feedback_for(RangeCheck::BelowMin), Some("straighten"));
        assert_eq!(criterion.check(170.0, 0.0), RangeCheck::InRange);
        assert_eq!(criterion.check(181.0, 0.0), RangeCheck::AboveMax);
        assert_eq!(criterion.feedback_for(RangeCheck::AboveMax), Some("relax"));
        assert_eq!(criterion.feedback_for(RangeCheck::InRange), None);
        assert_ne!(criterion.check(f64::NAN, 20.0), RangeCheck::InRange);
    }

    #[test]
    fn test_pose_announcement_fallbacks() {
        let doc = sample_doc();
        assert_eq!(
            doc.poses["arms_straight"].announcement("arms_straight"),
            "Stretch both arms out straight."
        );
        assert_eq!(doc.poses["knee_bend"].announcement("knee_bend"), "Knee Bend");
        let bare = PoseData {
            display_name: None,
            description: None,
            image_path: None,
            criteria: Vec::new(),
        };
        assert_eq!(bare.announcement("side_plank"), "side plank");
    }

    #[test]
    fn test_default_timings() {
        let timings = SessionTimings::default();
        assert_eq!(timings.hold_ms, 3000.0);
        assert_eq!(timings.max_feedback, 2);
    }
}
