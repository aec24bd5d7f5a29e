//! Error types for exercise configuration and refused session operations.
//!
//! Perception gaps (no body, hidden joints) are not errors; they surface
//! as per-joint feedback from the geometry evaluator.

use std::path::PathBuf;

use thiserror::Error;

use super::session::Phase;

/// A malformed or inconsistent exercise document.  Detected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read exercise document {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed exercise document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("exercise sequence is empty")]
    EmptySequence,

    #[error("sequence step {position} names unknown pose '{pose}'")]
    UnknownPose { position: usize, pose: String },

    #[error("pose '{pose}' references undefined joint '{joint}'")]
    UnknownJoint { pose: String, joint: String },

    #[error("pose '{pose}' lists joint '{joint}' more than once")]
    DuplicateCriterion { pose: String, joint: String },

    #[error("joint '{joint}' uses unknown landmark '{landmark}'")]
    UnknownLandmark { joint: String, landmark: String },

    #[error("pose '{pose}' joint '{joint}' has invalid angle range [{min}, {max}]")]
    InvalidAngleRange {
        pose: String,
        joint: String,
        min: f64,
        max: f64,
    },
}

/// A session operation that was refused.  Session state is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("pose engine is not ready")]
    EngineNotReady,

    #[error("cannot {action} while in phase {}", .phase.as_str())]
    InvalidPhase { action: &'static str, phase: Phase },
}
