//! Coaching core — pose evaluation and the guided exercise session.
//!
//! Provides:
//! - `landmarks`: body landmark enumeration and name → index resolution
//! - `config`: exercise document model, validation, and session timings
//! - `geometry`: joint-angle math and per-frame pose evaluation
//! - `session`: phase state machine with hold tracking
//! - `timer`: single-slot cancellable phase-advance scheduling
//! - `announce`: ordered, silenceable speech queue
//!
//! Nothing here touches a camera, a clock, or a speaker.  The host feeds
//! frames, timestamps, and timer fires in, and carries the returned
//! `SessionEffect`s out.

pub mod announce;
pub mod config;
pub mod error;
pub mod geometry;
pub mod landmarks;
pub mod session;
pub mod timer;

pub use announce::{AnnouncementQueue, SpeechOutput};
pub use config::{ExerciseConfig, ExerciseDocument, SessionTimings};
pub use error::{ConfigError, SessionError};
pub use geometry::{evaluate_pose, AngleDetail, FrameSize, PoseEvaluation};
pub use landmarks::{BodyLandmark, LandmarkFrame, LandmarkIndex, LandmarkPoint};
pub use session::{CoachSession, InitOutcome, Phase, SessionEffect, SessionSnapshot};
pub use timer::TimerToken;
