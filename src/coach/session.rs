//! Guided exercise session state machine.
//!
//! Sequences each pose through description → demonstration image → live
//! correction, accumulates hold time while every joint is within range,
//! and advances to the next pose (or completion) once the hold duration is
//! reached.  Lifecycle phases (loading, initializing, error) are set by the
//! host; the session never leaves them on its own.
//!
//! All operations take `&mut self` and return the side effects the host
//! must carry out (speech, timer scheduling, notices).  The host drives the
//! session from a single thread, so frame evaluation and timer-driven
//! advances never interleave.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::{ExerciseConfig, SessionTimings};
use super::error::SessionError;
use super::geometry::{evaluate_pose, AngleDetail, FrameSize};
use super::landmarks::LandmarkPoint;
use super::timer::{PhaseTimer, TimerToken};

/// Feedback shown when no body is detected in the frame.
pub const FEEDBACK_NO_BODY: &str = "Cannot see you clearly. Please step into view.";
/// Spoken when live correction starts.
pub const SPEECH_HOLD_POSE: &str = "Now hold the pose.";
/// Spoken when a pose has been held long enough.
pub const SPEECH_AFFIRMATION: &str = "Well done!";
/// Spoken when the last pose of the sequence is complete.
pub const SPEECH_FINISHED: &str = "You have finished the exercise. Great work!";

// ── Phase ───────────────────────────────────────────────────

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for an exercise configuration (host-driven).
    LoadingConfig,
    /// Configuration missing or invalid (host-driven).
    ConfigError,
    /// Waiting for the pose detector to initialize (host-driven).
    InitializingPose,
    /// Pose detector failed to initialize (host-driven).
    PoseInitError,
    /// Camera could not be acquired (host-driven).
    CameraError,
    /// Ready to start the next pose.
    Idle,
    /// Showing the pose description.
    Description,
    /// Showing the demonstration image.
    Image,
    /// Live correction against the camera feed.
    Correction,
    /// Every pose in the sequence is done.
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadingConfig => "loading-config",
            Self::ConfigError => "config-error",
            Self::InitializingPose => "initializing-pose",
            Self::PoseInitError => "pose-init-error",
            Self::CameraError => "camera-error",
            Self::Idle => "idle",
            Self::Description => "description",
            Self::Image => "image",
            Self::Correction => "correction",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "loading-config" => Some(Self::LoadingConfig),
            "config-error" => Some(Self::ConfigError),
            "initializing-pose" => Some(Self::InitializingPose),
            "pose-init-error" => Some(Self::PoseInitError),
            "camera-error" => Some(Self::CameraError),
            "idle" => Some(Self::Idle),
            "description" => Some(Self::Description),
            "image" => Some(Self::Image),
            "correction" => Some(Self::Correction),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Phases set by the host, outside the session's own transitions.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::LoadingConfig
                | Self::ConfigError
                | Self::InitializingPose
                | Self::PoseInitError
                | Self::CameraError
        )
    }

    /// Hard-failure phases; entering one silences speech.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ConfigError | Self::PoseInitError | Self::CameraError)
    }
}

// ── Host interface ─────────────────────────────────────────

/// Result of the host's camera + pose engine initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Ready,
    CameraFault,
    EngineFault,
}

/// Side effects the host must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Queue `text` for speech.
    Speak(String),
    /// Discard all queued speech and stop talking.
    StopAllSpeech,
    /// Fire `on_timer(token)` after `after_ms`.
    ScheduleTimer { token: TimerToken, after_ms: f64 },
    /// A previously scheduled timer is no longer wanted.
    CancelTimer { token: TimerToken },
    PhaseChanged { from: Phase, to: Phase },
    CameraFailed,
    PoseInitFailed,
}

// ── State ──────────────────────────────────────────────────

/// Core session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    /// Sequence position of the active pose; `None` before the first pose.
    pub pose_index: Option<usize>,
    /// Timestamp (ms) at which the current all-correct streak began.
    pub hold_start_ms: Option<f64>,
    /// Fraction of the hold duration achieved (0.0-1.0).
    pub hold_progress: f64,
}

impl SessionState {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            pose_index: None,
            hold_start_ms: None,
            hold_progress: 0.0,
        }
    }
}

/// Display fields of the active pose.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseDisplay {
    pub pose_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub image_path: Option<String>,
}

/// Everything the host needs to render the current tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub pose: Option<PoseDisplay>,
    pub angle_details: Vec<AngleDetail>,
    /// At most `SessionTimings::max_feedback` lines.
    pub feedback: Vec<String>,
    pub hold_progress: f64,
}

/// The exercise coaching session.
pub struct CoachSession {
    /// Session-wide durations and tolerance.
    pub timings: SessionTimings,
    config: Option<Arc<ExerciseConfig>>,
    engine_ready: bool,
    state: SessionState,
    timer: PhaseTimer,
    pose: Option<PoseDisplay>,
    angle_details: Vec<AngleDetail>,
    feedback: Vec<String>,
}

impl CoachSession {
    /// Create a session waiting for its configuration.
    pub fn new(timings: SessionTimings) -> Self {
        info!(
            "Coach session created (hold {:.0}ms, tolerance {:.1}°)",
            timings.hold_ms, timings.tolerance_deg
        );
        Self {
            timings,
            config: None,
            engine_ready: false,
            state: SessionState::new(Phase::LoadingConfig),
            timer: PhaseTimer::new(),
            pose: None,
            angle_details: Vec::new(),
            feedback: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> Option<&ExerciseConfig> {
        self.config.as_deref()
    }

    pub fn is_engine_ready(&self) -> bool {
        self.engine_ready
    }

    // ── Host-driven lifecycle ──────────────────────────────

    /// Install a validated configuration, replacing all working state.
    pub fn load_config(&mut self, config: impl Into<Arc<ExerciseConfig>>) -> Vec<SessionEffect> {
        let config = config.into();
        info!("Exercise loaded: {} pose(s)", config.sequence().len());
        self.config = Some(config);

        let mut effects = Vec::new();
        self.clear_working_state(&mut effects);
        if !matches!(self.state.phase, Phase::PoseInitError | Phase::CameraError) {
            let next = self.waiting_phase();
            self.set_phase(next, &mut effects);
        }
        effects
    }

    /// Apply the outcome of camera + pose engine initialization.
    pub fn handle_init(&mut self, outcome: InitOutcome) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        match outcome {
            InitOutcome::Ready => {
                self.engine_ready = true;
                info!("Pose engine ready");
                if matches!(self.state.phase, Phase::InitializingPose | Phase::LoadingConfig) {
                    let next = self.waiting_phase();
                    self.set_phase(next, &mut effects);
                }
            }
            InitOutcome::CameraFault => {
                error!("Camera initialization failed");
                self.enter_lifecycle(Phase::CameraError, &mut effects);
                effects.push(SessionEffect::CameraFailed);
            }
            InitOutcome::EngineFault => {
                error!("Pose engine initialization failed");
                self.engine_ready = false;
                self.enter_lifecycle(Phase::PoseInitError, &mut effects);
                effects.push(SessionEffect::PoseInitFailed);
            }
        }
        effects
    }

    /// Force a lifecycle phase.  Cancels any pending phase timer; error
    /// phases also silence speech.
    pub fn force_phase(&mut self, phase: Phase) -> Result<Vec<SessionEffect>, SessionError> {
        if !phase.is_lifecycle() {
            warn!("Refusing to force non-lifecycle phase {}", phase.as_str());
            return Err(SessionError::InvalidPhase {
                action: "force",
                phase,
            });
        }
        let mut effects = Vec::new();
        self.enter_lifecycle(phase, &mut effects);
        Ok(effects)
    }

    /// Return to "before the first pose", clearing all derived state.
    ///
    /// Lands in `Idle`, or in the waiting phase if the configuration or
    /// pose engine is not ready.  Calling it twice is the same as once.
    pub fn reset(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        self.clear_working_state(&mut effects);
        let next = self.waiting_phase();
        self.set_phase(next, &mut effects);
        debug!("Session reset to {}", next.as_str());
        effects
    }

    // ── Session-driven transitions ─────────────────────────

    /// Begin the next pose from `Idle`.
    pub fn start(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        let mut effects = Vec::new();
        if self.config.is_none() {
            error!("Cannot start: no exercise configuration loaded");
            self.enter_lifecycle(Phase::ConfigError, &mut effects);
            return Ok(effects);
        }
        if !self.engine_ready {
            warn!("Start requested before the pose engine is ready, ignoring");
            return Err(SessionError::EngineNotReady);
        }
        if self.state.phase != Phase::Idle {
            warn!("Start requested in phase {}, ignoring", self.state.phase.as_str());
            return Err(SessionError::InvalidPhase {
                action: "start",
                phase: self.state.phase,
            });
        }
        self.advance_pose(&mut effects);
        Ok(effects)
    }

    /// Handle a fired phase timer.  Stale or superseded tokens are no-ops.
    pub fn on_timer(&mut self, token: TimerToken) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        let Some(advance) = self.timer.fire(token, self.state.phase) else {
            return effects;
        };

        match advance.from {
            Phase::Description => {
                self.set_phase(Phase::Image, &mut effects);
                let after_ms = self.timings.image_ms;
                self.schedule(Phase::Image, after_ms, &mut effects);
            }
            Phase::Image => {
                self.clear_hold();
                self.feedback.clear();
                self.angle_details.clear();
                self.set_phase(Phase::Correction, &mut effects);
                effects.push(SessionEffect::Speak(SPEECH_HOLD_POSE.to_string()));
            }
            other => {
                warn!("Timer scheduled from unexpected phase {}", other.as_str());
            }
        }
        effects
    }

    /// Process one detector frame.  `frame` is `None` when no body was found.
    ///
    /// Only evaluated during `Correction`; ignored otherwise.
    pub fn on_frame(
        &mut self,
        frame: Option<&[LandmarkPoint]>,
        size: FrameSize,
        now_ms: f64,
    ) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.state.phase != Phase::Correction {
            return effects;
        }
        let Some(config) = self.config.clone() else {
            return effects;
        };
        let Some((pose_name, pose)) = self.state.pose_index.and_then(|i| config.step(i)) else {
            warn!("Correction phase without an active pose");
            return effects;
        };

        let frame = frame.filter(|f| !f.is_empty());
        if frame.is_none() {
            self.feedback = vec![FEEDBACK_NO_BODY.to_string()];
            self.angle_details.clear();
            self.clear_hold();
            return effects;
        }

        let eval = evaluate_pose(
            frame,
            &pose.criteria,
            config.joint_definitions(),
            config.landmarks(),
            size,
            self.timings.tolerance_deg,
        );

        if !eval.all_correct {
            self.feedback = eval
                .feedback()
                .take(self.timings.max_feedback)
                .map(str::to_string)
                .collect();
            self.angle_details = eval.details;
            self.clear_hold();
            return effects;
        }

        self.feedback.clear();
        self.angle_details = eval.details;

        let Some(start_ms) = self.state.hold_start_ms else {
            debug!(pose = pose_name, "Pose correct, hold started");
            self.state.hold_start_ms = Some(now_ms);
            self.state.hold_progress = 0.0;
            return effects;
        };

        let elapsed = (now_ms - start_ms).max(0.0);
        let progress = if self.timings.hold_ms > 0.0 {
            (elapsed / self.timings.hold_ms).min(1.0)
        } else {
            1.0
        };
        self.state.hold_progress = self.state.hold_progress.max(progress);

        if elapsed >= self.timings.hold_ms {
            info!(pose = pose_name, "Pose held for {:.0}ms", elapsed);
            // Leaving CORRECTION speaks the affirmation; entering the next
            // pose in advance_pose speaks its own line after it.
            effects.push(SessionEffect::Speak(SPEECH_AFFIRMATION.to_string()));
            self.clear_hold();
            self.advance_pose(&mut effects);
        }
        effects
    }

    // ── Output ─────────────────────────────────────────────

    /// Current display/feedback state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.state.phase,
            pose: self.pose.clone(),
            angle_details: self.angle_details.clone(),
            feedback: self.feedback.clone(),
            hold_progress: self.state.hold_progress,
        }
    }

    /// Generate s-expression for status logs.
    pub fn status_sexp(&self) -> String {
        let pose = self
            .pose
            .as_ref()
            .map(|p| format!("\"{}\"", p.pose_name))
            .unwrap_or_else(|| "nil".to_string());
        let index = self
            .state
            .pose_index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "nil".to_string());
        let correct = self.angle_details.iter().filter(|d| d.is_correct).count();
        format!(
            "(:phase :{} :pose {} :index {} :hold {:.2} :joints-correct {}/{} :feedback {} :engine-ready {})",
            self.state.phase.as_str(),
            pose,
            index,
            self.state.hold_progress,
            correct,
            self.angle_details.len(),
            self.feedback.len(),
            if self.engine_ready { "t" } else { "nil" },
        )
    }

    // ── Internals ──────────────────────────────────────────

    /// Move to the next pose in the sequence, or to `Completed`.
    fn advance_pose(&mut self, effects: &mut Vec<SessionEffect>) {
        let Some(config) = self.config.clone() else {
            self.enter_lifecycle(Phase::ConfigError, effects);
            return;
        };

        let next = self.state.pose_index.map_or(0, |i| i + 1);
        self.state.pose_index = Some(next);
        self.clear_hold();
        self.feedback.clear();
        self.angle_details.clear();

        match config.step(next) {
            Some((name, pose)) => {
                info!(pose = name, "Starting pose {}/{}", next + 1, config.sequence().len());
                self.pose = Some(PoseDisplay {
                    pose_name: name.to_string(),
                    display_name: pose.display_name.clone(),
                    description: pose.description.clone(),
                    image_path: pose.image_path.clone(),
                });
                self.set_phase(Phase::Description, effects);
                effects.push(SessionEffect::Speak(pose.announcement(name)));
                let after_ms = self.timings.description_ms;
                self.schedule(Phase::Description, after_ms, effects);
            }
            None => {
                info!("Exercise sequence complete");
                self.pose = None;
                self.set_phase(Phase::Completed, effects);
                effects.push(SessionEffect::Speak(SPEECH_FINISHED.to_string()));
            }
        }
    }

    fn enter_lifecycle(&mut self, phase: Phase, effects: &mut Vec<SessionEffect>) {
        self.cancel_timer(effects);
        self.clear_hold();
        self.set_phase(phase, effects);
        if phase.is_error() {
            effects.push(SessionEffect::StopAllSpeech);
        }
    }

    fn waiting_phase(&self) -> Phase {
        if self.config.is_none() {
            Phase::LoadingConfig
        } else if !self.engine_ready {
            Phase::InitializingPose
        } else {
            Phase::Idle
        }
    }

    fn clear_working_state(&mut self, effects: &mut Vec<SessionEffect>) {
        self.cancel_timer(effects);
        self.state.pose_index = None;
        self.clear_hold();
        self.pose = None;
        self.angle_details.clear();
        self.feedback.clear();
    }

    fn clear_hold(&mut self) {
        self.state.hold_start_ms = None;
        self.state.hold_progress = 0.0;
    }

    fn schedule(&mut self, from: Phase, after_ms: f64, effects: &mut Vec<SessionEffect>) {
        let (advance, superseded) = self.timer.schedule(from, after_ms);
        if let Some(token) = superseded {
            effects.push(SessionEffect::CancelTimer { token });
        }
        effects.push(SessionEffect::ScheduleTimer {
            token: advance.token,
            after_ms,
        });
    }

    fn cancel_timer(&mut self, effects: &mut Vec<SessionEffect>) {
        if let Some(token) = self.timer.cancel() {
            effects.push(SessionEffect::CancelTimer { token });
        }
    }

    fn set_phase(&mut self, to: Phase, effects: &mut Vec<SessionEffect>) {
        let from = self.state.phase;
        if from == to {
            return;
        }
        info!("Session phase {} -> {}", from.as_str(), to.as_str());
        self.state.phase = to;
        effects.push(SessionEffect::PhaseChanged { from, to });
    }
}

// ── Tests ──────────────────────────────────────────────────
