//! Headless demo host — drives a `CoachSession` from a calloop event loop.
//!
//! Loads the exercise document, replays a recorded landmark stream at a
//! fixed frame interval, turns `ScheduleTimer` effects into calloop timers,
//! and "speaks" announcements through the log.  Exits when the sequence
//! completes, the session enters an error phase, the stream runs out, or
//! on SIGINT/SIGTERM.

pub mod frames;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, RegistrationToken};
use tracing::{debug, error, info, warn};

use crate::coach::announce::{AnnouncementQueue, SpeechOutput};
use crate::coach::config::{ExerciseDocument, SessionTimings};
use crate::coach::geometry::FrameSize;
use crate::coach::landmarks::LandmarkIndex;
use crate::coach::session::{CoachSession, InitOutcome, Phase, SessionEffect};
use crate::coach::timer::TimerToken;

use frames::{FrameRecord, FrameSource};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Demo host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Exercise document (JSON).
    pub config_path: PathBuf,
    /// Recorded landmark stream (JSON lines).
    pub frames_path: PathBuf,
    pub timings: SessionTimings,
    /// Delay between replayed frames.
    pub frame_interval_ms: u64,
    /// Display size used for pixel-space joint points.
    pub frame_size: FrameSize,
    /// Exit after N seconds regardless of progress.
    pub exit_after: Option<u64>,
    /// Event loop poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds between status log lines.
    pub status_interval_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("exercise.json"),
            frames_path: PathBuf::from("frames.jsonl"),
            timings: SessionTimings::default(),
            frame_interval_ms: 33,
            frame_size: FrameSize::new(640.0, 480.0),
            exit_after: None,
            poll_interval_ms: 50,
            status_interval_secs: 10,
        }
    }
}

/// How a host run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub final_phase: Phase,
    /// Sequence position reached (`None` if no pose was started).
    pub pose_index: Option<usize>,
    pub frames_replayed: u64,
    pub announcements: Vec<String>,
}

/// Speech output that writes to the log and keeps a transcript.
#[derive(Debug, Default)]
struct LogSpeech {
    transcript: Vec<String>,
}

impl SpeechOutput for LogSpeech {
    fn say(&mut self, text: &str) {
        info!("speak: {}", text);
        self.transcript.push(text.to_string());
    }

    fn cancel(&mut self) {
        debug!("speech cancelled");
    }
}

/// Event loop state.
struct Host {
    session: CoachSession,
    speech: AnnouncementQueue,
    output: LogSpeech,
    frames: Option<FrameSource<BufReader<File>>>,
    frame_size: FrameSize,
    timers: HashMap<TimerToken, RegistrationToken>,
    handle: LoopHandle<'static, Host>,
    started: Instant,
    stream_ended: bool,
    running: bool,
}

impl Host {
    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn apply_effects(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Speak(text) => self.speech.push(text),
                SessionEffect::StopAllSpeech => {
                    self.speech.silence(&mut self.output);
                }
                SessionEffect::ScheduleTimer { token, after_ms } => self.schedule(token, after_ms),
                SessionEffect::CancelTimer { token } => {
                    if let Some(registration) = self.timers.remove(&token) {
                        self.handle.remove(registration);
                    }
                }
                SessionEffect::PhaseChanged { from, to } => {
                    debug!("host observed phase {} -> {}", from.as_str(), to.as_str());
                }
                SessionEffect::CameraFailed => {
                    error!("Camera unavailable: check the landmark stream path");
                }
                SessionEffect::PoseInitFailed => {
                    error!("Pose detector failed to initialize");
                }
            }
        }
    }

    fn schedule(&mut self, token: TimerToken, after_ms: f64) {
        let Some(delay) = timer_duration(after_ms) else {
            error!("Phase timer {} has unusable delay {}ms, not scheduled", token.id(), after_ms);
            return;
        };
        let timer = Timer::from_duration(delay);
        let inserted = self.handle.insert_source(timer, move |_, _, host: &mut Host| {
            host.timers.remove(&token);
            let effects = host.session.on_timer(token);
            host.apply_effects(effects);
            TimeoutAction::Drop
        });
        match inserted {
            Ok(registration) => {
                self.timers.insert(token, registration);
            }
            Err(e) => error!("Failed to schedule phase timer {}: {}", token.id(), e.error),
        }
    }

    /// Feed the next recorded frame.  Returns false once the stream is done.
    fn replay_frame(&mut self) -> bool {
        let Some(frames) = self.frames.as_mut() else {
            return false;
        };
        let record = match frames.next_frame() {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!("{}, treating as no body", e);
                FrameRecord::NoBody
            }
        };
        let now_ms = self.now_ms();
        let effects = self.session.on_frame(record.as_frame(), self.frame_size, now_ms);
        self.apply_effects(effects);
        true
    }

    fn frames_replayed(&self) -> u64 {
        self.frames.as_ref().map_or(0, |f| f.frames_read)
    }

    /// Nothing further can happen without outside intervention.
    fn is_settled(&self) -> bool {
        let phase = self.session.phase();
        let terminal = phase == Phase::Completed || phase.is_error() || self.stream_ended;
        terminal && self.speech.is_empty()
    }
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Convert a millisecond delay into a timer duration.  `None` when the
/// value is negative, non-finite, or too large for `Duration`.
fn timer_duration(after_ms: f64) -> Option<Duration> {
    if after_ms.is_nan() || after_ms < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(after_ms / 1000.0).ok()
}

/// Reject timings the event loop cannot honour.
fn check_timings(timings: &SessionTimings) -> anyhow::Result<()> {
    for (name, value) in [
        ("hold", timings.hold_ms),
        ("description", timings.description_ms),
        ("image", timings.image_ms),
    ] {
        if timer_duration(value).is_none() {
            anyhow::bail!("{} duration must be a finite, non-negative number of ms (got {})", name, value);
        }
    }
    if !timings.tolerance_deg.is_finite() || timings.tolerance_deg < 0.0 {
        anyhow::bail!("tolerance must be finite and non-negative (got {})", timings.tolerance_deg);
    }
    Ok(())
}

/// Load, validate, and install the exercise document.
fn load_exercise(session: &mut CoachSession, config: &HostConfig) -> Vec<SessionEffect> {
    let loaded = ExerciseDocument::load(&config.config_path)
        .and_then(|doc| doc.validate(LandmarkIndex::body33()));
    match loaded {
        Ok(exercise) => session.load_config(exercise),
        Err(e) => {
            error!("Exercise configuration rejected: {}", e);
            session.force_phase(Phase::ConfigError).unwrap_or_default()
        }
    }
}

/// Run the coaching session against a recorded landmark stream.
pub fn run(config: HostConfig) -> anyhow::Result<RunSummary> {
    check_timings(&config.timings)?;
    let mut event_loop: EventLoop<'static, Host> = EventLoop::try_new()?;

    let mut host = Host {
        session: CoachSession::new(config.timings.clone()),
        speech: AnnouncementQueue::new(),
        output: LogSpeech::default(),
        frames: None,
        frame_size: config.frame_size,
        timers: HashMap::new(),
        handle: event_loop.handle(),
        started: Instant::now(),
        stream_ended: false,
        running: true,
    };

    let effects = load_exercise(&mut host.session, &config);
    host.apply_effects(effects);

    // The landmark stream stands in for camera + detector startup.
    if host.session.phase() != Phase::ConfigError {
        let outcome = match FrameSource::open(&config.frames_path) {
            Ok(source) => {
                host.frames = Some(source);
                InitOutcome::Ready
            }
            Err(e) => {
                error!("Cannot open landmark stream {}: {}", config.frames_path.display(), e);
                InitOutcome::CameraFault
            }
        };
        let effects = host.session.handle_init(outcome);
        host.apply_effects(effects);
    }

    if host.session.phase() == Phase::Idle {
        match host.session.start() {
            Ok(effects) => host.apply_effects(effects),
            Err(e) => warn!("Session did not start: {}", e),
        }
    }

    if host.frames.is_some() {
        let interval = Duration::from_millis(config.frame_interval_ms.max(1));
        event_loop
            .handle()
            .insert_source(Timer::from_duration(interval), move |_, _, host: &mut Host| {
                if host.replay_frame() {
                    TimeoutAction::ToDuration(interval)
                } else {
                    info!("Landmark stream exhausted");
                    host.stream_ended = true;
                    TimeoutAction::Drop
                }
            })
            .map_err(|e| anyhow!("failed to insert frame timer: {}", e.error))?;
    }

    install_signal_handlers();

    let exit_duration = config.exit_after.map(Duration::from_secs);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let status_interval = Duration::from_secs(config.status_interval_secs);
    let mut last_status_log = Instant::now();

    info!(
        "Host initialized (frame interval: {}ms), entering event loop",
        config.frame_interval_ms
    );

    while host.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            host.running = false;
            break;
        }

        if let Some(dur) = exit_duration {
            if host.started.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                host.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= status_interval {
            info!(
                "Status: {} {}",
                host.session.status_sexp(),
                host.speech.status_sexp()
            );
            last_status_log = Instant::now();
        }

        // One utterance per iteration keeps delivery strictly ordered.
        host.speech.deliver_next(&mut host.output);

        if host.is_settled() {
            host.running = false;
            break;
        }

        event_loop.dispatch(Some(poll_interval), &mut host)?;
    }

    let state = host.session.state();
    info!(
        "Host shutting down in phase {} ({} frame(s) replayed)",
        state.phase.as_str(),
        host.frames_replayed()
    );
    Ok(RunSummary {
        final_phase: state.phase,
        pose_index: state.pose_index,
        frames_replayed: host.frames_replayed(),
        announcements: host.output.transcript.clone(),
    })
}

// ── Tests ──────────────────────────────────────────────────
