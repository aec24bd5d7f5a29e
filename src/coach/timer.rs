//! Cancellable phase-advance scheduling.
//!
//! The session owns at most one pending advance.  The host's timer
//! facility only sees opaque tokens; a fire is honoured only when its token
//! is still the pending one and the session is still in the phase that
//! scheduled it.

use tracing::debug;

use super::session::Phase;

/// Opaque handle for one scheduled phase advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A pending advance out of `from` after `after_ms`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledAdvance {
    pub token: TimerToken,
    pub from: Phase,
    pub after_ms: f64,
}

/// Single-slot scheduler for phase advances.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTimer {
    next_id: u64,
    pending: Option<ScheduledAdvance>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: None,
        }
    }

    /// Schedule a new advance, replacing any pending one.
    ///
    /// Returns the new schedule and the token it superseded, if any.
    pub fn schedule(&mut self, from: Phase, after_ms: f64) -> (ScheduledAdvance, Option<TimerToken>) {
        let superseded = self.cancel();
        let token = TimerToken(self.next_id);
        self.next_id += 1;
        let advance = ScheduledAdvance {
            token,
            from,
            after_ms,
        };
        self.pending = Some(advance);
        debug!(token = token.0, phase = from.as_str(), after_ms, "phase advance scheduled");
        (advance, superseded)
    }

    /// Drop the pending advance.  Returns its token so the host can cancel it too.
    pub fn cancel(&mut self) -> Option<TimerToken> {
        self.pending.take().map(|advance| advance.token)
    }

    /// Consume the pending advance if `token` matches it and `current` is
    /// still the phase that scheduled it.  Anything else is stale.
    pub fn fire(&mut self, token: TimerToken, current: Phase) -> Option<ScheduledAdvance> {
        match self.pending {
            Some(advance) if advance.token == token && advance.from == current => {
                self.pending = None;
                Some(advance)
            }
            Some(advance) if advance.token == token => {
                debug!(
                    token = token.0,
                    scheduled_in = advance.from.as_str(),
                    current = current.as_str(),
                    "timer fired after phase changed, dropping",
                );
                self.pending = None;
                None
            }
            _ => {
                debug!(token = token.0, "stale timer fire ignored");
                None
            }
        }
    }

    pub fn pending(&self) -> Option<&ScheduledAdvance> {
        self.pending.as_ref()
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────
