//! Spoken announcement queue.
//!
//! The session only emits ordered text requests and a "silence" request.
//! This queue serializes delivery to whatever speech output the host has:
//! one utterance at a time, in order, with undelivered text discarded on
//! silence.

use std::collections::VecDeque;

use tracing::{debug, warn};

/// Maximum undelivered announcements; the oldest is dropped beyond this.
const MAX_PENDING: usize = 16;

/// Speech output device, implemented by the host.
pub trait SpeechOutput {
    /// Start speaking `text`.
    fn say(&mut self, text: &str);
    /// Stop whatever is being spoken right now.
    fn cancel(&mut self);
}

/// Ordered, silenceable announcement FIFO.
#[derive(Debug, Default)]
pub struct AnnouncementQueue {
    pending: VecDeque<String>,
    /// Total announcements handed to the output.
    pub delivered: u64,
    /// Total announcements discarded by `silence` or overflow.
    pub discarded: u64,
}

impl AnnouncementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `text` behind everything already pending.
    pub fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        if self.pending.len() >= MAX_PENDING {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("Announcement queue full, dropping {:?}", dropped);
                self.discarded += 1;
            }
        }
        debug!("Announcement queued: {:?}", text);
        self.pending.push_back(text);
    }

    /// Pop the next announcement without delivering it.
    pub fn next(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Hand the next announcement to `output`.  Returns false when empty.
    pub fn deliver_next(&mut self, output: &mut dyn SpeechOutput) -> bool {
        match self.pending.pop_front() {
            Some(text) => {
                output.say(&text);
                self.delivered += 1;
                true
            }
            None => false,
        }
    }

    /// Discard every undelivered announcement and stop the output.
    /// Returns the number discarded.
    pub fn silence(&mut self, output: &mut dyn SpeechOutput) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.discarded += count as u64;
        output.cancel();
        if count > 0 {
            debug!("Silenced {} pending announcement(s)", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Generate s-expression for status logs.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:pending {} :delivered {} :discarded {})",
            self.pending.len(),
            self.delivered,
            self.discarded,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
pub(crate) struct RecordingOutput {
    pub spoken: Vec<String>,
    pub cancels: usize,
}

#[cfg(test)]
impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            spoken: Vec::new(),
            cancels: 0,
        }
    }
}

#[cfg(test)]
impl SpeechOutput for RecordingOutput {
    fn say(&mut self, text: &str) {
        self.spoken.push(text.to_string());
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}
