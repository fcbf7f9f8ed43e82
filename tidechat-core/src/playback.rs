//! Playback scheduler
//!
//! Converts a monotonically growing text buffer into a time-paced reveal,
//! independently per message. The scheduler never owns a clock: the caller
//! drives it with [`PlaybackScheduler::tick`] at a fixed interval and passes
//! the current instant, which keeps it deterministic under test.
//!
//! ## Invariants
//!
//! - `revealed <= units(source_text)` at all times
//! - replacing the text with a strict extension keeps `revealed`
//! - replacing it with anything else restarts the reveal from zero
//! - completion is reported once per catch-up and re-armed only by growth

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::PlaybackConfig;
use crate::types::MessageId;

const UNIT_EPSILON: f64 = 1e-9;

/// Atomic unit of reveal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealMode {
    /// Extended grapheme clusters
    #[default]
    Chars,
    /// Words, with trailing whitespace folded into the word
    Words,
}

impl RevealMode {
    /// Byte offsets at which each unit of `text` ends
    fn boundaries(self, text: &str) -> Vec<usize> {
        match self {
            RevealMode::Chars => text
                .grapheme_indices(true)
                .map(|(idx, g)| idx + g.len())
                .collect(),
            RevealMode::Words => {
                let mut ends: Vec<usize> = Vec::new();
                for (idx, segment) in text.split_word_bound_indices() {
                    let end = idx + segment.len();
                    if segment.chars().all(char::is_whitespace) {
                        if let Some(last) = ends.last_mut() {
                            *last = end;
                            continue;
                        }
                    }
                    ends.push(end);
                }
                ends
            }
        }
    }
}

/// Reveal progress for one message
#[derive(Debug, Clone)]
pub struct PlaybackState {
    source_text: String,
    /// End offset of each unit in `source_text`
    boundaries: Vec<usize>,
    revealed: usize,
    /// Fractional units earned but not yet shown
    carry: f64,
    /// Baseline for the next tick; `None` while idle
    last_tick: Option<Instant>,
    /// Completion still owed for the current target
    armed: bool,
}

impl PlaybackState {
    fn new(text: &str, mode: RevealMode) -> Self {
        Self {
            source_text: text.to_string(),
            boundaries: mode.boundaries(text),
            revealed: 0,
            carry: 0.0,
            last_tick: None,
            armed: true,
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed
    }

    /// Total units in the current source text
    pub fn target_len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_caught_up(&self) -> bool {
        self.revealed >= self.boundaries.len()
    }

    /// The already-revealed prefix of the source text
    pub fn visible_text(&self) -> &str {
        match self.revealed {
            0 => "",
            n => &self.source_text[..self.boundaries[n - 1]],
        }
    }

    fn snap(&mut self) {
        self.revealed = self.boundaries.len();
        self.carry = 0.0;
        self.last_tick = None;
        self.armed = false;
    }
}

/// Per-message paced reveal
#[derive(Debug)]
pub struct PlaybackScheduler {
    mode: RevealMode,
    /// Units per second
    rate: f64,
    slots: HashMap<MessageId, PlaybackState>,
}

impl PlaybackScheduler {
    pub fn new(mode: RevealMode, rate: f64) -> Self {
        Self {
            mode,
            rate,
            slots: HashMap::new(),
        }
    }

    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.mode, config.rate())
    }

    pub fn mode(&self) -> RevealMode {
        self.mode
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Record the latest full text known for `id`.
    pub fn push_text(&mut self, id: &MessageId, text: &str) {
        let mode = self.mode;
        let Some(state) = self.slots.get_mut(id) else {
            self.slots
                .insert(id.clone(), PlaybackState::new(text, mode));
            return;
        };

        if state.source_text == text {
            return;
        }

        if !text.starts_with(state.source_text.as_str()) {
            tracing::debug!(message = %id, "Text is not an extension, restarting reveal");
            *state = PlaybackState::new(text, mode);
            return;
        }

        state.source_text = text.to_string();
        state.boundaries = mode.boundaries(text);
        state.revealed = state.revealed.min(state.boundaries.len());
        if !state.is_caught_up() {
            state.armed = true;
        }
    }

    /// Advance every slot to `now`; returns the messages that just caught up.
    pub fn tick(&mut self, now: Instant) -> Vec<MessageId> {
        let rate = self.rate;
        let mut completed = Vec::new();

        for (id, state) in self.slots.iter_mut() {
            if !state.is_caught_up() {
                match state.last_tick {
                    Some(last) => {
                        let elapsed = now.saturating_duration_since(last).as_secs_f64();
                        let earned = elapsed * rate + state.carry;
                        // Absorb float error so 0.3s at 10/s is 3 units, not 2
                        let whole = (earned + UNIT_EPSILON).floor();
                        state.carry = (earned - whole).max(0.0);
                        state.revealed = state
                            .revealed
                            .saturating_add(whole as usize)
                            .min(state.boundaries.len());
                        state.last_tick = Some(now);
                    }
                    None => state.last_tick = Some(now),
                }
            }

            if state.is_caught_up() {
                state.last_tick = None;
                state.carry = 0.0;
                if state.armed {
                    state.armed = false;
                    completed.push(id.clone());
                }
            }
        }

        completed
    }

    pub fn state(&self, id: &MessageId) -> Option<&PlaybackState> {
        self.slots.get(id)
    }

    pub fn revealed_count(&self, id: &MessageId) -> Option<usize> {
        self.slots.get(id).map(PlaybackState::revealed_count)
    }

    /// Revealed prefix for `id`, if it has a slot
    pub fn visible_text(&self, id: &MessageId) -> Option<&str> {
        self.slots.get(id).map(PlaybackState::visible_text)
    }

    /// True while `id` has unrevealed text
    pub fn is_animating(&self, id: &MessageId) -> bool {
        self.slots.get(id).is_some_and(|s| !s.is_caught_up())
    }

    pub fn any_animating(&self) -> bool {
        self.slots.values().any(|s| !s.is_caught_up())
    }

    /// Reveal everything for `id` at once, without reporting completion
    pub fn stop(&mut self, id: &MessageId) {
        if let Some(state) = self.slots.get_mut(id) {
            state.snap();
        }
    }

    /// Snap every slot to its full length, without reporting completion
    pub fn stop_all(&mut self) {
        for state in self.slots.values_mut() {
            state.snap();
        }
    }

    pub fn remove(&mut self, id: &MessageId) {
        self.slots.remove(id);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
