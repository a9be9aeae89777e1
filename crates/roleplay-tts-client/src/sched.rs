//! Gapless playback scheduling over alternating and merged buffers.
//!
//! Two interchangeable slots alternate: while one plays, the other preloads
//! the repeat-aware next segment so the swap at segment end has no audible
//! gap. Once the merged container exists its single slot is preferred for
//! segment-accurate seeking; indices the merged timeline does not cover fall
//! back to the alternating pair.
//!
//! The scheduler owns `PlaybackState` outright and every event handler reads
//! it at call time; nothing captures a stale snapshot.

use crate::assemble::{DecodedAudio, TimelineEntry};
use crate::error::Result;
use crate::sink::{PlaybackSink, SlotId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// `previous()` restarts the current segment instead of stepping back when at
/// least this much has already played.
pub const PREVIOUS_RESTART_THRESHOLD_SEC: f64 = 2.0;

/// Merged-mode segment looping seeks back this far before the entry end so
/// the loop point never reaches the underlying buffer boundary.
pub const MERGED_LOOP_MARGIN_SEC: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    Off,
    Segment,
    Session,
}

impl FromStr for RepeatMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "segment" => Ok(Self::Segment),
            "session" => Ok(Self::Session),
            other => Err(crate::error::Error::Configuration(format!(
                "unknown repeat mode {other:?}"
            ))),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Segment => "segment",
            Self::Session => "session",
        };
        f.write_str(s)
    }
}

/// The single source of truth for what is audible right now.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackState {
    pub active: SlotId,
    pub current_index: Option<usize>,
    pub is_playing: bool,
    pub speed: f32,
    pub repeat: RepeatMode,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            active: SlotId::Primary,
            current_index: None,
            is_playing: false,
            speed: 1.0,
            repeat: RepeatMode::Off,
        }
    }
}

/// Repeat-aware next index. Playback always wraps; there is no terminal
/// stop-at-end state.
pub fn next_step(current: usize, total: usize, repeat: RepeatMode) -> usize {
    if total == 0 {
        return 0;
    }
    match repeat {
        RepeatMode::Segment => current,
        RepeatMode::Off | RepeatMode::Session => (current + 1) % total,
    }
}

pub struct PlaybackScheduler<S: PlaybackSink> {
    sink: S,
    state: PlaybackState,
    total_segments: usize,
    /// Index-keyed decoded buffers; populated incrementally as synthesis
    /// batches land, only ever inserted or overwritten.
    audio: HashMap<usize, DecodedAudio>,
    /// Which index the inactive alternating slot currently holds.
    preloaded: Option<usize>,
    merged_timeline: Option<Vec<TimelineEntry>>,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    pub fn new(sink: S, total_segments: usize) -> Self {
        Self {
            sink,
            state: PlaybackState::default(),
            total_segments,
            audio: HashMap::new(),
            preloaded: None,
            merged_timeline: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.state.repeat
    }

    pub fn speed(&self) -> f32 {
        self.state.speed
    }

    pub fn total_segments(&self) -> usize {
        self.total_segments
    }

    /// Playback position inside the active buffer.
    pub fn current_time(&self) -> f64 {
        self.sink.position_sec(self.state.active)
    }

    /// Duration of the active buffer.
    pub fn duration(&self) -> f64 {
        self.sink.duration_sec(self.state.active)
    }

    pub fn has_audio(&self, index: usize) -> bool {
        self.audio.contains_key(&index)
    }

    /// Register decoded audio for a segment. Overwrites are allowed (voice
    /// switches re-fetch); removal is not.
    pub fn set_segment_audio(&mut self, index: usize, audio: DecodedAudio) {
        self.audio.insert(index, audio);
    }

    /// Install the merged container and its timeline. Preferred for every
    /// index it covers from the next transition on; current playback is left
    /// alone.
    pub fn install_merged(&mut self, pcm: DecodedAudio, timeline: Vec<TimelineEntry>) {
        self.sink.load(SlotId::Merged, pcm);
        self.merged_timeline = Some(timeline);
    }

    /// Drop the merged container (it must be rebuilt after a voice switch).
    pub fn invalidate_merged(&mut self) {
        if self.state.active == SlotId::Merged {
            self.sink.pause(SlotId::Merged);
        }
        self.sink.clear(SlotId::Merged);
        self.merged_timeline = None;
    }

    fn merged_entry(&self, index: usize) -> Option<TimelineEntry> {
        self.merged_timeline
            .as_ref()
            .and_then(|tl| tl.iter().find(|e| e.index == index).copied())
    }

    /// First playable index starting at `from`, walking forward with
    /// wraparound. Missing-audio indices are skipped silently.
    fn next_playable(&self, from: usize) -> Option<usize> {
        if self.total_segments == 0 {
            return None;
        }
        let mut idx = from % self.total_segments;
        for _ in 0..self.total_segments {
            if self.audio.contains_key(&idx) || self.merged_entry(idx).is_some() {
                return Some(idx);
            }
            idx = (idx + 1) % self.total_segments;
        }
        None
    }

    fn log_rejected(result: Result<()>) {
        if let Err(err) = result {
            // Playback rejections leave the state "intending to play"; a
            // later user gesture retries through toggle_play_pause.
            warn!(%err, "playback rejected");
        }
    }

    /// Start playing `index` from its beginning. Out-of-range or
    /// missing-audio indices are a logged no-op and leave state untouched.
    pub fn play_segment(&mut self, index: usize) {
        if index >= self.total_segments {
            warn!(index, total = self.total_segments, "segment out of range");
            return;
        }

        if let Some(entry) = self.merged_entry(index) {
            self.sink.pause(SlotId::Primary);
            self.sink.pause(SlotId::Secondary);
            Self::log_rejected(self.sink.play_from(SlotId::Merged, entry.start_sec));
            self.state.active = SlotId::Merged;
            self.state.current_index = Some(index);
            self.state.is_playing = true;
            return;
        }

        let Some(audio) = self.audio.get(&index).cloned() else {
            warn!(index, "no audio for segment, skipping");
            return;
        };

        self.sink.pause(SlotId::Merged);
        self.sink.pause(SlotId::Secondary);
        self.sink.load(SlotId::Primary, audio);
        Self::log_rejected(self.sink.play_from(SlotId::Primary, 0.0));
        self.state.active = SlotId::Primary;
        self.state.current_index = Some(index);
        self.state.is_playing = true;

        self.preload_next(index);
    }

    /// Load the repeat-aware next playable segment into the inactive
    /// alternating slot. Only ever touches the slot that is not audible.
    fn preload_next(&mut self, current: usize) {
        let inactive = match self.state.active {
            SlotId::Merged => SlotId::Secondary,
            active => active.other(),
        };

        let target = next_step(current, self.total_segments, self.state.repeat);
        match self.next_playable(target) {
            Some(next) => {
                if let Some(audio) = self.audio.get(&next).cloned() {
                    self.sink.load(inactive, audio);
                    self.preloaded = Some(next);
                } else {
                    // Covered only by the merged timeline; no slot preload
                    // needed for a merged continuation.
                    self.preloaded = None;
                }
            }
            None => {
                self.preloaded = None;
            }
        }
    }

    /// Pause or resume the active buffer; starts at the first segment when
    /// nothing has been played yet.
    pub fn toggle_play_pause(&mut self) {
        match self.state.current_index {
            None => {
                if self.total_segments > 0 {
                    self.play_segment(0);
                }
            }
            Some(_) => {
                if self.state.is_playing {
                    self.sink.pause(self.state.active);
                    self.state.is_playing = false;
                } else {
                    Self::log_rejected(self.sink.resume(self.state.active));
                    self.state.is_playing = true;
                }
            }
        }
    }

    pub fn next(&mut self) {
        if self.total_segments == 0 {
            return;
        }
        let target = match self.state.current_index {
            Some(current) => (current + 1) % self.total_segments,
            None => 0,
        };
        self.play_segment(target);
    }

    /// Restart the current segment when it has played past the threshold;
    /// otherwise step back one segment with wraparound.
    pub fn previous(&mut self) {
        if self.total_segments == 0 {
            return;
        }
        let Some(current) = self.state.current_index else {
            self.play_segment(self.total_segments - 1);
            return;
        };

        if self.elapsed_in_current() > PREVIOUS_RESTART_THRESHOLD_SEC {
            self.restart_current(current);
            return;
        }

        let target = (current + self.total_segments - 1) % self.total_segments;
        self.play_segment(target);
    }

    /// Elapsed time within the current segment, regardless of which buffer
    /// carries it.
    fn elapsed_in_current(&self) -> f64 {
        let pos = self.sink.position_sec(self.state.active);
        if self.state.active == SlotId::Merged {
            if let Some(entry) = self
                .state
                .current_index
                .and_then(|i| self.merged_entry(i))
            {
                return (pos - entry.start_sec).max(0.0);
            }
        }
        pos
    }

    fn restart_current(&mut self, current: usize) {
        let start = if self.state.active == SlotId::Merged {
            self.merged_entry(current).map(|e| e.start_sec).unwrap_or(0.0)
        } else {
            0.0
        };
        self.sink.seek(self.state.active, start);
    }

    /// Playback rate for every buffer at once. Non-positive rates are
    /// rejected.
    pub fn set_speed(&mut self, rate: f32) {
        if rate <= 0.0 || !rate.is_finite() {
            warn!(rate, "ignoring non-positive playback rate");
            return;
        }
        self.sink.set_speed(rate);
        self.state.speed = rate;
    }

    /// Pure state transition; takes effect at the next segment end, or on the
    /// next tick when the merged buffer is looping a segment.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.state.repeat = mode;
        if self.state.active != SlotId::Merged {
            if let Some(current) = self.state.current_index {
                self.preload_next(current);
            }
        }
    }

    /// A language/accent switch means new audio was fetched for every index:
    /// the merged container is stale and the current segment should become
    /// audible in the new voice without losing position in the script.
    pub fn handle_voice_switch(&mut self) {
        self.invalidate_merged();
        if let Some(current) = self.state.current_index {
            self.play_segment(current);
        }
    }

    /// Drive pending transitions: segment-end swaps, merged-mode index
    /// tracking and segment looping. Call on every time-update tick.
    pub fn tick(&mut self) {
        for slot in self.sink.take_finished() {
            if slot != self.state.active {
                // A slot we already swapped away from; stale event.
                continue;
            }
            match slot {
                SlotId::Primary | SlotId::Secondary => self.on_segment_end(),
                SlotId::Merged => self.on_merged_end(),
            }
        }

        if self.state.active == SlotId::Merged && self.state.is_playing {
            self.merged_maintenance();
        }
    }

    /// Natural completion of the active alternating buffer: loop in place or
    /// swap to the preloaded slot with zero gap.
    fn on_segment_end(&mut self) {
        let Some(current) = self.state.current_index else {
            return;
        };

        if self.state.repeat == RepeatMode::Segment {
            Self::log_rejected(self.sink.play_from(self.state.active, 0.0));
            return;
        }

        let Some(next) = self.next_playable((current + 1) % self.total_segments.max(1)) else {
            debug!("no playable segment remains, pausing");
            self.state.is_playing = false;
            return;
        };

        // Prefer the merged container as soon as it covers the next index.
        if self.merged_entry(next).is_some() {
            self.play_segment(next);
            return;
        }

        let other = self.state.active.other();
        if self.preloaded != Some(next) {
            // Preload missed (audio arrived after the last preload, or the
            // walk skipped a gap); load now, still ahead of the swap.
            match self.audio.get(&next).cloned() {
                Some(audio) => self.sink.load(other, audio),
                None => {
                    self.state.is_playing = false;
                    return;
                }
            }
        }

        Self::log_rejected(self.sink.play_from(other, 0.0));
        self.state.active = other;
        self.state.current_index = Some(next);
        self.preload_next(next);
    }

    /// The merged container ran off its end: wrap to the first entry.
    fn on_merged_end(&mut self) {
        let first = match self.merged_timeline.as_ref().and_then(|tl| tl.first()) {
            Some(entry) => *entry,
            None => return,
        };
        Self::log_rejected(self.sink.play_from(SlotId::Merged, first.start_sec));
        self.state.current_index = Some(first.index);
    }

    /// Merged-mode bookkeeping per tick: hold the loop inside the current
    /// entry under segment repeat, otherwise track which entry the cursor is
    /// in.
    fn merged_maintenance(&mut self) {
        let pos = self.sink.position_sec(SlotId::Merged);

        if self.state.repeat == RepeatMode::Segment {
            if let Some(entry) = self
                .state
                .current_index
                .and_then(|i| self.merged_entry(i))
            {
                if pos + MERGED_LOOP_MARGIN_SEC >= entry.end_sec {
                    self.sink.seek(SlotId::Merged, entry.start_sec);
                }
            }
            return;
        }

        let Some(timeline) = self.merged_timeline.as_ref() else {
            return;
        };
        let under_cursor = timeline
            .iter()
            .find(|e| pos >= e.start_sec && pos < e.end_sec)
            .map(|e| e.index);
        if let Some(index) = under_cursor {
            if self.state.current_index != Some(index) {
                self.state.current_index = Some(index);
            }
        }
    }
}
