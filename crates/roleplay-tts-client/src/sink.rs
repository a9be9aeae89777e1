//! Playback slots behind one output stream.
//!
//! The scheduler sees three slots: two alternating segment buffers and one
//! merged-container buffer. `CpalSink` backs them with a single cpal output
//! stream reading whichever slot is playing through a fractional cursor; the
//! cursor step folds device-rate conversion and the runtime speed factor into
//! one linear interpolation.

use crate::assemble::DecodedAudio;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotId {
    Primary,
    Secondary,
    Merged,
}

impl SlotId {
    /// The other alternating slot. Merged has no partner.
    pub fn other(self) -> SlotId {
        match self {
            SlotId::Primary => SlotId::Secondary,
            SlotId::Secondary => SlotId::Primary,
            SlotId::Merged => SlotId::Merged,
        }
    }

    fn as_usize(self) -> usize {
        match self {
            SlotId::Primary => 0,
            SlotId::Secondary => 1,
            SlotId::Merged => 2,
        }
    }

    fn from_usize(i: usize) -> SlotId {
        match i {
            0 => SlotId::Primary,
            1 => SlotId::Secondary,
            _ => SlotId::Merged,
        }
    }
}

/// What the scheduler needs from a playback backend. Implemented by
/// `CpalSink` for real output and by a manual-clock fake in the scheduler
/// tests.
pub trait PlaybackSink {
    fn load(&mut self, slot: SlotId, audio: DecodedAudio);
    fn clear(&mut self, slot: SlotId);
    fn is_loaded(&self, slot: SlotId) -> bool;

    /// Start playing `slot` from `position_sec`. May be rejected by the
    /// output device; the caller keeps its own intent.
    fn play_from(&mut self, slot: SlotId, position_sec: f64) -> Result<()>;
    fn pause(&mut self, slot: SlotId);
    fn resume(&mut self, slot: SlotId) -> Result<()>;
    fn seek(&mut self, slot: SlotId, position_sec: f64);

    /// Applied to every slot at once so an active-buffer swap cannot glitch
    /// the rate.
    fn set_speed(&mut self, speed: f32);

    fn position_sec(&self, slot: SlotId) -> f64;
    fn duration_sec(&self, slot: SlotId) -> f64;

    /// Drain slots that reached natural completion since the last call.
    fn take_finished(&mut self) -> Vec<SlotId>;
}

#[derive(Default)]
struct SlotState {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Fractional frame cursor.
    cursor: f64,
    playing: bool,
}

impl SlotState {
    fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    fn position_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.cursor / self.sample_rate as f64
    }

    fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    fn seek_sec(&mut self, position_sec: f64) {
        let frames = self.frames() as f64;
        self.cursor = (position_sec.max(0.0) * self.sample_rate as f64).min(frames);
    }

    /// Linearly interpolated sample at the cursor for one source channel.
    fn sample_at(&self, channel: usize) -> f32 {
        let i = self.cursor.floor() as usize;
        let frac = (self.cursor - i as f64) as f32;
        let frames = self.frames();
        if i >= frames {
            return 0.0;
        }
        let a = self.samples[i * self.channels + channel];
        let b = if i + 1 < frames {
            self.samples[(i + 1) * self.channels + channel]
        } else {
            a
        };
        a + (b - a) * frac
    }
}

struct Shared {
    slots: [SlotState; 3],
    speed: f32,
    finished: Vec<SlotId>,
}

pub struct CpalSink {
    shared: Arc<Mutex<Shared>>,
    device_rate: u32,
    _stream: cpal::Stream,
}

fn lock_shared(shared: &Arc<Mutex<Shared>>) -> std::sync::MutexGuard<'_, Shared> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl CpalSink {
    pub fn new() -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| Error::Playback(e.to_string()))?
            .into();

        let device_rate = config.sample_rate.0;
        let device_channels = config.channels as usize;

        let shared = Arc::new(Mutex::new(Shared {
            slots: Default::default(),
            speed: 1.0,
            finished: Vec::new(),
        }));
        let cb_shared = shared.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);
                    let mut shared = lock_shared(&cb_shared);
                    let speed = shared.speed as f64;

                    let active = (0..3).find(|&i| shared.slots[i].playing);
                    let Some(active) = active else {
                        return;
                    };

                    let slot = &mut shared.slots[active];
                    let step = slot.sample_rate as f64 / device_rate as f64 * speed;
                    let src_channels = slot.channels.max(1);

                    let mut done = false;
                    for frame in data.chunks_mut(device_channels) {
                        if slot.cursor >= slot.frames() as f64 {
                            done = true;
                            break;
                        }
                        for (ch, out) in frame.iter_mut().enumerate() {
                            *out = slot.sample_at(ch.min(src_channels - 1));
                        }
                        slot.cursor += step;
                    }

                    if done || slot.cursor >= slot.frames() as f64 {
                        slot.cursor = slot.frames() as f64;
                        slot.playing = false;
                        let id = SlotId::from_usize(active);
                        shared.finished.push(id);
                    }
                },
                move |err| tracing::error!(%err, "output stream error"),
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?;
        stream
            .play()
            .map_err(|e| Error::Playback(e.to_string()))?;

        Ok(Self {
            shared,
            device_rate,
            _stream: stream,
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl PlaybackSink for CpalSink {
    fn load(&mut self, slot: SlotId, audio: DecodedAudio) {
        let mut shared = lock_shared(&self.shared);
        let state = &mut shared.slots[slot.as_usize()];
        state.channels = audio.channels.max(1) as usize;
        state.sample_rate = audio.sample_rate;
        state.samples = audio.samples;
        state.cursor = 0.0;
        state.playing = false;
    }

    fn clear(&mut self, slot: SlotId) {
        let mut shared = lock_shared(&self.shared);
        shared.slots[slot.as_usize()] = SlotState::default();
    }

    fn is_loaded(&self, slot: SlotId) -> bool {
        let shared = lock_shared(&self.shared);
        !shared.slots[slot.as_usize()].samples.is_empty()
    }

    fn play_from(&mut self, slot: SlotId, position_sec: f64) -> Result<()> {
        let mut shared = lock_shared(&self.shared);
        let state = &mut shared.slots[slot.as_usize()];
        if state.samples.is_empty() {
            return Err(Error::Playback(format!("{slot:?} slot has no audio")));
        }
        state.seek_sec(position_sec);
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self, slot: SlotId) {
        let mut shared = lock_shared(&self.shared);
        shared.slots[slot.as_usize()].playing = false;
    }

    fn resume(&mut self, slot: SlotId) -> Result<()> {
        let mut shared = lock_shared(&self.shared);
        let state = &mut shared.slots[slot.as_usize()];
        if state.samples.is_empty() {
            return Err(Error::Playback(format!("{slot:?} slot has no audio")));
        }
        state.playing = true;
        Ok(())
    }

    fn seek(&mut self, slot: SlotId, position_sec: f64) {
        let mut shared = lock_shared(&self.shared);
        shared.slots[slot.as_usize()].seek_sec(position_sec);
    }

    fn set_speed(&mut self, speed: f32) {
        let mut shared = lock_shared(&self.shared);
        shared.speed = speed;
    }

    fn position_sec(&self, slot: SlotId) -> f64 {
        let shared = lock_shared(&self.shared);
        shared.slots[slot.as_usize()].position_sec()
    }

    fn duration_sec(&self, slot: SlotId) -> f64 {
        let shared = lock_shared(&self.shared);
        shared.slots[slot.as_usize()].duration_sec()
    }

    fn take_finished(&mut self) -> Vec<SlotId> {
        let mut shared = lock_shared(&self.shared);
        std::mem::take(&mut shared.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_partner_mapping() {
        assert_eq!(SlotId::Primary.other(), SlotId::Secondary);
        assert_eq!(SlotId::Secondary.other(), SlotId::Primary);
        assert_eq!(SlotId::Merged.other(), SlotId::Merged);
    }

    #[test]
    fn cursor_interpolates_between_frames() {
        let mut state = SlotState {
            samples: vec![0.0, 1.0],
            channels: 1,
            sample_rate: 10,
            cursor: 0.5,
            playing: false,
        };
        assert!((state.sample_at(0) - 0.5).abs() < 1e-6);

        state.cursor = 1.0;
        // Last frame holds its value instead of reading past the end.
        assert!((state.sample_at(0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn seek_clamps_to_the_buffer() {
        let mut state = SlotState {
            samples: vec![0.0; 100],
            channels: 1,
            sample_rate: 100,
            cursor: 0.0,
            playing: false,
        };
        state.seek_sec(0.5);
        assert!((state.position_sec() - 0.5).abs() < 1e-9);

        state.seek_sec(10.0);
        assert!((state.position_sec() - 1.0).abs() < 1e-9);

        state.seek_sec(-1.0);
        assert_eq!(state.position_sec(), 0.0);
    }
}
