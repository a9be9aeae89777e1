//! Streaming narration synthesis and gapless playback for roleplay scripts.
//!
//! The library covers two coupled subsystems: a duplex protocol client for a
//! streaming speech gateway (time-windowed token auth, markup-wrapped requests,
//! mixed text/binary demultiplexing), and a playback engine that assembles the
//! per-segment audio into one WAV container and drives alternating buffers so
//! an ordered set of narration segments plays with no audible gap.

mod error;

pub mod assemble;
pub mod pipeline;
pub mod protocol;
pub mod sched;
pub mod sink;
pub mod token;
pub mod translate;
pub mod voice;
pub mod ws;

pub use assemble::{assemble, decode_audio, Assembled, DecodedAudio, TimelineEntry};
pub use error::{Error, Result};
pub use pipeline::{synthesize_script, PipelineConfig, SegmentAudioMap};
pub use sched::{next_step, PlaybackScheduler, PlaybackState, RepeatMode};
pub use sink::{CpalSink, PlaybackSink, SlotId};
pub use voice::{
    plan_segment, silence_audio, AccentMode, Gender, Language, Script, Segment, SegmentPlan,
    SilenceSpec, Speaker, SpeakerProfile, Speakers, VoiceConfig,
};
pub use ws::{SessionConfig, SynthesisSession};
