//! Decode, concatenate and containerize segment audio.
//!
//! Every input blob decodes independently to interleaved f32 PCM; one call
//! assumes a single sample rate and channel count across its inputs and the
//! result is a canonical 44-byte-header WAV of 16-bit little-endian samples
//! plus a per-segment timeline of start/end offsets.

use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Interleaved PCM with its implicit format.
#[derive(Clone, Debug, Default)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Offsets of one segment inside the merged container. Entries reference the
/// original segment index, not the position in the timeline array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineEntry {
    pub index: usize,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl TimelineEntry {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

#[derive(Clone, Debug)]
pub struct Assembled {
    /// RIFF/WAVE container, 44-byte header + 16-bit PCM.
    pub container: Vec<u8>,
    pub duration_sec: f64,
    pub timeline: Vec<TimelineEntry>,
    /// The same audio kept decoded for the merged playback buffer.
    pub pcm: DecodedAudio,
}

/// Decode one compressed blob (MP3, WAV, ...) to interleaved f32.
pub fn decode_audio(bytes: &[u8]) -> Result<DecodedAudio> {
    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("no supported audio track".to_string()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &Default::default())
        .map_err(|e| Error::Decode(e.to_string()))?;

    let mut samples = Vec::new();
    let mut spec: Option<SignalSpec> = None;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| Error::Decode(e.to_string()))?;

        if sample_buf.is_none() {
            let decoded_spec = *decoded.spec();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, decoded_spec));
            spec = Some(decoded_spec);
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let spec = spec.ok_or_else(|| Error::Decode("no audio frames decoded".to_string()))?;
    Ok(DecodedAudio {
        samples,
        channels: spec.channels.count() as u16,
        sample_rate: spec.rate,
    })
}

/// Decode and concatenate `buffers` (ordered by segment index, indices
/// supplied by the caller), derive the timeline, and serialize the merged
/// container. All-or-nothing: any decode failure discards the whole merge.
pub fn assemble(buffers: &[(usize, Vec<u8>)]) -> Result<Assembled> {
    if buffers.is_empty() {
        return Err(Error::Decode("nothing to assemble".to_string()));
    }

    let mut decoded = Vec::with_capacity(buffers.len());
    for (index, bytes) in buffers {
        let audio = decode_audio(bytes)
            .map_err(|e| Error::Decode(format!("segment {index}: {e}")))?;
        decoded.push((*index, audio));
    }

    let channels = decoded[0].1.channels;
    let sample_rate = decoded[0].1.sample_rate;
    for (index, audio) in &decoded {
        if audio.channels != channels || audio.sample_rate != sample_rate {
            return Err(Error::Decode(format!(
                "segment {index} is {}ch/{}Hz, expected {}ch/{}Hz; mixed formats are not resampled",
                audio.channels, audio.sample_rate, channels, sample_rate
            )));
        }
    }

    let mut timeline = Vec::with_capacity(decoded.len());
    let mut samples = Vec::new();
    let mut offset_frames = 0usize;
    for (index, audio) in &decoded {
        let frames = audio.frames();
        timeline.push(TimelineEntry {
            index: *index,
            start_sec: offset_frames as f64 / sample_rate as f64,
            end_sec: (offset_frames + frames) as f64 / sample_rate as f64,
        });
        offset_frames += frames;
        samples.extend_from_slice(&audio.samples);
    }

    let pcm = DecodedAudio {
        samples,
        channels,
        sample_rate,
    };
    let container = write_wav(&pcm)?;
    let duration_sec = pcm.duration_sec();

    Ok(Assembled {
        container,
        duration_sec,
        timeline,
        pcm,
    })
}

fn write_wav(pcm: &DecodedAudio) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Decode(e.to_string()))?;
        for sample in &pcm.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| Error::Decode(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Decode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{silence_audio, SilenceSpec};

    fn wav_bytes(duration_sec: f64, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let frames = (duration_sec * sample_rate as f64).round() as usize;
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for frame in 0..frames {
                for _ in 0..channels {
                    // Low-amplitude ramp so the data survives a 16-bit round trip.
                    let value = ((frame % 100) as i16) - 50;
                    writer.write_sample(value * 64).expect("sample");
                }
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn timeline_matches_input_durations() {
        let buffers = vec![
            (0usize, wav_bytes(0.5, 24_000, 1)),
            (1, wav_bytes(0.25, 24_000, 1)),
            (2, wav_bytes(1.0, 24_000, 1)),
        ];

        let assembled = assemble(&buffers).expect("assembles");
        let expected = [0.5, 0.25, 1.0];
        for (entry, want) in assembled.timeline.iter().zip(expected) {
            assert!((entry.duration_sec() - want).abs() < 1e-6);
        }
        assert!((assembled.duration_sec - 1.75).abs() < 1e-6);
    }

    #[test]
    fn container_header_and_frame_count_round_trip() {
        let buffers = vec![
            (0usize, wav_bytes(0.5, 24_000, 1)),
            (1, wav_bytes(0.25, 24_000, 1)),
        ];
        let assembled = assemble(&buffers).expect("assembles");
        let container = &assembled.container;

        assert_eq!(&container[0..4], b"RIFF");
        assert_eq!(&container[8..12], b"WAVE");

        let total_frames = assembled.pcm.frames();
        let declared = u32::from_le_bytes([
            container[40],
            container[41],
            container[42],
            container[43],
        ]);
        let channels = assembled.pcm.channels as usize;
        assert_eq!(declared as usize, total_frames * channels * 2);

        let reader = hound::WavReader::new(Cursor::new(container.clone())).expect("readable");
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, total_frames);

        let expected_frames =
            (0.5 * 24_000f64).round() as usize + (0.25 * 24_000f64).round() as usize;
        assert_eq!(total_frames, expected_frames);
    }

    #[test]
    fn timeline_entries_are_contiguous_and_keep_indices() {
        let buffers = vec![
            (0usize, wav_bytes(0.3, 24_000, 1)),
            (1, wav_bytes(0.2, 24_000, 1)),
            (2, wav_bytes(0.4, 24_000, 1)),
            (3, wav_bytes(0.1, 24_000, 1)),
        ];
        let assembled = assemble(&buffers).expect("assembles");

        assert_eq!(assembled.timeline[0].start_sec, 0.0);
        for pair in assembled.timeline.windows(2) {
            assert!((pair[0].end_sec - pair[1].start_sec).abs() < 1e-9);
        }
        let indices: Vec<usize> = assembled.timeline.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn mixed_sample_rates_are_rejected() {
        let buffers = vec![
            (0usize, wav_bytes(0.5, 24_000, 1)),
            (1, wav_bytes(0.5, 48_000, 1)),
        ];
        assert!(matches!(assemble(&buffers), Err(Error::Decode(_))));
    }

    #[test]
    fn speech_plus_pause_session_builds_a_contiguous_timeline() {
        let pause = silence_audio(&SilenceSpec { duration_ms: 500 }).expect("silence");
        let buffers = vec![
            (0usize, wav_bytes(0.4, 24_000, 1)),
            (1, wav_bytes(0.6, 24_000, 1)),
            (2, wav_bytes(0.5, 24_000, 1)),
            (3, pause),
        ];

        let assembled = assemble(&buffers).expect("assembles");
        assert_eq!(assembled.timeline.len(), 4);

        // The pause rounds to unit multiples: 500 ms is exactly five units.
        let pause_entry = assembled.timeline[3];
        assert_eq!(pause_entry.index, 3);
        assert!((pause_entry.duration_sec() - 0.5).abs() < 1e-6);

        for pair in assembled.timeline.windows(2) {
            assert!((pair[0].end_sec - pair[1].start_sec).abs() < 1e-9);
        }
    }

    #[test]
    fn decode_failure_discards_the_whole_merge() {
        let buffers = vec![
            (0usize, wav_bytes(0.5, 24_000, 1)),
            (1, vec![0u8; 16]),
        ];
        assert!(assemble(&buffers).is_err());
    }
}
