//! Script input contract and voice/provider selection.
//!
//! A script is an ordered list of segments, each either a spoken line or a
//! pause. Voice selection is a pure function of `(language, accent, gender)`
//! over a fixed supported set; combinations outside the set are a
//! configuration error, never a runtime surprise.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// Gateway output format; all speech audio arrives as 24 kHz mono MP3.
pub const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Sample rate of locally synthesized silence, matching the gateway output so
/// one assembly call sees a single format.
pub const SILENCE_SAMPLE_RATE: u32 = 24_000;

/// Silence is built by repeating this minimal unit; requested durations round
/// up to a unit multiple.
pub const SILENCE_UNIT_MS: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
    Fr,
    De,
    It,
    Ja,
    Ko,
    Zh,
    Vi,
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "es" => Ok(Self::Es),
            "fr" => Ok(Self::Fr),
            "de" => Ok(Self::De),
            "it" => Ok(Self::It),
            "ja" => Ok(Self::Ja),
            "ko" => Ok(Self::Ko),
            "zh" => Ok(Self::Zh),
            "vi" => Ok(Self::Vi),
            other => Err(Error::Configuration(format!("unknown language {other:?}"))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::En => "en",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Ja => "ja",
            Self::Ko => "ko",
            Self::Zh => "zh",
            Self::Vi => "vi",
        };
        f.write_str(s)
    }
}

/// Which of a language's two accent variants to voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccentMode {
    Standard,
    Regional,
}

impl FromStr for AccentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "regional" => Ok(Self::Regional),
            other => Err(Error::Configuration(format!("unknown accent {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub gender: Gender,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Speakers {
    #[serde(rename = "A")]
    pub a: SpeakerProfile,
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<SpeakerProfile>,
}

impl Speakers {
    /// Gender for a speaker; an absent profile defaults to female.
    pub fn gender_of(&self, speaker: Speaker) -> Gender {
        match speaker {
            Speaker::A => self.a.gender,
            Speaker::B => self.b.map(|p| p.gender).unwrap_or(Gender::Female),
        }
    }
}

/// One atomic unit of narration: a spoken line or a pause. Index is assigned
/// on parse and is the playback order.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub speaker: Speaker,
    pub text: Option<String>,
    pub pause_ms: Option<u64>,
}

impl Segment {
    pub fn is_silence(&self) -> bool {
        self.pause_ms.is_some()
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct RawSegment {
    #[serde(default)]
    speaker: Option<Speaker>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    pause: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawScript {
    segments: Vec<RawSegment>,
    speakers: Speakers,
    language: Language,
    #[serde(default = "default_accent")]
    accent: AccentMode,
}

fn default_accent() -> AccentMode {
    AccentMode::Standard
}

/// The upstream input contract: ordered segments plus speaker genders and the
/// language/accent selectors.
#[derive(Clone, Debug)]
pub struct Script {
    pub segments: Vec<Segment>,
    pub speakers: Speakers,
    pub language: Language,
    pub accent: AccentMode,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawScript = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("script parse error: {e}")))?;

        let mut segments = Vec::with_capacity(raw.segments.len());
        for (index, seg) in raw.segments.into_iter().enumerate() {
            let has_text = seg.text.as_deref().is_some_and(|t| !t.is_empty());
            match (has_text, seg.pause) {
                (true, None) => segments.push(Segment {
                    index,
                    speaker: seg.speaker.unwrap_or(Speaker::A),
                    text: seg.text,
                    pause_ms: None,
                }),
                (false, Some(ms)) => segments.push(Segment {
                    index,
                    speaker: seg.speaker.unwrap_or(Speaker::A),
                    text: None,
                    pause_ms: Some(ms),
                }),
                _ => {
                    return Err(Error::Configuration(format!(
                        "segment {index} must carry exactly one of text or pause"
                    )))
                }
            }
        }

        Ok(Self {
            segments,
            speakers: raw.speakers,
            language: raw.language,
            accent: raw.accent,
        })
    }
}

/// Voice and prosody for one gateway synthesis request. Derived fresh per
/// segment, never cached across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceConfig {
    pub voice_name: String,
    pub language_tag: String,
    pub rate: String,
    pub pitch: String,
    pub volume: String,
    pub output_format: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SilenceSpec {
    pub duration_ms: u64,
}

/// How a segment will be realized.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentPlan {
    /// Locally synthesized pause, no network call.
    Silence(SilenceSpec),
    /// Streaming gateway request with a fully resolved voice.
    Gateway(VoiceConfig),
    /// Direct fetch of pre-rendered audio from the translation endpoint.
    Translate { lang_code: &'static str },
}

enum VoicePick {
    Gateway {
        voice: &'static str,
        tag: &'static str,
    },
    Translate {
        lang_code: &'static str,
    },
}

fn pick_voice(language: Language, accent: AccentMode, gender: Gender) -> Option<VoicePick> {
    use AccentMode::{Regional, Standard};
    use Gender::{Female, Male};
    use Language::*;

    let gateway = |voice, tag| Some(VoicePick::Gateway { voice, tag });

    match (language, accent, gender) {
        (En, Standard, Female) => gateway("en-US-JennyNeural", "en-US"),
        (En, Standard, Male) => gateway("en-US-GuyNeural", "en-US"),
        (En, Regional, Female) => gateway("en-GB-SoniaNeural", "en-GB"),
        (En, Regional, Male) => gateway("en-GB-RyanNeural", "en-GB"),

        (Es, Standard, Female) => gateway("es-ES-ElviraNeural", "es-ES"),
        (Es, Standard, Male) => gateway("es-ES-AlvaroNeural", "es-ES"),
        (Es, Regional, Female) => gateway("es-MX-DaliaNeural", "es-MX"),
        (Es, Regional, Male) => gateway("es-MX-JorgeNeural", "es-MX"),

        (Fr, Standard, Female) => gateway("fr-FR-DeniseNeural", "fr-FR"),
        (Fr, Standard, Male) => gateway("fr-FR-HenriNeural", "fr-FR"),
        (Fr, Regional, Female) => gateway("fr-CA-SylvieNeural", "fr-CA"),
        (Fr, Regional, Male) => gateway("fr-CA-JeanNeural", "fr-CA"),

        (De, Standard, Female) => gateway("de-DE-KatjaNeural", "de-DE"),
        (De, Standard, Male) => gateway("de-DE-ConradNeural", "de-DE"),
        (De, Regional, Female) => gateway("de-AT-IngridNeural", "de-AT"),
        (De, Regional, Male) => gateway("de-AT-JonasNeural", "de-AT"),

        (It, Standard, Female) => gateway("it-IT-ElsaNeural", "it-IT"),
        (It, Standard, Male) => gateway("it-IT-DiegoNeural", "it-IT"),
        (It, Regional, Female) => gateway("it-IT-IsabellaNeural", "it-IT"),
        (It, Regional, Male) => gateway("it-IT-GiuseppeNeural", "it-IT"),

        (Ja, Standard | Regional, Female) => gateway("ja-JP-NanamiNeural", "ja-JP"),
        (Ja, Standard | Regional, Male) => gateway("ja-JP-KeitaNeural", "ja-JP"),

        (Ko, Standard | Regional, Female) => gateway("ko-KR-SunHiNeural", "ko-KR"),
        (Ko, Standard | Regional, Male) => gateway("ko-KR-InJoonNeural", "ko-KR"),

        (Zh, Standard, Female) => gateway("zh-CN-XiaoxiaoNeural", "zh-CN"),
        (Zh, Standard, Male) => gateway("zh-CN-YunxiNeural", "zh-CN"),
        (Zh, Regional, Female) => gateway("zh-TW-HsiaoChenNeural", "zh-TW"),
        (Zh, Regional, Male) => gateway("zh-TW-YunJheNeural", "zh-TW"),

        // No gateway coverage; the translation endpoint carries the whole
        // language regardless of accent or gender.
        (Vi, _, _) => Some(VoicePick::Translate { lang_code: "vi" }),
    }
}

/// Resolve a segment to its realization plan.
pub fn plan_segment(
    segment: &Segment,
    language: Language,
    accent: AccentMode,
    speakers: &Speakers,
) -> Result<SegmentPlan> {
    if let Some(duration_ms) = segment.pause_ms {
        return Ok(SegmentPlan::Silence(SilenceSpec { duration_ms }));
    }

    let gender = speakers.gender_of(segment.speaker);
    match pick_voice(language, accent, gender) {
        Some(VoicePick::Gateway { voice, tag }) => Ok(SegmentPlan::Gateway(VoiceConfig {
            voice_name: voice.to_string(),
            language_tag: tag.to_string(),
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
            volume: "+0%".to_string(),
            output_format: OUTPUT_FORMAT.to_string(),
        })),
        Some(VoicePick::Translate { lang_code }) => Ok(SegmentPlan::Translate { lang_code }),
        None => Err(Error::Configuration(format!(
            "no voice for {language}/{accent:?}/{gender:?}"
        ))),
    }
}

/// Locally synthesized silence: the 100 ms unit repeated enough times to cover
/// the requested duration, emitted as a 16-bit mono WAV blob so the assembler
/// sees the same shape as decoded speech.
pub fn silence_audio(spec: &SilenceSpec) -> Result<Vec<u8>> {
    let units = spec.duration_ms.div_ceil(SILENCE_UNIT_MS).max(1);
    let unit_samples = (SILENCE_SAMPLE_RATE as u64 * SILENCE_UNIT_MS / 1000) as usize;

    let wav_spec = hound::WavSpec {
        channels: 1,
        sample_rate: SILENCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec)
            .map_err(|e| Error::Decode(e.to_string()))?;
        for _ in 0..units {
            for _ in 0..unit_samples {
                writer
                    .write_sample(0i16)
                    .map_err(|e| Error::Decode(e.to_string()))?;
            }
        }
        writer.finalize().map_err(|e| Error::Decode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_LANGUAGES: [Language; 9] = [
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::It,
        Language::Ja,
        Language::Ko,
        Language::Zh,
        Language::Vi,
    ];

    #[test]
    fn voice_map_is_total_over_the_supported_set() {
        for language in ALL_LANGUAGES {
            for accent in [AccentMode::Standard, AccentMode::Regional] {
                for gender in [Gender::Female, Gender::Male] {
                    assert!(
                        pick_voice(language, accent, gender).is_some(),
                        "missing voice for {language}/{accent:?}/{gender:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn vietnamese_routes_to_the_translate_provider() {
        let seg = Segment {
            index: 0,
            speaker: Speaker::A,
            text: Some("xin chào".to_string()),
            pause_ms: None,
        };
        let speakers = Speakers {
            a: SpeakerProfile {
                gender: Gender::Male,
            },
            b: None,
        };

        let plan = plan_segment(&seg, Language::Vi, AccentMode::Standard, &speakers)
            .expect("supported combination");
        assert_eq!(plan, SegmentPlan::Translate { lang_code: "vi" });
    }

    #[test]
    fn missing_speaker_profile_defaults_to_female() {
        let speakers = Speakers {
            a: SpeakerProfile {
                gender: Gender::Male,
            },
            b: None,
        };
        assert_eq!(speakers.gender_of(Speaker::B), Gender::Female);
    }

    #[test]
    fn pause_segments_plan_as_silence() {
        let seg = Segment {
            index: 3,
            speaker: Speaker::A,
            text: None,
            pause_ms: Some(750),
        };
        let speakers = Speakers {
            a: SpeakerProfile {
                gender: Gender::Female,
            },
            b: None,
        };

        let plan = plan_segment(&seg, Language::En, AccentMode::Standard, &speakers)
            .expect("pause needs no voice");
        assert_eq!(plan, SegmentPlan::Silence(SilenceSpec { duration_ms: 750 }));
    }

    #[test]
    fn silence_rounds_up_to_unit_multiples() {
        let short = silence_audio(&SilenceSpec { duration_ms: 120 }).expect("silence encodes");
        let exact = silence_audio(&SilenceSpec { duration_ms: 200 }).expect("silence encodes");
        // 120 ms rounds up to two 100 ms units.
        assert_eq!(short.len(), exact.len());

        let longer = silence_audio(&SilenceSpec { duration_ms: 500 }).expect("silence encodes");
        assert!(longer.len() > exact.len());
    }

    #[test]
    fn script_parse_assigns_dense_indices() {
        let json = r#"{
            "segments": [
                {"speaker": "A", "text": "Hello!"},
                {"pause": 500},
                {"speaker": "B", "text": "Hi there."}
            ],
            "speakers": {"A": {"gender": "female"}, "B": {"gender": "male"}},
            "language": "en",
            "accent": "standard"
        }"#;

        let script = Script::from_json(json).expect("valid script");
        assert_eq!(script.segments.len(), 3);
        assert_eq!(script.segments[1].index, 1);
        assert!(script.segments[1].is_silence());
        assert_eq!(script.segments[2].speaker, Speaker::B);
        assert_eq!(script.language, Language::En);
    }

    #[test]
    fn script_parse_rejects_ambiguous_segments() {
        let json = r#"{
            "segments": [{"speaker": "A", "text": "hi", "pause": 100}],
            "speakers": {"A": {"gender": "female"}},
            "language": "en"
        }"#;
        assert!(matches!(
            Script::from_json(json),
            Err(Error::Configuration(_))
        ));

        let json = r#"{
            "segments": [{"speaker": "A", "text": ""}],
            "speakers": {"A": {"gender": "female"}},
            "language": "en"
        }"#;
        assert!(matches!(
            Script::from_json(json),
            Err(Error::Configuration(_))
        ));
    }
}
