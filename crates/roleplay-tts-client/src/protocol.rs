//! Wire framing for the streaming synthesis gateway.
//!
//! Outbound control messages are text frames made of `Name:value` header lines
//! terminated by a blank line, followed by a JSON or SSML body. Inbound binary
//! frames carry a textual header block ending in the fixed `Path:audio`
//! separator; only the bytes after the separator are audio payload.

use crate::error::{Error, Result};
use crate::voice::VoiceConfig;
use rand::Rng;

/// Separator between the textual header block and the audio payload of a
/// binary frame.
pub const AUDIO_HEADER_SEPARATOR: &[u8] = b"Path:audio\r\n";

pub const PATH_TURN_START: &str = "turn.start";
pub const PATH_TURN_END: &str = "turn.end";

/// Random 32-character lowercase hex id, one per request or connection.
pub fn request_id() -> String {
    format!("{:032x}", rand::rng().random::<u128>())
}

/// The one-shot configuration message announcing output format and metadata
/// options (sentence boundaries off, word boundaries on).
pub fn speech_config_message(output_format: &str) -> String {
    let body = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "true",
                    },
                    "outputFormat": output_format,
                }
            }
        }
    });
    format!(
        "Content-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n{body}"
    )
}

/// The synthesis request: a per-call request id plus the SSML document naming
/// the voice and prosody around the escaped text.
pub fn ssml_message(request_id: &str, voice: &VoiceConfig, text: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/ssml+xml\r\nPath:ssml\r\n\r\n{}",
        ssml_document(voice, text)
    )
}

pub fn ssml_document(voice: &VoiceConfig, text: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{lang}'>\
<voice name='{name}'><prosody pitch='{pitch}' rate='{rate}' volume='{volume}'>{text}</prosody>\
</voice></speak>",
        lang = voice.language_tag,
        name = voice.voice_name,
        pitch = voice.pitch,
        rate = voice.rate,
        volume = voice.volume,
        text = escape_xml(text),
    )
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `Path:` header value of an inbound text frame, if present.
pub fn text_message_path(message: &str) -> Option<&str> {
    let headers = match message.split_once("\r\n\r\n") {
        Some((headers, _body)) => headers,
        None => message,
    };
    for line in headers.split("\r\n") {
        if let Some(value) = line.strip_prefix("Path:") {
            return Some(value.trim());
        }
    }
    None
}

/// Audio payload of a binary frame: everything after the header separator.
pub fn audio_payload(frame: &[u8]) -> Result<&[u8]> {
    let sep = AUDIO_HEADER_SEPARATOR;
    if frame.len() >= sep.len() {
        for start in 0..=frame.len() - sep.len() {
            if &frame[start..start + sep.len()] == sep {
                return Ok(&frame[start + sep.len()..]);
            }
        }
    }
    Err(Error::Protocol(
        "binary frame without audio header separator".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceConfig;

    fn test_voice() -> VoiceConfig {
        VoiceConfig {
            voice_name: "en-US-JennyNeural".to_string(),
            language_tag: "en-US".to_string(),
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
            volume: "+0%".to_string(),
            output_format: "audio-24khz-48kbitrate-mono-mp3".to_string(),
        }
    }

    #[test]
    fn audio_payload_splits_after_separator() {
        let mut frame = Vec::new();
        frame.extend_from_slice(b"X-RequestId:abc\r\nContent-Type:audio/mpeg\r\nPath:audio\r\n");
        frame.extend_from_slice(&[0xff, 0xf3, 0x01, 0x02]);

        let payload = audio_payload(&frame).expect("frame carries audio");
        assert_eq!(payload, &[0xff, 0xf3, 0x01, 0x02]);
    }

    #[test]
    fn audio_payload_rejects_frames_without_separator() {
        let frame = b"X-RequestId:abc\r\nPath:metadata\r\n\x00\x01";
        assert!(matches!(audio_payload(frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn text_message_path_is_extracted_from_headers() {
        let msg = "X-RequestId:abc\r\nPath:turn.end\r\n\r\n{}";
        assert_eq!(text_message_path(msg), Some("turn.end"));

        let msg = "Content-Type:application/json\r\n\r\n{}";
        assert_eq!(text_message_path(msg), None);
    }

    #[test]
    fn ssml_document_escapes_text_and_names_voice() {
        let doc = ssml_document(&test_voice(), "Tom & Jerry <live>");
        assert!(doc.contains("Tom &amp; Jerry &lt;live&gt;"));
        assert!(doc.contains("name='en-US-JennyNeural'"));
        assert!(doc.contains("xml:lang='en-US'"));
        assert!(!doc.contains("<live>"));
    }

    #[test]
    fn speech_config_enables_word_boundaries_only() {
        let msg = speech_config_message("audio-24khz-48kbitrate-mono-mp3");
        assert!(msg.starts_with("Content-Type:"));
        assert!(msg.contains("Path:speech.config"));

        let body = msg.split("\r\n\r\n").nth(1).expect("config has a body");
        let json: serde_json::Value = serde_json::from_str(body).expect("body is json");
        let opts = &json["context"]["synthesis"]["audio"]["metadataoptions"];
        assert_eq!(opts["sentenceBoundaryEnabled"], "false");
        assert_eq!(opts["wordBoundaryEnabled"], "true");
    }

    #[test]
    fn request_ids_are_unique_hex() {
        let a = request_id();
        let b = request_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
