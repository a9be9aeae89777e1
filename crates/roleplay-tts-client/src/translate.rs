//! Direct-fetch synthesis provider.
//!
//! Some languages have no gateway voice; for those the audio is a pre-rendered
//! MP3 served by a translation-style endpoint. No protocol state machine, just
//! one GET keyed by text and language code.

use crate::error::{Error, Result};

pub const DEFAULT_TRANSLATE_ENDPOINT: &str = "https://translate.google.com/translate_tts";

pub async fn fetch_audio(
    client: &reqwest::Client,
    endpoint: &str,
    text: &str,
    lang_code: &str,
) -> Result<Vec<u8>> {
    let response = client
        .get(endpoint)
        .query(&[
            ("ie", "UTF-8"),
            ("client", "tw-ob"),
            ("tl", lang_code),
            ("q", text),
        ])
        .send()
        .await
        .map_err(|e| Error::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Fetch(format!("{endpoint} returned {status}")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Fetch(e.to_string()))?;
    Ok(bytes.to_vec())
}
