//! Batched synthesis of a whole script.
//!
//! Segments are processed in fixed-width batches of concurrent requests; each
//! result lands in an index-keyed map as its batch completes, so readers only
//! ever see a monotonically more complete mapping. A failed segment becomes
//! "no audio for that index" and never aborts the run.

use crate::error::Result;
use crate::translate;
use crate::voice::{self, Script, Segment, SegmentPlan};
use crate::ws::{SessionConfig, SynthesisSession};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub type SegmentAudioMap = HashMap<usize, Vec<u8>>;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub session: SessionConfig,
    pub translate_endpoint: String,
    /// How many segments synthesize concurrently per batch.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            translate_endpoint: translate::DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            batch_size: 4,
        }
    }
}

/// Synthesize every segment of `script`, returning raw audio bytes keyed by
/// segment index. Missing keys mean that segment failed (already logged).
pub async fn synthesize_script(script: &Script, config: &PipelineConfig) -> SegmentAudioMap {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!(%err, "falling back to default fetch client");
            reqwest::Client::new()
        }
    };

    let mut audio = SegmentAudioMap::new();
    let batch_size = config.batch_size.max(1);

    for batch in script.segments.chunks(batch_size) {
        let jobs = batch
            .iter()
            .map(|segment| synthesize_segment(segment, script, config, &client));
        let results = futures_util::future::join_all(jobs).await;

        for (segment, result) in batch.iter().zip(results) {
            match result {
                Ok(bytes) if !bytes.is_empty() => {
                    audio.insert(segment.index, bytes);
                }
                Ok(_) => {
                    warn!(index = segment.index, "synthesis returned no audio");
                }
                Err(err) => {
                    warn!(index = segment.index, %err, "segment synthesis failed");
                }
            }
        }
    }

    info!(
        synthesized = audio.len(),
        total = script.segments.len(),
        "script synthesis complete"
    );
    audio
}

async fn synthesize_segment(
    segment: &Segment,
    script: &Script,
    config: &PipelineConfig,
    client: &reqwest::Client,
) -> Result<Vec<u8>> {
    let plan = voice::plan_segment(segment, script.language, script.accent, &script.speakers)?;
    let text = segment.text.as_deref().unwrap_or_default();

    match plan {
        SegmentPlan::Silence(spec) => voice::silence_audio(&spec),
        SegmentPlan::Gateway(voice_config) => {
            SynthesisSession::new(config.session.clone())
                .synthesize(text, &voice_config)
                .await
        }
        SegmentPlan::Translate { lang_code } => {
            translate::fetch_audio(client, &config.translate_endpoint, text, lang_code).await
        }
    }
}
