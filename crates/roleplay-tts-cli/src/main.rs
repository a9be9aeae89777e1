//! Command line driver: synthesize a roleplay script, write the merged WAV,
//! and optionally play the session with transport commands on stdin.

use anyhow::{Context, Result};
use clap::Parser;
use roleplay_tts_client::{
    assemble, decode_audio, synthesize_script, AccentMode, Assembled, CpalSink, Language,
    PipelineConfig, PlaybackScheduler, PlaybackSink, RepeatMode, Script, SegmentAudioMap,
    SessionConfig,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Synthesize a roleplay narration script and play it without gaps.
#[derive(Debug, Parser)]
#[command(name = "roleplay-tts")]
#[command(about = "Streaming narration synthesis and gapless playback")]
struct Args {
    /// Script JSON: ordered segments plus speakers, language and accent
    #[arg(long)]
    input: PathBuf,

    /// Write the merged WAV container here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Play the session interactively after synthesis
    #[arg(long)]
    play: bool,

    /// Override the script's language selector (en, es, fr, de, it, ja, ko, zh, vi)
    #[arg(long)]
    language: Option<String>,

    /// Override the script's accent selector (standard, regional)
    #[arg(long)]
    accent: Option<String>,

    /// Concurrent synthesis requests per batch
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Initial playback rate
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Synthesis gateway endpoint override
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let json = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read script: {}", args.input.display()))?;
    let mut script = Script::from_json(&json)?;

    if let Some(language) = &args.language {
        script.language = language.parse::<Language>()?;
    }
    if let Some(accent) = &args.accent {
        script.accent = accent.parse::<AccentMode>()?;
    }

    let mut session = SessionConfig::default();
    if let Some(url) = &args.url {
        session.endpoint = url.clone();
    }
    let pipeline = PipelineConfig {
        session,
        batch_size: args.concurrency,
        ..PipelineConfig::default()
    };

    info!(
        segments = script.segments.len(),
        language = %script.language,
        "synthesizing script"
    );
    let raw = synthesize_script(&script, &pipeline).await;

    let assembled = assemble_session(&script, &raw);
    if let Some(assembled) = &assembled {
        print_timeline(assembled);
        if let Some(output) = &args.output {
            std::fs::write(output, &assembled.container)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} ({:.2}s)", output.display(), assembled.duration_sec);
        }
    } else if args.output.is_some() {
        anyhow::bail!("cannot write merged output: not every segment has audio");
    }

    if args.play {
        run_playback(script, pipeline, raw, assembled, args.speed).await?;
    }

    Ok(())
}

/// Merge every segment's audio once all of it is present; a partial session
/// plays segment-by-segment only.
fn assemble_session(script: &Script, raw: &SegmentAudioMap) -> Option<Assembled> {
    let missing: Vec<usize> = script
        .segments
        .iter()
        .map(|s| s.index)
        .filter(|i| !raw.contains_key(i))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "skipping merge, segments without audio");
        return None;
    }

    let buffers: Vec<(usize, Vec<u8>)> = script
        .segments
        .iter()
        .filter_map(|s| raw.get(&s.index).map(|b| (s.index, b.clone())))
        .collect();
    match assemble(&buffers) {
        Ok(assembled) => Some(assembled),
        Err(err) => {
            warn!(%err, "merge failed, playback stays per-segment");
            None
        }
    }
}

fn print_timeline(assembled: &Assembled) {
    for entry in &assembled.timeline {
        println!(
            "  [{:>3}] {:7.2}s .. {:7.2}s",
            entry.index, entry.start_sec, entry.end_sec
        );
    }
}

fn load_scheduler<S: PlaybackSink>(
    scheduler: &mut PlaybackScheduler<S>,
    raw: &SegmentAudioMap,
    assembled: Option<&Assembled>,
) {
    for (index, bytes) in raw {
        match decode_audio(bytes) {
            Ok(audio) => scheduler.set_segment_audio(*index, audio),
            Err(err) => warn!(index = *index, %err, "segment audio did not decode"),
        }
    }
    if let Some(assembled) = assembled {
        scheduler.install_merged(assembled.pcm.clone(), assembled.timeline.clone());
    }
}

async fn run_playback(
    mut script: Script,
    pipeline: PipelineConfig,
    raw: SegmentAudioMap,
    assembled: Option<Assembled>,
    speed: f32,
) -> Result<()> {
    let sink = CpalSink::new()?;
    let mut scheduler = PlaybackScheduler::new(sink, script.segments.len());
    load_scheduler(&mut scheduler, &raw, assembled.as_ref());
    scheduler.set_speed(speed);

    println!("Transport: play N | space | next | prev | speed F | repeat off|segment|session | accent standard|regional | status | quit");
    scheduler.toggle_play_pause();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut ticker = interval(Duration::from_millis(100));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    prompt()?;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.tick();
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let words: Vec<&str> = line.split_whitespace().collect();
                match words.as_slice() {
                    [] | ["space"] => scheduler.toggle_play_pause(),
                    ["quit"] | ["q"] | ["exit"] => break,
                    ["play", index] => match index.parse::<usize>() {
                        Ok(index) => scheduler.play_segment(index),
                        Err(_) => println!("play expects a segment index"),
                    },
                    ["next"] | ["n"] => scheduler.next(),
                    ["prev"] | ["p"] => scheduler.previous(),
                    ["speed", rate] => match rate.parse::<f32>() {
                        Ok(rate) => scheduler.set_speed(rate),
                        Err(_) => println!("speed expects a number"),
                    },
                    ["repeat", mode] => match mode.parse::<RepeatMode>() {
                        Ok(mode) => scheduler.set_repeat_mode(mode),
                        Err(err) => println!("{err}"),
                    },
                    ["accent", mode] => match mode.parse::<AccentMode>() {
                        Ok(mode) => {
                            switch_accent(&mut script, mode, &pipeline, &mut scheduler).await;
                        }
                        Err(err) => println!("{err}"),
                    },
                    ["status"] => print_status(&scheduler),
                    other => println!("unknown command: {}", other.join(" ")),
                }
                prompt()?;
            }
        }
    }

    Ok(())
}

/// Mid-session accent switch: fetch the new voice's audio for every segment,
/// drop the stale merged container, and resume in place.
async fn switch_accent<S: PlaybackSink>(
    script: &mut Script,
    accent: AccentMode,
    pipeline: &PipelineConfig,
    scheduler: &mut PlaybackScheduler<S>,
) {
    if script.accent == accent {
        return;
    }
    script.accent = accent;

    println!("Refetching audio for accent {accent:?}...");
    let raw = synthesize_script(script, pipeline).await;
    for (index, bytes) in &raw {
        match decode_audio(bytes) {
            Ok(audio) => scheduler.set_segment_audio(*index, audio),
            Err(err) => warn!(index = *index, %err, "segment audio did not decode"),
        }
    }
    scheduler.handle_voice_switch();

    if let Some(assembled) = assemble_session(script, &raw) {
        scheduler.install_merged(assembled.pcm, assembled.timeline);
    }
}

fn print_status<S: PlaybackSink>(scheduler: &PlaybackScheduler<S>) {
    println!(
        "segment={:?} playing={} time={:.2}s/{:.2}s speed={} repeat={}",
        scheduler.current_index(),
        scheduler.is_playing(),
        scheduler.current_time(),
        scheduler.duration(),
        scheduler.speed(),
        scheduler.repeat_mode(),
    );
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
