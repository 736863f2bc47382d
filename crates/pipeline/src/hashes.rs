//! Stage input hashes.
//!
//! Each persisted stage is keyed by a hash of everything that determines its
//! output. Downstream hashes fold in the upstream artifact's hash, so a change
//! anywhere upstream invalidates every later stage.

use std::path::Path;

use reelsmith_common::config::{SubtitleConfig, TtsConfig, VideoConfig};
use reelsmith_common::digest::InputHasher;
use reelsmith_story_model::{AudioArtifact, CandidateItem, ScriptArtifact, SubtitleArtifact};

pub fn rewrite_hash(item: &CandidateItem, target_word_count: usize, backend: &str) -> String {
    InputHasher::new("rewrite")
        .field("title", &item.title)
        .field("body", &item.body)
        .field("target", target_word_count.to_string())
        .field("backend", backend)
        .finish()
}

pub fn synthesize_hash(script: &ScriptArtifact, tts: &TtsConfig, backend: &str) -> String {
    InputHasher::new("synthesize")
        .field("script", &script.input_hash)
        .field("text", &script.text)
        .field("backend", backend)
        .field("voice", tts.voice.as_deref().unwrap_or(""))
        .field("rate", tts.speech_rate_wpm.to_string())
        .finish()
}

pub fn subtitle_hash(
    script: &ScriptArtifact,
    audio: &AudioArtifact,
    subtitles: &SubtitleConfig,
    speech_rate_wpm: u32,
) -> String {
    let timing = serde_json::to_string(&audio.timing).unwrap_or_default();
    InputHasher::new("subtitle")
        .field("text", &script.text)
        .field("audio", &audio.input_hash)
        .field("duration", format!("{:.6}", audio.duration_secs))
        .field("timing", timing)
        .field(
            "policy",
            format!(
                "{}x{}x{}",
                subtitles.max_chars_per_line,
                subtitles.max_lines_per_cue,
                subtitles.max_words_per_cue
            ),
        )
        .field(
            "priors",
            format!(
                "{}:{:.3}:{:.3}",
                speech_rate_wpm, subtitles.sentence_pause_secs, subtitles.clause_pause_secs
            ),
        )
        .finish()
}

pub fn compose_hash(
    audio: &AudioArtifact,
    subtitles: &SubtitleArtifact,
    video: &VideoConfig,
    style: &SubtitleConfig,
) -> String {
    InputHasher::new("compose")
        .field("audio", &audio.input_hash)
        .field("subtitles", &subtitles.input_hash)
        .field("background", background_identity(&video.background))
        .field("video", serde_json::to_string(video).unwrap_or_default())
        .field(
            "style",
            format!(
                "{}:{}:{}:{}:{}:{}",
                style.font,
                style.font_size,
                style.primary_colour,
                style.outline_colour,
                style.outline,
                style.margin_bottom
            ),
        )
        .finish()
}

/// Path, size, and modification time. Footage is too large to hash per item.
fn background_identity(path: &Path) -> String {
    let meta = std::fs::metadata(path).ok();
    let len = meta.as_ref().map(|m| m.len()).unwrap_or(0);
    let modified = meta
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}|{len}|{modified}", path.display())
}
