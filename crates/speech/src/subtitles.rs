//! Subtitle files in SRT and VTT formats.

use std::path::Path;

use reelsmith_story_model::{write_atomic, Cue, StoreError, SubtitleTrack};

/// Generate SRT content from a subtitle track.
pub fn generate_srt(track: &SubtitleTrack) -> String {
    let mut output = String::new();

    for cue in &track.cues {
        output.push_str(&format!("{}\n", cue.index));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_time(cue.start_secs),
            format_srt_time(cue.end_secs),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }

    output
}

/// Generate WebVTT content from a subtitle track.
pub fn generate_vtt(track: &SubtitleTrack) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for cue in &track.cues {
        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_time(cue.start_secs),
            format_vtt_time(cue.end_secs),
        ));
        output.push_str(&cue.text);
        output.push_str("\n\n");
    }

    output
}

fn split_millis(secs: f64) -> (u64, u64, u64, u64) {
    let total_ms = if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    };
    (
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000,
    )
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
pub fn format_srt_time(secs: f64) -> String {
    let (hours, minutes, seconds, millis) = split_millis(secs);
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Format seconds as VTT timestamp: HH:MM:SS.mmm
pub fn format_vtt_time(secs: f64) -> String {
    let (hours, minutes, seconds, millis) = split_millis(secs);
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SrtParseError {
    #[error("line {line}: expected cue index, found {found:?}")]
    BadIndex { line: usize, found: String },

    #[error("line {line}: malformed timestamp line {found:?}")]
    BadTimestamp { line: usize, found: String },

    #[error("cue {index} has no text")]
    MissingText { index: usize },
}

/// Parse SRT content back into a track.
pub fn parse_srt(content: &str) -> Result<SubtitleTrack, SrtParseError> {
    let normalized = content.replace("\r\n", "\n");
    let normalized = normalized.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();
    let mut lines = normalized.lines().enumerate().peekable();

    loop {
        while lines.peek().is_some_and(|(_, l)| l.trim().is_empty()) {
            lines.next();
        }
        let Some((line_no, index_line)) = lines.next() else {
            break;
        };
        let index: usize = index_line
            .trim()
            .parse()
            .map_err(|_| SrtParseError::BadIndex {
                line: line_no + 1,
                found: index_line.to_string(),
            })?;

        let (time_no, time_line) = lines.next().ok_or(SrtParseError::MissingText { index })?;
        let bad_time = || SrtParseError::BadTimestamp {
            line: time_no + 1,
            found: time_line.to_string(),
        };
        let (start, end) = time_line.split_once("-->").ok_or_else(bad_time)?;
        let start_secs = parse_srt_time(start.trim()).ok_or_else(bad_time)?;
        let end_secs = parse_srt_time(end.trim()).ok_or_else(bad_time)?;

        let mut text_lines = Vec::new();
        while let Some((_, line)) = lines.peek() {
            if line.trim().is_empty() {
                break;
            }
            text_lines.push(line.trim_end().to_string());
            lines.next();
        }
        if text_lines.is_empty() {
            return Err(SrtParseError::MissingText { index });
        }

        cues.push(Cue {
            index,
            start_secs,
            end_secs,
            text: text_lines.join("\n"),
        });
    }

    Ok(SubtitleTrack::new(cues))
}

fn parse_srt_time(raw: &str) -> Option<f64> {
    let (clock, millis) = raw.split_once([',', '.'])?;
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    let total_ms = hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis;
    Some(total_ms as f64 / 1000.0)
}

/// Save subtitles to a file; `.vtt` selects WebVTT, anything else SRT.
pub fn save_subtitles(track: &SubtitleTrack, path: &Path) -> Result<(), StoreError> {
    let content = match path.extension().and_then(|e| e.to_str()) {
        Some("vtt") => generate_vtt(track),
        _ => generate_srt(track),
    };
    write_atomic(path, content.as_bytes())
}
