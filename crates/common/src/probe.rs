//! Media probing through ffprobe and tool discovery.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

/// Basic facts about a media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    /// First video stream dimensions, if any.
    pub video_size: Option<(u32, u32)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffprobe failed for {path}: {stderr}")]
    Failed { path: PathBuf, stderr: String },

    #[error("unreadable ffprobe output for {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Probe duration and video dimensions of `path`.
pub fn probe_media(path: &Path) -> Result<MediaInfo, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type,width,height,duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            path: path.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&raw).map_err(|message| ProbeError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Probe only the duration of `path`.
pub fn probe_duration(path: &Path) -> Result<f64, ProbeError> {
    probe_media(path).map(|info| info.duration_secs)
}

/// Parse `ffprobe -of json` output.
///
/// The container duration wins; stream durations are the fallback for
/// formats that do not report one.
pub fn parse_probe_output(raw: &str) -> Result<MediaInfo, String> {
    let parsed: ProbeOutput = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let format_duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = parsed
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref())
        .filter_map(|d| d.parse::<f64>().ok())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration_secs = format_duration
        .or(stream_duration)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| "no duration reported".to_string())?;

    let video_size = parsed
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        });

    Ok(MediaInfo {
        duration_secs,
        video_size,
    })
}

/// Whether `binary` resolves on PATH.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
