//! Stage artifacts.
//!
//! Each stage produces one artifact per item. Artifacts are persisted as a
//! data file plus a JSON sidecar holding the fields below; the sidecar's
//! `input_hash` decides whether a later run may reuse the artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::state::Stage;

/// Common view over persisted artifacts, used by the artifact store.
pub trait StageArtifact: Serialize + DeserializeOwned {
    /// Stage that produces this artifact.
    const STAGE: Stage;

    fn item_id(&self) -> &str;

    fn input_hash(&self) -> &str;

    /// Data file the sidecar describes.
    fn path(&self) -> &Path;

    /// Fill fields that live in the data file rather than the sidecar.
    fn hydrate(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Rewritten narration script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptArtifact {
    pub item_id: String,

    /// Stored in the `.txt` data file, not the sidecar.
    #[serde(skip)]
    pub text: String,

    pub path: PathBuf,
    pub word_count: usize,
    pub target_word_count: usize,
    /// Backend that produced the text.
    pub backend: String,
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact for ScriptArtifact {
    const STAGE: Stage = Stage::Rewrite;

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn input_hash(&self) -> &str {
        &self.input_hash
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn hydrate(&mut self) -> std::io::Result<()> {
        self.text = std::fs::read_to_string(&self.path)?;
        Ok(())
    }
}

/// Per-word timing reported by a speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Word offsets into the produced audio, in script order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTable {
    pub words: Vec<WordTiming>,
}

impl TimingTable {
    pub fn new(words: Vec<WordTiming>) -> Self {
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Non-negative, ordered, non-overlapping, and within `duration_secs`
    /// (allowing `tolerance` of slack at the end).
    pub fn is_consistent(&self, duration_secs: f64, tolerance: f64) -> bool {
        let mut prev_end = 0.0f64;
        for word in &self.words {
            if !word.start_secs.is_finite() || !word.end_secs.is_finite() {
                return false;
            }
            if word.start_secs < 0.0 || word.end_secs < word.start_secs {
                return false;
            }
            if word.start_secs + 1e-6 < prev_end {
                return false;
            }
            if word.end_secs > duration_secs + tolerance {
                return false;
            }
            prev_end = word.end_secs;
        }
        true
    }
}

/// Narration audio file plus its measured duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub item_id: String,
    pub path: PathBuf,
    /// Measured from the written file, never estimated from text.
    pub duration_secs: f64,
    pub timing: Option<TimingTable>,
    pub backend: String,
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact for AudioArtifact {
    const STAGE: Stage = Stage::Synthesize;

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn input_hash(&self) -> &str {
        &self.input_hash
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// One timed subtitle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 1-based position in the track.
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    /// Display text; lines are separated by `\n`.
    pub text: String,
}

impl Cue {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Ordered cue list aligned to one audio file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub cues: Vec<Cue>,
}

impl SubtitleTrack {
    pub fn new(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// End of the last cue, or zero for an empty track.
    pub fn end_secs(&self) -> f64 {
        self.cues.last().map(|c| c.end_secs).unwrap_or(0.0)
    }

    /// All cue text joined with single spaces.
    pub fn joined_text(&self) -> String {
        self.cues
            .iter()
            .flat_map(|c| c.text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Check ordering, bounds, and non-empty text against an audio duration.
    pub fn validate(&self, audio_duration_secs: f64, epsilon: f64) -> Result<(), String> {
        let mut prev_end = 0.0f64;
        for cue in &self.cues {
            if cue.text.trim().is_empty() {
                return Err(format!("cue {} has empty text", cue.index));
            }
            if cue.start_secs < -epsilon || cue.end_secs > audio_duration_secs + epsilon {
                return Err(format!(
                    "cue {} [{:.3}, {:.3}] outside [0, {:.3}]",
                    cue.index, cue.start_secs, cue.end_secs, audio_duration_secs
                ));
            }
            if cue.end_secs < cue.start_secs {
                return Err(format!("cue {} ends before it starts", cue.index));
            }
            if cue.start_secs + epsilon < prev_end {
                return Err(format!("cue {} overlaps its predecessor", cue.index));
            }
            prev_end = cue.end_secs;
        }
        Ok(())
    }
}

/// SRT file written for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleArtifact {
    pub item_id: String,
    pub path: PathBuf,
    pub cue_count: usize,
    /// Whether cue times came from engine word timings.
    pub timed_from_words: bool,
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact for SubtitleArtifact {
    const STAGE: Stage = Stage::Subtitle;

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn input_hash(&self) -> &str {
        &self.input_hash
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Final encoded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub item_id: String,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub input_hash: String,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact for VideoArtifact {
    const STAGE: Stage = Stage::Compose;

    fn item_id(&self) -> &str {
        &self.item_id
    }

    fn input_hash(&self) -> &str {
        &self.input_hash
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(index: usize, start: f64, end: f64, text: &str) -> Cue {
        Cue {
            index,
            start_secs: start,
            end_secs: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_track_validation_accepts_gaps() {
        let track = SubtitleTrack::new(vec![cue(1, 0.0, 1.0, "a"), cue(2, 1.5, 3.0, "b")]);
        assert!(track.validate(3.0, 1e-6).is_ok());
        assert_eq!(track.end_secs(), 3.0);
    }

    #[test]
    fn test_track_validation_rejects_overlap_and_overrun() {
        let overlap = SubtitleTrack::new(vec![cue(1, 0.0, 2.0, "a"), cue(2, 1.5, 3.0, "b")]);
        assert!(overlap.validate(3.0, 1e-6).is_err());

        let overrun = SubtitleTrack::new(vec![cue(1, 0.0, 3.5, "a")]);
        assert!(overrun.validate(3.0, 1e-6).is_err());

        let empty = SubtitleTrack::new(vec![cue(1, 0.0, 1.0, "  ")]);
        assert!(empty.validate(3.0, 1e-6).is_err());
    }

    #[test]
    fn test_joined_text_flattens_lines() {
        let track = SubtitleTrack::new(vec![
            cue(1, 0.0, 1.0, "hello\nthere"),
            cue(2, 1.0, 2.0, "friend"),
        ]);
        assert_eq!(track.joined_text(), "hello there friend");
    }

    #[test]
    fn test_timing_consistency() {
        let ok = TimingTable::new(vec![
            WordTiming {
                word: "a".into(),
                start_secs: 0.0,
                end_secs: 0.4,
            },
            WordTiming {
                word: "b".into(),
                start_secs: 0.5,
                end_secs: 1.0,
            },
        ]);
        assert!(ok.is_consistent(1.0, 0.05));
        assert!(!ok.is_consistent(0.8, 0.05));

        let backwards = TimingTable::new(vec![
            WordTiming {
                word: "a".into(),
                start_secs: 0.5,
                end_secs: 0.9,
            },
            WordTiming {
                word: "b".into(),
                start_secs: 0.1,
                end_secs: 0.2,
            },
        ]);
        assert!(!backwards.is_consistent(1.0, 0.05));
    }

    #[test]
    fn test_script_sidecar_omits_text() {
        let script = ScriptArtifact {
            item_id: "abc".into(),
            text: "secret narration".into(),
            path: PathBuf::from("output/scripts/abc.txt"),
            word_count: 2,
            target_word_count: 200,
            backend: "dummy".into(),
            input_hash: "h".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&script).unwrap();
        assert!(!json.contains("secret narration"));
        let parsed: ScriptArtifact = serde_json::from_str(&json).unwrap();
        assert!(parsed.text.is_empty());
        assert_eq!(parsed.word_count, 2);
    }
}
