//! Subtitle time alignment.
//!
//! Given a script, the measured narration duration, and optionally the speech
//! engine's word offsets, produce a [`SubtitleTrack`] whose cues are ordered,
//! non-overlapping, and inside `[0, duration]`.
//!
//! With word offsets, each cue spans its first word's start to its last
//! word's end. Without them, every cue gets an estimate proportional to its
//! visible character count (converted to spoken words at the configured
//! speech rate) plus a short pause prior after sentence and clause ends. The
//! estimates are then scaled by one global factor so they sum to the measured
//! duration exactly, and the last cue ends at the duration.

use reelsmith_common::config::SubtitleConfig;
use reelsmith_common::error::SubtitleError;
use reelsmith_story_model::{Cue, SubtitleTrack, TimingTable};

use crate::segment::{segment, Boundary, CuePolicy, CueText};

/// Slack allowed when validating engine word timings against the audio.
const TIMING_TOLERANCE_SECS: f64 = 0.05;

/// Builds subtitle tracks for narration audio.
#[derive(Debug, Clone)]
pub struct SubtitleBuilder {
    policy: CuePolicy,
    speech_rate_wpm: f64,
    sentence_pause_secs: f64,
    clause_pause_secs: f64,
}

/// Which timing source produced a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    WordOffsets,
    Estimated,
}

impl SubtitleBuilder {
    pub fn new(config: &SubtitleConfig, speech_rate_wpm: u32) -> Self {
        Self {
            policy: CuePolicy::from(config),
            speech_rate_wpm: f64::from(speech_rate_wpm.max(1)),
            sentence_pause_secs: config.sentence_pause_secs.max(0.0),
            clause_pause_secs: config.clause_pause_secs.max(0.0),
        }
    }

    pub fn policy(&self) -> &CuePolicy {
        &self.policy
    }

    /// Build a track, discarding which timing source was used.
    pub fn build(
        &self,
        script: &str,
        audio_duration_secs: f64,
        timing: Option<&TimingTable>,
    ) -> Result<SubtitleTrack, SubtitleError> {
        self.build_with_source(script, audio_duration_secs, timing)
            .map(|(track, _)| track)
    }

    /// Build a track and report whether word offsets were used.
    ///
    /// Word offsets are ignored (with a warning) when their count does not
    /// match the script's words or they fall outside the audio.
    pub fn build_with_source(
        &self,
        script: &str,
        audio_duration_secs: f64,
        timing: Option<&TimingTable>,
    ) -> Result<(SubtitleTrack, TimingSource), SubtitleError> {
        let cues = segment(script, &self.policy);
        if cues.is_empty() {
            return Err(SubtitleError::EmptyScript);
        }

        let duration = if audio_duration_secs.is_finite() {
            audio_duration_secs.max(0.0)
        } else {
            0.0
        };

        let total_words: usize = cues.iter().map(|c| c.word_count).sum();
        let usable_timing = timing.filter(|table| {
            let matches = table.len() == total_words
                && table.is_consistent(duration, TIMING_TOLERANCE_SECS);
            if !matches {
                tracing::warn!(
                    timing_words = table.len(),
                    script_words = total_words,
                    duration,
                    "Ignoring inconsistent word timings; estimating cue times"
                );
            }
            matches
        });

        let (spans, source) = match usable_timing {
            Some(table) => (spans_from_timing(&cues, table), TimingSource::WordOffsets),
            None => (self.estimated_spans(&cues, duration), TimingSource::Estimated),
        };

        let track = assemble(&cues, &spans, duration);
        tracing::debug!(
            cues = track.len(),
            duration,
            source = ?source,
            "Built subtitle track"
        );
        Ok((track, source))
    }

    fn estimated_spans(&self, cues: &[CueText], duration: f64) -> Vec<(f64, f64)> {
        let total_chars: usize = cues.iter().map(CueText::visible_chars).sum();
        let total_words: usize = cues.iter().map(|c| c.word_count).sum();
        let chars_per_word = total_chars.max(1) as f64 / total_words.max(1) as f64;
        let secs_per_word = 60.0 / self.speech_rate_wpm;

        let last = cues.len() - 1;
        let estimates: Vec<f64> = cues
            .iter()
            .enumerate()
            .map(|(i, cue)| {
                let spoken = cue.visible_chars() as f64 / chars_per_word * secs_per_word;
                let pause = if i == last {
                    0.0
                } else {
                    match cue.boundary {
                        Boundary::Sentence => self.sentence_pause_secs,
                        Boundary::Clause => self.clause_pause_secs,
                        Boundary::Word => 0.0,
                    }
                };
                spoken + pause
            })
            .collect();

        let total: f64 = estimates.iter().sum();
        let scale = if total > 0.0 { duration / total } else { 0.0 };

        let mut spans = Vec::with_capacity(estimates.len());
        let mut cursor = 0.0;
        for (i, estimate) in estimates.iter().enumerate() {
            let end = if i == last {
                duration
            } else {
                (cursor + estimate * scale).min(duration)
            };
            spans.push((cursor, end));
            cursor = end;
        }
        spans
    }
}

fn spans_from_timing(cues: &[CueText], table: &TimingTable) -> Vec<(f64, f64)> {
    cues.iter()
        .map(|cue| {
            let first = &table.words[cue.first_word];
            let last = &table.words[cue.first_word + cue.word_count - 1];
            (first.start_secs, last.end_secs)
        })
        .collect()
}

/// Clamp spans into `[0, duration]`, force monotonic order, and attach text.
fn assemble(cues: &[CueText], spans: &[(f64, f64)], duration: f64) -> SubtitleTrack {
    let mut out = Vec::with_capacity(cues.len());
    let mut prev_end = 0.0f64;
    for (i, (cue, &(start, end))) in cues.iter().zip(spans).enumerate() {
        let start = start.clamp(0.0, duration).max(prev_end);
        let end = end.clamp(0.0, duration).max(start);
        out.push(Cue {
            index: i + 1,
            start_secs: start,
            end_secs: end,
            text: cue.text(),
        });
        prev_end = end;
    }
    SubtitleTrack::new(out)
}
