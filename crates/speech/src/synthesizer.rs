//! Retrying synthesis adapter.
//!
//! Wraps a [`SpeechBackend`] with the shared retry policy and rate limiter,
//! writes the audio atomically, and measures the real duration of the file
//! that landed on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use reelsmith_common::error::SynthesisError;
use reelsmith_common::rate::TokenBucket;
use reelsmith_common::retry::{retry_async, RetryPolicy};
use reelsmith_story_model::{write_atomic, AudioArtifact, TimingTable};

use crate::backend::SpeechBackend;
use crate::duration::measure_duration;

/// Slack allowed between reported word timings and measured audio length.
const TIMING_TOLERANCE_SECS: f64 = 0.05;

/// Narration written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub timing: Option<TimingTable>,
    pub backend: String,
}

impl SynthesizedAudio {
    pub fn into_artifact(
        self,
        item_id: impl Into<String>,
        input_hash: impl Into<String>,
    ) -> AudioArtifact {
        AudioArtifact {
            item_id: item_id.into(),
            path: self.path,
            duration_secs: self.duration_secs,
            timing: self.timing,
            backend: self.backend,
            input_hash: input_hash.into(),
            created_at: Utc::now(),
        }
    }
}

pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    retry: RetryPolicy,
    bucket: Arc<TokenBucket>,
}

impl SpeechSynthesizer {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        retry: RetryPolicy,
        bucket: Arc<TokenBucket>,
    ) -> Self {
        Self {
            backend,
            retry,
            bucket,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn SpeechBackend> {
        &self.backend
    }

    /// Synthesize `text` to `<output_stem>.<ext>`, where the extension comes
    /// from the backend.
    pub async fn synthesize(
        &self,
        text: &str,
        output_stem: &Path,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::permanent("nothing to synthesize: script is empty"));
        }

        let output = retry_async(&self.retry, "synthesize", || async move {
            self.bucket.acquire().await;
            self.backend.synthesize(text).await
        })
        .await?;

        if output.audio.is_empty() {
            return Err(SynthesisError::permanent(format!(
                "{} returned no audio",
                self.backend.name()
            )));
        }

        let path = output_stem.with_extension(&output.extension);
        let audio = output.audio;
        let measured_path = path.clone();
        let duration_secs = tokio::task::spawn_blocking(move || {
            write_atomic(&measured_path, &audio)
                .map_err(|e| SynthesisError::permanent(format!("failed to write audio: {e}")))?;
            measure_duration(&measured_path)
        })
        .await
        .map_err(|e| SynthesisError::permanent(format!("duration task failed: {e}")))??;

        if duration_secs <= 0.0 {
            return Err(SynthesisError::permanent(format!(
                "{} produced zero-length audio",
                path.display()
            )));
        }

        let word_count = text.split_whitespace().count();
        let timing = output.timing.filter(|table| {
            let usable = table.len() == word_count
                && table.is_consistent(duration_secs, TIMING_TOLERANCE_SECS);
            if !usable {
                tracing::warn!(
                    timing_words = table.len(),
                    script_words = word_count,
                    duration_secs,
                    "Dropping inconsistent word timings from speech backend"
                );
            }
            usable
        });

        tracing::info!(
            backend = self.backend.name(),
            path = %path.display(),
            duration_secs,
            word_timings = timing.is_some(),
            "Narration synthesized"
        );

        Ok(SynthesizedAudio {
            path,
            duration_secs,
            timing,
            backend: self.backend.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SpeechOutput, Voice};
    use async_trait::async_trait;
    use reelsmith_common::error::Retryable;
    use reelsmith_story_model::WordTiming;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn wav_bytes(sample_rate: u32, frames: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..frames {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    struct FakeBackend {
        calls: AtomicU32,
        failures_before_success: u32,
        permanent: bool,
        timing: Option<TimingTable>,
    }

    impl FakeBackend {
        fn ok() -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures_before_success: 0,
                permanent: false,
                timing: None,
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        async fn synthesize(&self, _text: &str) -> Result<SpeechOutput, SynthesisError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(SynthesisError::permanent("voice rejected"));
            }
            if n < self.failures_before_success {
                return Err(SynthesisError::transient("busy"));
            }
            Ok(SpeechOutput {
                audio: wav_bytes(8_000, 12_000),
                extension: "wav".into(),
                timing: self.timing.clone(),
            })
        }

        async fn list_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
            Ok(Vec::new())
        }
    }

    fn synthesizer(backend: Arc<FakeBackend>) -> SpeechSynthesizer {
        SpeechSynthesizer::new(
            backend,
            RetryPolicy::immediate(2),
            Arc::new(TokenBucket::unlimited("tts")),
        )
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "reelsmith_synth_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_writes_file_and_measures_duration() {
        let dir = scratch_dir("ok");
        let backend = Arc::new(FakeBackend::ok());
        let audio = synthesizer(backend.clone())
            .synthesize("Hello there friend.", &dir.join("abc"))
            .await
            .unwrap();

        assert_eq!(audio.path, dir.join("abc.wav"));
        assert!(audio.path.exists());
        assert!((audio.duration_secs - 1.5).abs() < 1e-9);
        assert_eq!(audio.backend, "fake");

        let artifact = audio.into_artifact("abc", "hash");
        assert_eq!(artifact.item_id, "abc");
        assert_eq!(artifact.input_hash, "hash");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = scratch_dir("retry");
        let backend = Arc::new(FakeBackend {
            failures_before_success: 2,
            ..FakeBackend::ok()
        });
        synthesizer(backend.clone())
            .synthesize("Hi.", &dir.join("x"))
            .await
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let dir = scratch_dir("perm");
        let backend = Arc::new(FakeBackend {
            permanent: true,
            ..FakeBackend::ok()
        });
        let err = synthesizer(backend.clone())
            .synthesize("Hi.", &dir.join("x"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(!dir.join("x.wav").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_calling_backend() {
        let backend = Arc::new(FakeBackend::ok());
        let result = synthesizer(backend.clone())
            .synthesize("   ", Path::new("unused"))
            .await;
        assert!(result.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timing_kept_only_when_consistent() {
        let word = |w: &str, s: f64, e: f64| WordTiming {
            word: w.into(),
            start_secs: s,
            end_secs: e,
        };
        let dir = scratch_dir("timing");

        let good = Arc::new(FakeBackend {
            timing: Some(TimingTable::new(vec![word("Hi", 0.0, 0.4), word("you.", 0.5, 1.2)])),
            ..FakeBackend::ok()
        });
        let audio = synthesizer(good).synthesize("Hi you.", &dir.join("a")).await.unwrap();
        assert_eq!(audio.timing.map(|t| t.len()), Some(2));

        // Runs past the 1.5s of audio.
        let late = Arc::new(FakeBackend {
            timing: Some(TimingTable::new(vec![word("Hi", 0.0, 0.4), word("you.", 0.5, 3.0)])),
            ..FakeBackend::ok()
        });
        let audio = synthesizer(late).synthesize("Hi you.", &dir.join("b")).await.unwrap();
        assert!(audio.timing.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
