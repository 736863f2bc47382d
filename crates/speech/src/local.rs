//! Local speech engine driven through an espeak-ng compatible program.
//!
//! Text goes in over stdin and the program writes a WAV file
//! (`<program> -w <file> -s <wpm> [-v <voice>] --stdin`). The file is read
//! back into memory and removed.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use reelsmith_common::config::TtsConfig;
use reelsmith_common::error::SynthesisError;

use crate::backend::{SpeechBackend, SpeechOutput, Voice};

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary output file removed on drop.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(extension: &str) -> Self {
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(std::env::temp_dir().join(format!(
            "reelsmith_tts_{}_{n}.{extension}",
            std::process::id()
        )))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

pub struct LocalEngine {
    program: String,
    rate_wpm: u32,
    voice: Option<String>,
    timeout: Duration,
}

impl LocalEngine {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            program: config.local_program.clone(),
            rate_wpm: config.speech_rate_wpm.clamp(80, 450),
            voice: config.voice.clone().filter(|v| !v.trim().is_empty()),
            timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> SynthesisError {
        if err.kind() == std::io::ErrorKind::NotFound {
            SynthesisError::permanent(format!(
                "{} not found in PATH; install espeak-ng or set tts.local_program",
                self.program
            ))
        } else {
            SynthesisError::permanent(format!("failed to start {}: {err}", self.program))
        }
    }
}

#[async_trait]
impl SpeechBackend for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn synthesize(&self, text: &str) -> Result<SpeechOutput, SynthesisError> {
        let scratch = ScratchFile::new("wav");

        let mut command = Command::new(&self.program);
        command
            .arg("-w")
            .arg(&scratch.0)
            .arg("-s")
            .arg(self.rate_wpm.to_string());
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %self.program,
            words = text.split_whitespace().count(),
            rate_wpm = self.rate_wpm,
            "Running local speech engine"
        );

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::permanent("speech engine stdin unavailable"))?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SynthesisError::permanent(format!("failed to send text: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SynthesisError::transient(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SynthesisError::permanent(format!("{} failed: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::permanent(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let audio = tokio::fs::read(&scratch.0)
            .await
            .map_err(|e| SynthesisError::permanent(format!("speech engine wrote no audio: {e}")))?;

        Ok(SpeechOutput {
            audio,
            extension: "wav".to_string(),
            timing: None,
        })
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(SynthesisError::permanent(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the table printed by `espeak-ng --voices`.
fn parse_voice_list(raw: &str) -> Vec<Voice> {
    raw.lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _priority = fields.next()?;
            let language = fields.next()?;
            let age_gender = fields.next()?;
            let name = fields.next()?;
            let gender = age_gender
                .split('/')
                .nth(1)
                .filter(|g| !g.is_empty() && *g != "-")
                .map(str::to_string);
            Some(Voice {
                id: language.to_string(),
                name: name.replace('_', " "),
                language: Some(language.to_string()),
                gender,
            })
        })
        .collect()
}
