//! Speech backend capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reelsmith_common::error::SynthesisError;
use reelsmith_story_model::TimingTable;

/// Raw engine output before it is written and measured.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutput {
    pub audio: Vec<u8>,
    /// File extension matching the audio encoding, without a dot.
    pub extension: String,
    pub timing: Option<TimingTable>,
}

/// A voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Value to put in `tts.voice`.
    pub id: String,
    pub name: String,
    pub language: Option<String>,
    pub gender: Option<String>,
}

/// A text-to-speech provider.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<SpeechOutput, SynthesisError>;

    async fn list_voices(&self) -> Result<Vec<Voice>, SynthesisError>;
}
