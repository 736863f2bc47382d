//! Reelsmith Speech
//!
//! - **Backends:** a local espeak-ng compatible engine and an HTTP API engine
//! - **Synthesizer:** retrying adapter that writes narration and measures its
//!   real duration from the file
//! - **Subtitles:** SRT/VTT output and SRT parsing

pub mod api;
pub mod backend;
pub mod duration;
pub mod local;
pub mod subtitles;
pub mod synthesizer;

pub use api::ApiEngine;
pub use backend::{SpeechBackend, SpeechOutput, Voice};
pub use local::LocalEngine;
pub use subtitles::*;
pub use synthesizer::{SpeechSynthesizer, SynthesizedAudio};

use std::sync::Arc;

use reelsmith_common::config::{TtsConfig, TtsProvider};
use reelsmith_common::error::SynthesisError;

/// Construct the engine selected by configuration.
pub fn build_backend(config: &TtsConfig) -> Result<Arc<dyn SpeechBackend>, SynthesisError> {
    let backend: Arc<dyn SpeechBackend> = match config.provider {
        TtsProvider::Local => Arc::new(LocalEngine::new(config)),
        TtsProvider::Api => Arc::new(ApiEngine::new(config)?),
    };
    tracing::info!(backend = backend.name(), "Selected speech backend");
    Ok(backend)
}
