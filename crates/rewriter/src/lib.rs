//! Reelsmith Rewriter
//!
//! Turns a source story into an original narration script. Backends are
//! interchangeable behind [`RewriteBackend`]; the [`Rewriter`] adapter owns
//! the rules every backend is held to (no passthrough, a word-count band,
//! retry of transient failures).

pub mod adapter;
pub mod backend;
pub mod dummy;
pub mod llm;
pub mod similarity;

pub use adapter::{RewrittenScript, Rewriter};
pub use backend::{build_prompt, LengthCorrection, RewriteBackend, RewriteRequest};
pub use dummy::DummyRewriter;
pub use llm::{AnthropicBackend, OpenAiBackend};

use std::sync::Arc;

use reelsmith_common::config::{RewriterConfig, RewriterProvider};
use reelsmith_common::error::RewriteError;

/// Construct the backend selected by configuration.
///
/// A provider whose API key is missing falls back to the dummy rewriter with
/// a warning; `auto` prefers Anthropic, then OpenAI, then the dummy.
pub fn build_backend(config: &RewriterConfig) -> Result<Arc<dyn RewriteBackend>, RewriteError> {
    let anthropic_key = non_empty(config.anthropic_api_key.as_deref());
    let openai_key = non_empty(config.openai_api_key.as_deref());

    let backend: Arc<dyn RewriteBackend> = match config.provider {
        RewriterProvider::Dummy => Arc::new(DummyRewriter::new()?),
        RewriterProvider::Anthropic => match anthropic_key {
            Some(key) => Arc::new(AnthropicBackend::new(config, key)?),
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set, falling back to dummy rewriter");
                Arc::new(DummyRewriter::new()?)
            }
        },
        RewriterProvider::Openai => match openai_key {
            Some(key) => Arc::new(OpenAiBackend::new(config, key)?),
            None => {
                tracing::warn!("OPENAI_API_KEY not set, falling back to dummy rewriter");
                Arc::new(DummyRewriter::new()?)
            }
        },
        RewriterProvider::Auto => match (anthropic_key, openai_key) {
            (Some(key), _) => Arc::new(AnthropicBackend::new(config, key)?),
            (None, Some(key)) => Arc::new(OpenAiBackend::new(config, key)?),
            (None, None) => {
                tracing::warn!("No LLM API key configured, using dummy rewriter");
                Arc::new(DummyRewriter::new()?)
            }
        },
    };

    tracing::info!(backend = backend.name(), "Selected rewrite backend");
    Ok(backend)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_without_keys_uses_dummy() {
        let backend = build_backend(&RewriterConfig::default()).unwrap();
        assert_eq!(backend.name(), "dummy");
    }

    #[test]
    fn test_auto_prefers_anthropic() {
        let config = RewriterConfig {
            anthropic_api_key: Some("a".into()),
            openai_api_key: Some("o".into()),
            ..RewriterConfig::default()
        };
        assert_eq!(build_backend(&config).unwrap().name(), "anthropic");

        let config = RewriterConfig {
            openai_api_key: Some("o".into()),
            ..RewriterConfig::default()
        };
        assert_eq!(build_backend(&config).unwrap().name(), "openai");
    }

    #[test]
    fn test_explicit_provider_without_key_falls_back() {
        let config = RewriterConfig {
            provider: RewriterProvider::Openai,
            openai_api_key: Some("   ".into()),
            ..RewriterConfig::default()
        };
        assert_eq!(build_backend(&config).unwrap().name(), "dummy");
    }
}
