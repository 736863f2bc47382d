//! Rewrite backend capability and the shared prompt.

use async_trait::async_trait;
use reelsmith_common::error::RewriteError;

/// Word-count feedback attached to the single length retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthCorrection {
    pub previous_word_count: usize,
    pub min_words: usize,
    pub max_words: usize,
}

/// One rewrite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub source: String,
    pub target_word_count: usize,
    pub correction: Option<LengthCorrection>,
}

impl RewriteRequest {
    pub fn new(source: impl Into<String>, target_word_count: usize) -> Self {
        Self {
            source: source.into(),
            target_word_count,
            correction: None,
        }
    }

    pub fn with_correction(&self, correction: LengthCorrection) -> Self {
        Self {
            correction: Some(correction),
            ..self.clone()
        }
    }
}

/// A text-to-text rewrite provider.
///
/// Backends only transform text; length and passthrough rules are enforced
/// by the adapter so every backend is held to the same standard.
#[async_trait]
pub trait RewriteBackend: Send + Sync {
    /// Identifier recorded in script artifacts and input hashes.
    fn name(&self) -> &str;

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError>;
}

const PROMPT_TEMPLATE: &str = "You are a professional writer who turns stories into short vertical-video narration scripts.

Rewrite the story below as a script that is:
1. Fully paraphrased, with different words and sentence structures throughout
2. Opened by a strong hook in the first sentence
3. Conversational and easy to follow when heard rather than read
4. Suitable for text-to-speech narration
5. About {target} words long

Rules:
- Keep the core events but change ALL of the wording
- Remove forum jargon such as \"AITA\", \"throwaway\", \"edit:\" or \"tl;dr\"
- Do not include URLs or usernames
- End with a memorable line or a question for the viewer

Story:
---
{story}
---

Reply with the script only, no commentary.";

/// Prompt shared by the LLM backends.
pub fn build_prompt(request: &RewriteRequest) -> String {
    let mut prompt = PROMPT_TEMPLATE
        .replace("{target}", &request.target_word_count.to_string())
        .replace("{story}", request.source.trim());

    if let Some(correction) = request.correction {
        prompt.push_str(&format!(
            "\n\nA previous draft was {} words. The script MUST be between {} and {} words.",
            correction.previous_word_count, correction.min_words, correction.max_words
        ));
    }
    prompt
}
