//! The rewriter adapter.
//!
//! Wraps any [`RewriteBackend`] and enforces, in order:
//! 1. transient backend failures are retried with backoff;
//! 2. output identical or near-identical to the source is rejected;
//! 3. output outside the word-count band gets exactly one corrective retry.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use reelsmith_common::config::RewriterConfig;
use reelsmith_common::error::RewriteError;
use reelsmith_common::{retry_async, RetryPolicy, TokenBucket};
use reelsmith_story_model::ScriptArtifact;

use crate::backend::{LengthCorrection, RewriteBackend, RewriteRequest};
use crate::similarity::ngram_overlap;

/// Script accepted by the adapter, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenScript {
    pub text: String,
    pub word_count: usize,
    pub target_word_count: usize,
    pub backend: String,
    /// Shared n-gram fraction with the source.
    pub overlap: f64,
    pub length_retried: bool,
}

impl RewrittenScript {
    pub fn into_artifact(
        self,
        item_id: impl Into<String>,
        path: PathBuf,
        input_hash: impl Into<String>,
    ) -> ScriptArtifact {
        ScriptArtifact {
            item_id: item_id.into(),
            text: self.text,
            path,
            word_count: self.word_count,
            target_word_count: self.target_word_count,
            backend: self.backend,
            input_hash: input_hash.into(),
            created_at: Utc::now(),
        }
    }
}

pub struct Rewriter {
    backend: Arc<dyn RewriteBackend>,
    retry: RetryPolicy,
    bucket: Arc<TokenBucket>,
    length_tolerance: f64,
    passthrough_threshold: f64,
    ngram_size: usize,
}

impl Rewriter {
    pub fn new(
        backend: Arc<dyn RewriteBackend>,
        config: &RewriterConfig,
        retry: RetryPolicy,
        bucket: Arc<TokenBucket>,
    ) -> Self {
        Self {
            backend,
            retry,
            bucket,
            length_tolerance: config.length_tolerance.clamp(0.0, 1.0),
            passthrough_threshold: config.passthrough_threshold,
            ngram_size: config.ngram_size.max(1),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Inclusive accepted word range for `target`.
    pub fn word_band(&self, target: usize) -> (usize, usize) {
        let target = target as f64;
        let min = (target * (1.0 - self.length_tolerance)).ceil() as usize;
        let max = (target * (1.0 + self.length_tolerance)).floor() as usize;
        (min, max.max(min))
    }

    pub async fn rewrite(
        &self,
        source: &str,
        target_word_count: usize,
    ) -> Result<RewrittenScript, RewriteError> {
        let (min, max) = self.word_band(target_word_count);
        let request = RewriteRequest::new(source, target_word_count);

        let mut text = self.call(&request).await?;
        let mut overlap = self.check_passthrough(source, &text)?;
        let mut word_count = count_words(&text);
        let mut length_retried = false;

        if !(min..=max).contains(&word_count) {
            tracing::warn!(
                backend = self.backend.name(),
                words = word_count,
                min,
                max,
                "Rewrite outside word band, retrying with correction"
            );
            let corrected = request.with_correction(LengthCorrection {
                previous_word_count: word_count,
                min_words: min,
                max_words: max,
            });
            text = self.call(&corrected).await?;
            overlap = self.check_passthrough(source, &text)?;
            word_count = count_words(&text);
            length_retried = true;

            if !(min..=max).contains(&word_count) {
                return Err(RewriteError::Length {
                    actual: word_count,
                    min,
                    max,
                });
            }
        }

        tracing::info!(
            backend = self.backend.name(),
            words = word_count,
            target = target_word_count,
            overlap,
            "Rewrite accepted"
        );
        Ok(RewrittenScript {
            text,
            word_count,
            target_word_count,
            backend: self.backend.name().to_string(),
            overlap,
            length_retried,
        })
    }

    async fn call(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        let text = retry_async(&self.retry, "rewrite", || async move {
            self.bucket.acquire().await;
            self.backend.rewrite(request).await
        })
        .await?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RewriteError::permanent(format!(
                "{} returned an empty script",
                self.backend.name()
            )));
        }
        Ok(text)
    }

    fn check_passthrough(&self, source: &str, output: &str) -> Result<f64, RewriteError> {
        if output.trim() == source.trim() {
            return Err(RewriteError::Passthrough { overlap: 1.0 });
        }
        let overlap = ngram_overlap(source, output, self.ngram_size);
        if overlap > self.passthrough_threshold {
            return Err(RewriteError::Passthrough { overlap });
        }
        Ok(overlap)
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, RewriteError>>>,
        requests: Mutex<Vec<RewriteRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, RewriteError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RewriteBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RewriteError::permanent("no scripted reply")))
        }
    }

    fn words(n: usize, stem: &str) -> String {
        (0..n).map(|i| format!("{stem}{i}")).collect::<Vec<_>>().join(" ")
    }

    fn adapter(backend: Arc<ScriptedBackend>) -> Rewriter {
        Rewriter::new(
            backend,
            &RewriterConfig::default(),
            RetryPolicy::immediate(3),
            Arc::new(TokenBucket::unlimited("rewrite")),
        )
    }

    const SOURCE: &str = "My roommate borrowed my car and came home with a puppy.";

    #[test]
    fn test_word_band() {
        let rewriter = adapter(ScriptedBackend::new(vec![]));
        assert_eq!(rewriter.word_band(200), (140, 260));
        assert_eq!(rewriter.word_band(10), (7, 13));
    }

    #[tokio::test]
    async fn test_exact_passthrough_is_rejected() {
        let backend = ScriptedBackend::new(vec![Ok(SOURCE.to_string())]);
        let err = adapter(backend.clone()).rewrite(SOURCE, 10).await.unwrap_err();
        assert!(matches!(err, RewriteError::Passthrough { overlap } if overlap == 1.0));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_near_passthrough_is_rejected() {
        let source = words(100, "w");
        let mut near = words(100, "w");
        near.push_str(" extra");
        let backend = ScriptedBackend::new(vec![Ok(near)]);
        let err = adapter(backend).rewrite(&source, 100).await.unwrap_err();
        assert!(matches!(err, RewriteError::Passthrough { overlap } if overlap > 0.95));
    }

    #[tokio::test]
    async fn test_length_retry_with_correction() {
        let backend = ScriptedBackend::new(vec![Ok(words(40, "a")), Ok(words(95, "b"))]);
        let script = adapter(backend.clone())
            .rewrite(&words(300, "s"), 100)
            .await
            .unwrap();
        assert!(script.length_retried);
        assert_eq!(script.word_count, 95);

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].correction, None);
        assert_eq!(
            requests[1].correction,
            Some(LengthCorrection {
                previous_word_count: 40,
                min_words: 70,
                max_words: 130,
            })
        );
    }

    #[tokio::test]
    async fn test_length_fails_after_single_retry() {
        let backend = ScriptedBackend::new(vec![Ok(words(40, "a")), Ok(words(200, "b"))]);
        let err = adapter(backend.clone())
            .rewrite(&words(300, "s"), 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RewriteError::Length {
                actual: 200,
                min: 70,
                max: 130
            }
        ));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let backend = ScriptedBackend::new(vec![
            Err(RewriteError::transient("429")),
            Err(RewriteError::transient("timeout")),
            Ok(words(10, "x")),
        ]);
        let script = adapter(backend.clone()).rewrite(SOURCE, 10).await.unwrap();
        assert_eq!(script.word_count, 10);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_immediately() {
        let backend = ScriptedBackend::new(vec![
            Err(RewriteError::permanent("401")),
            Ok(words(10, "x")),
        ]);
        let err = adapter(backend.clone()).rewrite(SOURCE, 10).await.unwrap_err();
        assert!(matches!(err, RewriteError::Permanent { .. }));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_dummy_backend_passes_adapter_rules() {
        let source = "Last week my roommate went out for groceries and came back with a puppy. \
            She said it was a surprise and asked if it could stay in my room because it gets the most sun. \
            I said no because I work from home and I just cannot have a dog in there. \
            She got really upset and our other friend took her side. \
            Now they think I am being a bad friend and the apartment is very quiet.";
        let target = source.split_whitespace().count();
        let rewriter = Rewriter::new(
            Arc::new(crate::DummyRewriter::new().unwrap()),
            &RewriterConfig::default(),
            RetryPolicy::immediate(0),
            Arc::new(TokenBucket::unlimited("rewrite")),
        );
        let script = rewriter.rewrite(source, target).await.unwrap();
        assert_eq!(script.backend, "dummy");
        assert!(script.overlap < 0.95);
        assert!(!script.length_retried);
    }
}
