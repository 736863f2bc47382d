use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use reelsmith_common::config::AppConfig;
use reelsmith_common::error::{
    CompositionError, FetchError, ReelError, RewriteError, SynthesisError,
};
use reelsmith_content_source::{AccessMode, ContentSource, FetchQuery};
use reelsmith_pipeline::{Backends, BatchRequest, Orchestrator, RateLimits, RunContext};
use reelsmith_render_engine::{ComposeJob, Composer, ProgressCallback, RenderedVideo};
use reelsmith_rewriter::{RewriteBackend, RewriteRequest, Rewriter};
use reelsmith_speech::{SpeechBackend, SpeechOutput, SpeechSynthesizer, Voice};
use reelsmith_story_model::{CandidateItem, ItemState, RejectReason, Stage};

const BODY: &str = "I borrowed my neighbour's ladder last spring and forgot to return it \
                    until the snow came back.";

fn temp_root(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "reelsmith_pipeline_{name}_{}",
        std::process::id()
    ));
    std::fs::remove_dir_all(&root).ok();
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn test_config(root: &Path) -> AppConfig {
    let background = root.join("background.mp4");
    std::fs::write(&background, b"not really a video").unwrap();

    let mut config = AppConfig::default();
    config.source.categories = vec!["tifu".to_string()];
    config.filter.min_chars = 40;
    config.video.background = background;
    config.pipeline.output_dir = root.join("output");
    config.pipeline.max_retries = 0;
    config
}

fn item(id: &str, body: &str) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        category: "tifu".to_string(),
        title: format!("Story {id}"),
        body: body.to_string(),
        author: "someone".to_string(),
        url: format!("https://example.com/{id}"),
        score: 10,
        num_comments: 2,
        nsfw: false,
        created_utc: 1_700_000_000.0,
    }
}

/// Calls currently inside a fake, and the most seen at once.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Calls {
    fetch: AtomicUsize,
    rewrite: AtomicUsize,
    synthesize: AtomicUsize,
    compose: AtomicUsize,
    in_rewrite: Gauge,
    in_synthesize: Gauge,
    in_compose: Gauge,
    /// How long each rewrite, synthesis and compose call takes.
    latency_ms: AtomicU64,
}

impl Calls {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn with_latency(ms: u64) -> Arc<Self> {
        let calls = Self::default();
        calls.latency_ms.store(ms, Ordering::SeqCst);
        Arc::new(calls)
    }

    async fn work(&self, gauge: &Gauge) {
        gauge.enter();
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        gauge.leave();
    }
}

struct FakeSource {
    items: Vec<CandidateItem>,
    auth_failure: bool,
    calls: Arc<Calls>,
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<CandidateItem>, FetchError> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        if self.auth_failure {
            return Err(FetchError::Auth {
                provider: "fake".into(),
                message: "bad credentials".into(),
            });
        }
        Ok(self.items.iter().take(query.limit).cloned().collect())
    }

    async fn fetch_by_id(&self, id: &str) -> Result<CandidateItem, FetchError> {
        self.items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { id: id.to_string() })
    }

    async fn test_connection(&self) -> Result<AccessMode, FetchError> {
        Ok(AccessMode::Public)
    }
}

/// Answers with exactly the requested number of fresh words. Sources
/// containing `ECHO` are returned verbatim, `BROKEN` fails permanently.
struct FakeRewriter {
    calls: Arc<Calls>,
    cancel_on_call: Option<CancellationToken>,
}

#[async_trait]
impl RewriteBackend for FakeRewriter {
    fn name(&self) -> &str {
        "fake-rewriter"
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        self.calls.rewrite.fetch_add(1, Ordering::SeqCst);
        self.calls.work(&self.calls.in_rewrite).await;
        if let Some(cancel) = &self.cancel_on_call {
            cancel.cancel();
        }
        if request.source.contains("ECHO") {
            return Ok(request.source.clone());
        }
        if request.source.contains("BROKEN") {
            return Err(RewriteError::permanent("model refused"));
        }
        let words: Vec<String> = (0..request.target_word_count)
            .map(|i| format!("narration{i}"))
            .collect();
        Ok(format!("{}.", words.join(" ")))
    }
}

fn wav_bytes(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..(seconds * 8000.0) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

struct FakeSpeech {
    calls: Arc<Calls>,
}

#[async_trait]
impl SpeechBackend for FakeSpeech {
    fn name(&self) -> &str {
        "fake-speech"
    }

    async fn synthesize(&self, _text: &str) -> Result<SpeechOutput, SynthesisError> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        self.calls.work(&self.calls.in_synthesize).await;
        Ok(SpeechOutput {
            audio: wav_bytes(1.5),
            extension: "wav".to_string(),
            timing: None,
        })
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        Ok(Vec::new())
    }
}

/// Writes a placeholder file. Panics for items whose id contains `panic`.
struct FakeComposer {
    calls: Arc<Calls>,
}

#[async_trait]
impl Composer for FakeComposer {
    fn name(&self) -> &str {
        "fake-composer"
    }

    async fn compose(
        &self,
        job: ComposeJob,
        _progress: Option<ProgressCallback>,
    ) -> Result<RenderedVideo, CompositionError> {
        self.calls.compose.fetch_add(1, Ordering::SeqCst);
        if job.output_path.to_string_lossy().contains("panic") {
            panic!("encoder crashed on {}", job.output_path.display());
        }
        self.calls.work(&self.calls.in_compose).await;
        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&job.output_path, b"mp4").unwrap();
        Ok(RenderedVideo {
            path: job.output_path.clone(),
            duration_secs: job.audio_duration_secs,
            width: job.video.width,
            height: job.video.height,
        })
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    calls: Arc<Calls>,
}

fn harness(config: AppConfig, items: Vec<CandidateItem>, calls: Arc<Calls>) -> Harness {
    build(config, items, calls, false, false)
}

fn build(
    config: AppConfig,
    items: Vec<CandidateItem>,
    calls: Arc<Calls>,
    auth_failure: bool,
    cancel_on_rewrite: bool,
) -> Harness {
    let ctx = Arc::new(RunContext::with_limits(config, RateLimits::unlimited()).unwrap());
    let cancel_on_call = cancel_on_rewrite.then(|| ctx.cancel.clone());

    let rewriter = Rewriter::new(
        Arc::new(FakeRewriter {
            calls: Arc::clone(&calls),
            cancel_on_call,
        }),
        &ctx.config.rewriter,
        ctx.retry.clone(),
        Arc::clone(&ctx.limits.rewrite),
    );
    let synthesizer = SpeechSynthesizer::new(
        Arc::new(FakeSpeech {
            calls: Arc::clone(&calls),
        }),
        ctx.retry.clone(),
        Arc::clone(&ctx.limits.tts),
    );
    let backends = Backends {
        source: Arc::new(FakeSource {
            items,
            auth_failure,
            calls: Arc::clone(&calls),
        }),
        rewriter: Arc::new(rewriter),
        synthesizer: Arc::new(synthesizer),
        composer: Arc::new(FakeComposer {
            calls: Arc::clone(&calls),
        }),
    };

    Harness {
        orchestrator: Arc::new(Orchestrator::new(ctx, backends)),
        calls,
    }
}

#[tokio::test]
async fn test_batch_produces_every_artifact() {
    let root = temp_root("full");
    let config = test_config(&root);
    let h = harness(config, vec![item("a1", BODY), item("a2", BODY)], Arc::default());

    let summary = h.orchestrator.run_batch(BatchRequest::new(2)).await.unwrap();

    assert_eq!(summary.done_count(), 2);
    assert!(summary.succeeded());
    assert!(!summary.cancelled);
    let layout = h.orchestrator.context().store.layout().clone();
    for id in ["a1", "a2"] {
        assert!(layout.script_path(id).is_file());
        assert!(layout.subtitle_path(id).is_file());
        assert!(layout.video_path(id).is_file());
    }
    assert_eq!(Calls::get(&h.calls.rewrite), 2);
    assert_eq!(Calls::get(&h.calls.synthesize), 2);
    assert_eq!(Calls::get(&h.calls.compose), 2);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_rerun_reuses_every_stage() {
    let root = temp_root("resume");
    let config = test_config(&root);
    let calls: Arc<Calls> = Arc::default();

    let first = harness(config.clone(), vec![item("r1", BODY)], Arc::clone(&calls));
    let summary = first.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();
    assert_eq!(summary.done_count(), 1);
    assert!(summary.outcomes[0].reused.is_empty());

    let second = harness(config, vec![item("r1", BODY)], Arc::clone(&calls));
    let summary = second.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();

    assert_eq!(summary.done_count(), 1);
    assert_eq!(
        summary.outcomes[0].reused,
        vec![Stage::Rewrite, Stage::Synthesize, Stage::Subtitle, Stage::Compose]
    );
    assert_eq!(Calls::get(&calls.rewrite), 1);
    assert_eq!(Calls::get(&calls.synthesize), 1);
    assert_eq!(Calls::get(&calls.compose), 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_corrupt_subtitles_are_rebuilt_on_resume() {
    let root = temp_root("bad_srt");
    let config = test_config(&root);
    let calls: Arc<Calls> = Arc::default();

    let first = harness(config.clone(), vec![item("s1", BODY)], Arc::clone(&calls));
    first.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();
    let srt = first.orchestrator.context().store.layout().subtitle_path("s1");
    std::fs::write(&srt, "garbage").unwrap();

    let second = harness(config, vec![item("s1", BODY)], Arc::clone(&calls));
    let summary = second.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();

    assert_eq!(summary.done_count(), 1);
    // Same script and audio rebuild the same track, so the video still matches.
    assert_eq!(
        summary.outcomes[0].reused,
        vec![Stage::Rewrite, Stage::Synthesize, Stage::Compose]
    );
    assert!(std::fs::read_to_string(&srt).unwrap().starts_with("1\n"));
    assert_eq!(Calls::get(&calls.compose), 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_batch() {
    let root = temp_root("failure");
    let config = test_config(&root);
    let broken = format!("{BODY} BROKEN");
    let h = harness(
        config,
        vec![item("ok1", BODY), item("bad", &broken), item("ok2", BODY)],
        Arc::default(),
    );

    let summary = h.orchestrator.run_batch(BatchRequest::new(3)).await.unwrap();

    assert_eq!(summary.done_count(), 2);
    assert!(summary.succeeded());
    let failed = summary.outcomes.iter().find(|o| o.item_id == "bad").unwrap();
    assert!(matches!(failed.state, ItemState::Failed { stage: Stage::Rewrite, .. }));
    assert_eq!(failed.status(), "failed(rewrite)");
    assert!(failed.detail().contains("model refused"));
    assert_eq!(Calls::get(&h.calls.synthesize), 2);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_filtered_items_are_reported() {
    let root = temp_root("filtered");
    let config = test_config(&root);
    let mut adult = item("nsfw", BODY);
    adult.nsfw = true;
    let h = harness(
        config,
        vec![item("short", "too short"), adult, item("keep", BODY)],
        Arc::default(),
    );

    let summary = h.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();

    assert_eq!(summary.done_count(), 1);
    let reasons: Vec<(String, ItemState)> = summary
        .outcomes
        .iter()
        .map(|o| (o.item_id.clone(), o.state.clone()))
        .collect();
    assert!(reasons.contains(&(
        "short".to_string(),
        ItemState::Rejected {
            reason: RejectReason::TooShort
        }
    )));
    assert!(reasons.contains(&(
        "nsfw".to_string(),
        ItemState::Rejected {
            reason: RejectReason::NsfwBlocked
        }
    )));
    assert_eq!(Calls::get(&h.calls.rewrite), 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_passthrough_rewrite_writes_no_script() {
    let root = temp_root("passthrough");
    let config = test_config(&root);
    let echo = format!("{BODY} ECHO");
    let h = harness(config, vec![item("echo", &echo)], Arc::default());

    let summary = h.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();

    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status(), "failed(rewrite)");
    let layout = h.orchestrator.context().store.layout().clone();
    assert!(!layout.script_path("echo").exists());
    assert_eq!(Calls::get(&h.calls.synthesize), 0);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_cancellation_stops_scheduling() {
    let root = temp_root("cancel");
    let mut config = test_config(&root);
    config.pipeline.max_concurrent_items = 1;
    let h = build(
        config,
        vec![item("c1", BODY), item("c2", BODY), item("c3", BODY)],
        Arc::default(),
        false,
        true,
    );

    let summary = h.orchestrator.run_batch(BatchRequest::new(3)).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.done_count(), 0);
    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(
        summary.outcomes[0].state,
        ItemState::Cancelled {
            stage: Stage::Synthesize
        }
    );
    for outcome in &summary.outcomes[1..] {
        assert_eq!(outcome.status(), "cancelled(filter)");
    }
    assert_eq!(Calls::get(&h.calls.rewrite), 1);
    assert_eq!(Calls::get(&h.calls.synthesize), 0);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_auth_failure_ends_the_run() {
    let root = temp_root("auth");
    let config = test_config(&root);
    let h = build(config, vec![item("x", BODY)], Arc::default(), true, false);

    let err = h.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, ReelError::Fetch(FetchError::Auth { .. })));
    assert_eq!(Calls::get(&h.calls.rewrite), 0);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_missing_background_is_a_config_error() {
    let root = temp_root("no_bg");
    let mut config = test_config(&root);
    config.video.background = root.join("missing.mp4");
    let h = harness(config, vec![item("x", BODY)], Arc::default());

    let err = h.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap_err();

    assert!(matches!(err, ReelError::Config { .. }));
    assert_eq!(Calls::get(&h.calls.fetch), 0);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_rewrite_only_persists_a_reusable_script() {
    let root = temp_root("rewrite_only");
    let config = test_config(&root);
    let calls: Arc<Calls> = Arc::default();
    let h = harness(config, vec![item("w1", BODY)], Arc::clone(&calls));

    let script = h.orchestrator.rewrite_only("w1").await.unwrap();
    assert!(script.path.is_file());
    // Title and body together are shorter than the default target.
    let source_words = item("w1", BODY).source_text().split_whitespace().count();
    assert_eq!(script.word_count, source_words);

    let summary = h.orchestrator.run_batch(BatchRequest::new(1)).await.unwrap();
    assert_eq!(summary.outcomes[0].reused, vec![Stage::Rewrite]);
    assert_eq!(Calls::get(&calls.rewrite), 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_panicking_item_is_reported_failed() {
    let root = temp_root("panic");
    let config = test_config(&root);
    let h = harness(
        config,
        vec![item("panic1", BODY), item("calm1", BODY)],
        Arc::default(),
    );

    let summary = h.orchestrator.run_batch(BatchRequest::new(2)).await.unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.counts().get("failed"), Some(&1));
    assert_eq!(summary.counts().get("done"), Some(&1));
    let crashed = &summary.outcomes[0];
    assert_eq!(crashed.item_id, "panic1");
    assert_eq!(crashed.title, "Story panic1");
    assert_eq!(crashed.status(), "failed(compose)");
    assert!(crashed.detail().contains("panicked"));
    // The encode slot held by the crashed task was released.
    assert_eq!(summary.outcomes[1].status(), "done");

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_items_overlap_but_encodes_do_not() {
    let root = temp_root("overlap");
    let mut config = test_config(&root);
    config.pipeline.max_concurrent_items = 4;
    config.pipeline.network_concurrency = 4;
    config.pipeline.encode_concurrency = 1;
    let calls = Calls::with_latency(40);
    let items = (0..4).map(|i| item(&format!("o{i}"), BODY)).collect();
    let h = harness(config, items, Arc::clone(&calls));

    let summary = h.orchestrator.run_batch(BatchRequest::new(4)).await.unwrap();

    assert_eq!(summary.done_count(), 4);
    assert!(calls.in_rewrite.peak() > 1);
    assert!(calls.in_synthesize.peak() > 1);
    assert_eq!(calls.in_compose.peak(), 1);
    assert_eq!(Calls::get(&calls.compose), 4);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_item_limit_caps_parallel_work() {
    let root = temp_root("item_cap");
    let mut config = test_config(&root);
    config.pipeline.max_concurrent_items = 2;
    config.pipeline.network_concurrency = 8;
    config.pipeline.encode_concurrency = 4;
    let calls = Calls::with_latency(40);
    let items = (0..5).map(|i| item(&format!("m{i}"), BODY)).collect();
    let h = harness(config, items, Arc::clone(&calls));

    let summary = h.orchestrator.run_batch(BatchRequest::new(5)).await.unwrap();

    assert_eq!(summary.done_count(), 5);
    assert_eq!(calls.in_rewrite.peak(), 2);
    assert!(calls.in_compose.peak() <= 2);

    std::fs::remove_dir_all(&root).ok();
}
