//! Pipeline orchestrator.
//!
//! Sequences fetch → filter → rewrite → synthesize → subtitle → compose for
//! each item. Every persisted stage first looks for a stored artifact with a
//! matching input hash and reuses it; otherwise it runs and writes its
//! artifact before the next stage starts. A failing stage marks only its own
//! item failed. Fetch authentication failures and configuration errors end
//! the whole run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{self, JoinSet};

use reelsmith_common::config::AppConfig;
use reelsmith_common::error::{FetchError, ReelError, ReelResult};
use reelsmith_content_source::{
    AccessMode, ContentSource, FetchQuery, RedditClient, SortMode, TimeFilter,
};
use reelsmith_processing_core::{StoryFilter, SubtitleBuilder, TimingSource};
use reelsmith_render_engine::{ComposeJob, Composer, ProgressCallback, VideoComposer};
use reelsmith_rewriter::{RewrittenScript, Rewriter};
use reelsmith_speech::{parse_srt, save_subtitles, SpeechSynthesizer};
use reelsmith_story_model::{
    AudioArtifact, CandidateItem, ItemState, ItemTracker, RejectReason, ScriptArtifact, Stage,
    SubtitleArtifact, VideoArtifact,
};

use crate::context::RunContext;
use crate::hashes::{compose_hash, rewrite_hash, subtitle_hash, synthesize_hash};
use crate::summary::{BatchSummary, ItemOutcome};

/// Slack when re-validating a stored subtitle track against its audio.
const TRACK_EPSILON_SECS: f64 = 1e-3;

/// Listing pages never request fewer than this many posts.
const MIN_FETCH: usize = 10;

/// Capability providers the orchestrator drives.
pub struct Backends {
    pub source: Arc<dyn ContentSource>,
    pub rewriter: Arc<Rewriter>,
    pub synthesizer: Arc<SpeechSynthesizer>,
    pub composer: Arc<dyn Composer>,
}

impl Backends {
    /// Production backends selected by configuration.
    pub fn from_context(ctx: &RunContext) -> ReelResult<Self> {
        let config = &ctx.config;
        let source = RedditClient::new(
            &config.source,
            ctx.retry.clone(),
            Arc::clone(&ctx.limits.source),
        )?;
        let rewrite_backend = reelsmith_rewriter::build_backend(&config.rewriter)?;
        let speech_backend = reelsmith_speech::build_backend(&config.tts)?;

        Ok(Self {
            source: Arc::new(source),
            rewriter: Arc::new(Rewriter::new(
                rewrite_backend,
                &config.rewriter,
                ctx.retry.clone(),
                Arc::clone(&ctx.limits.rewrite),
            )),
            synthesizer: Arc::new(SpeechSynthesizer::new(
                speech_backend,
                ctx.retry.clone(),
                Arc::clone(&ctx.limits.tts),
            )),
            composer: Arc::new(VideoComposer::ffmpeg()),
        })
    }
}

/// What a batch run should fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub limit: usize,
    /// Categories tried in order; empty means the configured list.
    pub categories: Vec<String>,
    pub sort: Option<SortMode>,
    pub time_filter: Option<TimeFilter>,
}

impl BatchRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            categories: Vec::new(),
            sort: None,
            time_filter: None,
        }
    }
}

/// What a single-item run should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleTarget {
    Id(String),
    Category(String),
}

/// Candidates left after filtering, plus the items the filter turned away.
#[derive(Debug, Default)]
pub struct Candidates {
    pub accepted: Vec<CandidateItem>,
    pub rejected: Vec<(CandidateItem, RejectReason)>,
}

/// Why an item stopped before `Done`.
enum Halt {
    Failed(Stage, ReelError),
    Cancelled(Stage),
}

type StageResult<T> = Result<T, Halt>;

/// An item whose task is still running in `process_all`.
struct Running {
    index: usize,
    item_id: String,
    title: String,
    /// Stage the item last entered; read if the task panics.
    stage: watch::Receiver<Stage>,
}

pub struct Orchestrator {
    ctx: Arc<RunContext>,
    backends: Backends,
    filter: StoryFilter,
    subtitles: SubtitleBuilder,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RunContext>, backends: Backends) -> Self {
        let filter = StoryFilter::new(ctx.config.filter.clone());
        let subtitles = SubtitleBuilder::new(&ctx.config.subtitles, ctx.config.tts.speech_rate_wpm);
        tracing::info!(
            source = backends.source.name(),
            rewriter = backends.rewriter.backend_name(),
            speech = backends.synthesizer.backend_name(),
            composer = backends.composer.name(),
            "Orchestrator ready"
        );
        Self {
            ctx,
            backends,
            filter,
            subtitles,
        }
    }

    /// Orchestrator over the production backends.
    pub fn from_context(ctx: Arc<RunContext>) -> ReelResult<Self> {
        let backends = Backends::from_context(&ctx)?;
        Ok(Self::new(ctx, backends))
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    fn config(&self) -> &AppConfig {
        &self.ctx.config
    }

    pub async fn test_connection(&self) -> ReelResult<AccessMode> {
        Ok(self.backends.source.test_connection().await?)
    }

    /// Fetch candidates category by category until `limit` pass the filter.
    ///
    /// Each category is asked for `fetch_multiplier × limit` items. A failed
    /// category is skipped unless the failure is fatal or nothing was found
    /// anywhere.
    pub async fn collect_candidates(&self, request: &BatchRequest) -> ReelResult<Candidates> {
        let source_config = &self.config().source;
        let categories = if request.categories.is_empty() {
            source_config.categories.clone()
        } else {
            request.categories.clone()
        };
        let per_category = (request.limit * source_config.fetch_multiplier.max(1)).max(MIN_FETCH);

        let mut candidates = Candidates::default();
        let mut seen = HashSet::new();
        let mut last_error: Option<FetchError> = None;

        for category in &categories {
            if candidates.accepted.len() >= request.limit || self.ctx.is_cancelled() {
                break;
            }

            let mut query = FetchQuery::from_config(source_config, category.as_str(), per_category);
            if let Some(sort) = request.sort {
                query = query.with_sort(sort);
            }
            if let Some(time_filter) = request.time_filter {
                query = query.with_time_filter(time_filter);
            }

            let items = match self.fetch_with_slot(&query).await {
                Ok(items) => items,
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        category = %category,
                        error = %err,
                        "Fetch failed, trying next category"
                    );
                    last_error = Some(err);
                    continue;
                }
            };

            let fresh: Vec<CandidateItem> = items
                .into_iter()
                .filter(|item| seen.insert(item.id.clone()))
                .collect();
            tracing::info!(category = %category, fetched = fresh.len(), "Fetched candidates");

            let outcome = self.filter.partition(fresh);
            let room = request.limit - candidates.accepted.len();
            candidates
                .accepted
                .extend(outcome.accepted.into_iter().take(room));
            candidates.rejected.extend(outcome.rejected);
        }

        if candidates.accepted.is_empty() && candidates.rejected.is_empty() {
            if let Some(err) = last_error {
                return Err(err.into());
            }
        }
        Ok(candidates)
    }

    async fn fetch_with_slot(&self, query: &FetchQuery) -> Result<Vec<CandidateItem>, FetchError> {
        let Some(_slot) = self.ctx.network_slot().await else {
            return Ok(Vec::new());
        };
        self.backends.source.fetch(query).await
    }

    /// Fetch, filter, and process up to `request.limit` items concurrently.
    pub async fn run_batch(self: &Arc<Self>, request: BatchRequest) -> ReelResult<BatchSummary> {
        self.config().validate_for_render()?;
        tracing::info!(limit = request.limit, categories = ?request.categories, "Starting batch");

        let candidates = self.collect_candidates(&request).await?;
        let mut summary = BatchSummary::default();
        for (item, reason) in candidates.rejected {
            summary.push(rejected_outcome(&item, reason));
        }

        let processed = self.process_all(candidates.accepted).await;
        summary.outcomes.extend(processed);
        summary.cancelled = self.ctx.is_cancelled();

        tracing::info!(
            items = summary.outcomes.len(),
            done = summary.done_count(),
            cancelled = summary.cancelled,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Process items with at most `max_concurrent_items` in flight.
    ///
    /// Once cancelled, items not yet started are reported `cancelled`. An item
    /// whose task panics is reported failed at the stage it last entered.
    async fn process_all(self: &Arc<Self>, items: Vec<CandidateItem>) -> Vec<ItemOutcome> {
        let mut slots: Vec<Option<ItemOutcome>> = vec![None; items.len()];
        let mut tasks = JoinSet::new();
        let mut running: HashMap<task::Id, Running> = HashMap::new();
        let mut pending = items.into_iter().enumerate();

        for (index, item) in pending.by_ref() {
            let Some(slot) = self.ctx.item_slot().await else {
                slots[index] = Some(not_started(&item));
                break;
            };
            let (stage_tx, stage_rx) = watch::channel(Stage::Filter);
            let entry = Running {
                index,
                item_id: item.id.clone(),
                title: item.title.clone(),
                stage: stage_rx,
            };
            let this = Arc::clone(self);
            let handle = tasks.spawn(async move {
                let _slot = slot;
                this.drive_item(item, &stage_tx).await
            });
            running.insert(handle.id(), entry);
        }
        for (index, item) in pending {
            slots[index] = Some(not_started(&item));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, outcome)) => (id, Ok(outcome)),
                Err(err) => (err.id(), Err(err)),
            };
            let Some(entry) = running.remove(&id) else {
                tracing::error!(task = %id, "Finished task has no item");
                continue;
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    let stage = *entry.stage.borrow();
                    tracing::error!(
                        item_id = %entry.item_id,
                        %stage,
                        error = %err,
                        "Item task panicked"
                    );
                    panicked(&entry, stage, &err)
                }
            };
            slots[entry.index] = Some(outcome);
        }
        slots.into_iter().flatten().collect()
    }

    /// Run one item by id, or the first item in a category that passes the filter.
    pub async fn run_single(self: &Arc<Self>, target: SingleTarget) -> ReelResult<BatchSummary> {
        self.config().validate_for_render()?;

        let mut summary = BatchSummary::default();
        let item = match target {
            SingleTarget::Id(id) => {
                let _slot = self.ctx.network_slot().await.ok_or(ReelError::Cancelled)?;
                self.backends.source.fetch_by_id(&id).await?
            }
            SingleTarget::Category(category) => {
                let request = BatchRequest {
                    categories: vec![category],
                    ..BatchRequest::new(1)
                };
                let candidates = self.collect_candidates(&request).await?;
                match candidates.accepted.into_iter().next() {
                    Some(item) => item,
                    None => {
                        for (item, reason) in candidates.rejected {
                            summary.push(rejected_outcome(&item, reason));
                        }
                        tracing::warn!("No item in the category passed the filter");
                        return Ok(summary);
                    }
                }
            }
        };

        let outcome = self.process_item(item).await;
        summary.push(outcome);
        summary.cancelled = self.ctx.is_cancelled();
        Ok(summary)
    }

    /// Fetch one item and stop after the rewrite stage.
    ///
    /// The script is persisted like any other rewrite so a later full run
    /// reuses it.
    pub async fn rewrite_only(&self, id: &str) -> ReelResult<ScriptArtifact> {
        let item = {
            let _slot = self.ctx.network_slot().await.ok_or(ReelError::Cancelled)?;
            self.backends.source.fetch_by_id(id).await?
        };
        if let Some(reason) = self.filter.decide(&item).reason() {
            tracing::warn!(
                item_id = %item.id,
                %reason,
                "Item would be filtered out; rewriting anyway"
            );
        }
        match self.rewrite_stage(&item).await {
            Ok((script, _)) => Ok(script),
            Err(Halt::Cancelled(_)) => Err(ReelError::Cancelled),
            Err(Halt::Failed(_, err)) => Err(err),
        }
    }

    /// Drive one item to a terminal state. Never fails; failures are recorded.
    pub async fn process_item(&self, item: CandidateItem) -> ItemOutcome {
        let (stage_tx, _) = watch::channel(Stage::Filter);
        self.drive_item(item, &stage_tx).await
    }

    async fn drive_item(
        &self,
        item: CandidateItem,
        stage_tx: &watch::Sender<Stage>,
    ) -> ItemOutcome {
        let started = Instant::now();
        let mut tracker = ItemTracker::fetched(&item.id);
        tracing::info!(item_id = %item.id, category = %item.category, "Processing item");

        if let Some(reason) = self.filter.decide(&item).reason() {
            record(&mut tracker, ItemState::Rejected { reason });
            tracing::info!(item_id = %item.id, %reason, "Item filtered out");
            return ItemOutcome::from_tracker(&tracker, &item.title, None, started.elapsed());
        }
        record_stage(&mut tracker, Stage::Filter, false);

        let video = match self.run_stages(&item, &mut tracker, stage_tx).await {
            Ok(video) => {
                record(&mut tracker, ItemState::Done);
                tracing::info!(
                    item_id = %item.id,
                    video = %video.path.display(),
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Item done"
                );
                Some(video.path)
            }
            Err(Halt::Cancelled(stage)) => {
                record(&mut tracker, ItemState::Cancelled { stage });
                tracing::warn!(item_id = %item.id, %stage, "Item cancelled");
                None
            }
            Err(Halt::Failed(stage, err)) => {
                tracing::error!(item_id = %item.id, %stage, error = %err, "Item failed");
                record(
                    &mut tracker,
                    ItemState::Failed {
                        stage,
                        error: err.to_string(),
                    },
                );
                None
            }
        };

        ItemOutcome::from_tracker(&tracker, &item.title, video, started.elapsed())
    }

    async fn run_stages(
        &self,
        item: &CandidateItem,
        tracker: &mut ItemTracker,
        stage_tx: &watch::Sender<Stage>,
    ) -> StageResult<VideoArtifact> {
        self.checkpoint(Stage::Rewrite, stage_tx)?;
        let (script, reused) = self.rewrite_stage(item).await?;
        record_stage(tracker, Stage::Rewrite, reused);

        self.checkpoint(Stage::Synthesize, stage_tx)?;
        let (audio, reused) = self.synthesize_stage(&script).await?;
        record_stage(tracker, Stage::Synthesize, reused);

        self.checkpoint(Stage::Subtitle, stage_tx)?;
        let (subtitles, reused) = self.subtitle_stage(&script, &audio)?;
        record_stage(tracker, Stage::Subtitle, reused);

        self.checkpoint(Stage::Compose, stage_tx)?;
        let (video, reused) = self.compose_stage(&audio, &subtitles).await?;
        record_stage(tracker, Stage::Compose, reused);

        Ok(video)
    }

    /// Stop before `next` if cancelled; otherwise mark it as entered.
    fn checkpoint(&self, next: Stage, stage_tx: &watch::Sender<Stage>) -> StageResult<()> {
        stage_tx.send_replace(next);
        if self.ctx.is_cancelled() {
            Err(Halt::Cancelled(next))
        } else {
            Ok(())
        }
    }

    /// Word target for an item: the configured target, capped at the source length.
    fn target_words(&self, item: &CandidateItem) -> usize {
        let source_words = item.source_text().split_whitespace().count();
        self.config()
            .rewriter
            .target_word_count
            .min(source_words)
            .max(1)
    }

    async fn rewrite_stage(&self, item: &CandidateItem) -> StageResult<(ScriptArtifact, bool)> {
        let stage = Stage::Rewrite;
        let target = self.target_words(item);
        let hash = rewrite_hash(item, target, self.backends.rewriter.backend_name());
        if let Some(script) = self.ctx.store.load_valid::<ScriptArtifact>(&item.id, &hash) {
            tracing::info!(item_id = %item.id, "Reusing stored script");
            return Ok((script, true));
        }

        let rewritten: RewrittenScript = {
            let _slot = self.ctx.network_slot().await.ok_or(Halt::Cancelled(stage))?;
            self.backends
                .rewriter
                .rewrite(&item.source_text(), target)
                .await
                .map_err(|e| Halt::Failed(stage, e.into()))?
        };
        tracing::info!(
            item_id = %item.id,
            words = rewritten.word_count,
            target,
            overlap = rewritten.overlap,
            length_retried = rewritten.length_retried,
            "Script rewritten"
        );

        let path = self.ctx.store.layout().script_path(&item.id);
        let script = rewritten.into_artifact(item.id.as_str(), path, hash);
        self.ctx
            .store
            .save(&script, script.text.as_bytes())
            .map_err(|e| Halt::Failed(stage, ReelError::store(e.to_string())))?;
        Ok((script, false))
    }

    async fn synthesize_stage(
        &self,
        script: &ScriptArtifact,
    ) -> StageResult<(AudioArtifact, bool)> {
        let stage = Stage::Synthesize;
        let item_id = script.item_id.as_str();
        let hash = synthesize_hash(
            script,
            &self.config().tts,
            self.backends.synthesizer.backend_name(),
        );
        if let Some(audio) = self.ctx.store.load_valid::<AudioArtifact>(item_id, &hash) {
            tracing::info!(
                item_id,
                duration_secs = audio.duration_secs,
                "Reusing stored narration"
            );
            return Ok((audio, true));
        }

        let stem = self.ctx.store.layout().audio_stem(item_id);
        let synthesized = {
            let _slot = self.ctx.network_slot().await.ok_or(Halt::Cancelled(stage))?;
            self.backends
                .synthesizer
                .synthesize(&script.text, &stem)
                .await
                .map_err(|e| Halt::Failed(stage, e.into()))?
        };

        let audio = synthesized.into_artifact(item_id, hash);
        self.ctx
            .store
            .save_manifest(&audio)
            .map_err(|e| Halt::Failed(stage, ReelError::store(e.to_string())))?;
        Ok((audio, false))
    }

    fn subtitle_stage(
        &self,
        script: &ScriptArtifact,
        audio: &AudioArtifact,
    ) -> StageResult<(SubtitleArtifact, bool)> {
        let stage = Stage::Subtitle;
        let item_id = script.item_id.as_str();
        let hash = subtitle_hash(
            script,
            audio,
            &self.config().subtitles,
            self.config().tts.speech_rate_wpm,
        );
        if let Some(stored) = self.ctx.store.load_valid::<SubtitleArtifact>(item_id, &hash) {
            if stored_track_is_valid(&stored, audio.duration_secs) {
                tracing::info!(item_id, cues = stored.cue_count, "Reusing stored subtitles");
                return Ok((stored, true));
            }
            tracing::warn!(
                item_id,
                path = %stored.path.display(),
                "Stored subtitles are invalid, rebuilding"
            );
        }

        let (track, source) = self
            .subtitles
            .build_with_source(&script.text, audio.duration_secs, audio.timing.as_ref())
            .map_err(|e| Halt::Failed(stage, e.into()))?;

        let path = self.ctx.store.layout().subtitle_path(item_id);
        save_subtitles(&track, &path)
            .map_err(|e| Halt::Failed(stage, ReelError::store(e.to_string())))?;

        let artifact = SubtitleArtifact {
            item_id: item_id.to_string(),
            path,
            cue_count: track.len(),
            timed_from_words: source == TimingSource::WordOffsets,
            input_hash: hash,
            created_at: Utc::now(),
        };
        self.ctx
            .store
            .save_manifest(&artifact)
            .map_err(|e| Halt::Failed(stage, ReelError::store(e.to_string())))?;
        tracing::info!(item_id, cues = artifact.cue_count, source = ?source, "Subtitles written");
        Ok((artifact, false))
    }

    async fn compose_stage(
        &self,
        audio: &AudioArtifact,
        subtitles: &SubtitleArtifact,
    ) -> StageResult<(VideoArtifact, bool)> {
        let stage = Stage::Compose;
        let item_id = audio.item_id.as_str();
        let config = self.config();
        let hash = compose_hash(audio, subtitles, &config.video, &config.subtitles);
        if let Some(video) = self.ctx.store.load_valid::<VideoArtifact>(item_id, &hash) {
            tracing::info!(item_id, path = %video.path.display(), "Reusing stored video");
            return Ok((video, true));
        }

        let output = self.ctx.store.layout().video_path(item_id);
        let job = ComposeJob::new(audio, subtitles, output, &config.video, &config.subtitles);
        let progress = progress_logger(item_id);

        let rendered = {
            let _slot = self.ctx.encode_slot().await.ok_or(Halt::Cancelled(stage))?;
            self.backends
                .composer
                .compose(job, Some(progress))
                .await
                .map_err(|e| Halt::Failed(stage, e.into()))?
        };

        let video = rendered.into_artifact(item_id, hash);
        self.ctx
            .store
            .save_manifest(&video)
            .map_err(|e| Halt::Failed(stage, ReelError::store(e.to_string())))?;
        Ok((video, false))
    }
}

fn stored_track_is_valid(stored: &SubtitleArtifact, duration_secs: f64) -> bool {
    let Ok(content) = std::fs::read_to_string(&stored.path) else {
        return false;
    };
    match parse_srt(&content) {
        Ok(track) => {
            !track.is_empty()
                && track.len() == stored.cue_count
                && track.validate(duration_secs, TRACK_EPSILON_SECS).is_ok()
        }
        Err(err) => {
            tracing::debug!(error = %err, "Stored subtitles do not parse");
            false
        }
    }
}

fn progress_logger(item_id: &str) -> ProgressCallback {
    let item_id = item_id.to_string();
    Arc::new(move |report| {
        tracing::debug!(
            item_id = %item_id,
            stage = ?report.stage,
            progress = report.progress,
            eta_secs = report.eta_secs,
            "Encoding progress"
        );
    })
}

fn record(tracker: &mut ItemTracker, next: ItemState) {
    if let Err(err) = tracker.transition(next) {
        tracing::error!(error = %err, "Rejected state transition");
    }
}

fn record_stage(tracker: &mut ItemTracker, stage: Stage, reused: bool) {
    if let Err(err) = tracker.complete(stage, reused) {
        tracing::error!(error = %err, "Rejected state transition");
    }
}

fn rejected_outcome(item: &CandidateItem, reason: RejectReason) -> ItemOutcome {
    let mut tracker = ItemTracker::fetched(&item.id);
    record(&mut tracker, ItemState::Rejected { reason });
    ItemOutcome::from_tracker(&tracker, &item.title, None, std::time::Duration::ZERO)
}

fn panicked(entry: &Running, stage: Stage, err: &task::JoinError) -> ItemOutcome {
    let mut tracker = ItemTracker::fetched(&entry.item_id);
    record(
        &mut tracker,
        ItemState::Failed {
            stage,
            error: format!("task panicked: {err}"),
        },
    );
    ItemOutcome::from_tracker(&tracker, &entry.title, None, std::time::Duration::ZERO)
}

fn not_started(item: &CandidateItem) -> ItemOutcome {
    let mut tracker = ItemTracker::fetched(&item.id);
    record(&mut tracker, ItemState::Cancelled { stage: Stage::Filter });
    ItemOutcome::from_tracker(&tracker, &item.title, None, std::time::Duration::ZERO)
}
