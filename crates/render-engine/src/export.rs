//! Compose jobs and the ffmpeg render backend.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use reelsmith_common::config::{SubtitleConfig, VideoConfig};
use reelsmith_common::error::CompositionError;
use reelsmith_common::probe::{command_exists, probe_media};
use reelsmith_story_model::{partial_path, AudioArtifact, SubtitleArtifact, VideoArtifact};

use crate::compositor::{plan_composition, BackgroundSource, CompositionPlan};

/// A compose job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ComposeJob {
    /// Narration audio, muxed as the only audio track.
    pub audio_path: PathBuf,

    /// Measured narration length; the output matches it.
    pub audio_duration_secs: f64,

    /// SRT burned into the frames.
    pub subtitle_path: PathBuf,

    /// Background footage, looped or trimmed to the narration.
    pub background_path: PathBuf,

    /// Output file path.
    pub output_path: PathBuf,

    pub video: VideoConfig,
    pub subtitles: SubtitleConfig,
}

impl ComposeJob {
    pub fn new(
        audio: &AudioArtifact,
        subtitles: &SubtitleArtifact,
        output_path: impl Into<PathBuf>,
        video: &VideoConfig,
        subtitle_style: &SubtitleConfig,
    ) -> Self {
        Self {
            audio_path: audio.path.clone(),
            audio_duration_secs: audio.duration_secs,
            subtitle_path: subtitles.path.clone(),
            background_path: video.background.clone(),
            output_path: output_path.into(),
            video: video.clone(),
            subtitles: subtitle_style.clone(),
        }
    }
}

/// Progress callback for rendering.
pub type ProgressCallback = Arc<dyn Fn(ComposeProgress) + Send + Sync>;

/// Render progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Output time encoded so far.
    pub out_time_secs: f64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    pub stage: ComposeStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStage {
    Preparing,
    Encoding,
    Verifying,
    Complete,
}

/// Encoded output facts, as probed after rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl RenderedVideo {
    pub fn into_artifact(
        self,
        item_id: impl Into<String>,
        input_hash: impl Into<String>,
    ) -> VideoArtifact {
        VideoArtifact {
            item_id: item_id.into(),
            path: self.path,
            duration_secs: self.duration_secs,
            width: self.width,
            height: self.height,
            input_hash: input_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// Blocking render backends.
pub trait RenderBackend: Send + Sync {
    /// Execute the job, leaving the output at `job.output_path` only on success.
    fn render(
        &self,
        job: &ComposeJob,
        progress: Option<&ProgressCallback>,
    ) -> Result<RenderedVideo, CompositionError>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Async composition seam used by the orchestrator.
#[async_trait]
pub trait Composer: Send + Sync {
    fn name(&self) -> &str;

    async fn compose(
        &self,
        job: ComposeJob,
        progress: Option<ProgressCallback>,
    ) -> Result<RenderedVideo, CompositionError>;
}

/// Runs a blocking [`RenderBackend`] off the async runtime.
pub struct VideoComposer {
    backend: Arc<dyn RenderBackend>,
}

impl VideoComposer {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self { backend }
    }

    /// Composer over the ffmpeg backend.
    pub fn ffmpeg() -> Self {
        Self::new(Arc::new(FfmpegBackend::new()))
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

#[async_trait]
impl Composer for VideoComposer {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn compose(
        &self,
        job: ComposeJob,
        progress: Option<ProgressCallback>,
    ) -> Result<RenderedVideo, CompositionError> {
        tracing::info!(
            output = %job.output_path.display(),
            audio_secs = job.audio_duration_secs,
            backend = self.backend.name(),
            "Starting composition"
        );
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.render(&job, progress.as_ref()))
            .await
            .map_err(|e| CompositionError::encoder(format!("render task failed: {e}")))?
    }
}

pub struct FfmpegBackend {
    program: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }

    fn check_inputs(&self, job: &ComposeJob) -> Result<(), CompositionError> {
        for path in [&job.background_path, &job.audio_path, &job.subtitle_path] {
            if !path.is_file() {
                return Err(CompositionError::MissingSource { path: path.clone() });
            }
        }
        if !(job.audio_duration_secs.is_finite() && job.audio_duration_secs > 0.0) {
            return Err(CompositionError::encoder(format!(
                "narration duration must be positive, got {}",
                job.audio_duration_secs
            )));
        }
        Ok(())
    }

    fn probe_background(&self, path: &Path) -> Result<(f64, u32, u32), CompositionError> {
        let info = probe_media(path).map_err(|e| {
            CompositionError::encoder(format!("unreadable background {}: {e}", path.display()))
        })?;
        let (width, height) = info.video_size.ok_or_else(|| {
            CompositionError::encoder(format!("background {} has no video stream", path.display()))
        })?;
        Ok((info.duration_secs, width, height))
    }

    fn build_plan(&self, job: &ComposeJob) -> Result<CompositionPlan, CompositionError> {
        let background = std::fs::canonicalize(&job.background_path)
            .unwrap_or_else(|_| job.background_path.clone());
        let subtitles = std::fs::canonicalize(&job.subtitle_path)
            .unwrap_or_else(|_| job.subtitle_path.clone());
        let (duration_secs, width, height) = self.probe_background(&background)?;

        let source = BackgroundSource {
            path: &background,
            duration_secs,
            width,
            height,
        };
        plan_composition(source, job.audio_duration_secs, &subtitles, &job.video, &job.subtitles)
            .map_err(|e| CompositionError::encoder(format!("cannot plan background: {e}")))
    }

    fn run_ffmpeg(
        &self,
        args: &[String],
        expected_duration_secs: f64,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), CompositionError> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| CompositionError::encoder(format!("failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompositionError::encoder("failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompositionError::encoder("failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once the stderr pipe fills.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = std::time::Instant::now();
        loop {
            line.clear();
            let bytes = reader.read_line(&mut line).map_err(|e| {
                CompositionError::encoder(format!("failed reading ffmpeg progress: {e}"))
            })?;
            if bytes == 0 {
                break;
            }

            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = std::time::Instant::now();
            }
            if let Some(cb) = progress {
                cb(progress_report(
                    &state,
                    expected_duration_secs,
                    start.elapsed().as_secs_f64(),
                ));
            }
            if last_progress_wall.elapsed().as_secs() >= 10 {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No ffmpeg progress advancement for 10s"
                );
                last_progress_wall = std::time::Instant::now();
            }
        }

        let status = child
            .wait()
            .map_err(|e| CompositionError::encoder(format!("failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(CompositionError::encoder(format!(
                "ffmpeg exited with {status}: {}",
                tail_lines(&stderr_output, 20)
            )));
        }
        Ok(())
    }

    fn verify_output(
        &self,
        path: &Path,
        job: &ComposeJob,
    ) -> Result<RenderedVideo, CompositionError> {
        let info = probe_media(path).map_err(|e| {
            CompositionError::encoder(format!("cannot probe output {}: {e}", path.display()))
        })?;
        check_duration(
            job.audio_duration_secs,
            info.duration_secs,
            job.video.duration_tolerance_secs,
        )?;
        let (width, height) = info.video_size.unwrap_or((job.video.width, job.video.height));
        Ok(RenderedVideo {
            path: job.output_path.clone(),
            duration_secs: info.duration_secs,
            width,
            height,
        })
    }
}

impl RenderBackend for FfmpegBackend {
    fn render(
        &self,
        job: &ComposeJob,
        progress: Option<&ProgressCallback>,
    ) -> Result<RenderedVideo, CompositionError> {
        let started = std::time::Instant::now();
        self.check_inputs(job)?;

        if let Some(cb) = progress {
            cb(ComposeProgress {
                progress: 0.0,
                out_time_secs: 0.0,
                eta_secs: 0.0,
                stage: ComposeStage::Preparing,
            });
        }

        let plan = self.build_plan(job)?;
        tracing::info!(
            segments = plan.background.segments.len(),
            looped = plan.background.is_looped(),
            total_frames = plan.total_frames(job.video.fps),
            "Composition planned"
        );

        if let Some(parent) = job.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CompositionError::encoder(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let concat_path = concat_list_path(&job.output_path);
        std::fs::write(&concat_path, &plan.concat_list).map_err(|e| {
            CompositionError::encoder(format!("cannot write {}: {e}", concat_path.display()))
        })?;

        let temp_output = partial_path(&job.output_path);
        let args = ffmpeg_args(job, &plan, &concat_path, &temp_output);
        let result = self
            .run_ffmpeg(&args, plan.duration_secs, progress)
            .and_then(|()| {
                if let Some(cb) = progress {
                    cb(ComposeProgress {
                        progress: 1.0,
                        out_time_secs: plan.duration_secs,
                        eta_secs: 0.0,
                        stage: ComposeStage::Verifying,
                    });
                }
                self.verify_output(&temp_output, job)
            })
            .and_then(|rendered| {
                std::fs::rename(&temp_output, &job.output_path)
                    .map(|()| rendered)
                    .map_err(|e| CompositionError::encoder(format!("cannot finalize output: {e}")))
            });

        std::fs::remove_file(&concat_path).ok();
        if result.is_err() {
            std::fs::remove_file(&temp_output).ok();
        }
        let rendered = result?;

        if let Some(cb) = progress {
            cb(ComposeProgress {
                progress: 1.0,
                out_time_secs: rendered.duration_secs,
                eta_secs: 0.0,
                stage: ComposeStage::Complete,
            });
        }
        tracing::info!(
            output = %rendered.path.display(),
            duration_secs = rendered.duration_secs,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Composition finished"
        );
        Ok(rendered)
    }

    fn is_available(&self) -> bool {
        command_exists(&self.program) && command_exists("ffprobe")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Full ffmpeg argument list for a planned job.
/// Scratch concat list next to the output, swept with other `.part` files.
fn concat_list_path(output: &Path) -> PathBuf {
    partial_path(&output.with_extension("ffconcat"))
}

fn ffmpeg_args(
    job: &ComposeJob,
    plan: &CompositionPlan,
    concat_path: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "error",
        "-progress",
        "pipe:1",
        "-nostats",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(concat_path.to_string_lossy().into_owned());
    args.push("-i".to_string());
    args.push(job.audio_path.to_string_lossy().into_owned());
    args.push("-filter_complex".to_string());
    args.push(plan.filter_graph.clone());
    // Background audio is never mapped.
    args.extend(
        ["-map", "[vout]", "-map", "1:a:0"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.extend(codec_args(&job.video));
    args.push("-t".to_string());
    args.push(format!("{:.3}", plan.duration_secs));
    args.extend(["-f", "mp4"].iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().into_owned());
    args
}

fn codec_args(config: &VideoConfig) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        config.video_codec.clone(),
        "-preset".to_string(),
        config.preset.clone(),
        "-crf".to_string(),
        config.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        config.fps.max(1).to_string(),
        "-c:a".to_string(),
        config.audio_codec.clone(),
        "-b:a".to_string(),
        format!("{}k", config.audio_bitrate_kbps.max(64)),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

/// Reject outputs whose duration drifts from the narration.
fn check_duration(expected: f64, actual: f64, tolerance: f64) -> Result<(), CompositionError> {
    if (actual - expected).abs() > tolerance {
        return Err(CompositionError::DurationMismatch {
            expected,
            actual,
            tolerance,
        });
    }
    Ok(())
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }
}

fn progress_report(
    state: &ProgressState,
    expected_duration_secs: f64,
    elapsed_secs: f64,
) -> ComposeProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };

    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ComposeProgress {
        progress: if state.complete { 1.0 } else { progress },
        out_time_secs: state.out_time_secs,
        eta_secs,
        stage: ComposeStage::Encoding,
    }
}
