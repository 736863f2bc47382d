//! Application configuration.
//!
//! Settings are read from a JSON file. Every section has defaults so partial
//! files are valid. Credentials are never read from or written to the file;
//! they come from the environment through [`AppConfig::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReelError, ReelResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    pub rewriter: RewriterConfig,
    pub tts: TtsConfig,
    pub subtitles: SubtitleConfig,
    pub video: VideoConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Content source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Categories (subreddits) tried in order during batch collection.
    pub categories: Vec<String>,

    /// Default listing sort: hot, new, top, rising, controversial.
    pub sort: String,

    /// Default time filter for top/controversial: hour, day, week, month, year, all.
    pub time_filter: String,

    /// Candidates fetched per requested item, so filtering can still fill the batch.
    pub fetch_multiplier: usize,

    /// Base URL for authenticated API requests.
    pub api_base: String,

    /// Base URL for anonymous listing requests and token exchange.
    pub public_base: String,

    pub user_agent: String,

    pub request_timeout_secs: u64,

    #[serde(skip)]
    pub client_id: Option<String>,

    #[serde(skip)]
    pub client_secret: Option<String>,
}

/// Story filter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_chars: usize,
    pub max_chars: usize,
    pub allow_nsfw: bool,
    /// Case-insensitive substrings matched against title and body.
    pub blocked_keywords: Vec<String>,
}

/// Which rewrite backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriterProvider {
    /// Anthropic if a key is present, then OpenAI, then the dummy rewriter.
    Auto,
    Dummy,
    Anthropic,
    Openai,
}

/// Rewriter adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    pub provider: RewriterProvider,
    pub target_word_count: usize,
    /// Accepted relative deviation from the target word count.
    pub length_tolerance: f64,
    /// Shared n-gram fraction above which output counts as passthrough.
    pub passthrough_threshold: f64,
    pub ngram_size: usize,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub request_timeout_secs: u64,

    #[serde(skip)]
    pub anthropic_api_key: Option<String>,

    #[serde(skip)]
    pub openai_api_key: Option<String>,
}

/// Which speech engine to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Local,
    Api,
}

/// Synthesizer adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub speech_rate_wpm: u32,
    pub voice: Option<String>,
    /// Program used by the local engine (espeak-ng compatible flags).
    pub local_program: String,
    pub api_url: Option<String>,
    /// Requested audio format for the API engine.
    pub api_format: String,
    pub request_timeout_secs: u64,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Cue segmentation, timing priors, and burned-in style.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub max_chars_per_line: usize,
    pub max_lines_per_cue: usize,
    pub max_words_per_cue: usize,
    pub sentence_pause_secs: f64,
    pub clause_pause_secs: f64,
    pub font: String,
    pub font_size: u32,
    /// RRGGBB
    pub primary_colour: String,
    /// RRGGBB
    pub outline_colour: String,
    pub outline: u32,
    pub margin_bottom: u32,
}

/// Output video settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Background footage to loop or trim under the narration.
    pub background: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    /// Where loop repetitions restart inside the footage.
    pub loop_seam_secs: f64,
    /// Where the first pass starts inside the footage.
    pub trim_offset_secs: f64,
    /// Maximum accepted difference between output and narration duration.
    pub duration_tolerance_secs: f64,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub batch_limit: usize,
    pub max_concurrent_items: usize,
    /// Concurrent fetch/rewrite/synthesize calls across all items.
    pub network_concurrency: usize,
    /// Concurrent encoder processes.
    pub encode_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Requests per second allowed against each provider.
    pub source_rps: f64,
    pub rewrite_rps: f64,
    pub tts_rps: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelsmith_pipeline=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            categories: vec!["AmItheAsshole".to_string()],
            sort: "hot".to_string(),
            time_filter: "day".to_string(),
            fetch_multiplier: 2,
            api_base: "https://oauth.reddit.com".to_string(),
            public_base: "https://www.reddit.com".to_string(),
            user_agent: format!("reelsmith/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            client_id: None,
            client_secret: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_chars: 500,
            max_chars: 5000,
            allow_nsfw: false,
            blocked_keywords: Vec::new(),
        }
    }
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            provider: RewriterProvider::Auto,
            target_word_count: 200,
            length_tolerance: 0.30,
            passthrough_threshold: 0.95,
            ngram_size: 3,
            anthropic_model: "claude-3-haiku-20240307".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            request_timeout_secs: 60,
            anthropic_api_key: None,
            openai_api_key: None,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::Local,
            speech_rate_wpm: 150,
            voice: None,
            local_program: "espeak-ng".to_string(),
            api_url: None,
            api_format: "mp3".to_string(),
            request_timeout_secs: 60,
            api_key: None,
        }
    }
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            max_chars_per_line: 40,
            max_lines_per_cue: 2,
            max_words_per_cue: 10,
            sentence_pause_secs: 0.40,
            clause_pause_secs: 0.20,
            font: "Arial".to_string(),
            font_size: 48,
            primary_colour: "FFFFFF".to_string(),
            outline_colour: "000000".to_string(),
            outline: 3,
            margin_bottom: 150,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            background: PathBuf::from("assets/background.mp4"),
            width: 1080,
            height: 1920,
            fps: 30,
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            loop_seam_secs: 0.0,
            trim_offset_secs: 0.0,
            duration_tolerance_secs: 0.25,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            batch_limit: 5,
            max_concurrent_items: 4,
            network_concurrency: 4,
            encode_concurrency: 1,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            source_rps: 1.0,
            rewrite_rps: 1.0,
            tts_rps: 2.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    ///
    /// Environment credentials are applied in both cases.
    pub fn load() -> Self {
        let config_path = config_file_path();
        let mut config = if config_path.exists() {
            match Self::read_file(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env();
        config
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], a
    /// missing or malformed file is an error.
    pub fn load_from(path: impl AsRef<Path>) -> ReelResult<Self> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_env();
        Ok(config)
    }

    fn read_file(path: &Path) -> ReelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReelError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ReelError::config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path. Credentials are never written.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Overlay credentials and endpoints from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay credentials using an arbitrary lookup (tests inject a map).
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = get("REDDIT_CLIENT_ID") {
            self.source.client_id = Some(v);
        }
        if let Some(v) = get("REDDIT_CLIENT_SECRET") {
            self.source.client_secret = Some(v);
        }
        if let Some(v) = get("REDDIT_USER_AGENT") {
            self.source.user_agent = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.rewriter.anthropic_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.rewriter.openai_api_key = Some(v);
        }
        if let Some(v) = get("TTS_API_KEY") {
            self.tts.api_key = Some(v);
        }
        if let Some(v) = get("TTS_API_URL") {
            self.tts.api_url = Some(v);
        }
    }

    /// Check settings every command depends on.
    pub fn validate(&self) -> ReelResult<()> {
        let mut problems = Vec::new();

        if self.filter.min_chars > self.filter.max_chars {
            problems.push(format!(
                "filter.min_chars ({}) exceeds filter.max_chars ({})",
                self.filter.min_chars, self.filter.max_chars
            ));
        }
        if self.rewriter.target_word_count == 0 {
            problems.push("rewriter.target_word_count must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.rewriter.length_tolerance) {
            problems.push("rewriter.length_tolerance must be within [0, 1)".to_string());
        }
        if !(0.0..=1.0).contains(&self.rewriter.passthrough_threshold) {
            problems.push("rewriter.passthrough_threshold must be within [0, 1]".to_string());
        }
        if self.tts.speech_rate_wpm == 0 {
            problems.push("tts.speech_rate_wpm must be positive".to_string());
        }
        if self.subtitles.max_chars_per_line == 0
            || self.subtitles.max_lines_per_cue == 0
            || self.subtitles.max_words_per_cue == 0
        {
            problems.push("subtitle cue limits must be positive".to_string());
        }
        if self.video.width == 0 || self.video.height == 0 || self.video.fps == 0 {
            problems.push("video width, height and fps must be positive".to_string());
        }
        let seam = self.video.loop_seam_secs;
        let offset = self.video.trim_offset_secs;
        if !(seam.is_finite() && seam >= 0.0 && offset.is_finite() && offset >= 0.0) {
            problems
                .push("video.loop_seam_secs and video.trim_offset_secs must be >= 0".to_string());
        }
        if self.video.duration_tolerance_secs <= 0.0 {
            problems.push("video.duration_tolerance_secs must be positive".to_string());
        }
        if self.pipeline.max_concurrent_items == 0
            || self.pipeline.network_concurrency == 0
            || self.pipeline.encode_concurrency == 0
        {
            problems.push("pipeline concurrency limits must be positive".to_string());
        }
        if self.source.categories.is_empty() {
            problems.push("source.categories must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReelError::config(problems.join("; ")))
        }
    }

    /// Additional checks for commands that render video.
    pub fn validate_for_render(&self) -> ReelResult<()> {
        self.validate()?;
        if !self.video.background.is_file() {
            return Err(ReelError::config(format!(
                "background footage not found: {}",
                self.video.background.display()
            )));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelsmith").join("config.json")
}
