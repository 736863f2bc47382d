//! Composition planning: combines background footage, narration, and burned-in
//! subtitles into ffmpeg inputs and a filter graph.
//!
//! Nothing here runs a process. The export module turns a
//! [`CompositionPlan`] into an ffmpeg invocation.

use std::path::Path;

use reelsmith_common::config::{SubtitleConfig, VideoConfig};
use reelsmith_processing_core::{
    cover_crop, plan_background, BackgroundPlan, CropPlan, FramingError,
};

/// libass renders SRT input against a 288-line script resolution.
const ASS_PLAY_RES_Y: u32 = 288;

/// Everything needed to encode one video, minus file locations of the
/// encoder's own inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    /// ffconcat document playing the background spans in order.
    pub concat_list: String,

    /// `-filter_complex` graph producing `[vout]`.
    pub filter_graph: String,

    pub crop: CropPlan,
    pub background: BackgroundPlan,

    /// Output length; always the narration duration.
    pub duration_secs: f64,
}

impl CompositionPlan {
    pub fn total_frames(&self, fps: u32) -> u64 {
        (self.duration_secs * f64::from(fps.max(1))).ceil() as u64
    }
}

/// Source facts gathered by probing before planning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundSource<'a> {
    pub path: &'a Path,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// Plan the composition of `audio_duration_secs` of narration over `source`.
pub fn plan_composition(
    source: BackgroundSource<'_>,
    audio_duration_secs: f64,
    subtitle_path: &Path,
    video: &VideoConfig,
    subtitles: &SubtitleConfig,
) -> Result<CompositionPlan, FramingError> {
    let background = plan_background(
        source.duration_secs,
        audio_duration_secs,
        video.trim_offset_secs,
        video.loop_seam_secs,
        video.fps,
    )?;
    let crop = cover_crop(source.width, source.height, video.width, video.height);
    let style = subtitle_force_style(subtitles, video.height);

    Ok(CompositionPlan {
        concat_list: build_concat_list(source.path, &background),
        filter_graph: build_filter_graph(&crop, video.fps, subtitle_path, &style),
        crop,
        background,
        duration_secs: audio_duration_secs,
    })
}

/// Render a background plan as an ffconcat document.
///
/// Every span references the same file; open-ended spans omit `outpoint`.
pub fn build_concat_list(background: &Path, plan: &BackgroundPlan) -> String {
    let file = quote_concat_path(background);
    let mut list = String::from("ffconcat version 1.0\n");
    for segment in &plan.segments {
        list.push_str(&format!("file {file}\n"));
        if segment.inpoint_secs > 0.0 {
            list.push_str(&format!("inpoint {:.6}\n", segment.inpoint_secs));
        }
        if let Some(out) = segment.outpoint_secs {
            list.push_str(&format!("outpoint {out:.6}\n"));
        }
    }
    list
}

fn quote_concat_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// `RRGGBB` to the ASS `&HAABBGGRR` form with full opacity.
pub fn ass_colour(rrggbb: &str) -> Option<String> {
    let hex = rrggbb.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let (r, rest) = hex.split_at(2);
    let (g, b) = rest.split_at(2);
    Some(format!("&H00{}{}{}", b, g, r).to_ascii_uppercase())
}

/// Output pixels to libass script units.
fn to_ass_units(pixels: u32, output_height: u32) -> u32 {
    let scaled = f64::from(pixels) * f64::from(ASS_PLAY_RES_Y) / f64::from(output_height.max(1));
    scaled.round().max(1.0) as u32
}

/// `force_style` for the subtitles filter. Sizes in the config are output
/// pixels; colours that fail to parse fall back to white text on black.
pub fn subtitle_force_style(config: &SubtitleConfig, output_height: u32) -> String {
    let primary = ass_colour(&config.primary_colour).unwrap_or_else(|| {
        tracing::warn!(colour = %config.primary_colour, "Invalid subtitle colour, using white");
        "&H00FFFFFF".to_string()
    });
    let outline = ass_colour(&config.outline_colour).unwrap_or_else(|| {
        tracing::warn!(colour = %config.outline_colour, "Invalid outline colour, using black");
        "&H00000000".to_string()
    });

    format!(
        "FontName={font},FontSize={size},PrimaryColour={primary},OutlineColour={outline},BorderStyle=1,Outline={width},Shadow=0,Alignment=2,MarginV={margin}",
        font = config.font,
        size = to_ass_units(config.font_size, output_height),
        width = if config.outline == 0 {
            0
        } else {
            to_ass_units(config.outline, output_height)
        },
        margin = to_ass_units(config.margin_bottom, output_height),
    )
}

fn escape_with(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a filter option value for use inside a filter graph.
///
/// Two levels apply: the option parser (`\ ' :`) and then the graph parser
/// (`\ ' [ ] , ;`).
pub fn escape_filter_value(raw: &str) -> String {
    let option_level = escape_with(raw, &['\\', '\'', ':']);
    escape_with(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

/// Graph: crop to the canvas, normalize frame rate, burn subtitles.
pub fn build_filter_graph(
    crop: &CropPlan,
    fps: u32,
    subtitle_path: &Path,
    force_style: &str,
) -> String {
    format!(
        "[0:v]{crop},fps={fps},subtitles=filename={file}:force_style={style},format=yuv420p[vout]",
        crop = crop.filter(),
        fps = fps.max(1),
        file = escape_filter_value(&subtitle_path.to_string_lossy()),
        style = escape_filter_value(force_style),
    )
}
