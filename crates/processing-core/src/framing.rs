//! Vertical framing and background coverage planning.
//!
//! The output canvas is always filled: the source is scaled until it covers
//! the canvas and the overflow is cropped evenly from both sides. Background
//! footage shorter than the narration is looped; longer footage is trimmed.

/// Scale-then-crop geometry mapping a source frame onto the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub out_width: u32,
    pub out_height: u32,
}

impl CropPlan {
    /// ffmpeg filter chain applying this plan.
    pub fn filter(&self) -> String {
        format!(
            "scale={sw}:{sh}:flags=lanczos,crop={ow}:{oh}:{x}:{y},setsar=1",
            sw = self.scaled_width,
            sh = self.scaled_height,
            ow = self.out_width,
            oh = self.out_height,
            x = self.crop_x,
            y = self.crop_y,
        )
    }
}

/// Cover `out_width`×`out_height` with a `src_width`×`src_height` frame.
///
/// Scaled dimensions are rounded up to even numbers and never fall below the
/// canvas, so the crop always stays inside the scaled frame. No letterboxing.
pub fn cover_crop(src_width: u32, src_height: u32, out_width: u32, out_height: u32) -> CropPlan {
    let src_w = u64::from(src_width.max(1));
    let src_h = u64::from(src_height.max(1));
    let (ow, oh) = (u64::from(out_width), u64::from(out_height));

    // Source at least as wide as the canvas: match heights, crop the sides.
    let (scaled_w, scaled_h) = if src_w * oh >= src_h * ow {
        (div_ceil(src_w * oh, src_h), oh)
    } else {
        (ow, div_ceil(src_h * ow, src_w))
    };

    let scaled_width = round_up_even(scaled_w as u32).max(out_width);
    let scaled_height = round_up_even(scaled_h as u32).max(out_height);

    CropPlan {
        scaled_width,
        scaled_height,
        crop_x: (scaled_width - out_width) / 2,
        crop_y: (scaled_height - out_height) / 2,
        out_width,
        out_height,
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

fn round_up_even(value: u32) -> u32 {
    value + (value % 2)
}

/// A contiguous span of the background footage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootageSegment {
    pub inpoint_secs: f64,
    /// `None` plays to the end of the footage.
    pub outpoint_secs: Option<f64>,
}

impl FootageSegment {
    pub fn len_secs(&self, footage_secs: f64) -> f64 {
        self.outpoint_secs.unwrap_or(footage_secs) - self.inpoint_secs
    }
}

/// Ordered footage spans whose total length covers the narration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundPlan {
    pub segments: Vec<FootageSegment>,
    pub footage_secs: f64,
    pub target_secs: f64,
}

impl BackgroundPlan {
    pub fn is_looped(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn covered_secs(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.len_secs(self.footage_secs))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FramingError {
    #[error("background footage has no duration")]
    EmptyFootage,

    #[error("narration duration must be positive, got {0}")]
    EmptyTarget(f64),

    #[error("loop seam {seam}s leaves less than one frame to loop in {footage}s")]
    InvalidSeam { seam: f64, footage: f64 },
}

/// Plan which footage spans play under `target_secs` of narration.
///
/// The first span starts at `trim_offset_secs` (reset to zero when past the
/// end of the footage); repetitions restart at `loop_seam_secs`. A loop must
/// span at least one frame at `fps`.
pub fn plan_background(
    footage_secs: f64,
    target_secs: f64,
    trim_offset_secs: f64,
    loop_seam_secs: f64,
    fps: u32,
) -> Result<BackgroundPlan, FramingError> {
    if !(footage_secs.is_finite() && footage_secs > 0.0) {
        return Err(FramingError::EmptyFootage);
    }
    if !(target_secs.is_finite() && target_secs > 0.0) {
        return Err(FramingError::EmptyTarget(target_secs));
    }

    let offset = if (0.0..footage_secs).contains(&trim_offset_secs) {
        trim_offset_secs
    } else {
        0.0
    };

    let mut segments = Vec::new();
    let first_len = footage_secs - offset;
    if first_len >= target_secs {
        segments.push(FootageSegment {
            inpoint_secs: offset,
            outpoint_secs: Some(offset + target_secs),
        });
        return Ok(BackgroundPlan {
            segments,
            footage_secs,
            target_secs,
        });
    }

    let seam = loop_seam_secs.max(0.0);
    let loop_len = footage_secs - seam;
    let frame_secs = 1.0 / f64::from(fps.max(1));
    if loop_len < frame_secs {
        return Err(FramingError::InvalidSeam {
            seam: loop_seam_secs,
            footage: footage_secs,
        });
    }

    segments.push(FootageSegment {
        inpoint_secs: offset,
        outpoint_secs: None,
    });
    let mut remaining = target_secs - first_len;
    while remaining > 1e-9 {
        if loop_len >= remaining {
            segments.push(FootageSegment {
                inpoint_secs: seam,
                outpoint_secs: Some(seam + remaining),
            });
            break;
        }
        segments.push(FootageSegment {
            inpoint_secs: seam,
            outpoint_secs: None,
        });
        remaining -= loop_len;
    }

    Ok(BackgroundPlan {
        segments,
        footage_secs,
        target_secs,
    })
}
