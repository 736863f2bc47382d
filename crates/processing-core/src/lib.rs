//! Reelsmith Processing Core
//!
//! Pure, I/O-free pipeline logic:
//! - **Filter:** length, NSFW, keyword, and removed-post gate
//! - **Segmentation:** readable cue lines that never split words
//! - **Alignment:** cue timing from word offsets or a speech-rate estimate
//! - **Framing:** 9:16 cover crop and background loop/trim plans
//!
//! No processes, no network, no filesystem.
//! All inputs are data; all outputs are data.

pub mod alignment;
pub mod filter;
pub mod framing;
pub mod segment;

pub use alignment::{SubtitleBuilder, TimingSource};
pub use filter::{FilterOutcome, StoryFilter};
pub use framing::{
    cover_crop, plan_background, BackgroundPlan, CropPlan, FootageSegment, FramingError,
};
pub use segment::{segment, Boundary, CuePolicy, CueText};
