//! Reelsmith Render Engine
//!
//! Offline composition of narration, subtitles, and background footage
//! into a vertical short-form video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! background.mp4 ──┐
//!                  ├── Loop/Trim (ffconcat spans)
//!                  │         │
//!                  │         ├── Cover Scale + Center Crop (9:16)
//!                  │         │
//! subtitles.srt ───┼─────────┼── Subtitle Burn
//!                  │         │
//! narration.wav ───┴─────────┴── Mux (narration only)
//!                                    │
//!                                    ▼
//!                             Encode (H.264/AAC)
//!                                    │
//!                                    ▼
//!                         output.mp4 (duration checked)
//! ```

pub mod compositor;
pub mod export;

pub use compositor::{plan_composition, BackgroundSource, CompositionPlan};
pub use export::*;
