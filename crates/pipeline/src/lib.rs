//! Reelsmith Pipeline
//!
//! Drives candidate items through every stage:
//!
//! ```text
//! fetch → filter → rewrite → synthesize → subtitle → compose
//!                     │           │           │          │
//!                  script      audio       .srt       .mp4   (+ .meta.json)
//! ```
//!
//! Each persisted stage is skipped when a stored artifact carries the same
//! input hash, so an interrupted run resumes where it stopped.

pub mod context;
pub mod hashes;
pub mod orchestrator;
pub mod summary;

pub use context::{RateLimits, RunContext};
pub use orchestrator::{Backends, BatchRequest, Candidates, Orchestrator, SingleTarget};
pub use summary::{BatchSummary, ItemOutcome};
