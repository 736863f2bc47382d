//! Reelsmith Story Model
//!
//! Defines the data contracts shared by every pipeline stage:
//! - **Items:** Candidate posts as fetched from a content source
//! - **Decisions:** Filter verdicts and their tallies
//! - **Artifacts:** Scripts, narration audio, subtitle tracks, and videos
//! - **State:** The per-item lifecycle and its legal transitions
//! - **Store:** Output layout and atomic, resumable artifact persistence

pub mod artifact;
pub mod decision;
pub mod item;
pub mod layout;
pub mod state;
pub mod store;

pub use artifact::*;
pub use decision::*;
pub use item::*;
pub use layout::*;
pub use state::*;
pub use store::*;
