//! Reelsmith Common Utilities
//!
//! Shared infrastructure for all Reelsmith crates:
//! - Stage error taxonomy and result aliases
//! - Configuration loading with environment credentials
//! - Retry with exponential backoff and token-bucket rate limiting
//! - Media probing and input hashing for resumable runs
//! - Tracing/logging initialization

pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod probe;
pub mod rate;
pub mod retry;

pub use config::*;
pub use error::*;
pub use rate::TokenBucket;
pub use retry::{retry_async, RetryPolicy};
