//! Reelsmith Content Sources
//!
//! A content source hands the pipeline candidate items. The only production
//! source is Reddit; tests and tools plug in their own implementations of
//! [`ContentSource`].

pub mod query;
pub mod reddit;

pub use query::{FetchQuery, SortMode, TimeFilter};
pub use reddit::RedditClient;

use async_trait::async_trait;
use reelsmith_common::error::FetchError;
use reelsmith_story_model::CandidateItem;

/// How a source is reaching its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Authenticated with application credentials.
    OAuth,
    /// Anonymous, read-only access.
    Public,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OAuth => f.write_str("authenticated (oauth)"),
            Self::Public => f.write_str("read-only (public json)"),
        }
    }
}

/// Capability interface over candidate-item providers.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Fetch up to `query.limit` usable items from one category.
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<CandidateItem>, FetchError>;

    /// Fetch a single item by provider id.
    async fn fetch_by_id(&self, id: &str) -> Result<CandidateItem, FetchError>;

    /// Verify the provider is reachable and credentials, if any, are accepted.
    async fn test_connection(&self) -> Result<AccessMode, FetchError>;
}
