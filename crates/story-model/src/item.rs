//! Candidate items pulled from a content source.

use serde::{Deserialize, Serialize};

/// A user-generated text post eligible for narration.
///
/// Items are immutable once fetched; every later stage works from derived
/// artifacts and never edits the item itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Provider-assigned identifier, stable across fetches.
    pub id: String,

    /// Category the item was found in (a subreddit name for Reddit).
    pub category: String,

    pub title: String,

    pub body: String,

    pub author: String,

    /// Permalink to the original post.
    pub url: String,

    pub score: i64,

    pub num_comments: u64,

    /// Adult-content flag as reported by the source.
    pub nsfw: bool,

    /// Creation time, seconds since the Unix epoch.
    pub created_utc: f64,
}

impl CandidateItem {
    /// Body length in characters, the unit used by the length filter.
    pub fn char_len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Title and body as handed to the rewriter.
    pub fn source_text(&self) -> String {
        if self.title.trim().is_empty() {
            self.body.trim().to_string()
        } else {
            format!("{}\n\n{}", self.title.trim(), self.body.trim())
        }
    }

    /// Whether the source reports the body as removed or deleted.
    pub fn is_removed(&self) -> bool {
        matches!(self.body.trim(), "[removed]" | "[deleted]")
    }

    /// Identifier safe to use as a file stem.
    pub fn file_stem(&self) -> String {
        sanitize_id(&self.id)
    }
}

/// Restrict an identifier to `[A-Za-z0-9_-]`, replacing anything else.
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
pub(crate) fn sample_item(id: &str, body: &str) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        category: "AmItheAsshole".to_string(),
        title: "AITA for testing".to_string(),
        body: body.to_string(),
        author: "someone".to_string(),
        url: format!("https://reddit.com/comments/{id}"),
        score: 100,
        num_comments: 10,
        nsfw: false,
        created_utc: 1_700_000_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_len_counts_unicode_scalars() {
        let item = sample_item("a", "héllo");
        assert_eq!(item.char_len(), 5);
    }

    #[test]
    fn test_source_text_joins_title_and_body() {
        let item = sample_item("a", "  body text ");
        assert_eq!(item.source_text(), "AITA for testing\n\nbody text");
    }

    #[test]
    fn test_removed_detection() {
        assert!(sample_item("a", "[removed]").is_removed());
        assert!(sample_item("a", " [deleted] ").is_removed());
        assert!(!sample_item("a", "I [removed] the cake").is_removed());
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("abc123"), "abc123");
        assert_eq!(sanitize_id("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_id(""), "_");
    }
}
