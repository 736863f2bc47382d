//! Story filter.
//!
//! Checks run in a fixed order and the first failing check names the reason:
//! keyword-blocked, too-short, too-long, nsfw-blocked, removed. Keyword
//! matches therefore win over every other property, and an under-length item
//! is always reported as too-short unless it also contains a blocked keyword.

use reelsmith_common::config::FilterConfig;
use reelsmith_story_model::{CandidateItem, FilterDecision, FilterStats, RejectReason};

/// Length, NSFW, and keyword gate applied to each candidate item.
#[derive(Debug, Clone)]
pub struct StoryFilter {
    config: FilterConfig,
    keywords: Vec<String>,
}

/// Result of filtering a batch.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<CandidateItem>,
    pub rejected: Vec<(CandidateItem, RejectReason)>,
    pub stats: FilterStats,
}

impl StoryFilter {
    pub fn new(config: FilterConfig) -> Self {
        let keywords = config
            .blocked_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { config, keywords }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decide whether one item may proceed.
    pub fn decide(&self, item: &CandidateItem) -> FilterDecision {
        if self.matches_blocked_keyword(item) {
            return FilterDecision::reject(RejectReason::KeywordBlocked);
        }

        let len = item.char_len();
        if len < self.config.min_chars {
            return FilterDecision::reject(RejectReason::TooShort);
        }
        if len > self.config.max_chars {
            return FilterDecision::reject(RejectReason::TooLong);
        }
        if item.nsfw && !self.config.allow_nsfw {
            return FilterDecision::reject(RejectReason::NsfwBlocked);
        }
        if item.is_removed() {
            return FilterDecision::reject(RejectReason::Removed);
        }

        FilterDecision::pass()
    }

    /// Split a batch into accepted and rejected items, preserving order.
    pub fn partition(&self, items: impl IntoIterator<Item = CandidateItem>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for item in items {
            let decision = self.decide(&item);
            outcome.stats.record(decision);
            match decision.reason() {
                None => outcome.accepted.push(item),
                Some(reason) => {
                    tracing::debug!(item_id = %item.id, %reason, "Item filtered out");
                    outcome.rejected.push((item, reason));
                }
            }
        }
        tracing::info!(stats = %outcome.stats, "Filtered candidate items");
        outcome
    }

    fn matches_blocked_keyword(&self, item: &CandidateItem) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let title = item.title.to_lowercase();
        let body = item.body.to_lowercase();
        self.keywords
            .iter()
            .any(|k| title.contains(k.as_str()) || body.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(body: &str) -> CandidateItem {
        CandidateItem {
            id: "t1".to_string(),
            category: "AmItheAsshole".to_string(),
            title: "A story".to_string(),
            body: body.to_string(),
            author: "someone".to_string(),
            url: String::new(),
            score: 1,
            num_comments: 0,
            nsfw: false,
            created_utc: 0.0,
        }
    }

    fn filter_with_keywords(keywords: &[&str]) -> StoryFilter {
        StoryFilter::new(FilterConfig {
            min_chars: 10,
            max_chars: 100,
            allow_nsfw: false,
            blocked_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        })
    }

    #[test]
    fn test_accepts_item_within_bounds() {
        let filter = filter_with_keywords(&[]);
        assert!(filter.decide(&item("a perfectly fine story")).passed());
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        let filter = filter_with_keywords(&[]);
        assert!(filter.decide(&item(&"x".repeat(10))).passed());
        assert!(filter.decide(&item(&"x".repeat(100))).passed());
        assert_eq!(
            filter.decide(&item(&"x".repeat(9))).reason(),
            Some(RejectReason::TooShort)
        );
        assert_eq!(
            filter.decide(&item(&"x".repeat(101))).reason(),
            Some(RejectReason::TooLong)
        );
    }

    #[test]
    fn test_nsfw_blocked_unless_allowed() {
        let mut nsfw = item("a perfectly fine story");
        nsfw.nsfw = true;
        let filter = filter_with_keywords(&[]);
        assert_eq!(
            filter.decide(&nsfw).reason(),
            Some(RejectReason::NsfwBlocked)
        );

        let permissive = StoryFilter::new(FilterConfig {
            allow_nsfw: true,
            ..filter.config().clone()
        });
        assert!(permissive.decide(&nsfw).passed());
    }

    #[test]
    fn test_keyword_match_is_case_insensitive_over_title_and_body() {
        let filter = filter_with_keywords(&["Spoiler"]);
        assert_eq!(
            filter.decide(&item("this has a SPOILER inside")).reason(),
            Some(RejectReason::KeywordBlocked)
        );
        let mut titled = item("a perfectly fine story");
        titled.title = "spoilers ahead".to_string();
        assert_eq!(
            filter.decide(&titled).reason(),
            Some(RejectReason::KeywordBlocked)
        );
    }

    #[test]
    fn test_keyword_wins_over_length() {
        let filter = filter_with_keywords(&["bad"]);
        assert_eq!(
            filter.decide(&item("bad")).reason(),
            Some(RejectReason::KeywordBlocked)
        );
    }

    #[test]
    fn test_too_short_wins_over_nsfw() {
        let mut short = item("tiny");
        short.nsfw = true;
        assert_eq!(
            filter_with_keywords(&[]).decide(&short).reason(),
            Some(RejectReason::TooShort)
        );
    }

    #[test]
    fn test_removed_body_is_rejected() {
        let filter = StoryFilter::new(FilterConfig {
            min_chars: 0,
            ..FilterConfig::default()
        });
        assert_eq!(
            filter.decide(&item("[removed]")).reason(),
            Some(RejectReason::Removed)
        );
    }

    #[test]
    fn test_partition_tallies() {
        let filter = filter_with_keywords(&["nope"]);
        let outcome = filter.partition(vec![
            item("a perfectly fine story"),
            item("short"),
            item("nope nope nope nope"),
        ]);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.stats.total, 3);
        assert_eq!(outcome.stats.count(RejectReason::TooShort), 1);
        assert_eq!(outcome.stats.count(RejectReason::KeywordBlocked), 1);
    }

    proptest! {
        #[test]
        fn prop_short_items_always_too_short(body in "[a-z ]{0,9}", nsfw in any::<bool>()) {
            let mut candidate = item(&body);
            candidate.nsfw = nsfw;
            let decision = filter_with_keywords(&["#blocked"]).decide(&candidate);
            prop_assert_eq!(decision.reason(), Some(RejectReason::TooShort));
        }

        #[test]
        fn prop_keyword_always_blocks(
            prefix in "[a-z ]{0,200}",
            suffix in "[a-z ]{0,200}",
            nsfw in any::<bool>(),
        ) {
            let mut candidate = item(&format!("{prefix}Forbidden{suffix}"));
            candidate.nsfw = nsfw;
            let decision = filter_with_keywords(&["forbidden"]).decide(&candidate);
            prop_assert_eq!(decision.reason(), Some(RejectReason::KeywordBlocked));
        }

        #[test]
        fn prop_passed_iff_no_reason(body in "[a-z ]{0,150}", nsfw in any::<bool>()) {
            let mut candidate = item(&body);
            candidate.nsfw = nsfw;
            let decision = filter_with_keywords(&["qq"]).decide(&candidate);
            prop_assert_eq!(decision.passed(), decision.reason().is_none());
        }
    }
}
