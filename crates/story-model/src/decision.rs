//! Filter verdicts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an item was rejected by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    TooShort,
    TooLong,
    NsfwBlocked,
    KeywordBlocked,
    Removed,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "too-short",
            Self::TooLong => "too-long",
            Self::NsfwBlocked => "nsfw-blocked",
            Self::KeywordBlocked => "keyword-blocked",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of filtering one item. `reason` is set exactly when rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecision {
    reason: Option<RejectReason>,
}

impl FilterDecision {
    pub fn pass() -> Self {
        Self { reason: None }
    }

    pub fn reject(reason: RejectReason) -> Self {
        Self {
            reason: Some(reason),
        }
    }

    pub fn passed(&self) -> bool {
        self.reason.is_none()
    }

    pub fn reason(&self) -> Option<RejectReason> {
        self.reason
    }
}

/// Running tally of filter decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub total: usize,
    pub passed: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl FilterStats {
    pub fn record(&mut self, decision: FilterDecision) {
        self.total += 1;
        match decision.reason() {
            None => self.passed += 1,
            Some(reason) => *self.rejected.entry(reason).or_insert(0) += 1,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} checked, {} passed", self.total, self.passed)?;
        for (reason, count) in &self.rejected {
            write!(f, ", {count} {reason}")?;
        }
        Ok(())
    }
}
