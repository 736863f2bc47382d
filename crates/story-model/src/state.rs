//! Item lifecycle.
//!
//! An item moves strictly forward through
//! `Fetched → Filtered → Rewritten → Synthesized → Subtitled → Composed → Done`
//! and may leave the happy path at any point into one terminal state:
//! `Rejected` (filtered out), `Failed`, or `Cancelled`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::RejectReason;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Fetch,
    Filter,
    Rewrite,
    Synthesize,
    Subtitle,
    Compose,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Fetch,
        Stage::Filter,
        Stage::Rewrite,
        Stage::Synthesize,
        Stage::Subtitle,
        Stage::Compose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Filter => "filter",
            Self::Rewrite => "rewrite",
            Self::Synthesize => "synthesize",
            Self::Subtitle => "subtitle",
            Self::Compose => "compose",
        }
    }

    /// Stages whose artifacts are persisted and may be reused on resume.
    pub fn is_persisted(self) -> bool {
        matches!(
            self,
            Self::Rewrite | Self::Synthesize | Self::Subtitle | Self::Compose
        )
    }

    /// State reached when this stage succeeds.
    pub fn completed_state(self) -> ItemState {
        match self {
            Self::Fetch => ItemState::Fetched,
            Self::Filter => ItemState::Filtered,
            Self::Rewrite => ItemState::Rewritten,
            Self::Synthesize => ItemState::Synthesized,
            Self::Subtitle => ItemState::Subtitled,
            Self::Compose => ItemState::Composed,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item currently sits in the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ItemState {
    Fetched,
    Filtered,
    Rewritten,
    Synthesized,
    Subtitled,
    Composed,
    Done,
    Rejected { reason: RejectReason },
    Failed { stage: Stage, error: String },
    Cancelled { stage: Stage },
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Rejected { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// Next state on the happy path, if any.
    pub fn successor(&self) -> Option<ItemState> {
        match self {
            Self::Fetched => Some(Self::Filtered),
            Self::Filtered => Some(Self::Rewritten),
            Self::Rewritten => Some(Self::Synthesized),
            Self::Synthesized => Some(Self::Subtitled),
            Self::Subtitled => Some(Self::Composed),
            Self::Composed => Some(Self::Done),
            _ => None,
        }
    }

    /// Stage that runs next from this state.
    pub fn pending_stage(&self) -> Option<Stage> {
        match self {
            Self::Fetched => Some(Stage::Filter),
            Self::Filtered => Some(Stage::Rewrite),
            Self::Rewritten => Some(Stage::Synthesize),
            Self::Synthesized => Some(Stage::Subtitle),
            Self::Subtitled => Some(Stage::Compose),
            _ => None,
        }
    }

    /// Whether `next` is a legal move from `self`.
    pub fn can_transition_to(&self, next: &ItemState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.successor().as_ref() == Some(next) {
            return true;
        }
        match next {
            Self::Rejected { .. } => matches!(self, Self::Fetched),
            Self::Failed { .. } | Self::Cancelled { .. } => true,
            _ => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Fetched => "fetched".to_string(),
            Self::Filtered => "filtered".to_string(),
            Self::Rewritten => "rewritten".to_string(),
            Self::Synthesized => "synthesized".to_string(),
            Self::Subtitled => "subtitled".to_string(),
            Self::Composed => "composed".to_string(),
            Self::Done => "done".to_string(),
            Self::Rejected { reason } => format!("filtered-out({reason})"),
            Self::Failed { stage, .. } => format!("failed({stage})"),
            Self::Cancelled { stage } => format!("cancelled({stage})"),
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { stage, error } => write!(f, "failed({stage}): {error}"),
            other => f.write_str(&other.label()),
        }
    }
}

/// Attempted move that the lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid transition for item {item_id}: {from} -> {to}")]
pub struct InvalidTransition {
    pub item_id: String,
    pub from: String,
    pub to: String,
}

/// Tracks one item's state and the time of each transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemTracker {
    item_id: String,
    state: ItemState,
    history: Vec<(DateTime<Utc>, ItemState)>,
    /// Stages satisfied by artifacts from an earlier run.
    reused: Vec<Stage>,
}

impl ItemTracker {
    /// Start tracking a freshly fetched item.
    pub fn fetched(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            state: ItemState::Fetched,
            history: vec![(Utc::now(), ItemState::Fetched)],
            reused: Vec::new(),
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn history(&self) -> &[(DateTime<Utc>, ItemState)] {
        &self.history
    }

    pub fn reused_stages(&self) -> &[Stage] {
        &self.reused
    }

    pub fn transition(&mut self, next: ItemState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(&next) {
            return Err(InvalidTransition {
                item_id: self.item_id.clone(),
                from: self.state.label(),
                to: next.label(),
            });
        }
        tracing::debug!(
            item_id = %self.item_id,
            from = %self.state.label(),
            to = %next.label(),
            "Item state transition"
        );
        self.history.push((Utc::now(), next.clone()));
        self.state = next;
        Ok(())
    }

    /// Mark `stage` complete, noting whether a stored artifact was reused.
    pub fn complete(&mut self, stage: Stage, reused: bool) -> Result<(), InvalidTransition> {
        self.transition(stage.completed_state())?;
        if reused {
            self.reused.push(stage);
        }
        Ok(())
    }
}
