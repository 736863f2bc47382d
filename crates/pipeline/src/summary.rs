//! Per-item outcomes and the batch summary table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};

use reelsmith_story_model::{ItemState, ItemTracker, Stage};

/// Where one item ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub item_id: String,
    pub title: String,
    pub state: ItemState,
    /// Stages satisfied by artifacts from an earlier run.
    pub reused: Vec<Stage>,
    pub video: Option<PathBuf>,
    pub elapsed: Duration,
}

impl ItemOutcome {
    pub fn from_tracker(
        tracker: &ItemTracker,
        title: impl Into<String>,
        video: Option<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        Self {
            item_id: tracker.item_id().to_string(),
            title: title.into(),
            state: tracker.state().clone(),
            reused: tracker.reused_stages().to_vec(),
            video,
            elapsed,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ItemState::Done)
    }

    /// Status column text: `done`, `filtered-out(reason)`, `failed(stage)`...
    pub fn status(&self) -> String {
        self.state.label()
    }

    /// Error message, rejection reason, or output path.
    pub fn detail(&self) -> String {
        match &self.state {
            ItemState::Failed { error, .. } => error.clone(),
            ItemState::Rejected { reason } => reason.to_string(),
            ItemState::Done => self
                .video
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Terminal states of every item the run touched, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub outcomes: Vec<ItemOutcome>,
    /// The run was cancelled before every item finished.
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn push(&mut self, outcome: ItemOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn done_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    /// Count per status kind: `done`, `filtered-out`, `failed`, `cancelled`.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            let kind = match outcome.state {
                ItemState::Done => "done",
                ItemState::Rejected { .. } => "filtered-out",
                ItemState::Failed { .. } => "failed",
                ItemState::Cancelled { .. } => "cancelled",
                _ => "incomplete",
            };
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }

    /// Whether the invocation should exit successfully.
    pub fn succeeded(&self) -> bool {
        self.done_count() > 0
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Item", "Title", "Status", "Reused", "Time", "Detail"]);

        for outcome in &self.outcomes {
            let reused = outcome
                .reused
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",");
            table.add_row(vec![
                Cell::new(&outcome.item_id),
                Cell::new(truncate(&outcome.title, 48)),
                Cell::new(outcome.status()),
                Cell::new(reused),
                Cell::new(format!("{:.1}s", outcome.elapsed.as_secs_f64())),
                Cell::new(truncate(&outcome.detail(), 80)),
            ]);
        }
        table
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.to_table())?;
        let counts = self
            .counts()
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} item(s) - {counts}", self.outcomes.len())?;
        if self.cancelled {
            write!(f, " (run cancelled)")?;
        }
        Ok(())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
