//! Listing parameters.

use std::fmt;
use std::str::FromStr;

use reelsmith_common::config::SourceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Hot,
    New,
    Top,
    Rising,
    Controversial,
}

impl SortMode {
    pub const ALL: [SortMode; 5] = [
        SortMode::Hot,
        SortMode::New,
        SortMode::Top,
        SortMode::Rising,
        SortMode::Controversial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
            Self::Controversial => "controversial",
        }
    }

    /// Whether the listing honours a time filter.
    pub fn uses_time_filter(self) -> bool {
        matches!(self, Self::Top | Self::Controversial)
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lower)
            .ok_or_else(|| {
                format!("unknown sort mode '{s}' (expected hot, new, top, rising or controversial)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|filter| filter.as_str() == lower)
            .ok_or_else(|| {
                format!("unknown time filter '{s}' (expected hour, day, week, month, year or all)")
            })
    }
}

/// One listing request against a single category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub category: String,
    pub sort: SortMode,
    pub time_filter: TimeFilter,
    pub limit: usize,
}

impl FetchQuery {
    pub fn new(category: impl Into<String>, limit: usize) -> Self {
        Self {
            category: category.into(),
            sort: SortMode::default(),
            time_filter: TimeFilter::default(),
            limit,
        }
    }

    /// Query using the configured sort and time filter.
    ///
    /// Unparseable configured values fall back to the defaults with a warning.
    pub fn from_config(config: &SourceConfig, category: impl Into<String>, limit: usize) -> Self {
        let sort = config.sort.parse().unwrap_or_else(|err: String| {
            tracing::warn!(error = %err, "Using default sort mode");
            SortMode::default()
        });
        let time_filter = config.time_filter.parse().unwrap_or_else(|err: String| {
            tracing::warn!(error = %err, "Using default time filter");
            TimeFilter::default()
        });
        Self {
            category: category.into(),
            sort,
            time_filter,
            limit,
        }
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_time_filter(mut self, time_filter: TimeFilter) -> Self {
        self.time_filter = time_filter;
        self
    }
}
