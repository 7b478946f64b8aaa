//! URL entries: the rows of a rendered sitemap.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

/// `lastmod` rendering: UTC with millisecond precision, e.g. `2023-01-01T00:00:00.000Z`.
const LASTMOD_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// Change-frequency hints defined by the sitemap protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeFrequency::Always => "always",
            ChangeFrequency::Hourly => "hourly",
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Yearly => "yearly",
            ChangeFrequency::Never => "never",
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<url>` row. Built fresh on every rebuild and never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub location: String,
    pub last_modified: Option<OffsetDateTime>,
    pub change_frequency: Option<ChangeFrequency>,
}

impl UrlEntry {
    pub fn new(
        location: impl Into<String>,
        last_modified: Option<OffsetDateTime>,
        change_frequency: Option<ChangeFrequency>,
    ) -> Self {
        Self {
            location: location.into(),
            last_modified,
            change_frequency,
        }
    }

    /// `lastmod` value as written to the document.
    pub fn last_modified_iso(&self) -> Option<String> {
        self.last_modified.and_then(format_lastmod)
    }

    pub fn has_location(&self) -> bool {
        !self.location.trim().is_empty()
    }
}

/// Render a timestamp the way `lastmod` values are written.
pub fn format_lastmod(value: OffsetDateTime) -> Option<String> {
    value.to_offset(UtcOffset::UTC).format(LASTMOD_FORMAT).ok()
}
