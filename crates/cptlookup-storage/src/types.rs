//! Storage types shared by every decision cache backend.

use std::fmt;

use time::{Duration, OffsetDateTime};

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpsertOutcome {
    /// No record existed for the key; the whole tree was inserted.
    Inserted,
    /// A fresh record existed; incoming determinations were appended.
    Appended,
    /// A stale record existed; its determinations were dropped before the
    /// incoming ones were written.
    Reset,
}

impl UpsertOutcome {
    /// Returns the outcome as a short label for logging.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Appended => "appended",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age after which a cached record is replaced instead of extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessWindow(Duration);

impl StalenessWindow {
    /// Default window used when none is configured.
    pub const DEFAULT_HOURS: u32 = 24;

    #[must_use]
    pub fn from_hours(hours: u32) -> Self {
        Self(Duration::hours(i64::from(hours)))
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.0
    }

    /// A record is stale once its age strictly exceeds the window.
    ///
    /// Records with no `updated_at` are treated as stale.
    #[must_use]
    pub fn is_stale(&self, updated_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
        match updated_at {
            Some(updated_at) => now - updated_at > self.0,
            None => true,
        }
    }
}

impl Default for StalenessWindow {
    fn default() -> Self {
        Self::from_hours(Self::DEFAULT_HOURS)
    }
}
