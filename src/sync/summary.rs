//! Run summary reporting.

use chrono::NaiveDate;

use crate::storage::persister::{PersistOutcome, WorkoutStatus};
use crate::workouts::fetcher::Termination;

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Profile the run signed in as
    pub profile_id: Option<String>,
    /// Pages handed to the parser
    pub pages_scraped: usize,
    /// Entries parsed successfully
    pub entries_parsed: usize,
    /// Entries dropped as malformed
    pub entries_skipped: usize,
    pub workouts_created: usize,
    pub workouts_updated: usize,
    pub workouts_unchanged: usize,
    pub exercises_created: usize,
    pub super_sets_created: usize,
    pub sets_created: usize,
    /// Stale superset and set rows removed while reconciling
    pub rows_deleted: usize,
    /// Newest workout date committed in this run
    pub newest_date: Option<NaiveDate>,
    /// Why pagination stopped
    pub termination: Option<Termination>,
}

impl RunSummary {
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self {
            profile_id: Some(profile_id.into()),
            ..Default::default()
        }
    }

    /// Fold one committed workout into the totals.
    pub fn record(&mut self, date: NaiveDate, outcome: &PersistOutcome) {
        match outcome.status {
            WorkoutStatus::Created => self.workouts_created += 1,
            WorkoutStatus::Updated => self.workouts_updated += 1,
            WorkoutStatus::Unchanged => self.workouts_unchanged += 1,
        }
        self.exercises_created += outcome.exercises_created;
        self.super_sets_created += outcome.super_sets_created;
        self.sets_created += outcome.sets_created;
        self.rows_deleted += outcome.rows_deleted;
        self.newest_date = Some(self.newest_date.map_or(date, |d| d.max(date)));
    }

    /// Workouts committed, whether or not anything changed.
    pub fn workouts_synced(&self) -> usize {
        self.workouts_created + self.workouts_updated + self.workouts_unchanged
    }

    /// Total rows inserted across the workout tables.
    pub fn rows_created(&self) -> usize {
        self.workouts_created + self.exercises_created + self.super_sets_created + self.sets_created
    }

    /// One line suitable for a notification body.
    pub fn headline(&self) -> String {
        format!(
            "{} workouts synced ({} new, {} updated) from {} pages",
            self.workouts_synced(),
            self.workouts_created,
            self.workouts_updated,
            self.pages_scraped
        )
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pages scraped:      {}", self.pages_scraped)?;
        writeln!(
            f,
            "Entries:            {} parsed, {} skipped",
            self.entries_parsed, self.entries_skipped
        )?;
        writeln!(
            f,
            "Workouts:           {} created, {} updated, {} unchanged",
            self.workouts_created, self.workouts_updated, self.workouts_unchanged
        )?;
        writeln!(
            f,
            "Rows created:       {} exercises, {} super sets, {} sets",
            self.exercises_created, self.super_sets_created, self.sets_created
        )?;
        match self.newest_date {
            Some(date) => write!(f, "Newest workout:     {}", date),
            None => write!(f, "Newest workout:     none"),
        }
    }
}
