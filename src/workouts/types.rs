//! Workout record types.
//!
//! Covers the three shapes a workout takes on its way through a sync:
//! raw page content from the activity stream, raw entries lifted out of a
//! page, and normalized workouts ready to be written to the store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Store-assigned exercise identifier.
pub type ExerciseId = i64;
/// Store-assigned set identifier.
pub type SetId = i64;
/// Store-assigned superset identifier.
pub type SuperSetId = i64;
/// Store-assigned workout identifier.
pub type WorkoutId = i64;

/// Remote profile identifier captured after login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(String);

impl ProfileId {
    /// Wrap a profile identifier. Surrounding whitespace is dropped.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self(id.trim().to_string())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCursor {
    /// Zero-based page number
    pub page: usize,
}

impl PageCursor {
    /// Cursor at the newest page.
    pub fn start() -> Self {
        Self::default()
    }

    /// Cursor for the page after this one.
    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
        }
    }

    /// Item offset of this page for a given page size.
    pub fn offset(self, page_size: usize) -> usize {
        self.page * page_size
    }
}

/// Rendered content of one activity stream page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Where this page sits in the stream
    pub cursor: PageCursor,
    /// URL the content was fetched from
    pub url: String,
    /// Raw markup
    pub content: String,
}

/// One set as observed on a page, before name resolution or grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Exercise name exactly as displayed
    pub exercise_name: String,
    /// Repetitions performed
    pub reps: u32,
    /// Personal record flag
    pub pr: bool,
    /// Date of the workout the set belongs to
    pub date: NaiveDate,
    /// Superset grouping marker, if the set was part of one
    pub superset: Option<String>,
}

/// Exercise row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
}

/// Set row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub id: SetId,
    pub exercise_id: ExerciseId,
    pub reps: u32,
    pub pr: bool,
}

/// Superset row. Member order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperSet {
    pub id: SuperSetId,
    pub set_ids: Vec<SetId>,
}

/// Workout row.
///
/// `set_ids` only lists sets that are not part of a superset; superset
/// members are reached through `super_set_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workout {
    pub id: WorkoutId,
    pub date: NaiveDate,
    pub set_ids: Vec<SetId>,
    pub super_set_ids: Vec<SuperSetId>,
}

/// Stored shape of a workout, used to reconcile a re-synced date in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkoutSnapshot {
    /// Existing workout id
    pub id: WorkoutId,
    /// Standalone set ids in stored order
    pub set_ids: Vec<SetId>,
    /// Supersets in stored order
    pub super_sets: Vec<SuperSet>,
}

impl WorkoutSnapshot {
    /// Every set id reachable from the workout, superset members included.
    pub fn all_set_ids(&self) -> Vec<SetId> {
        let mut ids = self.set_ids.clone();
        for super_set in &self.super_sets {
            ids.extend(super_set.set_ids.iter().copied());
        }
        ids
    }
}

/// Exercise reference after name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseRef {
    /// Already in the store
    Existing(ExerciseId),
    /// Not seen yet; carries the cleaned display name
    New(String),
}

/// A set ready to be persisted. `id` is set when reusing a stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSet {
    pub id: Option<SetId>,
    pub exercise: ExerciseRef,
    pub reps: u32,
    pub pr: bool,
}

/// A superset ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSuperSet {
    pub id: Option<SuperSetId>,
    pub sets: Vec<NormalizedSet>,
}

/// One workout for a (profile, date), with ids assigned where known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWorkout {
    /// Owning profile
    pub profile_id: ProfileId,
    /// Existing workout id when this date was synced before
    pub id: Option<WorkoutId>,
    /// Workout date
    pub date: NaiveDate,
    /// Standalone sets in page order
    pub sets: Vec<NormalizedSet>,
    /// Supersets in page order
    pub super_sets: Vec<NormalizedSuperSet>,
    /// What the store held for this date before the sync, if anything
    pub previous: Option<WorkoutSnapshot>,
}

impl NormalizedWorkout {
    /// Total number of sets, superset members included.
    pub fn set_count(&self) -> usize {
        self.sets.len() + self.super_sets.iter().map(|s| s.sets.len()).sum::<usize>()
    }
}
