//! Entry normalization.
//!
//! Turns the raw entries of one (profile, date) into a [`NormalizedWorkout`]:
//! exercise names are resolved to stable ids, consecutive entries sharing a
//! superset marker are grouped, and ids already in the store for that date
//! are reused so a re-sync reconciles rows in place.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::storage::database::DatabaseError;
use crate::workouts::types::{
    ExerciseId, ExerciseRef, NormalizedSet, NormalizedSuperSet, NormalizedWorkout, ProfileId,
    RawEntry, WorkoutSnapshot,
};

/// Read access to what earlier syncs stored.
pub trait WorkoutLookup {
    /// Find an exercise by normalized name.
    fn find_exercise(&self, key: &str) -> Result<Option<ExerciseId>, DatabaseError>;

    /// Find the stored workout for a (profile, date).
    fn find_workout(
        &self,
        profile_id: &ProfileId,
        date: NaiveDate,
    ) -> Result<Option<WorkoutSnapshot>, DatabaseError>;
}

/// Exercise name with whitespace runs collapsed and the ends trimmed.
pub fn display_exercise_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key for exercise names: case and whitespace insensitive.
pub fn normalize_exercise_name(name: &str) -> String {
    display_exercise_name(name).to_lowercase()
}

/// Group entries by date, keeping first-seen date order and entry order.
pub fn group_by_date(entries: Vec<RawEntry>) -> Vec<(NaiveDate, Vec<RawEntry>)> {
    let mut groups: Vec<(NaiveDate, Vec<RawEntry>)> = Vec::new();

    for entry in entries {
        match groups.iter_mut().find(|(date, _)| *date == entry.date) {
            Some((_, group)) => group.push(entry),
            None => groups.push((entry.date, vec![entry])),
        }
    }

    groups
}

/// Resolves names and assigns ids. Keeps a name cache for the whole run.
#[derive(Debug, Default)]
pub struct Normalizer {
    exercise_cache: HashMap<String, ExerciseId>,
}

impl Normalizer {
    /// Create a normalizer with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of exercise names cached so far.
    pub fn cached_exercises(&self) -> usize {
        self.exercise_cache.len()
    }

    /// Record an id the store handed out for a new exercise.
    pub fn remember_exercise(&mut self, name: &str, id: ExerciseId) {
        self.exercise_cache
            .insert(normalize_exercise_name(name), id);
    }

    fn resolve_exercise(
        &mut self,
        name: &str,
        lookup: &impl WorkoutLookup,
    ) -> Result<ExerciseRef, DatabaseError> {
        let key = normalize_exercise_name(name);

        if let Some(id) = self.exercise_cache.get(&key) {
            return Ok(ExerciseRef::Existing(*id));
        }

        match lookup.find_exercise(&key)? {
            Some(id) => {
                self.exercise_cache.insert(key, id);
                Ok(ExerciseRef::Existing(id))
            }
            None => Ok(ExerciseRef::New(display_exercise_name(name))),
        }
    }

    /// Normalize the entries of one workout date.
    ///
    /// Entries whose date differs from `date` are ignored; callers split a
    /// page with [`group_by_date`] first.
    pub fn normalize(
        &mut self,
        profile_id: &ProfileId,
        date: NaiveDate,
        entries: &[RawEntry],
        lookup: &impl WorkoutLookup,
    ) -> Result<NormalizedWorkout, DatabaseError> {
        let previous = lookup.find_workout(profile_id, date)?;

        let mut sets: Vec<NormalizedSet> = Vec::new();
        let mut super_sets: Vec<NormalizedSuperSet> = Vec::new();
        let mut open_marker: Option<&str> = None;

        for entry in entries.iter().filter(|e| e.date == date) {
            let set = NormalizedSet {
                id: None,
                exercise: self.resolve_exercise(&entry.exercise_name, lookup)?,
                reps: entry.reps,
                pr: entry.pr,
            };

            match entry.superset.as_deref() {
                Some(marker) if open_marker == Some(marker) => {
                    if let Some(current) = super_sets.last_mut() {
                        current.sets.push(set);
                    }
                }
                Some(marker) => {
                    super_sets.push(NormalizedSuperSet {
                        id: None,
                        sets: vec![set],
                    });
                    open_marker = Some(marker);
                }
                None => {
                    sets.push(set);
                    open_marker = None;
                }
            }
        }

        if let Some(snapshot) = &previous {
            reuse_ids(snapshot, &mut sets, &mut super_sets);
        }

        Ok(NormalizedWorkout {
            profile_id: profile_id.clone(),
            id: previous.as_ref().map(|p| p.id),
            date,
            sets,
            super_sets,
            previous,
        })
    }
}

/// Hand stored ids to new rows by position.
fn reuse_ids(
    snapshot: &WorkoutSnapshot,
    sets: &mut [NormalizedSet],
    super_sets: &mut [NormalizedSuperSet],
) {
    for (set, id) in sets.iter_mut().zip(&snapshot.set_ids) {
        set.id = Some(*id);
    }

    for (super_set, stored) in super_sets.iter_mut().zip(&snapshot.super_sets) {
        super_set.id = Some(stored.id);
        for (set, id) in super_set.sets.iter_mut().zip(&stored.set_ids) {
            set.id = Some(*id);
        }
    }
}
