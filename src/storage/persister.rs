//! Workout persistence.
//!
//! Each [`NormalizedWorkout`] is written inside its own transaction: the
//! workout, its supersets and sets are either all visible or none are.
//! Rows that already exist are updated only when their content changed, so
//! a re-sync of unchanged data writes nothing.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, OptionalExtension, Transaction};
use thiserror::Error;

use crate::storage::database::{encode_ids, Database, DatabaseError, DATE_FORMAT};
use crate::storage::schema::EXERCISE_NAME_COLLATION;
use crate::workouts::normalizer::normalize_exercise_name;
use crate::workouts::types::{
    ExerciseId, ExerciseRef, NormalizedSet, NormalizedWorkout, SetId, SuperSetId, WorkoutId,
};

/// Failure while committing one workout. Only that workout is rolled back.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("workout {date}: {source}")]
    Workout {
        date: String,
        #[source]
        source: DatabaseError,
    },
}

/// What happened to the workout row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutStatus {
    Created,
    Updated,
    Unchanged,
}

/// Counts for one committed workout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub workout_id: WorkoutId,
    pub status: WorkoutStatus,
    pub exercises_created: usize,
    pub super_sets_created: usize,
    pub sets_created: usize,
    pub rows_deleted: usize,
    /// Exercises inserted by this workout, as (display name, id)
    pub new_exercises: Vec<(String, ExerciseId)>,
}

impl PersistOutcome {
    fn new() -> Self {
        Self {
            workout_id: 0,
            status: WorkoutStatus::Unchanged,
            exercises_created: 0,
            super_sets_created: 0,
            sets_created: 0,
            rows_deleted: 0,
            new_exercises: Vec::new(),
        }
    }
}

/// Writes normalized workouts to the store.
pub struct Persister<'a> {
    db: &'a mut Database,
}

impl<'a> Persister<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    /// Upsert one workout and everything it references.
    pub fn persist(&mut self, workout: &NormalizedWorkout) -> Result<PersistOutcome, PersistError> {
        let date = workout.date.format(DATE_FORMAT).to_string();
        let wrap = |source: DatabaseError| PersistError::Workout {
            date: date.clone(),
            source,
        };

        let tx = self.db.transaction().map_err(wrap)?;
        let outcome = write_workout(&tx, workout).map_err(wrap)?;
        tx.commit()
            .map_err(|e| wrap(DatabaseError::TransactionFailed(e.to_string())))?;

        tracing::debug!(
            "Committed workout {} ({:?}): {} sets created, {} rows deleted",
            date,
            outcome.status,
            outcome.sets_created,
            outcome.rows_deleted
        );

        Ok(outcome)
    }
}

/// Everything inside the transaction. Any error drops `tx` uncommitted.
fn write_workout(
    tx: &Transaction<'_>,
    workout: &NormalizedWorkout,
) -> Result<PersistOutcome, DatabaseError> {
    let mut outcome = PersistOutcome::new();
    let mut changed = false;
    let mut exercises: HashMap<String, ExerciseId> = HashMap::new();

    let mut set_ids = Vec::with_capacity(workout.sets.len());
    for set in &workout.sets {
        let id = write_set(tx, set, &mut exercises, &mut outcome, &mut changed)?;
        set_ids.push(id);
    }

    let mut super_set_ids = Vec::with_capacity(workout.super_sets.len());
    for super_set in &workout.super_sets {
        let mut member_ids = Vec::with_capacity(super_set.sets.len());
        for set in &super_set.sets {
            let id = write_set(tx, set, &mut exercises, &mut outcome, &mut changed)?;
            member_ids.push(id);
        }
        let members = encode_ids(&member_ids)?;

        let id = match super_set.id {
            Some(id) => {
                let n = tx
                    .execute(
                        "UPDATE super_sets SET set_ids = ?2 WHERE id = ?1 AND set_ids IS NOT ?2",
                        params![id, members],
                    )
                    .map_err(DatabaseError::from_write)?;
                changed |= n > 0;
                id
            }
            None => {
                tx.execute("INSERT INTO super_sets (set_ids) VALUES (?1)", params![members])
                    .map_err(DatabaseError::from_write)?;
                outcome.super_sets_created += 1;
                changed = true;
                tx.last_insert_rowid()
            }
        };
        super_set_ids.push(id);
    }

    let date = workout.date.format(DATE_FORMAT).to_string();
    let sets_json = encode_ids(&set_ids)?;
    let super_sets_json = encode_ids(&super_set_ids)?;

    outcome.workout_id = match workout.id {
        Some(id) => {
            let n = tx
                .execute(
                    "UPDATE workouts SET date = ?2, set_ids = ?3, super_set_ids = ?4
                     WHERE id = ?1
                       AND (date IS NOT ?2 OR set_ids IS NOT ?3 OR super_set_ids IS NOT ?4)",
                    params![id, date, sets_json, super_sets_json],
                )
                .map_err(DatabaseError::from_write)?;
            changed |= n > 0;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO workouts (date, set_ids, super_set_ids) VALUES (?1, ?2, ?3)",
                params![date, sets_json, super_sets_json],
            )
            .map_err(DatabaseError::from_write)?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO profile_workouts (profile_id, date, workout_id) VALUES (?1, ?2, ?3)",
                params![workout.profile_id.as_str(), date, id],
            )
            .map_err(DatabaseError::from_write)?;
            outcome.status = WorkoutStatus::Created;
            id
        }
    };

    if let Some(previous) = &workout.previous {
        let kept_sets: HashSet<SetId> = set_ids.iter().copied().collect();
        let kept_super_sets: HashSet<SuperSetId> = super_set_ids.iter().copied().collect();
        let mut kept_members: HashSet<SetId> = kept_sets;
        for super_set in &workout.super_sets {
            kept_members.extend(super_set.sets.iter().filter_map(|s| s.id));
        }

        for stale in previous
            .super_sets
            .iter()
            .filter(|s| !kept_super_sets.contains(&s.id))
        {
            outcome.rows_deleted += tx
                .execute("DELETE FROM super_sets WHERE id = ?1", params![stale.id])
                .map_err(DatabaseError::from_write)?;
        }

        for stale in previous
            .all_set_ids()
            .into_iter()
            .filter(|id| !kept_members.contains(id))
        {
            outcome.rows_deleted += tx
                .execute("DELETE FROM sets WHERE id = ?1", params![stale])
                .map_err(DatabaseError::from_write)?;
        }

        changed |= outcome.rows_deleted > 0;
        if changed {
            outcome.status = WorkoutStatus::Updated;
        }
    }

    Ok(outcome)
}

/// Insert or update one set, returning its id.
fn write_set(
    tx: &Transaction<'_>,
    set: &NormalizedSet,
    exercises: &mut HashMap<String, ExerciseId>,
    outcome: &mut PersistOutcome,
    changed: &mut bool,
) -> Result<SetId, DatabaseError> {
    let exercise_id = resolve_exercise(tx, &set.exercise, exercises, outcome)?;

    match set.id {
        Some(id) => {
            let n = tx
                .execute(
                    "UPDATE sets SET exercise_id = ?2, reps = ?3, pr = ?4
                     WHERE id = ?1 AND (exercise_id IS NOT ?2 OR reps IS NOT ?3 OR pr IS NOT ?4)",
                    params![id, exercise_id, set.reps, set.pr],
                )
                .map_err(DatabaseError::from_write)?;
            *changed |= n > 0;
            Ok(id)
        }
        None => {
            tx.execute(
                "INSERT INTO sets (exercise_id, reps, pr) VALUES (?1, ?2, ?3)",
                params![exercise_id, set.reps, set.pr],
            )
            .map_err(DatabaseError::from_write)?;
            outcome.sets_created += 1;
            *changed = true;
            Ok(tx.last_insert_rowid())
        }
    }
}

/// Get the id for an exercise reference, inserting the name if needed.
fn resolve_exercise(
    tx: &Transaction<'_>,
    exercise: &ExerciseRef,
    exercises: &mut HashMap<String, ExerciseId>,
    outcome: &mut PersistOutcome,
) -> Result<ExerciseId, DatabaseError> {
    let name = match exercise {
        ExerciseRef::Existing(id) => return Ok(*id),
        ExerciseRef::New(name) => name,
    };

    let key = normalize_exercise_name(name);
    if let Some(id) = exercises.get(&key) {
        return Ok(*id);
    }

    let existing: Option<ExerciseId> = tx
        .query_row(
            &format!(
                "SELECT id FROM exercises WHERE name = ?1 COLLATE {} ORDER BY id LIMIT 1",
                EXERCISE_NAME_COLLATION
            ),
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    let id = match existing {
        Some(id) => id,
        None => {
            tx.execute("INSERT INTO exercises (name) VALUES (?1)", params![name])
                .map_err(DatabaseError::from_write)?;
            let id = tx.last_insert_rowid();
            outcome.exercises_created += 1;
            outcome.new_exercises.push((name.clone(), id));
            id
        }
    };
    exercises.insert(key, id);

    Ok(id)
}
