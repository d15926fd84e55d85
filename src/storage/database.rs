//! Database operations using rusqlite.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use thiserror::Error;

use crate::storage::schema::{
    CURRENT_VERSION, EXERCISE_NAME_COLLATION, SCHEMA, SCHEMA_VERSION_TABLE,
};
use crate::workouts::normalizer::{normalize_exercise_name, WorkoutLookup};
use crate::workouts::types::{
    Exercise, ExerciseId, ProfileId, Set, SetId, SuperSet, SuperSetId, Workout, WorkoutId,
    WorkoutSnapshot,
};

/// Date format used for every date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Connection,
}

/// Row counts of the workout tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub exercises: usize,
    pub workouts: usize,
    pub super_sets: usize,
    pub sets: usize,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        tracing::debug!("Opened database at {}", path.display());

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        self.conn
            .create_collation(EXERCISE_NAME_COLLATION, |a: &str, b: &str| {
                normalize_exercise_name(a).cmp(&normalize_exercise_name(b))
            })
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        self.conn
            .execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = self.get_schema_version()?;

        if current_version < CURRENT_VERSION {
            self.migrate(current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn get_schema_version(&self) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(&self, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            self.conn
                .execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            self.conn
                .execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                    [CURRENT_VERSION],
                )
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, DatabaseError> {
        self.conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    // ========== Exercises ==========

    /// Get an exercise by ID.
    pub fn get_exercise(&self, id: ExerciseId) -> Result<Option<Exercise>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, name FROM exercises WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Exercise {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// List all exercises ordered by id.
    pub fn list_exercises(&self) -> Result<Vec<Exercise>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM exercises ORDER BY id")
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Exercise {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        rows.collect::<SqliteResult<Vec<_>>>()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    // ========== Workouts ==========

    /// Get a workout by ID.
    pub fn get_workout(&self, id: WorkoutId) -> Result<Option<Workout>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, date, set_ids, super_set_ids FROM workouts WHERE id = ?1",
                params![id],
                WorkoutRow::from_row,
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        row.map(WorkoutRow::into_workout).transpose()
    }

    /// Get the workout bound to a (profile, date).
    pub fn get_workout_for_date(
        &self,
        profile_id: &ProfileId,
        date: NaiveDate,
    ) -> Result<Option<Workout>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT w.id, w.date, w.set_ids, w.super_set_ids
                 FROM workouts w
                 JOIN profile_workouts pw ON pw.workout_id = w.id
                 WHERE pw.profile_id = ?1 AND pw.date = ?2",
                params![profile_id.as_str(), date.format(DATE_FORMAT).to_string()],
                WorkoutRow::from_row,
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        row.map(WorkoutRow::into_workout).transpose()
    }

    /// List a profile's workouts, newest first.
    pub fn list_workouts(&self, profile_id: &ProfileId) -> Result<Vec<Workout>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT w.id, w.date, w.set_ids, w.super_set_ids
                 FROM workouts w
                 JOIN profile_workouts pw ON pw.workout_id = w.id
                 WHERE pw.profile_id = ?1
                 ORDER BY w.date DESC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![profile_id.as_str()], WorkoutRow::from_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut workouts = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            workouts.push(row.into_workout()?);
        }

        Ok(workouts)
    }

    // ========== Super sets and sets ==========

    /// Get a super set by ID.
    pub fn get_super_set(&self, id: SuperSetId) -> Result<Option<SuperSet>, DatabaseError> {
        let row: Option<(SuperSetId, String)> = self
            .conn
            .query_row(
                "SELECT id, set_ids FROM super_sets WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        row.map(|(id, set_ids)| {
            Ok(SuperSet {
                id,
                set_ids: decode_ids(&set_ids)?,
            })
        })
        .transpose()
    }

    /// Get a set by ID.
    pub fn get_set(&self, id: SetId) -> Result<Option<Set>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, exercise_id, reps, pr FROM sets WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Set {
                        id: row.get(0)?,
                        exercise_id: row.get(1)?,
                        reps: row.get(2)?,
                        pr: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// Row counts of the four workout tables.
    pub fn table_counts(&self) -> Result<TableCounts, DatabaseError> {
        let count = |table: &str| -> Result<usize, DatabaseError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            Ok(n as usize)
        };

        Ok(TableCounts {
            exercises: count("exercises")?,
            workouts: count("workouts")?,
            super_sets: count("super_sets")?,
            sets: count("sets")?,
        })
    }

    // ========== Sync state ==========

    /// Latest workout date a completed run synced for this profile.
    pub fn high_water_mark(&self, profile_id: &ProfileId) -> Result<Option<NaiveDate>, DatabaseError> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT high_water_mark FROM sync_state WHERE profile_id = ?1",
                params![profile_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        raw.flatten().map(|s| parse_date(&s)).transpose()
    }

    /// Record a completed run. The high-water mark only ever moves forward.
    pub fn record_sync(
        &self,
        profile_id: &ProfileId,
        newest: Option<NaiveDate>,
    ) -> Result<(), DatabaseError> {
        let current = self.high_water_mark(profile_id)?;
        let mark = match (current, newest) {
            (Some(c), Some(n)) => Some(c.max(n)),
            (c, n) => c.or(n),
        };

        self.conn
            .execute(
                "INSERT INTO sync_state (profile_id, high_water_mark, last_synced_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(profile_id) DO UPDATE SET
                    high_water_mark = excluded.high_water_mark,
                    last_synced_at = excluded.last_synced_at",
                params![
                    profile_id.as_str(),
                    mark.map(|d| d.format(DATE_FORMAT).to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }
}

impl WorkoutLookup for Database {
    fn find_exercise(&self, key: &str) -> Result<Option<ExerciseId>, DatabaseError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT id FROM exercises WHERE name = ?1 COLLATE {} ORDER BY id LIMIT 1",
                    EXERCISE_NAME_COLLATION
                ),
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    fn find_workout(
        &self,
        profile_id: &ProfileId,
        date: NaiveDate,
    ) -> Result<Option<WorkoutSnapshot>, DatabaseError> {
        let Some(workout) = self.get_workout_for_date(profile_id, date)? else {
            return Ok(None);
        };

        let mut super_sets = Vec::with_capacity(workout.super_set_ids.len());
        for id in &workout.super_set_ids {
            let super_set = self
                .get_super_set(*id)?
                .ok_or_else(|| DatabaseError::NotFound(format!("Super set {}", id)))?;
            super_sets.push(super_set);
        }

        Ok(Some(WorkoutSnapshot {
            id: workout.id,
            set_ids: workout.set_ids,
            super_sets,
        }))
    }
}

/// Encode an ordered id list for storage.
pub fn encode_ids(ids: &[i64]) -> Result<String, DatabaseError> {
    serde_json::to_string(ids).map_err(|e| DatabaseError::SerializationError(e.to_string()))
}

/// Decode a stored id list.
pub fn decode_ids(raw: &str) -> Result<Vec<i64>, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::DeserializationError(e.to_string()))
}

fn parse_date(raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| DatabaseError::DeserializationError(format!("date {:?}: {}", raw, e)))
}

/// Raw workout row.
struct WorkoutRow {
    id: WorkoutId,
    date: String,
    set_ids: String,
    super_set_ids: String,
}

impl WorkoutRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            set_ids: row.get(2)?,
            super_set_ids: row.get(3)?,
        })
    }

    fn into_workout(self) -> Result<Workout, DatabaseError> {
        Ok(Workout {
            id: self.id,
            date: parse_date(&self.date)?,
            set_ids: decode_ids(&self.set_ids)?,
            super_set_ids: decode_ids(&self.super_set_ids)?,
        })
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl DatabaseError {
    /// Classify a rusqlite error raised while writing.
    pub fn from_write(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DatabaseError::ConstraintViolation(e.to_string())
            }
            other => DatabaseError::QueryFailed(other.to_string()),
        }
    }
}
