//! Database schema definitions.
//!
//! The four workout tables keep the column layout other tools read. The
//! profile binding and sync bookkeeping live in separate tables so those
//! four stay untouched.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Exercises: name is the natural key
CREATE TABLE IF NOT EXISTS exercises (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE
);

-- Workouts: id lists are JSON arrays in stored order
CREATE TABLE IF NOT EXISTS workouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    set_ids TEXT NOT NULL DEFAULT '[]',
    super_set_ids TEXT NOT NULL DEFAULT '[]'
);

-- Super sets: member order is significant
CREATE TABLE IF NOT EXISTS super_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    set_ids TEXT NOT NULL DEFAULT '[]'
);

-- Sets
CREATE TABLE IF NOT EXISTS sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exercise_id INTEGER NOT NULL REFERENCES exercises(id),
    reps INTEGER NOT NULL,
    pr BOOLEAN NOT NULL DEFAULT 0
);

-- (profile, date) -> workout binding used for upserts
CREATE TABLE IF NOT EXISTS profile_workouts (
    profile_id TEXT NOT NULL,
    date TEXT NOT NULL,
    workout_id INTEGER NOT NULL UNIQUE REFERENCES workouts(id) ON DELETE CASCADE,
    PRIMARY KEY (profile_id, date)
);

-- Per-profile sync bookkeeping
CREATE TABLE IF NOT EXISTS sync_state (
    profile_id TEXT PRIMARY KEY,
    high_water_mark TEXT,
    last_synced_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workouts_date ON workouts(date);
CREATE INDEX IF NOT EXISTS idx_sets_exercise_id ON sets(exercise_id);
"#;

/// Schema version table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Collation comparing exercise names by their lookup key.
///
/// `COLLATE NOCASE` on `exercises.name` only folds ASCII letters, so lookups
/// go through this instead. It exists only on connections opened by
/// `Database`.
pub const EXERCISE_NAME_COLLATION: &str = "exercise_name";

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Tables whose layout is shared with external readers.
pub const CONTRACT_TABLES: [&str; 4] = ["exercises", "workouts", "super_sets", "sets"];
