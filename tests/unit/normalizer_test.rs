//! Unit tests for entry normalization against a real store.

use chrono::NaiveDate;

use fitocracy_sync::storage::database::Database;
use fitocracy_sync::storage::persister::Persister;
use fitocracy_sync::workouts::normalizer::{group_by_date, normalize_exercise_name, Normalizer};
use fitocracy_sync::workouts::types::{ExerciseRef, ProfileId, RawEntry};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
}

fn entry(name: &str, reps: u32, day: u32, superset: Option<&str>) -> RawEntry {
    RawEntry {
        exercise_name: name.to_string(),
        reps,
        pr: false,
        date: date(day),
        superset: superset.map(str::to_string),
    }
}

#[test]
fn test_name_keys_ignore_case_and_spacing() {
    let keys: Vec<String> = ["Bench Press", "bench press", "  BENCH\tPRESS "]
        .iter()
        .map(|n| normalize_exercise_name(n))
        .collect();

    assert!(keys.iter().all(|k| k == "bench press"));
    assert_ne!(normalize_exercise_name("Incline Bench Press"), keys[0]);
}

#[test]
fn test_group_by_date_keeps_stream_order() {
    let groups = group_by_date(vec![
        entry("Squat", 5, 3, None),
        entry("Row", 8, 2, None),
        entry("Squat", 3, 3, None),
        entry("Dip", 10, 1, None),
    ]);

    let shape: Vec<(NaiveDate, Vec<u32>)> = groups
        .iter()
        .map(|(d, entries)| (*d, entries.iter().map(|e| e.reps).collect()))
        .collect();

    assert_eq!(
        shape,
        vec![
            (date(3), vec![5, 3]),
            (date(2), vec![8]),
            (date(1), vec![10]),
        ]
    );
}

#[test]
fn test_stored_exercise_resolved_in_any_casing() {
    let mut db = Database::open_in_memory().unwrap();
    let profile = ProfileId::new("9");

    let first = Normalizer::new()
        .normalize(&profile, date(1), &[entry("Bench Press", 5, 1, None)], &db)
        .unwrap();
    let outcome = Persister::new(&mut db).persist(&first).unwrap();
    let (_, bench_id) = outcome.new_exercises[0].clone();

    let mut normalizer = Normalizer::new();
    let second = normalizer
        .normalize(&profile, date(2), &[entry("BENCH  PRESS", 5, 2, None)], &db)
        .unwrap();

    assert_eq!(second.sets[0].exercise, ExerciseRef::Existing(bench_id));
    assert!(second.previous.is_none());
    assert_eq!(normalizer.cached_exercises(), 1);
}

#[test]
fn test_resync_picks_up_stored_ids() {
    let mut db = Database::open_in_memory().unwrap();
    let profile = ProfileId::new("9");
    let entries = [
        entry("Pull Up", 10, 4, Some("s1")),
        entry("Dip", 12, 4, Some("s1")),
        entry("Squat", 5, 4, None),
    ];

    let first = Normalizer::new()
        .normalize(&profile, date(4), &entries, &db)
        .unwrap();
    let outcome = Persister::new(&mut db).persist(&first).unwrap();

    let again = Normalizer::new()
        .normalize(&profile, date(4), &entries, &db)
        .unwrap();

    assert_eq!(again.id, Some(outcome.workout_id));
    assert!(again.sets.iter().all(|s| s.id.is_some()));
    assert!(again.super_sets[0].id.is_some());
    assert!(again.super_sets[0].sets.iter().all(|s| s.id.is_some()));
}

#[test]
fn test_same_date_other_profile_is_a_new_workout() {
    let mut db = Database::open_in_memory().unwrap();
    let entries = [entry("Squat", 5, 6, None)];

    let mine = Normalizer::new()
        .normalize(&ProfileId::new("1"), date(6), &entries, &db)
        .unwrap();
    Persister::new(&mut db).persist(&mine).unwrap();

    let theirs = Normalizer::new()
        .normalize(&ProfileId::new("2"), date(6), &entries, &db)
        .unwrap();

    assert!(theirs.previous.is_none());
    assert_eq!(theirs.id, None);
}
