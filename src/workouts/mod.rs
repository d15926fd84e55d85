//! Workout extraction pipeline: page fetching, parsing and normalization.

pub mod fetcher;
pub mod normalizer;
pub mod parser;
pub mod types;

pub use fetcher::{FetchError, FetchMode, PageStream, Termination, WorkoutFetcher};
pub use normalizer::{group_by_date, normalize_exercise_name, Normalizer, WorkoutLookup};
pub use parser::{MarkupRules, ParseError, ParseErrorKind, ParsedPage, RecordParser};
pub use types::{
    Exercise, ExerciseId, NormalizedWorkout, PageCursor, ProfileId, RawEntry, RawPage, Set,
    SuperSet, Workout, WorkoutSnapshot,
};
