//! Unit tests for the activity stream parser.

use chrono::NaiveDate;

use fitocracy_sync::workouts::parser::{MarkupRules, ParseErrorKind, RecordParser};
use fitocracy_sync::workouts::types::{PageCursor, RawPage};

/// A page with four well-formed set lines and three broken ones.
const MIXED_PAGE: &str = r#"
<div class="stream">
  <div class="stream-item">
    <time datetime="2024-03-02T18:04:00Z">Mar 2</time>
    <div class="action-group">
      <span class="action-name">Deadlift</span>
      <div class="action-set">315 lb x 3 reps <span class="pr">PR</span></div>
      <div class="action-set">315 lb</div>
      <div class="action-set">275 lb x 5 reps</div>
    </div>
    <div class="action-group">
      <span class="action-name">  </span>
      <div class="action-set">10 reps</div>
    </div>
  </div>
  <div class="stream-item">
    <div class="action-group">
      <span class="action-name">Squat</span>
      <div class="action-set">5 reps</div>
    </div>
  </div>
  <div class="stream-item">
    <time datetime="2024-03-01"></time>
    <div class="action-group" data-superset="7">
      <span class="action-name">Pull Up</span>
      <div class="action-set">12</div>
      <div class="action-set">8 reps (PR)</div>
    </div>
  </div>
</div>"#;

fn raw_page(page: usize, content: &str) -> RawPage {
    RawPage {
        cursor: PageCursor { page },
        url: format!("https://example.test/stream/{}", page),
        content: content.to_string(),
    }
}

fn default_parser() -> RecordParser {
    RecordParser::new(&MarkupRules::default()).expect("default rules compile")
}

#[test]
fn test_every_line_is_an_entry_or_an_error() {
    let parsed = default_parser().parse(&raw_page(3, MIXED_PAGE));

    assert_eq!(parsed.entries.len(), 4);
    assert_eq!(parsed.errors.len(), 3);
    assert_eq!(parsed.processed(), 7);
}

#[test]
fn test_errors_carry_page_and_position() {
    let parsed = default_parser().parse(&raw_page(3, MIXED_PAGE));

    let kinds: Vec<(usize, &ParseErrorKind)> =
        parsed.errors.iter().map(|e| (e.position, &e.kind)).collect();

    assert!(parsed.errors.iter().all(|e| e.page == 3));
    assert!(matches!(kinds[0], (1, ParseErrorKind::MissingReps(_))));
    assert!(matches!(kinds[1], (3, ParseErrorKind::MissingExerciseName)));
    assert!(matches!(kinds[2], (4, ParseErrorKind::MissingDate)));
}

#[test]
fn test_entries_keep_page_order_and_flags() {
    let parsed = default_parser().parse(&raw_page(0, MIXED_PAGE));
    let march_2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let march_1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    let summary: Vec<(&str, u32, bool, NaiveDate)> = parsed
        .entries
        .iter()
        .map(|e| (e.exercise_name.as_str(), e.reps, e.pr, e.date))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("Deadlift", 3, true, march_2),
            ("Deadlift", 5, false, march_2),
            ("Pull Up", 12, false, march_1),
            ("Pull Up", 8, true, march_1),
        ]
    );
    assert_eq!(parsed.entries[2].superset.as_deref(), Some("7"));
    assert_eq!(parsed.entries[0].superset, None);
}

#[test]
fn test_newest_date_skips_undated_items() {
    let parser = default_parser();
    let page = raw_page(0, MIXED_PAGE);

    assert_eq!(parser.newest_date(&page), NaiveDate::from_ymd_opt(2024, 3, 2));
    assert!(!parser.is_empty_page(&page));
    assert_eq!(parser.newest_date(&raw_page(1, "")), None);
}

#[test]
fn test_custom_markup_rules() {
    let rules = MarkupRules {
        item: "article.workout".to_string(),
        date: ".when".to_string(),
        date_attr: "data-day".to_string(),
        group: "section".to_string(),
        exercise_name: "h3".to_string(),
        superset_attr: "data-group".to_string(),
        set_line: "li".to_string(),
        pr_badge: ".record".to_string(),
    };
    let parser = RecordParser::new(&rules).unwrap();
    let html = r#"
        <article class="workout">
          <span class="when" data-day="2023-12-31"></span>
          <section data-group="x">
            <h3>Front Squat</h3>
            <ul><li>6 reps <b class="record"></b></li><li>4 reps</li></ul>
          </section>
        </article>"#;

    let parsed = parser.parse(&raw_page(0, html));

    assert!(parsed.errors.is_empty());
    assert_eq!(parsed.entries.len(), 2);
    assert_eq!(parsed.entries[0].exercise_name, "Front Squat");
    assert!(parsed.entries[0].pr);
    assert!(!parsed.entries[1].pr);
    assert_eq!(parsed.entries[1].superset.as_deref(), Some("x"));
}

#[test]
fn test_date_text_fallback() {
    let html = r#"
        <div class="stream-item">
          <time> 2024-07-04 </time>
          <div class="action-group">
            <span class="action-name">Row</span>
            <div class="action-set">10 reps</div>
          </div>
        </div>"#;

    let parsed = default_parser().parse(&raw_page(0, html));

    assert_eq!(parsed.entries[0].date, NaiveDate::from_ymd_opt(2024, 7, 4).unwrap());
}
