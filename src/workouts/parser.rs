//! Activity stream page parser.
//!
//! Pulls dated set entries out of one page of stream markup. The markup
//! shape is described by [`MarkupRules`] so it can be tuned from the
//! config file without a rebuild.
//!
//! Every set line yields exactly one [`RawEntry`] or exactly one
//! [`ParseError`], in page order. A bad line never takes the rest of the
//! page down with it.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workouts::types::{RawEntry, RawPage};

static REPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*reps?\b").expect("valid reps pattern"));

static PR_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bPR\b").expect("valid PR pattern"));

/// CSS selectors describing where entries live in a stream page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupRules {
    /// One workout post in the stream
    pub item: String,
    /// Date element inside an item
    pub date: String,
    /// Attribute on the date element holding an ISO date; text is the fallback
    pub date_attr: String,
    /// One exercise block inside an item
    pub group: String,
    /// Exercise name inside a group
    pub exercise_name: String,
    /// Attribute on a group carrying the superset marker
    pub superset_attr: String,
    /// One set line inside a group
    pub set_line: String,
    /// Personal record badge inside a set line
    pub pr_badge: String,
}

impl Default for MarkupRules {
    fn default() -> Self {
        Self {
            item: ".stream-item".to_string(),
            date: "time".to_string(),
            date_attr: "datetime".to_string(),
            group: ".action-group".to_string(),
            exercise_name: ".action-name".to_string(),
            superset_attr: "data-superset".to_string(),
            set_line: ".action-set".to_string(),
            pr_badge: ".pr".to_string(),
        }
    }
}

/// Why a set line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("stream item has no date")]
    MissingDate,

    #[error("unrecognised date {0:?}")]
    InvalidDate(String),

    #[error("exercise name is missing")]
    MissingExerciseName,

    #[error("no rep count in {0:?}")]
    MissingReps(String),

    #[error("rep count out of range in {0:?}")]
    InvalidReps(String),
}

/// A set line that could not be turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page {page}, entry {position}: {kind}")]
pub struct ParseError {
    /// Page the line was on
    pub page: usize,
    /// Zero-based position of the line among all set lines on the page
    pub position: usize,
    /// What was wrong with it
    pub kind: ParseErrorKind,
}

/// Selector that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector for {field}: {message}")]
pub struct SelectorError {
    pub field: &'static str,
    pub message: String,
}

/// Result of parsing one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Well-formed entries in page order
    pub entries: Vec<RawEntry>,
    /// Dropped set lines in page order
    pub errors: Vec<ParseError>,
}

impl ParsedPage {
    /// Set lines looked at, good or bad.
    pub fn processed(&self) -> usize {
        self.entries.len() + self.errors.len()
    }
}

/// Compiled page parser.
#[derive(Debug)]
pub struct RecordParser {
    item: Selector,
    date: Selector,
    date_attr: String,
    group: Selector,
    exercise_name: Selector,
    superset_attr: String,
    set_line: Selector,
    pr_badge: Selector,
}

fn compile(field: &'static str, css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError {
        field,
        message: format!("{css:?}: {e:?}"),
    })
}

/// Collapse all whitespace runs in an element's text to single spaces.
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse `YYYY-MM-DD`, ignoring any time suffix.
pub fn parse_stream_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Rep count from a set line's text.
fn parse_reps(text: &str) -> Result<u32, ParseErrorKind> {
    let digits = if let Some(caps) = REPS_RE.captures(text) {
        caps.get(1).map(|m| m.as_str().to_string())
    } else {
        let stripped = PR_TOKEN_RE.replace_all(text, "");
        let stripped = stripped.trim();
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            Some(stripped.to_string())
        } else {
            None
        }
    };

    match digits {
        Some(digits) => digits
            .parse::<u32>()
            .map_err(|_| ParseErrorKind::InvalidReps(text.to_string())),
        None => Err(ParseErrorKind::MissingReps(text.to_string())),
    }
}

impl RecordParser {
    /// Compile a parser from markup rules.
    pub fn new(rules: &MarkupRules) -> Result<Self, SelectorError> {
        Ok(Self {
            item: compile("item", &rules.item)?,
            date: compile("date", &rules.date)?,
            date_attr: rules.date_attr.clone(),
            group: compile("group", &rules.group)?,
            exercise_name: compile("exercise_name", &rules.exercise_name)?,
            superset_attr: rules.superset_attr.clone(),
            set_line: compile("set_line", &rules.set_line)?,
            pr_badge: compile("pr_badge", &rules.pr_badge)?,
        })
    }

    /// Read the date of one stream item.
    fn item_date(&self, item: &ElementRef<'_>) -> Result<NaiveDate, ParseErrorKind> {
        let element = item
            .select(&self.date)
            .next()
            .ok_or(ParseErrorKind::MissingDate)?;

        let raw = element
            .value()
            .attr(&self.date_attr)
            .map(str::to_string)
            .unwrap_or_else(|| element_text(&element));

        if raw.trim().is_empty() {
            return Err(ParseErrorKind::MissingDate);
        }

        parse_stream_date(&raw).ok_or(ParseErrorKind::InvalidDate(raw))
    }

    /// Parse every set line on a page.
    pub fn parse(&self, page: &RawPage) -> ParsedPage {
        let document = Html::parse_fragment(&page.content);
        let mut parsed = ParsedPage::default();
        let mut position = 0;

        for item in document.select(&self.item) {
            let date = self.item_date(&item);

            for group in item.select(&self.group) {
                let name = group
                    .select(&self.exercise_name)
                    .next()
                    .map(|e| element_text(&e))
                    .filter(|n| !n.is_empty());

                let superset = group
                    .value()
                    .attr(&self.superset_attr)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string);

                for line in group.select(&self.set_line) {
                    let result = self.parse_line(&line, &date, name.as_deref(), &superset);
                    match result {
                        Ok(entry) => parsed.entries.push(entry),
                        Err(kind) => parsed.errors.push(ParseError {
                            page: page.cursor.page,
                            position,
                            kind,
                        }),
                    }
                    position += 1;
                }
            }
        }

        tracing::debug!(
            "Parsed page {}: {} entries, {} skipped",
            page.cursor.page,
            parsed.entries.len(),
            parsed.errors.len()
        );

        parsed
    }

    fn parse_line(
        &self,
        line: &ElementRef<'_>,
        date: &Result<NaiveDate, ParseErrorKind>,
        name: Option<&str>,
        superset: &Option<String>,
    ) -> Result<RawEntry, ParseErrorKind> {
        let date = date.clone()?;
        let exercise_name = name.ok_or(ParseErrorKind::MissingExerciseName)?;
        let text = element_text(line);
        let reps = parse_reps(&text)?;
        let pr = line.select(&self.pr_badge).next().is_some() || PR_TOKEN_RE.is_match(&text);

        Ok(RawEntry {
            exercise_name: exercise_name.to_string(),
            reps,
            pr,
            date,
            superset: superset.clone(),
        })
    }

    /// True when the page holds no stream items at all.
    pub fn is_empty_page(&self, page: &RawPage) -> bool {
        let document = Html::parse_fragment(&page.content);
        let empty = document.select(&self.item).next().is_none();
        empty
    }

    /// Newest readable item date on the page.
    pub fn newest_date(&self, page: &RawPage) -> Option<NaiveDate> {
        let document = Html::parse_fragment(&page.content);
        let newest = document
            .select(&self.item)
            .filter_map(|item| self.item_date(&item).ok())
            .max();
        newest
    }
}
