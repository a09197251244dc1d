//! Date resolution: turn whatever a container stored into a valid timestamp.
//!
//! Resolution never fails. Every unusable shape degrades to the current time
//! taken from an injected [`Clock`], so conversions are reproducible in tests.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::model::message::DateValue;
use crate::parser::text;

/// Parenthesized comments such as `(*31.12.1899 05:31:40*)` or `(UTC)`.
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*").expect("valid comment regex"));

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Freeze the clock at a Unix timestamp (seconds).
    pub fn at_epoch(secs: i64) -> Self {
        let instant = Local
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| DateTime::UNIX_EPOCH.with_timezone(&Local));
        Self(instant)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Resolve a container date to a local timestamp.
///
/// - `Absent` → now.
/// - `Text` → encoded words decoded, comments stripped, then parsed as an
///   RFC 5322 date (with lenient fallbacks); unparseable → now.
/// - `Structured` → used as local time unless the year is before 1970,
///   which containers use as an "unset" placeholder → now.
/// - `Epoch` → valid only when positive; otherwise now.
pub fn resolve(value: &DateValue, clock: &dyn Clock, diagnostics: &dyn Diagnostics) -> DateTime<Local> {
    let resolved = match value {
        DateValue::Absent => return clock.now(),
        DateValue::Text(raw) => resolve_text(raw, diagnostics),
        DateValue::Structured(naive) if naive.year() < 1970 => {
            diagnostics.report(Diagnostic::new(
                DiagnosticKind::InvalidDate,
                format!("placeholder date {naive}, using current time"),
            ));
            None
        }
        DateValue::Structured(naive) => Local.from_local_datetime(naive).earliest(),
        DateValue::Epoch(secs) if *secs > 0 => Local.timestamp_opt(*secs, 0).single(),
        DateValue::Epoch(secs) => {
            diagnostics.report(Diagnostic::new(
                DiagnosticKind::InvalidDate,
                format!("non-positive epoch {secs}, using current time"),
            ));
            None
        }
    };
    resolved.unwrap_or_else(|| clock.now())
}

fn resolve_text(raw: &str, diagnostics: &dyn Diagnostics) -> Option<DateTime<Local>> {
    if raw.trim().is_empty() {
        return None;
    }
    let decoded = text::decode_header(raw, diagnostics);
    let cleaned = COMMENT.replace_all(&decoded, " ");
    let parsed = parse_date(cleaned.trim());
    if parsed.is_none() {
        diagnostics.report(Diagnostic::new(
            DiagnosticKind::InvalidDate,
            format!("unparseable date '{raw}', using current time"),
        ));
    }
    parsed.map(|dt| dt.with_timezone(&Local))
}

/// Format a timestamp for a `Date:` header (RFC 5322, local offset).
///
/// Years that RFC 5322 cannot express fall back to the clock's current time.
pub fn format_date(date: &DateTime<Local>, clock: &dyn Clock) -> String {
    if (1900..=9999).contains(&date.year()) {
        date.to_rfc2822()
    } else {
        clock.now().to_rfc2822()
    }
}

/// Parse an email date string in the common real-world formats.
///
/// Strings without a zone are taken as local time.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    let candidates = [no_dow.clone(), replace_named_tz(&no_dow)];

    const FORMATS: [&str; 8] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for candidate in &candidates {
        for fmt in FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, fmt) {
                if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                    return Some(local.fixed_offset());
                }
            }
        }
    }

    mail_parser_date(trimmed)
}

/// Last resort: let `mail-parser` have a go at it.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let rfc3339 = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&rfc3339).ok()
}

/// Strip a leading day-of-week (`"Thu, "` or `"Thu "`).
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') {
                return rest.trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace a trailing zone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 14] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("MSK", "+0300"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
