//! Deterministic slot extraction from raw request text.
//!
//! Runs after the model's analysis and only fills slots the model left empty,
//! so an explicit number or address in the text is never lost.

use belt_core::intent::{slot, Entities, Intent};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d[\d\s\-]{8,}\d").expect("valid phone regex"));

/// Start of a d-m-y or y-m-d date, which the phone pattern would also accept.
static DATE_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,4}[-/]\d{1,2}[-/]\d{1,4}\b").expect("valid date shape regex")
});

/// Minutes right after a candidate, as in "19:00" or "19.30".
static TIME_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[:.]\d{2}\b").expect("valid time tail regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

static CALL_NAME_NL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbel\s+(?:eens\s+)?(?:naar\s+)?(.+?)(?:\s+(?:om|voor|en|dat|of)\b|$)")
        .expect("valid call regex")
});

static CALL_NAME_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcall\s+(.+?)(?:\s+(?:to|for|and|that|or)\b|$)").expect("valid call regex")
});

static MESSAGE_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sms|sms'?je|mail|e-?mail)\s+(?:naar\s+)?(.+?)\s+(?:dat|met)\s+(.+)$")
        .expect("valid message regex")
});

/// Fill missing slots from patterns in the raw text and normalise the phone slot.
pub fn enrich(intent: &mut Intent, text: &str) {
    if let Some(raw) = intent.entities.get(slot::PHONE).map(str::to_string) {
        if let Some(normalized) = normalize_phone(&raw) {
            intent.entities.insert(slot::PHONE, normalized);
        }
    }
    if let Some(phone) = find_phone(text) {
        intent.entities.fill(slot::PHONE, phone);
    }
    if let Some(m) = EMAIL_RE.find(text) {
        intent.entities.fill(slot::EMAIL, m.as_str());
    }
    if let Some((name, body)) = message_recipient(text) {
        intent.entities.fill(slot::CONTACT_NAME, name);
        intent.entities.fill(slot::MESSAGE_BODY, body);
    } else if let Some(name) = call_target_name(text) {
        intent.entities.fill(slot::CONTACT_NAME, name);
    }
}

/// First phone-like token in the text, normalised. Dates and tokens running
/// into a clock time ("23-10-2026 19:00") are skipped.
pub fn find_phone(text: &str) -> Option<String> {
    PHONE_RE
        .find_iter(text)
        .filter(|m| !DATE_SHAPE_RE.is_match(m.as_str()))
        .filter(|m| !TIME_TAIL_RE.is_match(&text[m.end()..]))
        .find_map(|m| normalize_phone(m.as_str()))
}

/// Normalise to E.164-ish form. Returns `None` when the result is not a
/// plausible number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let normalized = if let Some(rest) = cleaned.strip_prefix("00") {
        format!("+{rest}")
    } else if cleaned.starts_with('+') {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+31{rest}")
    } else {
        format!("+{cleaned}")
    };

    let digits = &normalized[1..];
    let valid = normalized.len() >= 10
        && normalized.len() <= 16
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit());
    valid.then_some(normalized)
}

/// Whether the input looks like an e-mail address.
pub fn looks_like_email(input: &str) -> bool {
    let input = input.trim();
    match input.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !input.contains(char::is_whitespace)
        }
        None => false,
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M", "%H.%M", "%H:%M:%S"];

/// Parse a date with optional time. A bare date starts at 09:00.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(input, f).ok())
        .or_else(|| {
            let date = parse_date(input)?;
            date.and_hms_opt(9, 0, 0)
        })
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(input.trim(), f).ok())
}

fn parse_time(input: &str) -> Option<NaiveTime> {
    let input = input.trim().trim_end_matches(" uur");
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(input, f).ok())
}

/// Event start and end from the calendar slots. The end defaults to one
/// hour after the start.
pub fn event_window(entities: &Entities) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = match entities.get(slot::EVENT_START).and_then(parse_datetime) {
        Some(start) => start,
        None => {
            let date = parse_date(entities.get(slot::DATE)?)?;
            let time = entities
                .get(slot::TIME)
                .and_then(parse_time)
                .unwrap_or(NaiveTime::from_hms_opt(9, 0, 0)?);
            date.and_time(time)
        }
    };
    let end = entities
        .get(slot::EVENT_END)
        .and_then(parse_datetime)
        .filter(|end| *end > start)
        .unwrap_or(start + Duration::hours(1));
    Some((start, end))
}

/// Name following "bel"/"call", with any phone number stripped off.
fn call_target_name(text: &str) -> Option<String> {
    let caps = CALL_NAME_NL
        .captures(text)
        .or_else(|| CALL_NAME_EN.captures(text))?;
    clean_name(caps.get(1)?.as_str())
}

/// Recipient and body of "sms Jan dat ..." / "mail Piet met ...".
fn message_recipient(text: &str) -> Option<(String, String)> {
    let caps = MESSAGE_TO.captures(text)?;
    let name = clean_name(caps.get(1)?.as_str())?;
    let body = caps.get(2)?.as_str().trim().to_string();
    (!body.is_empty()).then_some((name, body))
}

/// Cut a captured name at the first digit or `+` and drop trailing punctuation.
fn clean_name(raw: &str) -> Option<String> {
    let end = raw
        .find(|c: char| c.is_ascii_digit() || c == '+')
        .unwrap_or(raw.len());
    let name = raw[..end]
        .trim()
        .trim_end_matches(|c: char| matches!(c, ',' | '.' | ':' | '!' | '?'))
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}
