//! Deterministic slot extraction.
//!
//! Regex and keyword rules run over a single user turn. No I/O and no model
//! calls, so this runs on every inbound message. A fact that matches more
//! than one distinct value in the same turn is dropped rather than guessed.

use crate::schema::{DATE_FORMAT, normalize_phone};
use crate::session::{Intent, SlotKey, SlotPatch, SlotSource};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// STATIC PATTERNS
// =============================================================================

const MONTHS: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z]+|\d+|[^\sa-z\d]").expect("valid token regex"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b")
        .expect("valid email regex")
});

// Name cues are case-insensitive; the captured name must be capitalized.
static FULL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?i:my name is|my name's|name's|this is)\s+([A-Z][a-z'\-]+)(?:\s+([A-Z][a-z'\-]+))?",
    )
    .expect("valid full name regex")
});

static FIRST_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?i:first name is|first name's|first name)\s+([A-Za-z][A-Za-z'\-]+)")
        .expect("valid first name regex")
});

static LAST_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?i:last name is|last name's|last name|surname is|surname)\s+([A-Za-z][A-Za-z'\-]+)",
    )
    .expect("valid last name regex")
});

static BIRTH_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(born|birthday|birth\s*date|date of birth|dob|d\.o\.b)\b")
        .expect("valid birth cue regex")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid iso date regex"));

static US_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("valid us date regex")
});

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?\b",
        MONTHS
    ))
    .expect("valid month day regex")
});

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{}\b(?:,?\s+(\d{{4}}))?",
        MONTHS
    ))
    .expect("valid day month regex")
});

static RELATIVE_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(day after tomorrow|tomorrow|today)\b").expect("valid relative day regex")
});

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(next|this)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("valid weekday regex")
});

static CLOCK_MERIDIEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*(a\.?m\b\.?|p\.?m\b\.?)")
        .expect("valid clock meridiem regex")
});

static CLOCK_24H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid clock 24h regex"));

static NOON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(noon|midday)\b").expect("valid noon regex"));

static CORRECTION_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(actually|correction|i meant|sorry,?\s+it'?s|no,?\s+it'?s|let me correct)\b")
        .expect("valid correction cue regex")
});

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("valid keyword pattern")
}

// Order matters: more specific first.
static INTENT_PATTERNS: Lazy<Vec<(Regex, Intent)>> = Lazy::new(|| {
    vec![
        (pattern(r"(?i)\bcancel"), Intent::CancelAppointment),
        (
            pattern(r"(?i)\b(reschedul\w*|move my appointment|change my appointment)\b"),
            Intent::RescheduleAppointment,
        ),
        (
            pattern(r"(?i)\b(new patient|first time|never been)\b"),
            Intent::NewPatient,
        ),
        (
            pattern(r"(?i)\b(availability|available|openings?|free slots?)\b"),
            Intent::CheckAvailability,
        ),
        (
            pattern(r"(?i)\b(book|schedule|make an appointment|set up an appointment)\b"),
            Intent::BookAppointment,
        ),
        (
            pattern(r"(?i)\b(existing patient|already a patient|look me up|find my (?:file|record))\b"),
            Intent::FindPatient,
        ),
    ]
});

static APPOINTMENT_TYPES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (pattern(r"(?i)\bcleaning\b"), "cleaning"),
        (pattern(r"(?i)\b(check-?up|exam)\b"), "checkup"),
        (pattern(r"(?i)\b(toothache|emergency|broken tooth)\b"), "emergency"),
        (pattern(r"(?i)\bwhitening\b"), "whitening"),
        (pattern(r"(?i)\bfilling\b"), "filling"),
        (pattern(r"(?i)\bcrown\b"), "crown"),
        (pattern(r"(?i)\broot canal\b"), "root_canal"),
        (pattern(r"(?i)\bconsult(?:ation)?\b"), "consultation"),
    ]
});

// =============================================================================
// RESULT
// =============================================================================

/// Facts recognized in one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFacts {
    pub slots: BTreeMap<SlotKey, String>,
    pub intent: Option<Intent>,
    /// The turn contains a correction cue ("actually", "I meant")
    pub is_correction: bool,
}

impl ExtractedFacts {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.intent.is_none()
    }

    /// Converts the slot facts into a merge patch.
    pub fn to_patch(&self, source: SlotSource, turn: Option<usize>) -> SlotPatch {
        let mut patch = SlotPatch::new(source);
        patch.slots = self.slots.clone();
        patch.turn = turn;
        if self.is_correction {
            patch = patch.as_correction();
        }
        patch
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Rule-based extractor for patient and appointment facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicExtractor;

impl DeterministicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts every recognizable fact from `text`.
    ///
    /// `today` anchors relative phrases ("tomorrow", "next Tuesday").
    pub fn extract(&self, text: &str, today: NaiveDate) -> ExtractedFacts {
        let mut facts = ExtractedFacts {
            is_correction: CORRECTION_CUE.is_match(text),
            intent: self.extract_intent(text),
            ..Default::default()
        };

        let (first, last) = self.extract_name(text);
        if let Some(first) = first {
            facts.slots.insert(SlotKey::FirstName, first);
        }
        if let Some(last) = last {
            facts.slots.insert(SlotKey::LastName, last);
        }
        if let Some(phone) = self.extract_phone(text) {
            facts.slots.insert(SlotKey::Phone, phone);
        }
        if let Some(email) = self.extract_email(text) {
            facts.slots.insert(SlotKey::Email, email);
        }

        // A birth cue claims the turn's dates for the birthdate.
        if BIRTH_CUE.is_match(text) {
            if let Some(dob) = self.extract_birthdate(text, today) {
                facts.slots.insert(SlotKey::Birthdate, dob.format(DATE_FORMAT).to_string());
            }
        } else if let Some(date) = self.extract_appointment_date(text, today) {
            facts.slots.insert(SlotKey::Date, date.format(DATE_FORMAT).to_string());
        }

        if let Some(time) = self.extract_time(text) {
            facts.slots.insert(SlotKey::Time, time);
        }
        if let Some(kind) = self.extract_appointment_type(text) {
            facts.slots.insert(SlotKey::AppointmentType, kind.to_string());
        }

        facts
    }

    /// Returns `(first, last)` from name cues.
    pub fn extract_name(&self, text: &str) -> (Option<String>, Option<String>) {
        let mut first = unique(FIRST_NAME.captures_iter(text).map(|c| capitalize(&c[1])));
        let mut last = unique(LAST_NAME.captures_iter(text).map(|c| capitalize(&c[1])));

        if first.is_none() || last.is_none() {
            let full: Vec<(String, Option<String>)> = FULL_NAME
                .captures_iter(text)
                .map(|c| (c[1].to_string(), c.get(2).map(|m| m.as_str().to_string())))
                .filter(|(given, _)| !is_stopword(given))
                .collect();
            if let [(given, family)] = full.as_slice() {
                first = first.or_else(|| Some(given.clone()));
                last = last.or_else(|| family.clone().filter(|f| !is_stopword(f)));
            }
        }

        (first, last)
    }

    /// Finds exactly one 10-digit phone number, written or spoken.
    pub fn extract_phone(&self, text: &str) -> Option<String> {
        unique(phone_candidates(text).into_iter())
    }

    pub fn extract_email(&self, text: &str) -> Option<String> {
        unique(EMAIL.find_iter(text).map(|m| m.as_str().to_ascii_lowercase()))
    }

    /// Explicit dates with a year, not in the future.
    pub fn extract_birthdate(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let dates = explicit_dates(text, today, DateContext::Birth)
            .into_iter()
            .filter(|date| *date <= today);
        unique(dates)
    }

    /// Appointment date phrases resolved against `today`; past dates are
    /// ignored.
    pub fn extract_appointment_date(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let mut dates = explicit_dates(text, today, DateContext::Appointment);

        for caps in RELATIVE_DAY.captures_iter(text) {
            let offset = match caps[1].to_ascii_lowercase().as_str() {
                "today" => 0,
                "tomorrow" => 1,
                _ => 2,
            };
            dates.push(today + Duration::days(offset));
        }

        for caps in WEEKDAY.captures_iter(text) {
            let Some(weekday) = parse_weekday(&caps[2]) else {
                continue;
            };
            let mut ahead = (weekday.num_days_from_monday() as i64
                - today.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            if ahead == 0 {
                ahead = 7;
            }
            if caps
                .get(1)
                .is_some_and(|m| m.as_str().eq_ignore_ascii_case("next"))
                && ahead < 7
            {
                ahead += 7;
            }
            dates.push(today + Duration::days(ahead));
        }

        unique(dates.into_iter().filter(|date| *date >= today))
    }

    /// Clock time as `HH:MM` (24h). Requires am/pm, `HH:MM` or "noon".
    pub fn extract_time(&self, text: &str) -> Option<String> {
        let mut times = Vec::new();

        for caps in CLOCK_MERIDIEM.captures_iter(text) {
            let Ok(hour) = caps[1].parse::<u32>() else {
                continue;
            };
            let minute = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            if !(1..=12).contains(&hour) {
                continue;
            }
            let pm = caps[3].to_ascii_lowercase().starts_with('p');
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            };
            times.push(format!("{:02}:{:02}", hour, minute));
        }

        let without_meridiem = CLOCK_MERIDIEM.replace_all(text, " ");
        for caps in CLOCK_24H.captures_iter(&without_meridiem) {
            if let (Ok(hour), Ok(minute)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                times.push(format!("{:02}:{:02}", hour, minute));
            }
        }

        if NOON.is_match(text) {
            times.push("12:00".to_string());
        }

        unique(times.into_iter())
    }

    pub fn extract_intent(&self, text: &str) -> Option<Intent> {
        INTENT_PATTERNS
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, intent)| *intent)
    }

    pub fn extract_appointment_type(&self, text: &str) -> Option<&'static str> {
        unique(
            APPOINTMENT_TYPES
                .iter()
                .filter(|(pattern, _)| pattern.is_match(text))
                .map(|(_, kind)| *kind),
        )
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// The single distinct value of `values`, or `None` when there are zero or
/// several.
fn unique<T: Ord>(values: impl Iterator<Item = T>) -> Option<T> {
    let distinct: BTreeSet<T> = values.collect();
    if distinct.len() == 1 {
        distinct.into_iter().next()
    } else {
        None
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "The",
        "About", "Regarding", "Dr", "Doctor", "Calling", "Not",
    ];
    STOPWORDS.iter().any(|stop| stop.eq_ignore_ascii_case(word))
}

fn spoken_digit(word: &str) -> Option<char> {
    Some(match word {
        "zero" | "oh" | "o" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    })
}

/// Collects digit runs that form a phone number.
///
/// A run is a sequence of numeric tokens and spoken digit words; "double"
/// and "triple" repeat the next digit and separators do not break the run.
/// Purely numeric runs must also be grouped like a phone number, which keeps
/// dates and times out.
fn phone_candidates(text: &str) -> Vec<String> {
    #[derive(Default)]
    struct Run {
        digits: String,
        groups: Vec<usize>,
        spoken: bool,
    }

    fn flush(run: &mut Run, out: &mut Vec<String>) {
        let shaped = run.spoken
            || matches!(
                run.groups.as_slice(),
                [10] | [11] | [3, 3, 4] | [1, 3, 3, 4] | [3, 7] | [1, 10]
            );
        if shaped {
            if let Some(phone) = normalize_phone(&run.digits) {
                out.push(phone);
            }
        }
        *run = Run::default();
    }

    let lower = text.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut run = Run::default();
    let mut repeat = 1;

    for token in TOKEN.find_iter(&lower).map(|m| m.as_str()) {
        if token.chars().all(|c| c.is_ascii_digit()) {
            run.digits.push_str(token);
            run.groups.push(token.len());
            repeat = 1;
            continue;
        }
        if let Some(digit) = spoken_digit(token) {
            for _ in 0..repeat {
                run.digits.push(digit);
            }
            run.spoken = true;
            repeat = 1;
            continue;
        }
        match token {
            "double" => repeat = 2,
            "triple" => repeat = 3,
            "-" | "." | "(" | ")" | "+" | "," => {}
            _ => {
                flush(&mut run, &mut out);
                repeat = 1;
            }
        }
    }
    flush(&mut run, &mut out);

    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DateContext {
    Birth,
    Appointment,
}

/// ISO, US numeric and month-name dates.
///
/// Year-less forms are only meaningful for appointments and resolve to the
/// next occurrence on or after `today`.
fn explicit_dates(text: &str, today: NaiveDate, context: DateContext) -> Vec<NaiveDate> {
    let mut dates = Vec::new();

    for caps in ISO_DATE.captures_iter(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            dates.push(date);
        }
    }

    for caps in US_DATE.captures_iter(text) {
        let (Ok(month), Ok(day)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        let year = caps.get(3).map(|m| expand_year(m.as_str(), today, context));
        if let Some(date) = resolve(year, month, day, today, context) {
            dates.push(date);
        }
    }

    for caps in MONTH_DAY.captures_iter(text) {
        let (Some(month), Ok(day)) = (parse_month(&caps[1]), caps[2].parse::<u32>()) else {
            continue;
        };
        let year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());
        if let Some(date) = resolve(year, month, day, today, context) {
            dates.push(date);
        }
    }

    for caps in DAY_MONTH.captures_iter(text) {
        let (Ok(day), Some(month)) = (caps[1].parse::<u32>(), parse_month(&caps[2])) else {
            continue;
        };
        let year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());
        if let Some(date) = resolve(year, month, day, today, context) {
            dates.push(date);
        }
    }

    dates
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn resolve(
    year: Option<i32>,
    month: u32,
    day: u32,
    today: NaiveDate,
    context: DateContext,
) -> Option<NaiveDate> {
    match (year, context) {
        (Some(year), _) => NaiveDate::from_ymd_opt(year, month, day),
        (None, DateContext::Birth) => None,
        (None, DateContext::Appointment) => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if this_year >= today {
                Some(this_year)
            } else {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            }
        }
    }
}

fn expand_year(text: &str, today: NaiveDate, context: DateContext) -> i32 {
    let value: i32 = text.parse().unwrap_or(0);
    if text.len() == 4 {
        return value;
    }
    let century = today.year() / 100 * 100;
    match context {
        DateContext::Birth if value > today.year() % 100 => century - 100 + value,
        _ => century + value,
    }
}

fn parse_month(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    name.to_ascii_lowercase().parse::<Weekday>().ok()
}
