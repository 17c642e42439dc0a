//! Domain-format rules and literal defaults.

use crate::params::{value_as_i64, value_as_text};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DATE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date shape regex"));

static DATE_TIME_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("valid datetime shape regex")
});

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

/// Per-field format check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainRule {
    /// Real calendar date, `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DD HH:MM:SS`
    DateTime,
    /// Exactly ten digits once separators are removed
    Phone,
    /// Integer greater than zero
    PositiveId,
    Email,
    IntRange { min: i64, max: i64 },
    Boolean,
    Text { max_len: usize },
}

impl DomainRule {
    /// Human-readable description of the accepted shape.
    pub fn expected(&self) -> String {
        match self {
            DomainRule::Date => "a real calendar date formatted YYYY-MM-DD".to_string(),
            DomainRule::DateTime => "date and time formatted YYYY-MM-DD HH:MM:SS".to_string(),
            DomainRule::Phone => "a 10-digit phone number".to_string(),
            DomainRule::PositiveId => "a positive integer id".to_string(),
            DomainRule::Email => "an email address like name@example.com".to_string(),
            DomainRule::IntRange { min, max } => format!("an integer from {} to {}", min, max),
            DomainRule::Boolean => "true or false".to_string(),
            DomainRule::Text { max_len } => format!("text up to {} characters", max_len),
        }
    }

    /// Short format hint for extraction prompts.
    pub fn format_hint(&self) -> &'static str {
        match self {
            DomainRule::Date => "YYYY-MM-DD",
            DomainRule::DateTime => "YYYY-MM-DD HH:MM:SS",
            DomainRule::Phone => "10 digits, no separators",
            DomainRule::PositiveId | DomainRule::IntRange { .. } => "integer",
            DomainRule::Email => "email address",
            DomainRule::Boolean => "true or false",
            DomainRule::Text { .. } => "plain text",
        }
    }

    pub fn check(&self, value: &Value) -> bool {
        self.canonicalize(value).is_some()
    }

    /// Returns the canonical form of `value`, or `None` when it does not
    /// satisfy the rule.
    pub fn canonicalize(&self, value: &Value) -> Option<Value> {
        match self {
            DomainRule::Date => {
                let text = value.as_str()?.trim();
                parse_date(text).map(|date| Value::String(date.format(DATE_FORMAT).to_string()))
            }
            DomainRule::DateTime => {
                let text = value.as_str()?.trim();
                if !DATE_TIME_SHAPE.is_match(text) {
                    return None;
                }
                NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT)
                    .ok()
                    .map(|dt| Value::String(dt.format(DATE_TIME_FORMAT).to_string()))
            }
            DomainRule::Phone => {
                let text = value_as_text(value)?;
                normalize_phone(&text).map(Value::String)
            }
            DomainRule::PositiveId => value_as_i64(value)
                .filter(|id| *id > 0)
                .map(Value::from),
            DomainRule::Email => {
                let text = value.as_str()?.trim();
                EMAIL_SHAPE
                    .is_match(text)
                    .then(|| Value::String(text.to_string()))
            }
            DomainRule::IntRange { min, max } => value_as_i64(value)
                .filter(|n| (*min..=*max).contains(n))
                .map(Value::from),
            DomainRule::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" => Some(Value::Bool(true)),
                    "false" | "no" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            DomainRule::Text { max_len } => {
                let text = value_as_text(value)?;
                (text.chars().count() <= *max_len).then_some(Value::String(text))
            }
        }
    }

    /// Canonicalizes a textual slot value.
    pub fn normalize_text(&self, raw: &str) -> Option<Value> {
        self.canonicalize(&Value::String(raw.to_string()))
    }
}

/// Parses a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    if !DATE_SHAPE.is_match(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Strips separators and an optional leading country code `1`.
pub fn normalize_phone(text: &str) -> Option<String> {
    if text
        .chars()
        .any(|c| !(c.is_ascii_digit() || " -().+".contains(c)))
    {
        return None;
    }
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(digits),
        11 if digits.starts_with('1') => Some(digits[1..].to_string()),
        _ => None,
    }
}

/// Joins a `YYYY-MM-DD` date slot and an `HH:MM` time slot.
pub fn compose_date_time(date: &str, time: &str) -> Option<String> {
    let date = parse_date(date.trim())?;
    let time = chrono::NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| chrono::NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;
    Some(date.and_time(time).format(DATE_TIME_FORMAT).to_string())
}

/// Splits a `YYYY-MM-DD HH:MM:SS` value into date and `HH:MM` slot values.
pub fn split_date_time(value: &str) -> Option<(String, String)> {
    let parsed = NaiveDateTime::parse_from_str(value.trim(), DATE_TIME_FORMAT).ok()?;
    Some((
        parsed.format(DATE_FORMAT).to_string(),
        parsed.format("%H:%M").to_string(),
    ))
}

/// A constant used for schema defaults and example calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Text(&'static str),
}

impl Literal {
    pub fn to_value(self) -> Value {
        match self {
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(n) => Value::from(n),
            Literal::Text(s) => Value::String(s.to_string()),
        }
    }
}
