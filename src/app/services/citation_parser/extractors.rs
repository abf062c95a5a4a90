//! Field extraction utilities for citation records
//!
//! This module provides pure helper functions that turn one irregular
//! nested substructure into a normalized scalar or tuple. Extractors never
//! fail on a wholly absent value; a substructure that is present but broken
//! beyond tolerance yields a record-level error for the normalizer to catch.

use crate::{Error, Result};
use serde_json::Value;

/// Look up a non-null member of a tagged value.
///
/// Null members are treated as absent, matching the convention that an
/// empty XML element carries no information.
pub fn pluck<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    value
        .and_then(|v| v.get(key))
        .filter(|v| !v.is_null())
}

/// Descend through nested members, treating any missing step as absence
pub fn descend<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = Some(root);
    for key in path {
        current = pluck(current, key);
    }
    current
}

/// Descend through nested members that the record format requires
pub fn require<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value> {
    descend(root, path)
        .ok_or_else(|| Error::record(format!("missing required element {}", path.join("/"))))
}

/// Canonical text of a value: a bare string, or the `#text` of a mapping
pub fn text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("#text").and_then(Value::as_str),
        _ => None,
    }
}

/// Owned canonical text of an optional value
pub fn text_of(value: Option<&Value>) -> Option<String> {
    value.and_then(text).map(str::to_string)
}

/// Canonical text that the record format requires
pub fn require_text(value: Option<&Value>, what: &str) -> Result<String> {
    text_of(value).ok_or_else(|| Error::record(format!("missing required text for {what}")))
}

/// Assemble a `"D/M/Y"` date from a day/month/year substructure.
///
/// An absent substructure is a null date; a present substructure with a
/// missing component is a record-level error. There is no partial-date
/// representation.
pub fn assemble_date(value: Option<&Value>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };

    let day = require_text(pluck(Some(value), "Day"), "date Day")?;
    let month = require_text(pluck(Some(value), "Month"), "date Month")?;
    let year = require_text(pluck(Some(value), "Year"), "date Year")?;

    Ok(Some(format!("{day}/{month}/{year}")))
}

/// Resolve a publication date to a (year, month) pair.
///
/// A free-text `MedlineDate` takes precedence over structured fields and is
/// split on whitespace: exactly two tokens are (year, month), one token is
/// (year, None), and any other token count resolves to (None, None).
pub fn resolve_year_month(value: Option<&Value>) -> (Option<String>, Option<String>) {
    let Some(value) = value else {
        return (None, None);
    };

    if let Some(raw) = pluck(Some(value), "MedlineDate").and_then(text) {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        return match tokens.as_slice() {
            [year] => (Some((*year).to_string()), None),
            [year, month] => (Some((*year).to_string()), Some((*month).to_string())),
            _ => (None, None),
        };
    }

    (
        text_of(pluck(Some(value), "Year")),
        text_of(pluck(Some(value), "Month")),
    )
}

/// Extract an identifier and its declared type, e.g. an ISSN with `@IssnType`
pub fn identifier_pair(value: Option<&Value>) -> (Option<String>, Option<String>) {
    let Some(value) = value else {
        return (None, None);
    };

    (
        text(value).map(str::to_string),
        text_of(pluck(Some(value), "@IssnType")),
    )
}

/// Normalize a title-like value to plain text.
///
/// A bare string loses at most one leading `[` and one trailing `]`
/// (bracketed titles mark translations); repeated brackets are preserved.
/// A mapping contributes its primary text unchanged; anything else is null.
pub fn clean_title(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.strip_prefix('[').unwrap_or(s);
            let s = s.strip_suffix(']').unwrap_or(s);
            Some(s.to_string())
        }
        Some(Value::Object(map)) => map.get("#text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Coerce an optional one-or-many value into an ordered list.
///
/// Absent and null values are empty; a bare single element becomes a
/// one-element list; an existing list passes through in source order.
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// Coerce an optional affiliation value, preserving the null distinction.
///
/// Absence stays `None` (the author has no affiliation at all), which is
/// distinct from a present-but-empty list.
pub fn affiliations(value: Option<&Value>) -> Option<Vec<&Value>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items.iter().collect()),
        Some(single) => Some(vec![single]),
    }
}

/// Interpret a Y/N major-topic attribute
pub fn major_topic(yn: &str) -> bool {
    yn.eq_ignore_ascii_case("y")
}
