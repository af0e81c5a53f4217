//! Lenient accessors over provider JSON.
//!
//! Absent or mistyped values fall back to empty strings, empty slices or
//! `None`; nothing here fails.

use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use patent_core::parse_date;

pub(crate) type Object = Map<String, JsonValue>;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").expect("static pattern"));

/// Replace every markup tag with a single space.
pub fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, " ").into_owned()
}

/// String value of `key`, or `""`.
pub(crate) fn text<'a>(obj: &'a Object, key: &str) -> &'a str {
    obj.get(key).and_then(JsonValue::as_str).unwrap_or("")
}

/// Array value of `key`, or an empty slice.
pub(crate) fn array<'a>(obj: &'a Object, key: &str) -> &'a [JsonValue] {
    obj.get(key)
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Object elements of the array at `key`; other elements are skipped.
pub(crate) fn objects<'a>(obj: &'a Object, key: &str) -> impl Iterator<Item = &'a Object> {
    array(obj, key).iter().filter_map(JsonValue::as_object)
}

pub(crate) fn date(obj: &Object, key: &str) -> Option<NaiveDate> {
    parse_date(text(obj, key))
}

/// `plainText` of every paragraph at `key`, each followed by a newline.
pub(crate) fn paragraphs(obj: &Object, key: &str) -> String {
    let mut out = String::new();
    for paragraph in objects(obj, key) {
        if let Some(plain) = paragraph.get("plainText").and_then(JsonValue::as_str) {
            out.push_str(plain);
            out.push('\n');
        }
    }
    out
}

/// Party names (`partyNameClean`, falling back to `partyName`), de-duplicated
/// in first-seen order.
pub(crate) fn party_names<'a>(parties: impl Iterator<Item = &'a Object>) -> Vec<String> {
    let names = parties.filter_map(|party| {
        let clean = text(party, "partyNameClean");
        let name = if clean.is_empty() {
            text(party, "partyName")
        } else {
            clean
        };
        (!name.is_empty()).then_some(name)
    });
    dedup(names)
}

/// First non-empty array among `keys`.
pub(crate) fn first_populated<'a>(obj: &'a Object, keys: &[&str]) -> &'a [JsonValue] {
    keys.iter()
        .map(|key| array(obj, key))
        .find(|values| !values.is_empty())
        .unwrap_or(&[])
}

pub(crate) fn dedup<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}
