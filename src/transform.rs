//! Bulk text edits on a selection of records.
//!
//! Every edit is a pure function of the current value and its parameters.
//! [`apply_transform`] computes all new values before writing any of them
//! and reports the before/after pairs of the records that changed.

use std::fmt;
use std::str::FromStr;

use regex::{NoExpand, RegexBuilder};
use rlibphonenumber::{region_code::RegionCode, PhoneNumber, PhoneNumberFormat, PHONE_NUMBER_UTIL};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::{split_list, Column, RecordSet, Selection, LIST_SEPARATOR};

// =============================================================================
// Value transforms
// =============================================================================

/// Format a Turkish number as `+90 XXX XXX XX XX`.
///
/// Non-digits are dropped, then one leading `0` and a leading `90`. Values
/// that do not leave exactly ten digits are returned unchanged.
pub fn normalize_phone(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return value.to_string();
    }

    let digits = digits.strip_prefix('0').unwrap_or(&digits);
    let digits = digits.strip_prefix("90").unwrap_or(digits);
    if digits.len() != 10 {
        return value.to_string();
    }

    format!(
        "+90 {} {} {} {}",
        &digits[..3],
        &digits[3..6],
        &digits[6..8],
        &digits[8..]
    )
}

/// Format a number as E.164 using libphonenumber. `default_region` is
/// tried first, then international parsing. Numbers that do not parse are
/// returned unchanged.
pub fn phone_e164(value: &str, default_region: Option<&str>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return value.to_string();
    }

    let unknown = RegionCode::get_unknown();
    let region = default_region
        .map(str::trim)
        .filter(|region| !region.is_empty())
        .unwrap_or(unknown);
    let parsed = PHONE_NUMBER_UTIL
        .parse(trimmed, region)
        .or_else(|_| PHONE_NUMBER_UTIL.parse(trimmed, unknown));

    match parsed {
        Ok(number) => e164_with_extension(&number),
        Err(_) => {
            tracing::trace!(value = trimmed, region, "number left as is");
            value.to_string()
        }
    }
}

fn e164_with_extension(number: &PhoneNumber) -> String {
    let e164 = PHONE_NUMBER_UTIL.format(number, PhoneNumberFormat::E164);
    let ext = number.extension();
    if number.has_extension() && !ext.is_empty() {
        format!("{e164} ext. {ext}")
    } else {
        e164.into_owned()
    }
}

/// Uppercase the first letter of every word and lowercase the rest.
/// Leading punctuation or digits do not count as the first letter, so
/// `(john)` becomes `(John)`. Whitespace is kept as is.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut awaiting_letter = true;
    for ch in value.chars() {
        if ch.is_whitespace() {
            awaiting_letter = true;
            out.push(ch);
        } else if awaiting_letter && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
            awaiting_letter = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Uppercase the last word; words are rejoined with single spaces, so a
/// value made only of whitespace becomes empty.
pub fn last_word_upper(value: &str) -> String {
    let mut words: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if let Some(last) = words.last_mut() {
        *last = last.to_uppercase();
    }
    words.join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePosition {
    Start,
    End,
}

impl FromStr for CodePosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "prefix" => Ok(CodePosition::Start),
            "end" | "suffix" => Ok(CodePosition::End),
            other => Err(Error::validation(
                "position",
                format!("`{other}` is not one of: start, end"),
            )),
        }
    }
}

pub fn append_code(value: &str, code: &str, position: CodePosition) -> String {
    match position {
        CodePosition::Start => format!("{code} {value}"),
        CodePosition::End => format!("{value} {code}"),
    }
}

/// Replace every case-insensitive occurrence of `search` with `replacement`.
/// `search` is literal text, not a pattern; an empty replacement deletes.
pub fn replace_text(value: &str, search: &str, replacement: &str) -> String {
    if search.is_empty() {
        return value.to_string();
    }
    match literal_matcher(search) {
        Ok(re) => re.replace_all(value, NoExpand(replacement)).into_owned(),
        Err(_) => value.to_string(),
    }
}

fn literal_matcher(search: &str) -> Result<regex::Regex> {
    RegexBuilder::new(&regex::escape(search))
        .case_insensitive(true)
        .build()
        .map_err(|err| Error::validation("search text", err.to_string()))
}

// =============================================================================
// Bulk application
// =============================================================================

/// A named edit together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    NormalizePhone,
    PhoneE164 { region: Option<String> },
    TitleCase,
    LastWordUpper,
    AppendCode { code: String, position: CodePosition },
    ReplaceText {
        column: Column,
        search: String,
        replacement: String,
    },
}

impl Transform {
    /// Column the edit reads and writes.
    pub fn column(&self) -> Column {
        match self {
            Transform::NormalizePhone | Transform::PhoneE164 { .. } => Column::Phone,
            Transform::ReplaceText { column, .. } => *column,
            Transform::TitleCase | Transform::LastWordUpper | Transform::AppendCode { .. } => {
                Column::Name
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Transform::AppendCode { code, .. } if code.trim().is_empty() => {
                Err(Error::validation("code", "code must not be empty"))
            }
            Transform::ReplaceText { search, .. } if search.is_empty() => {
                Err(Error::validation("search text", "search text must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Build the per-value function once, so the search pattern is compiled
    /// a single time per bulk edit.
    fn compile(&self) -> Result<Box<dyn Fn(&str) -> String + '_>> {
        Ok(match self {
            Transform::NormalizePhone => Box::new(|v: &str| per_entry(v, normalize_phone)),
            Transform::PhoneE164 { region } => {
                let region = region.as_deref();
                Box::new(move |v: &str| per_entry(v, |entry| phone_e164(entry, region)))
            }
            Transform::TitleCase => Box::new(title_case),
            Transform::LastWordUpper => Box::new(last_word_upper),
            Transform::AppendCode { code, position } => {
                let code = code.trim();
                let position = *position;
                Box::new(move |v: &str| append_code(v, code, position))
            }
            Transform::ReplaceText {
                search,
                replacement,
                ..
            } => {
                let re = literal_matcher(search)?;
                Box::new(move |v: &str| {
                    re.replace_all(v, NoExpand(replacement.as_str())).into_owned()
                })
            }
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::NormalizePhone => f.write_str("normalize phone numbers"),
            Transform::PhoneE164 { .. } => f.write_str("format phone numbers as E.164"),
            Transform::TitleCase => f.write_str("title-case names"),
            Transform::LastWordUpper => f.write_str("uppercase last word of names"),
            Transform::AppendCode { code, position } => match position {
                CodePosition::Start => write!(f, "add '{code}' to the start of names"),
                CodePosition::End => write!(f, "add '{code}' to the end of names"),
            },
            Transform::ReplaceText {
                column,
                search,
                replacement,
            } if replacement.is_empty() => write!(f, "delete '{search}' in {column}"),
            Transform::ReplaceText {
                column,
                search,
                replacement,
            } => write!(f, "replace '{search}' with '{replacement}' in {column}"),
        }
    }
}

/// Phone columns hold a `;`-joined list; edit each number on its own.
fn per_entry(value: &str, f: impl Fn(&str) -> String) -> String {
    split_list(value)
        .into_iter()
        .map(f)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub index: usize,
    pub before: String,
    pub after: String,
}

/// Outcome of one bulk edit: only records whose value changed are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub column: Column,
    pub selected: usize,
    pub changes: Vec<Change>,
}

impl ChangeReport {
    pub fn changed(&self) -> usize {
        self.changes.len()
    }
}

/// Run `transform` over the selected records, writing the new values in
/// place. Empty values are left alone.
pub fn apply_transform(
    records: &mut RecordSet,
    selection: &Selection,
    transform: &Transform,
) -> Result<ChangeReport> {
    transform.validate()?;
    let column = transform.column();
    let edit = transform.compile()?;

    let mut changes = Vec::new();
    for &index in selection.indices() {
        let record = records.get(index).ok_or_else(|| {
            Error::validation(
                "selection",
                format!("row {} is out of range (table has {} rows)", index + 1, records.len()),
            )
        })?;
        let before = record.field(column);
        if before.is_empty() {
            continue;
        }
        let after = edit(before);
        if after != before {
            changes.push(Change {
                index,
                before: before.to_string(),
                after,
            });
        }
    }

    for change in &changes {
        if let Some(record) = records.get_mut(change.index) {
            *record.field_mut(column) = change.after.clone();
        }
    }

    tracing::debug!(
        transform = %transform,
        selected = selection.len(),
        changed = changes.len(),
        "applied transform"
    );

    Ok(ChangeReport {
        column,
        selected: selection.len(),
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn normalize_phone_formats_turkish_numbers() {
        assert_eq!(normalize_phone("0555 123 45 67"), "+90 555 123 45 67");
        assert_eq!(normalize_phone("905551234567"), "+90 555 123 45 67");
        assert_eq!(normalize_phone("+90 (555) 123-45-67"), "+90 555 123 45 67");
        assert_eq!(normalize_phone("5551234567"), "+90 555 123 45 67");
    }

    #[test]
    fn normalize_phone_leaves_other_lengths() {
        assert_eq!(normalize_phone("123"), "123");
        assert_eq!(normalize_phone("no digits"), "no digits");
        assert_eq!(normalize_phone("+1 202 555 0143 99"), "+1 202 555 0143 99");
    }

    #[test]
    fn normalize_phone_is_idempotent() {
        let once = normalize_phone("0555 123 45 67");
        assert_eq!(normalize_phone(&once), once);
    }

    #[test]
    fn phone_e164_with_region() {
        assert_eq!(phone_e164("0555 123 45 67", Some("TR")), "+905551234567");
        assert_eq!(phone_e164("not a phone", Some("TR")), "not a phone");
        assert_eq!(phone_e164("", None), "");
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("JOHN SMITH"), "John Smith");
        assert_eq!(title_case("mary  ann"), "Mary  Ann");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn title_case_skips_leading_punctuation_and_digits() {
        assert_eq!(title_case("(john) smith"), "(John) Smith");
        assert_eq!(title_case("\"ali\" VELI"), "\"Ali\" Veli");
        assert_eq!(title_case("3m company"), "3M Company");
        assert_eq!(title_case("- x"), "- X");
    }

    #[test]
    fn last_word_upper_words() {
        assert_eq!(last_word_upper("john smith"), "john SMITH");
        assert_eq!(last_word_upper("  john   smith "), "john SMITH");
        assert_eq!(last_word_upper(""), "");
        assert_eq!(last_word_upper("   "), "");
    }

    #[test]
    fn append_code_positions() {
        assert_eq!(append_code("Ali", "ACME", CodePosition::Start), "ACME Ali");
        assert_eq!(append_code("Ali", "ACME", CodePosition::End), "Ali ACME");
        assert_eq!("suffix".parse::<CodePosition>().unwrap(), CodePosition::End);
        assert!("middle".parse::<CodePosition>().is_err());
    }

    #[test]
    fn replace_text_is_literal_and_case_insensitive() {
        assert_eq!(replace_text("Dr. Who and dr. No", "DR.", "Doctor"), "Doctor Who and Doctor No");
        assert_eq!(replace_text("a.b", ".", ""), "ab");
        assert_eq!(replace_text("cost", "o", "$1"), "c$1st");
    }

    fn sample() -> RecordSet {
        RecordSet::from(vec![
            Record::new("JOHN SMITH", "0555 123 45 67;123", "", ""),
            Record::new("", "", "", ""),
            Record::new("Mary Jane", "", "", ""),
        ])
    }

    #[test]
    fn apply_reports_only_changed_records() {
        let mut records = sample();
        let selection = Selection::all(records.len());
        let report = apply_transform(&mut records, &selection, &Transform::TitleCase).unwrap();

        assert_eq!(report.column, Column::Name);
        assert_eq!(report.selected, 3);
        assert_eq!(
            report.changes,
            vec![Change {
                index: 0,
                before: "JOHN SMITH".into(),
                after: "John Smith".into(),
            }]
        );
        assert_eq!(records.get(0).unwrap().name, "John Smith");
        assert_eq!(records.get(1).unwrap().name, "");
    }

    #[test]
    fn apply_normalizes_each_phone_entry() {
        let mut records = sample();
        let selection = Selection::new([0], records.len()).unwrap();
        let report =
            apply_transform(&mut records, &selection, &Transform::NormalizePhone).unwrap();
        assert_eq!(report.changed(), 1);
        assert_eq!(records.get(0).unwrap().phone, "+90 555 123 45 67;123");
    }

    #[test]
    fn apply_only_touches_selection() {
        let mut records = sample();
        let selection = Selection::new([2], records.len()).unwrap();
        let transform = Transform::AppendCode {
            code: "VIP".into(),
            position: CodePosition::End,
        };
        apply_transform(&mut records, &selection, &transform).unwrap();
        assert_eq!(records.get(0).unwrap().name, "JOHN SMITH");
        assert_eq!(records.get(2).unwrap().name, "Mary Jane VIP");
    }

    #[test]
    fn apply_rejects_bad_parameters_without_changes() {
        let mut records = sample();
        let before = records.clone();
        let selection = Selection::all(records.len());

        let empty_code = Transform::AppendCode {
            code: " ".into(),
            position: CodePosition::Start,
        };
        assert!(matches!(
            apply_transform(&mut records, &selection, &empty_code),
            Err(Error::Validation { .. })
        ));

        let empty_search = Transform::ReplaceText {
            column: Column::Name,
            search: String::new(),
            replacement: "x".into(),
        };
        assert!(apply_transform(&mut records, &selection, &empty_search).is_err());
        assert_eq!(records, before);
    }

    #[test]
    fn replace_in_other_columns() {
        let mut records = RecordSet::from(vec![Record::new("A", "", "a@OLD.example", "")]);
        let transform = Transform::ReplaceText {
            column: Column::Email,
            search: "old.example".into(),
            replacement: "new.example".into(),
        };
        let report =
            apply_transform(&mut records, &Selection::all(1), &transform).unwrap();
        assert_eq!(report.changed(), 1);
        assert_eq!(records.get(0).unwrap().email, "a@new.example");
    }
}
