//! In-memory contact table.
//!
//! A [`Record`] always carries all four columns. Multi-valued columns
//! (phone, email, type) are stored the way they are displayed: one string
//! with `;` between entries. Phone and type entries line up by position.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::filter::FilterSet;

/// Separator between entries of a multi-valued column.
pub const LIST_SEPARATOR: &str = ";";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Record {
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(rename = "type")]
    pub types: String,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        types: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            types: types.into(),
        }
    }

    pub fn field(&self, column: Column) -> &str {
        match column {
            Column::Name => &self.name,
            Column::Phone => &self.phone,
            Column::Email => &self.email,
            Column::Type => &self.types,
        }
    }

    pub fn field_mut(&mut self, column: Column) -> &mut String {
        match column {
            Column::Name => &mut self.name,
            Column::Phone => &mut self.phone,
            Column::Email => &mut self.email,
            Column::Type => &mut self.types,
        }
    }

    /// Phone entries paired with their type tag. A phone without a matching
    /// type entry gets an empty tag.
    pub fn phones_with_types(&self) -> Vec<(&str, &str)> {
        if self.phone.is_empty() {
            return Vec::new();
        }
        let mut types = split_list(&self.types).into_iter();
        split_list(&self.phone)
            .into_iter()
            .map(|phone| (phone, types.next().unwrap_or("")))
            .collect()
    }

    pub fn emails(&self) -> Vec<&str> {
        if self.email.is_empty() {
            return Vec::new();
        }
        split_list(&self.email)
    }
}

/// Split a `;`-joined column into its entries.
pub fn split_list(value: &str) -> Vec<&str> {
    value.split(LIST_SEPARATOR).collect()
}

/// The four table columns, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Column {
    Name,
    Phone,
    Email,
    Type,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Name, Column::Phone, Column::Email, Column::Type];

    /// Header text used by the table view and the CSV export.
    pub fn header(&self) -> &'static str {
        match self {
            Column::Name => "Name",
            Column::Phone => "Phone",
            Column::Email => "E-mail",
            Column::Type => "Type",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" | "fn" => Ok(Column::Name),
            "phone" | "tel" => Ok(Column::Phone),
            "email" | "e-mail" | "mail" => Ok(Column::Email),
            "type" => Ok(Column::Type),
            other => Err(Error::validation(
                "column",
                format!("unknown column `{other}`, expected one of: name, phone, email, type"),
            )),
        }
    }
}

/// Ordered list of contacts as loaded from, and saved back to, a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Caller-chosen subset of record indices targeted by a bulk operation.
///
/// Keeps the caller's order (dedup keeps the first record of a run in this
/// order) and drops repeated indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    indices: Vec<usize>,
}

impl Selection {
    pub fn new(indices: impl IntoIterator<Item = usize>, len: usize) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for index in indices {
            if index >= len {
                return Err(Error::validation(
                    "selection",
                    format!("row {} is out of range (table has {len} rows)", index + 1),
                ));
            }
            if seen.insert(index) {
                out.push(index);
            }
        }
        Ok(Self { indices: out })
    }

    pub fn all(len: usize) -> Self {
        Self {
            indices: (0..len).collect(),
        }
    }

    /// Every record the filters currently show, in table order.
    pub fn visible(records: &RecordSet, filters: &FilterSet) -> Self {
        Self {
            indices: records
                .iter()
                .enumerate()
                .filter(|(_, record)| filters.accepts(record))
                .map(|(index, _)| index)
                .collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Remove the records at `indices`, keeping the relative order of the rest.
///
/// Returns the removed records in table order. Nothing is removed when any
/// index is out of range.
pub fn commit_removal(records: &mut RecordSet, indices: &[usize]) -> Result<RecordSet> {
    let len = records.len();
    if let Some(bad) = indices.iter().find(|&&index| index >= len) {
        return Err(Error::validation(
            "removal",
            format!("row {} is out of range (table has {len} rows)", bad + 1),
        ));
    }

    let doomed: HashSet<usize> = indices.iter().copied().collect();
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut records.records)
        .into_iter()
        .enumerate()
        .partition(|(index, _)| doomed.contains(index));

    records.records = kept.into_iter().map(|(_, record)| record).collect();
    tracing::debug!(removed = removed.len(), remaining = records.len(), "committed removal");
    Ok(removed.into_iter().map(|(_, record)| record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordSet {
        RecordSet::from(vec![
            Record::new("Alice", "1", "", ""),
            Record::new("Bob", "2", "", ""),
            Record::new("Carol", "3", "", ""),
        ])
    }

    #[test]
    fn phones_pair_with_types_by_position() {
        let record = Record::new("A", "111;222;333", "", "cell;home");
        assert_eq!(
            record.phones_with_types(),
            vec![("111", "cell"), ("222", "home"), ("333", "")]
        );
        assert!(Record::default().phones_with_types().is_empty());
    }

    #[test]
    fn column_parsing_accepts_headers() {
        assert_eq!("E-mail".parse::<Column>().unwrap(), Column::Email);
        assert_eq!("TEL".parse::<Column>().unwrap(), Column::Phone);
        assert!("address".parse::<Column>().is_err());
    }

    #[test]
    fn selection_rejects_out_of_range_and_dedupes() {
        let selection = Selection::new([2, 0, 2], 3).unwrap();
        assert_eq!(selection.indices(), &[2, 0]);
        assert!(Selection::new([3], 3).is_err());
    }

    #[test]
    fn commit_removal_keeps_order() {
        let mut records = sample();
        let removed = commit_removal(&mut records, &[1]).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed.get(0).unwrap().name, "Bob");
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Carol"]);
    }

    #[test]
    fn commit_removal_out_of_range_is_atomic() {
        let mut records = sample();
        assert!(commit_removal(&mut records, &[0, 9]).is_err());
        assert_eq!(records.len(), 3);
    }
}
