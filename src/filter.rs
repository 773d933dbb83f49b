//! Column filters deciding which records the table shows.
//!
//! Each column holds at most one [`FilterSpec`]; a record is shown when it
//! passes the filter of every filtered column.

use std::collections::BTreeMap;

use crate::record::{Column, Record};

/// Lowercase a value for filter comparison.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
}

/// Per-column filter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// Keep rows whose column contains this (lowercased) text.
    Include(String),
    /// Drop rows whose column contains any of these (lowercased) words.
    Exclude(Vec<String>),
}

impl FilterSpec {
    /// Parse filter text as typed in a column filter box.
    ///
    /// `!a,b` builds an exclude list; anything else is an include filter.
    /// There is no escape for a literal comma inside an excluded word.
    pub fn parse(text: &str) -> Self {
        match text.strip_prefix('!') {
            Some(rest) => FilterSpec::Exclude(
                rest.split(',')
                    .map(|word| normalize(word.trim()))
                    .filter(|word| !word.is_empty())
                    .collect(),
            ),
            None => FilterSpec::Include(normalize(text)),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            FilterSpec::Include(text) => !text.is_empty(),
            FilterSpec::Exclude(words) => !words.is_empty(),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        let value = normalize(value);
        match self {
            FilterSpec::Include(text) => value.contains(text.as_str()),
            FilterSpec::Exclude(words) => !words.iter().any(|word| value.contains(word.as_str())),
        }
    }
}

/// Accumulated column filters. Columns combine with AND.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    specs: BTreeMap<Column, FilterSpec>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever filter the column had; an inactive spec clears it.
    pub fn set_filter(&mut self, column: Column, spec: FilterSpec) {
        if spec.is_active() {
            self.specs.insert(column, spec);
        } else {
            self.specs.remove(&column);
        }
    }

    pub fn clear_filters(&mut self) {
        self.specs.clear();
    }

    pub fn get(&self, column: Column) -> Option<&FilterSpec> {
        self.specs.get(&column)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn accepts(&self, record: &Record) -> bool {
        self.specs
            .iter()
            .all(|(column, spec)| spec.matches(record.field(*column)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Record {
        Record::new(name, "", "", "")
    }

    #[test]
    fn include_is_case_insensitive_substring() {
        let mut filters = FilterSet::new();
        filters.set_filter(Column::Name, FilterSpec::parse("ali"));
        assert!(filters.accepts(&named("Alice")));
        assert!(filters.accepts(&named("Natalia")));
        assert!(!filters.accepts(&named("Bob")));
    }

    #[test]
    fn exclude_list_rejects_any_word() {
        let mut filters = FilterSet::new();
        filters.set_filter(Column::Name, FilterSpec::parse("!test, Demo"));
        assert!(!filters.accepts(&named("Test User")));
        assert!(!filters.accepts(&named("demo account")));
        assert!(filters.accepts(&named("Alice")));
    }

    #[test]
    fn setting_one_mode_replaces_the_other() {
        let mut filters = FilterSet::new();
        filters.set_filter(Column::Name, FilterSpec::parse("!bob"));
        filters.set_filter(Column::Name, FilterSpec::parse("bo"));
        assert_eq!(
            filters.get(Column::Name),
            Some(&FilterSpec::Include("bo".into()))
        );
        assert!(filters.accepts(&named("Bob")));
    }

    #[test]
    fn columns_combine_with_and() {
        let mut filters = FilterSet::new();
        filters.set_filter(Column::Name, FilterSpec::parse("a"));
        filters.set_filter(Column::Phone, FilterSpec::parse("555"));
        assert!(filters.accepts(&Record::new("Ann", "0555", "", "")));
        assert!(!filters.accepts(&Record::new("Ann", "0212", "", "")));
        assert!(!filters.accepts(&Record::new("Bob", "0555", "", "")));
    }

    #[test]
    fn empty_filters_are_inactive() {
        let mut filters = FilterSet::new();
        filters.set_filter(Column::Name, FilterSpec::parse(""));
        filters.set_filter(Column::Email, FilterSpec::parse("!,"));
        assert!(filters.is_empty());
        assert!(filters.accepts(&named("anyone")));

        filters.set_filter(Column::Name, FilterSpec::parse("x"));
        filters.clear_filters();
        assert!(filters.is_empty());
    }
}
