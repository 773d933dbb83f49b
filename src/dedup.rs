//! Duplicate detection inside a selection.
//!
//! Detection only proposes: the report lists which records could go and
//! why. Removing them is a separate [`crate::record::commit_removal`] call.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;

use serde::Serialize;

use crate::error::{validate_threshold, Error, Result};
use crate::record::{RecordSet, Selection};
use crate::similarity::ratio;

/// Callback invoked before each outer scan step with `(done, total)`.
/// Returning [`ControlFlow::Break`] stops the scan.
pub type Progress<'a> = &'a mut dyn FnMut(usize, usize) -> ControlFlow<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateMode {
    /// Same name and same phone, compared exactly.
    ExactComposite,
    /// Same phone, compared exactly.
    ExactPhone,
    /// Names within a similarity threshold, ignoring case.
    FuzzyName,
}

impl fmt::Display for DuplicateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DuplicateMode::ExactComposite => "exact match (name + phone)",
            DuplicateMode::ExactPhone => "exact phone match",
            DuplicateMode::FuzzyName => "fuzzy name match",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    /// Record that stays.
    pub original: usize,
    /// Record flagged as its duplicate.
    pub duplicate: usize,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateReport {
    pub mode: DuplicateMode,
    /// Record indices that were examined, in selection order.
    pub selection: Vec<usize>,
    /// One flag per entry of `selection`.
    pub flags: Vec<bool>,
    pub pairs: Vec<DuplicatePair>,
}

impl DuplicateReport {
    /// Record indices the caller may pass to `commit_removal`.
    pub fn removable(&self) -> Vec<usize> {
        self.selection
            .iter()
            .zip(&self.flags)
            .filter(|(_, &flagged)| flagged)
            .map(|(&index, _)| index)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.iter().any(|&flagged| flagged)
    }
}

pub fn find_duplicates(
    records: &RecordSet,
    selection: &Selection,
    mode: DuplicateMode,
    threshold: u8,
) -> Result<DuplicateReport> {
    find_duplicates_with_progress(records, selection, mode, threshold, &mut |_, _| {
        ControlFlow::Continue(())
    })
}

/// Like [`find_duplicates`], reporting progress of the fuzzy scan.
///
/// `threshold` only applies to [`DuplicateMode::FuzzyName`] but is checked
/// for every mode.
pub fn find_duplicates_with_progress(
    records: &RecordSet,
    selection: &Selection,
    mode: DuplicateMode,
    threshold: u8,
    progress: Progress<'_>,
) -> Result<DuplicateReport> {
    validate_threshold(threshold)?;

    let members = selection
        .indices()
        .iter()
        .map(|&index| {
            records.get(index).map(|record| (index, record)).ok_or_else(|| {
                Error::validation(
                    "selection",
                    format!(
                        "row {} is out of range (table has {} rows)",
                        index + 1,
                        records.len()
                    ),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut report = DuplicateReport {
        mode,
        selection: selection.indices().to_vec(),
        flags: vec![false; members.len()],
        pairs: Vec::new(),
    };

    match mode {
        DuplicateMode::ExactComposite => {
            let keys = members
                .iter()
                .map(|(_, r)| (r.name.as_str(), r.phone.as_str()));
            flag_equal_keys(&mut report, keys);
        }
        DuplicateMode::ExactPhone => {
            let keys = members.iter().map(|(_, r)| r.phone.as_str());
            flag_equal_keys(&mut report, keys);
        }
        DuplicateMode::FuzzyName => {
            let names: Vec<String> = members.iter().map(|(_, r)| r.name.to_lowercase()).collect();
            let total = names.len();
            for i in 0..total {
                if progress(i, total).is_break() {
                    return Err(Error::Cancelled {
                        operation: "duplicate scan",
                    });
                }
                if names[i].is_empty() {
                    continue;
                }
                for j in (i + 1)..total {
                    if names[j].is_empty() {
                        continue;
                    }
                    let score = ratio(&names[i], &names[j]);
                    if score >= threshold {
                        report.flags[j] = true;
                        report.pairs.push(DuplicatePair {
                            original: members[i].0,
                            duplicate: members[j].0,
                            score,
                        });
                    }
                }
            }
            let _ = progress(total, total);
        }
    }

    tracing::debug!(
        %mode,
        selected = report.selection.len(),
        flagged = report.removable().len(),
        "duplicate scan finished"
    );
    Ok(report)
}

/// Flag every member whose key was already seen. Empty keys compare like
/// any other value.
fn flag_equal_keys<K, I>(report: &mut DuplicateReport, keys: I)
where
    K: std::hash::Hash + Eq,
    I: Iterator<Item = K>,
{
    let mut first_seen: HashMap<K, usize> = HashMap::new();
    for (pos, key) in keys.enumerate() {
        match first_seen.get(&key) {
            Some(&first) => {
                report.flags[pos] = true;
                report.pairs.push(DuplicatePair {
                    original: report.selection[first],
                    duplicate: report.selection[pos],
                    score: 100,
                });
            }
            None => {
                first_seen.insert(key, pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn set(rows: &[(&str, &str)]) -> RecordSet {
        rows.iter()
            .map(|(name, phone)| Record::new(*name, *phone, "", ""))
            .collect()
    }

    #[test]
    fn exact_composite_flags_later_copies() {
        let records = set(&[("A", "1"), ("A", "1"), ("B", "2")]);
        let report = find_duplicates(
            &records,
            &Selection::all(records.len()),
            DuplicateMode::ExactComposite,
            80,
        )
        .unwrap();
        assert_eq!(report.flags, vec![false, true, false]);
        assert_eq!(report.removable(), vec![1]);
        assert_eq!(
            report.pairs,
            vec![DuplicatePair {
                original: 0,
                duplicate: 1,
                score: 100
            }]
        );
    }

    #[test]
    fn exact_composite_is_case_sensitive() {
        let records = set(&[("A", "1"), ("a", "1")]);
        let report = find_duplicates(
            &records,
            &Selection::all(2),
            DuplicateMode::ExactComposite,
            80,
        )
        .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn exact_phone_ignores_names() {
        let records = set(&[("A", "1"), ("B", "1"), ("C", "2")]);
        let report =
            find_duplicates(&records, &Selection::all(3), DuplicateMode::ExactPhone, 80).unwrap();
        assert_eq!(report.removable(), vec![1]);
    }

    #[test]
    fn exact_phone_treats_empty_phones_as_equal() {
        let records = set(&[("A", "1"), ("C", ""), ("D", "")]);
        let report =
            find_duplicates(&records, &Selection::all(3), DuplicateMode::ExactPhone, 80).unwrap();
        assert_eq!(report.flags, vec![false, false, true]);
        assert_eq!(
            report.pairs,
            vec![DuplicatePair {
                original: 1,
                duplicate: 2,
                score: 100
            }]
        );
    }

    #[test]
    fn exact_composite_flags_blank_records() {
        let records: RecordSet = vec![Record::default(), Record::default()].into();
        let report = find_duplicates(
            &records,
            &Selection::all(2),
            DuplicateMode::ExactComposite,
            80,
        )
        .unwrap();
        assert_eq!(report.flags, vec![false, true]);
    }

    #[test]
    fn first_in_selection_order_is_kept() {
        let records = set(&[("A", "1"), ("A", "1"), ("B", "2")]);
        let selection = Selection::new([1, 0], records.len()).unwrap();
        let report =
            find_duplicates(&records, &selection, DuplicateMode::ExactComposite, 80).unwrap();
        assert_eq!(report.flags, vec![false, true]);
        assert_eq!(report.removable(), vec![0]);
    }

    #[test]
    fn fuzzy_name_threshold() {
        let records = set(&[("Jon Smith", ""), ("John Smith", ""), ("Bob", "")]);
        let report =
            find_duplicates(&records, &Selection::all(3), DuplicateMode::FuzzyName, 90).unwrap();
        assert_eq!(report.flags, vec![false, true, false]);
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.pairs[0].original, 0);
        assert_eq!(report.pairs[0].duplicate, 1);
        assert!(report.pairs[0].score >= 90);
    }

    #[test]
    fn fuzzy_name_skips_empty_names() {
        let records = set(&[("", "1"), ("", "2"), ("Ann", "3")]);
        let report =
            find_duplicates(&records, &Selection::all(3), DuplicateMode::FuzzyName, 0).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn fuzzy_name_is_case_insensitive() {
        let records = set(&[("ALICE COOPER", ""), ("alice cooper", "")]);
        let report =
            find_duplicates(&records, &Selection::all(2), DuplicateMode::FuzzyName, 100).unwrap();
        assert_eq!(report.removable(), vec![1]);
    }

    #[test]
    fn rejects_threshold_before_scanning() {
        let records = set(&[("A", "1")]);
        let mut calls = 0;
        let result = find_duplicates_with_progress(
            &records,
            &Selection::all(1),
            DuplicateMode::FuzzyName,
            101,
            &mut |_, _| {
                calls += 1;
                ControlFlow::Continue(())
            },
        );
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert_eq!(calls, 0);
    }

    #[test]
    fn scan_can_be_cancelled() {
        let records = set(&[("Ann", ""), ("Anne", ""), ("Anna", "")]);
        let result = find_duplicates_with_progress(
            &records,
            &Selection::all(3),
            DuplicateMode::FuzzyName,
            80,
            &mut |done, _| {
                if done >= 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }
}
