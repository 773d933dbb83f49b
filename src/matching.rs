//! Matching contacts against an external list of names.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use serde::Serialize;

use crate::dedup::Progress;
use crate::error::{validate_threshold, Error, Result};
use crate::record::RecordSet;
use crate::similarity::{token_set_ratio, token_sort_ratio};

/// Candidates kept per reference name in the fuzzy modes.
pub const CANDIDATE_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Same name ignoring case.
    Exact,
    /// Word order does not matter.
    TokenSort,
    /// Word order and extra words do not matter.
    TokenSet,
}

impl MatchMode {
    fn scorer(self) -> Option<fn(&str, &str) -> u8> {
        match self {
            MatchMode::Exact => None,
            MatchMode::TokenSort => Some(token_sort_ratio),
            MatchMode::TokenSet => Some(token_set_ratio),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMode::Exact => "exact",
            MatchMode::TokenSort => "token sort",
            MatchMode::TokenSet => "token set",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub reference: String,
    /// Contact name as it appears in the table.
    pub name: String,
    pub score: u8,
    /// Table index of the contact that produced the match.
    pub index: usize,
}

pub fn find_matches(
    records: &RecordSet,
    reference_names: &[String],
    mode: MatchMode,
    threshold: u8,
) -> Result<Vec<Match>> {
    find_matches_with_progress(records, reference_names, mode, threshold, &mut |_, _| {
        ControlFlow::Continue(())
    })
}

/// Propose matches for every reference name, in reference order.
///
/// Exact mode reports each contact whose name equals the reference ignoring
/// case, with score 100. The fuzzy modes keep the best
/// [`CANDIDATE_LIMIT`] contacts per reference (ties go to the earlier row)
/// and drop those scoring below `threshold`. Contacts without a name never
/// match.
pub fn find_matches_with_progress(
    records: &RecordSet,
    reference_names: &[String],
    mode: MatchMode,
    threshold: u8,
    progress: Progress<'_>,
) -> Result<Vec<Match>> {
    validate_threshold(threshold)?;

    let names: Vec<(usize, &str)> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| !record.name.is_empty())
        .map(|(index, record)| (index, record.name.as_str()))
        .collect();
    let lowered: Vec<String> = names.iter().map(|(_, name)| name.to_lowercase()).collect();

    let total = reference_names.len();
    let mut matches = Vec::new();
    for (done, reference) in reference_names.iter().enumerate() {
        if progress(done, total).is_break() {
            return Err(Error::Cancelled {
                operation: "reference matching",
            });
        }
        if reference.is_empty() {
            continue;
        }

        let candidates: Vec<(usize, u8)> = match mode.scorer() {
            None => {
                let wanted = reference.to_lowercase();
                lowered
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| **name == wanted)
                    .map(|(pos, _)| (pos, 100))
                    .collect()
            }
            Some(scorer) => {
                let mut scored: Vec<(usize, u8)> = names
                    .iter()
                    .enumerate()
                    .map(|(pos, (_, name))| (pos, scorer(reference, name)))
                    .collect();
                scored.sort_by(|a, b| b.1.cmp(&a.1));
                scored.truncate(CANDIDATE_LIMIT);
                scored.retain(|&(_, score)| score >= threshold);
                scored
            }
        };

        matches.extend(candidates.into_iter().map(|(pos, score)| {
            let (index, name) = names[pos];
            Match {
                reference: reference.clone(),
                name: name.to_string(),
                score,
                index,
            }
        }));
    }
    let _ = progress(total, total);

    tracing::debug!(%mode, references = total, matches = matches.len(), "matching finished");
    Ok(matches)
}

/// Table indices of every contact whose name equals a matched name, in
/// table order. Rows sharing a matched name are all included.
pub fn matched_indices(records: &RecordSet, matches: &[Match]) -> Vec<usize> {
    let wanted: HashSet<&str> = matches.iter().map(|m| m.name.as_str()).collect();
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| wanted.contains(record.name.as_str()))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn contacts(names: &[&str]) -> RecordSet {
        names.iter().map(|name| Record::new(*name, "", "", "")).collect()
    }

    fn refs(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn exact_mode_ignores_case() {
        let records = contacts(&["alice", "Bob"]);
        let matches = find_matches(&records, &refs(&["Alice"]), MatchMode::Exact, 80).unwrap();
        assert_eq!(
            matches,
            vec![Match {
                reference: "Alice".into(),
                name: "alice".into(),
                score: 100,
                index: 0,
            }]
        );
    }

    #[test]
    fn exact_mode_reports_every_equal_contact() {
        let records = contacts(&["Ann", "Bob", "ANN"]);
        let matches = find_matches(&records, &refs(&["ann"]), MatchMode::Exact, 80).unwrap();
        let indices: Vec<_> = matches.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn token_sort_handles_reordered_names() {
        let records = contacts(&["Smith John", "Mary Jones"]);
        let matches =
            find_matches(&records, &refs(&["John Smith"]), MatchMode::TokenSort, 90).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index, 0);
        assert_eq!(matches[0].score, 100);
    }

    #[test]
    fn token_set_handles_extra_words() {
        let records = contacts(&["John A. Smith", "Mary Jones"]);
        let matches =
            find_matches(&records, &refs(&["John Smith"]), MatchMode::TokenSet, 95).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "John A. Smith");
    }

    #[test]
    fn fuzzy_modes_keep_three_best_candidates() {
        let records = contacts(&["Ann Lee", "Ann Lee", "Ann Lee", "Ann Lee", "Zed"]);
        let matches = find_matches(&records, &refs(&["Ann Lee"]), MatchMode::TokenSort, 0).unwrap();
        let indices: Vec<_> = matches.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn unnamed_contacts_never_match() {
        let records = contacts(&["", "Bob"]);
        let matches = find_matches(&records, &refs(&["Bob"]), MatchMode::TokenSet, 0).unwrap();
        assert!(matches.iter().all(|m| m.index == 1));
    }

    #[test]
    fn matched_indices_include_rows_sharing_a_name() {
        let records = contacts(&["Ann", "Bob", "Ann"]);
        let matches = vec![Match {
            reference: "ann".into(),
            name: "Ann".into(),
            score: 100,
            index: 0,
        }];
        assert_eq!(matched_indices(&records, &matches), vec![0, 2]);
    }

    #[test]
    fn matching_can_be_cancelled() {
        let records = contacts(&["Ann Lee", "Bob Ray"]);
        let mut seen = Vec::new();
        let result = find_matches_with_progress(
            &records,
            &refs(&["Ann", "Bob", "Cy"]),
            MatchMode::TokenSort,
            80,
            &mut |done, total| {
                seen.push((done, total));
                if done >= 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        );
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(seen, vec![(0, 3), (1, 3)]);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let records = contacts(&["Ann"]);
        let result = find_matches(&records, &refs(&["Ann"]), MatchMode::TokenSort, 150);
        assert!(matches!(result, Err(Error::Validation { .. })));
    }
}
