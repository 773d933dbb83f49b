//! Contact list cleanup: load a vCard file into a table, edit it in bulk,
//! find duplicates, match against a reference list and save it back.

pub mod dedup;
pub mod error;
pub mod filter;
pub mod matching;
pub mod record;
pub mod reference;
pub mod similarity;
pub mod table_export;
pub mod transform;
pub mod vcard_io;

pub use dedup::{find_duplicates, find_duplicates_with_progress, DuplicateMode, DuplicateReport};
pub use error::{Error, Result};
pub use filter::{FilterSet, FilterSpec};
pub use matching::{find_matches, find_matches_with_progress, matched_indices, Match, MatchMode};
pub use record::{commit_removal, Column, Record, RecordSet, Selection};
pub use reference::load_reference_names;
pub use table_export::export_csv;
pub use transform::{apply_transform, ChangeReport, CodePosition, Transform};
pub use vcard_io::{load, parse_str, save, serialize, ExportVariant};
