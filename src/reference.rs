//! Reference name lists used by [`crate::matching`].
//!
//! A `.csv` file contributes the first column of every row, header row
//! included. Any other file contributes one name per line.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub fn load_reference_names(path: &Path) -> Result<Vec<String>> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let names = if is_csv {
        let data = fs::read(path).map_err(|source| Error::io("read", path, source))?;
        names_from_csv(&data).map_err(|source| Error::Csv {
            operation: "read",
            path: path.to_path_buf(),
            source,
        })?
    } else {
        let text =
            fs::read_to_string(path).map_err(|source| Error::io("read", path, source))?;
        names_from_lines(&text)
    };

    tracing::debug!(path = %path.display(), count = names.len(), "loaded reference names");
    Ok(names)
}

/// First cell of each CSV row, trimmed; blank cells are skipped.
pub fn names_from_csv(data: &[u8]) -> std::result::Result<Vec<String>, csv::Error> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut names = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(name) = row.get(0).map(str::trim).filter(|name| !name.is_empty()) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Trimmed non-blank lines.
pub fn names_from_lines(text: &str) -> Vec<String> {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn csv_takes_first_column_including_header() {
        let names = names_from_csv(b"Name,Note\nAlice,friend\n  Bob  \n,empty\n").unwrap();
        assert_eq!(names, vec!["Name", "Alice", "Bob"]);
    }

    #[test]
    fn csv_handles_quoted_cells() {
        let names = names_from_csv(b"\"Smith, John\",x\n").unwrap();
        assert_eq!(names, vec!["Smith, John"]);
    }

    #[test]
    fn text_lists_skip_blank_lines() {
        assert_eq!(
            names_from_lines("Alice\r\n\n  Bob \n"),
            vec!["Alice".to_string(), "Bob".to_string()]
        );
    }

    #[test]
    fn picks_format_from_extension() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("people.CSV");
        fs::write(&csv_path, "Alice,1\nBob,2\n").unwrap();
        let txt_path = dir.path().join("people.txt");
        fs::write(&txt_path, "Alice,1\nBob,2\n").unwrap();

        assert_eq!(load_reference_names(&csv_path).unwrap(), vec!["Alice", "Bob"]);
        assert_eq!(load_reference_names(&txt_path).unwrap(), vec!["Alice,1", "Bob,2"]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = load_reference_names(&dir.path().join("nope.csv"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
