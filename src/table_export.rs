//! Spreadsheet export of the contact table.

use std::path::Path;

use crate::error::{Error, Result};
use crate::record::{Column, RecordSet};
use crate::vcard_io::write_atomic;

/// Render the table as CSV with a `Name,Phone,E-mail,Type` header.
pub fn to_csv(records: &RecordSet) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(Column::ALL.iter().map(Column::header))?;
    for record in records {
        writer.write_record(Column::ALL.iter().map(|&column| record.field(column)))?;
    }
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

pub fn export_csv(records: &RecordSet, path: &Path) -> Result<()> {
    let data = to_csv(records).map_err(|source| Error::Csv {
        operation: "write",
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &data)?;
    tracing::debug!(path = %path.display(), records = records.len(), "exported table as CSV");
    Ok(())
}
