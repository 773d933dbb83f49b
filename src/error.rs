use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to the caller of the editing engine.
///
/// Each variant names the operation that failed so a front end can tell a
/// malformed file apart from an unreadable one or a rejected parameter.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse {origin} at line {line}: {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed for {}: {source}", path.display())]
    Csv {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },
}

impl Error {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Reject similarity thresholds outside the 0..=100 score range.
pub fn validate_threshold(threshold: u8) -> Result<()> {
    if threshold > 100 {
        return Err(Error::validation(
            "threshold",
            format!("{threshold} is outside 0-100"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds() {
        assert!(validate_threshold(0).is_ok());
        assert!(validate_threshold(100).is_ok());
        assert!(matches!(
            validate_threshold(101),
            Err(Error::Validation { field: "threshold", .. })
        ));
    }

    #[test]
    fn messages_carry_context() {
        let err = Error::Parse {
            origin: "contacts.vcf".into(),
            line: 7,
            message: "unterminated vCard".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse contacts.vcf at line 7: unterminated vCard"
        );

        let err = Error::io(
            "saving vCard",
            "/tmp/out.vcf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("saving vCard failed for /tmp/out.vcf"));
    }
}
