//! Error types for the pinpoint library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`PinpointError`] enum. Corruption (`BadFormat`, `BadChecksum`) is kept
//! distinct from caller bugs (`OutOfRange`, `ZeroPageNumber`) and from
//! per-document conditions that the pipeline recovers from locally
//! (`DuplicatePdf`, `NoMatch`, `Extract`).

use std::io;

use thiserror::Error;

/// The main error type for pinpoint operations.
#[derive(Error, Debug)]
pub enum PinpointError {
    /// I/O errors (file operations, channel disconnects).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialisation errors from manifests and sidecars.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inverted-index engine errors.
    #[error("index error: {0}")]
    Index(String),

    /// A binary frame or identifier did not have the expected structure.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// A frame's CRC did not match its payload. The page is corrupt and
    /// the document should be reindexed.
    #[error("bad checksum")]
    BadChecksum,

    /// A document or page index was outside the stored range.
    #[error("out of range")]
    OutOfRange,

    /// The same content hash was submitted twice.
    #[error("duplicate PDF: {0}")]
    DuplicatePdf(String),

    /// A page number of zero was supplied where a 1-based PDF page number
    /// is required.
    #[error("page number 0 should never happen")]
    ZeroPageNumber,

    /// A search hit could not be resolved to a byte range in the page text.
    #[error("no match for hit")]
    NoMatch,

    /// The PDF extractor failed or panicked.
    #[error("extraction error: {0}")]
    Extract(String),

    /// A force-create was refused because the target directory does not
    /// look like a positions store.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Generic wrapped error from callers embedding this library.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`PinpointError`].
pub type Result<T> = std::result::Result<T, PinpointError>;

impl PinpointError {
    /// Create a new index-engine error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        PinpointError::Index(msg.into())
    }

    /// Create a new bad-format error.
    pub fn bad_format<S: Into<String>>(msg: S) -> Self {
        PinpointError::BadFormat(msg.into())
    }

    /// Create a new extraction error.
    pub fn extract<S: Into<String>>(msg: S) -> Self {
        PinpointError::Extract(msg.into())
    }

    /// Create a new corrupt-store error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        PinpointError::Corrupt(msg.into())
    }

    /// True if this error is recoverable at document scope: the current
    /// document is skipped and indexing continues.
    pub fn is_document_local(&self) -> bool {
        matches!(
            self,
            PinpointError::DuplicatePdf(_) | PinpointError::Extract(_)
        )
    }
}

impl From<tantivy::TantivyError> for PinpointError {
    fn from(err: tantivy::TantivyError) -> Self {
        PinpointError::Index(err.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for PinpointError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        PinpointError::Index(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PinpointError::DuplicatePdf("abcd".to_string());
        assert_eq!(err.to_string(), "duplicate PDF: abcd");

        let err = PinpointError::BadChecksum;
        assert_eq!(err.to_string(), "bad checksum");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = PinpointError::from(io_error);
        match err {
            PinpointError::Io(_) => {}
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn test_document_local_errors() {
        assert!(PinpointError::DuplicatePdf("h".into()).is_document_local());
        assert!(PinpointError::extract("boom").is_document_local());
        assert!(!PinpointError::BadChecksum.is_document_local());
        assert!(!PinpointError::OutOfRange.is_document_local());
    }
}
