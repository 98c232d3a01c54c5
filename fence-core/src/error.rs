//! Error types for the deprecation transform

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Any of these aborts the whole transform.
///
/// Per-container metadata problems are not represented here: they are
/// recovered locally and surface as [`crate::metadata::MetadataDecodeError`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed keep pattern. Raised before any entry is processed.
    #[error("Syntax error at {line}:{col}: {message}")]
    SpecSyntax { message: String, line: usize, col: usize },

    /// Read/write failure on the underlying stream
    #[error("Archive I/O error: {0}")]
    ArchiveIo(#[from] std::io::Error),

    /// The archive container itself is unreadable
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A declaration container is not a well-formed class file
    #[error("Invalid class file: {0}")]
    ClassFormat(String),

    /// Interning a constant would exceed the 16-bit pool index space
    #[error("Constant pool overflow: a class file holds at most 65535 constants")]
    ConstantPoolOverflow,

    /// Invalid configuration file
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn class_format(message: impl Into<String>) -> Self {
        Error::ClassFormat(message.into())
    }

    /// Whether this error came from the keep-pattern parser
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::SpecSyntax { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = Error::SpecSyntax {
            message: "Unterminated member list".to_string(),
            line: 2,
            col: 7,
        };
        assert_eq!(err.to_string(), "Syntax error at 2:7: Unterminated member list");
        assert!(err.is_syntax());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();
        assert!(matches!(err, Error::ArchiveIo(_)));
        assert!(!err.is_syntax());
    }
}
