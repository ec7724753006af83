/*!
    Error types shared across the pipeline crates.
*/

use std::fmt;

/**
    Error type for the pipeline crates.
*/
#[derive(Debug)]
pub enum Error {
    /// I/O error (file not found, network failure, ...)
    Io(std::io::Error),
    /// Codec or container error from the media backend
    Codec { message: String },
    /// Malformed or unexpected input data
    InvalidData { message: String },
    /// Valid but unhandled format
    UnsupportedFormat { message: String },
    /// The reader's I/O deadline elapsed
    Timeout,
    /// End of stream (control flow, not a failure)
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Codec { message } => write!(f, "codec error: {message}"),
            Self::InvalidData { message } => write!(f, "invalid data: {message}"),
            Self::UnsupportedFormat { message } => write!(f, "unsupported format: {message}"),
            Self::Timeout => write!(f, "i/o deadline elapsed"),
            Self::Eof => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Error {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/**
    Result type alias for the pipeline crates.
*/
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            format!("{}", Error::codec("decode failed")),
            "codec error: decode failed"
        );
        assert_eq!(
            format!("{}", Error::invalid_data("short packet")),
            "invalid data: short packet"
        );
        assert_eq!(format!("{}", Error::Timeout), "i/o deadline elapsed");
        assert_eq!(format!("{}", Error::Eof), "end of stream");
    }

    #[test]
    fn io_conversion_keeps_source() {
        use std::error::Error as StdError;
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn predicates() {
        assert!(Error::Eof.is_eof());
        assert!(!Error::Timeout.is_eof());
        assert!(Error::Timeout.is_timeout());
        assert!(!Error::codec("x").is_timeout());
    }
}
