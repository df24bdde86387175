//! Error types for identity parsing.

use thiserror::Error;

/// The error type for gossamer identity operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A textual peer name did not match the `xx:xx:xx:xx:xx:xx` form.
    #[error("invalid peer name '{input}': {reason}")]
    InvalidPeerName {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A binary peer name was not exactly six bytes.
    #[error("invalid peer name bytes: expected 6, got {len}")]
    InvalidNameBytes {
        /// The length that was supplied.
        len: usize,
    },
}

/// A specialized Result type for identity operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new invalid peer name error.
    #[must_use]
    pub fn invalid_peer_name(input: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPeerName {
            input: input.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn invalid_peer_name_display() {
        let err = Error::invalid_peer_name("xyz", "expected six colon-separated hex bytes");
        assert_eq!(
            err.to_string(),
            "invalid peer name 'xyz': expected six colon-separated hex bytes"
        );
    }

    #[test]
    fn invalid_name_bytes_display() {
        let err = Error::InvalidNameBytes { len: 4 };
        assert_eq!(err.to_string(), "invalid peer name bytes: expected 6, got 4");
    }
}
