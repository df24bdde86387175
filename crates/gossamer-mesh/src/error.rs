//! Mesh error types.

use thiserror::Error;

/// Errors that can occur while handling topology gossip.
#[derive(Debug, Error)]
pub enum MeshError {
    /// An update ended mid-block.
    #[error("truncated update: {0}")]
    Truncated(&'static str),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidString(&'static str),

    /// A boolean flag byte was neither 0 nor 1.
    #[error("invalid flag byte 0x{value:02x} for {field}")]
    InvalidFlag {
        /// The field the byte belonged to.
        field: &'static str,
        /// The offending value.
        value: u8,
    },

    /// A short id on the wire was outside the 12-bit range.
    #[error("short id {0} out of range")]
    ShortIdOutOfRange(u16),

    /// A peer name failed to parse.
    #[error(transparent)]
    Name(#[from] gossamer_core::Error),
}
