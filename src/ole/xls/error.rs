//! Error types for BIFF record framing

use thiserror::Error;

use crate::ole::{ErrorKind, OleError};

/// Result type alias for XLS operations
pub type XlsResult<T> = Result<T, XlsError>;

/// Errors that can occur while reading or writing BIFF records
#[derive(Error, Debug)]
pub enum XlsError {
    /// CFB (Compound File Binary) error
    #[error("CFB error: {0}")]
    Cfb(#[from] OleError),

    /// A record declares more payload than its stream holds
    #[error(
        "Truncated record 0x{opcode:04X} at offset {offset}: declares {declared} bytes, {available} available"
    )]
    TruncatedRecord {
        /// Opcode of the offending record
        opcode: u16,
        /// Stream offset of its header
        offset: u64,
        /// Declared payload length
        declared: u16,
        /// Bytes left in the stream after the header
        available: u64,
    },

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl XlsError {
    /// Classify this error with the container taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            XlsError::Cfb(err) => err.kind(),
            XlsError::TruncatedRecord { .. } | XlsError::InvalidData(_) => ErrorKind::Malformed,
        }
    }
}

impl From<crate::common::binary::BinaryError> for XlsError {
    fn from(err: crate::common::binary::BinaryError) -> Self {
        XlsError::InvalidData(err.to_string())
    }
}
