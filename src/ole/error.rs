//! Error types for compound file access
//!
//! Every failure the container can report falls into one of the classes of
//! [`ErrorKind`]. Clean end of stream is never an error.

use thiserror::Error;

/// Result type alias for OLE operations
pub type OleResult<T> = Result<T, OleError>;

/// Broad classification of an [`OleError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Allocation table or file growth exhausted
    Capacity,
    /// Corrupt or truncated container structure
    Malformed,
    /// The caller used a handle or entry in a way the container forbids
    Misuse,
    /// A named entry does not exist
    NotFound,
    /// Underlying I/O failure
    Io,
}

/// Errors that can occur while reading or writing a compound file
#[derive(Error, Debug)]
pub enum OleError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Signature bytes missing or file too small
    #[error("Not an OLE file")]
    NotOleFile,

    /// Structural damage that could not be recovered
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// A chain revisits one of its own sectors
    #[error("Cyclic {table} chain detected at sector {sector}")]
    CyclicChain {
        /// Which table the chain lives in ("FAT" or "MiniFAT")
        table: &'static str,
        /// First sector seen twice
        sector: u32,
    },

    /// The allocation table cannot describe any more sectors
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A read asked for bytes past the committed stream size
    #[error("Read past end of stream: {requested} bytes at {position}, stream size {size}")]
    ReadPastEnd {
        /// Cursor position at the time of the read
        position: u64,
        /// Bytes requested
        requested: u64,
        /// Committed stream size
        size: u64,
    },

    /// A handle or view predates a file growth
    #[error("Stale handle: issued for generation {issued}, container is at generation {current}")]
    StaleHandle {
        /// Generation the handle was issued against
        issued: u64,
        /// Current container generation
        current: u64,
    },

    /// Entry exists but is not a storage
    #[error("Entry {0} is not a storage")]
    NotAStorage(u32),

    /// Entry exists but is not a stream
    #[error("Entry {0} is not a stream")]
    NotAStream(u32),

    /// Directory index does not name a live entry
    #[error("Invalid directory entry {0}")]
    InvalidEntry(u32),

    /// Entry name cannot be stored
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    /// Unlink preconditions not met
    #[error("Cannot unlink entry {index}: {reason}")]
    CannotUnlink {
        /// Entry that was asked to be removed
        index: u32,
        /// Which precondition failed
        reason: &'static str,
    },

    /// Write attempted through a read-only container or handle
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path lookup failed
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// Malformed scalar data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl OleError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            OleError::Io(_) => ErrorKind::Io,
            OleError::CapacityExhausted(_) => ErrorKind::Capacity,
            OleError::NotOleFile
            | OleError::CorruptedFile(_)
            | OleError::CyclicChain { .. }
            | OleError::ReadPastEnd { .. }
            | OleError::InvalidData(_) => ErrorKind::Malformed,
            OleError::StaleHandle { .. }
            | OleError::NotAStorage(_)
            | OleError::NotAStream(_)
            | OleError::InvalidEntry(_)
            | OleError::InvalidName(_)
            | OleError::CannotUnlink { .. }
            | OleError::PermissionDenied(_) => ErrorKind::Misuse,
            OleError::StreamNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// True for corrupt or truncated structure
    pub fn is_malformed(&self) -> bool {
        self.kind() == ErrorKind::Malformed
    }
}

/// Report a recoverable structural problem.
///
/// Lenient containers log it and carry on; strict ones fail with
/// [`OleError::CorruptedFile`].
pub(crate) fn tolerate(lenient: bool, message: String) -> OleResult<()> {
    if lenient {
        tracing::warn!("{}", message);
        Ok(())
    } else {
        Err(OleError::CorruptedFile(message))
    }
}

impl From<crate::common::binary::BinaryError> for OleError {
    fn from(err: crate::common::binary::BinaryError) -> Self {
        OleError::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            OleError::CapacityExhausted("full".into()).kind(),
            ErrorKind::Capacity
        );
        assert!(
            OleError::CyclicChain {
                table: "FAT",
                sector: 3
            }
            .is_malformed()
        );
        assert_eq!(
            OleError::StaleHandle {
                issued: 0,
                current: 1
            }
            .kind(),
            ErrorKind::Misuse
        );
        assert_eq!(
            OleError::StreamNotFound("Book".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_error_display() {
        let err = OleError::ReadPastEnd {
            position: 10,
            requested: 20,
            size: 16,
        };
        assert_eq!(
            err.to_string(),
            "Read past end of stream: 20 bytes at 10, stream size 16"
        );
    }
}
