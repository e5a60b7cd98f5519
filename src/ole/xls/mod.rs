//! BIFF record framing
//!
//! Reads and writes the record layer of legacy Excel (.xls) streams on top of
//! the compound-file stream API. Record contents are not interpreted.

/// Error types for record framing
mod error;

/// Record reading and continuation merging
mod records;

/// Record writing
mod put;

pub use error::{XlsError, XlsResult};
pub use put::BiffPut;
pub use records::{BiffQuery, BiffVersion, CONTINUE, RECORD_HEADER_LEN, RecordHeader};
