//! OLE2 compound document engine
//!
//! Reads, modifies and writes Compound File Binary containers: the sector
//! allocation tables, the directory tree of storages and streams, and the
//! stream data they describe. Legacy Excel record framing lives in [`xls`].
//!
//! # Example
//!
//! ```no_run
//! use msole::ole::{OleFile, OleOptions, StreamMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ole = OleFile::create(OleOptions::default())?;
//! let mut stream = ole.open_stream_path(&["Data"], StreamMode::Write)?;
//! stream.write(&mut ole, b"hello")?;
//! stream.close(&mut ole)?;
//! ole.save("out.ole")?;
//! # Ok(())
//! # }
//! ```

/// Constants for OLE file format
pub mod consts;

/// Container configuration
mod config;

/// Error types
mod error;

/// Generation-tagged container bytes
mod buffer;

/// Header validation and initialization
mod header;

/// Big-sector allocation table and DIFAT
mod sector;

/// Mini-sector allocation table
mod minifat;

/// Directory tree
mod directory;

/// Stream handles
mod stream;

/// Container lifecycle and path-level API
mod file;

/// Summary information property sets
pub mod summary;

/// Legacy Excel (.xls) record framing
pub mod xls;

#[cfg(test)]
mod tests;

pub use buffer::BufferView;
pub use config::OleOptions;
pub use consts::{MINI_STREAM_CUTOFF, ROOT_ENTRY, SECTOR_SIZE};
pub use directory::{DirCursor, DirEntry, EntryType, Stat};
pub use error::{ErrorKind, OleError, OleResult};
pub use file::{OleFile, is_ole_file};
pub use sector::ChainLink;
pub use stream::{StorageKind, Stream, StreamMode};
pub use summary::{PropertySet, PropertySetKind, PropertyValue};
