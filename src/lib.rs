//! msole - OLE2 compound documents and BIFF record streams
//!
//! This library reads and writes OLE2 (Compound File Binary) containers, the
//! structured-storage format behind legacy Microsoft Office files, and frames
//! the BIFF records stored in their Excel workbook streams.
//!
//! # Features
//!
//! - **Compound files**: open, create, modify and save containers, including
//!   big and mini sector allocation and the directory tree
//! - **Stream handles**: positioned reads and writes, with zero-copy views
//!   where the data is contiguous in the file
//! - **Summary information**: typed access to the document property sets
//! - **BIFF records**: iterate records with `CONTINUE` merging, and write
//!   records that are split automatically
//! - **Lenient recovery**: non-conformant files are repaired with a warning
//!   unless strict mode is requested
//!
//! # Example - Reading records from a workbook
//!
//! ```no_run
//! use msole::ole::{OleFile, OleOptions};
//! use msole::ole::xls::BiffQuery;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ole = OleFile::open("book.xls", OleOptions::default())?;
//! let mut query = BiffQuery::open(&mut ole, &["Workbook"])?;
//! while query.next(&ole)? {
//!     println!("record {:#06x}: {} bytes", query.opcode(), query.length());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Listing streams
//!
//! ```no_run
//! use msole::ole::{OleFile, OleOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ole = OleFile::open("document.doc", OleOptions::new().with_read_only(true))?;
//! for path in ole.list_streams()? {
//!     println!("Stream: {}", path.join("/"));
//! }
//! # Ok(())
//! # }
//! ```

/// Shared binary helpers
pub mod common;

/// OLE2 compound file engine and BIFF record framing
pub mod ole;
