//! BIFF record writing
//!
//! Payloads larger than the version's record limit are split, the remainder
//! going into `CONTINUE` records right after the first one.

use tracing::trace;

use crate::ole::xls::error::XlsResult;
use crate::ole::xls::records::{BiffVersion, CONTINUE, RECORD_HEADER_LEN, RecordHeader};
use crate::ole::{OleFile, Stream, StreamMode};

/// Record writer over a write-mode stream
#[derive(Debug)]
pub struct BiffPut {
    stream: Stream,
    version: BiffVersion,
}

impl BiffPut {
    pub fn new(stream: Stream, version: BiffVersion) -> Self {
        Self { stream, version }
    }

    /// Create (or reopen) the stream at `path` and write records to it
    pub fn create(ole: &mut OleFile, path: &[&str], version: BiffVersion) -> XlsResult<Self> {
        Ok(Self::new(ole.open_stream_path(path, StreamMode::Write)?, version))
    }

    pub fn version(&self) -> BiffVersion {
        self.version
    }

    /// Write one logical record
    pub fn put(&mut self, ole: &mut OleFile, opcode: u16, payload: &[u8]) -> XlsResult<()> {
        let max = self.version.max_record_len();
        let mut chunks = payload.chunks(max);
        self.write_record(ole, opcode, chunks.next().unwrap_or(&[]))?;
        for chunk in chunks {
            self.write_record(ole, CONTINUE, chunk)?;
        }
        Ok(())
    }

    /// Write a record without payload
    pub fn put_empty(&mut self, ole: &mut OleFile, opcode: u16) -> XlsResult<()> {
        self.put(ole, opcode, &[])
    }

    /// Write a record whose payload is a single little-endian `u16`
    pub fn put_u16(&mut self, ole: &mut OleFile, opcode: u16, value: u16) -> XlsResult<()> {
        self.put(ole, opcode, &value.to_le_bytes())
    }

    fn write_record(&mut self, ole: &mut OleFile, opcode: u16, data: &[u8]) -> XlsResult<()> {
        let header = RecordHeader {
            opcode,
            length: data.len() as u16,
        };
        let mut bytes = Vec::with_capacity(RECORD_HEADER_LEN + data.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(data);
        self.stream.write(ole, &bytes)?;
        trace!(opcode = format_args!("{:#06x}", opcode), length = data.len(), "put record");
        Ok(())
    }

    /// Hand the stream back; close it to commit its size
    pub fn finish(self) -> Stream {
        self.stream
    }
}
