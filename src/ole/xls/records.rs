//! BIFF record reading
//!
//! A BIFF stream is a sequence of records, each a 4-byte header (opcode and
//! payload length, little-endian) followed by the payload. Payloads too large
//! for one record continue in `CONTINUE` records that immediately follow it;
//! [`BiffQuery`] merges those back into one logical record.

use std::io::SeekFrom;

use tracing::trace;

use crate::common::binary::read_u16_le;
use crate::ole::buffer::BufferView;
use crate::ole::error::tolerate;
use crate::ole::xls::error::{XlsError, XlsResult};
use crate::ole::{OleFile, Stream, StreamMode};

/// Opcode of a continuation record
pub const CONTINUE: u16 = 0x003C;

/// Size of a record header in bytes
pub const RECORD_HEADER_LEN: usize = 4;

/// BIFF record header (4 bytes: type + length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub opcode: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        Ok(RecordHeader {
            opcode: read_u16_le(data, 0)?,
            length: read_u16_le(data, 2)?,
        })
    }

    pub fn to_bytes(self) -> [u8; RECORD_HEADER_LEN] {
        let mut bytes = [0u8; RECORD_HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.opcode.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}

/// BIFF versions supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiffVersion {
    Biff2 = 0x0200,
    Biff3 = 0x0300,
    Biff4 = 0x0400,
    Biff5 = 0x0500,
    Biff8 = 0x0600,
}

impl BiffVersion {
    /// Largest payload a single record may carry
    pub fn max_record_len(self) -> usize {
        match self {
            BiffVersion::Biff8 => 0x2020,
            _ => 0x820,
        }
    }
}

#[derive(Debug)]
enum RecordData {
    Empty,
    /// Contiguous payload, straight from the container buffer
    View(BufferView),
    /// Copied or merged payload
    Owned(Vec<u8>),
}

impl RecordData {
    fn bytes<'a>(&'a self, ole: &'a OleFile) -> XlsResult<&'a [u8]> {
        match self {
            RecordData::Empty => Ok(&[]),
            RecordData::View(view) => Ok(ole.resolve(view)?),
            RecordData::Owned(data) => Ok(data),
        }
    }
}

/// Cursor over the records of one stream
#[derive(Debug)]
pub struct BiffQuery {
    stream: Stream,
    opcode: u16,
    /// Logical length, after merging continuations
    length: u32,
    /// Stream offset of the current record's header
    stream_pos: u64,
    data: RecordData,
    merged: bool,
}

impl BiffQuery {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            opcode: 0,
            length: 0,
            stream_pos: 0,
            data: RecordData::Empty,
            merged: false,
        }
    }

    /// Open the stream at `path` for record reading
    pub fn open(ole: &mut OleFile, path: &[&str]) -> XlsResult<Self> {
        Ok(Self::new(ole.open_stream_path(path, StreamMode::Read)?))
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// True when the payload was assembled from continuation records
    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// Payload of the current record
    pub fn data<'a>(&'a self, ole: &'a OleFile) -> XlsResult<&'a [u8]> {
        self.data.bytes(ole)
    }

    /// Give the underlying stream back
    pub fn into_stream(self) -> Stream {
        self.stream
    }

    fn remaining(&self) -> u64 {
        self.stream.len() - self.stream.position()
    }

    /// Read a header if a whole one is left; otherwise leave the cursor alone
    fn read_header(&mut self, ole: &OleFile) -> XlsResult<Option<RecordHeader>> {
        if self.remaining() < RECORD_HEADER_LEN as u64 {
            return Ok(None);
        }
        let mut bytes = [0u8; RECORD_HEADER_LEN];
        self.stream.read_copy(ole, &mut bytes)?;
        Ok(Some(RecordHeader::parse(&bytes)?))
    }

    fn check_payload(&self, header: RecordHeader, offset: u64) -> XlsResult<()> {
        let available = self.remaining();
        if header.length as u64 > available {
            return Err(XlsError::TruncatedRecord {
                opcode: header.opcode,
                offset,
                declared: header.length,
                available,
            });
        }
        Ok(())
    }

    /// Opcode of the next record, without consuming it
    pub fn peek_opcode(&mut self, ole: &OleFile) -> XlsResult<Option<u16>> {
        let pos = self.stream.position();
        let header = self.read_header(ole)?;
        if header.is_some() {
            self.stream.seek(ole, SeekFrom::Start(pos))?;
        }
        Ok(header.map(|h| h.opcode))
    }

    /// Advance to the next record.
    ///
    /// Returns `Ok(false)` at the end of the stream. Continuation records
    /// directly following the record are folded into its payload.
    pub fn next(&mut self, ole: &OleFile) -> XlsResult<bool> {
        self.opcode = 0;
        self.length = 0;
        self.data = RecordData::Empty;
        self.merged = false;

        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(false);
        }
        self.stream_pos = self.stream.position();
        let Some(header) = self.read_header(ole)? else {
            tolerate(
                ole.options().lenient,
                format!(
                    "{} trailing bytes after the last record at offset {}",
                    remaining, self.stream_pos
                ),
            )?;
            self.stream.seek(ole, SeekFrom::End(0))?;
            return Ok(false);
        };
        self.check_payload(header, self.stream_pos)?;

        let first = self.fetch(ole, header.length as usize)?;
        let mut merged: Option<Vec<u8>> = None;
        loop {
            let pos = self.stream.position();
            match self.read_header(ole)? {
                Some(next) if next.opcode == CONTINUE => {
                    self.check_payload(next, pos)?;
                    if merged.is_none() {
                        merged = Some(first.bytes(ole)?.to_vec());
                    }
                    if let Some(buf) = merged.as_mut() {
                        let start = buf.len();
                        buf.resize(start + next.length as usize, 0);
                        self.stream.read_copy(ole, &mut buf[start..])?;
                    }
                },
                Some(_) => {
                    self.stream.seek(ole, SeekFrom::Start(pos))?;
                    break;
                },
                None => break,
            }
        }

        self.opcode = header.opcode;
        self.merged = merged.is_some();
        self.data = match merged {
            Some(buf) => {
                self.length = buf.len() as u32;
                RecordData::Owned(buf)
            },
            None => {
                self.length = header.length as u32;
                first
            },
        };
        trace!(
            opcode = format_args!("{:#06x}", self.opcode),
            length = self.length,
            offset = self.stream_pos,
            merged = self.is_merged(),
            "record"
        );
        Ok(true)
    }

    /// Payload of `len` bytes: a view when contiguous, a copy otherwise
    fn fetch(&mut self, ole: &OleFile, len: usize) -> XlsResult<RecordData> {
        if len == 0 {
            return Ok(RecordData::Empty);
        }
        if let Some(view) = self.stream.read_view(ole, len)? {
            return Ok(RecordData::View(view));
        }
        let mut data = vec![0u8; len];
        self.stream.read_copy(ole, &mut data)?;
        Ok(RecordData::Owned(data))
    }
}
