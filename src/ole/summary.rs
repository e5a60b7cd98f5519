//! Summary information property sets
//!
//! The `\u{5}SummaryInformation` and `\u{5}DocumentSummaryInformation`
//! streams carry document metadata as a property set: a 28-byte header, a
//! list of (format id, offset) section descriptors, and per section a table
//! of (property id, offset) pairs pointing at typed values. Only the section
//! whose format id matches the set is read. The user-defined section of a
//! document summary is skipped and not written back.

use encoding_rs::Encoding;
use tracing::{debug, warn};

use super::consts::*;
use super::error::{OleError, OleResult, tolerate};
use super::file::OleFile;
use super::stream::StreamMode;
use crate::common::binary::{read_u16_le, read_u32_le};

const HEADER_LEN: usize = 28;
const SECTION_DESC_LEN: usize = 20;
/// Offset of the single section this writer emits
const SECTION_OFFSET: usize = HEADER_LEN + SECTION_DESC_LEN;
const OS_VERSION: u32 = 0x0002_0005;
const MAX_PROPERTIES: usize = 1000;

const SUMMARY_FMTID: [u8; 16] = [
    0xE0, 0x85, 0x9F, 0xF2, 0xF9, 0x4F, 0x68, 0x10, 0xAB, 0x91, 0x08, 0x00, 0x2B, 0x27, 0xB3, 0xD9,
];
const DOCUMENT_FMTID: [u8; 16] = [
    0x02, 0xD5, 0xCD, 0xD5, 0x9C, 0x2E, 0x1B, 0x10, 0x93, 0x97, 0x08, 0x00, 0x2B, 0x2C, 0xF9, 0xAE,
];

/// Well-known property identifiers
pub mod pid {
    /// Codepage of the string properties (short)
    pub const CODEPAGE: u32 = 1;

    // SummaryInformation
    pub const TITLE: u32 = 2;
    pub const SUBJECT: u32 = 3;
    pub const AUTHOR: u32 = 4;
    pub const KEYWORDS: u32 = 5;
    pub const COMMENTS: u32 = 6;
    pub const TEMPLATE: u32 = 7;
    pub const LAST_AUTHOR: u32 = 8;
    pub const REVISION: u32 = 9;
    pub const EDIT_TIME: u32 = 10;
    pub const LAST_PRINTED: u32 = 11;
    pub const CREATED: u32 = 12;
    pub const LAST_SAVED: u32 = 13;
    pub const PAGE_COUNT: u32 = 14;
    pub const WORD_COUNT: u32 = 15;
    pub const CHAR_COUNT: u32 = 16;
    pub const THUMBNAIL: u32 = 17;
    pub const APP_NAME: u32 = 18;
    pub const SECURITY: u32 = 19;

    // DocumentSummaryInformation
    pub const CATEGORY: u32 = 2;
    pub const PRESENTATION_FORMAT: u32 = 3;
    pub const BYTE_COUNT: u32 = 4;
    pub const LINE_COUNT: u32 = 5;
    pub const PARAGRAPH_COUNT: u32 = 6;
    pub const SLIDE_COUNT: u32 = 7;
    pub const NOTE_COUNT: u32 = 8;
    pub const HIDDEN_COUNT: u32 = 9;
    pub const MM_CLIP_COUNT: u32 = 10;
    pub const SCALE: u32 = 11;
    pub const MANAGER: u32 = 14;
    pub const COMPANY: u32 = 15;
    pub const LINKS_DIRTY: u32 = 16;
}

/// Which of the two standard property set streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySetKind {
    Summary,
    DocumentSummary,
}

impl PropertySetKind {
    /// Stream name in the root storage
    pub fn stream_name(self) -> &'static str {
        match self {
            PropertySetKind::Summary => "\u{0005}SummaryInformation",
            PropertySetKind::DocumentSummary => "\u{0005}DocumentSummaryInformation",
        }
    }

    fn fmtid(self) -> &'static [u8; 16] {
        match self {
            PropertySetKind::Summary => &SUMMARY_FMTID,
            PropertySetKind::DocumentSummary => &DOCUMENT_FMTID,
        }
    }
}

/// Typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Short(i16),
    Long(i32),
    Bool(bool),
    /// Codepage string, decoded
    String(String),
    /// FILETIME: 100 ns intervals since 1601-01-01 UTC
    Time(u64),
    /// Clipboard data, such as the thumbnail
    Preview(Vec<u8>),
}

impl PropertyValue {
    /// Variant type code stored ahead of the value
    pub fn type_code(&self) -> u16 {
        match self {
            PropertyValue::Short(_) => VT_I2,
            PropertyValue::Long(_) => VT_I4,
            PropertyValue::Bool(_) => VT_BOOL,
            PropertyValue::String(_) => VT_LPSTR,
            PropertyValue::Time(_) => VT_FILETIME,
            PropertyValue::Preview(_) => VT_CF,
        }
    }
}

/// Value as read, strings still in their codepage
enum RawValue<'a> {
    Ready(PropertyValue),
    Text(&'a [u8]),
}

/// One property set section, properties kept in stream order
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySet {
    kind: PropertySetKind,
    properties: Vec<(u32, PropertyValue)>,
}

impl PropertySet {
    /// Empty set
    pub fn new(kind: PropertySetKind) -> Self {
        Self {
            kind,
            properties: Vec::new(),
        }
    }

    /// Read the set's stream from the root storage of `ole`
    pub fn open(ole: &mut OleFile, kind: PropertySetKind) -> OleResult<Self> {
        let data = ole.read_stream(&[kind.stream_name()])?;
        Self::parse(&data, kind, ole.options().lenient)
    }

    /// Decode a property set stream.
    ///
    /// Unreadable values are skipped with a warning when `lenient`, and fail
    /// with [`OleError::CorruptedFile`] otherwise. Values of unsupported
    /// types are always skipped.
    pub fn parse(data: &[u8], kind: PropertySetKind, lenient: bool) -> OleResult<Self> {
        if data.len() < SECTION_OFFSET {
            return Err(OleError::InvalidData(format!(
                "property set stream is {} bytes, shorter than its header",
                data.len()
            )));
        }
        let order = read_u16_le(data, 0)?;
        if order != PROPERTY_SET_BYTE_ORDER {
            tolerate(lenient, format!("property set byte order is {:#06x}", order))?;
        }

        let sections = read_u32_le(data, 24)? as usize;
        let mut base = None;
        for i in 0..sections {
            let desc = HEADER_LEN + i * SECTION_DESC_LEN;
            let Some(fmtid) = data.get(desc..desc + 16) else {
                tolerate(
                    lenient,
                    format!("section list truncated after {} of {} entries", i, sections),
                )?;
                break;
            };
            if fmtid == kind.fmtid() {
                base = Some(read_u32_le(data, desc + 16)? as usize);
                break;
            }
            debug!(section = i, "skipping property section with another format id");
        }
        let Some(base) = base else {
            return Err(OleError::InvalidData(format!(
                "{} has no section with its format id",
                kind.stream_name().trim_start_matches('\u{5}')
            )));
        };

        let mut count = read_u32_le(data, base + 4)? as usize;
        if count > MAX_PROPERTIES {
            tolerate(
                lenient,
                format!("section claims {} properties, reading {}", count, MAX_PROPERTIES),
            )?;
            count = MAX_PROPERTIES;
        }

        let mut raw = Vec::with_capacity(count);
        for i in 0..count {
            let desc = base + 8 + i * 8;
            let (id, offset) = match (read_u32_le(data, desc), read_u32_le(data, desc + 4)) {
                (Ok(id), Ok(offset)) => (id, offset as usize),
                _ => {
                    tolerate(
                        lenient,
                        format!("property table truncated after {} of {} entries", i, count),
                    )?;
                    break;
                },
            };
            match read_value(data, base + offset) {
                Ok(Some(value)) => raw.push((id, value)),
                Ok(None) => {},
                Err(err) => tolerate(lenient, format!("property {} unreadable: {}", id, err))?,
            }
        }

        let codepage = raw.iter().find_map(|(id, value)| match value {
            RawValue::Ready(PropertyValue::Short(cp)) if *id == pid::CODEPAGE => Some(*cp as u16),
            _ => None,
        });
        let encoding = codepage_encoding(codepage);

        let mut set = Self::new(kind);
        for (id, value) in raw {
            let value = match value {
                RawValue::Ready(value) => value,
                RawValue::Text(bytes) => {
                    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[..end]);
                    if had_errors {
                        warn!(property = id, encoding = encoding.name(), "undecodable bytes in string property");
                    }
                    PropertyValue::String(text.into_owned())
                },
            };
            set.set(id, value);
        }
        Ok(set)
    }

    pub fn kind(&self) -> PropertySetKind {
        self.kind
    }

    /// Property identifiers in stream order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.properties.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, value)| value)
    }

    /// Value of `id` if it has type `vt`; a mismatch is logged
    fn typed(&self, id: u32, vt: u16) -> Option<&PropertyValue> {
        let value = self.get(id)?;
        if value.type_code() != vt {
            warn!(
                property = id,
                expected = vt,
                found = value.type_code(),
                "property has another type"
            );
            return None;
        }
        Some(value)
    }

    pub fn get_string(&self, id: u32) -> Option<&str> {
        match self.typed(id, VT_LPSTR)? {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_short(&self, id: u32) -> Option<i16> {
        match self.typed(id, VT_I2)? {
            PropertyValue::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_long(&self, id: u32) -> Option<i32> {
        match self.typed(id, VT_I4)? {
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, id: u32) -> Option<bool> {
        match self.typed(id, VT_BOOL)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Raw FILETIME of a time property
    pub fn get_time(&self, id: u32) -> Option<u64> {
        match self.typed(id, VT_FILETIME)? {
            PropertyValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_preview(&self, id: u32) -> Option<&[u8]> {
        match self.typed(id, VT_CF)? {
            PropertyValue::Preview(v) => Some(v),
            _ => None,
        }
    }

    /// Insert or replace a property. A replaced property keeps its place.
    pub fn set(&mut self, id: u32, value: PropertyValue) {
        match self.properties.iter_mut().find(|(key, _)| *key == id) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((id, value)),
        }
    }

    pub fn set_string(&mut self, id: u32, value: impl Into<String>) {
        self.set(id, PropertyValue::String(value.into()));
    }

    pub fn set_short(&mut self, id: u32, value: i16) {
        self.set(id, PropertyValue::Short(value));
    }

    pub fn set_long(&mut self, id: u32, value: i32) {
        self.set(id, PropertyValue::Long(value));
    }

    pub fn set_bool(&mut self, id: u32, value: bool) {
        self.set(id, PropertyValue::Bool(value));
    }

    pub fn set_time(&mut self, id: u32, filetime: u64) {
        self.set(id, PropertyValue::Time(filetime));
    }

    pub fn set_preview(&mut self, id: u32, data: Vec<u8>) {
        self.set(id, PropertyValue::Preview(data));
    }

    pub fn remove(&mut self, id: u32) -> Option<PropertyValue> {
        let index = self.properties.iter().position(|(key, _)| *key == id)?;
        Some(self.properties.remove(index).1)
    }

    /// Codepage property, read without type warnings
    fn codepage(&self) -> Option<u16> {
        match self.get(pid::CODEPAGE) {
            Some(PropertyValue::Short(cp)) => Some(*cp as u16),
            _ => None,
        }
    }

    /// Serialize as a one-section property set stream
    pub fn to_bytes(&self) -> Vec<u8> {
        let encoding = codepage_encoding(self.codepage());

        let mut out = Vec::with_capacity(MINI_STREAM_CUTOFF as usize);
        out.extend_from_slice(&PROPERTY_SET_BYTE_ORDER.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // format
        out.extend_from_slice(&OS_VERSION.to_le_bytes());
        out.extend_from_slice(&[0u8; 16]); // clsid
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(self.kind.fmtid());
        out.extend_from_slice(&(SECTION_OFFSET as u32).to_le_bytes());

        // Value offsets are relative to the section start
        let table_len = 8 + self.properties.len() * 8;
        let mut table = Vec::with_capacity(table_len - 8);
        let mut values = Vec::new();
        for (id, value) in &self.properties {
            table.extend_from_slice(&id.to_le_bytes());
            table.extend_from_slice(&((table_len + values.len()) as u32).to_le_bytes());
            encode_value(&mut values, *id, value, encoding);
        }

        out.extend_from_slice(&((table_len + values.len()) as u32).to_le_bytes());
        out.extend_from_slice(&(self.properties.len() as u32).to_le_bytes());
        out.extend_from_slice(&table);
        out.extend_from_slice(&values);
        out
    }

    /// Write the set to its stream in the root storage.
    ///
    /// The stream is zero-padded to at least the mini-stream cutoff and never
    /// shrinks, so stale bytes of a longer earlier set are cleared.
    pub fn save(&self, ole: &mut OleFile) -> OleResult<()> {
        let mut data = self.to_bytes();
        let mut stream = ole.open_stream_path(&[self.kind.stream_name()], StreamMode::Write)?;
        let padded = (MINI_STREAM_CUTOFF as u64).max(stream.len()) as usize;
        if data.len() < padded {
            data.resize(padded, 0);
        }
        stream.write(ole, &data)?;
        stream.close(ole)?;
        debug!(
            set = ?self.kind,
            properties = self.properties.len(),
            bytes = data.len(),
            "saved property set"
        );
        Ok(())
    }
}

fn read_value(data: &[u8], at: usize) -> OleResult<Option<RawValue<'_>>> {
    let vt = read_u16_le(data, at)?;
    let body = at + 4;
    let value = match vt {
        VT_I2 => PropertyValue::Short(read_u16_le(data, body)? as i16),
        VT_I4 => PropertyValue::Long(read_u32_le(data, body)? as i32),
        VT_BOOL => PropertyValue::Bool(read_u16_le(data, body)? != 0),
        VT_FILETIME => {
            let low = read_u32_le(data, body)? as u64;
            let high = read_u32_le(data, body + 4)? as u64;
            PropertyValue::Time((high << 32) | low)
        },
        VT_LPSTR => return Ok(Some(RawValue::Text(counted(data, body)?))),
        VT_CF => PropertyValue::Preview(counted(data, body)?.to_vec()),
        other => {
            warn!(vt = other, offset = at, "skipping property of unsupported type");
            return Ok(None);
        },
    };
    Ok(Some(RawValue::Ready(value)))
}

/// Length-prefixed byte run
fn counted(data: &[u8], at: usize) -> OleResult<&[u8]> {
    let len = read_u32_le(data, at)? as usize;
    data.get(at + 4..at + 4 + len).ok_or_else(|| {
        OleError::InvalidData(format!(
            "{} byte value at {} runs past the end of the stream",
            len, at
        ))
    })
}

fn encode_value(out: &mut Vec<u8>, id: u32, value: &PropertyValue, encoding: &'static Encoding) {
    out.extend_from_slice(&(value.type_code() as u32).to_le_bytes());
    match value {
        PropertyValue::Short(v) => {
            out.extend_from_slice(&v.to_le_bytes());
        },
        PropertyValue::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::Bool(v) => {
            let raw: u16 = if *v { 0xFFFF } else { 0 };
            out.extend_from_slice(&raw.to_le_bytes());
        },
        PropertyValue::Time(v) => out.extend_from_slice(&v.to_le_bytes()),
        PropertyValue::String(s) => {
            let (bytes, _, unmappable) = encoding.encode(s);
            if unmappable {
                warn!(property = id, encoding = encoding.name(), "string property not representable");
            }
            // Length counts the terminator
            out.extend_from_slice(&(bytes.len() as u32 + 1).to_le_bytes());
            out.extend_from_slice(&bytes);
            out.push(0);
        },
        PropertyValue::Preview(data) => {
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        },
    }
    out.resize(out.len().next_multiple_of(4), 0);
}

/// Encoding of a codepage property; windows-1252 when absent or unknown
fn codepage_encoding(codepage: Option<u16>) -> &'static Encoding {
    match codepage {
        Some(866) => encoding_rs::IBM866,
        Some(874) => encoding_rs::WINDOWS_874,
        Some(932) => encoding_rs::SHIFT_JIS,
        Some(936) => encoding_rs::GBK,
        Some(949) => encoding_rs::EUC_KR,
        Some(950) => encoding_rs::BIG5,
        Some(1250) => encoding_rs::WINDOWS_1250,
        Some(1251) => encoding_rs::WINDOWS_1251,
        Some(1253) => encoding_rs::WINDOWS_1253,
        Some(1254) => encoding_rs::WINDOWS_1254,
        Some(1255) => encoding_rs::WINDOWS_1255,
        Some(1256) => encoding_rs::WINDOWS_1256,
        Some(1257) => encoding_rs::WINDOWS_1257,
        Some(1258) => encoding_rs::WINDOWS_1258,
        Some(65001) => encoding_rs::UTF_8,
        Some(1252) | None => encoding_rs::WINDOWS_1252,
        Some(other) => {
            debug!(codepage = other, "unmapped codepage, decoding as windows-1252");
            encoding_rs::WINDOWS_1252
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::{ErrorKind, OleOptions};

    fn sample() -> PropertySet {
        let mut set = PropertySet::new(PropertySetKind::Summary);
        set.set_short(pid::CODEPAGE, 1252);
        set.set_string(pid::TITLE, "Quarterly report");
        set.set_string(pid::AUTHOR, "Renée");
        set.set_long(pid::PAGE_COUNT, 12);
        set.set_time(pid::CREATED, 0x01D9_2B3C_4D5E_6F70);
        set.set_preview(pid::THUMBNAIL, vec![1, 2, 3, 4, 5]);
        set
    }

    #[test]
    fn test_saved_set_reads_back_after_reopen() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        sample().save(&mut ole).unwrap();
        let bytes = ole.into_bytes().unwrap();

        let mut ole = OleFile::from_bytes(bytes, OleOptions::default()).unwrap();
        let stream_len = ole.stat(&["\u{5}SummaryInformation"]).unwrap().size;
        assert_eq!(stream_len, MINI_STREAM_CUTOFF as u64);

        let set = PropertySet::open(&mut ole, PropertySetKind::Summary).unwrap();
        assert_eq!(set, sample());
        assert_eq!(set.get_string(pid::AUTHOR), Some("Renée"));
        assert_eq!(set.get_long(pid::PAGE_COUNT), Some(12));
        assert_eq!(set.get_time(pid::CREATED), Some(0x01D9_2B3C_4D5E_6F70));
        assert_eq!(set.get_preview(pid::THUMBNAIL), Some(&[1u8, 2, 3, 4, 5][..]));
        assert_eq!(
            set.ids().collect::<Vec<_>>(),
            vec![pid::CODEPAGE, pid::TITLE, pid::AUTHOR, pid::PAGE_COUNT, pid::CREATED, pid::THUMBNAIL]
        );
    }

    #[test]
    fn test_layout_of_one_section() {
        let mut set = PropertySet::new(PropertySetKind::Summary);
        set.set_short(pid::CODEPAGE, 1252);
        set.set_string(pid::TITLE, "é");
        let bytes = set.to_bytes();

        assert_eq!(read_u16_le(&bytes, 0).unwrap(), PROPERTY_SET_BYTE_ORDER);
        assert_eq!(read_u32_le(&bytes, 24).unwrap(), 1);
        assert_eq!(&bytes[28..44], &SUMMARY_FMTID);
        assert_eq!(read_u32_le(&bytes, 44).unwrap(), 48);

        // Section: size, count, two (id, offset) pairs, then 8 + 12 value bytes
        assert_eq!(read_u32_le(&bytes, 48).unwrap(), 24 + 8 + 12);
        assert_eq!(read_u32_le(&bytes, 52).unwrap(), 2);
        assert_eq!(read_u32_le(&bytes, 60).unwrap(), 24);
        assert_eq!(read_u32_le(&bytes, 68).unwrap(), 32);
        let title = 48 + 32;
        assert_eq!(read_u32_le(&bytes, title).unwrap(), VT_LPSTR as u32);
        assert_eq!(read_u32_le(&bytes, title + 4).unwrap(), 2);
        assert_eq!(&bytes[title + 8..title + 10], &[0xE9, 0x00]);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn test_codepage_drives_string_decoding() {
        let mut set = PropertySet::new(PropertySetKind::Summary);
        set.set_string(pid::TITLE, "Отчёт");
        set.set_short(pid::CODEPAGE, 1251);
        let bytes = set.to_bytes();
        // Windows-1251 is one byte per letter
        assert!(bytes.windows(5).any(|w| w == [0xCE, 0xF2, 0xF7, 0xB8, 0xF2]));

        let parsed = PropertySet::parse(&bytes, PropertySetKind::Summary, true).unwrap();
        assert_eq!(parsed.get_string(pid::TITLE), Some("Отчёт"));
    }

    #[test]
    fn test_utf8_codepage_round_trip() {
        let mut set = PropertySet::new(PropertySetKind::DocumentSummary);
        set.set_short(pid::CODEPAGE, 65001u16 as i16);
        set.set_string(pid::COMPANY, "株式会社");
        set.set_bool(pid::SCALE, false);
        set.set_bool(pid::LINKS_DIRTY, true);
        let parsed =
            PropertySet::parse(&set.to_bytes(), PropertySetKind::DocumentSummary, false).unwrap();
        assert_eq!(parsed.get_string(pid::COMPANY), Some("株式会社"));
        assert_eq!(parsed.get_bool(pid::SCALE), Some(false));
        assert_eq!(parsed.get_bool(pid::LINKS_DIRTY), Some(true));
    }

    #[test]
    fn test_type_mismatch_is_not_available() {
        let set = sample();
        assert_eq!(set.get_long(pid::TITLE), None);
        assert_eq!(set.get_string(pid::PAGE_COUNT), None);
        assert_eq!(set.get_string(pid::SUBJECT), None);
        assert!(set.get(pid::TITLE).is_some());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut set = sample();
        set.set_string(pid::TITLE, "Annual report");
        assert_eq!(set.ids().nth(1), Some(pid::TITLE));
        assert_eq!(set.get_string(pid::TITLE), Some("Annual report"));
        assert_eq!(set.remove(pid::THUMBNAIL), Some(PropertyValue::Preview(vec![1, 2, 3, 4, 5])));
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_wrong_format_id_is_rejected() {
        let bytes = sample().to_bytes();
        let err = PropertySet::parse(&bytes, PropertySetKind::DocumentSummary, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(PropertySet::parse(&bytes[..40], PropertySetKind::Summary, true).is_err());
    }

    #[test]
    fn test_user_defined_section_is_skipped() {
        let mut set = PropertySet::new(PropertySetKind::DocumentSummary);
        set.set_string(pid::MANAGER, "Ada");
        let single = set.to_bytes();
        let section = &single[SECTION_OFFSET..];

        // User-defined section first (empty), then the document section
        let mut user_fmtid = DOCUMENT_FMTID;
        user_fmtid[0] = 0x05;
        let first = HEADER_LEN + 2 * SECTION_DESC_LEN;
        let mut bytes = single[..24].to_vec();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&user_fmtid);
        bytes.extend_from_slice(&(first as u32).to_le_bytes());
        bytes.extend_from_slice(&DOCUMENT_FMTID);
        bytes.extend_from_slice(&(first as u32 + 8).to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(section);

        let parsed = PropertySet::parse(&bytes, PropertySetKind::DocumentSummary, false).unwrap();
        assert_eq!(parsed, set);
    }

    #[test]
    fn test_value_past_end_lenient_and_strict() {
        let mut set = PropertySet::new(PropertySetKind::Summary);
        set.set_string(pid::TITLE, "t");
        set.set_long(pid::PAGE_COUNT, 3);
        let mut bytes = set.to_bytes();
        // Point the title's offset past the end of the stream
        bytes[SECTION_OFFSET + 12..SECTION_OFFSET + 16].copy_from_slice(&0xFFFFu32.to_le_bytes());

        let parsed = PropertySet::parse(&bytes, PropertySetKind::Summary, true).unwrap();
        assert_eq!(parsed.get(pid::TITLE), None);
        assert_eq!(parsed.get_long(pid::PAGE_COUNT), Some(3));

        let err = PropertySet::parse(&bytes, PropertySetKind::Summary, false).unwrap_err();
        assert!(matches!(err, OleError::CorruptedFile(_)));
    }

    #[test]
    fn test_save_over_longer_stream_clears_tail() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let name = PropertySetKind::Summary.stream_name();
        let mut stream = ole.open_stream_path(&[name], StreamMode::Write).unwrap();
        stream.write(&mut ole, &[0xAA; 6000]).unwrap();
        stream.close(&mut ole).unwrap();

        sample().save(&mut ole).unwrap();
        let data = ole.read_stream(&[name]).unwrap();
        assert_eq!(data.len(), 6000);
        assert!(data[4096..].iter().all(|&b| b == 0));
        let set = PropertySet::open(&mut ole, PropertySetKind::Summary).unwrap();
        assert_eq!(set, sample());
    }

    #[test]
    fn test_open_missing_stream() {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let err = PropertySet::open(&mut ole, PropertySetKind::Summary).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
