//! Binary data helpers shared by the container and record layers.
//!
//! Fixed-offset little-endian reads and writes over byte slices, plus the
//! UTF-16LE name codec used by directory entries.

use zerocopy::{FromBytes, LE, U16, U32};

/// Binary parsing error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Insufficient data: expected {expected}, got {available}")]
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use msole::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    if offset + 2 > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: offset + 2,
            available: data.len(),
        });
    }
    U16::<LE>::read_from_bytes(&data[offset..offset + 2])
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read a little-endian u32 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use msole::common::binary::read_u32_le;
/// let data = [0x78, 0x56, 0x34, 0x12];
/// assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
/// ```
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    if offset + 4 > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: offset + 4,
            available: data.len(),
        });
    }
    U32::<LE>::read_from_bytes(&data[offset..offset + 4])
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Write a little-endian u16 into a byte slice at the given offset.
#[inline]
pub fn write_u16_le(data: &mut [u8], offset: usize, value: u16) -> BinaryResult<()> {
    if offset + 2 > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: offset + 2,
            available: data.len(),
        });
    }
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Write a little-endian u32 into a byte slice at the given offset.
#[inline]
pub fn write_u32_le(data: &mut [u8], offset: usize, value: u32) -> BinaryResult<()> {
    if offset + 4 > data.len() {
        return Err(BinaryError::InsufficientData {
            expected: offset + 4,
            available: data.len(),
        });
    }
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Parse a UTF-16LE string, stopping at the first NUL code unit.
///
/// Unpaired surrogates are replaced rather than rejected.
///
/// # Examples
///
/// ```
/// use msole::common::binary::parse_utf16le_string;
/// let data = vec![0x48, 0x00, 0x65, 0x00, 0x6C, 0x00, 0x6C, 0x00, 0x6F, 0x00, 0x00, 0x00];
/// assert_eq!(parse_utf16le_string(&data), "Hello");
/// ```
pub fn parse_utf16le_string(data: &[u8]) -> String {
    let mut end = data.len() & !1;
    if let Some(nul) = data[..end].chunks_exact(2).position(|unit| unit[0] == 0 && unit[1] == 0) {
        end = nul * 2;
    }
    let (text, _) = encoding_rs::UTF_16LE.decode_without_bom_handling(&data[..end]);
    text.into_owned()
}

/// Encode a string as UTF-16LE code units, without terminator.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
