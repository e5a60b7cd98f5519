//! OLE2 header validation and generation
//!
//! Only the fixed fields live here. The table-sector list, mini-FAT location
//! and directory start are written by the components that own them.

use tracing::warn;

use super::consts::*;
use super::error::{OleError, OleResult, tolerate};
use crate::common::binary::{read_u16_le, read_u32_le, write_u16_le, write_u32_le};

/// Check the fixed header fields of an existing container.
///
/// Only 512-byte sectors with 64-byte mini sectors are supported.
pub(crate) fn validate(header: &[u8], lenient: bool) -> OleResult<()> {
    if header.len() < SECTOR_SIZE || &header[0..8] != MAGIC {
        return Err(OleError::NotOleFile);
    }

    let byte_order = read_u16_le(header, HDR_BYTE_ORDER)?;
    if byte_order != 0xFFFE {
        return Err(OleError::CorruptedFile(format!(
            "unsupported byte order {:#06x}",
            byte_order
        )));
    }

    let sector_shift = read_u16_le(header, HDR_SECTOR_SHIFT)?;
    if sector_shift != 9 {
        return Err(OleError::CorruptedFile(format!(
            "unsupported sector size 2^{}",
            sector_shift
        )));
    }

    let mini_shift = read_u16_le(header, HDR_MINI_SECTOR_SHIFT)?;
    if mini_shift != 6 {
        return Err(OleError::CorruptedFile(format!(
            "unsupported mini sector size 2^{}",
            mini_shift
        )));
    }

    let cutoff = read_u32_le(header, HDR_MINI_CUTOFF)?;
    if cutoff != MINI_STREAM_CUTOFF {
        tolerate(
            lenient,
            format!(
                "mini stream cutoff is {}, using {} instead",
                cutoff, MINI_STREAM_CUTOFF
            ),
        )?;
    }

    let version = read_u16_le(header, HDR_DLL_VERSION)?;
    if version != 3 {
        warn!(version, "unexpected major version for 512-byte sectors");
    }
    Ok(())
}

/// First directory sector recorded in the header
pub(crate) fn directory_start(header: &[u8]) -> OleResult<u32> {
    Ok(read_u32_le(header, HDR_DIR_START)?)
}

pub(crate) fn set_directory_start(header: &mut [u8], sector: u32) -> OleResult<()> {
    Ok(write_u32_le(header, HDR_DIR_START, sector)?)
}

/// Fill in the fixed fields of a brand-new header.
///
/// Table and chain locations start out empty.
pub(crate) fn initialize(header: &mut [u8]) -> OleResult<()> {
    header.fill(0);
    header[0..8].copy_from_slice(MAGIC);
    // CLSID stays zero
    write_u16_le(header, HDR_MINOR_VERSION, 0x003E)?;
    write_u16_le(header, HDR_DLL_VERSION, 3)?;
    write_u16_le(header, HDR_BYTE_ORDER, 0xFFFE)?;
    write_u16_le(header, HDR_SECTOR_SHIFT, 9)?;
    write_u16_le(header, HDR_MINI_SECTOR_SHIFT, 6)?;
    write_u32_le(header, HDR_MINI_CUTOFF, MINI_STREAM_CUTOFF)?;
    write_u32_le(header, HDR_DIR_START, ENDOFCHAIN)?;
    write_u32_le(header, HDR_MINIFAT_START, ENDOFCHAIN)?;
    write_u32_le(header, HDR_DIFAT_START, ENDOFCHAIN)?;
    for slot in 0..MAX_HEADER_FAT_SECTORS {
        write_u32_le(header, HDR_FAT_LIST + slot * 4, FREESECT)?;
    }
    Ok(())
}
