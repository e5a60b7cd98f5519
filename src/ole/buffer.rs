//! Backing byte image of an open container
//!
//! The whole file lives in one buffer addressed by sector index. Sector `n`
//! occupies `[(n + 1) * 512, (n + 2) * 512)`; the header is sector -1.
//!
//! Growing the buffer may relocate it, so every growth bumps a generation
//! counter. Zero-copy reads hand out [`BufferView`]s tagged with the generation
//! they were taken at; resolving a view from an older generation is an error
//! instead of a dangling read.

use super::consts::SECTOR_SIZE;
use super::error::{OleError, OleResult};

/// Generation-tagged window into the container buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    generation: u64,
    offset: usize,
    len: usize,
}

impl BufferView {
    /// Generation the view was issued at
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Absolute byte offset inside the container
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the window in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length window
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
pub(crate) struct ContainerBuffer {
    data: Vec<u8>,
    generation: u64,
}

impl ContainerBuffer {
    /// Wrap a byte image whose length is already a multiple of the sector size
    pub fn new(data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len() % SECTOR_SIZE, 0);
        Self {
            data,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of addressable big sectors (header excluded)
    pub fn sector_count(&self) -> usize {
        (self.data.len() / SECTOR_SIZE).saturating_sub(1)
    }

    #[inline]
    pub fn sector_offset(sector: u32) -> usize {
        (sector as usize + 1) * SECTOR_SIZE
    }

    pub fn header(&self) -> &[u8] {
        &self.data[..SECTOR_SIZE]
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.data[..SECTOR_SIZE]
    }

    pub fn sector(&self, sector: u32) -> OleResult<&[u8]> {
        let start = self.checked_sector(sector)?;
        Ok(&self.data[start..start + SECTOR_SIZE])
    }

    pub fn sector_mut(&mut self, sector: u32) -> OleResult<&mut [u8]> {
        let start = self.checked_sector(sector)?;
        Ok(&mut self.data[start..start + SECTOR_SIZE])
    }

    fn checked_sector(&self, sector: u32) -> OleResult<usize> {
        if (sector as usize) >= self.sector_count() {
            return Err(OleError::CorruptedFile(format!(
                "sector {} outside file of {} sectors",
                sector,
                self.sector_count()
            )));
        }
        Ok(Self::sector_offset(sector))
    }

    /// Bytes at an absolute offset, bound-checked
    pub fn bytes(&self, offset: usize, len: usize) -> OleResult<&[u8]> {
        self.data
            .get(offset..offset + len)
            .ok_or_else(|| OleError::CorruptedFile(format!("range {}+{} outside file", offset, len)))
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> OleResult<&mut [u8]> {
        let total = self.data.len();
        self.data.get_mut(offset..offset + len).ok_or_else(|| {
            OleError::CorruptedFile(format!("range {}+{} outside file of {} bytes", offset, len, total))
        })
    }

    /// Append zeroed sectors, invalidating every outstanding view
    pub fn grow(&mut self, sectors: u32) -> OleResult<()> {
        let extra = (sectors as usize)
            .checked_mul(SECTOR_SIZE)
            .ok_or_else(|| OleError::CapacityExhausted("file growth overflow".to_string()))?;
        self.data
            .try_reserve(extra)
            .map_err(|e| OleError::CapacityExhausted(format!("file growth failed: {}", e)))?;
        self.data.resize(self.data.len() + extra, 0);
        self.generation += 1;
        Ok(())
    }

    /// Drop trailing sectors so that exactly `sectors` remain
    pub fn truncate_sectors(&mut self, sectors: usize) {
        self.data.truncate((sectors + 1) * SECTOR_SIZE);
        self.generation += 1;
    }

    pub fn view(&self, offset: usize, len: usize) -> OleResult<BufferView> {
        self.bytes(offset, len)?;
        Ok(BufferView {
            generation: self.generation,
            offset,
            len,
        })
    }

    pub fn resolve(&self, view: &BufferView) -> OleResult<&[u8]> {
        if view.generation != self.generation {
            return Err(OleError::StaleHandle {
                issued: view.generation,
                current: self.generation,
            });
        }
        self.bytes(view.offset, view.len)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
