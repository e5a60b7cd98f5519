//! Byte-level access to one stream entry
//!
//! A [`Stream`] materializes its sector list once, at open time, and then
//! reads and writes straight against the container buffer. Handles do not
//! borrow the container; every operation takes it as an argument and checks
//! that the file has not grown since the handle last touched it.

use std::io::SeekFrom;

use tracing::{debug, warn};

use super::buffer::{BufferView, ContainerBuffer};
use super::consts::*;
use super::directory::EntryType;
use super::error::{OleError, OleResult, tolerate};
use super::file::OleFile;
use super::sector::ChainLink;

/// Access mode of a stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Read,
    Write,
}

/// Which allocator holds a stream's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// 512-byte sectors
    Big,
    /// 64-byte sectors inside the mini stream
    Mini,
}

impl StorageKind {
    fn for_size(size: u64) -> Self {
        if size < MINI_STREAM_CUTOFF as u64 {
            StorageKind::Mini
        } else {
            StorageKind::Big
        }
    }

    /// Allocation unit in bytes
    pub fn sector_len(self) -> usize {
        match self {
            StorageKind::Big => SECTOR_SIZE,
            StorageKind::Mini => MINI_SECTOR_SIZE,
        }
    }
}

/// Cursor over one stream entry
#[derive(Debug)]
pub struct Stream {
    entry: u32,
    mode: StreamMode,
    kind: StorageKind,
    sectors: Vec<u32>,
    position: u64,
    size: u64,
    generation: u64,
}

impl Stream {
    pub(crate) fn open(ole: &mut OleFile, entry: u32, mode: StreamMode) -> OleResult<Self> {
        let dir_entry = ole.directory.get(entry)?;
        if dir_entry.entry_type != EntryType::Stream {
            return Err(OleError::NotAStream(entry));
        }
        if mode == StreamMode::Write && ole.options.read_only {
            return Err(OleError::PermissionDenied(format!(
                "container is read-only, cannot write {}",
                dir_entry.name
            )));
        }

        let name = dir_entry.name.clone();
        let start = dir_entry.start;
        let mut size = dir_entry.size;
        let kind = StorageKind::for_size(size);
        let mut sectors = if size == 0 && start == ENDOFCHAIN {
            Vec::new()
        } else {
            match kind {
                StorageKind::Big => ole.fat.read_chain(start)?,
                StorageKind::Mini => ole.mini.read_chain(start)?,
            }
        };

        let slen = kind.sector_len() as u64;
        let needed = size.div_ceil(slen) as usize;
        if sectors.len() < needed {
            tolerate(
                ole.options.lenient,
                format!(
                    "stream {} claims {} bytes but its chain holds only {} sectors, truncating",
                    name,
                    size,
                    sectors.len()
                ),
            )?;
            size = sectors.len() as u64 * slen;
            if mode == StreamMode::Write {
                if StorageKind::for_size(size) != kind {
                    return Err(OleError::CorruptedFile(format!(
                        "stream {} cannot be repaired for writing",
                        name
                    )));
                }
                ole.directory.get_mut(entry)?.size = size;
                ole.dirty = true;
            }
        } else if sectors.len() > needed {
            if mode == StreamMode::Write {
                let extra = sectors[needed];
                let released = match kind {
                    StorageKind::Big => ole.fat.free_chain(extra)?,
                    StorageKind::Mini => ole.mini.free_chain(extra)?,
                };
                match (needed.checked_sub(1).map(|i| sectors[i]), kind) {
                    (Some(last), StorageKind::Big) => ole.fat.set_link(last, ChainLink::EndOfChain)?,
                    (Some(last), StorageKind::Mini) => {
                        ole.mini.set_link(last, ChainLink::EndOfChain)?
                    },
                    (None, _) => ole.directory.get_mut(entry)?.start = ENDOFCHAIN,
                }
                ole.dirty = true;
                warn!(
                    stream = %name,
                    released = released.len(),
                    "released sectors past the end of stream"
                );
            }
            sectors.truncate(needed);
        }

        Ok(Self {
            entry,
            mode,
            kind,
            sectors,
            position: 0,
            size,
            generation: ole.generation(),
        })
    }

    /// Directory index of the stream
    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Committed size in bytes
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Sector indices of the chain, in order
    pub fn sectors(&self) -> &[u32] {
        &self.sectors
    }

    fn check_generation(&self, ole: &OleFile) -> OleResult<()> {
        let current = ole.generation();
        if self.generation != current {
            return Err(OleError::StaleHandle {
                issued: self.generation,
                current,
            });
        }
        Ok(())
    }

    /// Move the cursor. Targets outside `[0, len]` are clamped with a warning.
    pub fn seek(&mut self, ole: &OleFile, pos: SeekFrom) -> OleResult<u64> {
        self.check_generation(ole)?;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };
        let clamped = target.clamp(0, self.size as i128);
        if clamped != target {
            warn!(
                entry = self.entry,
                target = %target,
                size = self.size,
                "seek outside stream clamped"
            );
        }
        self.position = clamped as u64;
        Ok(self.position)
    }

    fn sector_address(&self, ole: &OleFile, index: usize) -> OleResult<usize> {
        let sector = self.sectors.get(index).copied().ok_or_else(|| {
            OleError::CorruptedFile(format!(
                "stream {} chain ends at sector {} of its size",
                self.entry, index
            ))
        })?;
        match self.kind {
            StorageKind::Big => Ok(ContainerBuffer::sector_offset(sector)),
            StorageKind::Mini => ole.mini.location(sector),
        }
    }

    fn check_range(&self, len: usize) -> OleResult<()> {
        if self.position + len as u64 > self.size {
            return Err(OleError::ReadPastEnd {
                position: self.position,
                requested: len as u64,
                size: self.size,
            });
        }
        Ok(())
    }

    /// Copy `dest.len()` bytes from the cursor, crossing sectors as needed.
    ///
    /// Fails without moving the cursor if the range runs past the end.
    pub fn read_copy(&mut self, ole: &OleFile, dest: &mut [u8]) -> OleResult<()> {
        self.check_generation(ole)?;
        self.check_range(dest.len())?;
        self.copy_out(ole, dest)
    }

    fn copy_out(&mut self, ole: &OleFile, dest: &mut [u8]) -> OleResult<()> {
        let slen = self.kind.sector_len();
        let mut done = 0;
        while done < dest.len() {
            let index = (self.position / slen as u64) as usize;
            let offset = (self.position % slen as u64) as usize;
            let n = (slen - offset).min(dest.len() - done);
            let addr = self.sector_address(ole, index)? + offset;
            dest[done..done + n].copy_from_slice(ole.buffer.bytes(addr, n)?);
            done += n;
            self.position += n as u64;
        }
        Ok(())
    }

    /// Zero-copy read of `len` bytes from the cursor.
    ///
    /// Returns `Ok(None)`, leaving the cursor alone, when the bytes are not
    /// physically contiguous; use [`read_copy`](Self::read_copy) then. The
    /// view is invalidated by any later growth of the container.
    pub fn read_view(&mut self, ole: &OleFile, len: usize) -> OleResult<Option<BufferView>> {
        self.check_generation(ole)?;
        self.check_range(len)?;
        if len == 0 {
            return Ok(Some(ole.buffer.view(0, 0)?));
        }

        let slen = self.kind.sector_len();
        let mut index = (self.position / slen as u64) as usize;
        let offset = (self.position % slen as u64) as usize;
        let start = self.sector_address(ole, index)? + offset;

        let mut covered = slen - offset;
        let mut expected = self.sector_address(ole, index)? + slen;
        while covered < len {
            index += 1;
            if self.sector_address(ole, index)? != expected {
                return Ok(None);
            }
            expected += slen;
            covered += slen;
        }

        let view = ole.buffer.view(start, len)?;
        self.position += len as u64;
        Ok(Some(view))
    }

    /// Read everything from the cursor to the end
    pub fn read_to_end(&mut self, ole: &OleFile) -> OleResult<Vec<u8>> {
        self.check_generation(ole)?;
        let mut data = vec![0u8; (self.size - self.position) as usize];
        self.copy_out(ole, &mut data)?;
        Ok(data)
    }

    /// Write at the cursor, allocating sectors as needed.
    ///
    /// The entry's committed size follows every sector-sized chunk. A
    /// mini-resident stream that would reach the cutoff is moved to big
    /// sectors first.
    pub fn write(&mut self, ole: &mut OleFile, src: &[u8]) -> OleResult<()> {
        if self.mode != StreamMode::Write {
            return Err(OleError::PermissionDenied(format!(
                "stream {} is open for reading",
                self.entry
            )));
        }
        self.check_generation(ole)?;
        if src.is_empty() {
            return Ok(());
        }

        let end = self.position + src.len() as u64;
        if end > u32::MAX as u64 {
            return Err(OleError::CapacityExhausted(format!(
                "stream {} would exceed {} bytes",
                self.entry,
                u32::MAX
            )));
        }

        let result = self.write_inner(ole, src, end);
        // Growth caused by this handle must not invalidate it
        self.generation = ole.generation();
        result
    }

    fn write_inner(&mut self, ole: &mut OleFile, src: &[u8], end: u64) -> OleResult<()> {
        if self.kind == StorageKind::Mini && end >= MINI_STREAM_CUTOFF as u64 {
            self.promote(ole)?;
        }
        self.write_chunks(ole, src)
    }

    /// Move a mini-resident stream into big sectors
    fn promote(&mut self, ole: &mut OleFile) -> OleResult<()> {
        let resume = self.position;
        let mut snapshot = vec![0u8; self.size as usize];
        self.position = 0;
        self.copy_out(ole, &mut snapshot)?;

        if let Some(&start) = self.sectors.first() {
            ole.mini.free_chain(start)?;
        }
        let entry = ole.directory.get_mut(self.entry)?;
        entry.start = ENDOFCHAIN;
        entry.size = 0;
        ole.dirty = true;

        self.kind = StorageKind::Big;
        self.sectors.clear();
        self.size = 0;
        self.position = 0;
        debug!(entry = self.entry, bytes = snapshot.len(), "promoting stream to big sectors");

        self.write_chunks(ole, &snapshot)?;
        self.position = resume;
        Ok(())
    }

    fn write_chunks(&mut self, ole: &mut OleFile, src: &[u8]) -> OleResult<()> {
        let slen = self.kind.sector_len();
        let growth = ole.options.growth_step();
        let mut done = 0;
        while done < src.len() {
            let index = (self.position / slen as u64) as usize;
            let offset = (self.position % slen as u64) as usize;

            while self.sectors.len() <= index {
                let last = self.sectors.last().copied();
                let sector = match self.kind {
                    StorageKind::Big => ole.fat.append(&mut ole.buffer, last, growth)?,
                    StorageKind::Mini => {
                        ole.mini
                            .append(&mut ole.fat, &mut ole.buffer, last, growth)?
                    },
                };
                self.sectors.push(sector);
            }

            let n = (slen - offset).min(src.len() - done);
            let addr = self.sector_address(ole, index)? + offset;
            ole.buffer
                .bytes_mut(addr, n)?
                .copy_from_slice(&src[done..done + n]);
            done += n;
            self.position += n as u64;
            self.size = self.size.max(self.position);
            self.commit(ole)?;
        }
        Ok(())
    }

    /// Publish size and start to the directory entry.
    ///
    /// While a promoted stream is still being replayed below the cutoff the
    /// entry keeps its empty state, so it is never read as mini-resident.
    fn commit(&self, ole: &mut OleFile) -> OleResult<()> {
        if StorageKind::for_size(self.size) != self.kind && self.size != 0 {
            return Ok(());
        }
        let entry = ole.directory.get_mut(self.entry)?;
        entry.size = self.size;
        entry.start = self.sectors.first().copied().unwrap_or(ENDOFCHAIN);
        ole.dirty = true;
        Ok(())
    }

    /// Release the handle, committing the final size of a writer
    pub fn close(self, ole: &mut OleFile) -> OleResult<()> {
        if self.mode == StreamMode::Write {
            self.commit(ole)?;
        }
        Ok(())
    }

    /// Independent read handle at the same cursor over the same chain.
    ///
    /// The copy is always [`StreamMode::Read`], so a stream never has two
    /// writers. Both handles go stale together when the container grows.
    pub fn duplicate(&self, ole: &OleFile) -> OleResult<Stream> {
        self.check_generation(ole)?;
        Ok(Stream {
            entry: self.entry,
            mode: StreamMode::Read,
            kind: self.kind,
            sectors: self.sectors.clone(),
            position: self.position,
            size: self.size,
            generation: self.generation,
        })
    }

    /// Re-walk the chain and check it against the materialized sector list
    pub fn verify(&self, ole: &OleFile) -> OleResult<()> {
        self.check_generation(ole)?;
        let entry = ole.directory.get(self.entry)?;
        let chain = if entry.start == ENDOFCHAIN {
            Vec::new()
        } else {
            match self.kind {
                StorageKind::Big => ole.fat.read_chain(entry.start)?,
                StorageKind::Mini => ole.mini.read_chain(entry.start)?,
            }
        };
        if !chain.starts_with(&self.sectors) {
            return Err(OleError::CorruptedFile(format!(
                "stream {} chain no longer matches its sector list",
                self.entry
            )));
        }
        Ok(())
    }
}
