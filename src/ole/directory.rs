//! Directory tree of storages and streams
//!
//! The directory is a flat array of 128-byte entries stored in its own big
//! chain. Each storage level forms a binary structure through the `prev`,
//! `next` and `dir` indices of its entries. Writers do not agree on its
//! shape: some build balanced trees, others (including this one) append new
//! entries to the end of a `next` list and leave `prev` unset. Two navigation
//! schemes are offered:
//!
//! - [`Directory::next`] walks a level relative to an *anchor* (the storage's
//!   `dir` child), stepping back through the anchor's `prev` links before
//!   following `next` links. The `prev`/`next` pointers of the last entry of a
//!   level are not trusted.
//! - [`Directory::children`] does a full in-order walk of a level, which finds
//!   every entry of a balanced tree. Path lookups use it.

use fixedbitset::FixedBitSet;
use tracing::{debug, warn};
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use super::buffer::ContainerBuffer;
use super::consts::*;
use super::error::{OleError, OleResult};
use super::header;
use super::minifat::MiniAllocator;
use super::sector::SectorTable;
use crate::common::binary::{encode_utf16le, parse_utf16le_string, write_u16_le, write_u32_le};

/// Raw OLE directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    prev: U32<LE>,
    next: U32<LE>,
    dir: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: U64<LE>,
    modified_time: U64<LE>,
    /// First sector (big or mini, depending on size)
    start: U32<LE>,
    /// Only the low 32 bits are meaningful with 512-byte sectors
    size: U64<LE>,
}

/// Kind of a live directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Storage,
    Stream,
    Root,
}

impl EntryType {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            STGTY_STORAGE => Some(EntryType::Storage),
            STGTY_STREAM => Some(EntryType::Stream),
            STGTY_ROOT => Some(EntryType::Root),
            _ => None,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            EntryType::Storage => STGTY_STORAGE,
            EntryType::Stream => STGTY_STREAM,
            EntryType::Root => STGTY_ROOT,
        }
    }

    /// True for entries that can have children
    pub fn is_storage(self) -> bool {
        matches!(self, EntryType::Storage | EntryType::Root)
    }
}

/// A live directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Index in the directory array
    pub index: u32,
    pub name: String,
    pub entry_type: EntryType,
    /// Sibling links; `NOSTREAM` when absent
    pub prev: u32,
    pub next: u32,
    /// First child of a storage; `NOSTREAM` when empty
    pub dir: u32,
    /// First sector of the data chain
    pub start: u32,
    /// Committed size in bytes
    pub size: u64,
    /// Name bytes as stored on disk, kept so undecodable names survive a flush
    pub(crate) raw_name: Option<Vec<u8>>,
}

impl DirEntry {
    fn new(index: u32, name: &str, entry_type: EntryType) -> Self {
        Self {
            index,
            name: name.to_string(),
            entry_type,
            prev: NOSTREAM,
            next: NOSTREAM,
            dir: NOSTREAM,
            start: ENDOFCHAIN,
            size: 0,
            raw_name: None,
        }
    }

    /// True when the data lives in mini sectors
    pub fn is_mini(&self) -> bool {
        self.entry_type == EntryType::Stream && self.size < MINI_STREAM_CUTOFF as u64
    }
}

/// Summary of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub entry_type: EntryType,
    pub size: u64,
}

#[derive(Debug, Clone)]
enum Slot {
    /// Zero name length; available to `create`
    Free,
    /// Entry of a type this crate does not handle; left untouched
    Foreign,
    Live(DirEntry),
}

/// Enumeration state for one storage level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirCursor {
    anchor: u32,
    current: Option<u32>,
    steps: usize,
}

impl DirCursor {
    /// Entry the cursor last returned, `None` before the first step
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// First child of the storage being enumerated
    pub fn anchor(&self) -> u32 {
        self.anchor
    }
}

#[derive(Debug)]
pub(crate) struct Directory {
    slots: Vec<Slot>,
    /// Big sectors of the directory stream
    chain: Vec<u32>,
    lenient: bool,
}

impl Directory {
    /// Directory of a new container: the root entry alone in `sector`
    pub fn with_root(sector: u32, lenient: bool) -> Self {
        let mut slots = vec![Slot::Free; DIRENTRIES_PER_SECTOR];
        slots[0] = Slot::Live(DirEntry::new(ROOT_ENTRY, ROOT_ENTRY_NAME, EntryType::Root));
        Self {
            slots,
            chain: vec![sector],
            lenient,
        }
    }

    pub fn load(buf: &ContainerBuffer, fat: &SectorTable, lenient: bool) -> OleResult<Self> {
        let start = header::directory_start(buf.header())?;
        let chain = fat.read_chain(start)?;
        if chain.is_empty() {
            return Err(OleError::CorruptedFile("empty directory chain".to_string()));
        }

        let mut slots = Vec::with_capacity(chain.len() * DIRENTRIES_PER_SECTOR);
        for &sector in &chain {
            let data = buf.sector(sector)?;
            for raw in data.chunks_exact(DIRENTRY_SIZE) {
                let index = slots.len() as u32;
                slots.push(parse_slot(raw, index)?);
            }
        }

        match slots.first() {
            Some(Slot::Live(root)) if root.entry_type == EntryType::Root => {},
            _ => {
                return Err(OleError::CorruptedFile(
                    "directory entry 0 is not the root entry".to_string(),
                ));
            },
        }

        Ok(Self {
            slots,
            chain,
            lenient,
        })
    }

    /// Number of slots, live or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: u32) -> OleResult<&DirEntry> {
        match self.slots.get(index as usize) {
            Some(Slot::Live(entry)) => Ok(entry),
            _ => Err(OleError::InvalidEntry(index)),
        }
    }

    pub fn get_mut(&mut self, index: u32) -> OleResult<&mut DirEntry> {
        match self.slots.get_mut(index as usize) {
            Some(Slot::Live(entry)) => Ok(entry),
            _ => Err(OleError::InvalidEntry(index)),
        }
    }

    pub fn root(&self) -> OleResult<&DirEntry> {
        self.get(ROOT_ENTRY)
    }

    fn storage(&self, index: u32) -> OleResult<&DirEntry> {
        let entry = self.get(index)?;
        if !entry.entry_type.is_storage() {
            return Err(OleError::NotAStorage(index));
        }
        Ok(entry)
    }

    /// Entry reached through a tree link
    fn linked(&self, index: u32) -> OleResult<&DirEntry> {
        self.get(index).map_err(|_| {
            OleError::CorruptedFile(format!("directory link to missing entry {}", index))
        })
    }

    pub fn root_cursor(&self) -> OleResult<DirCursor> {
        self.cursor(ROOT_ENTRY)
    }

    /// Fresh cursor positioned before the first child of `storage`
    pub fn cursor(&self, storage: u32) -> OleResult<DirCursor> {
        let entry = self.storage(storage)?;
        Ok(DirCursor {
            anchor: entry.dir,
            current: None,
            steps: 0,
        })
    }

    /// Re-anchor `cursor` on the children of `storage`
    pub fn enter(&self, cursor: &mut DirCursor, storage: u32) -> OleResult<()> {
        *cursor = self.cursor(storage)?;
        Ok(())
    }

    /// Advance the cursor, returning the next entry of its level.
    ///
    /// The anchor's `prev` run is yielded farthest-first, then the anchor,
    /// then the anchor's `next` run. `Ok(None)` marks the end of the level.
    pub fn next(&self, cursor: &mut DirCursor) -> OleResult<Option<u32>> {
        if cursor.anchor == NOSTREAM {
            return Ok(None);
        }
        cursor.steps += 1;
        if cursor.steps > self.slots.len() {
            return Err(OleError::CyclicChain {
                table: "directory",
                sector: cursor.current.unwrap_or(cursor.anchor),
            });
        }

        // Back-trace: how far behind the anchor is the cursor?
        let offset = match cursor.current {
            None => Some(self.prev_run(cursor.anchor, NOSTREAM)?),
            Some(current) if current != cursor.anchor => {
                let depth = self.prev_run(cursor.anchor, current)?;
                let reached = self.nth_prev(cursor.anchor, depth)? == current;
                reached.then_some(depth)
            },
            Some(_) => None,
        };

        let next = match (offset, cursor.current) {
            (Some(depth), None) => self.nth_prev(cursor.anchor, depth)?,
            (Some(depth), Some(_)) => self.nth_prev(cursor.anchor, depth - 1)?,
            (None, Some(current)) => self.linked(current)?.next,
            (None, None) => NOSTREAM,
        };

        if next == NOSTREAM {
            return Ok(None);
        }
        self.linked(next)?;
        cursor.current = Some(next);
        Ok(Some(next))
    }

    /// Steps along `prev` from `anchor` until `stop` or the end of the run.
    fn prev_run(&self, anchor: u32, stop: u32) -> OleResult<usize> {
        let mut depth = 0;
        let mut node = anchor;
        loop {
            let prev = self.linked(node)?.prev;
            if node == stop || prev == NOSTREAM {
                return Ok(depth);
            }
            depth += 1;
            if depth > self.slots.len() {
                return Err(OleError::CyclicChain {
                    table: "directory",
                    sector: anchor,
                });
            }
            node = prev;
        }
    }

    fn nth_prev(&self, anchor: u32, steps: usize) -> OleResult<u32> {
        let mut node = anchor;
        for _ in 0..steps {
            node = self.linked(node)?.prev;
        }
        Ok(node)
    }

    /// All children of `storage`, by in-order walk of its sibling tree
    pub fn children(&self, storage: u32) -> OleResult<Vec<u32>> {
        let parent = self.storage(storage)?;
        let mut out = Vec::new();
        let mut visited = FixedBitSet::with_capacity(self.slots.len());
        let mut stack = Vec::new();
        let mut node = parent.dir;

        loop {
            while node != NOSTREAM {
                let entry = match self.linked(node) {
                    Ok(entry) => entry,
                    Err(err) if self.lenient => {
                        warn!("skipping broken sibling link under entry {}: {}", storage, err);
                        break;
                    },
                    Err(err) => return Err(err),
                };
                if visited.put(node as usize) {
                    return Err(OleError::CyclicChain {
                        table: "directory",
                        sector: node,
                    });
                }
                stack.push(node);
                node = entry.prev;
            }
            match stack.pop() {
                Some(index) => {
                    out.push(index);
                    node = self.linked(index)?.next;
                },
                None => break,
            }
        }
        Ok(out)
    }

    /// Case-insensitive child lookup
    pub fn find_child(&self, storage: u32, name: &str) -> OleResult<Option<u32>> {
        let wanted = name.to_lowercase();
        for index in self.children(storage)? {
            if self.get(index)?.name.to_lowercase() == wanted {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Resolve a path of entry names from the root; `&[]` is the root itself
    pub fn lookup(&self, path: &[&str]) -> OleResult<u32> {
        let mut current = ROOT_ENTRY;
        for name in path {
            current = self
                .find_child(current, name)?
                .ok_or_else(|| OleError::StreamNotFound(path.join("/")))?;
        }
        Ok(current)
    }

    pub fn stat(&self, index: u32) -> OleResult<Stat> {
        let entry = self.get(index)?;
        Ok(Stat {
            entry_type: entry.entry_type,
            size: entry.size,
        })
    }

    /// Names of the children of `storage`
    pub fn list(&self, storage: u32) -> OleResult<Vec<String>> {
        self.children(storage)?
            .into_iter()
            .map(|index| Ok(self.get(index)?.name.clone()))
            .collect()
    }

    /// Paths of every stream in the container
    pub fn list_streams(&self) -> OleResult<Vec<Vec<String>>> {
        let mut streams = Vec::new();
        self.collect_streams(ROOT_ENTRY, &mut Vec::new(), &mut streams, 0)?;
        Ok(streams)
    }

    fn collect_streams(
        &self,
        storage: u32,
        path: &mut Vec<String>,
        streams: &mut Vec<Vec<String>>,
        depth: usize,
    ) -> OleResult<()> {
        if depth > self.slots.len() {
            return Err(OleError::CyclicChain {
                table: "directory",
                sector: storage,
            });
        }
        for index in self.children(storage)? {
            let entry = self.get(index)?;
            path.push(entry.name.clone());
            match entry.entry_type {
                EntryType::Stream => streams.push(path.clone()),
                _ => self.collect_streams(index, path, streams, depth + 1)?,
            }
            path.pop();
        }
        Ok(())
    }

    /// Add a new entry under `parent`.
    ///
    /// The entry takes the first free slot (growing the directory chain by one
    /// sector when there is none) and is appended after the last entry of the
    /// parent's `next` run, or becomes the parent's first child.
    pub fn create(
        &mut self,
        parent: u32,
        name: &str,
        entry_type: EntryType,
        fat: &mut SectorTable,
        buf: &mut ContainerBuffer,
        growth: u32,
    ) -> OleResult<u32> {
        if entry_type == EntryType::Root {
            return Err(OleError::InvalidName(format!(
                "{}: only one root entry may exist",
                name
            )));
        }
        validate_name(name)?;
        let anchor = self.storage(parent)?.dir;
        if self.find_child(parent, name)?.is_some() {
            return Err(OleError::InvalidName(format!("{}: entry already exists", name)));
        }

        // Walk to the tail of the anchor's next run before allocating
        let tail = if anchor == NOSTREAM {
            None
        } else {
            let mut node = anchor;
            let mut steps = 0;
            loop {
                let next = self.linked(node)?.next;
                if next == NOSTREAM {
                    break Some(node);
                }
                steps += 1;
                if steps > self.slots.len() {
                    return Err(OleError::CyclicChain {
                        table: "directory",
                        sector: anchor,
                    });
                }
                node = next;
            }
        };

        let index = match self.slots.iter().position(|s| matches!(s, Slot::Free)) {
            Some(free) => free as u32,
            None => self.grow(fat, buf, growth)?,
        };
        self.slots[index as usize] = Slot::Live(DirEntry::new(index, name, entry_type));

        match tail {
            Some(tail) => self.get_mut(tail)?.next = index,
            None => self.get_mut(parent)?.dir = index,
        }
        debug!(index, parent, entry_name = name, ?entry_type, "created directory entry");
        Ok(index)
    }

    /// Append one sector of free slots; returns the first new slot
    fn grow(
        &mut self,
        fat: &mut SectorTable,
        buf: &mut ContainerBuffer,
        growth: u32,
    ) -> OleResult<u32> {
        let sector = fat.append(buf, self.chain.last().copied(), growth)?;
        buf.sector_mut(sector)?.fill(0);
        self.chain.push(sector);
        let first = self.slots.len() as u32;
        self.slots
            .extend(std::iter::repeat_n(Slot::Free, DIRENTRIES_PER_SECTOR));
        debug!(sector, slots = self.slots.len(), "extended directory");
        Ok(first)
    }

    /// Remove a leaf entry and release its data.
    ///
    /// Only an entry that is neither the anchor of its level nor has sibling
    /// links of its own can be removed; storages must be empty.
    pub fn unlink(
        &mut self,
        index: u32,
        fat: &mut SectorTable,
        mini: &mut MiniAllocator,
    ) -> OleResult<()> {
        if index == ROOT_ENTRY {
            return Err(OleError::CannotUnlink {
                index,
                reason: "the root entry cannot be removed",
            });
        }
        let entry = self.get(index)?.clone();
        if entry.prev != NOSTREAM || entry.next != NOSTREAM {
            return Err(OleError::CannotUnlink {
                index,
                reason: "entry has siblings",
            });
        }
        if entry.entry_type.is_storage() && entry.dir != NOSTREAM {
            return Err(OleError::CannotUnlink {
                index,
                reason: "storage is not empty",
            });
        }

        let mut referrer = None;
        for slot in &self.slots {
            if let Slot::Live(other) = slot {
                if other.dir == index {
                    return Err(OleError::CannotUnlink {
                        index,
                        reason: "entry is the anchor of its storage",
                    });
                }
                if other.next == index || other.prev == index {
                    referrer = Some(other.index);
                }
            }
        }
        let referrer = referrer.ok_or(OleError::CannotUnlink {
            index,
            reason: "entry is not linked into the tree",
        })?;

        if entry.entry_type == EntryType::Stream && entry.start != ENDOFCHAIN {
            if entry.is_mini() {
                mini.free_chain(entry.start)?;
            } else {
                fat.free_chain(entry.start)?;
            }
        }

        let other = self.get_mut(referrer)?;
        if other.next == index {
            other.next = NOSTREAM;
        } else {
            other.prev = NOSTREAM;
        }
        self.slots[index as usize] = Slot::Free;
        debug!(index, entry_name = %entry.name, "unlinked directory entry");
        Ok(())
    }

    /// Write every entry back into the directory sectors
    pub fn store(&self, buf: &mut ContainerBuffer) -> OleResult<()> {
        header::set_directory_start(buf.header_mut(), self.chain[0])?;
        for (index, slot) in self.slots.iter().enumerate() {
            let sector = self.chain[index / DIRENTRIES_PER_SECTOR];
            let offset = ContainerBuffer::sector_offset(sector)
                + (index % DIRENTRIES_PER_SECTOR) * DIRENTRY_SIZE;
            let raw = buf.bytes_mut(offset, DIRENTRY_SIZE)?;
            match slot {
                Slot::Foreign => {},
                Slot::Free => {
                    raw.fill(0);
                    write_u32_le(raw, DE_PREV, NOSTREAM)?;
                    write_u32_le(raw, DE_NEXT, NOSTREAM)?;
                    write_u32_le(raw, DE_DIR, NOSTREAM)?;
                },
                Slot::Live(entry) => write_entry(raw, entry)?,
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        let mut slots = Vec::new();
        for entry in entries {
            while slots.len() < entry.index as usize {
                slots.push(Slot::Free);
            }
            slots.push(Slot::Live(entry));
        }
        Self {
            slots,
            chain: vec![1],
            lenient: false,
        }
    }
}

fn parse_slot(data: &[u8], index: u32) -> OleResult<Slot> {
    let raw = RawDirectoryEntry::read_from_bytes(data)
        .map_err(|_| OleError::CorruptedFile(format!("directory entry {} truncated", index)))?;

    let name_len = raw.name_len.get() as usize;
    if name_len == 0 || raw.entry_type == STGTY_EMPTY {
        return Ok(Slot::Free);
    }
    let Some(entry_type) = EntryType::from_raw(raw.entry_type) else {
        warn!(index, entry_type = raw.entry_type, "ignoring directory entry of unknown type");
        return Ok(Slot::Foreign);
    };

    // name_len counts bytes including the terminator
    let name_bytes = &raw.name[..name_len.min(64).saturating_sub(2)];
    Ok(Slot::Live(DirEntry {
        index,
        name: parse_utf16le_string(name_bytes),
        entry_type,
        prev: raw.prev.get(),
        next: raw.next.get(),
        dir: raw.dir.get(),
        start: raw.start.get(),
        size: raw.size.get() & 0xFFFF_FFFF,
        raw_name: Some(name_bytes.to_vec()),
    }))
}

/// Overwrite the fields this crate manages; CLSID, state bits and timestamps
/// are preserved.
fn write_entry(raw: &mut [u8], entry: &DirEntry) -> OleResult<()> {
    let name = match &entry.raw_name {
        Some(bytes) if parse_utf16le_string(bytes) == entry.name => bytes.clone(),
        _ => encode_utf16le(&entry.name),
    };
    raw[..64].fill(0);
    raw[..name.len()].copy_from_slice(&name);
    write_u16_le(raw, DE_NAME_LEN, (name.len() + 2) as u16)?;
    raw[DE_TYPE] = entry.entry_type.to_raw();
    raw[DE_COLOR] = 1;
    write_u32_le(raw, DE_PREV, entry.prev)?;
    write_u32_le(raw, DE_NEXT, entry.next)?;
    write_u32_le(raw, DE_DIR, entry.dir)?;
    write_u32_le(raw, DE_START, entry.start)?;
    write_u32_le(raw, DE_SIZE, entry.size as u32)?;
    write_u32_le(raw, DE_SIZE + 4, 0)?;
    Ok(())
}

/// Entry names are 1..=31 UTF-16 code units and may not contain path
/// separators.
pub(crate) fn validate_name(name: &str) -> OleResult<()> {
    let units = name.encode_utf16().count();
    if units == 0 || units > MAX_NAME_UNITS {
        return Err(OleError::InvalidName(format!(
            "{}: names must be 1 to {} UTF-16 code units",
            name, MAX_NAME_UNITS
        )));
    }
    if name.contains(['/', '\\', ':', '!']) {
        return Err(OleError::InvalidName(format!(
            "{}: names may not contain '/', '\\', ':' or '!'",
            name
        )));
    }
    Ok(())
}
