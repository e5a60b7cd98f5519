//! Mini-sector allocator
//!
//! Streams below the cutoff are stored in 64-byte mini sectors. The mini
//! sectors are packed into the *mini stream*, which is itself an ordinary big
//! chain owned by the root entry. Mini-FAT entries use the same sentinels as
//! the FAT, and the mini-FAT table lives in yet another big chain.
//!
//! Both backing chains grow on demand through the big-sector table. Freed mini
//! sectors are reused but the mini stream is never shrunk.

use tracing::debug;

use super::buffer::ContainerBuffer;
use super::consts::*;
use super::error::{OleError, OleResult, tolerate};
use super::sector::{ChainLink, SectorTable, release_chain, walk_chain};
use crate::common::binary::{read_u32_le, write_u32_le};

#[derive(Debug, Default)]
pub(crate) struct MiniAllocator {
    links: Vec<ChainLink>,
    /// Big sectors holding the mini-FAT
    table_chain: Vec<u32>,
    /// Big sectors holding the mini stream
    stream_chain: Vec<u32>,
}

impl MiniAllocator {
    /// Decode the mini-FAT and locate the mini stream.
    ///
    /// `root_start` is the first sector of the root entry's chain.
    pub fn load(
        buf: &ContainerBuffer,
        fat: &SectorTable,
        root_start: u32,
        lenient: bool,
    ) -> OleResult<Self> {
        let header = buf.header();
        let table_start = read_u32_le(header, HDR_MINIFAT_START)?;
        let declared = read_u32_le(header, HDR_NUM_MINIFAT_SECTORS)? as usize;

        let table_chain = fat.read_chain(table_start)?;
        if table_chain.len() != declared {
            tolerate(
                lenient,
                format!(
                    "header declares {} mini-FAT sectors, chain has {}",
                    declared,
                    table_chain.len()
                ),
            )?;
        }
        let stream_chain = fat.read_chain(root_start)?;

        let mut links = Vec::with_capacity(table_chain.len() * ENTRIES_PER_SECTOR);
        for &sector in &table_chain {
            let data = buf.sector(sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                links.push(ChainLink::from_raw(read_u32_le(data, slot * 4)?));
            }
        }

        // Entries past the mini stream describe sectors that do not exist
        let capacity = stream_chain.len() * MINI_PER_SECTOR;
        if links.len() > capacity {
            if let Some(orphan) = links[capacity..]
                .iter()
                .position(|&link| link != ChainLink::Unused)
            {
                tolerate(
                    lenient,
                    format!(
                        "mini sector {} is allocated beyond the end of the mini stream",
                        capacity + orphan
                    ),
                )?;
            }
            links.truncate(capacity);
        }

        // Only free entries are ever trailing; drop them so growth starts at
        // the first unused slot after the last allocation
        while links.last() == Some(&ChainLink::Unused) {
            links.pop();
        }

        Ok(Self {
            links,
            table_chain,
            stream_chain,
        })
    }

    /// Absolute buffer offset of a mini sector
    pub fn location(&self, mini: u32) -> OleResult<usize> {
        let idx = mini as usize;
        let big = self
            .stream_chain
            .get(idx / MINI_PER_SECTOR)
            .copied()
            .ok_or_else(|| {
                OleError::CorruptedFile(format!("mini sector {} outside the mini stream", mini))
            })?;
        Ok(ContainerBuffer::sector_offset(big) + (idx % MINI_PER_SECTOR) * MINI_SECTOR_SIZE)
    }

    pub fn read_chain(&self, start: u32) -> OleResult<Vec<u32>> {
        walk_chain(&self.links, start, "MiniFAT")
    }

    pub fn free_chain(&mut self, start: u32) -> OleResult<Vec<u32>> {
        let freed = release_chain(&mut self.links, start, "MiniFAT")?;
        debug!(start, sectors = freed.len(), "released mini chain");
        Ok(freed)
    }

    /// Find or make room for a free mini sector.
    ///
    /// Growing may extend the mini-FAT chain, the mini stream chain, or both.
    pub fn next_free_sector(
        &mut self,
        fat: &mut SectorTable,
        buf: &mut ContainerBuffer,
        growth: u32,
    ) -> OleResult<u32> {
        if let Some(idx) = self.links.iter().position(|&l| l == ChainLink::Unused) {
            return Ok(idx as u32);
        }

        let idx = self.links.len();
        if idx >= self.table_chain.len() * ENTRIES_PER_SECTOR {
            let sector = fat.append(buf, self.table_chain.last().copied(), growth)?;
            self.table_chain.push(sector);
            debug!(sector, "extended mini-FAT");
        }
        if idx >= self.stream_chain.len() * MINI_PER_SECTOR {
            let sector = fat.append(buf, self.stream_chain.last().copied(), growth)?;
            self.stream_chain.push(sector);
            debug!(
                sector,
                capacity = self.stream_chain.len() * MINI_PER_SECTOR,
                "extended mini stream"
            );
        }
        self.links.push(ChainLink::Unused);
        Ok(idx as u32)
    }

    pub fn set_link(&mut self, mini: u32, link: ChainLink) -> OleResult<()> {
        let slot = self.links.get_mut(mini as usize).ok_or_else(|| {
            OleError::CorruptedFile(format!("mini sector {} outside mini-FAT", mini))
        })?;
        *slot = link;
        Ok(())
    }

    /// Allocate a mini sector and hang it after `last` (or start a new chain)
    pub fn append(
        &mut self,
        fat: &mut SectorTable,
        buf: &mut ContainerBuffer,
        last: Option<u32>,
        growth: u32,
    ) -> OleResult<u32> {
        let mini = self.next_free_sector(fat, buf, growth)?;
        self.links[mini as usize] = ChainLink::EndOfChain;
        if let Some(last) = last {
            self.set_link(last, ChainLink::Next(mini))?;
        }
        Ok(mini)
    }

    /// First sector of the mini stream, for the root entry
    pub fn stream_start(&self) -> u32 {
        self.stream_chain.first().copied().unwrap_or(ENDOFCHAIN)
    }

    /// Bytes of the mini stream in use, for the root entry
    pub fn stream_size(&self) -> u64 {
        (self.links.len() * MINI_SECTOR_SIZE) as u64
    }

    /// Write the mini-FAT into its sectors and the header
    pub fn store(&self, buf: &mut ContainerBuffer) -> OleResult<()> {
        let header = buf.header_mut();
        write_u32_le(
            header,
            HDR_MINIFAT_START,
            self.table_chain.first().copied().unwrap_or(ENDOFCHAIN),
        )?;
        write_u32_le(header, HDR_NUM_MINIFAT_SECTORS, self.table_chain.len() as u32)?;

        for (k, &table_sector) in self.table_chain.iter().enumerate() {
            let sector = buf.sector_mut(table_sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let raw = self
                    .links
                    .get(k * ENTRIES_PER_SECTOR + slot)
                    .map_or(FREESECT, |link| link.to_raw());
                write_u32_le(sector, slot * 4, raw)?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn stream_chain(&self) -> &[u32] {
        &self.stream_chain
    }

    #[cfg(test)]
    pub fn table_chain(&self) -> &[u32] {
        &self.table_chain
    }
}
