//! Big-sector store and its allocation table (FAT)
//!
//! The FAT maps every sector to the next sector of its chain, or to a
//! sentinel:
//! - regular sectors link with [`ChainLink::Next`]
//! - sectors holding the table itself are [`ChainLink::Special`] (`0xFFFFFFFD`)
//! - the last sector of a chain is [`ChainLink::EndOfChain`] (`0xFFFFFFFE`)
//! - free sectors are [`ChainLink::Unused`] (`0xFFFFFFFF`)
//!
//! The table is decoded once on open, edited in memory and written back to its
//! own sectors by [`SectorTable::store`]. Freed sectors are not compacted; they
//! are simply picked up again by the next linear free-sector scan.

use fixedbitset::FixedBitSet;
use tracing::debug;

use super::buffer::ContainerBuffer;
use super::consts::*;
use super::error::{OleError, OleResult, tolerate};
use crate::common::binary::{read_u32_le, write_u32_le};

/// One allocation-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Index of the next sector in the chain
    Next(u32),
    /// Last sector of a chain
    EndOfChain,
    /// Free sector
    Unused,
    /// Sector holds allocation-table data
    Special,
    /// Sector holds part of the extended table-sector list
    Extension,
}

impl ChainLink {
    /// Decode a raw 32-bit table entry
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            FREESECT => ChainLink::Unused,
            ENDOFCHAIN => ChainLink::EndOfChain,
            FATSECT => ChainLink::Special,
            DIFSECT => ChainLink::Extension,
            next => ChainLink::Next(next),
        }
    }

    /// Encode as a raw 32-bit table entry
    pub fn to_raw(self) -> u32 {
        match self {
            ChainLink::Next(next) => next,
            ChainLink::EndOfChain => ENDOFCHAIN,
            ChainLink::Unused => FREESECT,
            ChainLink::Special => FATSECT,
            ChainLink::Extension => DIFSECT,
        }
    }
}

/// Walk a chain from `start` to its end-of-chain marker.
///
/// Fails on out-of-range indices, on chains that run into free or table
/// sectors, and on cycles.
pub(crate) fn walk_chain(
    links: &[ChainLink],
    start: u32,
    table: &'static str,
) -> OleResult<Vec<u32>> {
    let mut chain = Vec::new();
    if start == ENDOFCHAIN {
        return Ok(chain);
    }

    let mut visited = FixedBitSet::with_capacity(links.len());
    let mut current = start;
    loop {
        let idx = current as usize;
        if idx >= links.len() {
            return Err(OleError::CorruptedFile(format!(
                "{} chain references sector {} beyond table of {} entries",
                table,
                current,
                links.len()
            )));
        }
        if visited.put(idx) {
            return Err(OleError::CyclicChain {
                table,
                sector: current,
            });
        }
        chain.push(current);

        match links[idx] {
            ChainLink::Next(next) => current = next,
            ChainLink::EndOfChain => break,
            ChainLink::Unused => {
                return Err(OleError::CorruptedFile(format!(
                    "{} chain runs into free sector {}",
                    table, current
                )));
            },
            ChainLink::Special | ChainLink::Extension => {
                return Err(OleError::CorruptedFile(format!(
                    "{} chain runs into table sector {}",
                    table, current
                )));
            },
        }
    }
    Ok(chain)
}

/// Mark every sector of a chain free, returning the released sectors in chain
/// order. The chain is validated before anything is modified.
pub(crate) fn release_chain(
    links: &mut [ChainLink],
    start: u32,
    table: &'static str,
) -> OleResult<Vec<u32>> {
    let chain = walk_chain(links, start, table)?;
    for &sector in &chain {
        links[sector as usize] = ChainLink::Unused;
    }
    Ok(chain)
}

/// The FAT, plus the list of sectors it is stored in
#[derive(Debug)]
pub(crate) struct SectorTable {
    links: Vec<ChainLink>,
    /// Sectors holding FAT data, in table order
    table_sectors: Vec<u32>,
    /// Sectors continuing the table-sector list past the header's 109 slots
    extension_sectors: Vec<u32>,
}

impl SectorTable {
    /// Table for a freshly created container: sector 0 holds the table
    pub fn with_first_table_sector() -> Self {
        Self {
            links: vec![ChainLink::Special],
            table_sectors: vec![0],
            extension_sectors: Vec::new(),
        }
    }

    /// Table for the minimal layout: sector 0 holds the table, sector 1 is a
    /// one-sector chain for the directory
    pub fn with_directory_sector() -> Self {
        Self {
            links: vec![ChainLink::Special, ChainLink::EndOfChain],
            table_sectors: vec![0],
            extension_sectors: Vec::new(),
        }
    }

    /// Decode the FAT described by the header.
    ///
    /// Sectors past the range the table describes are trimmed from `buf`.
    pub fn load(buf: &mut ContainerBuffer, lenient: bool) -> OleResult<Self> {
        let header = buf.header();
        let num_fat = read_u32_le(header, HDR_NUM_FAT_SECTORS)? as usize;
        let first_extension = read_u32_le(header, HDR_DIFAT_START)?;

        if num_fat > buf.sector_count() {
            return Err(OleError::CorruptedFile(format!(
                "header claims {} table sectors in a file of {} sectors",
                num_fat,
                buf.sector_count()
            )));
        }

        let mut table_sectors = Vec::with_capacity(num_fat);
        for slot in 0..num_fat.min(MAX_HEADER_FAT_SECTORS) {
            table_sectors.push(read_u32_le(header, HDR_FAT_LIST + slot * 4)?);
        }

        let mut extension_sectors = Vec::new();
        let mut next = first_extension;
        while table_sectors.len() < num_fat && next != ENDOFCHAIN && next != FREESECT {
            if extension_sectors.contains(&next) {
                return Err(OleError::CyclicChain {
                    table: "DIFAT",
                    sector: next,
                });
            }
            let sector = buf.sector(next)?;
            for slot in 0..EXTENSION_ENTRIES_PER_SECTOR {
                if table_sectors.len() == num_fat {
                    break;
                }
                table_sectors.push(read_u32_le(sector, slot * 4)?);
            }
            extension_sectors.push(next);
            next = read_u32_le(sector, EXTENSION_ENTRIES_PER_SECTOR * 4)?;
        }
        if table_sectors.len() < num_fat {
            tolerate(
                lenient,
                format!(
                    "table-sector list ends after {} of {} entries",
                    table_sectors.len(),
                    num_fat
                ),
            )?;
        }

        let mut links = Vec::with_capacity(table_sectors.len() * ENTRIES_PER_SECTOR);
        for &table_sector in &table_sectors {
            let sector = buf.sector(table_sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                links.push(ChainLink::from_raw(read_u32_le(sector, slot * 4)?));
            }
        }

        // Entries past the end of the file describe nothing
        links.truncate(buf.sector_count());
        if links.len() < buf.sector_count() {
            tolerate(
                lenient,
                format!(
                    "{} trailing sectors are not described by the allocation table, ignoring them",
                    buf.sector_count() - links.len()
                ),
            )?;
            buf.truncate_sectors(links.len());
        }

        let mut table = Self {
            links,
            table_sectors,
            extension_sectors,
        };
        table.mark_owned(lenient)?;
        Ok(table)
    }

    fn mark_owned(&mut self, lenient: bool) -> OleResult<()> {
        let owned = self
            .table_sectors
            .iter()
            .map(|&s| (s, ChainLink::Special))
            .chain(
                self.extension_sectors
                    .iter()
                    .map(|&s| (s, ChainLink::Extension)),
            )
            .collect::<Vec<_>>();
        for (sector, marker) in owned {
            let current = self.link(sector)?;
            if current != marker {
                tolerate(
                    lenient,
                    format!("table sector {} marked {:?}, expected {:?}", sector, current, marker),
                )?;
                self.links[sector as usize] = marker;
            }
        }
        Ok(())
    }

    /// Number of sectors described by the table
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn table_sectors(&self) -> &[u32] {
        &self.table_sectors
    }

    pub fn link(&self, sector: u32) -> OleResult<ChainLink> {
        self.links.get(sector as usize).copied().ok_or_else(|| {
            OleError::CorruptedFile(format!("sector {} outside allocation table", sector))
        })
    }

    pub fn set_link(&mut self, sector: u32, link: ChainLink) -> OleResult<()> {
        let slot = self.links.get_mut(sector as usize).ok_or_else(|| {
            OleError::CorruptedFile(format!("sector {} outside allocation table", sector))
        })?;
        *slot = link;
        Ok(())
    }

    /// Materialize the sector list of a chain
    pub fn read_chain(&self, start: u32) -> OleResult<Vec<u32>> {
        walk_chain(&self.links, start, "FAT")
    }

    /// Release a chain; its sectors become candidates for the next scan
    pub fn free_chain(&mut self, start: u32) -> OleResult<Vec<u32>> {
        let freed = release_chain(&mut self.links, start, "FAT")?;
        debug!(start, sectors = freed.len(), "released sector chain");
        Ok(freed)
    }

    fn first_unused(&self) -> Option<u32> {
        self.links
            .iter()
            .position(|&link| link == ChainLink::Unused)
            .map(|idx| idx as u32)
    }

    /// Find a free sector, growing the file when the table has none.
    ///
    /// The returned sector is still marked unused; callers link it.
    pub fn next_free_sector(&mut self, buf: &mut ContainerBuffer, growth: u32) -> OleResult<u32> {
        loop {
            if let Some(sector) = self.first_unused() {
                return Ok(sector);
            }
            // A growth step can be used up entirely by the table sector that
            // describes it; the table cap bounds this loop
            self.extend(buf, growth)?;
        }
    }

    fn extend(&mut self, buf: &mut ContainerBuffer, count: u32) -> OleResult<()> {
        let needed = self.links.len() + count as usize;
        if needed > self.table_sectors.len() * ENTRIES_PER_SECTOR
            && self.table_sectors.len() >= MAX_HEADER_FAT_SECTORS
        {
            return Err(OleError::CapacityExhausted(format!(
                "allocation table is limited to {} sectors",
                MAX_HEADER_FAT_SECTORS
            )));
        }

        buf.grow(count)?;
        self.links.resize(needed, ChainLink::Unused);
        debug!(
            added = count,
            total = self.links.len(),
            generation = buf.generation(),
            "extended container"
        );

        // The new sectors may need another table sector to describe them
        while self.links.len() > self.table_sectors.len() * ENTRIES_PER_SECTOR {
            if self.table_sectors.len() >= MAX_HEADER_FAT_SECTORS {
                return Err(OleError::CapacityExhausted(format!(
                    "allocation table is limited to {} sectors",
                    MAX_HEADER_FAT_SECTORS
                )));
            }
            let sector = match self.first_unused() {
                Some(sector) => sector,
                None => {
                    buf.grow(1)?;
                    self.links.push(ChainLink::Unused);
                    (self.links.len() - 1) as u32
                },
            };
            self.links[sector as usize] = ChainLink::Special;
            self.table_sectors.push(sector);
            debug!(
                sector,
                table_sectors = self.table_sectors.len(),
                "allocated allocation-table sector"
            );
        }
        Ok(())
    }

    /// Allocate a sector and hang it after `last` (or start a new chain)
    pub fn append(
        &mut self,
        buf: &mut ContainerBuffer,
        last: Option<u32>,
        growth: u32,
    ) -> OleResult<u32> {
        let sector = self.next_free_sector(buf, growth)?;
        self.links[sector as usize] = ChainLink::EndOfChain;
        if let Some(last) = last {
            self.set_link(last, ChainLink::Next(sector))?;
        }
        Ok(sector)
    }

    /// Write the table into its sectors and the header's table-sector list
    pub fn store(&self, buf: &mut ContainerBuffer) -> OleResult<()> {
        let header = buf.header_mut();
        write_u32_le(header, HDR_NUM_FAT_SECTORS, self.table_sectors.len() as u32)?;
        for slot in 0..MAX_HEADER_FAT_SECTORS {
            let value = self.table_sectors.get(slot).copied().unwrap_or(FREESECT);
            write_u32_le(header, HDR_FAT_LIST + slot * 4, value)?;
        }
        write_u32_le(
            header,
            HDR_DIFAT_START,
            self.extension_sectors.first().copied().unwrap_or(ENDOFCHAIN),
        )?;
        write_u32_le(
            header,
            HDR_NUM_DIFAT_SECTORS,
            self.extension_sectors.len() as u32,
        )?;

        for (k, &table_sector) in self.table_sectors.iter().enumerate() {
            let sector = buf.sector_mut(table_sector)?;
            for slot in 0..ENTRIES_PER_SECTOR {
                let raw = self
                    .links
                    .get(k * ENTRIES_PER_SECTOR + slot)
                    .map_or(FREESECT, |link| link.to_raw());
                write_u32_le(sector, slot * 4, raw)?;
            }
        }

        for (k, &extension) in self.extension_sectors.iter().enumerate() {
            let sector = buf.sector_mut(extension)?;
            for slot in 0..EXTENSION_ENTRIES_PER_SECTOR {
                let idx = MAX_HEADER_FAT_SECTORS + k * EXTENSION_ENTRIES_PER_SECTOR + slot;
                let value = self.table_sectors.get(idx).copied().unwrap_or(FREESECT);
                write_u32_le(sector, slot * 4, value)?;
            }
            let next = self
                .extension_sectors
                .get(k + 1)
                .copied()
                .unwrap_or(ENDOFCHAIN);
            write_u32_le(sector, EXTENSION_ENTRIES_PER_SECTOR * 4, next)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_links(links: Vec<ChainLink>, table_sectors: Vec<u32>) -> Self {
        Self {
            links,
            table_sectors,
            extension_sectors: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Sector 0 holds the table, the rest follow `links`
    fn table_with(rest: &[ChainLink]) -> (SectorTable, ContainerBuffer) {
        let mut links = vec![ChainLink::Special];
        links.extend_from_slice(rest);
        let buf = ContainerBuffer::new(vec![0u8; (links.len() + 1) * SECTOR_SIZE]);
        (SectorTable::from_links(links, vec![0]), buf)
    }

    #[test]
    fn test_chain_link_raw_roundtrip() {
        for raw in [0u32, 7, FREESECT, ENDOFCHAIN, FATSECT, DIFSECT] {
            assert_eq!(ChainLink::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(ChainLink::from_raw(5), ChainLink::Next(5));
    }

    #[test]
    fn test_read_chain() {
        let (table, _) = table_with(&[
            ChainLink::Next(3),
            ChainLink::EndOfChain,
            ChainLink::Next(2),
        ]);
        assert_eq!(table.read_chain(1).unwrap(), vec![1, 3, 2]);
        assert!(table.read_chain(ENDOFCHAIN).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let (table, _) = table_with(&[
            ChainLink::Next(2),
            ChainLink::Next(3),
            ChainLink::Next(1),
        ]);
        match table.read_chain(1) {
            Err(OleError::CyclicChain { table, sector }) => {
                assert_eq!(table, "FAT");
                assert_eq!(sector, 1);
            },
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_chain_into_free_sector_is_corrupt() {
        let (table, _) = table_with(&[ChainLink::Next(2), ChainLink::Unused]);
        assert!(table.read_chain(1).unwrap_err().is_malformed());
        assert!(table.read_chain(40).unwrap_err().is_malformed());
    }

    #[test]
    fn test_free_chain_leaves_table_untouched_on_cycle() {
        let (mut table, _) = table_with(&[ChainLink::Next(2), ChainLink::Next(1)]);
        assert!(table.free_chain(1).is_err());
        assert_eq!(table.link(1).unwrap(), ChainLink::Next(2));
    }

    #[test]
    fn test_next_free_prefers_lowest_unused() {
        let (mut table, mut buf) = table_with(&[
            ChainLink::EndOfChain,
            ChainLink::Unused,
            ChainLink::Unused,
        ]);
        assert_eq!(table.next_free_sector(&mut buf, 1).unwrap(), 2);
        assert_eq!(buf.generation(), 0);
    }

    #[test]
    fn test_growth_when_full() {
        let (mut table, mut buf) = table_with(&[ChainLink::EndOfChain]);
        let sector = table.append(&mut buf, Some(1), 4).unwrap();
        assert_eq!(sector, 2);
        assert_eq!(buf.sector_count(), 6);
        assert_eq!(table.len(), 6);
        assert_eq!(buf.generation(), 1);
        assert_eq!(table.read_chain(1).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_growth_allocates_table_sector() {
        // One table sector describes 128 sectors; fill all of them
        let rest = vec![ChainLink::EndOfChain; ENTRIES_PER_SECTOR - 1];
        let (mut table, mut buf) = table_with(&rest);
        let sector = table.append(&mut buf, None, 1).unwrap();

        assert_eq!(table.table_sectors().len(), 2);
        let second = table.table_sectors()[1];
        assert_eq!(table.link(second).unwrap(), ChainLink::Special);
        assert_ne!(sector, second);
        assert_eq!(table.link(sector).unwrap(), ChainLink::EndOfChain);
        assert_eq!(table.len(), buf.sector_count());
        // The first step of one sector went to the new table sector
        assert_eq!(buf.generation(), 2);
        assert_eq!(table.len(), ENTRIES_PER_SECTOR + 2);
    }

    #[test]
    fn test_capacity_exhausted_at_header_limit() {
        let mut links = vec![ChainLink::EndOfChain; MAX_HEADER_FAT_SECTORS * ENTRIES_PER_SECTOR];
        let table_sectors: Vec<u32> = (0..MAX_HEADER_FAT_SECTORS as u32).collect();
        for &s in &table_sectors {
            links[s as usize] = ChainLink::Special;
        }
        let sectors = links.len();
        let mut table = SectorTable::from_links(links, table_sectors);
        let mut buf = ContainerBuffer::new(vec![0u8; (sectors + 1) * SECTOR_SIZE]);

        let err = table.next_free_sector(&mut buf, 1).unwrap_err();
        assert_eq!(err.kind(), crate::ole::ErrorKind::Capacity);
        // Nothing was grown or corrupted
        assert_eq!(buf.sector_count(), sectors);
        assert_eq!(table.len(), sectors);
        assert_eq!(buf.generation(), 0);
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let (mut table, mut buf) = table_with(&[ChainLink::Next(2), ChainLink::EndOfChain]);
        table.append(&mut buf, Some(2), 1).unwrap();
        table.store(&mut buf).unwrap();

        let loaded = SectorTable::load(&mut buf, false).unwrap();
        assert_eq!(loaded.links(), table.links());
        assert_eq!(loaded.table_sectors(), &[0]);
        assert_eq!(loaded.read_chain(1).unwrap(), vec![1, 2, 3]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_freed_sectors_are_reallocated(lens in prop::collection::vec(1usize..6, 1..8), pick in 0usize..8) {
            let mut table = SectorTable::with_first_table_sector();
            let mut buf = ContainerBuffer::new(vec![0u8; 2 * SECTOR_SIZE]);

            let mut starts = Vec::new();
            for len in &lens {
                let mut last = None;
                let mut start = None;
                for _ in 0..*len {
                    let sector = table.append(&mut buf, last, 1).unwrap();
                    start.get_or_insert(sector);
                    last = Some(sector);
                }
                starts.push(start.unwrap());
            }
            prop_assert!(!table.links().contains(&ChainLink::Unused));

            let victim = starts[pick % starts.len()];
            let chain = table.read_chain(victim).unwrap();
            let freed = table.free_chain(victim).unwrap();
            prop_assert_eq!(&freed, &chain);

            let mut reallocated: Vec<u32> = (0..freed.len())
                .map(|_| table.append(&mut buf, None, 1).unwrap())
                .collect();
            let mut expected = freed.clone();
            reallocated.sort_unstable();
            expected.sort_unstable();
            prop_assert_eq!(reallocated, expected);
            prop_assert!(!table.links().contains(&ChainLink::Unused));
        }
    }
}
