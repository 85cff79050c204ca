//! Cluster chains: the singly-linked lists kept in the on-disk link table.
//!
//! Chains are materialized into a fresh `Vec<u32>` on every walk and never
//! cached; the link table on disk is the only source of truth.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::block_dev::BlockDev;
use crate::error::FsError;
use crate::layout::{self, LINKS_PER_SECTOR};
use crate::volume::Volume;

pub const FREE_CLUSTER:     u32 = 0;
pub const RESERVED_CLUSTER: u32 = 1;
pub const END_OF_CHAIN:     u32 = 0xFFFF_FFFF;

/// Low 28 bits at or above this value also terminate a chain (standard FAT32 EOC range).
const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8;

/// Decoded link-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Free,
    Reserved,
    End,
    Next(u32),
}

impl Link {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            FREE_CLUSTER => Link::Free,
            RESERVED_CLUSTER => Link::Reserved,
            v if v & 0x0FFF_FFFF >= FAT32_EOC_MIN => Link::End,
            v => Link::Next(v),
        }
    }
}

impl<D: BlockDev> Volume<'_, D> {
    pub(crate) fn cluster_to_lba(&self, cluster: u32) -> u64 {
        self.part.data_begin() + self.part.sectors_per_cluster as u64 * (cluster as u64 - 2)
    }

    /// One past the highest valid cluster index.
    fn cluster_limit(&self) -> u32 {
        self.part.cluster_count() + 2
    }

    fn link_location(&self, cluster: u32) -> (u64, usize) {
        let sector = cluster / LINKS_PER_SECTOR;
        (self.part.fat_begin() + sector as u64, (cluster % LINKS_PER_SECTOR) as usize)
    }

    pub(crate) fn read_link(&mut self, cluster: u32) -> Result<u32, FsError> {
        let (lba, index) = self.link_location(cluster);
        let sec = self.read_sector(lba)?;
        Ok(layout::read_link(&sec, index))
    }

    /// Read-modify-write the slot of `cluster` in both link-table copies.
    pub(crate) fn write_link(&mut self, cluster: u32, value: u32) -> Result<(), FsError> {
        let (lba, index) = self.link_location(cluster);
        for copy in [lba, lba + self.part.fat_sectors as u64] {
            let mut sec = self.read_sector(copy)?;
            layout::write_link(&mut sec, index, value);
            self.write_sector(copy, &sec)?;
        }
        Ok(())
    }

    /// Clusters of the chain starting at `first`, in order.
    ///
    /// A link that points below cluster 2, past the data region, or back to a
    /// cluster already in the chain is corruption: the walk stops there and
    /// returns what it has.
    pub(crate) fn walk_chain(&mut self, first: u32) -> Result<Vec<u32>, FsError> {
        let mut chain = Vec::new();
        let limit = self.cluster_limit();
        if first < 2 {
            return Ok(chain);
        }
        if first >= limit {
            log::warn!("chain start {first} lies past the data region, ignored");
            return Ok(chain);
        }
        let mut seen = BTreeSet::new();
        let mut cur = first;
        loop {
            chain.push(cur);
            seen.insert(cur);
            match Link::from_raw(self.read_link(cur)?) {
                Link::End => break,
                Link::Next(next) if seen.contains(&next) => {
                    log::warn!("chain from cluster {first} loops back to {next}, truncated at {cur}");
                    break;
                }
                Link::Next(next) if next < limit => cur = next,
                other => {
                    log::warn!("corrupt link {cur} -> {other:?} in chain from cluster {first}, truncated");
                    break;
                }
            }
        }
        Ok(chain)
    }

    /// First free cluster in the data region.
    pub(crate) fn find_free_cluster(&mut self) -> Result<u32, FsError> {
        let limit = self.cluster_limit();
        for fat_sec in 0..self.part.fat_sectors {
            let base = fat_sec * LINKS_PER_SECTOR;
            if base >= limit { break; }
            let sec = self.read_sector(self.part.fat_begin() + fat_sec as u64)?;
            for i in 0..LINKS_PER_SECTOR {
                let cluster = base + i;
                if cluster < 2 { continue; }
                if cluster >= limit { break; }
                if layout::read_link(&sec, i as usize) == FREE_CLUSTER {
                    return Ok(cluster);
                }
            }
        }
        Err(FsError::NoSpace)
    }

    /// Take one free cluster and make it a one-cluster chain.
    pub(crate) fn alloc_cluster(&mut self) -> Result<u32, FsError> {
        let cluster = self.find_free_cluster()?;
        self.write_link(cluster, END_OF_CHAIN)?;
        Ok(cluster)
    }

    /// Append `extra` freshly allocated clusters to the chain at `first` and
    /// return the new tail.
    ///
    /// Clusters already appended stay in the chain if a later allocation
    /// fails; the chain is terminated after every step.
    pub(crate) fn grow_chain(&mut self, first: u32, extra: u32) -> Result<u32, FsError> {
        let Some(&tail) = self.walk_chain(first)?.last() else {
            return Err(FsError::InvalidLayout);
        };
        let mut tail = tail;
        for _ in 0..extra {
            let next = self.alloc_cluster()?;
            self.write_link(tail, next)?;
            tail = next;
        }
        log::debug!("chain {first}: grown by {extra}, tail now {tail}");
        Ok(tail)
    }

    /// Drop the last `remove` clusters of the chain at `first`.
    pub(crate) fn shrink_chain(&mut self, first: u32, remove: u32) -> Result<(), FsError> {
        let chain = self.walk_chain(first)?;
        if remove as usize >= chain.len() {
            return Err(FsError::ShrinkToZero);
        }
        let keep = chain.len() - remove as usize;
        for &cluster in &chain[keep..] {
            self.write_link(cluster, FREE_CLUSTER)?;
        }
        self.write_link(chain[keep - 1], END_OF_CHAIN)?;
        log::debug!("chain {first}: shrunk by {remove} to {keep}");
        Ok(())
    }

    /// Release every cluster of the chain at `first`.
    pub(crate) fn free_chain(&mut self, first: u32) -> Result<(), FsError> {
        for cluster in self.walk_chain(first)? {
            self.write_link(cluster, FREE_CLUSTER)?;
        }
        Ok(())
    }

    /// Allocate a new chain of `len` clusters (at least one) and return its head.
    pub(crate) fn alloc_chain(&mut self, len: u32) -> Result<u32, FsError> {
        let first = self.alloc_cluster()?;
        if len > 1 {
            self.grow_chain(first, len - 1)?;
        }
        Ok(first)
    }

    /// Fill every sector of `cluster` with zeros.
    pub(crate) fn zero_cluster(&mut self, cluster: u32) -> Result<(), FsError> {
        let lba = self.cluster_to_lba(cluster);
        let zero = [0u8; crate::SECTOR_SIZE];
        for s in 0..self.part.sectors_per_cluster as u64 {
            self.write_sector(lba + s, &zero)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{self, FormatOptions};
    use crate::test_disk::MemDisk;
    use crate::volume::{Partition, scan_drive};

    /// 2 MiB volume, one sector per cluster.
    fn small_volume(spc: u8) -> (MemDisk, Partition) {
        let mut disk = MemDisk::blank(2 * 1024 * 1024);
        format::format_volume(&mut disk, 0, 0, 4096, &FormatOptions::new().sectors_per_cluster(spc)).unwrap();
        let part = scan_drive(&mut disk, 0).unwrap()[0];
        (disk, part)
    }

    #[test]
    fn link_decoding() {
        assert_eq!(Link::from_raw(0), Link::Free);
        assert_eq!(Link::from_raw(1), Link::Reserved);
        assert_eq!(Link::from_raw(END_OF_CHAIN), Link::End);
        assert_eq!(Link::from_raw(0x0FFF_FFFF), Link::End);
        assert_eq!(Link::from_raw(7), Link::Next(7));
    }

    #[test]
    fn cluster_to_lba_matches_layout() {
        let (mut disk, part) = small_volume(4);
        let vol = Volume::new(&mut disk, part);
        let expected = part.lba_begin + part.reserved_sectors as u64 + 2 * part.fat_sectors as u64;
        assert_eq!(vol.cluster_to_lba(2), expected);
        assert_eq!(vol.cluster_to_lba(5), expected + 12);
    }

    #[test]
    fn root_cluster_is_allocated_after_format() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        assert_eq!(vol.read_link(2).unwrap(), END_OF_CHAIN);
        assert_eq!(vol.find_free_cluster().unwrap(), 3);
    }

    #[test]
    fn grow_then_walk() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(1).unwrap();
        vol.grow_chain(first, 3).unwrap();
        let chain = vol.walk_chain(first).unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0], first);
        assert_eq!(vol.read_link(*chain.last().unwrap()).unwrap(), END_OF_CHAIN);
    }

    #[test]
    fn link_writes_are_mirrored() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        vol.write_link(200, 201).unwrap();
        let (lba, index) = vol.link_location(200);
        let primary = vol.read_sector(lba).unwrap();
        let mirror = vol.read_sector(lba + part.fat_sectors as u64).unwrap();
        assert_eq!(layout::read_link(&primary, index), 201);
        assert_eq!(layout::read_link(&mirror, index), 201);
    }

    #[test]
    fn shrink_frees_tail() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(5).unwrap();
        let before = vol.walk_chain(first).unwrap();
        vol.shrink_chain(first, 3).unwrap();
        assert_eq!(vol.walk_chain(first).unwrap(), &before[..2]);
        for &c in &before[2..] {
            assert_eq!(vol.read_link(c).unwrap(), FREE_CLUSTER);
        }
        assert_eq!(vol.read_link(before[1]).unwrap(), END_OF_CHAIN);
    }

    #[test]
    fn shrink_to_zero_refused() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(2).unwrap();
        assert_eq!(vol.shrink_chain(first, 2), Err(FsError::ShrinkToZero));
        assert_eq!(vol.walk_chain(first).unwrap().len(), 2);
    }

    #[test]
    fn pointer_to_reserved_cluster_truncates_walk() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(4).unwrap();
        let chain = vol.walk_chain(first).unwrap();
        vol.write_link(chain[1], RESERVED_CLUSTER).unwrap();
        assert_eq!(vol.walk_chain(first).unwrap(), &chain[..2]);
    }

    #[test]
    fn cyclic_chain_terminates() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(3).unwrap();
        let chain = vol.walk_chain(first).unwrap();
        vol.write_link(chain[2], first).unwrap();
        assert_eq!(vol.walk_chain(first).unwrap(), chain);

        let pair = vol.alloc_chain(2).unwrap();
        let two = vol.walk_chain(pair).unwrap();
        vol.write_link(two[1], two[1]).unwrap();
        assert_eq!(vol.walk_chain(pair).unwrap(), two);
    }

    #[test]
    fn allocation_exhaustion_keeps_partial_growth() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let total = part.cluster_count();
        // Root holds cluster 2; everything else is free.
        let first = vol.alloc_chain(1).unwrap();
        assert_eq!(vol.grow_chain(first, total), Err(FsError::NoSpace));
        assert_eq!(vol.walk_chain(first).unwrap().len() as u32, total - 1);
        assert_eq!(vol.find_free_cluster(), Err(FsError::NoSpace));
    }

    #[test]
    fn free_chain_releases_all() {
        let (mut disk, part) = small_volume(1);
        let mut vol = Volume::new(&mut disk, part);
        let first = vol.alloc_chain(3).unwrap();
        let chain = vol.walk_chain(first).unwrap();
        vol.free_chain(first).unwrap();
        for c in chain {
            assert_eq!(vol.read_link(c).unwrap(), FREE_CLUSTER);
        }
    }
}
