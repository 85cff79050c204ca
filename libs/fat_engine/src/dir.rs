//! Directory engine: slot iteration, lookup, insertion and path resolution.
//!
//! A directory is the cluster chain starting at its first cluster; its
//! 32-byte slots are visited cluster by cluster, sector by sector. The
//! first slot whose name starts with [`END_MARK`] ends the directory.

use alloc::string::String;
use alloc::vec::Vec;
use core::ops::ControlFlow;

use crate::block_dev::BlockDev;
use crate::dir_entry::{
    Attributes, DELETED_MARK, DIR_ENTRY_SIZE, DirEntry, END_MARK, ENTRIES_PER_SECTOR, names_match, short_name,
};
use crate::error::FsError;
use crate::volume::Volume;

/// Location of one directory slot on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSlot {
    pub lba:   u64,
    pub index: usize,
}

impl DirSlot {
    fn range(&self) -> core::ops::Range<usize> {
        self.index * DIR_ENTRY_SIZE..(self.index + 1) * DIR_ENTRY_SIZE
    }
}

impl<D: BlockDev> Volume<'_, D> {
    /// `0` names the root directory.
    pub(crate) fn dir_cluster(&self, cluster: u32) -> u32 {
        if cluster == 0 { self.part.root_cluster } else { cluster }
    }

    /// Visit every slot of directory `dir` up to and including the end
    /// marker. Returns the value `visit` broke with, if any.
    pub(crate) fn for_each_slot<T>(
        &mut self,
        dir: u32,
        mut visit: impl FnMut(DirSlot, &DirEntry) -> ControlFlow<T>,
    ) -> Result<Option<T>, FsError> {
        let dir = self.dir_cluster(dir);
        for cluster in self.walk_chain(dir)? {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.part.sectors_per_cluster as u64 {
                let sec = self.read_sector(lba + s)?;
                for index in 0..ENTRIES_PER_SECTOR {
                    let slot = DirSlot { lba: lba + s, index };
                    let entry = DirEntry::parse(&sec[slot.range()]);
                    if let ControlFlow::Break(v) = visit(slot, &entry) {
                        return Ok(Some(v));
                    }
                    if entry.is_end() {
                        return Ok(None);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Read-modify-write the slot, keeping its timestamp bytes.
    pub(crate) fn write_entry(&mut self, slot: DirSlot, entry: &DirEntry) -> Result<(), FsError> {
        let mut sec = self.read_sector(slot.lba)?;
        entry.write_to(&mut sec[slot.range()]);
        self.write_sector(slot.lba, &sec)
    }

    /// Store a fresh entry: the whole 32-byte slot is rewritten.
    pub(crate) fn write_new_entry(&mut self, slot: DirSlot, entry: &DirEntry) -> Result<(), FsError> {
        let mut sec = self.read_sector(slot.lba)?;
        let raw = &mut sec[slot.range()];
        raw.fill(0);
        entry.write_to(raw);
        self.write_sector(slot.lba, &sec)
    }

    fn set_first_byte(&mut self, slot: DirSlot, mark: u8) -> Result<(), FsError> {
        let mut sec = self.read_sector(slot.lba)?;
        sec[slot.index * DIR_ENTRY_SIZE] = mark;
        self.write_sector(slot.lba, &sec)
    }

    pub(crate) fn mark_deleted(&mut self, slot: DirSlot) -> Result<(), FsError> {
        self.set_first_byte(slot, DELETED_MARK)
    }

    /// First live entry in `dir` named `name` whose attributes satisfy
    /// `attributes & mask == value`.
    ///
    /// A query that is a valid 8.3 name is compared in its stored 11-byte
    /// form, so `a.` and `a` name the same entry. Anything else can only
    /// match by display name.
    pub(crate) fn find_entry(
        &mut self,
        dir: u32,
        name: &str,
        mask: Attributes,
        value: Attributes,
    ) -> Result<Option<(DirSlot, DirEntry)>, FsError> {
        let stored = short_name(name).ok();
        self.for_each_slot(dir, |slot, e| {
            let named = match &stored {
                Some(raw) => e.name.eq_ignore_ascii_case(raw),
                None => names_match(&e.display_name(), name),
            };
            if e.is_live() && e.attributes & mask == value && named {
                ControlFlow::Break((slot, *e))
            } else {
                ControlFlow::Continue(())
            }
        })
    }

    pub(crate) fn find_any(&mut self, dir: u32, name: &str) -> Result<Option<(DirSlot, DirEntry)>, FsError> {
        self.find_entry(dir, name, Attributes::empty(), Attributes::empty())
    }

    /// A slot in `dir` that can take a new entry.
    ///
    /// Deleted slots are reused first. Otherwise the end-marker slot is
    /// handed out and the marker moves one slot further; a directory whose
    /// chain is physically full first grows by one zeroed cluster.
    pub(crate) fn find_free_slot(&mut self, dir: u32) -> Result<DirSlot, FsError> {
        let dir = self.dir_cluster(dir);
        loop {
            let found = self.for_each_slot(dir, |slot, e| {
                if e.is_deleted() || e.is_end() {
                    ControlFlow::Break((slot, e.is_deleted()))
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            let end = match found {
                Some((slot, true)) => return Ok(slot),
                Some((slot, false)) => slot,
                None => {
                    // No end marker at all: the fresh cluster supplies one.
                    self.grow_dir(dir)?;
                    continue;
                }
            };
            if end == self.last_slot_of(dir)? {
                self.grow_dir(dir)?;
            } else {
                let next = self.slot_after(dir, end)?;
                self.set_first_byte(next, END_MARK)?;
            }
            return Ok(end);
        }
    }

    fn grow_dir(&mut self, dir: u32) -> Result<(), FsError> {
        let tail = self.grow_chain(dir, 1)?;
        self.zero_cluster(tail)?;
        log::debug!("directory {dir}: grown by cluster {tail}");
        Ok(())
    }

    fn last_slot_of(&mut self, dir: u32) -> Result<DirSlot, FsError> {
        let chain = self.walk_chain(dir)?;
        let tail = *chain.last().ok_or(FsError::InvalidLayout)?;
        let lba = self.cluster_to_lba(tail) + self.part.sectors_per_cluster as u64 - 1;
        Ok(DirSlot { lba, index: ENTRIES_PER_SECTOR - 1 })
    }

    /// The slot following `slot` in directory `dir`, which must exist.
    fn slot_after(&mut self, dir: u32, slot: DirSlot) -> Result<DirSlot, FsError> {
        if slot.index + 1 < ENTRIES_PER_SECTOR {
            return Ok(DirSlot { lba: slot.lba, index: slot.index + 1 });
        }
        let spc = self.part.sectors_per_cluster as u64;
        let chain = self.walk_chain(dir)?;
        for (i, &cluster) in chain.iter().enumerate() {
            let first = self.cluster_to_lba(cluster);
            if (first..first + spc).contains(&slot.lba) {
                if slot.lba + 1 < first + spc {
                    return Ok(DirSlot { lba: slot.lba + 1, index: 0 });
                }
                let next = *chain.get(i + 1).ok_or(FsError::InvalidLayout)?;
                return Ok(DirSlot { lba: self.cluster_to_lba(next), index: 0 });
            }
        }
        Err(FsError::InvalidLayout)
    }

    /// Every live entry of `dir`, including physical `.` and `..`.
    pub(crate) fn list_entries(&mut self, dir: u32) -> Result<Vec<(DirSlot, DirEntry)>, FsError> {
        let mut out = Vec::new();
        self.for_each_slot(dir, |slot, e| {
            if e.is_live() {
                out.push((slot, *e));
            }
            ControlFlow::<()>::Continue(())
        })?;
        Ok(out)
    }

    /// True if `dir` holds nothing but `.` and `..`.
    pub(crate) fn is_empty_dir(&mut self, dir: u32) -> Result<bool, FsError> {
        let found = self.for_each_slot(dir, |_, e| {
            if e.is_live() && !e.is_dot() { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        })?;
        Ok(found.is_none())
    }

    /// Cluster of the directory named by `path`, relative to `base` unless
    /// `path` is absolute.
    ///
    /// The root has no physical `.`/`..` entries, so a `.` or `..` that does
    /// not resolve stays at the root. Any other missing component fails the
    /// whole lookup.
    pub(crate) fn resolve_path(&mut self, base: u32, path: &str) -> Result<u32, FsError> {
        let root = self.part.root_cluster;
        let mut cur = if path.starts_with('/') { root } else { self.dir_cluster(base) };
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            match self.find_entry(cur, comp, Attributes::DIRECTORY, Attributes::DIRECTORY)? {
                Some((_, e)) => cur = self.dir_cluster(e.first_cluster),
                None if comp == "." || comp == ".." => cur = root,
                None => {
                    return Err(match self.find_any(cur, comp)? {
                        Some(_) => FsError::NotADirectory,
                        None => FsError::NotFound,
                    });
                }
            }
        }
        Ok(cur)
    }

    /// Split `path` into (parent directory cluster, lower-cased final name).
    pub(crate) fn extract_path(&mut self, base: u32, path: &str) -> Result<(u32, String), FsError> {
        let (dir, name) = match path.rfind('/') {
            Some(i) => (&path[..=i], &path[i + 1..]),
            None => ("", path),
        };
        if name.is_empty() {
            return Err(FsError::EmptyName);
        }
        let dir = self.resolve_path(base, dir)?;
        Ok((dir, name.to_ascii_lowercase()))
    }
}
