//! File engine: content I/O and entry lifecycle (create, resize, delete, rename).

use alloc::string::String;
use alloc::vec::Vec;

use crate::block_dev::{BlockDev, SECTOR_SIZE};
use crate::dir::DirSlot;
use crate::dir_entry::{Attributes, DIR_ENTRY_SIZE, DirEntry, short_name};
use crate::error::FsError;
use crate::volume::Volume;

/// Logical size recorded for a new directory: `.`, `..` and the end marker.
pub const NEW_DIR_SIZE: u32 = 3 * DIR_ENTRY_SIZE as u32;

/// A file or directory as seen through one lookup. Not kept in sync with
/// the disk: every lookup builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name:          String,
    pub partition:     usize,
    pub attributes:    Attributes,
    pub first_cluster: u32,
    pub size:          u32,
}

impl FileHandle {
    pub fn from_entry(partition: usize, entry: &DirEntry) -> Self {
        Self {
            name: entry.display_name(),
            partition,
            attributes: entry.attributes,
            first_cluster: entry.first_cluster,
            size: entry.size,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}

impl<D: BlockDev> Volume<'_, D> {
    /// Look up the entry `path` names.
    pub(crate) fn get_entry(&mut self, base: u32, path: &str) -> Result<(DirSlot, DirEntry), FsError> {
        let (dir, name) = self.extract_path(base, path)?;
        self.find_any(dir, &name)?.ok_or(FsError::NotFound)
    }

    /// The first `size` bytes stored in the chain at `first`.
    pub(crate) fn read_data(&mut self, first: u32, size: u32) -> Result<Vec<u8>, FsError> {
        let total = size as usize;
        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return Ok(out);
        }
        'chain: for cluster in self.walk_chain(first)? {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.part.sectors_per_cluster as u64 {
                let sec = self.read_sector(lba + s)?;
                let n = (total - out.len()).min(SECTOR_SIZE);
                out.extend_from_slice(&sec[..n]);
                if out.len() == total {
                    break 'chain;
                }
            }
        }
        if out.len() < total {
            log::warn!("chain at {first} holds {} of {total} bytes, returning short read", out.len());
        }
        Ok(out)
    }

    /// Overwrite the chain at `first` with `data`, zero-padding the last sector.
    fn write_data(&mut self, first: u32, data: &[u8]) -> Result<(), FsError> {
        let mut rest = data;
        'chain: for cluster in self.walk_chain(first)? {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.part.sectors_per_cluster as u64 {
                if rest.is_empty() {
                    break 'chain;
                }
                let mut sec = [0u8; SECTOR_SIZE];
                let n = rest.len().min(SECTOR_SIZE);
                sec[..n].copy_from_slice(&rest[..n]);
                self.write_sector(lba + s, &sec)?;
                rest = &rest[n..];
            }
        }
        if rest.is_empty() { Ok(()) } else { Err(FsError::InvalidLayout) }
    }

    /// Clusters a chain needs for `size` bytes. Never zero: an empty file
    /// still owns one terminated cluster.
    fn chain_len_for(&self, size: u32) -> u32 {
        self.part.clusters_for(size).max(1)
    }

    /// Allocate a zero-filled chain for `size` bytes and record `name` in `dir`.
    ///
    /// The chain is allocated before the directory slot is claimed; if the
    /// slot cannot be found the clusters stay allocated.
    pub(crate) fn create_entry(
        &mut self,
        dir: u32,
        name: &str,
        attributes: Attributes,
        size: u32,
    ) -> Result<(DirSlot, DirEntry), FsError> {
        let short = short_name(name)?;
        if self.find_any(dir, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        let len = self.chain_len_for(size);
        let first = self.alloc_chain(len)?;
        for cluster in self.walk_chain(first)? {
            self.zero_cluster(cluster)?;
        }
        let slot = self.find_free_slot(dir)?;
        let entry = DirEntry::new(short, attributes, first, size);
        self.write_new_entry(slot, &entry)?;
        log::debug!("created '{name}' in dir {}: cluster {first}, {size} bytes", self.dir_cluster(dir));
        Ok((slot, entry))
    }

    /// Create directory `name` in `parent` with its `.` and `..` entries.
    /// Returns the new directory's cluster.
    pub(crate) fn create_directory(&mut self, parent: u32, name: &str) -> Result<u32, FsError> {
        if name == "." || name == ".." {
            return Err(FsError::AlreadyExists);
        }
        let parent = self.dir_cluster(parent);
        let (_, entry) = self.create_entry(parent, name, Attributes::DIRECTORY, NEW_DIR_SIZE)?;
        let me = entry.first_cluster;
        let up = if parent == self.part.root_cluster { 0 } else { parent };

        let lba = self.cluster_to_lba(me);
        let mut sec = self.read_sector(lba)?;
        DirEntry::new(*b".          ", Attributes::DIRECTORY, me, 0).write_to(&mut sec[..DIR_ENTRY_SIZE]);
        DirEntry::new(*b"..         ", Attributes::DIRECTORY, up, 0)
            .write_to(&mut sec[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE]);
        self.write_sector(lba, &sec)?;
        Ok(me)
    }

    /// Replace the content of `name` in `dir` with `data`, creating the file
    /// if needed.
    ///
    /// The chain grows before the size field changes and shrinks after it,
    /// so the recorded size never exceeds what the chain can hold.
    pub(crate) fn write_file(&mut self, dir: u32, name: &str, data: &[u8]) -> Result<DirEntry, FsError> {
        let size = u32::try_from(data.len()).map_err(|_| FsError::NoSpace)?;
        let entry = match self.find_any(dir, name)? {
            Some((_, e)) if e.is_dir() => return Err(FsError::IsADirectory),
            Some((slot, mut e)) => {
                let new_len = self.chain_len_for(size);
                if e.first_cluster < 2 {
                    // Empty file written by another implementation: no chain yet.
                    e.first_cluster = self.alloc_chain(new_len)?;
                    e.size = size;
                    self.write_entry(slot, &e)?;
                } else {
                    let old_len = self.walk_chain(e.first_cluster)?.len() as u32;
                    e.size = size;
                    if new_len > old_len {
                        self.grow_chain(e.first_cluster, new_len - old_len)?;
                        self.write_entry(slot, &e)?;
                    } else {
                        self.write_entry(slot, &e)?;
                        if new_len < old_len {
                            self.shrink_chain(e.first_cluster, old_len - new_len)?;
                        }
                    }
                }
                e
            }
            None => self.create_entry(dir, name, Attributes::ARCHIVE, size)?.1,
        };
        self.write_data(entry.first_cluster, data)?;
        log::debug!("wrote {size} bytes to '{name}' (cluster {})", entry.first_cluster);
        Ok(entry)
    }

    /// Remove the entry `path` names and release its chain.
    pub(crate) fn delete_entry(&mut self, base: u32, path: &str) -> Result<(), FsError> {
        let (slot, entry) = self.get_entry(base, path)?;
        if entry.is_dot() {
            return Err(FsError::InvalidName);
        }
        if entry.is_dir() && !self.is_empty_dir(entry.first_cluster)? {
            return Err(FsError::DirectoryNotEmpty);
        }
        self.mark_deleted(slot)?;
        if entry.first_cluster >= 2 {
            self.free_chain(entry.first_cluster)?;
        }
        log::debug!("deleted '{}' (cluster {})", entry.display_name(), entry.first_cluster);
        Ok(())
    }

    /// Give the entry `path` names the name `new_name`, in the same directory.
    pub(crate) fn rename_entry(&mut self, base: u32, path: &str, new_name: &str) -> Result<(), FsError> {
        let (dir, name) = self.extract_path(base, path)?;
        let (slot, mut entry) = self.find_any(dir, &name)?.ok_or(FsError::NotFound)?;
        let short = short_name(new_name)?;
        if entry.is_dot() || new_name == "." || new_name == ".." {
            return Err(FsError::InvalidName);
        }
        if self.find_any(dir, new_name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        entry.name = short;
        self.write_entry(slot, &entry)
    }
}
