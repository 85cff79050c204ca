//! The engine's public face: one block device plus the partitions mounted
//! from it.
//!
//! Every call names a partition index and, where paths are involved, a base
//! directory cluster (`0` = root). Nothing is cached between calls.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::block_dev::BlockDev;
use crate::chain::Link;
use crate::dir_entry::Attributes;
use crate::error::FsError;
use crate::file::FileHandle;
use crate::volume::{Partition, Volume, VolumeTable, scan_drive};

pub struct FilesystemContext<D> {
    dev:   D,
    table: VolumeTable,
}

impl<D: BlockDev> FilesystemContext<D> {
    pub fn new(dev: D) -> Self {
        Self { dev, table: VolumeTable::new() }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    pub fn into_device(self) -> D {
        self.dev
    }

    fn volume(&mut self, part: usize) -> Result<Volume<'_, D>, FsError> {
        let p = *self.table.get(part)?;
        Ok(Volume::new(&mut self.dev, p))
    }

    // ─── Volume table ─────────────────────────────────────────────────────────

    /// Scan `drive` and mount every volume found on it. Returns how many
    /// were added to the volume table.
    ///
    /// If the table fills partway through the drive, the volumes that fit
    /// stay mounted and their count is returned; the rest are skipped with
    /// a warning. `VolumeTableFull` means none of them fit.
    pub fn mount(&mut self, drive: u8) -> Result<usize, FsError> {
        let found = scan_drive(&mut self.dev, drive)?;
        let mut mounted = 0;
        for part in &found {
            match self.table.push(*part) {
                Ok(index) => {
                    log::info!("partition {index}: {part}");
                    mounted += 1;
                }
                Err(e) => {
                    log::warn!(
                        "drive {drive}: volume table full, {} of {} volumes not mounted",
                        found.len() - mounted,
                        found.len(),
                    );
                    if mounted == 0 {
                        return Err(e);
                    }
                    break;
                }
            }
        }
        Ok(mounted)
    }

    pub fn partitions(&self) -> &[Partition] {
        self.table.as_slice()
    }

    pub fn partition(&self, index: usize) -> Result<&Partition, FsError> {
        self.table.get(index)
    }

    /// Human-readable summary of one mounted partition.
    pub fn partition_info(&self, index: usize) -> Result<String, FsError> {
        Ok(self.table.get(index)?.to_string())
    }

    pub fn root_cluster(&self, part: usize) -> Result<u32, FsError> {
        Ok(self.table.get(part)?.root_cluster)
    }

    // ─── Directories ──────────────────────────────────────────────────────────

    pub fn resolve_path(&mut self, part: usize, base: u32, path: &str) -> Result<u32, FsError> {
        self.volume(part)?.resolve_path(base, path)
    }

    pub fn list_directory(&mut self, part: usize, base: u32, path: &str) -> Result<Vec<FileHandle>, FsError> {
        let mut vol = self.volume(part)?;
        let dir = vol.resolve_path(base, path)?;
        Ok(vol
            .list_entries(dir)?
            .iter()
            .map(|(_, e)| FileHandle::from_entry(part, e))
            .collect())
    }

    /// Create directory `path`; returns its cluster.
    pub fn new_directory(&mut self, part: usize, base: u32, path: &str) -> Result<u32, FsError> {
        let mut vol = self.volume(part)?;
        let (dir, name) = vol.extract_path(base, path)?;
        vol.create_directory(dir, &name)
    }

    // ─── Files ────────────────────────────────────────────────────────────────

    pub fn get_file(&mut self, part: usize, base: u32, path: &str) -> Result<FileHandle, FsError> {
        let (_, entry) = self.volume(part)?.get_entry(base, path)?;
        Ok(FileHandle::from_entry(part, &entry))
    }

    /// Whole content of a file. Empty files give an empty buffer.
    pub fn read_file(&mut self, handle: &FileHandle) -> Result<Vec<u8>, FsError> {
        if handle.is_dir() {
            return Err(FsError::IsADirectory);
        }
        self.volume(handle.partition)?.read_data(handle.first_cluster, handle.size)
    }

    /// Create a file of `size` zero bytes.
    pub fn new_file(&mut self, part: usize, base: u32, path: &str, size: u32) -> Result<FileHandle, FsError> {
        let mut vol = self.volume(part)?;
        let (dir, name) = vol.extract_path(base, path)?;
        let (_, entry) = vol.create_entry(dir, &name, Attributes::ARCHIVE, size)?;
        Ok(FileHandle::from_entry(part, &entry))
    }

    /// Replace (or create) the file at `path` with `data`.
    pub fn write_file(&mut self, part: usize, base: u32, path: &str, data: &[u8]) -> Result<FileHandle, FsError> {
        let mut vol = self.volume(part)?;
        let (dir, name) = vol.extract_path(base, path)?;
        let entry = vol.write_file(dir, &name, data)?;
        Ok(FileHandle::from_entry(part, &entry))
    }

    pub fn delete_entry(&mut self, part: usize, base: u32, path: &str) -> Result<(), FsError> {
        self.volume(part)?.delete_entry(base, path)
    }

    pub fn rename_entry(&mut self, part: usize, base: u32, path: &str, new_name: &str) -> Result<(), FsError> {
        self.volume(part)?.rename_entry(base, path, new_name)
    }

    // ─── Inspection ───────────────────────────────────────────────────────────

    /// Clusters holding `handle`'s content, in order.
    pub fn chain_of(&mut self, handle: &FileHandle) -> Result<Vec<u32>, FsError> {
        self.volume(handle.partition)?.walk_chain(handle.first_cluster)
    }

    /// Raw link-table value stored for `cluster`.
    pub fn link_entry(&mut self, part: usize, cluster: u32) -> Result<u32, FsError> {
        let mut vol = self.volume(part)?;
        if cluster >= vol.part.cluster_count() + 2 {
            return Err(FsError::InvalidLayout);
        }
        vol.read_link(cluster)
    }

    /// [`link_entry`](Self::link_entry), decoded.
    pub fn link(&mut self, part: usize, cluster: u32) -> Result<Link, FsError> {
        self.link_entry(part, cluster).map(Link::from_raw)
    }
}
