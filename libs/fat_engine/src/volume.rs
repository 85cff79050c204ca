//! Volume discovery and the table of mounted partitions.

use alloc::vec::Vec;
use core::fmt;

use crate::block_dev::{BlockDev, SECTOR_SIZE, Sector};
use crate::error::FsError;
use crate::layout::{BootRecord, LINKS_PER_SECTOR, VolumeIdSector};

pub const MAX_PARTITIONS: usize = 16;

/// Where a drive without a usable partition table may carry its volume.
const PARTITIONLESS_PROBE_LBAS: [u64; 2] = [0, 1];

// ─── Partition ────────────────────────────────────────────────────────────────

/// Layout of one mounted volume. All sector numbers are absolute LBAs on `drive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub drive:               u8,
    pub lba_begin:           u64,
    pub sector_count:        u64,
    pub sectors_per_cluster: u32,
    pub reserved_sectors:    u32,
    pub fat_sectors:         u32,
    pub root_cluster:        u32,
    pub volume_id:           u32,
    pub oem_name:            [u8; 8],
    pub volume_label:        [u8; 11],
    pub fs_type:             [u8; 8],
}

impl Partition {
    /// Build a partition from a validated volume-identifier sector found at
    /// `lba_begin`. `slot_sectors` is the size recorded in the partition
    /// table, if the volume was found through one.
    pub fn from_volume_id(
        drive: u8,
        lba_begin: u64,
        slot_sectors: Option<u64>,
        vid: &VolumeIdSector,
    ) -> Result<Self, FsError> {
        // Only the 32-bit link table layout is supported.
        if vid.sectors_per_cluster == 0 || vid.fat_sectors_16 != 0 || vid.fat_sectors == 0 {
            return Err(FsError::InvalidLayout);
        }
        let declared = vid.total_sectors as u64;
        let sector_count = match slot_sectors {
            Some(n) if declared != 0 => n.min(declared),
            Some(n) => n,
            None => declared,
        };

        let part = Self {
            drive,
            lba_begin,
            sector_count,
            sectors_per_cluster: vid.sectors_per_cluster as u32,
            reserved_sectors: vid.reserved_sectors as u32,
            fat_sectors: vid.fat_sectors,
            root_cluster: vid.root_cluster,
            volume_id: vid.volume_id,
            oem_name: vid.oem_name,
            volume_label: vid.volume_label,
            fs_type: vid.fs_type,
        };

        let meta = part.reserved_sectors as u64 + 2 * part.fat_sectors as u64;
        if sector_count < meta + part.sectors_per_cluster as u64 {
            return Err(FsError::InvalidLayout);
        }
        if part.root_cluster < 2 || part.root_cluster >= part.cluster_count() + 2 {
            return Err(FsError::InvalidLayout);
        }
        Ok(part)
    }

    /// First sector of the primary link table.
    pub fn fat_begin(&self) -> u64 {
        self.lba_begin + self.reserved_sectors as u64
    }

    /// First sector of cluster 2.
    pub fn data_begin(&self) -> u64 {
        self.fat_begin() + 2 * self.fat_sectors as u64
    }

    /// Number of addressable data clusters, bounded both by the sectors
    /// behind the link tables and by the link table's own capacity.
    pub fn cluster_count(&self) -> u32 {
        let meta = self.reserved_sectors as u64 + 2 * self.fat_sectors as u64;
        let by_data = self.sector_count.saturating_sub(meta) / self.sectors_per_cluster as u64;
        let by_table = (self.fat_sectors as u64 * LINKS_PER_SECTOR as u64).saturating_sub(2);
        by_data.min(by_table).min(u32::MAX as u64 - 2) as u32
    }

    pub fn cluster_bytes(&self) -> usize {
        self.sectors_per_cluster as usize * SECTOR_SIZE
    }

    /// Clusters needed to hold `size` bytes.
    pub fn clusters_for(&self, size: u32) -> u32 {
        (size as usize).div_ceil(self.cluster_bytes()) as u32
    }

    pub fn label(&self) -> &str {
        trimmed(&self.volume_label)
    }

    pub fn oem(&self) -> &str {
        trimmed(&self.oem_name)
    }

    pub fn fs_type_name(&self) -> &str {
        trimmed(&self.fs_type)
    }
}

fn trimmed(raw: &[u8]) -> &str {
    let end = raw.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |i| i + 1);
    core::str::from_utf8(&raw[..end]).unwrap_or("?")
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.label().is_empty() { "NO NAME" } else { self.label() };
        write!(
            f,
            "drive {} @ LBA {} ({} sectors): label '{}', type '{}', oem '{}', id {:04X}-{:04X}, \
             {} sector(s)/cluster, {} clusters, root cluster {}",
            self.drive,
            self.lba_begin,
            self.sector_count,
            label,
            self.fs_type_name(),
            self.oem(),
            self.volume_id >> 16,
            self.volume_id & 0xFFFF,
            self.sectors_per_cluster,
            self.cluster_count(),
            self.root_cluster,
        )
    }
}

// ─── Volume table ─────────────────────────────────────────────────────────────

/// Bounded list of mounted partitions. Indices are stable: there is no unmount.
#[derive(Debug, Default)]
pub struct VolumeTable {
    partitions: Vec<Partition>,
}

impl VolumeTable {
    pub const fn new() -> Self {
        Self { partitions: Vec::new() }
    }

    /// Append a partition and return its index.
    pub fn push(&mut self, part: Partition) -> Result<usize, FsError> {
        if self.partitions.len() >= MAX_PARTITIONS {
            return Err(FsError::VolumeTableFull);
        }
        self.partitions.push(part);
        Ok(self.partitions.len() - 1)
    }

    pub fn get(&self, index: usize) -> Result<&Partition, FsError> {
        self.partitions.get(index).ok_or(FsError::NoSuchPartition(index))
    }

    pub fn as_slice(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

// ─── Discovery ────────────────────────────────────────────────────────────────

fn probe<D: BlockDev>(dev: &mut D, drive: u8, lba: u64, slot_sectors: Option<u64>) -> Result<Partition, FsError> {
    let mut sec = [0u8; SECTOR_SIZE];
    if !dev.read(drive, lba, &mut sec) {
        return Err(FsError::Io { drive, lba });
    }
    let vid = VolumeIdSector::parse(&sec)?;
    Partition::from_volume_id(drive, lba, slot_sectors, &vid)
}

/// Find every volume on `drive`: first through the partition table in the
/// boot sector, then, if none of its slots holds a valid volume, by probing
/// the drive as partitionless.
pub fn scan_drive<D: BlockDev>(dev: &mut D, drive: u8) -> Result<Vec<Partition>, FsError> {
    let mut boot: Sector = [0u8; SECTOR_SIZE];
    if !dev.read(drive, 0, &mut boot) {
        log::error!("drive {drive}: cannot read boot sector");
        return Err(FsError::Io { drive, lba: 0 });
    }

    let mut found = Vec::new();
    match BootRecord::parse(&boot) {
        Ok(record) => {
            for (i, slot) in record.slots.iter().enumerate().filter(|(_, s)| s.is_used()) {
                match probe(dev, drive, slot.lba_begin as u64, Some(slot.sector_count as u64)) {
                    Ok(part) => found.push(part),
                    Err(e) => log::warn!(
                        "drive {drive}: slot {i} (LBA {}, type {:#04x}) skipped: {e}",
                        slot.lba_begin, slot.type_code,
                    ),
                }
            }
        }
        Err(e) => log::debug!("drive {drive}: boot sector: {e}"),
    }

    if found.is_empty() {
        log::warn!("drive {drive}: no volume in partition table, probing as partitionless");
        for lba in PARTITIONLESS_PROBE_LBAS {
            match probe(dev, drive, lba, None) {
                Ok(part) => {
                    found.push(part);
                    break;
                }
                Err(e) => log::debug!("drive {drive}: no volume at LBA {lba}: {e}"),
            }
        }
    }

    if found.is_empty() {
        log::warn!("drive {drive}: no valid volume found, skipping drive");
        return Err(FsError::NoVolume);
    }
    Ok(found)
}

// ─── Per-call volume view ─────────────────────────────────────────────────────

/// A mounted partition paired with the device it lives on, for the duration
/// of one engine call. Chain, directory and file operations are methods on it.
pub(crate) struct Volume<'d, D> {
    pub(crate) dev:  &'d mut D,
    pub(crate) part: Partition,
}

impl<'d, D: BlockDev> Volume<'d, D> {
    pub(crate) fn new(dev: &'d mut D, part: Partition) -> Self {
        Self { dev, part }
    }

    pub(crate) fn read_sector(&mut self, lba: u64) -> Result<Sector, FsError> {
        let mut sec = [0u8; SECTOR_SIZE];
        if !self.dev.read(self.part.drive, lba, &mut sec) {
            log::trace!("read failed: drive {} LBA {lba}", self.part.drive);
            return Err(FsError::Io { drive: self.part.drive, lba });
        }
        Ok(sec)
    }

    pub(crate) fn write_sector(&mut self, lba: u64, sec: &Sector) -> Result<(), FsError> {
        if !self.dev.write(self.part.drive, lba, sec) {
            log::trace!("write failed: drive {} LBA {lba}", self.part.drive);
            return Err(FsError::Io { drive: self.part.drive, lba });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::ToString;
    use super::*;
    use crate::format::{self, FormatOptions};
    use crate::test_disk::{MemDisk, make_fat32_image};

    #[test]
    fn mount_raw_fat32_image() {
        let mut disk = MemDisk::single(make_fat32_image());
        let parts = scan_drive(&mut disk, 0).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].lba_begin, 0);
        assert_eq!(parts[0].root_cluster, 2);
        assert!(parts[0].cluster_count() >= 65525);
    }

    #[test]
    fn mount_through_partition_table() {
        let mut disk = MemDisk::blank(16 * 1024 * 1024);
        format::write_partition_table(&mut disk, 0, &[(2048, 30720)]).unwrap();
        format::format_volume(&mut disk, 0, 2048, 30720, &FormatOptions::new()).unwrap();
        let parts = scan_drive(&mut disk, 0).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].lba_begin, 2048);
        assert_eq!(parts[0].sector_count, 30720);
        assert_eq!(parts[0].sectors_per_cluster, 1);
    }

    #[test]
    fn mount_two_partitions() {
        let mut disk = MemDisk::blank(8 * 1024 * 1024);
        format::write_partition_table(&mut disk, 0, &[(64, 8000), (8064, 8000)]).unwrap();
        format::format_volume(&mut disk, 0, 64, 8000, &FormatOptions::new().volume_label(*b"FIRST      ")).unwrap();
        format::format_volume(&mut disk, 0, 8064, 8000, &FormatOptions::new().volume_label(*b"SECOND     ")).unwrap();
        let parts = scan_drive(&mut disk, 0).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].label(), "FIRST");
        assert_eq!(parts[1].label(), "SECOND");
    }

    #[test]
    fn partitionless_at_sector_one() {
        let mut disk = MemDisk::blank(4 * 1024 * 1024);
        format::format_volume(&mut disk, 0, 1, 8191, &FormatOptions::new()).unwrap();
        let parts = scan_drive(&mut disk, 0).unwrap();
        assert_eq!(parts[0].lba_begin, 1);
    }

    #[test]
    fn bad_slot_falls_back_to_partitionless() {
        let mut disk = MemDisk::single(make_fat32_image());
        // Point slot 0 at a sector that holds no volume.
        disk.drives[0][0x1BE + 8..0x1BE + 12].copy_from_slice(&100u32.to_le_bytes());
        disk.drives[0][0x1BE + 12..0x1BE + 16].copy_from_slice(&100u32.to_le_bytes());
        let parts = scan_drive(&mut disk, 0).unwrap();
        assert_eq!(parts[0].lba_begin, 0);
    }

    #[test]
    fn blank_drive_has_no_volume() {
        let mut disk = MemDisk::blank(1024 * 1024);
        assert_eq!(scan_drive(&mut disk, 0), Err(FsError::NoVolume));
    }

    #[test]
    fn missing_drive_is_io_error() {
        let mut disk = MemDisk::blank(1024 * 1024);
        assert_eq!(scan_drive(&mut disk, 3), Err(FsError::Io { drive: 3, lba: 0 }));
    }

    #[test]
    fn volume_table_is_bounded() {
        let mut disk = MemDisk::single(make_fat32_image());
        let part = scan_drive(&mut disk, 0).unwrap()[0];
        let mut table = VolumeTable::new();
        for i in 0..MAX_PARTITIONS {
            assert_eq!(table.push(part), Ok(i));
        }
        assert_eq!(table.push(part), Err(FsError::VolumeTableFull));
        assert_eq!(table.get(MAX_PARTITIONS).err(), Some(FsError::NoSuchPartition(MAX_PARTITIONS)));
    }

    #[test]
    fn info_string_names_the_volume() {
        let mut disk = MemDisk::blank(4 * 1024 * 1024);
        let opts = FormatOptions::new().volume_label(*b"DATA       ").volume_id(0x1234_ABCD);
        format::format_volume(&mut disk, 0, 0, 8192, &opts).unwrap();
        let part = scan_drive(&mut disk, 0).unwrap()[0];
        let info = part.to_string();
        assert!(info.contains("label 'DATA'"));
        assert!(info.contains("1234-ABCD"));
        assert!(info.contains("root cluster 2"));
    }
}
