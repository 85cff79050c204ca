//! Volume creation: lay down an empty volume and, optionally, a partition
//! table that points at it.

use crate::block_dev::{BlockDev, SECTOR_SIZE, Sector};
use crate::chain::END_OF_CHAIN;
use crate::error::FsError;
use crate::layout::{
    self, BootRecord, EXT_BOOT_SIGNATURE, LINKS_PER_SECTOR, PARTITION_SLOTS, PartitionSlot,
    REQUIRED_FAT_COUNT, VolumeIdSector,
};
use crate::volume::Partition;

/// Partition type code written for every slot: FAT32 with LBA addressing.
const PARTITION_TYPE_FAT32_LBA: u8 = 0x0C;
const MEDIA_FIXED:     u8  = 0xF8;
const ROOT_CLUSTER:    u32 = 2;
const FS_INFO_SECTOR:  u16 = 1;
const BACKUP_BOOT:     u16 = 6;

/// Fewest data clusters a FAT32 volume may have. Readers that derive the FAT
/// type from the cluster count take anything smaller for FAT12/16 and
/// refuse it; this engine mounts it either way.
pub const MIN_FAT32_CLUSTERS: u32 = 65_525;

/// Parameters for [`format_volume`]. Built with chained setters:
///
/// ```ignore
/// let opts = FormatOptions::new().sectors_per_cluster(8).volume_label(*b"DATA       ");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    sectors_per_cluster: u8,
    reserved_sectors:    u16,
    volume_label:        [u8; 11],
    volume_id:           u32,
    oem_name:            [u8; 8],
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatOptions {
    pub const fn new() -> Self {
        Self {
            sectors_per_cluster: 1,
            reserved_sectors:    32,
            volume_label:        *b"NO NAME    ",
            volume_id:           0,
            oem_name:            *b"FATENGIN",
        }
    }

    pub const fn sectors_per_cluster(mut self, n: u8) -> Self {
        self.sectors_per_cluster = n;
        self
    }

    pub const fn reserved_sectors(mut self, n: u16) -> Self {
        self.reserved_sectors = n;
        self
    }

    pub const fn volume_label(mut self, label: [u8; 11]) -> Self {
        self.volume_label = label;
        self
    }

    pub const fn volume_id(mut self, id: u32) -> Self {
        self.volume_id = id;
        self
    }

    pub const fn oem_name(mut self, oem: [u8; 8]) -> Self {
        self.oem_name = oem;
        self
    }
}

fn put<D: BlockDev>(dev: &mut D, drive: u8, lba: u64, sec: &Sector) -> Result<(), FsError> {
    if dev.write(drive, lba, sec) { Ok(()) } else { Err(FsError::Io { drive, lba }) }
}

/// Write an empty volume of `sector_count` sectors at `lba_begin` on `drive`:
/// volume-identifier sector (plus FSInfo and backup copies), two zeroed link
/// tables with clusters 0 and 1 reserved, and an empty root directory in
/// cluster 2. Returns the partition as a mount would see it.
///
/// Only volumes of at least [`MIN_FAT32_CLUSTERS`] clusters are readable by
/// other FAT32 implementations; smaller ones are written anyway, with a
/// warning.
pub fn format_volume<D: BlockDev>(
    dev: &mut D,
    drive: u8,
    lba_begin: u64,
    sector_count: u64,
    opts: &FormatOptions,
) -> Result<Partition, FsError> {
    let spc = opts.sectors_per_cluster;
    if spc == 0 || !spc.is_power_of_two() || spc > 128 {
        return Err(FsError::InvalidLayout);
    }
    let reserved = opts.reserved_sectors as u64;
    if reserved < FS_INFO_SECTOR as u64 + 1 || sector_count > u32::MAX as u64 || sector_count <= reserved {
        return Err(FsError::InvalidLayout);
    }

    // Size the link table for the most clusters the volume could hold.
    let max_clusters = (sector_count - reserved) / spc as u64;
    let fat_sectors = (max_clusters + 2).div_ceil(LINKS_PER_SECTOR as u64);
    let meta = reserved + REQUIRED_FAT_COUNT as u64 * fat_sectors;
    if sector_count < meta + spc as u64 {
        return Err(FsError::InvalidLayout);
    }

    let vid = VolumeIdSector {
        jump:                [0xEB, 0x58, 0x90],
        oem_name:            opts.oem_name,
        bytes_per_sector:    SECTOR_SIZE as u16,
        sectors_per_cluster: spc,
        reserved_sectors:    opts.reserved_sectors,
        fat_count:           REQUIRED_FAT_COUNT,
        media:               MEDIA_FIXED,
        fat_sectors_16:      0,
        total_sectors:       sector_count as u32,
        fat_sectors:         fat_sectors as u32,
        root_cluster:        ROOT_CLUSTER,
        fs_info_sector:      FS_INFO_SECTOR,
        backup_boot_sector:  if reserved > BACKUP_BOOT as u64 + 1 { BACKUP_BOOT } else { 0 },
        drive_number:        0x80,
        ext_boot_signature:  EXT_BOOT_SIGNATURE,
        volume_id:           opts.volume_id,
        volume_label:        opts.volume_label,
        fs_type:             *b"FAT32   ",
    };
    let part = Partition::from_volume_id(drive, lba_begin, Some(sector_count), &vid)?;

    let zero = [0u8; SECTOR_SIZE];
    for lba in lba_begin..part.fat_begin() + 2 * fat_sectors {
        put(dev, drive, lba, &zero)?;
    }
    let root_lba = part.data_begin();
    for s in 0..spc as u64 {
        put(dev, drive, root_lba + s, &zero)?;
    }

    let boot = vid.serialize();
    let info = layout::fs_info_sector();
    put(dev, drive, lba_begin, &boot)?;
    put(dev, drive, lba_begin + FS_INFO_SECTOR as u64, &info)?;
    if vid.backup_boot_sector != 0 {
        let backup = lba_begin + BACKUP_BOOT as u64;
        put(dev, drive, backup, &boot)?;
        put(dev, drive, backup + 1, &info)?;
    }

    let mut first = [0u8; SECTOR_SIZE];
    layout::write_link(&mut first, 0, 0x0FFF_FF00 | MEDIA_FIXED as u32);
    layout::write_link(&mut first, 1, END_OF_CHAIN);
    layout::write_link(&mut first, ROOT_CLUSTER as usize, END_OF_CHAIN);
    put(dev, drive, part.fat_begin(), &first)?;
    put(dev, drive, part.fat_begin() + fat_sectors, &first)?;

    log::info!(
        "formatted drive {drive} @ LBA {lba_begin}: {} clusters of {} bytes",
        part.cluster_count(),
        part.cluster_bytes(),
    );
    if part.cluster_count() < MIN_FAT32_CLUSTERS {
        log::warn!(
            "drive {drive} @ LBA {lba_begin}: {} clusters is below {MIN_FAT32_CLUSTERS}; \
             other FAT32 implementations will not mount this volume",
            part.cluster_count(),
        );
    }
    Ok(part)
}

/// Write a partition table with one slot per `(lba_begin, sector_count)`
/// into sector 0 of `drive`, keeping whatever boot code is already there.
pub fn write_partition_table<D: BlockDev>(dev: &mut D, drive: u8, slots: &[(u32, u32)]) -> Result<(), FsError> {
    if slots.len() > PARTITION_SLOTS {
        return Err(FsError::InvalidLayout);
    }
    let mut sec = [0u8; SECTOR_SIZE];
    if !dev.read(drive, 0, &mut sec) {
        return Err(FsError::Io { drive, lba: 0 });
    }
    let mut record = BootRecord::default();
    for (slot, &(lba_begin, sector_count)) in record.slots.iter_mut().zip(slots) {
        *slot = PartitionSlot {
            type_code: PARTITION_TYPE_FAT32_LBA,
            lba_begin,
            sector_count,
            ..Default::default()
        };
    }
    record.write_to(&mut sec);
    put(dev, drive, 0, &sec)
}
