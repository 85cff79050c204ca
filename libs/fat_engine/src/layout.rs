//! Byte-exact codecs for the on-disk records read and written by the engine.
//!
//! All multi-byte fields are little-endian. Records are decoded field by
//! field from fixed offsets; nothing is reinterpreted in place.

use crate::block_dev::{SECTOR_SIZE, Sector};
use crate::error::FsError;

// ─── Offsets and magic values ─────────────────────────────────────────────────

pub const BOOT_SIGNATURE:          u16   = 0xAA55;
const SIGNATURE_OFFSET:            usize = 0x1FE;
const PARTITION_TABLE_OFFSET:      usize = 0x1BE;
const PARTITION_SLOT_SIZE:         usize = 16;
pub const PARTITION_SLOTS:         usize = 4;

/// Extended boot signature announcing volume id, label and type string.
pub const EXT_BOOT_SIGNATURE:      u8    = 0x29;
/// Alternate extended boot signature: only the volume id follows.
pub const EXT_BOOT_SIGNATURE_SHORT: u8   = 0x28;

pub const REQUIRED_FAT_COUNT:      u8    = 2;
pub const LINKS_PER_SECTOR:        u32   = (SECTOR_SIZE / 4) as u32;

const FS_INFO_LEAD_SIG:            u32   = 0x4161_5252;
const FS_INFO_STRUCT_SIG:          u32   = 0x6141_7272;
const FS_INFO_TRAIL_SIG:           u32   = 0xAA55_0000;

fn le16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn le32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn has_boot_signature(sec: &Sector) -> bool {
    le16(sec, SIGNATURE_OFFSET) == BOOT_SIGNATURE
}

pub fn set_boot_signature(sec: &mut Sector) {
    put16(sec, SIGNATURE_OFFSET, BOOT_SIGNATURE);
}

// ─── Boot sector / partition table ────────────────────────────────────────────

/// One 16-byte entry of the partition table in the drive's boot sector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionSlot {
    pub boot_flag:    u8,
    pub chs_begin:    [u8; 3],
    pub type_code:    u8,
    pub chs_end:      [u8; 3],
    pub lba_begin:    u32,
    pub sector_count: u32,
}

impl PartitionSlot {
    fn parse(raw: &[u8]) -> Self {
        Self {
            boot_flag:    raw[0],
            chs_begin:    [raw[1], raw[2], raw[3]],
            type_code:    raw[4],
            chs_end:      [raw[5], raw[6], raw[7]],
            lba_begin:    le32(raw, 8),
            sector_count: le32(raw, 12),
        }
    }

    fn write_to(&self, raw: &mut [u8]) {
        raw[0] = self.boot_flag;
        raw[1..4].copy_from_slice(&self.chs_begin);
        raw[4] = self.type_code;
        raw[5..8].copy_from_slice(&self.chs_end);
        put32(raw, 8, self.lba_begin);
        put32(raw, 12, self.sector_count);
    }

    /// A slot is worth probing only if it points somewhere past sector 0.
    pub fn is_used(&self) -> bool {
        self.lba_begin > 0 && self.sector_count > 0
    }
}

/// Sector 0 of a drive: the four partition slots plus the boot signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootRecord {
    pub slots: [PartitionSlot; PARTITION_SLOTS],
}

impl BootRecord {
    pub fn parse(sec: &Sector) -> Result<Self, FsError> {
        if !has_boot_signature(sec) {
            return Err(FsError::BadBootSignature);
        }
        let slots = core::array::from_fn(|i| {
            let off = PARTITION_TABLE_OFFSET + i * PARTITION_SLOT_SIZE;
            PartitionSlot::parse(&sec[off..off + PARTITION_SLOT_SIZE])
        });
        Ok(Self { slots })
    }

    /// Write the partition table and signature into `sec`, leaving the boot
    /// code area untouched.
    pub fn write_to(&self, sec: &mut Sector) {
        for (i, slot) in self.slots.iter().enumerate() {
            let off = PARTITION_TABLE_OFFSET + i * PARTITION_SLOT_SIZE;
            slot.write_to(&mut sec[off..off + PARTITION_SLOT_SIZE]);
        }
        set_boot_signature(sec);
    }
}

// ─── Volume identifier sector ─────────────────────────────────────────────────

/// First sector of a volume: layout parameters plus identification strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeIdSector {
    pub jump:                [u8; 3],
    pub oem_name:            [u8; 8],
    pub bytes_per_sector:    u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors:    u16,
    pub fat_count:           u8,
    pub media:               u8,
    pub fat_sectors_16:      u16,
    pub total_sectors:       u32,
    pub fat_sectors:         u32,
    pub root_cluster:        u32,
    pub fs_info_sector:      u16,
    pub backup_boot_sector:  u16,
    pub drive_number:        u8,
    pub ext_boot_signature:  u8,
    pub volume_id:           u32,
    pub volume_label:        [u8; 11],
    pub fs_type:             [u8; 8],
}

impl VolumeIdSector {
    /// Decode and validate: signature, 512-byte sectors, exactly two link tables.
    pub fn parse(sec: &Sector) -> Result<Self, FsError> {
        if !has_boot_signature(sec) {
            return Err(FsError::BadBootSignature);
        }
        let bytes_per_sector = le16(sec, 0x0B);
        if bytes_per_sector as usize != SECTOR_SIZE {
            return Err(FsError::BadSectorSize(bytes_per_sector));
        }
        let fat_count = sec[0x10];
        if fat_count != REQUIRED_FAT_COUNT {
            return Err(FsError::BadFatCount(fat_count));
        }

        let total_16 = le16(sec, 0x13) as u32;
        let total_sectors = if total_16 != 0 { total_16 } else { le32(sec, 0x20) };

        let ext_boot_signature = sec[0x42];
        let (volume_id, volume_label, fs_type) = match ext_boot_signature {
            EXT_BOOT_SIGNATURE => (
                le32(sec, 0x43),
                sec[0x47..0x52].try_into().map_err(|_| FsError::InvalidLayout)?,
                sec[0x52..0x5A].try_into().map_err(|_| FsError::InvalidLayout)?,
            ),
            EXT_BOOT_SIGNATURE_SHORT => (le32(sec, 0x43), [b' '; 11], [b' '; 8]),
            _ => (0, [b' '; 11], [b' '; 8]),
        };

        Ok(Self {
            jump:                [sec[0], sec[1], sec[2]],
            oem_name:            sec[0x03..0x0B].try_into().map_err(|_| FsError::InvalidLayout)?,
            bytes_per_sector,
            sectors_per_cluster: sec[0x0D],
            reserved_sectors:    le16(sec, 0x0E),
            fat_count,
            media:               sec[0x15],
            fat_sectors_16:      le16(sec, 0x16),
            total_sectors,
            fat_sectors:         le32(sec, 0x24),
            root_cluster:        le32(sec, 0x2C),
            fs_info_sector:      le16(sec, 0x30),
            backup_boot_sector:  le16(sec, 0x32),
            drive_number:        sec[0x40],
            ext_boot_signature,
            volume_id,
            volume_label,
            fs_type,
        })
    }

    pub fn serialize(&self) -> Sector {
        let mut sec = [0u8; SECTOR_SIZE];
        sec[0..3].copy_from_slice(&self.jump);
        sec[0x03..0x0B].copy_from_slice(&self.oem_name);
        put16(&mut sec, 0x0B, self.bytes_per_sector);
        sec[0x0D] = self.sectors_per_cluster;
        put16(&mut sec, 0x0E, self.reserved_sectors);
        sec[0x10] = self.fat_count;
        sec[0x15] = self.media;
        put16(&mut sec, 0x16, self.fat_sectors_16);
        put32(&mut sec, 0x20, self.total_sectors);
        put32(&mut sec, 0x24, self.fat_sectors);
        put32(&mut sec, 0x2C, self.root_cluster);
        put16(&mut sec, 0x30, self.fs_info_sector);
        put16(&mut sec, 0x32, self.backup_boot_sector);
        sec[0x40] = self.drive_number;
        sec[0x42] = self.ext_boot_signature;
        if self.ext_boot_signature == EXT_BOOT_SIGNATURE || self.ext_boot_signature == EXT_BOOT_SIGNATURE_SHORT {
            put32(&mut sec, 0x43, self.volume_id);
        }
        if self.ext_boot_signature == EXT_BOOT_SIGNATURE {
            sec[0x47..0x52].copy_from_slice(&self.volume_label);
            sec[0x52..0x5A].copy_from_slice(&self.fs_type);
        }
        set_boot_signature(&mut sec);
        sec
    }
}

/// FSInfo sector with "unknown" free-count and next-free hints.
pub fn fs_info_sector() -> Sector {
    let mut sec = [0u8; SECTOR_SIZE];
    put32(&mut sec, 0, FS_INFO_LEAD_SIG);
    put32(&mut sec, 484, FS_INFO_STRUCT_SIG);
    put32(&mut sec, 488, u32::MAX);
    put32(&mut sec, 492, u32::MAX);
    put32(&mut sec, 508, FS_INFO_TRAIL_SIG);
    sec
}

// ─── Link-table sector ────────────────────────────────────────────────────────

pub fn read_link(sec: &Sector, index: usize) -> u32 {
    le32(sec, index * 4)
}

pub fn write_link(sec: &mut Sector, index: usize, value: u32) {
    put32(sec, index * 4, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_volume() -> VolumeIdSector {
        VolumeIdSector {
            jump: [0xEB, 0x58, 0x90],
            oem_name: *b"FATENGIN",
            bytes_per_sector: 512,
            sectors_per_cluster: 4,
            reserved_sectors: 32,
            fat_count: 2,
            media: 0xF8,
            fat_sectors_16: 0,
            total_sectors: 65536,
            fat_sectors: 128,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            drive_number: 0x80,
            ext_boot_signature: EXT_BOOT_SIGNATURE,
            volume_id: 0xCAFE_F00D,
            volume_label: *b"SCRATCH    ",
            fs_type: *b"FAT32   ",
        }
    }

    #[test]
    fn volume_id_field_offsets() {
        let sec = sample_volume().serialize();
        assert_eq!(&sec[0x03..0x0B], b"FATENGIN");
        assert_eq!(u16::from_le_bytes([sec[0x0B], sec[0x0C]]), 512);
        assert_eq!(sec[0x0D], 4);
        assert_eq!(sec[0x10], 2);
        assert_eq!(u32::from_le_bytes(sec[0x24..0x28].try_into().unwrap()), 128);
        assert_eq!(u32::from_le_bytes(sec[0x2C..0x30].try_into().unwrap()), 2);
        assert_eq!(&sec[0x47..0x52], b"SCRATCH    ");
        assert_eq!(&sec[0x1FE..], &[0x55, 0xAA]);
        assert_eq!(VolumeIdSector::parse(&sec).unwrap(), sample_volume());
    }

    #[test]
    fn volume_id_rejects_wrong_sector_size() {
        let mut v = sample_volume();
        v.bytes_per_sector = 4096;
        assert_eq!(VolumeIdSector::parse(&v.serialize()), Err(FsError::BadSectorSize(4096)));
    }

    #[test]
    fn volume_id_rejects_single_link_table() {
        let mut v = sample_volume();
        v.fat_count = 1;
        assert_eq!(VolumeIdSector::parse(&v.serialize()), Err(FsError::BadFatCount(1)));
    }

    #[test]
    fn volume_id_rejects_missing_signature() {
        let mut sec = sample_volume().serialize();
        sec[0x1FF] = 0;
        assert_eq!(VolumeIdSector::parse(&sec), Err(FsError::BadBootSignature));
    }

    #[test]
    fn short_ext_signature_has_no_label() {
        let mut v = sample_volume();
        v.ext_boot_signature = EXT_BOOT_SIGNATURE_SHORT;
        let mut sec = v.serialize();
        // Garbage where the label would be must be ignored.
        sec[0x47..0x52].copy_from_slice(b"IGNORED!!!!");
        let parsed = VolumeIdSector::parse(&sec).unwrap();
        assert_eq!(parsed.volume_id, 0xCAFE_F00D);
        assert_eq!(&parsed.volume_label, b"           ");
        assert_eq!(&parsed.fs_type, b"        ");
    }

    #[test]
    fn partition_table_slots() {
        let mut rec = BootRecord::default();
        rec.slots[0] = PartitionSlot { type_code: 0x0C, lba_begin: 2048, sector_count: 30720, ..Default::default() };
        let mut sec = [0u8; SECTOR_SIZE];
        rec.write_to(&mut sec);
        assert_eq!(sec[0x1BE + 4], 0x0C);
        assert_eq!(&sec[0x1BE + 8..0x1BE + 12], &2048u32.to_le_bytes());
        let parsed = BootRecord::parse(&sec).unwrap();
        assert!(parsed.slots[0].is_used());
        assert!(!parsed.slots[1].is_used());
        assert_eq!(parsed.slots[0].sector_count, 30720);
    }

    #[test]
    fn boot_record_needs_signature() {
        assert_eq!(BootRecord::parse(&[0u8; SECTOR_SIZE]), Err(FsError::BadBootSignature));
    }

    #[test]
    fn link_slots_are_little_endian() {
        let mut sec = [0u8; SECTOR_SIZE];
        write_link(&mut sec, 127, 0x0102_0304);
        assert_eq!(&sec[508..512], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(read_link(&sec, 127), 0x0102_0304);
    }
}
