//! Sector-level access to the attached drives.
//!
//! Controllers (IDE PIO, AHCI, a disk-image file on the host) sit behind
//! this trait. Every call is synchronous: it returns once the sector has
//! been transferred or the transfer has failed.

pub const SECTOR_SIZE: usize = 512;

pub type Sector = [u8; SECTOR_SIZE];

pub trait BlockDev {
    /// Read sector `lba` of `drive` into `buf`. Returns `false` if the drive
    /// is missing or the transfer failed.
    fn read(&mut self, drive: u8, lba: u64, buf: &mut Sector) -> bool;
    /// Write `buf` to sector `lba` of `drive`.
    fn write(&mut self, drive: u8, lba: u64, buf: &Sector) -> bool;
}

impl<T: BlockDev + ?Sized> BlockDev for &mut T {
    fn read(&mut self, drive: u8, lba: u64, buf: &mut Sector) -> bool {
        (**self).read(drive, lba, buf)
    }
    fn write(&mut self, drive: u8, lba: u64, buf: &Sector) -> bool {
        (**self).write(drive, lba, buf)
    }
}
