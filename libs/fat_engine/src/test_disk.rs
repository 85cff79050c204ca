// Host-side test fixtures: an in-memory multi-drive device and helpers that
// build or inspect reference FAT32 images through the `fatfs` crate.

extern crate std;

use std::io::{Cursor, Read, Write};
use std::vec;
use std::vec::Vec;

use crate::block_dev::{BlockDev, SECTOR_SIZE, Sector};

/// Drives backed by `Vec<u8>`; drive index = position in `drives`.
pub struct MemDisk {
    pub drives: Vec<Vec<u8>>,
    /// Fail every write once this many writes have succeeded.
    pub writes_left: Option<usize>,
}

impl MemDisk {
    pub fn single(image: Vec<u8>) -> Self {
        Self { drives: vec![image], writes_left: None }
    }

    pub fn blank(bytes: usize) -> Self {
        Self::single(vec![0u8; bytes])
    }
}

impl BlockDev for MemDisk {
    fn read(&mut self, drive: u8, lba: u64, buf: &mut Sector) -> bool {
        let Some(img) = self.drives.get(drive as usize) else { return false };
        let off = lba as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > img.len() { return false; }
        buf.copy_from_slice(&img[off..off + SECTOR_SIZE]);
        true
    }

    fn write(&mut self, drive: u8, lba: u64, buf: &Sector) -> bool {
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 { return false; }
            *left -= 1;
        }
        let Some(img) = self.drives.get_mut(drive as usize) else { return false };
        let off = lba as usize * SECTOR_SIZE;
        if off + SECTOR_SIZE > img.len() { return false; }
        img[off..off + SECTOR_SIZE].copy_from_slice(buf);
        true
    }
}

/// Raw (no partition table) FAT32 image formatted by `fatfs`.
///
/// FAT32 needs at least 65 525 data clusters, which with `fatfs`'s choice of
/// cluster size for this volume size means ~34 MB minimum. We use 40 MB.
pub fn make_fat32_image() -> Vec<u8> {
    const SIZE: usize = 40 * 1024 * 1024;
    let mut cursor = Cursor::new(vec![0u8; SIZE]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    ).expect("format_volume failed");
    cursor.into_inner()
}

/// Reference image with `files` written through `fatfs`. Paths may contain
/// one directory level (`DIR/NAME.EXT`); the directory is created on demand.
pub fn image_with_files(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut image = make_fat32_image();
    {
        let mut cursor = Cursor::new(&mut image);
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
            .expect("FileSystem::new failed");
        let root = fs.root_dir();
        for (path, content) in files {
            let mut f = match path.rsplit_once('/') {
                Some((dir, name)) => {
                    let d = root.open_dir(dir).or_else(|_| root.create_dir(dir)).expect("create_dir failed");
                    d.create_file(name).expect("create_file failed")
                }
                None => root.create_file(path).expect("create_file failed"),
            };
            f.truncate().unwrap();
            f.write_all(content).unwrap();
        }
    }
    image
}

/// Read a file back through `fatfs`.
pub fn read_via_fatfs(image: &mut Vec<u8>, path: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().open_file(path).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

/// Names (as `fatfs` reports them) in a directory, without `.` and `..`.
pub fn list_via_fatfs(image: &mut Vec<u8>, dir: &str) -> Vec<std::string::String> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let root = fs.root_dir();
    let d = if dir.is_empty() { root } else { root.open_dir(dir).unwrap() };
    d.iter()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n != "." && n != "..")
        .collect()
}
