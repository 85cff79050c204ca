use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use fat_engine::{BlockDev, SECTOR_SIZE, Sector};

/// Raw disk-image files, one per drive index, in the order given.
pub struct ImageDisks {
    files: Vec<File>,
}

impl ImageDisks {
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> io::Result<Self> {
        let files = paths
            .iter()
            .map(|p| OpenOptions::new().read(true).write(true).open(p))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { files })
    }

    /// Create (or truncate) a zero-filled image of `bytes` bytes.
    pub fn create<P: AsRef<Path>>(path: P, bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        file.set_len(bytes)?;
        Ok(Self { files: vec![file] })
    }

    fn seek_to(&mut self, drive: u8, lba: u64) -> io::Result<&mut File> {
        let file = self
            .files
            .get_mut(drive as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such drive"))?;
        let offset = lba * SECTOR_SIZE as u64;
        // Images never grow behind the engine's back.
        if offset + SECTOR_SIZE as u64 > file.metadata()?.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "past end of image"));
        }
        file.seek(SeekFrom::Start(offset))?;
        Ok(file)
    }
}

impl BlockDev for ImageDisks {
    fn read(&mut self, drive: u8, lba: u64, buf: &mut Sector) -> bool {
        let res = self.seek_to(drive, lba).and_then(|f| f.read_exact(buf));
        if let Err(e) = &res {
            log::trace!("drive {drive} LBA {lba}: read: {e}");
        }
        res.is_ok()
    }

    fn write(&mut self, drive: u8, lba: u64, buf: &Sector) -> bool {
        let res = self.seek_to(drive, lba).and_then(|f| f.write_all(buf));
        if let Err(e) = &res {
            log::trace!("drive {drive} LBA {lba}: write: {e}");
        }
        res.is_ok()
    }
}
