//! The 32-byte directory record and 8.3 name normalization.

use alloc::string::String;

use bitflags::bitflags;

use crate::error::FsError;

pub const DIR_ENTRY_SIZE:    usize = 32;
pub const ENTRIES_PER_SECTOR: usize = crate::SECTOR_SIZE / DIR_ENTRY_SIZE;

/// First name byte of a slot that was never used; nothing follows it.
pub const END_MARK:     u8 = 0x00;
/// First name byte of a deleted slot.
pub const DELETED_MARK: u8 = 0xE5;

const DOT_NAME:    [u8; 11] = *b".          ";
const DOTDOT_NAME: [u8; 11] = *b"..         ";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        /// All four low bits set: a long-name fragment, never parsed.
        const LONG_NAME = 0x0F;
    }
}

// ─── Directory entry ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name:          [u8; 11],
    pub attributes:    Attributes,
    pub first_cluster: u32,
    pub size:          u32,
}

impl DirEntry {
    pub fn new(name: [u8; 11], attributes: Attributes, first_cluster: u32, size: u32) -> Self {
        Self { name, attributes, first_cluster, size }
    }

    /// Decode the fields the engine uses from a 32-byte slot.
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);
        let hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
        let lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;
        Self {
            name,
            attributes:    Attributes::from_bits_retain(raw[11]),
            first_cluster: hi << 16 | lo,
            size:          u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    /// Write name, attributes, cluster and size into `raw`. Timestamps and
    /// the other reserved bytes are left as they are.
    pub fn write_to(&self, raw: &mut [u8]) {
        raw[..11].copy_from_slice(&self.name);
        raw[11] = self.attributes.bits();
        raw[20..22].copy_from_slice(&((self.first_cluster >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&(self.first_cluster as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    pub fn is_end(&self) -> bool     { self.name[0] == END_MARK }
    pub fn is_deleted(&self) -> bool { self.name[0] == DELETED_MARK }
    pub fn is_long_name(&self) -> bool {
        self.attributes.contains(Attributes::LONG_NAME)
    }
    pub fn is_volume_label(&self) -> bool {
        self.attributes.contains(Attributes::VOLUME_ID) && !self.is_long_name()
    }
    pub fn is_dir(&self) -> bool { self.attributes.contains(Attributes::DIRECTORY) }
    pub fn is_dot(&self) -> bool { self.name == DOT_NAME || self.name == DOTDOT_NAME }

    /// A slot that names a file or directory the engine exposes.
    pub fn is_live(&self) -> bool {
        !self.is_end() && !self.is_deleted() && !self.is_long_name() && !self.is_volume_label()
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name)
    }
}

// ─── Names ────────────────────────────────────────────────────────────────────

fn valid_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'()-@^_`{}~".contains(&b)
}

/// Normalize `name` to the stored 11-byte form: upper-cased, base padded to
/// 8 bytes, extension to 3, no dot. `.` and `..` map to their fixed forms.
pub fn short_name(name: &str) -> Result<[u8; 11], FsError> {
    match name {
        "" => return Err(FsError::EmptyName),
        "." => return Ok(DOT_NAME),
        ".." => return Ok(DOTDOT_NAME),
        _ => {}
    }
    let (base, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(FsError::InvalidName);
    }
    if !base.bytes().chain(ext.bytes()).all(valid_name_byte) {
        return Err(FsError::InvalidName);
    }

    let mut out = [b' '; 11];
    for (dst, b) in out[..8].iter_mut().zip(base.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    for (dst, b) in out[8..].iter_mut().zip(ext.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    Ok(out)
}

/// Stored 11-byte name → lower-case `base.ext` (`base` alone if no extension).
pub fn display_name(raw: &[u8; 11]) -> String {
    let base_end = raw[..8].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    let ext_end = raw[8..].iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    let mut s = String::with_capacity(12);
    s.extend(raw[..base_end].iter().map(|&b| b.to_ascii_lowercase() as char));
    if ext_end > 0 {
        s.push('.');
        s.extend(raw[8..8 + ext_end].iter().map(|&b| b.to_ascii_lowercase() as char));
    }
    s
}

pub fn names_match(short: &str, query: &str) -> bool {
    short.eq_ignore_ascii_case(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_pads_and_uppercases() {
        assert_eq!(&short_name("a.txt").unwrap(), b"A       TXT");
        assert_eq!(&short_name("Makefile").unwrap(), b"MAKEFILE   ");
        assert_eq!(&short_name("x.c").unwrap(), b"X       C  ");
        assert_eq!(&short_name("..").unwrap(), b"..         ");
    }

    #[test]
    fn short_name_rejects_what_does_not_fit() {
        assert_eq!(short_name(""), Err(FsError::EmptyName));
        assert_eq!(short_name("toolongname.txt"), Err(FsError::InvalidName));
        assert_eq!(short_name("a.html"), Err(FsError::InvalidName));
        assert_eq!(short_name(".hidden"), Err(FsError::InvalidName));
        assert_eq!(short_name("a b.txt"), Err(FsError::InvalidName));
        assert_eq!(short_name("a.b.c"), Err(FsError::InvalidName));
    }

    #[test]
    fn display_is_lowercase_dotted() {
        assert_eq!(display_name(b"HELLO   TXT"), "hello.txt");
        assert_eq!(display_name(b"DOCS       "), "docs");
        assert_eq!(display_name(b"..         "), "..");
        assert!(names_match("hello.txt", "HELLO.TXT"));
        assert!(!names_match("hello.txt", "hello.tx"));
    }

    #[test]
    fn entry_fields_land_at_fixed_offsets() {
        let mut raw = [0xAAu8; DIR_ENTRY_SIZE];
        let e = DirEntry::new(*b"A       TXT", Attributes::ARCHIVE, 0x0012_3456, 1000);
        e.write_to(&mut raw);
        assert_eq!(&raw[..11], b"A       TXT");
        assert_eq!(raw[11], 0x20);
        assert_eq!(&raw[20..22], &[0x12, 0x00]);
        assert_eq!(&raw[26..28], &[0x56, 0x34]);
        assert_eq!(&raw[28..32], &1000u32.to_le_bytes());
        // Untouched bytes keep their value.
        assert_eq!(raw[13], 0xAA);
        assert_eq!(DirEntry::parse(&raw), e);
    }

    #[test]
    fn classification() {
        let mut e = DirEntry::new(*b"DOCS       ", Attributes::DIRECTORY, 5, 0);
        assert!(e.is_live() && e.is_dir() && !e.is_dot());
        e.attributes = Attributes::LONG_NAME;
        assert!(e.is_long_name() && !e.is_live());
        e.attributes = Attributes::VOLUME_ID | Attributes::ARCHIVE;
        assert!(e.is_volume_label() && !e.is_live());
        e.name[0] = DELETED_MARK;
        assert!(e.is_deleted());
        assert!(DirEntry::parse(&[0u8; 32]).is_end());
    }
}
