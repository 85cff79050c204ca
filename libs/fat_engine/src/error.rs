use core::fmt;

/// Everything an engine operation can report back to its caller.
///
/// None of these are fatal to the engine; a failed call leaves the mounted
/// partitions usable. Only [`FsError::Io`] comes from below the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    // Volume
    BadBootSignature,
    BadSectorSize(u16),
    BadFatCount(u8),
    InvalidLayout,
    NoVolume,
    VolumeTableFull,
    NoSuchPartition(usize),
    // Path
    NotFound,
    EmptyName,
    InvalidName,
    NotADirectory,
    IsADirectory,
    // Allocation
    NoSpace,
    ShrinkToZero,
    // Directory
    AlreadyExists,
    DirectoryNotEmpty,
    // Device
    Io { drive: u8, lba: u64 },
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::BadBootSignature => write!(f, "invalid boot sector signature"),
            FsError::BadSectorSize(n) => write!(f, "unsupported sector size {n} (expected 512)"),
            FsError::BadFatCount(n) => write!(f, "unsupported link table count {n} (expected 2)"),
            FsError::InvalidLayout => write!(f, "inconsistent volume layout"),
            FsError::NoVolume => write!(f, "no valid volume found on drive"),
            FsError::VolumeTableFull => write!(f, "volume table is full"),
            FsError::NoSuchPartition(i) => write!(f, "no mounted partition {i}"),
            FsError::NotFound => write!(f, "no such file or directory"),
            FsError::EmptyName => write!(f, "empty file name"),
            FsError::InvalidName => write!(f, "name is not a valid 8.3 name"),
            FsError::NotADirectory => write!(f, "not a directory"),
            FsError::IsADirectory => write!(f, "is a directory"),
            FsError::NoSpace => write!(f, "no free cluster left"),
            FsError::ShrinkToZero => write!(f, "cannot shrink a chain to zero clusters"),
            FsError::AlreadyExists => write!(f, "an entry with that name already exists"),
            FsError::DirectoryNotEmpty => write!(f, "directory not empty"),
            FsError::Io { drive, lba } => write!(f, "I/O error on drive {drive} at LBA {lba}"),
        }
    }
}

impl FsError {
    /// Collapse into the coarse status code handed to shells and scripts.
    pub fn result(&self) -> FsResult {
        match self {
            FsError::NotFound | FsError::NoSuchPartition(_) | FsError::NoVolume => FsResult::NotFound,
            FsError::IsADirectory => FsResult::IsDir,
            FsError::NotADirectory => FsResult::NotDir,
            FsError::NoSpace => FsResult::NoSpace,
            FsError::AlreadyExists => FsResult::Exists,
            FsError::DirectoryNotEmpty => FsResult::NotEmpty,
            FsError::Io { .. } => FsResult::IoError,
            FsError::BadBootSignature
            | FsError::BadSectorSize(_)
            | FsError::BadFatCount(_)
            | FsError::InvalidLayout
            | FsError::VolumeTableFull
            | FsError::EmptyName
            | FsError::InvalidName
            | FsError::ShrinkToZero => FsResult::Invalid,
        }
    }
}

/// Numeric result codes for callers that only carry an integer status.
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsResult {
    Ok       = 0,
    NotFound = 1,
    IsDir    = 2,
    NotDir   = 3,
    NoSpace  = 4,
    IoError  = 5,
    Exists   = 6,
    NotEmpty = 7,
    Invalid  = 8,
}

impl FsResult {
    pub fn from_u64(v: u64) -> Self {
        match v {
            0 => FsResult::Ok,
            1 => FsResult::NotFound,
            2 => FsResult::IsDir,
            3 => FsResult::NotDir,
            4 => FsResult::NoSpace,
            6 => FsResult::Exists,
            7 => FsResult::NotEmpty,
            8 => FsResult::Invalid,
            _ => FsResult::IoError,
        }
    }
}

impl<T> From<Result<T, FsError>> for FsResult {
    fn from(r: Result<T, FsError>) -> Self {
        match r {
            Ok(_) => FsResult::Ok,
            Err(e) => e.result(),
        }
    }
}
