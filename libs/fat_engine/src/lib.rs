// Library crate root. No_std when not testing; `cargo test -p fat_engine`
// builds it for the host with std so the test helpers can use `fatfs`.
#![cfg_attr(not(test), no_std)]

//! Read/write engine for a FAT32-style filesystem on raw 512-byte-sector storage.
//!
//! The engine owns no hardware: all sector traffic goes through [`BlockDev`].
//! [`FilesystemContext`] is the entry point; it keeps the table of mounted
//! partitions and exposes path-level operations (resolve, list, read, write,
//! create, delete, rename). Nothing is cached between calls: every operation
//! re-reads the link table and directory sectors it needs.

extern crate alloc;

pub mod block_dev;
pub mod chain;
pub mod context;
pub mod dir;
pub mod dir_entry;
pub mod error;
pub mod file;
pub mod format;
pub mod layout;
pub mod volume;

#[cfg(test)]
mod test_disk;

pub use block_dev::{BlockDev, SECTOR_SIZE, Sector};
pub use chain::{END_OF_CHAIN, FREE_CLUSTER, Link, RESERVED_CLUSTER};
pub use context::FilesystemContext;
pub use dir_entry::{Attributes, DirEntry};
pub use error::{FsError, FsResult};
pub use file::FileHandle;
pub use format::FormatOptions;
pub use volume::{MAX_PARTITIONS, Partition};
