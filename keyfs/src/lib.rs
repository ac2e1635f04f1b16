//! In-memory POSIX-like filesystem kept as one value inside a key-value
//! host. The whole filesystem is a flat map from normalized absolute paths
//! to inodes; directories carry explicit child-name lists, symlinks are
//! resolved by name at read time, and file content is indexed by a trigram
//! bloom filter for search pruning.
//!
//! This crate is the storage engine only. The command surface lives in
//! `keyfs-cmd`; hosts plug in through the seams in [`dev`] (wall clock and
//! the snapshot byte stream).

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod bloom;
pub mod dev;
pub mod digest;
pub mod error;
pub mod fs;
pub mod glob;
pub mod inode;
pub mod path;
pub mod resolve;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use error::{FsError, Result};
pub use fs::Filesystem;
pub use inode::{Inode, InodeKind, InodeType};
