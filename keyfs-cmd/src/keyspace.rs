//! The host keyspace: one filesystem per key, with the auto-create /
//! auto-delete lifecycle.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use keyfs::dev::TimeProvider;
use keyfs::error::{FsError, Result};
use keyfs::fs::Filesystem;

/// All filesystem keys of one host database.
///
/// Clients never create or delete keys themselves: the first write under a
/// key materializes a filesystem with its root directory, and the write
/// that removes the last non-root entry drops the key again.
pub struct Keyspace {
    keys: BTreeMap<Vec<u8>, Filesystem>,
    time: &'static dyn TimeProvider,
}

impl Keyspace {
    pub fn new(time: &'static dyn TimeProvider) -> Self {
        Keyspace {
            keys: BTreeMap::new(),
            time,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.time.now_ms()
    }

    /// Filesystem behind `key`, for a read command.
    pub fn get(&self, key: &[u8]) -> Result<&Filesystem> {
        self.keys.get(key).ok_or(FsError::NoSuchKey)
    }

    /// Mutable filesystem behind `key`; still an error when missing (read
    /// commands that touch `atime` use this).
    pub fn get_mut(&mut self, key: &[u8]) -> Result<&mut Filesystem> {
        self.keys.get_mut(key).ok_or(FsError::NoSuchKey)
    }

    /// Filesystem behind `key`, materializing it for a write command.
    pub fn get_or_create(&mut self, key: &[u8]) -> &mut Filesystem {
        let now = self.time.now_ms();
        self.keys
            .entry(key.to_vec())
            .or_insert_with(|| Filesystem::new(now))
    }

    /// Drop `key` if only the root directory remains. Runs after every
    /// write command, which both auto-deletes after the last removal and
    /// cleans up a key that a failed write had just materialized.
    pub fn drop_if_trivial(&mut self, key: &[u8]) {
        if self.keys.get(key).map_or(false, Filesystem::is_trivial) {
            debug!("dropping trivial filesystem key ({} bytes)", key.len());
            self.keys.remove(key);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.keys.contains_key(key)
    }

    /// Install a filesystem wholesale, the snapshot-restore path.
    pub fn insert(&mut self, key: Vec<u8>, fs: Filesystem) {
        self.keys.insert(key, fs);
    }

    /// Remove a key outright, handing the filesystem to the caller; the
    /// host's key-deletion path ends in the datatype free callback.
    pub fn remove(&mut self, key: &[u8]) -> Option<Filesystem> {
        self.keys.remove(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Filesystem)> {
        self.keys.iter()
    }
}
