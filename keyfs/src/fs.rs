//! The filesystem object: a flat path→inode map with aggregate counters.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::bloom::TrigramBloom;
use crate::error::{FsError, Result};
use crate::inode::{Inode, InodeKind};
use crate::path;

/// One complete filesystem, the value stored under one host key.
///
/// The map is the single source of truth; the counters are maintained
/// incrementally by [`insert`](Filesystem::insert) /
/// [`remove`](Filesystem::remove) and always equal the per-shape counts and
/// the total file content size. Map iteration is ordered by path, which is
/// what makes the snapshot stream and the digest deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Filesystem {
    map: BTreeMap<Vec<u8>, Inode>,
    files: u64,
    dirs: u64,
    symlinks: u64,
    data_bytes: u64,
}

impl Filesystem {
    /// Fresh filesystem holding only the root directory.
    pub fn new(now: i64) -> Self {
        let mut fs = Self::empty();
        fs.insert([path::SEP].to_vec(), Inode::new_dir(0, now));
        fs
    }

    /// No inodes at all, not even root. Only the snapshot loader starts
    /// here; everything else goes through [`new`](Filesystem::new).
    pub(crate) fn empty() -> Self {
        Filesystem {
            map: BTreeMap::new(),
            files: 0,
            dirs: 0,
            symlinks: 0,
            data_bytes: 0,
        }
    }

    pub fn lookup(&self, p: &[u8]) -> Option<&Inode> {
        self.map.get(p)
    }

    pub fn lookup_mut(&mut self, p: &[u8]) -> Option<&mut Inode> {
        self.map.get_mut(p)
    }

    pub fn files(&self) -> u64 {
        self.files
    }

    pub fn dirs(&self) -> u64 {
        self.dirs
    }

    pub fn symlinks(&self) -> u64 {
        self.symlinks
    }

    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn total_inodes(&self) -> u64 {
        self.files + self.dirs + self.symlinks
    }

    /// True once only the root directory remains (or nothing at all); the
    /// host drops the key at that point.
    pub fn is_trivial(&self) -> bool {
        self.total_inodes() <= 1
    }

    /// All entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Inode)> {
        self.map.iter()
    }

    /// Insert `inode` at `p`, adjusting the counters. The caller guarantees
    /// the path is free and normalized.
    pub fn insert(&mut self, p: Vec<u8>, inode: Inode) {
        match &inode.kind {
            InodeKind::File { data, .. } => {
                self.files += 1;
                self.data_bytes += data.len() as u64;
            }
            InodeKind::Dir { .. } => self.dirs += 1,
            InodeKind::Symlink { .. } => self.symlinks += 1,
        }
        self.map.insert(p, inode);
    }

    /// Remove the inode at `p`, handing ownership to the caller so any
    /// re-linking can happen before it is dropped.
    pub fn remove(&mut self, p: &[u8]) -> Option<Inode> {
        let inode = self.map.remove(p)?;
        match &inode.kind {
            InodeKind::File { data, .. } => {
                self.files -= 1;
                self.data_bytes -= data.len() as u64;
            }
            InodeKind::Dir { .. } => self.dirs -= 1,
            InodeKind::Symlink { .. } => self.symlinks -= 1,
        }
        Some(inode)
    }

    /// Ensure every ancestor directory of `p` exists, creating missing ones
    /// with default mode and wiring them into their parents. An ancestor of
    /// another shape is a conflict.
    pub fn ensure_parents(&mut self, p: &[u8], now: i64) -> Result<()> {
        let parent = path::parent(p);
        match self.map.get(&parent) {
            Some(inode) if inode.is_dir() => Ok(()),
            Some(_) => Err(FsError::ParentConflict),
            None => {
                self.ensure_parents(&parent, now)?;
                self.insert(parent.clone(), Inode::new_dir(0, now));
                let name = path::basename(&parent).to_vec();
                if let Some(grand) = self.map.get_mut(&path::parent(&parent)) {
                    grand.add_child(&name);
                    grand.mtime = now;
                }
                Ok(())
            }
        }
    }

    /// Replace or extend the content of the file at `p`, keeping
    /// `data_bytes` consistent. Returns the new size.
    pub fn write_file_data(&mut self, p: &[u8], content: &[u8], append: bool) -> Result<u64> {
        let inode = self.map.get_mut(p).ok_or(FsError::NoSuchFileOrDir)?;
        let old = match &inode.kind {
            InodeKind::File { data, .. } => data.len() as u64,
            _ => return Err(FsError::NotFile),
        };
        if append {
            inode.append_data(content);
        } else {
            inode.set_data(content);
        }
        let new = inode.size();
        self.data_bytes = self.data_bytes - old + new;
        Ok(new)
    }

    /// Shrink or zero-extend the file at `p` to `len` bytes.
    pub fn resize_file(&mut self, p: &[u8], len: u64) -> Result<()> {
        let inode = self.map.get_mut(p).ok_or(FsError::NoSuchFileOrDir)?;
        let old = match &inode.kind {
            InodeKind::File { data, .. } => data.len() as u64,
            _ => return Err(FsError::NotFile),
        };
        inode.resize_data(len as usize);
        self.data_bytes = self.data_bytes - old + len;
        Ok(())
    }

    /// Paths strictly inside the subtree rooted at `dir`, in path order.
    pub fn subtree_paths(&self, dir: &[u8]) -> Vec<Vec<u8>> {
        let mut prefix = dir.to_vec();
        if !path::is_root(dir) {
            prefix.push(path::SEP);
        }
        self.map
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Verify the structural invariants: root present, parent/child lists
    /// consistent both ways, no duplicate child names, counters and byte
    /// totals exact, every file bloom current. Returns the first violation.
    pub fn fsck(&self) -> core::result::Result<(), &'static str> {
        match self.map.get(&[path::SEP][..]) {
            Some(root) if root.is_dir() => {}
            Some(_) => return Err("root is not a directory"),
            None => return Err("root missing"),
        }
        let (mut files, mut dirs, mut symlinks, mut bytes) = (0u64, 0u64, 0u64, 0u64);
        for (p, inode) in &self.map {
            match &inode.kind {
                InodeKind::File { data, bloom } => {
                    files += 1;
                    bytes += data.len() as u64;
                    if *bloom != TrigramBloom::build(data) {
                        return Err("stale bloom filter");
                    }
                }
                InodeKind::Dir { children } => {
                    dirs += 1;
                    for (at, name) in children.iter().enumerate() {
                        if children[..at].contains(name) {
                            return Err("duplicate child name");
                        }
                        if !self.map.contains_key(&path::child(p, name)) {
                            return Err("child list names a missing path");
                        }
                    }
                }
                InodeKind::Symlink { .. } => symlinks += 1,
            }
            if !path::is_root(p) {
                match self.map.get(&path::parent(p)) {
                    Some(parent) if parent.is_dir() => {
                        if !parent.has_child(path::basename(p)) {
                            return Err("entry missing from parent child list");
                        }
                    }
                    Some(_) => return Err("parent is not a directory"),
                    None => return Err("parent missing"),
                }
            }
        }
        if (files, dirs, symlinks) != (self.files, self.dirs, self.symlinks) {
            return Err("counter drift");
        }
        if bytes != self.data_bytes {
            return Err("data byte total drift");
        }
        Ok(())
    }
}
