//! Memory accounting and the replication-equality digest.

use core::mem::size_of;

use sha2::{Digest, Sha256};

use crate::fs::Filesystem;
use crate::inode::{Inode, InodeKind};

/// Flat per-entry charge for the map key and node bookkeeping.
const ENTRY_OVERHEAD: usize = 64;

/// Marker hashed after every inode record.
const RECORD_BOUNDARY: &[u8] = b"\0inode\0";

/// Approximate resident size of `fs`. A lower bound; the host uses it for
/// reporting, not for enforcement.
pub fn mem_usage(fs: &Filesystem) -> usize {
    size_of::<Filesystem>()
        + fs.total_inodes() as usize * (size_of::<Inode>() + ENTRY_OVERHEAD)
        + fs.data_bytes() as usize
}

/// Content hash over path, type, mode and file bytes of every inode.
///
/// Two semantically equal filesystems digest identically: iteration is
/// ordered by path and every variable-length field is length-prefixed.
pub fn digest(fs: &Filesystem) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for (p, inode) in fs.iter() {
        hasher.update((p.len() as u64).to_le_bytes());
        hasher.update(p);
        hasher.update([inode.type_().tag()]);
        hasher.update(inode.mode.to_le_bytes());
        if let InodeKind::File { data, .. } = &inode.kind {
            hasher.update((data.len() as u64).to_le_bytes());
            hasher.update(data);
        }
        hasher.update(RECORD_BOUNDARY);
    }
    hasher.finalize().into()
}
