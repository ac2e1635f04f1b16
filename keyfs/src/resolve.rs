//! Symlink chain resolution.

use alloc::vec::Vec;

use crate::error::{FsError, Result};
use crate::fs::Filesystem;
use crate::inode::InodeKind;
use crate::path;

/// Maximum number of symlinks one resolution follows.
pub const MAX_SYMLINK_FOLLOWS: usize = 40;

/// Follow symlinks starting at `p` until a non-symlink or a missing path.
///
/// A missing path is returned as-is so the caller can distinguish missing
/// from not-a-symlink. A relative target joins against the parent of the
/// link; an absolute target restarts from root. More than
/// [`MAX_SYMLINK_FOLLOWS`] links is a loop; a normalization overflow in the
/// middle of the chain surfaces as the depth error.
pub fn resolve(fs: &Filesystem, p: &[u8]) -> Result<Vec<u8>> {
    let mut current = p.to_vec();
    for _ in 0..MAX_SYMLINK_FOLLOWS {
        let target = match fs.lookup(&current) {
            None => return Ok(current),
            Some(inode) => match &inode.kind {
                InodeKind::Symlink { target } => target.clone(),
                _ => return Ok(current),
            },
        };
        current = path::join(&path::parent(&current), &target)?;
    }
    Err(FsError::TooManyLinks)
}
