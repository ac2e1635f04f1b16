//! Versioned snapshot codec for a whole filesystem.
//!
//! Stream layout, all integers little-endian, `string` meaning a `u64`
//! length followed by the raw bytes:
//!
//! ```text
//! u64 inode_count
//! per inode:
//!   string path
//!   u8  type                  ; 0 file, 1 dir, 2 symlink
//!   u16 mode
//!   u32 uid ; u32 gid
//!   i64 ctime ; i64 mtime ; i64 atime
//!   File    : u64 size ; size content bytes
//!   Dir     : u64 child_count ; child_count strings
//!   Symlink : string target
//! ```
//!
//! Bloom filters are never written; [`load`] recomputes them from content,
//! along with the counters. The version tag travels with the host next to
//! the stream (datatype registration, image envelope), not inside it.

use alloc::vec;
use alloc::vec::Vec;

use crate::bloom::TrigramBloom;
use crate::dev::{DevError, Sink, Source};
use crate::fs::Filesystem;
use crate::inode::{Inode, InodeKind, InodeType};

/// Current encoding version.
pub const SNAPSHOT_VERSION: u32 = 0;

/// Errors surfaced by [`load`].
#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotError {
    /// The stream carries an encoding version this build does not read.
    UnsupportedVersion(u32),
    /// Malformed stream content.
    Corrupt,
    /// The underlying stream failed.
    Dev(DevError),
}

impl From<DevError> for SnapshotError {
    fn from(e: DevError) -> Self {
        SnapshotError::Dev(e)
    }
}

/// Write `fs` to `out` in map iteration order.
pub fn save(fs: &Filesystem, out: &mut dyn Sink) -> Result<(), DevError> {
    write_u64(out, fs.total_inodes())?;
    for (p, inode) in fs.iter() {
        write_string(out, p)?;
        out.write_all(&[inode.type_().tag()])?;
        out.write_all(&inode.mode.to_le_bytes())?;
        out.write_all(&inode.uid.to_le_bytes())?;
        out.write_all(&inode.gid.to_le_bytes())?;
        out.write_all(&inode.ctime.to_le_bytes())?;
        out.write_all(&inode.mtime.to_le_bytes())?;
        out.write_all(&inode.atime.to_le_bytes())?;
        match &inode.kind {
            InodeKind::File { data, .. } => {
                write_u64(out, data.len() as u64)?;
                if !data.is_empty() {
                    out.write_all(data)?;
                }
            }
            InodeKind::Dir { children } => {
                write_u64(out, children.len() as u64)?;
                for name in children {
                    write_string(out, name)?;
                }
            }
            InodeKind::Symlink { target } => write_string(out, target)?,
        }
    }
    Ok(())
}

/// Rebuild a filesystem from a version-`version` stream.
///
/// A failure at any point drops whatever was built so far and returns the
/// error; nothing half-loaded escapes.
pub fn load(input: &mut dyn Source, version: u32) -> Result<Filesystem, SnapshotError> {
    if version != SNAPSHOT_VERSION {
        warn!("rejecting snapshot stream with unknown version {}", version);
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let count = read_u64(input)?;
    let mut fs = Filesystem::empty();
    for _ in 0..count {
        let p = read_string(input)?;
        let tag = read_u8(input)?;
        let mode = read_u16(input)?;
        let uid = read_u32(input)?;
        let gid = read_u32(input)?;
        let ctime = read_i64(input)?;
        let mtime = read_i64(input)?;
        let atime = read_i64(input)?;
        let kind = match InodeType::from_tag(tag) {
            Some(InodeType::File) => {
                let size = read_u64(input)? as usize;
                let mut data = vec![0u8; size];
                if size > 0 {
                    input.read_exact(&mut data)?;
                }
                let bloom = TrigramBloom::build(&data);
                InodeKind::File { data, bloom }
            }
            Some(InodeType::Dir) => {
                let child_count = read_u64(input)?;
                let mut children = Vec::new();
                for _ in 0..child_count {
                    children.push(read_string(input)?);
                }
                InodeKind::Dir { children }
            }
            Some(InodeType::Symlink) => InodeKind::Symlink {
                target: read_string(input)?,
            },
            None => return Err(SnapshotError::Corrupt),
        };
        fs.insert(
            p,
            Inode {
                mode,
                uid,
                gid,
                ctime,
                mtime,
                atime,
                kind,
            },
        );
    }
    Ok(fs)
}

fn write_u64(out: &mut dyn Sink, v: u64) -> Result<(), DevError> {
    out.write_all(&v.to_le_bytes())
}

fn write_string(out: &mut dyn Sink, bytes: &[u8]) -> Result<(), DevError> {
    write_u64(out, bytes.len() as u64)?;
    out.write_all(bytes)
}

fn read_u8(input: &mut dyn Source) -> Result<u8, DevError> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(input: &mut dyn Source) -> Result<u16, DevError> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(input: &mut dyn Source) -> Result<u32, DevError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(input: &mut dyn Source) -> Result<u64, DevError> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(input: &mut dyn Source) -> Result<i64, DevError> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_string(input: &mut dyn Source) -> Result<Vec<u8>, DevError> {
    let len = read_u64(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(buf)
}
