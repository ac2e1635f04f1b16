//! Inode primitives: the three node shapes and their payload operations.

use alloc::vec::Vec;

use crate::bloom::TrigramBloom;

pub const DEFAULT_FILE_MODE: u16 = 0o644;
pub const DEFAULT_DIR_MODE: u16 = 0o755;
pub const DEFAULT_SYMLINK_MODE: u16 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Dir,
    Symlink,
}

impl InodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            InodeType::File => "file",
            InodeType::Dir => "dir",
            InodeType::Symlink => "symlink",
        }
    }

    /// Wire tag used by the snapshot codec and the digest.
    pub fn tag(self) -> u8 {
        match self {
            InodeType::File => 0,
            InodeType::Dir => 1,
            InodeType::Symlink => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<InodeType> {
        match tag {
            0 => Some(InodeType::File),
            1 => Some(InodeType::Dir),
            2 => Some(InodeType::Symlink),
            _ => None,
        }
    }
}

/// Payload of an inode, by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InodeKind {
    File {
        data: Vec<u8>,
        /// Derived from `data`; rebuilt on every write, never persisted.
        bloom: TrigramBloom,
    },
    Dir {
        /// Child basenames in insertion order.
        children: Vec<Vec<u8>>,
    },
    Symlink {
        /// Stored exactly as given, absolute or relative.
        target: Vec<u8>,
    },
}

/// The datum behind one path: permission metadata, millisecond timestamps
/// and the type-specific payload.
///
/// Inodes are owned uniquely by their filesystem; dropping one frees the
/// payload with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub ctime: i64,
    pub mtime: i64,
    pub atime: i64,
    pub kind: InodeKind,
}

impl Inode {
    /// Empty regular file. Mode 0 selects the per-shape default.
    pub fn new_file(mode: u16, now: i64) -> Self {
        Self::new(
            InodeKind::File {
                data: Vec::new(),
                bloom: TrigramBloom::empty(),
            },
            mode,
            DEFAULT_FILE_MODE,
            now,
        )
    }

    /// Empty directory. Mode 0 selects the per-shape default.
    pub fn new_dir(mode: u16, now: i64) -> Self {
        Self::new(
            InodeKind::Dir {
                children: Vec::new(),
            },
            mode,
            DEFAULT_DIR_MODE,
            now,
        )
    }

    /// Symbolic link to `target`. Mode 0 selects the per-shape default.
    pub fn new_symlink(target: Vec<u8>, mode: u16, now: i64) -> Self {
        Self::new(
            InodeKind::Symlink { target },
            mode,
            DEFAULT_SYMLINK_MODE,
            now,
        )
    }

    fn new(kind: InodeKind, mode: u16, default_mode: u16, now: i64) -> Self {
        Inode {
            mode: if mode == 0 { default_mode } else { mode },
            uid: 0,
            gid: 0,
            ctime: now,
            mtime: now,
            atime: now,
            kind,
        }
    }

    pub fn type_(&self) -> InodeType {
        match self.kind {
            InodeKind::File { .. } => InodeType::File,
            InodeKind::Dir { .. } => InodeType::Dir,
            InodeKind::Symlink { .. } => InodeType::Symlink,
        }
    }

    pub fn is_file(&self) -> bool {
        self.type_() == InodeType::File
    }

    pub fn is_dir(&self) -> bool {
        self.type_() == InodeType::Dir
    }

    pub fn is_symlink(&self) -> bool {
        self.type_() == InodeType::Symlink
    }

    /// Content length for files, child count for directories, target length
    /// for symlinks.
    pub fn size(&self) -> u64 {
        match &self.kind {
            InodeKind::File { data, .. } => data.len() as u64,
            InodeKind::Dir { children } => children.len() as u64,
            InodeKind::Symlink { target } => target.len() as u64,
        }
    }

    /// Child basenames; empty for non-directories.
    pub fn children(&self) -> &[Vec<u8>] {
        match &self.kind {
            InodeKind::Dir { children } => children,
            _ => &[],
        }
    }

    pub fn has_child(&self, name: &[u8]) -> bool {
        self.children().iter().any(|c| c == name)
    }

    /// Append `name` to the child list unless already present. No-op on
    /// non-directories.
    pub fn add_child(&mut self, name: &[u8]) {
        if let InodeKind::Dir { children } = &mut self.kind {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_vec());
            }
        }
    }

    /// Remove `name` from the child list; reports whether anything was
    /// removed.
    pub fn remove_child(&mut self, name: &[u8]) -> bool {
        if let InodeKind::Dir { children } = &mut self.kind {
            if let Some(at) = children.iter().position(|c| c == name) {
                children.remove(at);
                return true;
            }
        }
        false
    }

    /// Replace file content and rebuild the bloom. No-op on non-files.
    pub fn set_data(&mut self, content: &[u8]) {
        if let InodeKind::File { data, bloom } = &mut self.kind {
            data.clear();
            data.extend_from_slice(content);
            *bloom = TrigramBloom::build(data);
        }
    }

    /// Extend file content and rebuild the bloom. No-op on non-files.
    pub fn append_data(&mut self, content: &[u8]) {
        if let InodeKind::File { data, bloom } = &mut self.kind {
            data.extend_from_slice(content);
            *bloom = TrigramBloom::build(data);
        }
    }

    /// Shrink (releasing the tail) or zero-extend file content to `len`,
    /// rebuilding the bloom. No-op on non-files.
    pub fn resize_data(&mut self, len: usize) {
        if let InodeKind::File { data, bloom } = &mut self.kind {
            if len < data.len() {
                data.truncate(len);
                data.shrink_to_fit();
            } else {
                data.resize(len, 0);
            }
            *bloom = TrigramBloom::build(data);
        }
    }
}
