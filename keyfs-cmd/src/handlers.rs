//! The `FS.*` command handlers.
//!
//! Arity is checked by the dispatcher before a handler runs; handlers index
//! `argv` (command name at 0, key at 1) within their registered bounds.
//! Every handler either commits its whole effect or returns an error with
//! the filesystem untouched; only the recursive copy and move walks commit
//! per path.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use keyfs::bloom;
use keyfs::error::{FsError, Result};
use keyfs::fs::Filesystem;
use keyfs::glob::glob_match;
use keyfs::inode::{Inode, InodeKind, InodeType};
use keyfs::path;
use keyfs::resolve::resolve;

use crate::keyspace::Keyspace;
use crate::reply::Reply;

// ---- informational ----

pub fn info(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let fs = ks.get(&argv[1])?;
    Ok(Reply::Map(vec![
        ("files", Reply::Int(fs.files() as i64)),
        ("directories", Reply::Int(fs.dirs() as i64)),
        ("symlinks", Reply::Int(fs.symlinks() as i64)),
        ("total_data_bytes", Reply::Int(fs.data_bytes() as i64)),
        ("total_inodes", Reply::Int(fs.total_inodes() as i64)),
    ]))
}

pub fn stat(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    match fs.lookup(&p) {
        None => Ok(Reply::Null),
        Some(inode) => Ok(Reply::Map(vec![
            ("type", Reply::bulk(inode.type_().as_str().as_bytes())),
            ("mode", Reply::Bulk(mode_octal(inode.mode))),
            ("uid", Reply::Int(i64::from(inode.uid))),
            ("gid", Reply::Int(i64::from(inode.gid))),
            ("size", Reply::Int(inode.size() as i64)),
            ("ctime", Reply::Int(inode.ctime)),
            ("mtime", Reply::Int(inode.mtime)),
            ("atime", Reply::Int(inode.atime)),
        ])),
    }
}

pub fn test(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    Ok(Reply::Int(fs.lookup(&p).is_some() as i64))
}

// ---- reading ----

pub fn cat(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let now = ks.now_ms();
    let fs = ks.get_mut(&argv[1])?;
    let p = resolve(fs, &path_arg(&argv[2])?)?;
    let inode = match fs.lookup_mut(&p) {
        None => return Ok(Reply::Null),
        Some(inode) => inode,
    };
    match &inode.kind {
        InodeKind::File { data, .. } => {
            let content = data.clone();
            inode.atime = now;
            Ok(Reply::Bulk(content))
        }
        _ => Err(FsError::NotFile),
    }
}

pub fn readlink(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    match fs.lookup(&p) {
        None => Ok(Reply::Null),
        Some(inode) => match &inode.kind {
            InodeKind::Symlink { target } => Ok(Reply::Bulk(target.clone())),
            _ => Err(FsError::NotSymlink),
        },
    }
}

// ---- writing ----

pub fn echo(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let append = trailing_flag(argv, 4, "APPEND")?;
    write_file(ks, &argv[1], &argv[2], &argv[3], append)?;
    Ok(Reply::Ok)
}

pub fn append(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let size = write_file(ks, &argv[1], &argv[2], &argv[3], true)?;
    Ok(Reply::Int(size as i64))
}

fn write_file(
    ks: &mut Keyspace,
    key: &[u8],
    raw_path: &[u8],
    content: &[u8],
    append: bool,
) -> Result<u64> {
    let p = path_arg(raw_path)?;
    if path::is_root(&p) {
        return Err(if append {
            FsError::AppendRoot
        } else {
            FsError::WriteRoot
        });
    }
    let now = ks.now_ms();
    let fs = ks.get_or_create(key);
    fs.ensure_parents(&p, now)?;
    match fs.lookup(&p) {
        Some(inode) if !inode.is_file() => return Err(FsError::NotFile),
        Some(_) => {}
        None => {
            fs.insert(p.clone(), Inode::new_file(0, now));
            attach_to_parent(fs, &p, now);
        }
    }
    let size = fs.write_file_data(&p, content, append)?;
    if let Some(inode) = fs.lookup_mut(&p) {
        inode.mtime = now;
    }
    Ok(size)
}

pub fn touch(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let p = path_arg(&argv[2])?;
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    match fs.lookup_mut(&p) {
        Some(inode) => {
            inode.mtime = now;
            inode.atime = now;
        }
        None => {
            fs.ensure_parents(&p, now)?;
            fs.insert(p.clone(), Inode::new_file(0, now));
            attach_to_parent(fs, &p, now);
        }
    }
    Ok(Reply::Ok)
}

pub fn mkdir(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let parents = trailing_flag(argv, 3, "PARENTS")?;
    let p = path_arg(&argv[2])?;
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    if let Some(inode) = fs.lookup(&p) {
        return if inode.is_dir() && parents {
            Ok(Reply::Ok)
        } else {
            Err(FsError::AlreadyExists)
        };
    }
    if parents {
        fs.ensure_parents(&p, now)?;
    } else {
        match fs.lookup(&path::parent(&p)) {
            None => return Err(FsError::NoSuchDir),
            Some(inode) if !inode.is_dir() => return Err(FsError::NotDir),
            Some(_) => {}
        }
    }
    fs.insert(p.clone(), Inode::new_dir(0, now));
    attach_to_parent(fs, &p, now);
    Ok(Reply::Ok)
}

pub fn rm(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let recursive = trailing_flag(argv, 3, "RECURSIVE")?;
    let p = path_arg(&argv[2])?;
    if path::is_root(&p) {
        return Err(FsError::DeleteRoot);
    }
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    match fs.lookup(&p) {
        None => return Ok(Reply::Int(0)),
        Some(inode) => {
            if inode.is_dir() && !inode.children().is_empty() && !recursive {
                return Err(FsError::DirNotEmpty);
            }
        }
    }
    remove_subtree(fs, &p);
    let name = path::basename(&p).to_vec();
    if let Some(parent) = fs.lookup_mut(&path::parent(&p)) {
        parent.remove_child(&name);
        parent.mtime = now;
    }
    Ok(Reply::Int(1))
}

/// Depth-first delete of `p` and everything under it. Each child list is
/// snapshotted before descending; removal invalidates it.
fn remove_subtree(fs: &mut Filesystem, p: &[u8]) {
    let children = match fs.lookup(p) {
        Some(inode) => inode.children().to_vec(),
        None => return,
    };
    for name in &children {
        remove_subtree(fs, &path::child(p, name));
    }
    fs.remove(p);
}

pub fn chmod(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let mode = octal_mode_arg(&argv[3])?;
    let p = path_arg(&argv[2])?;
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    let inode = fs.lookup_mut(&p).ok_or(FsError::NoSuchFileOrDir)?;
    inode.mode = mode;
    inode.ctime = now;
    Ok(Reply::Ok)
}

pub fn chown(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let uid = id_arg(&argv[3], FsError::UidOutOfRange)?;
    let gid = match argv.get(4) {
        Some(arg) => Some(id_arg(arg, FsError::GidOutOfRange)?),
        None => None,
    };
    let p = path_arg(&argv[2])?;
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    let inode = fs.lookup_mut(&p).ok_or(FsError::NoSuchFileOrDir)?;
    inode.uid = uid;
    if let Some(gid) = gid {
        inode.gid = gid;
    }
    inode.ctime = now;
    Ok(Reply::Ok)
}

pub fn ln(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let target = argv[2].clone(); // stored as given, absolute or relative
    let linkpath = path_arg(&argv[3])?;
    if path::is_root(&linkpath) {
        return Err(FsError::SymlinkAtRoot);
    }
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    if fs.lookup(&linkpath).is_some() {
        return Err(FsError::AlreadyExists);
    }
    fs.ensure_parents(&linkpath, now)?;
    fs.insert(linkpath.clone(), Inode::new_symlink(target, 0, now));
    attach_to_parent(fs, &linkpath, now);
    Ok(Reply::Ok)
}

pub fn cp(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let recursive = trailing_flag(argv, 4, "RECURSIVE")?;
    let src = path_arg(&argv[2])?;
    let dst = path_arg(&argv[3])?;
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    let src_inode = fs.lookup(&src).ok_or(FsError::NoSuchPath)?;
    let src_is_dir = src_inode.is_dir();
    if fs.lookup(&dst).is_some() {
        return Err(FsError::DestinationExists);
    }
    if src_is_dir && !recursive {
        return Err(FsError::SourceIsDir);
    }
    fs.ensure_parents(&dst, now)?;
    copy_tree(fs, &src, &dst)?;
    attach_to_parent(fs, &dst, now);
    Ok(Reply::Ok)
}

/// Clone `src` to `dst`, preserving mode, owner and all three timestamps.
/// Directory child lists refill in original order as each child lands; the
/// source list is snapshotted before descending.
fn copy_tree(fs: &mut Filesystem, src: &[u8], dst: &[u8]) -> Result<()> {
    let original = fs.lookup(src).ok_or(FsError::CopyFailed)?;
    let child_names = original.children().to_vec();
    let mut copy = clone_inode(original);
    if let InodeKind::Dir { children } = &mut copy.kind {
        children.clear();
    }
    fs.insert(dst.to_vec(), copy);
    for name in &child_names {
        copy_tree(fs, &path::child(src, name), &path::child(dst, name))?;
        if let Some(dir) = fs.lookup_mut(dst) {
            dir.add_child(name);
        }
    }
    Ok(())
}

fn clone_inode(inode: &Inode) -> Inode {
    let kind = match &inode.kind {
        InodeKind::File { data, .. } => {
            let mut copy = Inode::new_file(0, 0);
            copy.set_data(data); // fresh bloom for the fresh content
            copy.kind
        }
        InodeKind::Dir { children } => InodeKind::Dir {
            children: children.clone(),
        },
        InodeKind::Symlink { target } => InodeKind::Symlink {
            target: target.clone(),
        },
    };
    Inode {
        mode: inode.mode,
        uid: inode.uid,
        gid: inode.gid,
        ctime: inode.ctime,
        mtime: inode.mtime,
        atime: inode.atime,
        kind,
    }
}

pub fn mv(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let src = path_arg(&argv[2])?;
    let dst = path_arg(&argv[3])?;
    if path::is_root(&src) {
        return Err(FsError::MoveRoot);
    }
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    let src_is_dir = fs.lookup(&src).ok_or(FsError::NoSuchPath)?.is_dir();
    if fs.lookup(&dst).is_some() {
        return Err(FsError::DestinationExists);
    }
    if src_is_dir && path::has_prefix(&dst, &src) {
        return Err(FsError::MoveIntoSubtree);
    }
    fs.ensure_parents(&dst, now)?;

    // collect the whole subtree first, then rename pair by pair; the
    // inodes move, nothing is cloned
    let descendants = if src_is_dir {
        fs.subtree_paths(&src)
    } else {
        Vec::new()
    };
    debug!("renaming subtree of {} descendant paths", descendants.len());
    if let Some(inode) = fs.remove(&src) {
        fs.insert(dst.clone(), inode);
    }
    for old in descendants {
        if let Some(inode) = fs.remove(&old) {
            let mut renamed = dst.clone();
            renamed.extend_from_slice(&old[src.len()..]);
            fs.insert(renamed, inode);
        }
    }

    let name = path::basename(&src).to_vec();
    if let Some(parent) = fs.lookup_mut(&path::parent(&src)) {
        parent.remove_child(&name);
        parent.mtime = now;
    }
    attach_to_parent(fs, &dst, now);
    Ok(Reply::Ok)
}

pub fn truncate(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let len = int_arg(&argv[3]).ok_or(FsError::BadLength)?;
    if len < 0 {
        return Err(FsError::BadLength);
    }
    let now = ks.now_ms();
    let fs = ks.get_or_create(&argv[1]);
    let p = resolve(fs, &path_arg(&argv[2])?)?;
    fs.resize_file(&p, len as u64)?;
    if let Some(inode) = fs.lookup_mut(&p) {
        inode.mtime = now;
    }
    Ok(Reply::Ok)
}

pub fn utimens(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let atime = int_arg(&argv[3]).ok_or(FsError::BadTimestamp)?;
    let mtime = int_arg(&argv[4]).ok_or(FsError::BadTimestamp)?;
    let p = path_arg(&argv[2])?;
    let fs = ks.get_or_create(&argv[1]);
    let inode = fs.lookup_mut(&p).ok_or(FsError::NoSuchFileOrDir)?;
    if atime != -1 {
        inode.atime = atime;
    }
    if mtime != -1 {
        inode.mtime = mtime;
    }
    Ok(Reply::Ok)
}

// ---- listing & traversal ----

pub fn ls(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let (raw_path, long) = match argv.len() {
        2 => (&b"/"[..], false),
        3 => {
            if token_eq(&argv[2], "LONG") {
                (&b"/"[..], true)
            } else {
                (argv[2].as_slice(), false)
            }
        }
        _ => {
            if !token_eq(&argv[3], "LONG") {
                return Err(syntax("LONG"));
            }
            (argv[2].as_slice(), true)
        }
    };
    let now = ks.now_ms();
    let fs = ks.get_mut(&argv[1])?;
    let p = resolve(fs, &path_arg(raw_path)?)?;
    let children = match fs.lookup(&p) {
        None => return Err(FsError::NoSuchDir),
        Some(inode) if !inode.is_dir() => return Err(FsError::NotDir),
        Some(inode) => inode.children().to_vec(),
    };
    if let Some(inode) = fs.lookup_mut(&p) {
        inode.atime = now;
    }
    if !long {
        return Ok(Reply::Array(children.into_iter().map(Reply::Bulk).collect()));
    }
    let mut rows = Vec::with_capacity(children.len());
    for name in &children {
        if let Some(entry) = fs.lookup(&path::child(&p, name)) {
            rows.push(Reply::Array(vec![
                Reply::Bulk(name.clone()),
                Reply::bulk(entry.type_().as_str().as_bytes()),
                Reply::Bulk(mode_octal(entry.mode)),
                Reply::Int(entry.size() as i64),
                Reply::Int(entry.mtime),
            ]));
        }
    }
    Ok(Reply::Array(rows))
}

pub fn tree(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let depth = match argv.len() {
        3 => 64,
        5 => {
            if !token_eq(&argv[3], "DEPTH") {
                return Err(syntax("DEPTH"));
            }
            let depth = int_arg(&argv[4]).ok_or(FsError::BadDepth)?;
            if depth < 0 {
                return Err(FsError::BadDepth);
            }
            depth as u64
        }
        _ => return Err(FsError::WrongArity),
    };
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    if fs.lookup(&p).is_none() {
        return Err(FsError::NoSuchPath);
    }
    Ok(render_tree(fs, &p, depth))
}

/// Directories within the depth budget render as
/// `[name_with_suffix, [children…]]`; everything else is the scalar name.
/// Suffixes: `/` for directories, `@` for symlinks. Root renders as `/`,
/// never `//`.
fn render_tree(fs: &Filesystem, p: &[u8], depth: u64) -> Reply {
    let inode = match fs.lookup(p) {
        Some(inode) => inode,
        None => return Reply::Null,
    };
    let mut name = if path::is_root(p) {
        Vec::new()
    } else {
        path::basename(p).to_vec()
    };
    match &inode.kind {
        InodeKind::Dir { children } => {
            name.push(b'/');
            if depth == 0 {
                return Reply::Bulk(name);
            }
            let rendered = children
                .iter()
                .map(|c| render_tree(fs, &path::child(p, c), depth - 1))
                .collect();
            Reply::Array(vec![Reply::Bulk(name), Reply::Array(rendered)])
        }
        InodeKind::Symlink { .. } => {
            name.push(b'@');
            Reply::Bulk(name)
        }
        InodeKind::File { .. } => Reply::Bulk(name),
    }
}

pub fn find(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let type_filter = match argv.len() {
        4 => None,
        6 => {
            if !token_eq(&argv[4], "TYPE") {
                return Err(syntax("TYPE"));
            }
            Some(type_arg(&argv[5])?)
        }
        _ => return Err(FsError::WrongArity),
    };
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    if fs.lookup(&p).is_none() {
        return Err(FsError::NoSuchPath);
    }
    let mut hits = Vec::new();
    walk_find(fs, &p, &argv[3], type_filter, &mut hits);
    Ok(Reply::Array(hits))
}

fn walk_find(
    fs: &Filesystem,
    p: &[u8],
    pattern: &[u8],
    type_filter: Option<InodeType>,
    hits: &mut Vec<Reply>,
) {
    let inode = match fs.lookup(p) {
        Some(inode) => inode,
        None => return,
    };
    if glob_match(pattern, path::basename(p), false)
        && type_filter.map_or(true, |t| t == inode.type_())
    {
        hits.push(Reply::bulk(p));
    }
    for name in inode.children() {
        walk_find(fs, &path::child(p, name), pattern, type_filter, hits);
    }
}

pub fn grep(ks: &mut Keyspace, argv: &[Vec<u8>]) -> Result<Reply> {
    let nocase = trailing_flag(argv, 4, "NOCASE")?;
    let fs = ks.get(&argv[1])?;
    let p = path_arg(&argv[2])?;
    if fs.lookup(&p).is_none() {
        return Err(FsError::NoSuchPath);
    }
    let pattern = argv[3].as_slice();
    let literal = bloom::longest_literal(pattern);
    let mut hits = Vec::new();
    walk_grep(fs, &p, pattern, &literal, nocase, &mut hits);
    Ok(Reply::Array(hits))
}

fn walk_grep(
    fs: &Filesystem,
    p: &[u8],
    pattern: &[u8],
    literal: &[u8],
    nocase: bool,
    hits: &mut Vec<Reply>,
) {
    let inode = match fs.lookup(p) {
        Some(inode) => inode,
        None => return,
    };
    if let InodeKind::File { data, bloom } = &inode.kind {
        // a negative filter answer proves no line can match
        if bloom.may_contain(literal) {
            grep_file(p, data, pattern, literal, nocase, hits);
        }
    }
    for name in inode.children() {
        walk_grep(fs, &path::child(p, name), pattern, literal, nocase, hits);
    }
}

/// Content with a NUL byte is binary: report a single pseudo-match if the
/// pattern's literal occurs anywhere. Text splits on `\n` and matches the
/// whole glob per line, 1-based.
fn grep_file(
    p: &[u8],
    data: &[u8],
    pattern: &[u8],
    literal: &[u8],
    nocase: bool,
    hits: &mut Vec<Reply>,
) {
    if data.contains(&0) {
        if contains_nocase(data, literal) {
            hits.push(Reply::Array(vec![
                Reply::bulk(p),
                Reply::Int(0),
                Reply::bulk(b"Binary file matches"),
            ]));
        }
        return;
    }
    if data.is_empty() {
        return;
    }
    let body = match data.last() {
        Some(&b'\n') => &data[..data.len() - 1],
        _ => data,
    };
    for (at, line) in body.split(|&b| b == b'\n').enumerate() {
        if glob_match(pattern, line, nocase) {
            hits.push(Reply::Array(vec![
                Reply::bulk(p),
                Reply::Int(at as i64 + 1),
                Reply::bulk(line),
            ]));
        }
    }
}

// ---- shared helpers ----

/// Reject NUL bytes, then normalize. Stored paths stay transport-safe.
fn path_arg(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.contains(&0) {
        return Err(syntax("path without NUL bytes"));
    }
    path::normalize(raw)
}

fn syntax(expected: &str) -> FsError {
    FsError::Syntax(String::from(expected))
}

fn token_eq(arg: &[u8], token: &str) -> bool {
    arg.eq_ignore_ascii_case(token.as_bytes())
}

/// Optional final keyword at `at`: absent, the expected token, or a syntax
/// error naming it.
fn trailing_flag(argv: &[Vec<u8>], at: usize, token: &str) -> Result<bool> {
    match argv.get(at) {
        None => Ok(false),
        Some(arg) if token_eq(arg, token) => Ok(true),
        Some(_) => Err(syntax(token)),
    }
}

fn int_arg(arg: &[u8]) -> Option<i64> {
    core::str::from_utf8(arg).ok()?.parse().ok()
}

fn octal_mode_arg(arg: &[u8]) -> Result<u16> {
    if arg.is_empty() {
        return Err(FsError::BadMode);
    }
    let mut value: u32 = 0;
    for &b in arg {
        if !(b'0'..=b'7').contains(&b) {
            return Err(FsError::BadMode);
        }
        value = value * 8 + u32::from(b - b'0');
        if value > 0o7777 {
            return Err(FsError::BadMode);
        }
    }
    Ok(value as u16)
}

fn id_arg(arg: &[u8], out_of_range: FsError) -> Result<u32> {
    match int_arg(arg) {
        Some(v) if v >= 0 && v <= i64::from(u32::max_value()) => Ok(v as u32),
        _ => Err(out_of_range),
    }
}

fn type_arg(arg: &[u8]) -> Result<InodeType> {
    if token_eq(arg, "file") {
        Ok(InodeType::File)
    } else if token_eq(arg, "dir") {
        Ok(InodeType::Dir)
    } else if token_eq(arg, "symlink") {
        Ok(InodeType::Symlink)
    } else {
        Err(FsError::BadType)
    }
}

fn mode_octal(mode: u16) -> Vec<u8> {
    format!("{:04o}", mode).into_bytes()
}

fn attach_to_parent(fs: &mut Filesystem, p: &[u8], now: i64) {
    let name = path::basename(p).to_vec();
    if let Some(parent) = fs.lookup_mut(&path::parent(p)) {
        parent.add_child(&name);
        parent.mtime = now;
    }
}

fn contains_nocase(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
