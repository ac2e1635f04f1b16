use std::io::{Seek, SeekFrom};

use crate::digest::{digest, mem_usage};
use crate::error::FsError;
use crate::fs::Filesystem;
use crate::inode::Inode;
use crate::path;
use crate::resolve::resolve;
use crate::snapshot::{self, SnapshotError, SNAPSHOT_VERSION};

const NOW: i64 = 1_000;

fn attach(fs: &mut Filesystem, p: &[u8]) {
    let name = path::basename(p).to_vec();
    let parent = path::parent(p);
    if let Some(inode) = fs.lookup_mut(&parent) {
        inode.add_child(&name);
    }
}

fn add_file(fs: &mut Filesystem, p: &[u8], content: &[u8]) {
    fs.ensure_parents(p, NOW).expect("parents");
    fs.insert(p.to_vec(), Inode::new_file(0, NOW));
    fs.write_file_data(p, content, false).expect("write");
    attach(fs, p);
}

fn add_symlink(fs: &mut Filesystem, p: &[u8], target: &[u8]) {
    fs.ensure_parents(p, NOW).expect("parents");
    fs.insert(p.to_vec(), Inode::new_symlink(target.to_vec(), 0, NOW));
    attach(fs, p);
}

fn sample_fs() -> Filesystem {
    let mut fs = Filesystem::new(NOW);
    add_file(&mut fs, b"/etc/motd", b"hello world");
    add_file(&mut fs, b"/var/log/app.log", b"line one\nline two");
    add_symlink(&mut fs, b"/etc/alias", b"motd");
    fs
}

#[test]
fn fresh_filesystem_has_only_root() {
    let fs = Filesystem::new(NOW);
    assert!(fs.lookup(b"/").expect("root").is_dir());
    assert_eq!(fs.total_inodes(), 1);
    assert!(fs.is_trivial());
    fs.fsck().expect("clean");
}

#[test]
fn counters_track_inserts_and_removes() {
    let mut fs = sample_fs();
    assert_eq!(fs.files(), 2);
    assert_eq!(fs.dirs(), 4); // /, /etc, /var, /var/log
    assert_eq!(fs.symlinks(), 1);
    assert_eq!(fs.data_bytes(), 11 + 17);
    fs.fsck().expect("clean");

    let gone = fs.remove(b"/etc/motd").expect("present");
    assert_eq!(gone.size(), 11);
    assert_eq!(fs.files(), 1);
    assert_eq!(fs.data_bytes(), 17);
    if let Some(etc) = fs.lookup_mut(b"/etc") {
        etc.remove_child(b"motd");
    }
    fs.fsck().expect("clean after remove");
}

#[test]
fn ensure_parents_creates_chain_once() {
    let mut fs = Filesystem::new(NOW);
    fs.ensure_parents(b"/a/b/c/d", NOW).expect("create chain");
    assert!(fs.lookup(b"/a/b/c").expect("c").is_dir());
    assert!(fs.lookup(b"/a").expect("a").has_child(b"b"));
    let dirs = fs.dirs();
    fs.ensure_parents(b"/a/b/c/d", NOW).expect("idempotent");
    assert_eq!(fs.dirs(), dirs);
    fs.fsck().expect("clean");
}

#[test]
fn ensure_parents_rejects_non_directory_ancestor() {
    let mut fs = Filesystem::new(NOW);
    add_file(&mut fs, b"/a", b"x");
    assert_eq!(fs.ensure_parents(b"/a/b", NOW), Err(FsError::ParentConflict));
    fs.fsck().expect("unchanged");
}

#[test]
fn file_writes_keep_byte_totals() {
    let mut fs = Filesystem::new(NOW);
    add_file(&mut fs, b"/f", b"12345");
    assert_eq!(fs.data_bytes(), 5);
    assert_eq!(fs.write_file_data(b"/f", b"xyz", false).expect("set"), 3);
    assert_eq!(fs.data_bytes(), 3);
    assert_eq!(fs.write_file_data(b"/f", b"abc", true).expect("append"), 6);
    assert_eq!(fs.data_bytes(), 6);
    fs.resize_file(b"/f", 2).expect("shrink");
    assert_eq!(fs.data_bytes(), 2);
    fs.resize_file(b"/f", 10).expect("extend");
    assert_eq!(fs.data_bytes(), 10);
    assert_eq!(fs.lookup(b"/f").expect("f").size(), 10);
    fs.fsck().expect("clean");

    assert_eq!(
        fs.write_file_data(b"/missing", b"", false),
        Err(FsError::NoSuchFileOrDir)
    );
    assert_eq!(fs.resize_file(b"/", 0), Err(FsError::NotFile));
}

#[test]
fn resolve_follows_chains() {
    let mut fs = sample_fs();
    // relative target resolves against the link's directory
    assert_eq!(resolve(&fs, b"/etc/alias").expect("chain"), b"/etc/motd");
    // non-symlink and missing paths come back as-is
    assert_eq!(resolve(&fs, b"/etc/motd").expect("file"), b"/etc/motd");
    assert_eq!(resolve(&fs, b"/nope").expect("missing"), b"/nope");
    // absolute target restarts from root
    add_symlink(&mut fs, b"/var/mlink", b"/etc/alias");
    assert_eq!(resolve(&fs, b"/var/mlink").expect("abs"), b"/etc/motd");
}

#[test]
fn resolve_detects_loops() {
    let mut fs = Filesystem::new(NOW);
    add_symlink(&mut fs, b"/a", b"/b");
    add_symlink(&mut fs, b"/b", b"/a");
    assert_eq!(resolve(&fs, b"/a"), Err(FsError::TooManyLinks));
}

#[test]
fn subtree_paths_are_strict_descendants() {
    let fs = sample_fs();
    assert_eq!(
        fs.subtree_paths(b"/var"),
        [b"/var/log".to_vec(), b"/var/log/app.log".to_vec()]
    );
    assert!(fs.subtree_paths(b"/etc/motd").is_empty());
    assert_eq!(fs.subtree_paths(b"/").len(), 6);
}

#[test]
fn snapshot_round_trip_preserves_everything() {
    let fs = sample_fs();
    let mut buf: Vec<u8> = Vec::new();
    snapshot::save(&fs, &mut buf).expect("save");

    let mut stream = &buf[..];
    let loaded = snapshot::load(&mut stream, SNAPSHOT_VERSION).expect("load");
    loaded.fsck().expect("clean after load");
    assert_eq!(loaded.total_inodes(), fs.total_inodes());
    assert_eq!(loaded.data_bytes(), fs.data_bytes());
    assert_eq!(digest(&loaded), digest(&fs));
    let motd = loaded.lookup(b"/etc/motd").expect("motd");
    assert_eq!(motd.mode, 0o644);
    assert_eq!(motd.size(), 11);
    assert!(loaded.lookup(b"/etc/alias").expect("alias").is_symlink());
}

#[test]
fn snapshot_rejects_other_versions() {
    let fs = sample_fs();
    let mut buf: Vec<u8> = Vec::new();
    snapshot::save(&fs, &mut buf).expect("save");
    let mut stream = &buf[..];
    assert_eq!(
        snapshot::load(&mut stream, SNAPSHOT_VERSION + 1),
        Err(SnapshotError::UnsupportedVersion(SNAPSHOT_VERSION + 1))
    );
}

#[test]
fn snapshot_load_surfaces_truncation() {
    let fs = sample_fs();
    let mut buf: Vec<u8> = Vec::new();
    snapshot::save(&fs, &mut buf).expect("save");
    buf.truncate(buf.len() / 2);
    let mut stream = &buf[..];
    assert!(snapshot::load(&mut stream, SNAPSHOT_VERSION).is_err());
}

#[test]
fn snapshot_round_trip_through_a_file() {
    let fs = sample_fs();
    let mut file = tempfile::tempfile().expect("tempfile");
    snapshot::save(&fs, &mut file).expect("save");
    file.seek(SeekFrom::Start(0)).expect("rewind");
    let loaded = snapshot::load(&mut file, SNAPSHOT_VERSION).expect("load");
    assert_eq!(digest(&loaded), digest(&fs));
}

#[test]
fn digest_ignores_build_order() {
    let mut a = Filesystem::new(NOW);
    add_file(&mut a, b"/x", b"one");
    add_file(&mut a, b"/y", b"two");
    let mut b = Filesystem::new(NOW);
    add_file(&mut b, b"/y", b"two");
    add_file(&mut b, b"/x", b"one");
    assert_eq!(digest(&a), digest(&b));
}

#[test]
fn digest_sees_content_and_paths() {
    let mut a = Filesystem::new(NOW);
    add_file(&mut a, b"/x", b"one");
    let base = digest(&a);
    a.write_file_data(b"/x", b"two", false).expect("write");
    assert_ne!(digest(&a), base);

    let mut b = Filesystem::new(NOW);
    add_file(&mut b, b"/renamed", b"two");
    assert_ne!(digest(&a), digest(&b));
}

#[test]
fn mem_usage_grows_with_content() {
    let mut fs = Filesystem::new(NOW);
    let empty = mem_usage(&fs);
    add_file(&mut fs, b"/blob", &[7u8; 4096]);
    assert!(mem_usage(&fs) >= empty + 4096);
}

// Pseudo-random op soup; the invariants must survive every step.
#[test]
fn invariants_hold_under_mixed_operations() {
    let mut fs = Filesystem::new(NOW);
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    for round in 0..400 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let slot = (seed >> 33) % 8;
        let p = format!("/d{}/f{}", slot, (seed >> 17) % 4).into_bytes();
        match seed % 3 {
            0 => {
                if fs.lookup(&p).is_none() {
                    add_file(&mut fs, &p, format!("round {}", round).as_bytes());
                }
            }
            1 => {
                if fs.lookup(&p).map(|i| i.is_file()) == Some(true) {
                    fs.write_file_data(&p, b"rewritten", (seed & 1) == 1)
                        .expect("write");
                }
            }
            _ => {
                if fs.remove(&p).is_some() {
                    let parent = path::parent(&p);
                    let name = path::basename(&p).to_vec();
                    if let Some(inode) = fs.lookup_mut(&parent) {
                        inode.remove_child(&name);
                    }
                }
            }
        }
        if let Err(what) = fs.fsck() {
            panic!("round {}: {}", round, what);
        }
    }
}
