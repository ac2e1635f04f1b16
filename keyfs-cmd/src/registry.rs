//! Host registration: the command table and the datatype descriptor.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;

use keyfs::dev::{DevError, Sink, Source};
use keyfs::digest;
use keyfs::error::{FsError, Result};
use keyfs::fs::Filesystem;
use keyfs::snapshot::{self, SnapshotError, SNAPSHOT_VERSION};

use crate::handlers;
use crate::keyspace::Keyspace;
use crate::reply::Reply;

bitflags! {
    /// Attributes a command registers with the host.
    pub struct CommandFlags: u8 {
        /// Mutates the keyspace; propagated verbatim on success.
        const WRITE = 0b001;
        /// Never mutates; runnable on replicas.
        const READONLY = 0b010;
        /// Constant-time; eligible for the host's fast path.
        const FAST = 0b100;
        const READONLY_FAST = Self::READONLY.bits | Self::FAST.bits;
    }
}

pub type Handler = fn(&mut Keyspace, &[Vec<u8>]) -> Result<Reply>;

/// One command registration: name, handler, flags, arity bounds counting
/// the command name itself, and the key argument span.
pub struct CommandSpec {
    pub name: &'static str,
    pub handler: Handler,
    pub flags: CommandFlags,
    pub min_args: usize,
    pub max_args: usize,
    pub first_key: usize,
    pub last_key: usize,
}

const fn read(
    name: &'static str,
    handler: Handler,
    flags: CommandFlags,
    min_args: usize,
    max_args: usize,
) -> CommandSpec {
    CommandSpec {
        name,
        handler,
        flags,
        min_args,
        max_args,
        first_key: 1,
        last_key: 1,
    }
}

const fn write(name: &'static str, handler: Handler, min_args: usize, max_args: usize) -> CommandSpec {
    read(name, handler, CommandFlags::WRITE, min_args, max_args)
}

pub const COMMANDS: &[CommandSpec] = &[
    read("FS.INFO", handlers::info, CommandFlags::READONLY_FAST, 2, 2),
    read("FS.STAT", handlers::stat, CommandFlags::READONLY_FAST, 3, 3),
    read("FS.TEST", handlers::test, CommandFlags::READONLY_FAST, 3, 3),
    read("FS.READLINK", handlers::readlink, CommandFlags::READONLY_FAST, 3, 3),
    read("FS.CAT", handlers::cat, CommandFlags::READONLY, 3, 3),
    read("FS.LS", handlers::ls, CommandFlags::READONLY, 2, 4),
    read("FS.TREE", handlers::tree, CommandFlags::READONLY, 3, 5),
    read("FS.FIND", handlers::find, CommandFlags::READONLY, 4, 6),
    read("FS.GREP", handlers::grep, CommandFlags::READONLY, 4, 5),
    write("FS.ECHO", handlers::echo, 4, 5),
    write("FS.APPEND", handlers::append, 4, 4),
    write("FS.TOUCH", handlers::touch, 3, 3),
    write("FS.MKDIR", handlers::mkdir, 3, 4),
    write("FS.RM", handlers::rm, 3, 4),
    write("FS.CHMOD", handlers::chmod, 4, 4),
    write("FS.CHOWN", handlers::chown, 4, 5),
    write("FS.LN", handlers::ln, 4, 4),
    write("FS.CP", handlers::cp, 4, 5),
    write("FS.MV", handlers::mv, 4, 4),
    write("FS.TRUNCATE", handlers::truncate, 4, 4),
    write("FS.UTIMENS", handlers::utimens, 5, 5),
];

pub fn lookup_command(name: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| name.eq_ignore_ascii_case(spec.name.as_bytes()))
}

/// What the host does with the command besides replying: nothing, or feed
/// it verbatim to replicas and the snapshot log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagate {
    None,
    Verbatim,
}

/// Run one command against `ks`.
///
/// Arity is checked before the handler runs; write commands get the
/// trivial-key cleanup afterwards whether they succeeded or not, and
/// propagate only on success.
pub fn dispatch(ks: &mut Keyspace, argv: &[Vec<u8>]) -> (Reply, Propagate) {
    let spec = match argv.first().and_then(|name| lookup_command(name)) {
        Some(spec) => spec,
        None => {
            return (
                Reply::Error(FsError::Syntax(String::from("an FS.* command"))),
                Propagate::None,
            )
        }
    };
    trace!("dispatching {}", spec.name);
    if argv.len() < spec.min_args || argv.len() > spec.max_args {
        return (Reply::Error(FsError::WrongArity), Propagate::None);
    }
    let reply = match (spec.handler)(ks, argv) {
        Ok(reply) => reply,
        Err(err) => Reply::Error(err),
    };
    let is_write = spec.flags.contains(CommandFlags::WRITE);
    if is_write {
        ks.drop_if_trivial(&argv[spec.first_key]);
    }
    let propagate = if is_write && !reply.is_error() {
        Propagate::Verbatim
    } else {
        Propagate::None
    };
    (reply, propagate)
}

/// The datatype as registered with the host: a versioned name plus the
/// persistence and introspection callbacks invoked around the command
/// family.
pub struct DatatypeSpec {
    pub name: &'static str,
    pub encoding_version: u32,
    pub save: fn(&Filesystem, &mut dyn Sink) -> core::result::Result<(), DevError>,
    pub load: fn(&mut dyn Source, u32) -> core::result::Result<Filesystem, SnapshotError>,
    pub mem_usage: fn(&Filesystem) -> usize,
    pub digest: fn(&Filesystem) -> [u8; 32],
    pub free: fn(Filesystem),
}

pub const DATATYPE: DatatypeSpec = DatatypeSpec {
    name: "keyfs-pathtree",
    encoding_version: SNAPSHOT_VERSION,
    save: snapshot::save,
    load: snapshot::load,
    mem_usage: digest::mem_usage,
    digest: digest::digest,
    free: free_filesystem,
};

/// Dropping the filesystem releases every inode with its payload.
fn free_filesystem(fs: Filesystem) {
    drop(fs);
}
