//! Reply values the command family produces.

use alloc::vec::Vec;

use keyfs::error::FsError;

/// The subset of the host wire model these commands reply with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The `OK` simple string.
    Ok,
    Bulk(Vec<u8>),
    Int(i64),
    Array(Vec<Reply>),
    /// Field/value pairs, emitted as a map reply.
    Map(Vec<(&'static str, Reply)>),
    Null,
    Error(FsError),
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn bulk(bytes: &[u8]) -> Reply {
        Reply::Bulk(bytes.to_vec())
    }
}
