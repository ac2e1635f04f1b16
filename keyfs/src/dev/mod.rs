//! Host seams: the wall clock and the snapshot byte stream.

pub mod std_impl;

/// A current time provider, in milliseconds since the Unix epoch.
pub trait TimeProvider: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Write half of the host's snapshot stream.
pub trait Sink {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

/// Read half of the host's snapshot stream.
pub trait Source {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// The error type for the snapshot stream.
#[derive(Debug, PartialEq, Eq)]
pub struct DevError;

/// A specialized `Result` type for the stream.
pub type Result<T> = core::result::Result<T, DevError>;
