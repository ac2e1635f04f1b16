//! The `FS.*` command family over the `keyfs` engine, plus the registration
//! glue a key-value host needs: the command table with read/write/fast
//! flags and key positions, and the datatype descriptor bundling the
//! snapshot, memory and digest callbacks.
//!
//! Commands execute one at a time on the host's command thread; a
//! multi-threaded embedder serializes at the [`Keyspace`] boundary with one
//! exclusive lock.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;
#[macro_use]
extern crate log;

pub mod handlers;
pub mod keyspace;
pub mod registry;
pub mod reply;


pub use keyspace::Keyspace;
pub use registry::{dispatch, CommandFlags, CommandSpec, DatatypeSpec, Propagate, COMMANDS, DATATYPE};
pub use reply::Reply;
