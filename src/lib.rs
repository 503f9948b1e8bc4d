//! blockcopy: parallel block-hash delta file sync.
//!
//! Copies one large file between two locations (local paths or
//! `http://host[:port]/path` URLs) without blindly recopying it.
//! Both endpoints are cut into fixed-size blocks, each block is hashed
//! in parallel, and only the blocks whose digests differ are
//! transferred — the rest of the file is left untouched. With
//! `--whole-file`, hashing is skipped entirely and every block is sent.
//!
//! ## Layout
//!
//! - [`error`] — the crate's error taxonomy.
//! - [`fileio`] — sized reads/writes/resizes against a local path.
//! - [`hash`] — the block digest algorithms and their registry.
//! - [`pool`] — the bounded-concurrency worker pool shared by hashing
//!   and transfer.
//! - [`hashmap`] — builds (or streams) an offset -> digest map for a
//!   whole file.
//! - [`location`] — the local/remote endpoint abstraction.
//! - [`client`] — the raw HTTP/1.1 client used to talk to a remote
//!   location.
//! - [`config`] — CLI parsing and the resolved runtime configuration.
//! - [`coordinator`] — the diff-then-transfer state machine.
//! - [`server`] — the HTTP endpoints a remote location talks to.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fileio;
pub mod hash;
pub mod hashmap;
pub mod location;
pub mod pool;
pub mod server;

/// The crate version, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
