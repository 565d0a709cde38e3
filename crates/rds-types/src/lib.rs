//! Foundation types for RDS, a unified client for decentralized storage.
//!
//! This crate provides the address, payload and error types shared by every
//! RDS backend. Every other RDS crate depends on `rds-types`.
//!
//! # Key Types
//!
//! - [`BackendKind`]: the storage networks RDS can route to
//! - [`classify`]: decides which backend owns an address
//! - [`Directory`] / [`DirectoryEntry`]: path keyed file collections
//! - [`PutInput`]: every payload shape accepted by `put`
//! - [`Fetched`]: result of `get`, a file or a directory
//! - [`StreamEntry`]: one file yielded by `get_readable`
//! - [`RdsError`]: error taxonomy with stable codes

pub mod address;
pub mod content;
pub mod directory;
pub mod error;
pub mod shape;

pub use address::{classify, is_cid, Address, BackendKind, SWARM_HASH_LENGTH};
pub use content::{
    byte_stream, collect_bytes, collect_entries, entry_stream, ByteStream, EntryStream, FetchOptions,
    Fetched, FileData, PutInput, PutOptions, StreamEntry,
};
pub use directory::{directory_size, Directory, DirectoryArrayEntry, DirectoryEntry};
pub use error::{ClientError, ClientResult, RdsError, RdsResult};
pub use shape::{any_leaf, normalize, sized_streams, LeafCheck, Upload};
