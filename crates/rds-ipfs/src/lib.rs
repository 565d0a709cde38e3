//! IPFS backend for RDS.
//!
//! [`IpfsProvider`] implements `put`, `get` and `get_readable` on top of
//! any [`IpfsApi`] implementation. Two are shipped:
//!
//! - [`HttpIpfsClient`]: talks to a node's `/api/v0` HTTP API
//! - [`InMemoryIpfs`]: an in-process content addressed store
//!
//! Addresses are CIDs, optionally followed by a sub path
//! (`<cid>/folder/file`).

pub mod client;
pub mod http;
pub mod memory;
pub mod provider;

pub use client::{
    AddFile, AddOptions, AddedEntry, AddedStream, GetOptions, IpfsApi, IpfsEntry, IpfsEntryKind,
    IpfsEntryStream,
};
pub use http::{HttpIpfsClient, IpfsConfig};
pub use memory::InMemoryIpfs;
pub use provider::{IpfsAddress, IpfsProvider};
