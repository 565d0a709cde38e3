//! Swarm backend for RDS.
//!
//! [`SwarmProvider`] implements `put`, `get` and `get_readable` on top of
//! any [`BzzApi`] implementation:
//!
//! - [`HttpBzzClient`] talks to a node's bzz HTTP gateway
//! - [`InMemoryBzz`] keeps content and manifests in process
//!
//! Directories travel as tar archives in both directions, so streamed
//! files must declare their size before they are uploaded.

pub mod client;
pub mod http;
pub mod memory;
pub mod provider;

pub use client::{
    BzzApi, BzzMode, DownloadOptions, ListEntry, ListResult, UploadOptions, TAR_CONTENT_TYPE,
};
pub use http::{HttpBzzClient, SwarmConfig};
pub use memory::InMemoryBzz;
pub use provider::SwarmProvider;
