//! Streaming tar support for RDS directory transfers.
//!
//! Swarm moves whole directories as tar archives and the IPFS HTTP API
//! returns `get` results the same way. This crate packs directory entries
//! into an archive stream and extracts archive streams back into files,
//! without buffering the whole archive.
//!
//! - [`pack`]: background producer turning entries into archive chunks
//! - [`TarReader`]: pull parser over an archive byte stream
//! - [`extract`] / [`extract_files`]: members as a stream of streams
//! - [`extract_directory`]: whole archive into a [`rds_types::Directory`]

pub mod entry;
pub mod error;
pub mod reader;
pub mod writer;

pub use entry::{TarEntryHeader, TarEntryKind, BLOCK_SIZE};
pub use error::{PackError, PackResult};
pub use reader::{
    extract, extract_directory, extract_files, ExtractStream, ExtractedEntry, TarReader,
};
pub use writer::{pack, pack_to_bytes};
