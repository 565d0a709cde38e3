use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use futures::Stream;
use rds_types::{ByteStream, ClientResult, FileData};

/// Options for [`IpfsApi::add`] and [`IpfsApi::add_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Wrap the added files in a directory node. The wrapper is yielded last.
    pub wrap_with_directory: bool,
    pub timeout: Option<Duration>,
}

/// Options for [`IpfsApi::get`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub timeout: Option<Duration>,
}

/// One file handed to [`IpfsApi::add_all`].
#[derive(Debug)]
pub struct AddFile {
    /// Path inside the added tree. `/` separates nested directories.
    pub path: String,
    pub content: FileData,
}

impl AddFile {
    pub fn new(path: impl Into<String>, content: impl Into<FileData>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Node created by an add call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddedEntry {
    /// Path of the node relative to the added tree. Empty for the wrapper.
    pub path: String,
    pub cid: Cid,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpfsEntryKind {
    File,
    Directory,
}

/// Node yielded by [`IpfsApi::get`], parents before children.
pub struct IpfsEntry {
    /// Full path, starting with the requested address.
    pub path: String,
    pub kind: IpfsEntryKind,
    /// File content. `None` for directories.
    pub content: Option<ByteStream>,
}

impl IpfsEntry {
    pub fn file(path: impl Into<String>, content: ByteStream) -> Self {
        Self {
            path: path.into(),
            kind: IpfsEntryKind::File,
            content: Some(content),
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: IpfsEntryKind::Directory,
            content: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == IpfsEntryKind::Directory
    }
}

impl fmt::Debug for IpfsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpfsEntry")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}

pub type AddedStream = Pin<Box<dyn Stream<Item = ClientResult<AddedEntry>> + Send + 'static>>;
pub type IpfsEntryStream = Pin<Box<dyn Stream<Item = ClientResult<IpfsEntry>> + Send + 'static>>;

/// The subset of an IPFS node's API the provider needs.
///
/// Entries from [`get`](IpfsApi::get) may be backed by one shared
/// response, so each entry's content has to be consumed (or dropped)
/// before the next entry is polled.
#[async_trait]
pub trait IpfsApi: Send + Sync {
    /// Add one unnamed file.
    async fn add(&self, content: FileData, options: AddOptions) -> ClientResult<AddedEntry>;

    /// Add a tree of files. Entries are yielded leaves first, so the last
    /// item is the root of the upload.
    async fn add_all(&self, files: Vec<AddFile>, options: AddOptions)
        -> ClientResult<AddedStream>;

    /// Fetch the node at `path` (`<cid>` or `<cid>/sub/path`) and everything below it.
    async fn get(&self, path: &str, options: GetOptions) -> ClientResult<IpfsEntryStream>;
}
