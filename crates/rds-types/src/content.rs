use std::fmt;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::directory::{Directory, DirectoryArrayEntry, DirectoryEntry};
use crate::error::RdsResult;

/// A stream of raw content chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// An object-mode stream of file entries returned by `get_readable`.
pub type EntryStream = Pin<Box<dyn Stream<Item = RdsResult<StreamEntry>> + Send + 'static>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn byte_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into one contiguous buffer.
pub async fn collect_bytes(stream: ByteStream) -> io::Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

/// Payload of a single file being uploaded.
pub enum FileData {
    /// Content already held in memory.
    Bytes(Bytes),
    /// Content produced incrementally. Its length cannot be known up front.
    Stream(ByteStream),
}

impl FileData {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Length of in-memory content; `None` for streams.
    pub fn known_len(&self) -> Option<u64> {
        match self {
            Self::Bytes(b) => Some(b.len() as u64),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> ByteStream {
        match self {
            Self::Bytes(b) => byte_stream(b),
            Self::Stream(s) => s,
        }
    }

    /// Buffer the content in memory, draining the stream if necessary.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::Stream(s) => collect_bytes(s).await,
        }
    }
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for FileData {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for FileData {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for FileData {
    fn from(v: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(v))
    }
}

impl From<ByteStream> for FileData {
    fn from(s: ByteStream) -> Self {
        Self::Stream(s)
    }
}

/// Anything that can be handed to `put`.
pub enum PutInput {
    /// Text content, uploaded as its UTF-8 bytes.
    Text(String),
    Bytes(Bytes),
    Stream(ByteStream),
    /// Path keyed directory.
    Directory(Directory<FileData>),
    /// Ordered list of directory entries. A single element is treated as one file.
    Entries(Vec<DirectoryArrayEntry<FileData>>),
}

impl PutInput {
    /// Build a directory payload from `(path, data)` pairs.
    pub fn directory<I, P, D>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, D)>,
        P: Into<String>,
        D: Into<FileData>,
    {
        Self::Directory(
            files
                .into_iter()
                .map(|(path, data)| (path.into(), DirectoryEntry::new(data.into())))
                .collect(),
        )
    }
}

impl fmt::Debug for PutInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Directory(d) => f.debug_tuple("Directory").field(d).finish(),
            Self::Entries(e) => f.debug_tuple("Entries").field(e).finish(),
        }
    }
}

impl From<String> for PutInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for PutInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Bytes> for PutInput {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for PutInput {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

impl From<ByteStream> for PutInput {
    fn from(s: ByteStream) -> Self {
        Self::Stream(s)
    }
}

impl From<Directory<FileData>> for PutInput {
    fn from(d: Directory<FileData>) -> Self {
        Self::Directory(d)
    }
}

impl From<Vec<DirectoryArrayEntry<FileData>>> for PutInput {
    fn from(entries: Vec<DirectoryArrayEntry<FileData>>) -> Self {
        Self::Entries(entries)
    }
}

/// Options accepted by `put`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Store a single file under this name, wrapped in a directory.
    pub file_name: Option<String>,
    /// Byte length of a streamed single file.
    pub size: Option<u64>,
    pub content_type: Option<String>,
    /// IPFS only: wrap directory uploads in a root directory node.
    /// Defaults to `true` for directories.
    pub wrap_with_directory: Option<bool>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn wrap_with_directory(mut self, wrap: bool) -> Self {
        self.wrap_with_directory = Some(wrap);
        self
    }
}

/// Options accepted by `get` and `get_readable` on every backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Per-request timeout handed to the network client.
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of `get`: either the content of one file or a whole directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
    File(Bytes),
    Directory(Directory<Bytes>),
}

impl Fetched {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn as_file(&self) -> Option<&Bytes> {
        match self {
            Self::File(b) => Some(b),
            Self::Directory(_) => None,
        }
    }

    pub fn into_file(self) -> Option<Bytes> {
        match self {
            Self::File(b) => Some(b),
            Self::Directory(_) => None,
        }
    }

    pub fn into_directory(self) -> Option<Directory<Bytes>> {
        match self {
            Self::Directory(d) => Some(d),
            Self::File(_) => None,
        }
    }
}

/// One file yielded by `get_readable`.
pub struct StreamEntry {
    /// Path relative to the fetched root. Empty for a lone file.
    pub path: String,
    pub data: ByteStream,
    pub size: Option<u64>,
}

impl StreamEntry {
    pub fn new(path: impl Into<String>, data: ByteStream) -> Self {
        Self {
            path: path.into(),
            data,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Buffer this entry's content.
    pub async fn read_all(self) -> io::Result<Bytes> {
        collect_bytes(self.data).await
    }
}

impl fmt::Debug for StreamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEntry")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Turn a list of ready entries into an [`EntryStream`].
pub fn entry_stream(entries: Vec<StreamEntry>) -> EntryStream {
    Box::pin(stream::iter(entries.into_iter().map(Ok)))
}

/// Drain an [`EntryStream`] into `(path, content)` pairs, in stream order.
pub async fn collect_entries(mut entries: EntryStream) -> RdsResult<Vec<(String, Bytes)>> {
    let mut out = Vec::new();
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let path = entry.path.clone();
        out.push((path, entry.read_all().await?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(parts: &[&'static [u8]]) -> ByteStream {
        let chunks: Vec<io::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn collect_concatenates_chunks() {
        let data = collect_bytes(chunked(&[b"hello ", b"world"])).await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn collect_propagates_errors() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"x")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        ];
        let err = collect_bytes(Box::pin(stream::iter(chunks))).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn file_data_stream_buffers() {
        let data = FileData::Stream(chunked(&[b"a", b"b"]));
        assert!(data.is_stream());
        assert_eq!(data.known_len(), None);
        assert_eq!(&data.into_bytes().await.unwrap()[..], b"ab");
    }

    #[test]
    fn fetched_accessors() {
        let file = Fetched::File(Bytes::from_static(b"x"));
        assert!(file.is_file());
        assert!(!file.is_directory());
        assert_eq!(file.as_file().map(|b| b.len()), Some(1));
        assert!(file.into_directory().is_none());
    }

    #[tokio::test]
    async fn entries_collect_in_order() {
        let entries = entry_stream(vec![
            StreamEntry::new("a", byte_stream(&b"1"[..])),
            StreamEntry::new("b", byte_stream(&b"2"[..])).with_size(1),
        ]);
        let collected = collect_entries(entries).await.unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].0, "a");
        assert_eq!(&collected[1].1[..], b"2");
    }

    #[test]
    fn put_options_builder() {
        let opts = PutOptions::new().file_name("poem.txt").size(11);
        assert_eq!(opts.file_name.as_deref(), Some("poem.txt"));
        assert_eq!(opts.size, Some(11));
        assert_eq!(opts.wrap_with_directory, None);
    }
}
