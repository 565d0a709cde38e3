use std::sync::Arc;

use rds_types::{
    entry_stream, normalize, sized_streams, Address, BackendKind, DirectoryArrayEntry,
    EntryStream, FetchOptions, Fetched, PutInput, PutOptions, RdsError, RdsResult, StreamEntry,
    Upload,
};
use tracing::debug;

use crate::client::{BzzApi, BzzMode, DownloadOptions, ListEntry, UploadOptions};
use crate::http::{HttpBzzClient, SwarmConfig};

/// What a listing revealed about the content behind a hash.
#[derive(Debug)]
enum Layout {
    /// Not a manifest at all, only reachable in raw mode.
    Raw,
    /// A manifest holding exactly one unnamed file.
    Single(ListEntry),
    /// Anything else: named files, sub directories or both.
    Directory,
}

/// Storage provider backed by a Swarm node.
#[derive(Clone)]
pub struct SwarmProvider {
    client: Arc<dyn BzzApi>,
}

impl SwarmProvider {
    pub const KIND: BackendKind = BackendKind::Swarm;

    pub fn new(client: Arc<dyn BzzApi>) -> Self {
        Self { client }
    }

    /// Provider talking to a node over its bzz HTTP API.
    pub fn connect(config: &SwarmConfig) -> RdsResult<Self> {
        let client = HttpBzzClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn kind(&self) -> BackendKind {
        Self::KIND
    }

    pub fn client(&self) -> &Arc<dyn BzzApi> {
        &self.client
    }

    /// Store `input` and return the resulting hash.
    ///
    /// Streams must declare their size. A single file without a name and
    /// content type is stored raw; a named one is uploaded as a one entry
    /// directory that serves it by default.
    pub async fn put(&self, input: impl Into<PutInput>, options: PutOptions) -> RdsResult<Address> {
        let hash = match normalize(input.into(), options, sized_streams)? {
            Upload::Single { data, options } => match options.file_name {
                None => {
                    debug!(target: "rds::swarm", "uploading single file");
                    let upload = UploadOptions {
                        mode: options.content_type.is_none().then_some(BzzMode::Raw),
                        content_type: options.content_type,
                        size: options.size,
                        ..UploadOptions::default()
                    };
                    self.client.upload_file(data, upload).await?
                }
                Some(name) => {
                    debug!(target: "rds::swarm", file_name = %name, "uploading named file");
                    let mut entry = DirectoryArrayEntry::new(name.clone(), data);
                    entry.size = options.size;
                    entry.content_type = options.content_type;
                    let upload = UploadOptions {
                        default_path: Some(name),
                        ..UploadOptions::default()
                    };
                    self.client.upload_directory(vec![entry], upload).await?
                }
            },
            Upload::Directory { entries, .. } => {
                debug!(target: "rds::swarm", entries = entries.len(), "uploading directory");
                self.client
                    .upload_directory(entries, UploadOptions::default())
                    .await?
            }
        };
        Ok(hash)
    }

    /// Fetch the file or directory at `address`.
    ///
    /// A manifest holding one unnamed file, or a hash that is no manifest at
    /// all, is returned as [`Fetched::File`]. Every other manifest is
    /// downloaded as a whole into a [`Fetched::Directory`].
    pub async fn get(&self, address: impl AsRef<str>, options: FetchOptions) -> RdsResult<Fetched> {
        let hash = validate(address.as_ref())?;
        let fetched = match self.probe(hash, &options).await? {
            Layout::Raw => {
                debug!(target: "rds::swarm", %hash, "fetching raw content");
                let data = self.client.download(hash, raw(&options)).await?;
                Fetched::File(data)
            }
            Layout::Single(_) => {
                debug!(target: "rds::swarm", %hash, "fetching single file");
                let data = self.client.download(hash, manifest(&options)).await?;
                Fetched::File(data)
            }
            Layout::Directory => {
                debug!(target: "rds::swarm", %hash, "fetching directory");
                let dir = self.client.download_directory(hash, manifest(&options)).await?;
                Fetched::Directory(dir)
            }
        };
        Ok(fetched)
    }

    /// Stream every file under `address`.
    ///
    /// Directories are streamed as a tar archive and unpacked on the fly. A
    /// lone file is yielded with an empty path.
    pub async fn get_readable(
        &self,
        address: impl AsRef<str>,
        options: FetchOptions,
    ) -> RdsResult<EntryStream> {
        let hash = validate(address.as_ref())?;
        let entries = match self.probe(hash, &options).await? {
            Layout::Raw => {
                let data = self.client.download_stream(hash, raw(&options)).await?;
                entry_stream(vec![StreamEntry::new("", data)])
            }
            Layout::Single(listed) => {
                let data = self.client.download_stream(hash, manifest(&options)).await?;
                entry_stream(vec![StreamEntry::new("", data).with_size(listed.size)])
            }
            Layout::Directory => {
                debug!(target: "rds::swarm", %hash, "streaming directory");
                let archive = self
                    .client
                    .download_stream(hash, manifest(&options).tar())
                    .await?;
                rds_pack::extract_files(archive)
            }
        };
        Ok(entries)
    }

    async fn probe(&self, hash: &str, options: &FetchOptions) -> RdsResult<Layout> {
        let list = match self.client.list(hash, manifest(options)).await {
            Ok(list) => list,
            // The node cannot list what is not a manifest.
            Err(err) if err.is_internal_server_error() => return Ok(Layout::Raw),
            Err(err) => return Err(err.into()),
        };

        if list.is_empty() {
            return Err(RdsError::value(format!(
                "Address {hash} does not contain any files/folders!"
            )));
        }
        match list.entries() {
            [only] if only.path.is_empty() && list.common_prefixes().is_empty() => {
                Ok(Layout::Single(only.clone()))
            }
            _ => Ok(Layout::Directory),
        }
    }
}

fn validate(address: &str) -> RdsResult<&str> {
    let hash = address.trim_matches('/');
    if hash.is_empty() {
        return Err(RdsError::value("Address has to be a non-empty Swarm hash!"));
    }
    Ok(hash)
}

fn manifest(options: &FetchOptions) -> DownloadOptions {
    DownloadOptions::default().with_timeout(options.timeout)
}

fn raw(options: &FetchOptions) -> DownloadOptions {
    DownloadOptions::raw().with_timeout(options.timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBzz;
    use bytes::Bytes;
    use futures::StreamExt;
    use rds_types::{byte_stream, collect_entries, ByteStream, DirectoryEntry, FileData};
    use std::io;

    fn provider() -> SwarmProvider {
        SwarmProvider::new(Arc::new(InMemoryBzz::new()))
    }

    fn data(text: &'static str) -> FileData {
        FileData::from(text.as_bytes())
    }

    fn chunks(parts: &[&'static str]) -> ByteStream {
        let chunks: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Box::pin(futures::stream::iter(chunks))
    }

    // ---- put / get -------------------------------------------------------

    #[tokio::test]
    async fn raw_bytes_roundtrip() {
        let swarm = provider();
        let hash = swarm.put(b"hello world".to_vec(), PutOptions::default()).await.unwrap();
        assert_eq!(hash.len(), 64);
        let fetched = swarm.get(&hash, FetchOptions::default()).await.unwrap();
        assert_eq!(fetched, Fetched::File(Bytes::from_static(b"hello world")));
    }

    #[tokio::test]
    async fn content_type_uses_manifest() {
        let swarm = provider();
        let hash = swarm
            .put("hello", PutOptions::new().content_type("text/plain"))
            .await
            .unwrap();
        let list = swarm.client().list(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(list.entries()[0].content_type, "text/plain");
        let fetched = swarm.get(&hash, FetchOptions::default()).await.unwrap();
        assert_eq!(fetched.into_file().unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn sized_stream_roundtrip() {
        let swarm = provider();
        let hash = swarm
            .put(chunks(&["some ", "stream"]), PutOptions::new().size(11))
            .await
            .unwrap();
        let fetched = swarm.get(&hash, FetchOptions::default()).await.unwrap();
        assert_eq!(fetched.into_file().unwrap(), Bytes::from_static(b"some stream"));
    }

    #[tokio::test]
    async fn stream_without_size_is_rejected() {
        let swarm = provider();
        let err = swarm
            .put(chunks(&["data"]), PutOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_value());
        assert!(err.to_string().contains("size"));

        let dir = PutInput::directory([
            ("file", data("data")),
            ("streamed", FileData::Stream(chunks(&["data"]))),
        ]);
        let err = swarm.put(dir, PutOptions::default()).await.unwrap_err();
        assert!(err.is_value());
        assert!(err.to_string().contains("streamed"));
    }

    #[tokio::test]
    async fn file_name_wraps_in_directory() {
        let swarm = provider();
        let hash = swarm
            .put("roses are red", PutOptions::new().file_name("poem.txt"))
            .await
            .unwrap();
        let dir = swarm.get(&hash, FetchOptions::default()).await.unwrap().into_directory().unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(&dir["poem.txt"].data[..], b"roses are red");

        // The name is also served as the manifest's default entry.
        let served = swarm
            .client()
            .download(&hash, DownloadOptions::default())
            .await
            .unwrap();
        assert_eq!(&served[..], b"roses are red");
    }

    #[tokio::test]
    async fn directory_scenario() {
        let swarm = provider();
        let hash = swarm
            .put(
                PutInput::directory([("file", data("data")), ("folder/and/file", data("data"))]),
                PutOptions::default(),
            )
            .await
            .unwrap();
        let fetched = swarm.get(&hash, FetchOptions::default()).await.unwrap();
        assert!(fetched.is_directory());
        let dir = fetched.into_directory().unwrap();
        assert_eq!(dir.len(), 2);
        let expected = DirectoryEntry::fetched(Bytes::from_static(b"data"));
        assert_eq!(dir["file"], expected);
        assert_eq!(dir["folder/and/file"], expected);
    }

    #[tokio::test]
    async fn lone_unnamed_entry_beside_sub_directory_is_a_directory() {
        let swarm = provider();
        let hash = swarm
            .put("root", PutOptions::new().content_type("text/plain"))
            .await
            .unwrap();
        let options = UploadOptions {
            manifest_hash: Some(hash),
            path: Some("nested/file".into()),
            content_type: Some("text/plain".into()),
            ..UploadOptions::default()
        };
        let hash = swarm
            .client()
            .upload_file(data("nested"), options)
            .await
            .unwrap();

        let list = swarm.client().list(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.common_prefixes(), ["nested/".to_string()]);

        let dir = swarm.get(&hash, FetchOptions::default()).await.unwrap().into_directory().unwrap();
        assert_eq!(dir.keys().collect::<Vec<_>>(), vec!["nested/file"]);
    }

    #[tokio::test]
    async fn directory_with_streams() {
        let swarm = provider();
        let mut entries = vec![
            DirectoryArrayEntry::new("a.txt", data("alpha")),
            DirectoryArrayEntry::new("b/c.txt", FileData::Stream(chunks(&["be", "ta"]))),
        ];
        entries[1].size = Some(4);
        let hash = swarm.put(entries, PutOptions::default()).await.unwrap();
        let dir = swarm.get(&hash, FetchOptions::default()).await.unwrap().into_directory().unwrap();
        assert_eq!(&dir["b/c.txt"].data[..], b"beta");
    }

    #[tokio::test]
    async fn failing_stream_fails_put() {
        let swarm = provider();
        let failing: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "producer died")),
        ]));
        let mut entries = vec![
            DirectoryArrayEntry::new("ok", data("fine")),
            DirectoryArrayEntry::new("broken", FileData::Stream(failing)),
        ];
        entries[1].size = Some(8);
        let err = swarm.put(entries, PutOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), RdsError::CLIENT_CODE);
    }

    // ---- validation ------------------------------------------------------

    #[tokio::test]
    async fn empty_manifest_is_value_error() {
        let swarm = provider();
        let hash = swarm
            .client()
            .upload_directory(Vec::new(), UploadOptions::default())
            .await
            .unwrap();
        let err = swarm.get(&hash, FetchOptions::default()).await.unwrap_err();
        assert!(err.is_value());
        assert!(err.to_string().contains("does not contain any files"));
        let err = swarm.get_readable(&hash, FetchOptions::default()).await.err().unwrap();
        assert!(err.is_value());
    }

    #[tokio::test]
    async fn empty_address_is_value_error() {
        let swarm = provider();
        assert!(swarm.get("", FetchOptions::default()).await.unwrap_err().is_value());
        assert!(swarm.get("/", FetchOptions::default()).await.unwrap_err().is_value());
    }

    #[tokio::test]
    async fn unknown_hash_passes_client_error_through() {
        let swarm = provider();
        let err = swarm.get("0".repeat(64), FetchOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), RdsError::CLIENT_CODE);
    }

    // ---- get_readable ----------------------------------------------------

    #[tokio::test]
    async fn readable_raw_file_has_empty_path() {
        let swarm = provider();
        let hash = swarm.put("hello", PutOptions::default()).await.unwrap();
        let entries = collect_entries(swarm.get_readable(&hash, FetchOptions::default()).await.unwrap())
            .await
            .unwrap();
        assert_eq!(entries, vec![(String::new(), Bytes::from_static(b"hello"))]);
    }

    #[tokio::test]
    async fn readable_manifest_file_reports_size() {
        let swarm = provider();
        let hash = swarm
            .put("hello", PutOptions::new().content_type("text/plain"))
            .await
            .unwrap();
        let mut entries = swarm.get_readable(&hash, FetchOptions::default()).await.unwrap();
        let entry = entries.next().await.unwrap().unwrap();
        assert_eq!(entry.path, "");
        assert_eq!(entry.size, Some(5));
        assert_eq!(entry.read_all().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn readable_matches_get_for_directories() {
        let swarm = provider();
        let mut entries = vec![
            DirectoryArrayEntry::new("file", data("data")),
            DirectoryArrayEntry::new("folder/and/file", FileData::Stream(byte_stream(&b"other"[..]))),
        ];
        entries[1].size = Some(5);
        let hash = swarm.put(entries, PutOptions::default()).await.unwrap();

        let dir = swarm.get(&hash, FetchOptions::default()).await.unwrap().into_directory().unwrap();
        let streamed = collect_entries(swarm.get_readable(&hash, FetchOptions::default()).await.unwrap())
            .await
            .unwrap();
        assert_eq!(streamed.len(), dir.len());
        for (path, content) in streamed {
            assert_eq!(dir[&path].data, content);
        }
    }
}
