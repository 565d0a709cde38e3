use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use rds_types::{byte_stream, ByteStream, ClientError, ClientResult, DirectoryArrayEntry, FileData};
use tracing::trace;

use crate::client::{
    BzzApi, BzzMode, DownloadOptions, ListEntry, ListResult, UploadOptions, TAR_CONTENT_TYPE,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone, Debug)]
struct ManifestEntry {
    hash: String,
    content_type: String,
    size: u64,
}

#[derive(Clone, Debug)]
enum Object {
    Raw(Bytes),
    Manifest {
        entries: BTreeMap<String, ManifestEntry>,
        default_path: Option<String>,
    },
}

/// In-process Swarm node.
///
/// Content and manifests are addressed by the hex BLAKE3 hash of their
/// encoding, giving the same 64 character hashes a real node hands out.
/// Like a real gateway it answers HTTP 500 when a manifest operation hits
/// a raw hash.
#[derive(Default)]
pub struct InMemoryBzz {
    objects: RwLock<HashMap<String, Object>>,
}

impl InMemoryBzz {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, manifests included.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store_raw(&self, data: Bytes) -> String {
        let hash = hex::encode(blake3::hash(&data).as_bytes());
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(hash.clone(), Object::Raw(data));
        hash
    }

    fn store_manifest(
        &self,
        entries: BTreeMap<String, ManifestEntry>,
        default_path: Option<String>,
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"manifest\0");
        for (path, entry) in &entries {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.hash.as_bytes());
            hasher.update(entry.content_type.as_bytes());
            hasher.update(b"\0");
        }
        if let Some(default_path) = &default_path {
            hasher.update(b"default\0");
            hasher.update(default_path.as_bytes());
        }
        let hash = hex::encode(hasher.finalize().as_bytes());
        self.objects.write().expect("lock poisoned").insert(
            hash.clone(),
            Object::Manifest {
                entries,
                default_path,
            },
        );
        hash
    }

    fn object(&self, hash: &str) -> ClientResult<Object> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(hash)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(hash.to_string()))
    }

    fn manifest(
        &self,
        hash: &str,
    ) -> ClientResult<(BTreeMap<String, ManifestEntry>, Option<String>)> {
        match self.object(hash)? {
            Object::Manifest {
                entries,
                default_path,
            } => Ok((entries, default_path)),
            Object::Raw(_) => Err(not_a_manifest(hash)),
        }
    }

    fn raw(&self, hash: &str) -> ClientResult<Bytes> {
        match self.object(hash)? {
            Object::Raw(data) => Ok(data),
            Object::Manifest { .. } => Err(ClientError::Decode(format!("{hash} is a manifest"))),
        }
    }

    /// Entries of the manifest an upload extends, empty for a fresh one.
    fn base_entries(&self, options: &UploadOptions) -> ClientResult<BTreeMap<String, ManifestEntry>> {
        match &options.manifest_hash {
            Some(hash) => Ok(self.manifest(hash)?.0),
            None => Ok(BTreeMap::new()),
        }
    }

    fn listing(entries: &BTreeMap<String, ManifestEntry>, prefix: &str) -> ListResult {
        let mut files = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (path, entry) in entries {
            let Some(rest) = path.strip_prefix(prefix) else {
                continue;
            };
            match rest.find('/') {
                Some(idx) => {
                    prefixes.insert(format!("{prefix}{}", &rest[..=idx]));
                }
                None => files.push(ListEntry {
                    hash: entry.hash.clone(),
                    path: path.clone(),
                    content_type: entry.content_type.clone(),
                    size: entry.size,
                    mod_time: String::new(),
                }),
            }
        }
        ListResult {
            common_prefixes: (!prefixes.is_empty()).then(|| prefixes.into_iter().collect()),
            entries: (!files.is_empty()).then_some(files),
        }
    }
}

#[async_trait]
impl BzzApi for InMemoryBzz {
    async fn list(&self, hash: &str, options: DownloadOptions) -> ClientResult<ListResult> {
        let (entries, _) = self.manifest(hash)?;
        Ok(Self::listing(&entries, options.path.as_deref().unwrap_or("")))
    }

    async fn download(&self, hash: &str, options: DownloadOptions) -> ClientResult<Bytes> {
        if options.mode == Some(BzzMode::Raw) {
            return match self.object(hash)? {
                Object::Raw(data) => Ok(data),
                Object::Manifest { entries, .. } => {
                    let listing = Self::listing(&entries, "");
                    serde_json::to_vec(&listing)
                        .map(Bytes::from)
                        .map_err(|e| ClientError::Decode(e.to_string()))
                }
            };
        }

        let (entries, default_path) = self.manifest(hash)?;
        let path = options.path.unwrap_or_default();
        let entry = match entries.get(&path) {
            Some(entry) => Some(entry),
            None if path.is_empty() => default_path.as_ref().and_then(|p| entries.get(p)),
            None => None,
        }
        .ok_or_else(|| ClientError::NotFound(format!("{hash}/{path}")))?;
        self.raw(&entry.hash)
    }

    async fn download_stream(
        &self,
        hash: &str,
        options: DownloadOptions,
    ) -> ClientResult<ByteStream> {
        if !options.wants_tar() {
            return Ok(byte_stream(self.download(hash, options).await?));
        }

        let (entries, _) = self.manifest(hash)?;
        let prefix = options.path.unwrap_or_default();
        let mut files = Vec::new();
        for (path, entry) in entries {
            // Unnamed entries have no representation in an archive.
            if path.is_empty() || !path.starts_with(&prefix) {
                continue;
            }
            let data = self.raw(&entry.hash)?;
            files.push(DirectoryArrayEntry::new(path, FileData::Bytes(data)));
        }
        trace!(target: "rds::swarm", %hash, files = files.len(), "serving manifest as tar");
        Ok(rds_pack::pack(files))
    }

    async fn upload_file(&self, body: FileData, options: UploadOptions) -> ClientResult<String> {
        if options.mode == Some(BzzMode::Raw) {
            let data = read_body(body, options.size).await?;
            return Ok(self.store_raw(data));
        }

        let mut entries = self.base_entries(&options)?;
        let prefix = options.path.clone().unwrap_or_default();

        if options.content_type.as_deref() == Some(TAR_CONTENT_TYPE) {
            let dir = rds_pack::extract_directory(body.into_stream()).await?;
            for (path, file) in dir {
                let size = file.data.len() as u64;
                let hash = self.store_raw(file.data);
                let entry = ManifestEntry {
                    hash,
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                    size,
                };
                entries.insert(format!("{prefix}{path}"), entry);
            }
        } else {
            let data = read_body(body, options.size).await?;
            let size = data.len() as u64;
            let entry = ManifestEntry {
                hash: self.store_raw(data),
                content_type: options
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                size,
            };
            entries.insert(prefix, entry);
        }

        Ok(self.store_manifest(entries, options.default_path))
    }
}

async fn read_body(body: FileData, declared: Option<u64>) -> ClientResult<Bytes> {
    let data = body.into_bytes().await?;
    match declared {
        Some(size) if size != data.len() as u64 => Err(ClientError::Http {
            status: 400,
            message: format!("content length {size} does not match body of {} bytes", data.len()),
        }),
        _ => Ok(data),
    }
}

fn not_a_manifest(hash: &str) -> ClientError {
    ClientError::Http {
        status: 500,
        message: format!("cannot resolve manifest {hash}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_upload() -> UploadOptions {
        UploadOptions {
            content_type: Some(TAR_CONTENT_TYPE.to_string()),
            ..Default::default()
        }
    }

    async fn upload_dir(bzz: &InMemoryBzz, files: &[(&str, &'static str)]) -> String {
        let entries = files
            .iter()
            .map(|(path, data)| {
                DirectoryArrayEntry::new(*path, FileData::from(Bytes::from_static(data.as_bytes())))
            })
            .collect();
        bzz.upload_directory(entries, UploadOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn raw_upload_is_not_a_manifest() {
        let bzz = InMemoryBzz::new();
        let options = UploadOptions {
            mode: Some(BzzMode::Raw),
            ..Default::default()
        };
        let hash = bzz.upload_file(FileData::from(&b"hello"[..]), options).await.unwrap();
        assert_eq!(hash.len(), 64);

        let err = bzz.list(&hash, DownloadOptions::default()).await.unwrap_err();
        assert!(err.is_internal_server_error());
        let data = bzz.download(&hash, DownloadOptions::raw()).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn content_typed_upload_has_one_unnamed_entry() {
        let bzz = InMemoryBzz::new();
        let options = UploadOptions {
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        let hash = bzz.upload_file(FileData::from(&b"hello"[..]), options).await.unwrap();
        let list = bzz.list(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.entries()[0].path, "");
        assert_eq!(list.entries()[0].content_type, "text/plain");
        let data = bzz.download(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn listing_is_one_level_deep() {
        let bzz = InMemoryBzz::new();
        let hash = upload_dir(
            &bzz,
            &[
                ("file", "data"),
                ("folder/and/some/file", "data"),
                ("folder/other", "data"),
            ],
        )
        .await;

        let list = bzz.list(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.common_prefixes(), ["folder/".to_string()]);

        let nested = DownloadOptions {
            path: Some("folder/".into()),
            ..Default::default()
        };
        let list = bzz.list(&hash, nested).await.unwrap();
        assert_eq!(list.entries()[0].path, "folder/other");
        assert_eq!(list.common_prefixes(), ["folder/and/".to_string()]);
    }

    #[tokio::test]
    async fn default_path_serves_the_root() {
        let bzz = InMemoryBzz::new();
        let entries = vec![DirectoryArrayEntry::new("poem.txt", FileData::from(&b"roses"[..]))];
        let options = UploadOptions {
            default_path: Some("poem.txt".into()),
            ..Default::default()
        };
        let hash = bzz.upload_directory(entries, options).await.unwrap();
        let data = bzz.download(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(&data[..], b"roses");
    }

    #[tokio::test]
    async fn tar_download_roundtrips_directory() {
        let bzz = InMemoryBzz::new();
        let hash = upload_dir(&bzz, &[("a", "1"), ("b/c", "22")]).await;
        let dir = bzz.download_directory(&hash, DownloadOptions::default()).await.unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(&dir["b/c"].data[..], b"22");
    }

    #[tokio::test]
    async fn tar_of_raw_hash_is_500() {
        let bzz = InMemoryBzz::new();
        let options = UploadOptions {
            mode: Some(BzzMode::Raw),
            ..Default::default()
        };
        let hash = bzz.upload_file(FileData::from(&b"x"[..]), options).await.unwrap();
        let err = bzz
            .download_stream(&hash, DownloadOptions::default().tar())
            .await
            .err()
            .unwrap();
        assert!(err.is_internal_server_error());
    }

    #[tokio::test]
    async fn manifest_update_adds_entry() {
        let bzz = InMemoryBzz::new();
        let hash = upload_dir(&bzz, &[("a", "1"), ("b", "2")]).await;
        let options = UploadOptions {
            manifest_hash: Some(hash.clone()),
            path: Some("docs/c".into()),
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        let updated = bzz.upload_file(FileData::from(&b"3"[..]), options).await.unwrap();
        assert_ne!(updated, hash);
        let fetched = DownloadOptions {
            path: Some("docs/c".into()),
            ..Default::default()
        };
        assert_eq!(&bzz.download(&updated, fetched).await.unwrap()[..], b"3");
    }

    #[tokio::test]
    async fn declared_size_must_match() {
        let bzz = InMemoryBzz::new();
        let options = UploadOptions {
            mode: Some(BzzMode::Raw),
            size: Some(3),
            ..Default::default()
        };
        let err = bzz
            .upload_file(FileData::from(&b"hello"[..]), options)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn failing_tar_stream_fails_upload() {
        let bzz = InMemoryBzz::new();
        let entries = vec![DirectoryArrayEntry::new(
            "short",
            FileData::Stream(byte_stream(&b"abc"[..])),
        )
        .with_size(10)];
        assert!(bzz.upload_directory(entries, tar_upload()).await.is_err());
        assert!(bzz.is_empty());
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let bzz = InMemoryBzz::new();
        let err = bzz
            .download(&"0".repeat(64), DownloadOptions::raw())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        let stream = bzz.download_stream(&"0".repeat(64), DownloadOptions::raw()).await;
        assert!(stream.is_err());
    }
}
