use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rds_types::{ByteStream, ClientResult, Directory, DirectoryArrayEntry, FileData};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Content type of tar archives exchanged with the node.
pub const TAR_CONTENT_TYPE: &str = "application/x-tar";

/// URL scheme flavour of a bzz request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BzzMode {
    /// Resolve through a manifest (`bzz:/`).
    #[default]
    Default,
    /// Manifest without ENS resolution (`bzz-immutable:/`).
    Immutable,
    /// Content itself, no manifest (`bzz-raw:/`).
    Raw,
}

impl BzzMode {
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Default => "bzz:/",
            Self::Immutable => "bzz-immutable:/",
            Self::Raw => "bzz-raw:/",
        }
    }
}

/// Options for downloads and listings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    pub mode: Option<BzzMode>,
    /// Path inside the manifest.
    pub path: Option<String>,
    /// Content type reported for raw downloads.
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl DownloadOptions {
    pub fn raw() -> Self {
        Self {
            mode: Some(BzzMode::Raw),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask for the manifest as a tar archive.
    pub fn tar(mut self) -> Self {
        self.headers
            .insert("accept".to_string(), TAR_CONTENT_TYPE.to_string());
        self
    }

    pub fn wants_tar(&self) -> bool {
        self.headers
            .get("accept")
            .is_some_and(|accept| accept == TAR_CONTENT_TYPE)
    }
}

/// Options for uploads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub mode: Option<BzzMode>,
    pub content_type: Option<String>,
    /// Content length of a streamed body.
    pub size: Option<u64>,
    /// Entry served when the manifest is requested without a path.
    pub default_path: Option<String>,
    /// Existing manifest to add the upload to.
    pub manifest_hash: Option<String>,
    /// Path of the upload inside `manifest_hash`.
    pub path: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// One file of a manifest listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListEntry {
    pub hash: String,
    pub path: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub size: u64,
    pub mod_time: String,
}

/// Result of listing a manifest one level deep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    /// Sub directories, each ending with `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_prefixes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<ListEntry>>,
}

impl ListResult {
    pub fn entries(&self) -> &[ListEntry] {
        self.entries.as_deref().unwrap_or_default()
    }

    pub fn common_prefixes(&self) -> &[String] {
        self.common_prefixes.as_deref().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty() && self.common_prefixes().is_empty()
    }
}

/// The subset of a Swarm node's bzz API the provider needs.
///
/// Every call on a hash that is not a manifest, where a manifest is
/// required, fails with an HTTP 500 [`ClientError`](rds_types::ClientError).
#[async_trait]
pub trait BzzApi: Send + Sync {
    /// List the manifest at `hash` one level below `options.path`.
    async fn list(&self, hash: &str, options: DownloadOptions) -> ClientResult<ListResult>;

    async fn download(&self, hash: &str, options: DownloadOptions) -> ClientResult<Bytes>;

    async fn download_stream(&self, hash: &str, options: DownloadOptions)
        -> ClientResult<ByteStream>;

    /// Upload one body and return the resulting hash.
    async fn upload_file(&self, body: FileData, options: UploadOptions) -> ClientResult<String>;

    /// Fetch a whole manifest as a tar archive and extract it.
    async fn download_directory(
        &self,
        hash: &str,
        options: DownloadOptions,
    ) -> ClientResult<Directory<Bytes>> {
        let archive = self.download_stream(hash, options.tar()).await?;
        Ok(rds_pack::extract_directory(archive).await?)
    }

    /// Upload `entries` as a tar archive, streamed while it is produced.
    ///
    /// Streamed entries need a size. If one fails mid-upload the archive
    /// stream errors and so does the upload.
    async fn upload_directory(
        &self,
        entries: Vec<DirectoryArrayEntry<FileData>>,
        mut options: UploadOptions,
    ) -> ClientResult<String> {
        trace!(target: "rds::swarm", entries = entries.len(), "packing directory");
        options.content_type = Some(TAR_CONTENT_TYPE.to_string());
        options.size = None;
        let archive = rds_pack::pack(entries);
        self.upload_file(FileData::Stream(archive), options).await
    }
}
