use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use futures::StreamExt;
use rds_types::{
    any_leaf, collect_bytes, is_cid, normalize, Address, BackendKind, ClientError, Directory,
    DirectoryEntry, EntryStream, FetchOptions, Fetched, PutInput, PutOptions, RdsError,
    RdsResult, StreamEntry, Upload,
};
use tracing::debug;

use crate::client::{AddFile, AddOptions, GetOptions, IpfsApi, IpfsEntryKind};
use crate::http::{HttpIpfsClient, IpfsConfig};

/// Anything IPFS accepts as an address: a CID in text form, optionally
/// followed by a sub path, a parsed [`Cid`], or the binary form of a CID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IpfsAddress {
    Text(String),
    Cid(Cid),
    Bytes(Vec<u8>),
}

impl IpfsAddress {
    /// Validate and render as the path handed to the node.
    pub fn resolve(self) -> RdsResult<String> {
        match self {
            Self::Text(text) => {
                let root = text.trim_start_matches('/').split('/').next().unwrap_or("");
                if !is_cid(root) {
                    return Err(invalid_address(&text));
                }
                Ok(text.trim_matches('/').to_string())
            }
            Self::Cid(cid) => Ok(cid.to_string()),
            Self::Bytes(bytes) => Cid::try_from(bytes.as_slice())
                .map(|cid| cid.to_string())
                .map_err(|_| invalid_address(&format!("{bytes:02x?}"))),
        }
    }
}

fn invalid_address(address: &str) -> RdsError {
    RdsError::value(format!("Address {address} is not valid IPFS's CID"))
}

impl From<&str> for IpfsAddress {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for IpfsAddress {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for IpfsAddress {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Cid> for IpfsAddress {
    fn from(cid: Cid) -> Self {
        Self::Cid(cid)
    }
}

impl From<Vec<u8>> for IpfsAddress {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for IpfsAddress {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Storage provider backed by an IPFS node.
///
/// Holds nothing but the client handle, so clones are cheap and share the
/// same node.
#[derive(Clone)]
pub struct IpfsProvider {
    client: Arc<dyn IpfsApi>,
}

impl IpfsProvider {
    pub const KIND: BackendKind = BackendKind::Ipfs;

    pub fn new(client: Arc<dyn IpfsApi>) -> Self {
        Self { client }
    }

    /// Provider talking to a node over its HTTP API.
    pub fn connect(config: &IpfsConfig) -> RdsResult<Self> {
        let client = HttpIpfsClient::new(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn kind(&self) -> BackendKind {
        Self::KIND
    }

    pub fn client(&self) -> &Arc<dyn IpfsApi> {
        &self.client
    }

    /// Store `input` and return the CID of the uploaded root.
    ///
    /// A single file with `file_name` is wrapped in a directory so the name
    /// survives. Directories are wrapped unless `wrap_with_directory` is
    /// explicitly `false`.
    pub async fn put(&self, input: impl Into<PutInput>, options: PutOptions) -> RdsResult<Address> {
        match normalize(input.into(), options, any_leaf)? {
            Upload::Single { data, options } => match options.file_name {
                None => {
                    debug!(target: "rds::ipfs", "uploading single file");
                    let added = self.client.add(data, add_options(false)).await?;
                    Ok(added.cid.to_string())
                }
                Some(name) => {
                    debug!(target: "rds::ipfs", file_name = %name, "uploading named file");
                    let files = vec![AddFile::new(name, data)];
                    self.add_all(files, add_options(true)).await
                }
            },
            Upload::Directory { entries, options } => {
                debug!(target: "rds::ipfs", entries = entries.len(), "uploading directory");
                let wrap = options.wrap_with_directory.unwrap_or(true);
                let files = entries
                    .into_iter()
                    .map(|entry| AddFile::new(entry.path, entry.data))
                    .collect();
                self.add_all(files, add_options(wrap)).await
            }
        }
    }

    async fn add_all(&self, files: Vec<AddFile>, options: AddOptions) -> RdsResult<Address> {
        let mut added = self.client.add_all(files, options).await?;
        let mut last = None;
        while let Some(entry) = added.next().await {
            last = Some(entry?);
        }
        let root =
            last.ok_or_else(|| ClientError::Decode("No data were returned from IPFS client".into()))?;
        Ok(root.cid.to_string())
    }

    /// Fetch the file or directory at `address`.
    ///
    /// Exactly one file entry is returned as [`Fetched::File`]. Anything
    /// else, including a lone empty directory, is a [`Fetched::Directory`]
    /// keyed by paths relative to `address`.
    pub async fn get(
        &self,
        address: impl Into<IpfsAddress>,
        options: FetchOptions,
    ) -> RdsResult<Fetched> {
        let root = address.into().resolve()?;
        let mut entries = self.client.get(&root, get_options(&options)).await?;

        // Content is read as entries arrive; the client may share one
        // response between all of them.
        let mut fetched: Vec<(String, Option<Bytes>)> = Vec::new();
        while let Some(entry) = entries.next().await {
            let entry = entry?;
            let content = match (entry.kind, entry.content) {
                (IpfsEntryKind::Directory, _) => None,
                (IpfsEntryKind::File, Some(content)) => Some(collect_bytes(content).await?),
                (IpfsEntryKind::File, None) => {
                    return Err(ClientError::Decode(format!(
                        "File {} did not have any content returned from IPFS client",
                        entry.path
                    ))
                    .into());
                }
            };
            fetched.push((entry.path, content));
        }

        if fetched.is_empty() {
            return Err(RdsError::value(format!(
                "Address {root} does not contain any files/folders!"
            )));
        }
        if fetched.len() == 1 {
            if let (_, Some(data)) = &fetched[0] {
                debug!(target: "rds::ipfs", address = %root, "fetching single file");
                return Ok(Fetched::File(data.clone()));
            }
        }

        debug!(target: "rds::ipfs", address = %root, "fetching directory");
        let dir: Directory<Bytes> = fetched
            .into_iter()
            .filter_map(|(path, content)| {
                content.map(|data| (relative_path(&path, &root), DirectoryEntry::fetched(data)))
            })
            .collect();
        Ok(Fetched::Directory(dir))
    }

    /// Stream every file under `address` as it is fetched.
    ///
    /// Directory nodes are skipped. A lone file is yielded with an empty path.
    pub async fn get_readable(
        &self,
        address: impl Into<IpfsAddress>,
        options: FetchOptions,
    ) -> RdsResult<EntryStream> {
        let root = address.into().resolve()?;
        let entries = self.client.get(&root, get_options(&options)).await?;
        debug!(target: "rds::ipfs", address = %root, "streaming entries");

        let files = entries.filter_map(move |item| {
            let root = root.clone();
            async move {
                match item {
                    Err(err) => Some(Err(RdsError::from(err))),
                    Ok(entry) if entry.is_directory() => None,
                    Ok(entry) => {
                        let path = relative_path(&entry.path, &root);
                        match entry.content {
                            Some(data) => Some(Ok(StreamEntry::new(path, data))),
                            None => Some(Err(ClientError::Decode(format!(
                                "File {} did not have any content returned from IPFS client",
                                entry.path
                            ))
                            .into())),
                        }
                    }
                }
            }
        });
        Ok(Box::pin(files))
    }
}

fn add_options(wrap_with_directory: bool) -> AddOptions {
    AddOptions {
        wrap_with_directory,
        ..AddOptions::default()
    }
}

fn get_options(options: &FetchOptions) -> GetOptions {
    GetOptions {
        timeout: options.timeout,
    }
}

/// Path of `path` relative to the fetched `root`.
///
/// Nodes may name the root differently than it was requested (for example
/// by the last segment of a sub path), in which case the first segment is
/// dropped instead.
fn relative_path(path: &str, root: &str) -> String {
    if path == root {
        return String::new();
    }
    if let Some(rest) = path.strip_prefix(root).and_then(|r| r.strip_prefix('/')) {
        return rest.to_string();
    }
    match path.split_once('/') {
        Some((_, rest)) => rest.to_string(),
        None => String::new(),
    }
}
