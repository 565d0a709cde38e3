use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use cid::multihash::Multihash;
use cid::Cid;
use futures::stream;
use rds_types::{byte_stream, ClientError, ClientResult, FileData};
use tracing::trace;

use crate::client::{
    AddFile, AddOptions, AddedEntry, AddedStream, GetOptions, IpfsApi, IpfsEntry,
    IpfsEntryStream,
};

/// Multicodec of raw leaf blocks.
pub const RAW_CODEC: u64 = 0x55;
/// Multicodec of directory nodes.
pub const DAG_PB_CODEC: u64 = 0x70;
/// Multihash code of BLAKE3.
pub const BLAKE3_CODE: u64 = 0x1e;

#[derive(Clone, Debug)]
enum Node {
    File(Bytes),
    Directory(BTreeMap<String, Cid>),
}

/// Tree of files being added, keyed by path segment.
#[derive(Default)]
struct Tree {
    files: BTreeMap<String, Bytes>,
    dirs: BTreeMap<String, Tree>,
}

impl Tree {
    fn insert(&mut self, path: &str, data: Bytes) -> ClientResult<()> {
        let segments = split_path(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(ClientError::Decode(format!("invalid file path {path:?}")));
        };
        let mut node = self;
        for segment in parents {
            if node.files.contains_key(*segment) {
                return Err(path_conflict(path));
            }
            node = node.dirs.entry(segment.to_string()).or_default();
        }
        if node.dirs.contains_key(*name) || node.files.contains_key(*name) {
            return Err(path_conflict(path));
        }
        node.files.insert(name.to_string(), data);
        Ok(())
    }
}

/// In-process IPFS node.
///
/// Blocks are content addressed with CIDv1 over BLAKE3, so identical
/// content always yields the same CID. Nothing is chunked or persisted.
#[derive(Default)]
pub struct InMemoryIpfs {
    nodes: RwLock<HashMap<Cid, Node>>,
}

impl InMemoryIpfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.nodes.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put_file(&self, data: Bytes) -> ClientResult<Cid> {
        let cid = cid_for(RAW_CODEC, &data)?;
        self.nodes
            .write()
            .expect("lock poisoned")
            .insert(cid, Node::File(data));
        Ok(cid)
    }

    fn put_directory(&self, links: BTreeMap<String, Cid>) -> ClientResult<Cid> {
        let mut encoded = Vec::new();
        for (name, cid) in &links {
            encoded.extend_from_slice(name.as_bytes());
            encoded.push(0);
            encoded.extend_from_slice(&cid.to_bytes());
        }
        let cid = cid_for(DAG_PB_CODEC, &encoded)?;
        self.nodes
            .write()
            .expect("lock poisoned")
            .insert(cid, Node::Directory(links));
        Ok(cid)
    }

    /// Store `tree`, pushing every created node to `out` leaves first.
    fn store_tree(
        &self,
        tree: Tree,
        prefix: &str,
        out: &mut Vec<AddedEntry>,
    ) -> ClientResult<(BTreeMap<String, Cid>, u64)> {
        let mut links = BTreeMap::new();
        let mut total = 0;

        for (name, data) in tree.files {
            let size = data.len() as u64;
            let cid = self.put_file(data)?;
            out.push(AddedEntry {
                path: join(prefix, &name),
                cid,
                size,
            });
            links.insert(name, cid);
            total += size;
        }
        for (name, subtree) in tree.dirs {
            let path = join(prefix, &name);
            let (sub_links, size) = self.store_tree(subtree, &path, out)?;
            let cid = self.put_directory(sub_links)?;
            out.push(AddedEntry { path, cid, size });
            links.insert(name, cid);
            total += size;
        }
        Ok((links, total))
    }

    fn resolve(&self, path: &str) -> ClientResult<(String, Cid)> {
        let segments = split_path(path);
        let Some((root, rest)) = segments.split_first() else {
            return Err(ClientError::Decode(format!("invalid path {path:?}")));
        };
        let mut cid = Cid::try_from(*root)
            .map_err(|e| ClientError::Decode(format!("invalid CID {root}: {e}")))?;

        let nodes = self.nodes.read().expect("lock poisoned");
        for segment in rest {
            match nodes.get(&cid) {
                Some(Node::Directory(links)) => {
                    cid = *links
                        .get(*segment)
                        .ok_or_else(|| ClientError::NotFound(path.to_string()))?;
                }
                Some(Node::File(_)) | None => {
                    return Err(ClientError::NotFound(path.to_string()));
                }
            }
        }
        Ok((segments.join("/"), cid))
    }

    fn walk(&self, path: String, cid: Cid, out: &mut Vec<IpfsEntry>) -> ClientResult<()> {
        let node = self
            .nodes
            .read()
            .expect("lock poisoned")
            .get(&cid)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(cid.to_string()))?;
        match node {
            Node::File(data) => out.push(IpfsEntry::file(path, byte_stream(data))),
            Node::Directory(links) => {
                out.push(IpfsEntry::directory(path.clone()));
                for (name, child) in links {
                    self.walk(join(&path, &name), child, out)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IpfsApi for InMemoryIpfs {
    async fn add(&self, content: FileData, _options: AddOptions) -> ClientResult<AddedEntry> {
        let data = content.into_bytes().await?;
        let size = data.len() as u64;
        let cid = self.put_file(data)?;
        trace!(target: "rds::ipfs", %cid, size, "stored file block");
        Ok(AddedEntry {
            path: cid.to_string(),
            cid,
            size,
        })
    }

    async fn add_all(&self, files: Vec<AddFile>, options: AddOptions) -> ClientResult<AddedStream> {
        let mut tree = Tree::default();
        for file in files {
            let data = file.content.into_bytes().await?;
            tree.insert(&file.path, data)?;
        }

        let mut added = Vec::new();
        let (links, size) = self.store_tree(tree, "", &mut added)?;
        if options.wrap_with_directory {
            let cid = self.put_directory(links)?;
            added.push(AddedEntry {
                path: String::new(),
                cid,
                size,
            });
        } else {
            // Top level nodes go last, like a real node reports them.
            let (top, nested): (Vec<_>, Vec<_>) =
                added.into_iter().partition(|e| !e.path.contains('/'));
            added = nested.into_iter().chain(top).collect();
        }

        Ok(Box::pin(stream::iter(added.into_iter().map(Ok))))
    }

    async fn get(&self, path: &str, _options: GetOptions) -> ClientResult<IpfsEntryStream> {
        let (root, cid) = self.resolve(path)?;
        let mut entries = Vec::new();
        self.walk(root, cid, &mut entries)?;
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }
}

fn cid_for(codec: u64, data: &[u8]) -> ClientResult<Cid> {
    let digest = blake3::hash(data);
    let hash = Multihash::<64>::wrap(BLAKE3_CODE, digest.as_bytes())
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(Cid::new_v1(codec, hash))
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn path_conflict(path: &str) -> ClientError {
    ClientError::Decode(format!("path {path} is both a file and a directory"))
}
