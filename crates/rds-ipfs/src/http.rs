use std::collections::BTreeSet;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use cid::Cid;
use futures::stream::{self, StreamExt, TryStreamExt};
use rds_types::{ByteStream, ClientError, ClientResult, FileData};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{
    AddFile, AddOptions, AddedEntry, AddedStream, GetOptions, IpfsApi, IpfsEntry,
    IpfsEntryStream,
};

const DIRECTORY_MIME: &str = "application/x-directory";

/// Connection settings for an IPFS node's HTTP API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// Base URL of the API, without the `/api/v0` suffix.
    pub url: String,
    /// Timeout applied to every request.
    pub timeout_ms: Option<u64>,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5001".to_string(),
            timeout_ms: None,
        }
    }
}

impl IpfsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// One line of the `/api/v0/add` NDJSON response.
#[derive(Debug, Deserialize)]
struct AddResponseLine {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: Option<String>,
    #[serde(rename = "Size", default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

/// [`IpfsApi`] over the HTTP API of a go-ipfs / kubo node.
#[derive(Clone, Debug)]
pub struct HttpIpfsClient {
    http: reqwest::Client,
    base: String,
}

impl HttpIpfsClient {
    pub fn new(config: &IpfsConfig) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(target: "rds::ipfs", url = %config.url, "ipfs client using http api");
        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.base)
    }

    async fn add_form(&self, form: Form, options: &AddOptions) -> ClientResult<Vec<AddedEntry>> {
        let wrap = if options.wrap_with_directory { "true" } else { "false" };
        let request = self
            .http
            .post(self.endpoint("add"))
            .query(&[("wrap-with-directory", wrap), ("pin", "true")])
            .multipart(form);
        let response = send(request, options.timeout).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        parse_add_response(&text)
    }
}

#[async_trait]
impl IpfsApi for HttpIpfsClient {
    async fn add(&self, content: FileData, options: AddOptions) -> ClientResult<AddedEntry> {
        let form = Form::new().part("file", file_part(content));
        let mut added = self.add_form(form, &options).await?;
        added
            .pop()
            .ok_or_else(|| ClientError::Decode("add returned no entries".to_string()))
    }

    async fn add_all(&self, files: Vec<AddFile>, options: AddOptions) -> ClientResult<AddedStream> {
        let mut form = Form::new();
        let mut dirs = BTreeSet::new();
        for file in files {
            // The node only learns about directories from explicit parts.
            for parent in parents(&file.path) {
                if dirs.insert(parent.to_string()) {
                    let part = Part::bytes(Vec::new())
                        .file_name(parent.to_string())
                        .mime_str(DIRECTORY_MIME)
                        .map_err(|e| ClientError::Decode(e.to_string()))?;
                    form = form.part("file", part);
                }
            }
            form = form.part("file", file_part(file.content).file_name(file.path));
        }
        let added = self.add_form(form, &options).await?;
        Ok(Box::pin(stream::iter(added.into_iter().map(Ok))))
    }

    async fn get(&self, path: &str, options: GetOptions) -> ClientResult<IpfsEntryStream> {
        let request = self.http.post(self.endpoint("get")).query(&[("arg", path)]);
        let response = send(request, options.timeout).await?;
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        );
        let entries = rds_pack::extract(body).map(|item| -> ClientResult<IpfsEntry> {
            let entry = item?;
            Ok(if entry.header.is_directory() {
                IpfsEntry::directory(entry.header.path)
            } else {
                IpfsEntry::file(entry.header.path, entry.data)
            })
        });
        Ok(Box::pin(entries))
    }
}

fn file_part(content: FileData) -> Part {
    match content {
        FileData::Bytes(data) => {
            let len = data.len() as u64;
            Part::stream_with_length(Body::from(data), len)
        }
        FileData::Stream(stream) => Part::stream(Body::wrap_stream(stream)),
    }
}

/// Every ancestor directory of `path`, outermost first.
fn parents(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(idx, _)| &path[..idx])
        .filter(|p| !p.is_empty())
}

async fn send(request: RequestBuilder, timeout: Option<Duration>) -> ClientResult<Response> {
    let request = match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    };
    let response = request
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(ClientError::Http { status, message })
}

fn parse_add_response(text: &str) -> ClientResult<Vec<AddedEntry>> {
    let mut added = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let line: AddResponseLine =
            serde_json::from_str(line).map_err(|e| ClientError::Decode(e.to_string()))?;
        // Progress lines carry no hash.
        let Some(hash) = line.hash else {
            continue;
        };
        let cid = Cid::try_from(hash.as_str())
            .map_err(|e| ClientError::Decode(format!("invalid CID {hash}: {e}")))?;
        let size = line.size.and_then(|s| s.parse().ok()).unwrap_or(0);
        let path = if line.name == hash { String::new() } else { line.name };
        added.push(AddedEntry { path, cid, size });
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes as AxumBytes;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use rds_types::{collect_bytes, DirectoryArrayEntry};
    use std::collections::HashMap;

    const CID_V0: &str = "QmPZ9gcCEpqKTo6aq61g2nXGUhM4iCL3ewB6LDXZCtioEB";
    const CID_V1: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    async fn serve(app: Router) -> IpfsConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        IpfsConfig::new(format!("http://{addr}/"))
    }

    async fn add_handler(Query(query): Query<HashMap<String, String>>, body: AxumBytes) -> String {
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("hello"));
        if query.get("wrap-with-directory").map(String::as_str) == Some("true") {
            assert!(body.contains("application/x-directory"));
            format!(
                "{{\"Name\":\"dir/poem.txt\",\"Hash\":\"{CID_V0}\",\"Size\":\"13\"}}\n\
                 {{\"Name\":\"dir\",\"Hash\":\"{CID_V0}\",\"Size\":\"70\"}}\n\
                 {{\"Name\":\"{CID_V1}\",\"Hash\":\"{CID_V1}\",\"Size\":\"120\"}}\n"
            )
        } else {
            format!("{{\"Name\":\"{CID_V0}\",\"Hash\":\"{CID_V0}\",\"Size\":\"13\"}}\n")
        }
    }

    async fn get_handler(Query(query): Query<HashMap<String, String>>) -> (StatusCode, Vec<u8>) {
        let arg = query.get("arg").cloned().unwrap_or_default();
        if arg != CID_V1 {
            let body = br#"{"Message":"merkledag: not found","Code":0,"Type":"error"}"#;
            return (StatusCode::INTERNAL_SERVER_ERROR, body.to_vec());
        }
        let entries = vec![
            DirectoryArrayEntry::new(format!("{CID_V1}/file"), FileData::from(&b"data"[..])),
            DirectoryArrayEntry::new(
                format!("{CID_V1}/folder/and/file"),
                FileData::from(&b"other"[..]),
            ),
        ];
        let tar = rds_pack::pack_to_bytes(entries).await.unwrap();
        (StatusCode::OK, tar.to_vec())
    }

    fn app() -> Router {
        Router::new()
            .route("/api/v0/add", post(add_handler))
            .route("/api/v0/get", post(get_handler))
    }

    #[test]
    fn default_config() {
        let config = IpfsConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:5001");
        assert!(config.timeout_ms.is_none());
    }

    #[test]
    fn parents_are_outermost_first() {
        let found: Vec<_> = parents("a/b/c.txt").collect();
        assert_eq!(found, vec!["a", "a/b"]);
        assert_eq!(parents("file").count(), 0);
    }

    #[test]
    fn add_response_skips_progress_lines() {
        let text = format!(
            "{{\"Name\":\"x\",\"Bytes\":1024}}\n{{\"Name\":\"{CID_V0}\",\"Hash\":\"{CID_V0}\",\"Size\":\"7\"}}\n"
        );
        let added = parse_add_response(&text).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].path, "");
        assert_eq!(added[0].size, 7);
    }

    #[test]
    fn add_response_rejects_bad_cids() {
        let text = "{\"Name\":\"x\",\"Hash\":\"nope\",\"Size\":\"1\"}\n";
        assert!(matches!(parse_add_response(text), Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn add_single_file() {
        let client = HttpIpfsClient::new(&serve(app()).await).unwrap();
        let added = client
            .add(FileData::from(&b"hello"[..]), AddOptions::default())
            .await
            .unwrap();
        assert_eq!(added.cid.to_string(), CID_V0);
    }

    #[tokio::test]
    async fn add_all_sends_directory_parts() {
        let client = HttpIpfsClient::new(&serve(app()).await).unwrap();
        let options = AddOptions {
            wrap_with_directory: true,
            ..Default::default()
        };
        let added: Vec<_> = client
            .add_all(vec![AddFile::new("dir/poem.txt", &b"hello"[..])], options)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(added.len(), 3);
        assert_eq!(added[0].path, "dir/poem.txt");
        assert_eq!(added[2].cid.to_string(), CID_V1);
        assert_eq!(added[2].path, "");
    }

    #[tokio::test]
    async fn get_extracts_archive() {
        let client = HttpIpfsClient::new(&serve(app()).await).unwrap();
        let mut entries = client.get(CID_V1, GetOptions::default()).await.unwrap();
        let mut files = Vec::new();
        while let Some(entry) = entries.next().await {
            let entry = entry.unwrap();
            let content = collect_bytes(entry.content.unwrap()).await.unwrap();
            files.push((entry.path, content));
        }
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, format!("{CID_V1}/file"));
        assert_eq!(&files[1].1[..], b"other");
    }

    #[tokio::test]
    async fn api_errors_carry_the_message() {
        let client = HttpIpfsClient::new(&serve(app()).await).unwrap();
        let err = client.get(CID_V0, GetOptions::default()).await.err().unwrap();
        match err {
            ClientError::Http { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "merkledag: not found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
