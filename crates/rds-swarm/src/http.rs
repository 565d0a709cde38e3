use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use rds_types::{ByteStream, ClientError, ClientResult, FileData};
use reqwest::{Body, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::client::{BzzApi, BzzMode, DownloadOptions, ListResult, UploadOptions};

/// Connection settings for a Swarm node's HTTP gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub url: String,
    /// Timeout applied to every request.
    pub timeout_ms: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8500".to_string(),
            timeout_ms: None,
        }
    }
}

impl SwarmConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Scheme prefix for `mode`, falling back to `default_mode` and then `bzz:/`.
pub fn mode_protocol(mode: Option<BzzMode>, default_mode: Option<BzzMode>) -> &'static str {
    mode.or(default_mode).unwrap_or_default().protocol()
}

/// Relative URL of a download.
pub fn download_url(hash: &str, options: &DownloadOptions, default_mode: Option<BzzMode>) -> String {
    let mut url = format!("{}{hash}/", mode_protocol(options.mode, default_mode));
    if let Some(path) = &options.path {
        url.push_str(path);
    }
    if options.mode == Some(BzzMode::Raw) {
        if let Some(content_type) = &options.content_type {
            url.push_str("?content_type=");
            url.push_str(content_type);
        }
    }
    url
}

/// Relative URL of an upload. A manifest hash turns it into a manifest update.
pub fn upload_url(options: &UploadOptions) -> String {
    let mut url = mode_protocol(options.mode, None).to_string();
    if let Some(manifest) = &options.manifest_hash {
        url.push_str(manifest);
        url.push('/');
        if let Some(path) = &options.path {
            url.push_str(path);
        }
    }
    if let Some(default_path) = &options.default_path {
        url.push_str("?defaultpath=");
        url.push_str(default_path);
    }
    url
}

/// Pull the human readable part out of a gateway error page.
pub fn error_reason(body: &str) -> String {
    body.lines()
        .find_map(|line| {
            line.find("Message: ")
                .map(|idx| line[idx + "Message: ".len()..].to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

/// [`BzzApi`] over a Swarm node's HTTP gateway.
#[derive(Clone, Debug)]
pub struct HttpBzzClient {
    http: reqwest::Client,
    base: String,
}

impl HttpBzzClient {
    pub fn new(config: &SwarmConfig) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(target: "rds::swarm", url = %config.url, "bzz client using http gateway");
        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, relative: &str) -> String {
        format!("{}/{relative}", self.base)
    }

    async fn get(&self, relative: &str, options: &DownloadOptions) -> ClientResult<Response> {
        trace!(target: "rds::swarm", url = relative, "GET");
        let mut request = self.http.get(self.url(relative));
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        send(request, options.timeout).await
    }
}

#[async_trait]
impl BzzApi for HttpBzzClient {
    async fn list(&self, hash: &str, options: DownloadOptions) -> ClientResult<ListResult> {
        let mut relative = format!("bzz-list:/{hash}/");
        if let Some(path) = &options.path {
            relative.push_str(path);
        }
        let response = self.get(&relative, &options).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn download(&self, hash: &str, options: DownloadOptions) -> ClientResult<Bytes> {
        let response = self.get(&download_url(hash, &options, None), &options).await?;
        response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn download_stream(
        &self,
        hash: &str,
        options: DownloadOptions,
    ) -> ClientResult<ByteStream> {
        let response = self.get(&download_url(hash, &options, None), &options).await?;
        Ok(Box::pin(
            response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        ))
    }

    async fn upload_file(&self, body: FileData, options: UploadOptions) -> ClientResult<String> {
        let relative = upload_url(&options);
        trace!(target: "rds::swarm", url = %relative, "POST");

        let mut request = self.http.post(self.url(&relative));
        if let Some(content_type) = &options.content_type {
            request = request.header("content-type", content_type.as_str());
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = match body {
            FileData::Bytes(data) => request.body(data),
            FileData::Stream(stream) => {
                // Streamed raw uploads need an explicit length.
                if let Some(size) = options.size {
                    request = request.header("content-length", size);
                }
                request.body(Body::wrap_stream(stream))
            }
        };

        let response = send(request, options.timeout).await?;
        let hash = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(hash.trim().to_string())
    }
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
    let body = response.text().await.unwrap_or_default();
    let message = error_reason(&body);
    if status == 404 {
        return Err(ClientError::NotFound(message));
    }
    Err(ClientError::Http { status, message })
}
