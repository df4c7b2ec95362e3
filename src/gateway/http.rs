//! HTTP gateway implementation built on `reqwest`.
//!
//! Encodes the merged parameters per the descriptor's body-encoding hint,
//! streams response bodies chunk by chunk, and honors the control gate
//! between chunks: a suspended transfer parks at the next chunk boundary,
//! a cancelled transfer stops without emitting a terminal event.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::types::{
    BodyEncoding, HttpMethod, RawResponse, RequestDescriptor, RequestKind, TransferProgress,
};

use super::{wait_until_runnable, ControlState, EventSender, Gateway, GatewayEvent, GatewayHandle};

/// Configuration for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Per-request timeout. Defaults to 60 seconds.
    pub timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

/// Transport gateway backed by a shared `reqwest::Client`.
///
/// Each dispatch runs on its own spawned task; independent transfers never
/// contend with each other beyond the shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
}

impl HttpGateway {
    /// Create a gateway with default configuration.
    pub fn new() -> Self {
        Self::with_config(HttpGatewayConfig::default())
    }

    /// Create a gateway with custom configuration.
    pub fn with_config(config: HttpGatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Create a gateway around an existing `reqwest::Client`.
    ///
    /// Useful when the caller wants to share a connection pool or configure
    /// TLS externally.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn dispatch(
        &self,
        config: EffectiveConfig,
        descriptor: RequestDescriptor,
        events: EventSender,
    ) -> Result<GatewayHandle> {
        let (handle, control) = GatewayHandle::new();
        let client = self.client.clone();

        tokio::spawn(async move {
            match transfer(client, config, descriptor, events.clone(), control).await {
                Ok(Some(raw)) => {
                    let _ = events.send(GatewayEvent::Completed(raw));
                }
                Ok(None) => {
                    // Cancelled before completion; no terminal event follows.
                    debug!("transfer cancelled before completion");
                }
                Err(err) => {
                    let _ = events.send(GatewayEvent::Failed(err));
                }
            }
        });

        Ok(handle)
    }
}

/// Run one transfer to completion. Returns `Ok(None)` when the control gate
/// cancelled it.
async fn transfer(
    client: reqwest::Client,
    config: EffectiveConfig,
    descriptor: RequestDescriptor,
    events: EventSender,
    mut control: watch::Receiver<ControlState>,
) -> Result<Option<RawResponse>> {
    // Park here while suspended; a task suspended while still pending never
    // issues I/O until resumed.
    if wait_until_runnable(&mut control).await.is_err() {
        return Ok(None);
    }

    let request = build_request(&client, &config, &descriptor).await?;

    let response = request.send().await.map_err(map_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    let headers = header_map_to_strings(response.headers());
    let total = response.content_length();

    match &descriptor.kind {
        RequestKind::Download { file_name } => {
            let path = download_path(&config, &descriptor, file_name.as_deref());
            let file_path =
                stream_to_file(response, path, total, &events, &mut control).await?;
            match file_path {
                Some(file_path) => Ok(Some(RawResponse {
                    status: Some(status.as_u16()),
                    headers,
                    body: Vec::new(),
                    data_object: None,
                    is_success: true,
                    file_path: Some(file_path),
                })),
                None => Ok(None),
            }
        }
        _ => {
            let body = stream_to_memory(response, total, &events, &mut control).await?;
            match body {
                Some(body) => {
                    let data_object = serde_json::from_slice(&body).ok();
                    Ok(Some(RawResponse {
                        status: Some(status.as_u16()),
                        headers,
                        body,
                        data_object,
                        is_success: true,
                        file_path: None,
                    }))
                }
                None => Ok(None),
            }
        }
    }
}

/// Build the reqwest request from the resolved configuration.
async fn build_request(
    client: &reqwest::Client,
    config: &EffectiveConfig,
    descriptor: &RequestDescriptor,
) -> Result<reqwest::RequestBuilder> {
    let method = match config.method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Patch => reqwest::Method::PATCH,
    };

    let mut request = client.request(method, &config.url);

    let mut headers = HeaderMap::new();
    for (key, value) in &config.headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(val)) => {
                headers.insert(name, val);
            }
            _ => warn!(header = %key, "skipping header that is not valid on the wire"),
        }
    }
    request = request.headers(headers);

    if let RequestKind::Upload { file_path } = &descriptor.kind {
        let bytes = tokio::fs::read(file_path).await?;
        // Parameters still travel in the query string alongside the body.
        return Ok(request.query(&stringify_params(&config.parameters)).body(bytes));
    }

    request = match config.encoding {
        BodyEncoding::Query => request.query(&stringify_params(&config.parameters)),
        BodyEncoding::Json => request.json(&config.parameters),
        BodyEncoding::Form => request.form(&stringify_params(&config.parameters)),
    };

    Ok(request)
}

/// Render JSON parameter values as plain strings for query/form encoding.
fn stringify_params(params: &HashMap<String, serde_json::Value>) -> HashMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

fn header_map_to_strings(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn download_path(
    config: &EffectiveConfig,
    descriptor: &RequestDescriptor,
    file_name: Option<&str>,
) -> PathBuf {
    let name = file_name
        .map(str::to_string)
        .or_else(|| {
            descriptor
                .target
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "download".to_string());
    config.download_dir.join(name)
}

/// Stream the response body into memory, reporting progress between chunks.
/// Returns `Ok(None)` when the control gate cancelled the transfer.
async fn stream_to_memory(
    response: reqwest::Response,
    total: Option<u64>,
    events: &EventSender,
    control: &mut watch::Receiver<ControlState>,
) -> Result<Option<Vec<u8>>> {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        body.extend_from_slice(&chunk);
        let _ = events.send(GatewayEvent::Progress(TransferProgress {
            transferred: body.len() as u64,
            total,
        }));
        if wait_until_runnable(control).await.is_err() {
            return Ok(None);
        }
    }

    Ok(Some(body))
}

/// Stream the response body to disk, reporting progress between chunks.
/// Returns `Ok(None)` when the control gate cancelled the transfer.
async fn stream_to_file(
    response: reqwest::Response,
    path: PathBuf,
    total: Option<u64>,
    events: &EventSender,
    control: &mut watch::Receiver<ControlState>,
) -> Result<Option<PathBuf>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&path).await?;
    let mut stream = response.bytes_stream();
    let mut transferred: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        file.write_all(&chunk).await?;
        transferred += chunk.len() as u64;
        let _ = events.send(GatewayEvent::Progress(TransferProgress { transferred, total }));
        if wait_until_runnable(control).await.is_err() {
            return Ok(None);
        }
    }

    file.flush().await?;
    Ok(Some(path))
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("request timed out: {err}"))
    } else if err.is_connect() {
        Error::Transport(format!("connection failed: {err}"))
    } else {
        Error::Transport(format!("HTTP request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_stringify_preserves_strings() {
        let mut params = HashMap::new();
        params.insert("name".to_string(), json!("corvid"));
        params.insert("count".to_string(), json!(3));

        let rendered = stringify_params(&params);
        assert_eq!(rendered["name"], "corvid");
        assert_eq!(rendered["count"], "3");
    }

    #[test]
    fn download_path_prefers_explicit_name() {
        let config = EffectiveConfig {
            url: "https://api.example.com/v1/archive.zip".into(),
            method: HttpMethod::Get,
            parameters: HashMap::new(),
            headers: HashMap::new(),
            encoding: BodyEncoding::Query,
            download_dir: PathBuf::from("/tmp/downloads"),
            signer: None,
        };
        let descriptor = RequestDescriptor::new(HttpMethod::Get, "/v1/archive.zip");

        let explicit = download_path(&config, &descriptor, Some("renamed.zip"));
        assert_eq!(explicit, PathBuf::from("/tmp/downloads/renamed.zip"));

        let derived = download_path(&config, &descriptor, None);
        assert_eq!(derived, PathBuf::from("/tmp/downloads/archive.zip"));
    }
}
