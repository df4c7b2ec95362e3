//! Core data model: request descriptors, task states, raw responses.
//!
//! These types are the currency exchanged between the facade, the registry,
//! and the gateway. Descriptors are immutable once submitted; raw responses
//! are opaque values passed through unchanged except where explicitly
//! reformed.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Process-unique numeric task identifier.
///
/// Allocated from a monotonic counter at submission time; identifiers are
/// never reused for the lifetime of the process.
pub type TaskId = u64;

/// Lifecycle state of a registry-tracked task.
///
/// A task starts `Pending`, and transitions to exactly one of the terminal
/// states `{Completed, Failed, Cancelled}`. Terminal states accept no further
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Created at submission, before the gateway has accepted the dispatch.
    Pending,
    /// The gateway accepted the dispatch and the transfer is in flight.
    Running,
    /// The transfer is paused and can be resumed.
    Suspended,
    /// The task was cancelled by the caller.
    Cancelled,
    /// The transfer finished and the gateway reported success.
    Completed,
    /// The transfer finished and the gateway reported an error.
    Failed,
}

impl TaskState {
    /// True for `{Completed, Failed, Cancelled}` — states that accept no
    /// further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Completed | TaskState::Failed
        )
    }

    /// True for `{Pending, Running}` — the states that make `is_loading`
    /// report `true`.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Suspended => "suspended",
            TaskState::Cancelled => "cancelled",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// HTTP method of a request descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl HttpMethod {
    /// The method name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hint for how request parameters are encoded on the wire.
///
/// The gateway interprets this; the core never inspects bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyEncoding {
    /// Parameters appended to the URL query string.
    Query,
    /// Parameters serialized as a JSON body.
    Json,
    /// Parameters serialized as a `application/x-www-form-urlencoded` body.
    Form,
}

/// What kind of transfer a descriptor describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Plain data request; the response body is held in memory.
    Data,
    /// Download to disk. The file name is derived from the target path and
    /// stored under the resolved save directory unless a name is given here.
    Download {
        /// Optional file name override within the save directory.
        file_name: Option<String>,
    },
    /// Upload the file at the given path as the request body.
    Upload {
        /// Path of the local file to upload.
        file_path: PathBuf,
    },
}

/// Semantic request definition, immutable once submitted.
///
/// The target may be a fully-qualified URL or a path relative to the
/// resolved base server address. Per-request parameters and headers override
/// global ones on key collision.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Target path, relative to the base server address unless it is a
    /// fully-qualified `http(s)://` URL.
    pub target: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Per-request parameters; override global parameters on key collision.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Per-request headers; override global headers on key collision.
    pub headers: HashMap<String, String>,
    /// Body encoding hint for the gateway.
    pub encoding: Option<BodyEncoding>,
    /// Transfer kind (data, download, upload).
    pub kind: RequestKind,
    /// Per-request base server address override.
    pub server: Option<String>,
    /// Per-request download save directory override.
    pub download_dir: Option<PathBuf>,
    /// Whether a cache lookup may short-circuit this request.
    pub cache_enabled: bool,
}

impl RequestDescriptor {
    /// Create a descriptor for a plain data request.
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method,
            parameters: HashMap::new(),
            headers: HashMap::new(),
            encoding: None,
            kind: RequestKind::Data,
            server: None,
            download_dir: None,
            cache_enabled: false,
        }
    }

    /// True if the target is a fully-qualified URL rather than a path
    /// relative to the base server address.
    pub fn is_absolute(&self) -> bool {
        self.target.starts_with("http://") || self.target.starts_with("https://")
    }

    /// Validate the caller preconditions for submission.
    ///
    /// A descriptor with a blank target is a programming error and is
    /// rejected before any task is created.
    pub fn validate(&self) -> Result<(), Error> {
        if self.target.trim().is_empty() {
            return Err(Error::invalid_argument(
                "request descriptor target must not be empty",
            ));
        }
        if let RequestKind::Upload { file_path } = &self.kind {
            if file_path.as_os_str().is_empty() {
                return Err(Error::invalid_argument("upload file path must not be empty"));
            }
        }
        Ok(())
    }
}

/// Progress of an in-flight transfer.
///
/// Emitted by the gateway any number of times before the terminal event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes transferred so far.
    pub transferred: u64,
    /// Total bytes, when the gateway knows it (e.g. from `Content-Length`).
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completed fraction in `[0.0, 1.0]`, or `None` when the total is
    /// unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.transferred as f64 / total as f64),
            _ => None,
        }
    }
}

/// Raw transport output, passed through the reformation pipeline unchanged
/// unless a strategy is supplied.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code reported by the gateway, if any.
    pub status: Option<u16>,
    /// Response headers as reported by the gateway.
    pub headers: HashMap<String, String>,
    /// Raw body bytes. Empty for downloads written to disk.
    pub body: Vec<u8>,
    /// Body parsed as JSON when the gateway could parse it.
    pub data_object: Option<serde_json::Value>,
    /// Whether the transport considered the exchange successful. This is a
    /// property of the raw response; the pipeline never recomputes it.
    pub is_success: bool,
    /// Where a download landed on disk, for download requests.
    pub file_path: Option<PathBuf>,
}

impl RawResponse {
    /// Construct a successful response around a JSON payload.
    pub fn success(data_object: serde_json::Value) -> Self {
        Self {
            status: Some(200),
            body: data_object.to_string().into_bytes(),
            data_object: Some(data_object),
            is_success: true,
            ..Default::default()
        }
    }
}

/// Output of the reformation pipeline: a success flag plus an arbitrary
/// domain payload, with any transformation failure attached as detail.
#[derive(Debug, Clone)]
pub struct ReformedResult {
    /// Success indicator. With no strategy this mirrors the raw response's
    /// flag; with a strategy it is the strategy payload's own indicator.
    pub is_success: bool,
    /// Domain payload. The identity of `RawResponse::data_object` when no
    /// strategy was supplied.
    pub payload: Option<serde_json::Value>,
    /// Detail for a failed transformation; never propagated as an error.
    pub error: Option<Error>,
}

impl ReformedResult {
    /// Identity result for a raw response with no reformation strategy.
    pub fn identity(raw: &RawResponse) -> Self {
        Self {
            is_success: raw.is_success,
            payload: raw.data_object.clone(),
            error: None,
        }
    }
}
