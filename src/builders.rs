//! Builder patterns for ergonomic construction of requests and the helper.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheProvider;
use crate::config::GlobalConfig;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::helper::NetHelper;
use crate::types::{BodyEncoding, HttpMethod, RequestDescriptor, RequestKind};

/// Builder for [`RequestDescriptor`] with method shortcuts.
///
/// # Example
///
/// ```
/// use reqflow::builders::RequestBuilder;
///
/// let descriptor = RequestBuilder::get("/v1/users")
///     .with_parameter("page", 2)
///     .with_header("X-Trace", "abc123")
///     .build();
/// assert_eq!(descriptor.target, "/v1/users");
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    descriptor: RequestDescriptor,
}

impl RequestBuilder {
    /// Start a builder for the given method and target.
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            descriptor: RequestDescriptor::new(method, target),
        }
    }

    /// Start a GET request builder.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target)
    }

    /// Start a POST request builder.
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, target)
    }

    /// Start a PUT request builder.
    pub fn put(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, target)
    }

    /// Start a DELETE request builder.
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, target)
    }

    /// Set the target path or fully-qualified URL.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.descriptor.target = target.into();
        self
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.descriptor.method = method;
        self
    }

    /// Add a per-request parameter; overrides a global parameter with the
    /// same key.
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.descriptor.parameters.insert(key.into(), value.into());
        self
    }

    /// Add a per-request header; overrides a global header with the same key.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.headers.insert(key.into(), value.into());
        self
    }

    /// Set the body encoding hint.
    pub fn with_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.descriptor.encoding = Some(encoding);
        self
    }

    /// Override the base server address for this request only.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.descriptor.server = Some(server.into());
        self
    }

    /// Override the download save directory for this request only.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.descriptor.download_dir = Some(dir.into());
        self
    }

    /// Mark this request as a download, optionally naming the saved file.
    pub fn download(mut self, file_name: Option<String>) -> Self {
        self.descriptor.kind = RequestKind::Download { file_name };
        self
    }

    /// Mark this request as an upload of the file at `path`.
    pub fn upload(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor.kind = RequestKind::Upload {
            file_path: path.into(),
        };
        self
    }

    /// Allow a cache lookup to short-circuit this request.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.descriptor.cache_enabled = enabled;
        self
    }

    /// Build the descriptor. Validation happens at submission.
    pub fn build(self) -> RequestDescriptor {
        self.descriptor
    }
}

/// Builder for [`NetHelper`] with fluent configuration.
///
/// # Example
///
/// ```
/// use reqflow::builders::HelperBuilder;
///
/// let helper = HelperBuilder::new()
///     .configure(|config| config.with_base_url("https://api.example.com"))
///     .build()
///     .unwrap();
/// # drop(helper);
/// ```
pub struct HelperBuilder {
    gateway: Option<Arc<dyn Gateway>>,
    cache: Option<Arc<dyn CacheProvider>>,
    config: GlobalConfig,
}

impl HelperBuilder {
    /// Create a builder with an empty configuration and the default gateway.
    pub fn new() -> Self {
        Self {
            gateway: None,
            cache: None,
            config: GlobalConfig::new(),
        }
    }

    /// Use a custom transport gateway.
    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Attach a cache provider.
    pub fn with_cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the global configuration directly.
    pub fn with_config(mut self, config: GlobalConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the global defaults using a builder callback.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(GlobalConfig) -> GlobalConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Build the helper.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] when no gateway was supplied
    /// and the `gateway-http` feature (which provides the default) is
    /// disabled.
    pub fn build(self) -> Result<NetHelper> {
        let gateway = match self.gateway {
            Some(gateway) => gateway,
            None => default_gateway()?,
        };
        Ok(NetHelper::assemble(gateway, self.cache, self.config))
    }
}

impl Default for HelperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "gateway-http")]
fn default_gateway() -> Result<Arc<dyn Gateway>> {
    Ok(Arc::new(crate::gateway::HttpGateway::new()))
}

#[cfg(not(feature = "gateway-http"))]
fn default_gateway() -> Result<Arc<dyn Gateway>> {
    Err(crate::error::Error::configuration(
        "no gateway configured and the gateway-http feature is disabled",
    ))
}
