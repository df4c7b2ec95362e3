//! Layered configuration: global defaults, per-request overrides, and the
//! pure resolution cascade that merges them into an [`EffectiveConfig`].
//!
//! Resolution is a pure function of its inputs. The resolved value is
//! consumed by exactly one dispatch and never mutated afterward. There is no
//! ambient global configuration object; the facade owns a [`GlobalConfig`]
//! explicitly and passes it by reference to every resolve call.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sign::SigningService;
use crate::types::{BodyEncoding, HttpMethod, RequestDescriptor};

/// Process-scoped configuration defaults, held by the facade and applied to
/// every request that does not override them.
#[derive(Clone, Default)]
pub struct GlobalConfig {
    /// Base server address, e.g. `https://api.example.com`.
    pub base_url: Option<String>,
    /// Parameters added to every request; per-request keys win on collision.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Headers added to every request; per-request keys win on collision.
    pub headers: HashMap<String, String>,
    /// Directory downloads are saved into unless a request overrides it.
    pub download_dir: Option<PathBuf>,
    /// Default body encoding when a descriptor gives no hint.
    pub default_encoding: Option<BodyEncoding>,
    /// Signing service applied to every dispatch, when configured.
    pub signer: Option<Arc<dyn SigningService>>,
}

impl fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("base_url", &self.base_url)
            .field("parameters", &self.parameters)
            .field("headers", &self.headers)
            .field("download_dir", &self.download_dir)
            .field("default_encoding", &self.default_encoding)
            .field("signer", &self.signer.as_ref().map(|_| "<signer>"))
            .finish()
    }
}

impl GlobalConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base server address (builder-style).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Add a global parameter (builder-style).
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Add a global header (builder-style).
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the download save directory (builder-style).
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Set the signing service (builder-style).
    pub fn with_signer(mut self, signer: Arc<dyn SigningService>) -> Self {
        self.signer = Some(signer);
        self
    }
}

/// The fully merged settings used for exactly one dispatch.
///
/// Produced by [`resolve`], consumed by the gateway, never mutated.
#[derive(Clone)]
pub struct EffectiveConfig {
    /// The absolute URL of the dispatch (base address joined with the
    /// target, or the target itself when fully qualified).
    pub url: String,
    /// HTTP method, copied from the descriptor.
    pub method: HttpMethod,
    /// Merged parameter map (override keys win).
    pub parameters: HashMap<String, serde_json::Value>,
    /// Merged header map (override keys win).
    pub headers: HashMap<String, String>,
    /// Resolved body encoding.
    pub encoding: BodyEncoding,
    /// Resolved download save directory.
    pub download_dir: PathBuf,
    /// Resolved signing service reference, if any.
    pub signer: Option<Arc<dyn SigningService>>,
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("parameters", &self.parameters)
            .field("headers", &self.headers)
            .field("encoding", &self.encoding)
            .field("download_dir", &self.download_dir)
            .field("signer", &self.signer.as_ref().map(|_| "<signer>"))
            .finish()
    }
}

/// Merge global defaults with a request descriptor's overrides into the
/// effective configuration for one dispatch.
///
/// Merge rules:
/// - maps (parameters, headers): unioned key set, override keys win, no
///   deep merge of nested structures;
/// - scalars (base address, download directory, encoding): the override
///   replaces the global value only when present.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when the merged base address is empty
/// and the descriptor's target is not fully qualified.
pub fn resolve(global: &GlobalConfig, descriptor: &RequestDescriptor) -> Result<EffectiveConfig> {
    let base = descriptor
        .server
        .as_deref()
        .or(global.base_url.as_deref())
        .unwrap_or("");

    let url = if descriptor.is_absolute() {
        descriptor.target.clone()
    } else {
        if base.is_empty() {
            return Err(Error::configuration(
                "no base server address configured and request target is not fully qualified",
            ));
        }
        join_url(base, &descriptor.target)
    };

    let mut parameters = global.parameters.clone();
    parameters.extend(descriptor.parameters.clone());

    let mut headers = global.headers.clone();
    headers.extend(descriptor.headers.clone());

    let encoding = descriptor
        .encoding
        .or(global.default_encoding)
        .unwrap_or(match descriptor.method {
            HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete => BodyEncoding::Query,
            _ => BodyEncoding::Json,
        });

    let download_dir = descriptor
        .download_dir
        .clone()
        .or_else(|| global.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(EffectiveConfig {
        url,
        method: descriptor.method,
        parameters,
        headers,
        encoding,
        download_dir,
        signer: global.signer.clone(),
    })
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Cache key derived deterministically from an effective configuration.
///
/// Two dispatches with the same method, URL, and parameters produce the same
/// fingerprint regardless of map iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Derive the fingerprint for one dispatch.
    pub fn derive(config: &EffectiveConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        config.method.as_str().hash(&mut hasher);
        config.url.hash(&mut hasher);
        // Sort parameters so the fingerprint is stable across map orders.
        let sorted: BTreeMap<&String, String> = config
            .parameters
            .iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        for (key, value) in sorted {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        Fingerprint(hasher.finish())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn global() -> GlobalConfig {
        GlobalConfig::new()
            .with_base_url("https://api.example.com")
            .with_parameter("lang", json!("en"))
            .with_header("X-App", "reqflow")
    }

    #[test]
    fn override_params_win_on_collision() {
        let mut desc = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        desc.parameters.insert("lang".into(), json!("fr"));
        desc.parameters.insert("id".into(), json!("7"));

        let effective = resolve(&global(), &desc).unwrap();
        assert_eq!(effective.parameters["lang"], json!("fr"));
        assert_eq!(effective.parameters["id"], json!("7"));
    }

    #[test]
    fn global_params_survive_merge() {
        let mut desc = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        desc.parameters.insert("id".into(), json!("7"));

        let effective = resolve(&global(), &desc).unwrap();
        assert_eq!(effective.parameters["lang"], json!("en"));
        assert_eq!(effective.parameters["id"], json!("7"));
        assert_eq!(effective.url, "https://api.example.com/v1/item");
    }

    #[test]
    fn empty_base_with_relative_target_fails() {
        let desc = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        let err = resolve(&GlobalConfig::new(), &desc).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn absolute_target_needs_no_base() {
        let desc = RequestDescriptor::new(HttpMethod::Get, "https://other.example.com/x");
        let effective = resolve(&GlobalConfig::new(), &desc).unwrap();
        assert_eq!(effective.url, "https://other.example.com/x");
    }

    #[test]
    fn per_request_server_overrides_global() {
        let mut desc = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        desc.server = Some("https://staging.example.com".into());
        let effective = resolve(&global(), &desc).unwrap();
        assert_eq!(effective.url, "https://staging.example.com/v1/item");
    }

    #[test]
    fn encoding_defaults_by_method() {
        let get = RequestDescriptor::new(HttpMethod::Get, "/a");
        assert_eq!(resolve(&global(), &get).unwrap().encoding, BodyEncoding::Query);
        let post = RequestDescriptor::new(HttpMethod::Post, "/a");
        assert_eq!(resolve(&global(), &post).unwrap().encoding, BodyEncoding::Json);
    }

    #[test]
    fn fingerprint_stable_across_param_order() {
        let mut a = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        a.parameters.insert("x".into(), json!(1));
        a.parameters.insert("y".into(), json!(2));
        let mut b = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        b.parameters.insert("y".into(), json!(2));
        b.parameters.insert("x".into(), json!(1));

        let fa = Fingerprint::derive(&resolve(&global(), &a).unwrap());
        let fb = Fingerprint::derive(&resolve(&global(), &b).unwrap());
        assert_eq!(fa, fb);
    }

    #[test]
    fn fingerprint_differs_by_params() {
        let a = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        let mut b = RequestDescriptor::new(HttpMethod::Get, "/v1/item");
        b.parameters.insert("id".into(), json!("7"));

        let fa = Fingerprint::derive(&resolve(&global(), &a).unwrap());
        let fb = Fingerprint::derive(&resolve(&global(), &b).unwrap());
        assert_ne!(fa, fb);
    }
}
