//! Signing capability — an external collaborator invoked after configuration
//! resolution and before dispatch.
//!
//! The core only defines the contract; the algorithm itself (HMAC, OAuth,
//! bearer tokens, ...) lives in the implementation. Implementations must be
//! safe for concurrent invocation from multiple tasks.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::EffectiveConfig;
use crate::error::Result;

/// Headers and parameters a signing service adds to a dispatch.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    /// Headers to merge into the effective configuration.
    pub headers: HashMap<String, String>,
    /// Parameters to merge into the effective configuration.
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Capability interface for request signing and authentication.
///
/// Invoked once per dispatch with the resolved configuration. The returned
/// [`Signature`] is merged on top of the effective headers and parameters
/// (signature keys win).
#[async_trait]
pub trait SigningService: Send + Sync {
    /// Compute the signature augment for one dispatch.
    async fn sign(&self, config: &EffectiveConfig) -> Result<Signature>;
}

/// Signing service that attaches a fixed set of headers to every dispatch.
///
/// Covers the common bearer-token and API-key cases without a bespoke
/// implementation.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaderSigner {
    headers: HashMap<String, String>,
}

impl StaticHeaderSigner {
    /// Create a signer with no headers; add them builder-style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to attach on every dispatch.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add an `Authorization: Bearer <token>` header.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token.into()))
    }
}

#[async_trait]
impl SigningService for StaticHeaderSigner {
    async fn sign(&self, _config: &EffectiveConfig) -> Result<Signature> {
        Ok(Signature {
            headers: self.headers.clone(),
            parameters: HashMap::new(),
        })
    }
}
