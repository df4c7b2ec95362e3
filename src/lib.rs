//! # reqflow — client-side request lifecycle manager
//!
//! This crate accepts abstract request descriptions, dispatches them through
//! a transport gateway, tracks each dispatched request as an addressable
//! task, and lets callers pause, resume, or cancel individual tasks or
//! batches of tasks by identifier. It resolves a layered configuration
//! (global defaults overridden by per-request settings) and runs an optional
//! response-reformation pipeline that converts raw transport responses into
//! caller-defined domain objects.
//!
//! ## Overview
//!
//! - **Task registry & lifecycle state machine** ([`registry::TaskRegistry`])
//!   — allocates monotonic task identifiers, tracks per-task state
//!   (`Pending → Running → {Completed, Failed}` with `Suspended` and
//!   `Cancelled` branches), and exposes single, batch, and all-task control
//!   operations that never block on network I/O.
//! - **Configuration resolver** ([`config::resolve`]) — merges
//!   [`config::GlobalConfig`] defaults with per-request overrides into one
//!   immutable [`config::EffectiveConfig`] per dispatch.
//! - **Reformation pipeline** ([`reform::reform`]) — converts raw transport
//!   output into caller-defined domain payloads, containing strategy errors
//!   and panics instead of propagating them.
//! - **Capability seams** — [`gateway::Gateway`], [`sign::SigningService`],
//!   and [`cache::CacheProvider`] are the contracts this crate consumes;
//!   swap in your own transport, signer, or cache storage.
//! - **Facade** ([`helper::NetHelper`]) — composes everything behind the
//!   request/resume/suspend/cancel surface.
//!
//! ## Feature flags
//!
//! | Feature        | Default | Description                                |
//! |----------------|---------|--------------------------------------------|
//! | `gateway-http` | yes     | reqwest-backed [`gateway::HttpGateway`]    |
//!
//! ## Quick start
//!
//! ```no_run
//! use reqflow::{HelperBuilder, RequestBuilder};
//!
//! #[tokio::main]
//! async fn main() -> reqflow::Result<()> {
//!     let helper = HelperBuilder::new()
//!         .configure(|config| {
//!             config
//!                 .with_base_url("https://api.example.com")
//!                 .with_parameter("lang", "en".into())
//!         })
//!         .build()?;
//!
//!     let id = helper
//!         .request(
//!             |builder| builder.with_target("/v1/items").with_parameter("id", "7"),
//!             Some(Box::new(|reformed, _raw| {
//!                 println!("payload: {:?}", reformed.payload);
//!             })),
//!             Some(Box::new(|err, _raw| eprintln!("request failed: {err}"))),
//!         )
//!         .await?;
//!
//!     // Tasks are addressable immediately: pause, resume, or cancel by id.
//!     helper.suspend(id).await?;
//!     helper.resume(id).await?;
//!
//!     while helper.is_loading().await {
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Model-driven requests
//!
//! Implement [`helper::RequestModel`] on a form or payload type and submit
//! it directly; the unified response callback sees the reformed result and
//! the raw response, on success and failure alike:
//!
//! ```no_run
//! use reqflow::{HttpMethod, NetHelper, RequestDescriptor, RequestModel};
//!
//! struct SignupForm {
//!     email: String,
//! }
//!
//! impl RequestModel for SignupForm {
//!     fn descriptor(&self) -> RequestDescriptor {
//!         let mut descriptor = RequestDescriptor::new(HttpMethod::Post, "/v1/signup");
//!         descriptor
//!             .parameters
//!             .insert("email".into(), self.email.clone().into());
//!         descriptor
//!     }
//! }
//! ```

pub mod builders;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod reform;
pub mod registry;
pub mod sign;
pub mod types;

/// Prelude module that re-exports the most frequently used types.
///
/// Import with `use reqflow::prelude::*;`.
pub mod prelude {
    pub use crate::builders::{HelperBuilder, RequestBuilder};
    pub use crate::cache::{CacheProvider, InMemoryCache};
    pub use crate::config::{resolve, EffectiveConfig, Fingerprint, GlobalConfig};
    pub use crate::error::{Error, Result};
    pub use crate::gateway::{Gateway, GatewayEvent, GatewayHandle};
    pub use crate::helper::{NetHelper, RequestModel};
    pub use crate::reform::{Reformed, Reformer};
    pub use crate::registry::{BatchOutcome, TaskCallbacks, TaskRegistry};
    pub use crate::sign::{Signature, SigningService};
    pub use crate::types::{
        BodyEncoding, HttpMethod, RawResponse, ReformedResult, RequestDescriptor, RequestKind,
        TaskId, TaskState, TransferProgress,
    };

    #[cfg(feature = "gateway-http")]
    pub use crate::gateway::HttpGateway;
}

// Re-export the core surface at the crate root for convenience.
pub use builders::{HelperBuilder, RequestBuilder};
pub use config::{EffectiveConfig, GlobalConfig};
pub use error::{Error, Result};
pub use helper::{NetHelper, RequestModel};
pub use types::{
    BodyEncoding, HttpMethod, RawResponse, ReformedResult, RequestDescriptor, RequestKind, TaskId,
    TaskState, TransferProgress,
};

#[cfg(feature = "gateway-http")]
pub use gateway::HttpGateway;
