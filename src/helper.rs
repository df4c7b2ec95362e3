//! Public facade composing the resolver, signer, cache, registry, and
//! gateway into the request/resume/suspend/cancel surface.
//!
//! Two submission shapes are exposed: a model-driven shape where the request
//! object itself bears the parameters (useful for large structured payloads
//! such as forms) and a closure-configuration shape where the caller
//! populates a [`RequestBuilder`] inline. Both converge on the same submit
//! path: resolve, sign, consult the cache, hand to the registry.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::builders::{HelperBuilder, RequestBuilder};
use crate::cache::CacheProvider;
use crate::config::{resolve, EffectiveConfig, Fingerprint, GlobalConfig};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::reform::Reformer;
use crate::registry::{
    BatchOutcome, FailureCallback, ProgressCallback, Submission, SuccessCallback, TaskCallbacks,
    TaskRegistry,
};
use crate::types::{
    HttpMethod, RawResponse, ReformedResult, RequestDescriptor, RequestKind, TaskId, TaskState,
};

/// A request object that bears its own parameters.
///
/// Implement this on form models or other structured payloads so they can be
/// submitted directly via [`NetHelper::request_model`].
pub trait RequestModel: Send + Sync {
    /// Produce the request descriptor for this model.
    fn descriptor(&self) -> RequestDescriptor;
}

/// Unified response callback for the model-driven shape.
///
/// Invoked exactly once with the reformed result (or the failure detail
/// attached to it) and the raw response.
pub type ResponseCallback = Box<dyn FnOnce(ReformedResult, RawResponse) + Send>;

/// The request lifecycle manager facade.
///
/// Owns the process-scoped [`GlobalConfig`] explicitly — there is no ambient
/// global; construct one helper at startup and share it.
///
/// # Example
///
/// ```no_run
/// use reqflow::{HelperBuilder, RequestBuilder};
///
/// # async fn example() -> reqflow::Result<()> {
/// let helper = HelperBuilder::new()
///     .configure(|config| config.with_base_url("https://api.example.com"))
///     .build()?;
///
/// let id = helper
///     .request(
///         |builder| builder.with_target("/v1/users").with_parameter("page", 1),
///         Some(Box::new(|reformed, _raw| {
///             println!("payload: {:?}", reformed.payload);
///         })),
///         Some(Box::new(|err, _raw| eprintln!("failed: {err}"))),
///     )
///     .await?;
///
/// helper.cancel(id).await?;
/// # Ok(())
/// # }
/// ```
pub struct NetHelper {
    config: RwLock<GlobalConfig>,
    registry: Arc<TaskRegistry>,
    cache: Option<Arc<dyn CacheProvider>>,
}

impl std::fmt::Debug for NetHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetHelper")
            .field("registry", &self.registry)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .finish_non_exhaustive()
    }
}

impl NetHelper {
    /// Create a helper with the default HTTP gateway and empty configuration.
    #[cfg(feature = "gateway-http")]
    pub fn new() -> Self {
        HelperBuilder::new()
            .build()
            .expect("default gateway is available with the gateway-http feature")
    }

    /// Start a [`HelperBuilder`].
    pub fn builder() -> HelperBuilder {
        HelperBuilder::new()
    }

    /// Assemble a helper from its parts. Used by [`HelperBuilder::build`].
    pub(crate) fn assemble(
        gateway: Arc<dyn Gateway>,
        cache: Option<Arc<dyn CacheProvider>>,
        config: GlobalConfig,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            registry: Arc::new(TaskRegistry::new(gateway)),
            cache,
        }
    }

    // ── Configuration ───────────────────────────────────────────

    /// Update the global configuration in place.
    pub async fn configure<F>(&self, f: F)
    where
        F: FnOnce(GlobalConfig) -> GlobalConfig,
    {
        let mut config = self.config.write().await;
        let updated = f(config.clone());
        *config = updated;
    }

    /// Snapshot of the current global configuration.
    pub async fn global_config(&self) -> GlobalConfig {
        self.config.read().await.clone()
    }

    /// Preview the effective configuration a descriptor would resolve to,
    /// without dispatching anything.
    pub async fn effective_config(&self, descriptor: &RequestDescriptor) -> Result<EffectiveConfig> {
        let global = self.config.read().await;
        resolve(&global, descriptor)
    }

    // ── Submission shapes ───────────────────────────────────────

    /// Model-driven submission: the request object bears the parameters.
    ///
    /// The unified `response` callback fires exactly once, on success and on
    /// failure alike; failures arrive as a `ReformedResult` with
    /// `is_success == false` and the error attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the model yields an empty
    /// descriptor, and [`Error::Configuration`] when resolution fails. No
    /// task is created in either case.
    pub async fn request_model<M>(
        &self,
        model: &M,
        reformer: Option<Arc<dyn Reformer>>,
        progress: Option<ProgressCallback>,
        response: ResponseCallback,
    ) -> Result<TaskId>
    where
        M: RequestModel + ?Sized,
    {
        let descriptor = model.descriptor();

        // Fan the single response callback into the registry's mutually
        // exclusive success/failure pair.
        let shared = Arc::new(std::sync::Mutex::new(Some(response)));
        let on_success = {
            let shared = Arc::clone(&shared);
            Box::new(move |reformed: ReformedResult, raw: RawResponse| {
                if let Some(cb) = shared.lock().unwrap().take() {
                    cb(reformed, raw);
                }
            }) as SuccessCallback
        };
        let on_failure = Box::new(move |err: Error, raw: Option<RawResponse>| {
            if let Some(cb) = shared.lock().unwrap().take() {
                let reformed = ReformedResult {
                    is_success: false,
                    payload: None,
                    error: Some(err),
                };
                cb(reformed, raw.unwrap_or_default());
            }
        }) as FailureCallback;

        self.submit_descriptor(
            descriptor,
            reformer,
            TaskCallbacks {
                progress,
                success: Some(on_success),
                failure: Some(on_failure),
            },
        )
        .await
    }

    /// Closure-configuration submission without progress reporting.
    ///
    /// The callback receives a fresh GET builder; set the target and
    /// anything else inline.
    pub async fn request<F>(
        &self,
        configure: F,
        success: Option<SuccessCallback>,
        failure: Option<FailureCallback>,
    ) -> Result<TaskId>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        self.request_with_progress(configure, None, success, failure)
            .await
    }

    /// Closure-configuration submission with progress reporting.
    pub async fn request_with_progress<F>(
        &self,
        configure: F,
        progress: Option<ProgressCallback>,
        success: Option<SuccessCallback>,
        failure: Option<FailureCallback>,
    ) -> Result<TaskId>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let descriptor = configure(RequestBuilder::new(HttpMethod::Get, "")).build();
        self.submit_descriptor(
            descriptor,
            None,
            TaskCallbacks {
                progress,
                success,
                failure,
            },
        )
        .await
    }

    /// The shared submit path: validate, resolve, sign, consult the cache,
    /// hand off to the registry.
    async fn submit_descriptor(
        &self,
        descriptor: RequestDescriptor,
        reformer: Option<Arc<dyn Reformer>>,
        callbacks: TaskCallbacks,
    ) -> Result<TaskId> {
        // Caller preconditions surface synchronously, before any task exists.
        descriptor.validate()?;

        let global = self.config.read().await.clone();
        let mut config = resolve(&global, &descriptor)?;

        if let Some(signer) = config.signer.clone() {
            let signature = signer.sign(&config).await?;
            config.headers.extend(signature.headers);
            config.parameters.extend(signature.parameters);
        }

        if self.cacheable(&descriptor) {
            if let Some(cache) = &self.cache {
                let fingerprint = Fingerprint::derive(&config);
                if let Some(raw) = cache.lookup(&fingerprint).await? {
                    debug!(fingerprint = %fingerprint, "serving request from cache");
                    return self
                        .registry
                        .submit_prefetched(descriptor, raw, reformer, callbacks)
                        .await;
                }
                return self
                    .registry
                    .submit(Submission {
                        descriptor,
                        config,
                        reformer,
                        callbacks,
                        cache: Some((Arc::clone(cache), fingerprint)),
                    })
                    .await;
            }
        }

        self.registry
            .submit(Submission {
                descriptor,
                config,
                reformer,
                callbacks,
                cache: None,
            })
            .await
    }

    fn cacheable(&self, descriptor: &RequestDescriptor) -> bool {
        descriptor.cache_enabled
            && descriptor.method == HttpMethod::Get
            && matches!(descriptor.kind, RequestKind::Data)
    }

    // ── Control surface ─────────────────────────────────────────

    /// Resume every suspended request.
    pub async fn resume_all(&self) {
        self.registry.resume_all().await;
    }

    /// Resume one request by identifier.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        self.registry.resume(id).await
    }

    /// Resume a batch of requests; unknown identifiers are reported
    /// per-element without affecting siblings.
    pub async fn resume_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.registry.resume_batch(ids).await
    }

    /// Suspend every live request.
    pub async fn suspend_all(&self) {
        self.registry.suspend_all().await;
    }

    /// Suspend one request by identifier.
    pub async fn suspend(&self, id: TaskId) -> Result<()> {
        self.registry.suspend(id).await
    }

    /// Suspend a batch of requests; unknown identifiers are reported
    /// per-element without affecting siblings.
    pub async fn suspend_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.registry.suspend_batch(ids).await
    }

    /// Cancel every live request.
    pub async fn cancel_all(&self) {
        self.registry.cancel_all().await;
    }

    /// Cancel one request by identifier.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        self.registry.cancel(id).await
    }

    /// Cancel a batch of requests; unknown identifiers are reported
    /// per-element without affecting siblings.
    pub async fn cancel_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.registry.cancel_batch(ids).await
    }

    // ── Queries ─────────────────────────────────────────────────

    /// True iff at least one request is pending or running.
    pub async fn is_loading(&self) -> bool {
        self.registry.is_loading().await
    }

    /// The current lifecycle state of a request.
    pub async fn task_state(&self, id: TaskId) -> Result<TaskState> {
        self.registry.task_state(id).await
    }

    /// Number of tracked requests, finished ones included.
    pub async fn task_count(&self) -> usize {
        self.registry.len().await
    }

    /// Drop finished requests from the registry, returning how many were
    /// removed.
    pub async fn purge_finished(&self) -> usize {
        self.registry.purge_terminal().await
    }
}

#[cfg(feature = "gateway-http")]
impl Default for NetHelper {
    fn default() -> Self {
        Self::new()
    }
}
