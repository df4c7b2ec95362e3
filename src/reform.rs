//! Response reformation pipeline — converts raw transport output into
//! caller-defined domain payloads.
//!
//! The pipeline never raises on malformed payloads: any transformation
//! failure, including a panicking strategy, surfaces as `is_success = false`
//! with a [`Error::Reformation`] detail attached, never as a propagated
//! error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{RawResponse, ReformedResult};

/// Payload returned by a reformation strategy.
///
/// The strategy decides the success indicator itself; the pipeline reads it
/// without interpreting the value beyond that.
#[derive(Debug, Clone)]
pub struct Reformed {
    /// The strategy's own success indicator.
    pub is_success: bool,
    /// The domain payload.
    pub value: serde_json::Value,
}

impl Reformed {
    /// A successful domain payload.
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            is_success: true,
            value,
        }
    }

    /// A payload the strategy itself considers a failure (e.g. a business
    /// error embedded in a 200 response).
    pub fn failure(value: serde_json::Value) -> Self {
        Self {
            is_success: false,
            value,
        }
    }
}

/// Caller-supplied transform from a raw response to a domain payload.
pub trait Reformer: Send + Sync {
    /// Transform the raw response. Returning an error marks the result as
    /// failed; it is attached as detail and never propagated further.
    fn reform(&self, raw: &RawResponse) -> Result<Reformed>;
}

impl<F> Reformer for F
where
    F: Fn(&RawResponse) -> Result<Reformed> + Send + Sync,
{
    fn reform(&self, raw: &RawResponse) -> Result<Reformed> {
        self(raw)
    }
}

/// Run the reformation pipeline over a raw response.
///
/// With no strategy, the result is the identity of the raw response: the
/// payload is `raw.data_object` and the success flag is `raw.is_success`
/// (a property of the raw response, not recomputed here). With a strategy,
/// the strategy's payload and its own success indicator are used.
pub fn reform(raw: &RawResponse, strategy: Option<&dyn Reformer>) -> ReformedResult {
    let Some(strategy) = strategy else {
        return ReformedResult::identity(raw);
    };

    // Contain panicking strategies; a broken transform must not take the
    // task's event pump down with it.
    let outcome = catch_unwind(AssertUnwindSafe(|| strategy.reform(raw)));

    match outcome {
        Ok(Ok(reformed)) => ReformedResult {
            is_success: reformed.is_success,
            payload: Some(reformed.value),
            error: None,
        },
        Ok(Err(err)) => {
            warn!(error = %err, "reformation strategy failed");
            let detail = match err {
                already @ Error::Reformation { .. } => already,
                other => Error::reformation(other.to_string()),
            };
            ReformedResult {
                is_success: false,
                payload: None,
                error: Some(detail),
            }
        }
        Err(panic) => {
            let message = panic_message(&panic);
            warn!(message = %message, "reformation strategy panicked");
            ReformedResult {
                is_success: false,
                payload: None,
                error: Some(Error::reformation(format!(
                    "reformation strategy panicked: {message}"
                ))),
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_when_no_strategy() {
        let raw = RawResponse::success(json!({"name": "corvid"}));
        let result = reform(&raw, None);
        assert!(result.is_success);
        assert_eq!(result.payload, Some(json!({"name": "corvid"})));
        assert!(result.error.is_none());
    }

    #[test]
    fn identity_mirrors_raw_failure_flag() {
        let mut raw = RawResponse::success(json!({"err": "nope"}));
        raw.is_success = false;
        let result = reform(&raw, None);
        assert!(!result.is_success);
        assert!(result.error.is_none());
    }

    #[test]
    fn strategy_payload_and_indicator_win() {
        let strategy = |raw: &RawResponse| {
            let name = raw
                .data_object
                .as_ref()
                .and_then(|v| v.get("name"))
                .cloned()
                .unwrap_or(json!(null));
            Ok(Reformed::failure(json!({ "domain_name": name })))
        };
        let raw = RawResponse::success(json!({"name": "corvid"}));
        let result = reform(&raw, Some(&strategy));
        // The strategy said failure even though the raw response succeeded.
        assert!(!result.is_success);
        assert_eq!(result.payload, Some(json!({"domain_name": "corvid"})));
    }

    #[test]
    fn strategy_error_becomes_detail() {
        let strategy = |_: &RawResponse| Err(Error::InvalidJson("truncated".into()));
        let raw = RawResponse::success(json!({}));
        let result = reform(&raw, Some(&strategy));
        assert!(!result.is_success);
        assert!(result.payload.is_none());
        assert!(matches!(result.error, Some(Error::Reformation { .. })));
    }

    #[test]
    fn strategy_panic_is_contained() {
        let strategy = |_: &RawResponse| -> Result<Reformed> { panic!("boom") };
        let raw = RawResponse::success(json!({}));
        let result = reform(&raw, Some(&strategy));
        assert!(!result.is_success);
        match result.error {
            Some(Error::Reformation { message }) => assert!(message.contains("boom")),
            other => panic!("expected reformation detail, got {other:?}"),
        }
    }
}
