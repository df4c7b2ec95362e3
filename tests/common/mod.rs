//! Shared test helpers: a scriptable mock gateway and waiting utilities.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use reqflow::config::EffectiveConfig;
use reqflow::gateway::{EventSender, Gateway, GatewayEvent, GatewayHandle};
use reqflow::{RawResponse, RequestDescriptor, Result, TaskId, TaskState};

/// What the mock gateway saw for one dispatch.
pub struct DispatchRecord {
    pub config: EffectiveConfig,
    pub descriptor: RequestDescriptor,
    pub events: EventSender,
}

/// Gateway double. In manual mode the test plays the transport's part by
/// sending events through the recorded sender; in completing mode every
/// dispatch immediately succeeds with a canned response.
pub struct MockGateway {
    pub dispatches: Mutex<Vec<DispatchRecord>>,
    auto_response: Option<RawResponse>,
}

impl MockGateway {
    /// A gateway that records dispatches and leaves event delivery to the
    /// test.
    pub fn manual() -> Self {
        Self {
            dispatches: Mutex::new(Vec::new()),
            auto_response: None,
        }
    }

    /// A gateway that completes every dispatch with `response`.
    pub fn completing_with(response: RawResponse) -> Self {
        Self {
            dispatches: Mutex::new(Vec::new()),
            auto_response: Some(response),
        }
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().unwrap().len()
    }

    /// The event sender recorded for dispatch `index`.
    pub fn sender(&self, index: usize) -> EventSender {
        self.dispatches.lock().unwrap()[index].events.clone()
    }

    /// The effective configuration recorded for dispatch `index`.
    pub fn config(&self, index: usize) -> EffectiveConfig {
        self.dispatches.lock().unwrap()[index].config.clone()
    }

    /// Poll until the gateway has seen `count` dispatches.
    pub async fn wait_for_dispatches(&self, count: usize) {
        for _ in 0..200 {
            if self.dispatch_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("gateway never saw {count} dispatches");
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn dispatch(
        &self,
        config: EffectiveConfig,
        descriptor: RequestDescriptor,
        events: EventSender,
    ) -> Result<GatewayHandle> {
        let (handle, _control) = GatewayHandle::new();
        if let Some(response) = &self.auto_response {
            let _ = events.send(GatewayEvent::Completed(response.clone()));
        }
        self.dispatches.lock().unwrap().push(DispatchRecord {
            config,
            descriptor,
            events,
        });
        Ok(handle)
    }
}

/// Poll until the helper reports the given state for the task.
pub async fn wait_for_state(helper: &reqflow::NetHelper, id: TaskId, state: TaskState) {
    for _ in 0..200 {
        if helper.task_state(id).await.unwrap() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "task {id} never reached {state}, still {}",
        helper.task_state(id).await.unwrap()
    );
}
