//! Full lifecycle tests through the facade: submission, control operations,
//! batch semantics, and terminal-state idempotence.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_state, MockGateway};
use serde_json::json;

use reqflow::gateway::GatewayEvent;
use reqflow::registry::ProgressCallback;
use reqflow::{
    Error, HelperBuilder, NetHelper, RawResponse, TaskState, TransferProgress,
};

fn helper_with(gateway: Arc<MockGateway>) -> NetHelper {
    HelperBuilder::new()
        .with_gateway(gateway)
        .configure(|config| config.with_base_url("https://api.example.com"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn submit_returns_immediately_with_pending_task() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let id = helper
        .request(|b| b.with_target("/v1/slow"), None, None)
        .await
        .unwrap();

    // Addressable right away, before the gateway has acknowledged anything.
    let state = helper.task_state(id).await.unwrap();
    assert!(state == TaskState::Pending || state == TaskState::Running);
    assert!(helper.is_loading().await);
}

#[tokio::test]
async fn cancel_just_submitted_task_never_observes_running() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let id = helper
        .request(|b| b.with_target("/v1/slow"), None, None)
        .await
        .unwrap();
    helper.cancel(id).await.unwrap();
    assert_eq!(helper.task_state(id).await.unwrap(), TaskState::Cancelled);

    // Let the background dispatch settle; the state must not move.
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(helper.task_state(id).await.unwrap(), TaskState::Cancelled);
}

#[tokio::test]
async fn batch_suspend_with_unknown_id_leaves_siblings_unaffected() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let a = helper
        .request(|b| b.with_target("/v1/a"), None, None)
        .await
        .unwrap();
    let b = helper
        .request(|b| b.with_target("/v1/b"), None, None)
        .await
        .unwrap();
    gateway.wait_for_dispatches(2).await;
    wait_for_state(&helper, a, TaskState::Running).await;
    wait_for_state(&helper, b, TaskState::Running).await;

    let unknown = 987_654;
    let outcome = helper.suspend_batch(&[a, unknown, b]).await;

    assert_eq!(outcome.failures.len(), 1);
    let (failed_id, err) = &outcome.failures[0];
    assert_eq!(*failed_id, unknown);
    assert!(matches!(err, Error::UnknownTask { .. }));

    assert_eq!(helper.task_state(a).await.unwrap(), TaskState::Suspended);
    assert_eq!(helper.task_state(b).await.unwrap(), TaskState::Suspended);
}

#[tokio::test]
async fn control_on_unknown_id_reports_error_and_changes_nothing() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway);

    for result in [
        helper.suspend(555).await,
        helper.resume(555).await,
        helper.cancel(555).await,
    ] {
        assert!(matches!(result.unwrap_err(), Error::UnknownTask { id: 555 }));
    }
    assert_eq!(helper.task_count().await, 0);
}

#[tokio::test]
async fn suspend_all_then_resume_all_round_trips() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let a = helper
        .request(|b| b.with_target("/v1/a"), None, None)
        .await
        .unwrap();
    let b = helper
        .request(|b| b.with_target("/v1/b"), None, None)
        .await
        .unwrap();
    gateway.wait_for_dispatches(2).await;
    wait_for_state(&helper, a, TaskState::Running).await;
    wait_for_state(&helper, b, TaskState::Running).await;

    helper.suspend_all().await;
    assert_eq!(helper.task_state(a).await.unwrap(), TaskState::Suspended);
    assert_eq!(helper.task_state(b).await.unwrap(), TaskState::Suspended);
    assert!(!helper.is_loading().await);

    helper.resume_all().await;
    assert_eq!(helper.task_state(a).await.unwrap(), TaskState::Running);
    assert_eq!(helper.task_state(b).await.unwrap(), TaskState::Running);
    assert!(helper.is_loading().await);
}

#[tokio::test]
async fn no_callbacks_fire_after_terminal_state() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let progress_seen = Arc::new(AtomicUsize::new(0));
    let pc = progress_seen.clone();
    let progress: ProgressCallback = Arc::new(move |_p: TransferProgress| {
        pc.fetch_add(1, Ordering::SeqCst);
    });

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let id = helper
        .request_with_progress(
            |b| b.with_target("/v1/stream"),
            Some(progress),
            Some(Box::new(move |_reformed, _raw| {
                let _ = done_tx.send(());
            })),
            None,
        )
        .await
        .unwrap();

    gateway.wait_for_dispatches(1).await;
    wait_for_state(&helper, id, TaskState::Running).await;

    let sender = gateway.sender(0);
    sender
        .send(GatewayEvent::Progress(TransferProgress {
            transferred: 512,
            total: Some(1024),
        }))
        .unwrap();
    sender
        .send(GatewayEvent::Completed(RawResponse::success(json!({"done": true}))))
        .unwrap();
    done_rx.await.unwrap();

    // Events arriving after the terminal transition must be swallowed.
    sender
        .send(GatewayEvent::Progress(TransferProgress {
            transferred: 1024,
            total: Some(1024),
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(progress_seen.load(Ordering::SeqCst), 1);
    assert_eq!(helper.task_state(id).await.unwrap(), TaskState::Completed);
}

#[tokio::test]
async fn terminal_tasks_tolerate_broad_batch_operations() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let id = helper
        .request(|b| b.with_target("/v1/one-shot"), None, None)
        .await
        .unwrap();
    gateway.wait_for_dispatches(1).await;
    wait_for_state(&helper, id, TaskState::Running).await;
    gateway
        .sender(0)
        .send(GatewayEvent::Completed(RawResponse::success(json!({}))))
        .unwrap();
    wait_for_state(&helper, id, TaskState::Completed).await;

    // A broad batch over a finished task reports nothing for it.
    let outcome = helper.cancel_batch(&[id]).await;
    assert!(outcome.is_ok());
    assert_eq!(helper.task_state(id).await.unwrap(), TaskState::Completed);
}

#[tokio::test]
async fn failure_event_drives_failure_callback_once() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let failures = Arc::new(AtomicUsize::new(0));
    let fc = failures.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let id = helper
        .request(
            |b| b.with_target("/v1/broken"),
            None,
            Some(Box::new(move |err, _raw| {
                fc.fetch_add(1, Ordering::SeqCst);
                assert!(matches!(err, Error::Transport(_)));
                let _ = done_tx.send(());
            })),
        )
        .await
        .unwrap();

    gateway.wait_for_dispatches(1).await;
    wait_for_state(&helper, id, TaskState::Running).await;

    let sender = gateway.sender(0);
    sender
        .send(GatewayEvent::Failed(Error::transport("connection reset")))
        .unwrap();
    done_rx.await.unwrap();

    // A duplicate terminal event must not re-fire the callback.
    sender
        .send(GatewayEvent::Failed(Error::transport("again")))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(helper.task_state(id).await.unwrap(), TaskState::Failed);
}

#[tokio::test]
async fn purge_drops_only_finished_tasks() {
    let gateway = Arc::new(MockGateway::manual());
    let helper = helper_with(gateway.clone());

    let live = helper
        .request(|b| b.with_target("/v1/live"), None, None)
        .await
        .unwrap();
    let done = helper
        .request(|b| b.with_target("/v1/done"), None, None)
        .await
        .unwrap();
    gateway.wait_for_dispatches(2).await;
    wait_for_state(&helper, done, TaskState::Running).await;

    // Finish the second task. Dispatch order matches submission order.
    let index = {
        let records = gateway.dispatches.lock().unwrap();
        records
            .iter()
            .position(|r| r.descriptor.target == "/v1/done")
            .unwrap()
    };
    gateway
        .sender(index)
        .send(GatewayEvent::Completed(RawResponse::success(json!({}))))
        .unwrap();
    wait_for_state(&helper, done, TaskState::Completed).await;

    assert_eq!(helper.purge_finished().await, 1);
    assert_eq!(helper.task_count().await, 1);
    assert!(helper.task_state(live).await.is_ok());
    assert!(matches!(
        helper.task_state(done).await.unwrap_err(),
        Error::UnknownTask { .. }
    ));
}
