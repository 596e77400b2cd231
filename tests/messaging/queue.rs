//! Queue transport: request/reply through an in-memory queue.

use std::sync::{Arc, Mutex};

use conqueror::transport::queue::{self, InMemoryQueue, QueueTransportClientBuilderExt};
use conqueror::{
    ConquerorContext, ContextDataScope, HandlerContext, HandlerRegistry, Message, Messaging,
    MessagingError, Services, TransportRole, ValidationMiddleware,
};
use serde::{Deserialize, Serialize};

use crate::support::{counter_registry, init_tracing, CounterStore, CounterValue, Increment};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Inspect;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct InspectionReport {
    trace_id: String,
    transport: String,
    saw_in_process_data: bool,
}

impl Message for Inspect {
    type Response = InspectionReport;
    const NAME: &'static str = "inspect";
}

fn server() -> (Messaging, Arc<CounterStore>) {
    let mut registry = counter_registry();
    registry
        .register_fn(|_: Inspect, ctx: HandlerContext| async move {
            let context = ctx.conqueror_context();
            Ok::<_, MessagingError>(InspectionReport {
                trace_id: context.trace_id().to_string(),
                transport: format!("{}/{}", ctx.transport_type(), ctx.transport_type().role()),
                saw_in_process_data: context.downstream().contains("local-only"),
            })
        })
        .unwrap();
    let store = Arc::new(CounterStore::new(10));
    let services = Services::new().with_shared(store.clone());
    (Messaging::new(registry, services), store)
}

fn client() -> Messaging {
    Messaging::new(HandlerRegistry::new(), Services::new())
}

#[tokio::test]
async fn increments_remote_counter() {
    init_tracing();
    let (server, store) = server();
    let queue = InMemoryQueue::new();
    let handle = queue::listen(server, queue.clone());

    let root = ConquerorContext::with_trace_id("abc");
    let _scope = root.activate().unwrap();
    root.downstream()
        .set("caller", "remote-client", ContextDataScope::AcrossTransports);

    let transport_queue = queue.clone();
    let value = client()
        .clients_in(&root)
        .message::<Increment>()
        .with_transport(move |builder| builder.use_queue::<Increment>(&transport_queue))
        .handle(Increment { amount: 5 })
        .await
        .unwrap();

    assert_eq!(value, CounterValue { value: 15 });
    assert_eq!(store.value(), 15);
    assert_eq!(
        root.upstream().get("incremented-for").as_deref(),
        Some("remote-client")
    );

    let stats = handle.stop().await;
    assert_eq!(stats.handled, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn trace_id_crosses_but_in_process_data_does_not() {
    let (server, _store) = server();
    let queue = InMemoryQueue::new();
    let _handle = queue::listen(server, queue.clone());

    let root = ConquerorContext::with_trace_id("abc");
    let _scope = root.activate().unwrap();
    root.downstream()
        .set("local-only", "x", ContextDataScope::InProcess);

    let report = client()
        .clients_in(&root)
        .message::<Inspect>()
        .with_transport(move |builder| builder.use_queue::<Inspect>(&queue))
        .handle(Inspect)
        .await
        .unwrap();

    assert_eq!(
        report,
        InspectionReport {
            trace_id: "abc".to_string(),
            transport: "queue/server".to_string(),
            saw_in_process_data: false,
        }
    );
}

#[tokio::test]
async fn remote_pipeline_is_client_side_only() {
    let (server, _store) = server();
    let queue = InMemoryQueue::new();
    let _handle = queue::listen(server, queue.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let record = seen.clone();
    client()
        .message::<Increment>()
        .with_pipeline(move |pipeline| {
            record.lock().unwrap().push((
                pipeline.transport_type().name().to_string(),
                pipeline.transport_type().role(),
                pipeline.contains::<ValidationMiddleware<Increment>>(),
            ));
            Ok(())
        })
        .with_transport(move |builder| builder.use_queue::<Increment>(&queue))
        .handle(Increment { amount: 1 })
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("queue".to_string(), TransportRole::Client, false)]
    );
}

#[tokio::test]
async fn remote_failures_carry_status_and_reason() {
    let (server, store) = server();
    let queue = InMemoryQueue::new();
    let handle = queue::listen(server, queue.clone());

    let err = client()
        .message::<Increment>()
        .with_transport(move |builder| builder.use_queue::<Increment>(&queue))
        .handle(Increment { amount: -1 })
        .await
        .unwrap_err();

    match &err {
        MessagingError::Transport(failure) => {
            assert_eq!(failure.status, Some(400));
            assert_eq!(failure.message_type, "counter.increment");
            assert!(failure.reason.contains("amount must be positive"));
            assert_eq!(failure.payload::<Increment>().map(|m| m.amount), Some(-1));
        }
        other => panic!("expected transport failure, got {other}"),
    }
    assert_eq!(err.status_code(), 400);
    assert_eq!(store.writes(), 0);

    let stats = handle.stop().await;
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn in_process_transport_can_be_chosen_explicitly() {
    let (server, store) = server();

    let value = server
        .message::<Increment>()
        .with_transport(|builder| builder.use_in_process::<Increment>())
        .handle(Increment { amount: 2 })
        .await
        .unwrap();

    assert_eq!(value.value, 12);
    assert_eq!(store.value(), 12);
}

#[tokio::test]
async fn sending_after_the_listener_stops_fails_fast() {
    let (server, _store) = server();
    let queue = InMemoryQueue::new();
    let handle = queue::listen(server, queue.clone());
    handle.stop().await;

    let err = client()
        .message::<Increment>()
        .with_transport(move |builder| builder.use_queue::<Increment>(&queue))
        .handle(Increment { amount: 1 })
        .await
        .unwrap_err();

    match err {
        MessagingError::Transport(failure) => {
            assert_eq!(failure.status, Some(503));
            assert_eq!(failure.reason, "queue request failed");
        }
        other => panic!("expected transport failure, got {other}"),
    }
}
