//! In-process dispatch through caller and handler pipelines.

use std::sync::{Arc, Mutex};

use conqueror::{
    ConquerorContext, ContextDataScope, HandlerRegistry, LoggingPipelineExt, Message, Messaging,
    MessagingError, Services, TransportRole, ValidationMiddleware, ValidationPipelineExt,
};
use serde::{Deserialize, Serialize};

use crate::support::{counter_messaging, init_tracing, CounterValue, GetCounter, Increment};

#[derive(Default)]
struct HookCalls {
    pre: Mutex<Vec<i64>>,
    post: Mutex<Vec<i64>>,
    exceptions: Mutex<Vec<String>>,
}

#[tokio::test]
async fn increment_through_logging_pipeline() {
    init_tracing();
    let (messaging, store) = counter_messaging(10);
    let calls = Arc::new(HookCalls::default());

    let hooks = calls.clone();
    let value = messaging
        .message::<Increment>()
        .with_pipeline(move |pipeline| {
            let hooks = hooks.clone();
            pipeline.use_logging_with(move |logging| {
                let pre = hooks.clone();
                let post = hooks.clone();
                let exceptions = hooks.clone();
                logging
                    .on_pre_execution(move |ctx| {
                        pre.pre.lock().unwrap().push(ctx.message.amount);
                        Ok(true)
                    })
                    .on_post_execution(move |ctx| {
                        post.post.lock().unwrap().push(ctx.response.value);
                        Ok(true)
                    })
                    .on_exception(move |ctx| {
                        exceptions.exceptions.lock().unwrap().push(ctx.error.to_string());
                        Ok(true)
                    });
            });
            Ok(())
        })
        .handle(Increment { amount: 5 })
        .await
        .unwrap();

    assert_eq!(value, CounterValue { value: 15 });
    assert_eq!(store.value(), 15);
    assert_eq!(*calls.pre.lock().unwrap(), vec![5]);
    assert_eq!(*calls.post.lock().unwrap(), vec![15]);
    assert!(calls.exceptions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_increment_never_reaches_handler() {
    let (messaging, store) = counter_messaging(10);
    let post_calls = Arc::new(Mutex::new(0usize));

    let counter = post_calls.clone();
    let err = messaging
        .message::<Increment>()
        .with_pipeline(move |pipeline| {
            let counter = counter.clone();
            pipeline.use_logging_with(move |logging| {
                logging.on_post_execution(move |_| {
                    *counter.lock().unwrap() += 1;
                    Ok(true)
                });
            });
            Ok(())
        })
        .handle(Increment { amount: -1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::ValidationFailed(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(store.value(), 10);
    assert_eq!(store.writes(), 0);
    assert_eq!(*post_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn caller_configuration_runs_after_handler_configuration() {
    let (messaging, _store) = counter_messaging(0);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let record = seen.clone();
    messaging
        .message::<Increment>()
        .with_pipeline(move |pipeline| {
            record.lock().unwrap().push((
                pipeline.contains::<ValidationMiddleware<Increment>>(),
                pipeline.transport_type().name().to_string(),
                pipeline.transport_type().role(),
            ));
            Ok(())
        })
        .handle(Increment { amount: 1 })
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(true, "in-process".to_string(), TransportRole::Server)]
    );
}

#[tokio::test]
async fn caller_can_remove_handler_middleware() {
    let (messaging, store) = counter_messaging(10);

    let value = messaging
        .message::<Increment>()
        .with_pipeline(|pipeline| {
            pipeline.without_validation();
            Ok(())
        })
        .handle(Increment { amount: -1 })
        .await
        .unwrap();

    assert_eq!(value.value, 9);
    assert_eq!(store.value(), 9);
}

#[tokio::test]
async fn configuration_errors_abort_dispatch() {
    let (messaging, store) = counter_messaging(10);

    let err = messaging
        .message::<Increment>()
        .with_pipeline(|pipeline| {
            pipeline.configure_logging(|_| {})?;
            Ok(())
        })
        .handle(Increment { amount: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::MiddlewareNotFound(_)));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn middleware_can_short_circuit() {
    let (messaging, store) = counter_messaging(10);

    let value = messaging
        .message::<Increment>()
        .with_pipeline(|pipeline| {
            pipeline.use_fn(|_ctx| async move { Ok::<_, MessagingError>(CounterValue { value: -42 }) });
            Ok(())
        })
        .handle(Increment { amount: 1 })
        .await
        .unwrap();

    assert_eq!(value.value, -42);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn unregistered_message_is_not_found() {
    #[derive(Clone, Serialize, Deserialize)]
    struct Unknown;

    impl Message for Unknown {
        type Response = ();
        const NAME: &'static str = "unknown";
    }

    let messaging = Messaging::new(HandlerRegistry::new(), Services::new());
    let err = messaging.message::<Unknown>().handle(Unknown).await.unwrap_err();

    assert!(matches!(err, MessagingError::HandlerNotFound(ref name) if name == "unknown"));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn missing_service_is_reported() {
    let messaging = Messaging::new(crate::support::counter_registry(), Services::new());
    let err = messaging.message::<GetCounter>().handle(GetCounter).await.unwrap_err();
    assert!(matches!(err, MessagingError::ServiceNotFound(_)));
}

#[tokio::test]
async fn upstream_data_reaches_the_calling_context() {
    let (messaging, _store) = counter_messaging(0);
    let root = ConquerorContext::new();
    let _scope = root.activate().unwrap();
    root.downstream()
        .set("caller", "tests", ContextDataScope::InProcess);

    messaging
        .clients_in(&root)
        .message::<Increment>()
        .handle(Increment { amount: 3 })
        .await
        .unwrap();

    assert_eq!(root.upstream().get("incremented-for").as_deref(), Some("tests"));
    assert!(root.downstream().get("incremented-for").is_none());
}

#[tokio::test]
async fn cancellation_is_visible_to_handlers() {
    use conqueror::HandlerContext;
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, Serialize, Deserialize)]
    struct Slow;

    impl Message for Slow {
        type Response = ();
        const NAME: &'static str = "slow";
    }

    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(|_: Slow, ctx: HandlerContext| async move {
            ctx.ensure_not_cancelled()?;
            Ok::<_, MessagingError>(())
        })
        .unwrap();
    let messaging = Messaging::new(registry, Services::new());

    let token = CancellationToken::new();
    token.cancel();
    let err = messaging
        .message::<Slow>()
        .handle_with_cancellation(Slow, token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.status_code(), 499);
}
