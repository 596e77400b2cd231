//! Context data flowing through nested in-process handlers.

use conqueror::{
    ConquerorContext, ContextDataScope, HandlerContext, HandlerRegistry, Message, Messaging,
    MessagingError, Services,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct Outer;

impl Message for Outer {
    type Response = String;
    const NAME: &'static str = "nested.outer";
}

#[derive(Clone, Serialize, Deserialize)]
struct Inner;

impl Message for Inner {
    type Response = String;
    const NAME: &'static str = "nested.inner";
}

fn nested_messaging() -> Messaging {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(|_: Outer, ctx: HandlerContext| async move {
            let context = ctx.conqueror_context();
            context
                .downstream()
                .set("outer", "was-here", ContextDataScope::InProcess);

            let inner = ctx.messages().message::<Inner>().handle(Inner).await?;

            let seen = context.upstream().get("inner").unwrap_or_default();
            Ok::<_, MessagingError>(format!("{inner}/{seen}"))
        })
        .unwrap()
        .register_fn(|_: Inner, ctx: HandlerContext| async move {
            let context = ctx.conqueror_context();
            let outer = context.downstream().get("outer").unwrap_or_default();
            let tenant = context.downstream().get("tenant").unwrap_or_default();

            context
                .upstream()
                .set("inner", "done", ContextDataScope::InProcess);
            context.bidirectional().remove("session");
            context
                .bidirectional()
                .set("visited", "inner", ContextDataScope::InProcess);

            Ok::<_, MessagingError>(format!("{tenant}:{outer}"))
        })
        .unwrap();
    Messaging::new(registry, Services::new())
}

#[tokio::test]
async fn data_flows_down_and_back_up_through_nested_handlers() {
    let messaging = nested_messaging();
    let root = ConquerorContext::with_trace_id("trace-1");
    let _scope = root.activate().unwrap();
    root.downstream()
        .set("tenant", "acme", ContextDataScope::AcrossTransports);
    root.bidirectional()
        .set("session", "s1", ContextDataScope::InProcess);

    let result = messaging
        .clients_in(&root)
        .message::<Outer>()
        .handle(Outer)
        .await
        .unwrap();

    assert_eq!(result, "acme:was-here/done");
    assert_eq!(root.upstream().get("inner").as_deref(), Some("done"));
    assert_eq!(root.bidirectional().get("visited").as_deref(), Some("inner"));
    assert!(root.bidirectional().get("session").is_none());
    assert!(root.downstream().get("outer").is_none());
}

#[tokio::test]
async fn child_contexts_share_the_trace_id() {
    let (trace_id, child_trace_id) = {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn(|_: Inner, ctx: HandlerContext| async move {
                Ok::<_, MessagingError>(ctx.conqueror_context().trace_id().to_string())
            })
            .unwrap();
        let messaging = Messaging::new(registry, Services::new());

        let root = ConquerorContext::new();
        let _scope = root.activate().unwrap();
        let seen = messaging
            .clients_in(&root)
            .message::<Inner>()
            .handle(Inner)
            .await
            .unwrap();
        (root.trace_id().to_string(), seen)
    };

    assert_eq!(trace_id, child_trace_id);
}

#[tokio::test]
async fn sibling_writes_survive_each_other() {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(|_: Inner, ctx: HandlerContext| async move {
            let context = ctx.conqueror_context();
            let key = context.downstream().get("key").unwrap_or_default();
            context
                .upstream()
                .set(key.clone(), "written", ContextDataScope::InProcess);
            Ok::<_, MessagingError>(key)
        })
        .unwrap();
    let messaging = Messaging::new(registry, Services::new());

    let root = ConquerorContext::new();
    let _scope = root.activate().unwrap();
    for key in ["first", "second"] {
        root.downstream().set("key", key, ContextDataScope::InProcess);
        messaging
            .clients_in(&root)
            .message::<Inner>()
            .handle(Inner)
            .await
            .unwrap();
    }

    assert_eq!(root.upstream().get("first").as_deref(), Some("written"));
    assert_eq!(root.upstream().get("second").as_deref(), Some("written"));
}

#[tokio::test]
async fn items_are_only_available_while_active() {
    let context = ConquerorContext::new();
    assert!(context.set_item("user", 7_u32).is_err());

    {
        let _scope = context.activate().unwrap();
        context.set_item("user", 7_u32).unwrap();
        assert_eq!(context.item::<u32>("user").unwrap().as_deref(), Some(&7));
        assert!(context.activate().is_err());
    }

    assert!(!context.is_active());
    assert!(context.item::<u32>("user").is_err());
}

#[derive(Clone, Serialize, Deserialize)]
struct Write;

impl Message for Write {
    type Response = ();
    const NAME: &'static str = "siblings.write";
}

#[derive(Clone, Serialize, Deserialize)]
struct Linger;

impl Message for Linger {
    type Response = ();
    const NAME: &'static str = "siblings.linger";
}

#[tokio::test]
async fn concurrent_sibling_does_not_restore_stale_bidirectional_data() {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(|_: Write, ctx: HandlerContext| async move {
            ctx.conqueror_context()
                .bidirectional()
                .set("k", "fresh", ContextDataScope::InProcess);
            Ok::<_, MessagingError>(())
        })
        .unwrap()
        .register_fn(|_: Linger, _ctx: HandlerContext| async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, MessagingError>(())
        })
        .unwrap();
    let messaging = Messaging::new(registry, Services::new());

    let root = ConquerorContext::new();
    let _scope = root.activate().unwrap();
    root.bidirectional()
        .set("k", "stale", ContextDataScope::InProcess);

    let clients = messaging.clients_in(&root);
    let lingering = clients.message::<Linger>();
    let writing = clients.message::<Write>();
    let (lingered, written) = tokio::join!(lingering.handle(Linger), writing.handle(Write));
    lingered.unwrap();
    written.unwrap();

    assert_eq!(root.bidirectional().get("k").as_deref(), Some("fresh"));
}
