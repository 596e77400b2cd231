//! Test domain: a counter with an increment message and a change signal.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conqueror::{
    ContextDataScope, HandlerContext, HandlerRegistry, Message, MessageHandler, Messaging,
    MessagingError, Pipeline, Services, Signal, Validate, ValidationPipelineExt,
};
use serde::{Deserialize, Serialize};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared counter state, registered as a service.
#[derive(Debug, Default)]
pub struct CounterStore {
    value: AtomicI64,
    writes: AtomicUsize,
}

impl CounterStore {
    pub fn new(value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn add(&self, amount: i64) -> i64 {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.value.fetch_add(amount, Ordering::SeqCst) + amount
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// Message: add `amount` to the counter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Increment {
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterValue {
    pub value: i64,
}

impl Message for Increment {
    type Response = CounterValue;
    const NAME: &'static str = "counter.increment";
}

impl Validate for Increment {
    fn validate(&self) -> Result<(), String> {
        if self.amount <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount));
        }
        Ok(())
    }
}

/// Message without payload: read the current value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GetCounter;

impl Message for GetCounter {
    type Response = CounterValue;
    const NAME: &'static str = "counter.get";

    fn empty_instance() -> Option<Self> {
        Some(GetCounter)
    }
}

/// Signal: the counter changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CounterChanged {
    pub value: i64,
}

impl Message for CounterChanged {
    type Response = ();
    const NAME: &'static str = "counter.changed";
}

impl Signal for CounterChanged {}

/// Increments the store, records who asked, and announces the change.
pub struct IncrementHandler;

#[async_trait]
impl MessageHandler for IncrementHandler {
    type Message = Increment;

    async fn handle(
        &self,
        message: Increment,
        ctx: HandlerContext,
    ) -> Result<CounterValue, MessagingError> {
        let store = ctx.services().require::<CounterStore>()?;
        let value = store.add(message.amount);

        let context = ctx.conqueror_context();
        if let Some(caller) = context.downstream().get("caller") {
            context.upstream().set(
                "incremented-for",
                caller,
                ContextDataScope::AcrossTransports,
            );
        }

        ctx.messages()
            .signal::<CounterChanged>()
            .publish(CounterChanged { value })
            .await?;

        Ok(CounterValue { value })
    }

    fn configure_pipeline(pipeline: &mut Pipeline<Increment>) -> Result<(), MessagingError> {
        pipeline.use_validation();
        Ok(())
    }
}

pub fn counter_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(IncrementHandler)
        .unwrap()
        .register_fn(|_: GetCounter, ctx: HandlerContext| async move {
            let store = ctx.services().require::<CounterStore>()?;
            Ok::<_, MessagingError>(CounterValue {
                value: store.value(),
            })
        })
        .unwrap();
    registry
}

/// Messaging over the counter handlers with a store starting at `start`.
pub fn counter_messaging(start: i64) -> (Messaging, Arc<CounterStore>) {
    let store = Arc::new(CounterStore::new(start));
    let services = Services::new().with_shared(store.clone());
    (Messaging::new(counter_registry(), services), store)
}
