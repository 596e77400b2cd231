//! Signal publishing and broadcasting strategies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conqueror::{
    BroadcastingStrategy, HandlerContext, HandlerRegistry, Messaging, MessagingError, Services,
    SignalHandler,
};

use crate::support::{counter_registry, CounterChanged, CounterStore, Increment};

type Log = Arc<Mutex<Vec<&'static str>>>;

/// Three handlers: `a` succeeds, `b` fails, `c` succeeds.
fn messaging_with_failing_handler(log: &Log) -> Messaging {
    let mut registry = HandlerRegistry::new();
    let (a, b, c) = (log.clone(), log.clone(), log.clone());
    registry
        .register_signal_fn(move |_: CounterChanged, _ctx: HandlerContext| {
            let log = a.clone();
            async move {
                log.lock().unwrap().push("a");
                Ok::<_, MessagingError>(())
            }
        })
        .unwrap()
        .register_signal_fn(move |_: CounterChanged, _ctx: HandlerContext| {
            let log = b.clone();
            async move {
                log.lock().unwrap().push("b");
                Err::<(), _>(MessagingError::Rejected("b refused".into()))
            }
        })
        .unwrap()
        .register_signal_fn(move |_: CounterChanged, _ctx: HandlerContext| {
            let log = c.clone();
            async move {
                log.lock().unwrap().push("c");
                Ok::<_, MessagingError>(())
            }
        })
        .unwrap();
    Messaging::new(registry, Services::new())
}

#[tokio::test]
async fn sequential_stops_at_first_error() {
    let log = Log::default();
    let messaging = messaging_with_failing_handler(&log);

    let err = messaging
        .signal::<CounterChanged>()
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::Rejected(ref reason) if reason == "b refused"));
    assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn sequential_throw_after_all_runs_every_handler() {
    let log = Log::default();
    let messaging = messaging_with_failing_handler(&log);

    let err = messaging
        .signal::<CounterChanged>()
        .with_broadcasting_strategy(BroadcastingStrategy::sequential_throw_after_all())
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::Rejected(_)));
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn parallel_runs_every_handler_and_aggregates_failures() {
    let mut registry = HandlerRegistry::new();
    registry
        .register_signal_fn(|_: CounterChanged, _ctx: HandlerContext| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<(), _>(MessagingError::Rejected("first".into()))
        })
        .unwrap()
        .register_signal_fn(|_: CounterChanged, _ctx: HandlerContext| async move {
            Err::<(), _>(MessagingError::Rejected("second".into()))
        })
        .unwrap();
    let messaging = Messaging::new(registry, Services::new());

    let err = messaging
        .signal::<CounterChanged>()
        .with_broadcasting_strategy(BroadcastingStrategy::parallel())
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap_err();

    match err {
        MessagingError::Aggregate(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected aggregate, got {other}"),
    }
}

#[tokio::test]
async fn parallel_with_bounded_degree_delivers_to_all() {
    let log = Log::default();
    let messaging = messaging_with_failing_handler(&log);

    let err = messaging
        .signal::<CounterChanged>()
        .with_broadcasting_strategy(BroadcastingStrategy::parallel_with_max_degree(1))
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::Rejected(_)));
    let mut seen = log.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn zero_parallelism_is_invalid() {
    let log = Log::default();
    let messaging = messaging_with_failing_handler(&log);

    let err = messaging
        .signal::<CounterChanged>()
        .with_broadcasting_strategy(BroadcastingStrategy::parallel_with_max_degree(0))
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap_err();

    assert!(matches!(err, MessagingError::InvalidConfiguration(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn publishing_without_handlers_succeeds() {
    let messaging = Messaging::new(HandlerRegistry::new(), Services::new());
    messaging
        .signal::<CounterChanged>()
        .publish(CounterChanged { value: 1 })
        .await
        .unwrap();
}

struct LastValue(Arc<Mutex<Option<i64>>>);

#[async_trait]
impl SignalHandler for LastValue {
    type Signal = CounterChanged;

    async fn handle(&self, signal: CounterChanged, _ctx: HandlerContext) -> Result<(), MessagingError> {
        *self.0.lock().unwrap() = Some(signal.value);
        Ok(())
    }
}

#[tokio::test]
async fn handlers_publish_signals_to_observers() {
    let last = Arc::new(Mutex::new(None));
    let mut registry = counter_registry();
    registry.register_signal_handler(LastValue(last.clone())).unwrap();

    let services = Services::new().with(CounterStore::new(10));
    let messaging = Messaging::new(registry, services);

    messaging
        .message::<Increment>()
        .handle(Increment { amount: 5 })
        .await
        .unwrap();

    assert_eq!(*last.lock().unwrap(), Some(15));
}

#[test]
fn same_signal_handler_type_is_rejected_twice() {
    let mut registry = HandlerRegistry::new();
    registry
        .register_signal_handler(LastValue(Arc::default()))
        .unwrap();

    let err = registry
        .register_signal_handler(LastValue(Arc::default()))
        .unwrap_err();
    assert!(matches!(err, MessagingError::DuplicateRegistration { .. }));
    assert_eq!(registry.signal_registrations::<CounterChanged>().len(), 1);
}
