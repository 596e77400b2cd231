//! Handler registration rules.

use conqueror::{HandlerContext, HandlerRegistry, MessagingError};

use crate::support::{counter_registry, CounterValue, GetCounter, Increment, IncrementHandler};

#[test]
fn duplicate_message_handlers_are_rejected() {
    let mut registry = counter_registry();

    let err = registry.register(IncrementHandler).unwrap_err();
    match err {
        MessagingError::DuplicateRegistration {
            message_type,
            existing_handler,
            new_handler,
        } => {
            assert!(message_type.ends_with("Increment"));
            assert!(existing_handler.ends_with("IncrementHandler"));
            assert!(new_handler.ends_with("IncrementHandler"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = registry
        .register_fn(|_: Increment, _ctx: HandlerContext| async move {
            Ok::<_, MessagingError>(CounterValue { value: 0 })
        })
        .unwrap_err();
    assert!(matches!(err, MessagingError::DuplicateRegistration { .. }));
}

#[test]
fn registrations_are_found_by_type_and_name() {
    let registry = counter_registry();

    let by_type = registry.registration::<Increment>().unwrap();
    assert_eq!(by_type.descriptor.name, "counter.increment");
    assert!(by_type.handler_type.ends_with("IncrementHandler"));

    let by_name = registry.registration_by_name("counter.get").unwrap();
    assert_eq!(by_name.descriptor, conqueror::MessageDescriptor::of::<GetCounter>());
    assert!(!by_name.descriptor.has_unit_response());

    assert!(registry.registration_by_name("counter.reset").is_none());

    let mut names: Vec<_> = registry
        .registrations()
        .map(|registration| registration.descriptor.name)
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["counter.get", "counter.increment"]);
}

#[test]
fn empty_registry_has_no_handlers() {
    let registry = HandlerRegistry::new();
    assert_eq!(registry.registrations().count(), 0);
    assert!(registry.registration::<Increment>().is_none());
}
