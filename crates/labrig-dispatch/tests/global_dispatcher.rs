//! The process-wide dispatcher, driven from plain synchronous code.

use std::sync::Arc;

use labrig_dispatch::fakes::RecordingSink;
use labrig_dispatch::{global, DispatchError, DispatcherSettings, TelemetryEvent};

// One test: the global is shared by the whole test binary.
#[test]
fn test_global_lifecycle() {
    let event = || TelemetryEvent::new("Cart.java", "org.acme.Cart", "<init>");

    assert!(!global::is_initialised());
    assert!(!global::submit(event()), "submit before init is a no-op");
    assert!(global::stats().is_none());
    assert!(matches!(global::shutdown(), Err(DispatchError::NotInitialised)));

    let sink = Arc::new(RecordingSink::new());
    let settings = DispatcherSettings {
        flush_interval_ms: 60_000,
        batch_size: 2,
        ..DispatcherSettings::default()
    };
    global::init_with_sink(settings.clone(), sink.clone()).unwrap();
    assert!(global::is_initialised());
    assert!(matches!(
        global::init_with_sink(settings, sink.clone()),
        Err(DispatchError::AlreadyInitialised)
    ));

    let producers: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(move || (0..5).filter(|_| global::submit(event())).count()))
        .collect();
    let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
    assert_eq!(accepted, 20);

    global::shutdown().unwrap();
    assert_eq!(sink.events().len(), 20);
    assert!(sink.batches().iter().all(|b| b.len() <= 2));

    let stats = global::stats().unwrap();
    assert_eq!(stats.submitted, 20);
    assert_eq!(stats.events_delivered, 20);

    // Second shutdown is harmless.
    global::shutdown().unwrap();
}
