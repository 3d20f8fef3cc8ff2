//! With `MCT_FORCE_BLOCKING`, a producer that fills the pinned ring waits
//! on the drain signal instead of dropping, and resumes once the
//! housekeeper has flushed the ring to the daemon.

mod support;

use std::sync::mpsc;
use std::time::Duration;

use support::{DaemonConn, Event};

#[test]
fn producer_blocks_until_the_ring_drains() {
    let dir = tempfile::tempdir().expect("tempdir");
    support::route_library_to(dir.path());
    std::env::set_var("MCT_FORCE_BLOCKING", "1");
    // pinned ring: blocking engages as soon as a message cannot be
    // guaranteed to fit below the maximum
    std::env::set_var("MCT_USER_BUFFER_MIN", "512");
    std::env::set_var("MCT_USER_BUFFER_MAX", "512");
    std::env::set_var("MCT_USER_BUFFER_STEP", "512");

    mct::register_app("BLCK", "blocking test").expect("register app");
    let ctx = mct::register_context("MAIN", "main context").expect("register context");

    let (done_tx, done_rx) = mpsc::channel();
    let producer = std::thread::spawn(move || {
        let result = mct::message!(ctx, mct::LogLevel::Info, 7u32);
        done_tx.send(result).expect("report completion");
    });

    // no daemon: the producer must park, not drop
    assert!(
        done_rx.recv_timeout(Duration::from_millis(1500)).is_err(),
        "producer should be blocked while the ring cannot drain"
    );

    let listener = support::bind_daemon(dir.path());
    let mut daemon = DaemonConn::accept(&listener, Duration::from_secs(10));

    let result = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("producer unblocked after the drain");
    assert!(result.is_ok(), "unblocked log completes: {:?}", result);
    producer.join().expect("producer thread");

    // the staged message eventually reaches the daemon
    let mut saw_log = false;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline && !saw_log {
        for event in daemon.drain_events(Duration::from_millis(500)) {
            if let Event::Log(message) = event {
                assert_eq!(
                    support::log_args(&message),
                    vec![mct_core::payload::Value::Unsigned(7)]
                );
                saw_log = true;
            }
        }
    }
    assert!(saw_log);
}
