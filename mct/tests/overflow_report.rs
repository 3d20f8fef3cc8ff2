//! With the ring pinned at its maximum and no daemon, an oversized
//! message is dropped and counted; the count is reported to the daemon in
//! a single overflow frame once a connection exists.

mod support;

use std::time::Duration;

use mct_core::control::Frame;
use support::{DaemonConn, Event};

#[test]
fn dropped_messages_are_reported_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    support::route_library_to(dir.path());
    // a ring that cannot grow: registration fits, a large log does not
    std::env::set_var("MCT_USER_BUFFER_MIN", "256");
    std::env::set_var("MCT_USER_BUFFER_MAX", "256");
    std::env::set_var("MCT_USER_BUFFER_STEP", "256");

    mct::register_app("OVFL", "overflow test").expect("register app");
    let ctx = mct::register_context("MAIN", "main context").expect("register context");

    let oversized = "x".repeat(400);
    let result = mct::message!(ctx, mct::LogLevel::Info, oversized.as_str());
    assert_eq!(result, Err(mct::Error::BufferFull));

    // the daemon appears; the housekeeper reconnects and drains, and the
    // next accepted log triggers the overflow report
    let listener = support::bind_daemon(dir.path());
    let mut daemon = DaemonConn::accept(&listener, Duration::from_secs(10));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(
            std::time::Instant::now() < deadline,
            "ring never drained after reconnect"
        );
        let (_, used) = mct::buffer_fill();
        if used == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    mct::message!(ctx, mct::LogLevel::Info, 1u32).expect("log after reconnect");

    let mut overflow_reports = Vec::new();
    let mut logs = 0;
    for event in daemon.drain_events(Duration::from_secs(2)) {
        match event {
            Event::Frame(Frame::Overflow(body)) => {
                assert_eq!(body.apid, mct::Id4::new("OVFL"));
                overflow_reports.push(body.overflow_counter);
            }
            Event::Log(_) => logs += 1,
            Event::Frame(_) => {}
        }
    }
    assert_eq!(overflow_reports, vec![1], "one report for the one drop");
    assert_eq!(logs, 1);

    // the counter was cleared by the report; no further report follows
    mct::message!(ctx, mct::LogLevel::Info, 2u32).expect("second log");
    for event in daemon.drain_events(Duration::from_secs(1)) {
        if let Event::Frame(Frame::Overflow(_)) = event {
            panic!("overflow counter must clear after the report");
        }
    }
}
