//! A daemon log-level frame narrows the context's effective level: lower
//! priority messages are dropped on the fast path without producing wire
//! bytes, and the level-changed callback fires once.

mod support;

use std::sync::mpsc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mct_core::control::{Frame, LogLevelUpdate};
use mct_core::payload::Value;
use support::{DaemonConn, Event};

#[test]
fn daemon_narrows_the_level() {
    let dir = tempfile::tempdir().expect("tempdir");
    support::route_library_to(dir.path());
    let listener = support::bind_daemon(dir.path());

    mct::register_app("LVLT", "level update test").expect("register app");

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let ctx = mct::register_context_with_callback("CHNG", "level test context", move |ctid, level, trace| {
        let sender = tx.lock().expect("sender mutex");
        sender.send((ctid, level, trace)).expect("report change");
    })
    .expect("register context");

    let mut daemon = DaemonConn::accept(&listener, Duration::from_secs(10));
    let pos = loop {
        match daemon.next_event(Duration::from_secs(5)) {
            Some(Event::Frame(Frame::RegisterContext(body)))
                if body.ctid == mct::Id4::new("CHNG") =>
            {
                break body.log_level_pos;
            }
            Some(_) => continue,
            None => panic!("context registration never arrived"),
        }
    };

    // info passes the initial threshold
    assert!(ctx.log(mct::LogLevel::Info).is_some());

    daemon.send_frame(&Frame::LogLevel(LogLevelUpdate {
        log_level: mct::LogLevel::Warn.as_raw() as u8,
        trace_status: mct::TraceStatus::Off.as_raw() as u8,
        log_level_pos: pos,
    }));

    // the housekeeper applies the update on its next poll
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctx.log(mct::LogLevel::Info).is_some() {
        assert!(Instant::now() < deadline, "level update never took effect");
        std::thread::sleep(Duration::from_millis(50));
    }

    let (ctid, level, trace) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback invoked");
    assert_eq!(ctid, mct::Id4::new("CHNG"));
    assert_eq!(level, mct::LogLevel::Warn);
    assert_eq!(trace, mct::TraceStatus::Off);
    assert!(
        rx.recv_timeout(Duration::from_millis(500)).is_err(),
        "callback must fire exactly once"
    );

    // a filtered log produces no wire traffic at all
    mct::message!(ctx, mct::LogLevel::Info, 5i32).expect("filtered log returns ok");
    // a warn still flows
    mct::message!(ctx, mct::LogLevel::Warn, 17i32).expect("warn passes");

    let mut warn_seen = false;
    for event in daemon.drain_events(Duration::from_secs(2)) {
        if let Event::Log(message) = event {
            let extended = message.extended.as_ref().expect("extended header");
            assert_eq!(
                extended.log_level(),
                Some(mct::LogLevel::Warn),
                "the filtered info log must not reach the daemon"
            );
            assert_eq!(support::log_args(&message), vec![Value::Signed(17)]);
            warn_seen = true;
        }
    }
    assert!(warn_seen);
}
