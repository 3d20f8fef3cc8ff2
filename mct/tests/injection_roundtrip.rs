//! A daemon-sent injection frame invokes the registered callback exactly
//! once, with the addressed service id and payload.

mod support;

use std::sync::mpsc;
use std::time::Duration;

use mct_core::control::{Frame, Injection};
use support::{DaemonConn, Event};

#[test]
fn injection_reaches_the_callback() {
    let dir = tempfile::tempdir().expect("tempdir");
    support::route_library_to(dir.path());
    let listener = support::bind_daemon(dir.path());

    mct::register_app("INJA", "injection test").expect("register app");
    let ctx = mct::register_context("TS1", "test context").expect("register context");

    let mut daemon = DaemonConn::accept(&listener, Duration::from_secs(10));

    // learn the context's registry position from its registration frame
    let pos = loop {
        match daemon.next_event(Duration::from_secs(5)) {
            Some(Event::Frame(Frame::RegisterContext(body)))
                if body.ctid == mct::Id4::new("TS1") =>
            {
                break body.log_level_pos;
            }
            Some(_) => continue,
            None => panic!("context registration never arrived"),
        }
    };

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    ctx.register_injection_callback(0x1000, move |service_id, payload| {
        let sender = tx.lock().expect("sender mutex");
        sender
            .send((service_id, payload.to_vec()))
            .expect("report call");
    })
    .expect("register injection callback");

    daemon.send_frame(&Frame::Injection(Injection {
        log_level_pos: pos,
        service_id: 0x1000,
        payload: b"PING".to_vec(),
    }));

    let (service_id, payload) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback invoked");
    assert_eq!(service_id, 0x1000);
    assert_eq!(payload, b"PING");

    // exactly once
    assert!(rx.recv_timeout(Duration::from_millis(1200)).is_err());

    // the log-state indicator is delivered the same way
    assert_eq!(mct::log_state(), -1);
    daemon.send_frame(&Frame::LogState(1));
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while mct::log_state() != 1 {
        assert!(std::time::Instant::now() < deadline, "log state never updated");
        std::thread::sleep(Duration::from_millis(50));
    }
}
