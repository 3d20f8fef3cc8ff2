//! Shared harness for the daemon-facing integration tests.
//!
//! Each test file runs in its own process and points the library at a
//! Unix socket inside a fresh temporary directory, where a stub daemon
//! accepts the connection and records the control traffic.
#![allow(dead_code)]

use std::io::Read;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::{Duration, Instant};

use mct_core::control::{self, Frame};
use mct_core::message::WireMessage;

/// Points the library at `dir` and configures a small ring.
///
/// Must run before the first call into the library; the environment is
/// snapshotted at init.
pub fn route_library_to(dir: &Path) {
    std::env::set_var("MCT_IPC_PATH", dir);
}

/// Binds the stub daemon's listening socket inside `dir`.
pub fn bind_daemon(dir: &Path) -> UnixListener {
    let listener = UnixListener::bind(dir.join("mct")).expect("bind stub daemon socket");
    listener
        .set_nonblocking(true)
        .expect("nonblocking listener");
    listener
}

/// Everything the stub daemon can observe from the library.
#[derive(Debug)]
pub enum Event {
    Frame(Frame),
    Log(WireMessage),
}

/// One accepted library connection.
pub struct DaemonConn {
    stream: UnixStream,
    buf: Vec<u8>,
}

impl DaemonConn {
    /// Waits for the library to connect (it retries on housekeeper
    /// ticks, so this can take a few of them).
    pub fn accept(listener: &UnixListener, timeout: Duration) -> DaemonConn {
        let deadline = Instant::now() + timeout;
        loop {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream
                        .set_read_timeout(Some(Duration::from_millis(50)))
                        .expect("read timeout");
                    return DaemonConn {
                        stream,
                        buf: Vec::new(),
                    };
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                    assert!(
                        Instant::now() < deadline,
                        "library never connected to the stub daemon"
                    );
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(error) => panic!("accept failed: {error}"),
            }
        }
    }

    /// Sends a raw daemon-to-library control frame.
    pub fn send_frame(&mut self, frame: &Frame) {
        use std::io::Write;
        let mut bytes = Vec::new();
        frame.encode(&mut bytes);
        self.stream.write_all(&bytes).expect("send control frame");
    }

    /// Reads the next complete event, or `None` when `timeout` passes
    /// without one.
    pub fn next_event(&mut self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.try_parse() {
                return Some(event);
            }
            if Instant::now() >= deadline {
                return None;
            }
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => return None,
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(error)
                    if error.kind() == std::io::ErrorKind::WouldBlock
                        || error.kind() == std::io::ErrorKind::TimedOut => {}
                Err(error) => panic!("stub daemon read failed: {error}"),
            }
        }
    }

    /// Collects events until `timeout` elapses with no new event.
    pub fn drain_events(&mut self, timeout: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event(timeout) {
            events.push(event);
        }
        events
    }

    fn try_parse(&mut self) -> Option<Event> {
        let at = control::find_user_header(&self.buf)?;
        self.buf.drain(..at);
        match Frame::parse(&self.buf) {
            Ok(Some((Frame::Log, consumed))) => {
                match WireMessage::parse(&self.buf[consumed..], false) {
                    Ok(Some((message, used))) => {
                        self.buf.drain(..consumed + used);
                        Some(Event::Log(message))
                    }
                    Ok(None) => None,
                    Err(_) => {
                        self.buf.drain(..consumed);
                        None
                    }
                }
            }
            Ok(Some((frame, consumed))) => {
                self.buf.drain(..consumed);
                Some(Event::Frame(frame))
            }
            Ok(None) => None,
            Err(_) => {
                self.buf.drain(..1);
                None
            }
        }
    }
}

/// Extracts the decoded argument values of a verbose log message.
pub fn log_args(message: &WireMessage) -> Vec<mct_core::payload::Value> {
    mct_core::payload::parse_args(&message.payload, message.standard.is_msbf())
        .expect("parse log payload")
        .into_iter()
        .map(|arg| arg.value)
        .collect()
}
