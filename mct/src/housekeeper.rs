//! The background housekeeper task.
//!
//! One per process, started by library init. Each tick, roughly every
//! 500 ms, it polls the daemon-to-library endpoint for control frames and
//! drains the overflow ring back onto the transport, reconnecting and
//! replaying registrations when the daemon went away in between. Producers
//! parked by the blocking backpressure policy are released here once the
//! ring is empty again.

use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use mct_core::control::{self, Frame};
use mct_core::{Id4, LogLevel, TraceStatus};

use crate::config::{HOUSEKEEPER_DELAY_MS, RECEIVE_BUFFER_SIZE};
use crate::user::{BlockMode, ConnectionState, USER};

/// Handle used by `free` to stop the task.
pub(crate) struct Handle {
    thread: JoinHandle<()>,
    shutdown: Sender<()>,
}

impl Handle {
    /// Signals the task and waits for it to exit.
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.thread.join();
    }
}

/// Spawns the housekeeper thread.
pub(crate) fn spawn() -> io::Result<Handle> {
    let (shutdown, signal) = bounded(1);
    let thread = std::thread::Builder::new()
        .name("mct-housekeeper".into())
        .spawn(move || Worker::new(signal).run())?;
    Ok(Handle { thread, shutdown })
}

struct Worker {
    shutdown: Receiver<()>,
    recv_buf: Vec<u8>,
}

impl Worker {
    fn new(shutdown: Receiver<()>) -> Worker {
        Worker {
            shutdown,
            recv_buf: Vec::with_capacity(RECEIVE_BUFFER_SIZE),
        }
    }

    fn run(mut self) {
        let poll_control = !USER.disable_injection_poll();
        loop {
            match self
                .shutdown
                .recv_timeout(Duration::from_millis(HOUSEKEEPER_DELAY_MS))
            {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
            if poll_control {
                self.poll_control();
            }
            self.flush_cycle();
        }
    }

    /// Reads and dispatches daemon-to-library control frames.
    fn poll_control(&mut self) {
        {
            let mut state = USER.state.lock();
            let Some(transport) = state.transport.as_mut() else {
                return;
            };
            match transport.try_recv(&mut self.recv_buf, RECEIVE_BUFFER_SIZE) {
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(%error, "control endpoint lost");
                    state.transport = None;
                    state.connection = ConnectionState::RetryConnect;
                    return;
                }
            }
        }

        loop {
            let Some(at) = control::find_user_header(&self.recv_buf) else {
                // keep a possible pattern prefix for the next read
                let keep = self.recv_buf.len().min(3);
                let cut = self.recv_buf.len() - keep;
                self.recv_buf.drain(..cut);
                return;
            };
            if at > 0 {
                tracing::debug!(skipped = at, "resynchronized control stream");
                self.recv_buf.drain(..at);
            }
            match Frame::parse(&self.recv_buf) {
                Ok(None) => return, // partial frame, wait for the next poll
                Ok(Some((frame, consumed))) => {
                    self.recv_buf.drain(..consumed);
                    self.handle_frame(frame);
                }
                Err(_) => {
                    self.recv_buf.drain(..1);
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::LogLevel(update) => self.apply_log_level(update),
            Frame::Injection(injection) => self.apply_injection(injection),
            Frame::LogState(state) => USER.store_log_state(state),
            Frame::SetBlockMode(mode) => self.apply_block_mode(mode),
            Frame::Unsupported(tag) => {
                tracing::warn!(tag, "invalid user message type received");
            }
            other => {
                tracing::debug!(?other, "ignoring unexpected control frame");
            }
        }
    }

    fn apply_log_level(&self, update: control::LogLevelUpdate) {
        let Some(level) = LogLevel::from_raw(update.log_level as i8) else {
            return;
        };
        let trace = TraceStatus::from_raw(update.trace_status as i8).unwrap_or(TraceStatus::Off);

        // fetch under the lock, call back outside of it
        let callback: Option<(crate::registry::LevelChangedCallback, Id4)> = {
            let mut state = USER.state.lock();
            if update.log_level_pos < 0
                || update.log_level_pos as usize >= state.registry.len()
            {
                // stale or forged position; dropped without effect
                tracing::debug!(pos = update.log_level_pos, "log level update out of range");
                return;
            }
            let Some(entry) = state.registry.entry_mut(update.log_level_pos as u32) else {
                return;
            };
            entry.cell.store(level, trace);
            entry
                .level_changed
                .clone()
                .map(|callback| (callback, entry.ctid))
        };

        if let Some((callback, ctid)) = callback {
            callback(ctid, level, trace);
        }
    }

    fn apply_injection(&self, injection: control::Injection) {
        if injection.payload.is_empty() || injection.log_level_pos < 0 {
            return;
        }
        let callback = {
            let state = USER.state.lock();
            state
                .registry
                .entry(injection.log_level_pos as u32)
                .and_then(|entry| {
                    entry
                        .injections
                        .iter()
                        .find(|(id, _)| *id == injection.service_id)
                        .map(|(_, callback)| callback.clone())
                })
        };
        if let Some(callback) = callback {
            callback(injection.service_id, &injection.payload);
        }
    }

    fn apply_block_mode(&self, mode: i8) {
        if USER.is_blocking_forced() {
            tracing::info!("forced block mode, ignoring daemon request");
            return;
        }
        let mode = match mode {
            0 => BlockMode::NonBlocking,
            1 => BlockMode::Blocking,
            _ => return,
        };
        // a producer may be parked mid-switch; take the flush mutex so the
        // mode and the wakeup are one step from its point of view
        let flush = USER.flush.lock();
        USER.set_block_mode(mode);
        USER.cond_free.notify_all();
        drop(flush);
    }

    /// Drains the ring onto the transport and releases blocked producers.
    fn flush_cycle(&self) {
        let mut flush = USER.flush.lock();
        let mut state = USER.state.lock();

        if state.ring.message_count() > 0 {
            if state.transport.is_none() {
                USER.reattach_locked(&mut state);
            }
            if state.transport.is_some() {
                let _ = USER.resend_locked(&mut state);
            }
        }

        if state.ring.message_count() == 0 && flush.buffer_full {
            flush.buffer_full = false;
            USER.cond_free.notify_all();
        }
    }
}
