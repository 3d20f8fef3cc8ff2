//! The process-wide library handle.
//!
//! The handle owns every process-wide piece of the pipeline: the context
//! registry, the overflow ring, the daemon connection, the block-mode
//! policy, and the housekeeper task. It is created lazily on
//! first use and survives until process exit; `free` tears the pipeline
//! down but leaves the handle reusable for a later re-init.
//!
//! Lock order is `flush` before `state`, everywhere. User callbacks run
//! with no lock held.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::Once;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use mct_core::control::{self, Frame, FrameType};
use mct_core::header::{
    htyp, pack_msin, HeaderExtra, MessageType, StandardHeader, StorageHeader,
};
use mct_core::message::WireMessage;
use mct_core::payload::parse_args;
use mct_core::ring::{Ring, BLOCK_HEAD_SIZE};
use mct_core::{Id4, LogLevel, TraceStatus};

use crate::config::{self, Config, LocalPrintMode};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::housekeeper;
use crate::registry::{InjectionCallback, LevelChangedCallback, Registry};
use crate::transport::{SendError, Transport};

/// The one handle of this process.
pub(crate) static USER: Lazy<MctUser> = Lazy::new(MctUser::new);

static IS_CHILD: AtomicBool = AtomicBool::new(false);
static HOOKS: Once = Once::new();

/// Returns `true` in a process forked from a logging process.
///
/// The child inherits neither the housekeeper nor a usable transport, so
/// the whole API degrades to [`Error::LoggingDisabled`] there until the
/// application re-initializes on its own terms.
pub(crate) fn is_child() -> bool {
    IS_CHILD.load(Ordering::Relaxed)
}

extern "C" fn fork_child_latch() {
    IS_CHILD.store(true, Ordering::Relaxed);
}

extern "C" fn atexit_hook() {
    USER.at_exit();
}

/// Monotonic uptime in units of 0.1 ms, the `tmsp` clock.
pub(crate) fn uptime_01ms() -> u32 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: plain syscall writing into the local struct.
    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) } == 0 {
        (ts.tv_sec as u32).wrapping_mul(10_000) + (ts.tv_nsec as u32) / 100_000
    } else {
        0
    }
}

/// Backpressure policy between producers and the housekeeper.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum BlockMode {
    /// Drop and count when the ring cannot take a message.
    NonBlocking = 0,
    /// Wait on the drain signal instead.
    Blocking = 1,
}

/// Library-to-daemon connection state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Disconnected,
    RetryConnect,
    Connected,
}

/// Where finalized messages go.
pub(crate) enum Output {
    /// The daemon IPC endpoint, with the ring as fallback.
    Daemon,
    /// A local file of storage-headered messages.
    File {
        file: std::fs::File,
        size_max: Option<u64>,
        limit_reached: bool,
    },
}

pub(crate) struct UserState {
    pub(crate) config: Config,
    pub(crate) app_id: Id4,
    pub(crate) app_description: String,
    pub(crate) ecu_id: Id4,
    pub(crate) registry: Registry,
    pub(crate) ring: Ring,
    pub(crate) transport: Option<Transport>,
    pub(crate) connection: ConnectionState,
    pub(crate) overflow_counter: u32,
    pub(crate) output: Output,
    pub(crate) resend_buf: Vec<u8>,
    pub(crate) initialized: bool,
}

pub(crate) struct FlushState {
    /// Set by a producer that hit a full ring in blocking mode; cleared by
    /// the housekeeper when the ring drains.
    pub(crate) buffer_full: bool,
}

pub(crate) struct MctUser {
    pub(crate) state: Mutex<UserState>,
    pub(crate) flush: Mutex<FlushState>,
    pub(crate) cond_free: Condvar,
    initialized: AtomicBool,
    verbose: AtomicBool,
    log_buf_len: AtomicU16,
    block_mode: AtomicU8,
    force_blocking: AtomicBool,
    log_state: AtomicI8,
    with_ecu_id: AtomicBool,
    with_session_id: AtomicBool,
    with_timestamp: AtomicBool,
    serial_header: AtomicBool,
    local_print_enabled: AtomicBool,
    atexit_timeout_ms: AtomicU32,
    housekeeper: Mutex<Option<housekeeper::Handle>>,
}

impl MctUser {
    fn new() -> MctUser {
        MctUser {
            state: Mutex::new(UserState {
                config: Config::default(),
                app_id: Id4::EMPTY,
                app_description: String::new(),
                ecu_id: Id4::new(config::DEFAULT_ECU_ID),
                registry: Registry::new(),
                // replaced at init; a minimal placeholder keeps the type
                // simple
                ring: Ring::fixed(64).unwrap_or_else(|_| unreachable!()),
                transport: None,
                connection: ConnectionState::Disconnected,
                overflow_counter: 0,
                output: Output::Daemon,
                resend_buf: Vec::new(),
                initialized: false,
            }),
            flush: Mutex::new(FlushState { buffer_full: false }),
            cond_free: Condvar::new(),
            initialized: AtomicBool::new(false),
            verbose: AtomicBool::new(true),
            log_buf_len: AtomicU16::new(config::DEFAULT_LOG_BUF_LEN),
            block_mode: AtomicU8::new(BlockMode::NonBlocking as u8),
            force_blocking: AtomicBool::new(false),
            log_state: AtomicI8::new(-1),
            with_ecu_id: AtomicBool::new(true),
            with_session_id: AtomicBool::new(true),
            with_timestamp: AtomicBool::new(true),
            serial_header: AtomicBool::new(false),
            local_print_enabled: AtomicBool::new(false),
            atexit_timeout_ms: AtomicU32::new(0),
            housekeeper: Mutex::new(None),
        }
    }

    // ==== fast-path accessors ====

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub(crate) fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub(crate) fn log_buf_len(&self) -> u16 {
        self.log_buf_len.load(Ordering::Relaxed)
    }

    pub(crate) fn block_mode(&self) -> BlockMode {
        if self.block_mode.load(Ordering::Relaxed) == BlockMode::Blocking as u8 {
            BlockMode::Blocking
        } else {
            BlockMode::NonBlocking
        }
    }

    pub(crate) fn set_block_mode(&self, mode: BlockMode) {
        self.block_mode.store(mode as u8, Ordering::Relaxed);
    }

    pub(crate) fn is_blocking_forced(&self) -> bool {
        self.force_blocking.load(Ordering::Relaxed)
    }

    pub(crate) fn log_state(&self) -> i8 {
        self.log_state.load(Ordering::Relaxed)
    }

    pub(crate) fn store_log_state(&self, state: i8) {
        self.log_state.store(state, Ordering::Relaxed);
    }

    pub(crate) fn set_with_ecu_id(&self, enabled: bool) {
        self.with_ecu_id.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_with_session_id(&self, enabled: bool) {
        self.with_session_id.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_with_timestamp(&self, enabled: bool) {
        self.with_timestamp.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_serial_header(&self, enabled: bool) {
        self.serial_header.store(enabled, Ordering::Relaxed);
    }

    fn serial_header(&self) -> bool {
        self.serial_header.load(Ordering::Relaxed)
    }

    pub(crate) fn set_local_print(&self, enabled: bool) {
        self.local_print_enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_atexit_timeout(&self, milliseconds: u32) {
        self.atexit_timeout_ms.store(milliseconds, Ordering::Relaxed);
    }

    pub(crate) fn disable_injection_poll(&self) -> bool {
        // captured at init; immutable afterwards
        self.state.lock().config.disable_injection_poll
    }

    // ==== lifecycle ====

    /// Initializes the library on first use.
    pub(crate) fn ensure_init(&self) -> Result<()> {
        if is_child() {
            return Err(Error::LoggingDisabled);
        }
        if self.is_initialized() {
            return Ok(());
        }
        self.init_with(None, None)
    }

    /// Initializes with an optional file output and size cap.
    pub(crate) fn init_with(
        &self,
        file: Option<std::fs::File>,
        size_max: Option<u64>,
    ) -> Result<()> {
        if is_child() {
            return Err(Error::LoggingDisabled);
        }
        let mut state = self.state.lock();
        if state.initialized {
            return Ok(());
        }

        let config = Config::from_env();
        crate::diag::init(&config);

        state.ring = Ring::dynamic(config.buffer_min, config.buffer_max, config.buffer_step)
            .map_err(|_| Error::WrongParameter)?;
        state.ecu_id = Id4::new(config::DEFAULT_ECU_ID);
        state.resend_buf = vec![0; config.log_buf_len as usize + 64];
        state.overflow_counter = 0;

        self.log_buf_len.store(config.log_buf_len, Ordering::Relaxed);
        if config.force_blocking {
            self.set_block_mode(BlockMode::Blocking);
            self.force_blocking.store(true, Ordering::Relaxed);
        }
        self.set_local_print(config.local_print_mode == LocalPrintMode::ForceOn);

        match file {
            Some(file) => {
                state.output = Output::File {
                    file,
                    size_max,
                    limit_reached: false,
                };
                state.transport = None;
                state.connection = ConnectionState::Disconnected;
            }
            None => {
                state.output = Output::Daemon;
                match Transport::connect(&config) {
                    Ok(transport) => {
                        state.transport = Some(transport);
                        state.connection = ConnectionState::Connected;
                    }
                    Err(error) => {
                        tracing::info!(%error, "daemon endpoint not reachable, retrying later");
                        state.transport = None;
                        state.connection = ConnectionState::RetryConnect;
                    }
                }
            }
        }

        state.config = config;
        state.initialized = true;
        drop(state);

        HOOKS.call_once(|| {
            // SAFETY: registering handlers with no preconditions; the
            // handlers only touch atomics and the static handle.
            unsafe {
                libc::pthread_atfork(None, None, Some(fork_child_latch));
                libc::atexit(atexit_hook);
            }
        });

        let mut housekeeper = self.housekeeper.lock();
        if housekeeper.is_none() {
            match housekeeper::spawn() {
                Ok(handle) => *housekeeper = Some(handle),
                Err(error) => {
                    tracing::error!(%error, "failed to spawn the housekeeper task");
                    drop(housekeeper);
                    self.teardown();
                    return Err(Error::Other);
                }
            }
        }
        drop(housekeeper);

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops the housekeeper and releases transport and registry.
    pub(crate) fn teardown(&self) {
        self.initialized.store(false, Ordering::Release);

        if let Some(handle) = self.housekeeper.lock().take() {
            handle.stop();
        }

        // release any producer still parked in blocking mode
        {
            let mut flush = self.flush.lock();
            flush.buffer_full = false;
            self.cond_free.notify_all();
        }

        let mut state = self.state.lock();
        state.transport = None;
        state.connection = ConnectionState::Disconnected;
        state.registry.clear();
        state.app_id = Id4::EMPTY;
        state.app_description.clear();
        state.output = Output::Daemon;
        state.initialized = false;
    }

    /// The at-exit path: bounded drain, remaining-count report, teardown.
    pub(crate) fn at_exit(&self) {
        if is_child() || !self.is_initialized() {
            return;
        }

        let remaining = self.drain_for(Duration::from_millis(
            self.atexit_timeout_ms.load(Ordering::Relaxed) as u64,
        ));
        if remaining > 0 {
            tracing::warn!(remaining, "lost log messages in user buffer when exiting");
        }

        let _ = self.unregister_app(false);
        self.teardown();
    }

    /// Redrives the drain loop until the ring empties or `timeout`
    /// passes. Returns the number of messages left behind.
    pub(crate) fn drain_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock();
                if !matches!(state.output, Output::Daemon) {
                    return 0;
                }
                if state.ring.message_count() == 0 {
                    return 0;
                }
                if state.transport.is_none() {
                    self.reattach_locked(&mut state);
                    if state.transport.is_some() {
                        self.report_overflow_locked(&mut state);
                    }
                }
                if state.transport.is_some() {
                    let _ = self.resend_locked(&mut state);
                    if state.ring.message_count() == 0 {
                        return 0;
                    }
                }
                if Instant::now() >= deadline {
                    return state.ring.message_count();
                }
            }
            std::thread::sleep(Duration::from_millis(config::ATEXIT_DRAIN_SLEEP_MS));
        }
    }

    // ==== registration ====

    pub(crate) fn register_app(&self, apid: &str, description: &str) -> Result<()> {
        self.ensure_init()?;
        if apid.is_empty() {
            return Err(Error::WrongParameter);
        }

        let mut state = self.state.lock();
        let apid = state
            .config
            .app_id_override
            .unwrap_or_else(|| Id4::new(apid));
        if !state.app_id.is_empty() {
            // re-registration with the same id refreshes, anything else is
            // a caller bug
            return if state.app_id == apid {
                Ok(())
            } else {
                Err(Error::WrongParameter)
            };
        }
        state.app_id = apid;
        state.app_description = description.to_owned();

        let frame = Frame::RegisterApp(control::RegisterApp {
            apid,
            pid: std::process::id() as i32,
            description: description.to_owned(),
        });
        self.send_control_locked(&mut state, &frame)
    }

    pub(crate) fn unregister_app(&self, flush_buffered: bool) -> Result<()> {
        if is_child() {
            return Err(Error::LoggingDisabled);
        }
        if !self.is_initialized() {
            return Err(Error::LoggingDisabled);
        }

        if flush_buffered {
            let timeout = self.atexit_timeout_ms.load(Ordering::Relaxed);
            self.drain_for(Duration::from_millis(timeout as u64));
        }

        let mut state = self.state.lock();
        if state.app_id.is_empty() {
            return Err(Error::WrongParameter);
        }
        let frame = Frame::UnregisterApp(control::UnregisterApp {
            apid: state.app_id,
            pid: std::process::id() as i32,
        });
        let result = self.send_control_locked(&mut state, &frame);
        state.app_id = Id4::EMPTY;
        state.app_description.clear();
        state.registry.clear();
        result
    }

    pub(crate) fn register_context(
        &self,
        ctid: &str,
        description: &str,
        level: Option<LogLevel>,
        trace: Option<TraceStatus>,
        level_changed: Option<LevelChangedCallback>,
    ) -> Result<Context> {
        self.ensure_init()?;
        if ctid.is_empty() {
            return Err(Error::WrongParameter);
        }

        let mut state = self.state.lock();
        if state.app_id.is_empty() {
            return Err(Error::WrongParameter);
        }
        let apid = state.app_id;
        let ctid = Id4::new(ctid);

        // priority: environment override, then the caller's value, then
        // the library default
        let env_level = state.config.initial_level_for(apid, ctid);
        let effective_level = env_level
            .or(level)
            .unwrap_or(config::INITIAL_LOG_LEVEL);
        let effective_trace = trace.unwrap_or(config::INITIAL_TRACE_STATUS);

        let (pos, cell) = state.registry.allocate(
            ctid,
            description.to_owned(),
            effective_level,
            effective_trace,
        );
        if let Some(callback) = level_changed {
            if let Some(entry) = state.registry.entry_mut(pos) {
                entry.level_changed = Some(callback);
            }
        }

        // the frame reports what was requested, not the resolved default;
        // the daemon substitutes its own default for "not set"
        let frame = Frame::RegisterContext(control::RegisterContext {
            apid,
            ctid,
            log_level_pos: pos as i32,
            log_level: env_level.or(level).map_or(-1, LogLevel::as_raw),
            trace_status: trace.map_or(-1, TraceStatus::as_raw),
            pid: std::process::id() as i32,
            description: description.to_owned(),
        });
        self.send_control_locked(&mut state, &frame)?;

        Ok(Context {
            ctid,
            pos,
            cell,
            mcnt: std::sync::atomic::AtomicU8::new(0),
        })
    }

    pub(crate) fn unregister_context(&self, context: Context) -> Result<()> {
        if is_child() || !self.is_initialized() {
            return Err(Error::LoggingDisabled);
        }
        let mut state = self.state.lock();
        let frame = Frame::UnregisterContext(control::UnregisterContext {
            apid: state.app_id,
            ctid: context.ctid,
            pid: std::process::id() as i32,
        });
        state.registry.release(context.pos);
        self.send_control_locked(&mut state, &frame)
    }

    pub(crate) fn register_injection(
        &self,
        pos: u32,
        service_id: u32,
        callback: InjectionCallback,
    ) -> Result<()> {
        if is_child() || !self.is_initialized() {
            return Err(Error::LoggingDisabled);
        }
        let mut state = self.state.lock();
        let entry = state.registry.entry_mut(pos).ok_or(Error::WrongParameter)?;
        match entry.injections.iter_mut().find(|(id, _)| *id == service_id) {
            Some((_, slot)) => *slot = callback,
            None => entry.injections.push((service_id, callback)),
        }
        Ok(())
    }

    pub(crate) fn set_app_defaults(&self, level: LogLevel, trace: TraceStatus) -> Result<()> {
        self.ensure_init()?;
        let mut state = self.state.lock();
        if state.app_id.is_empty() {
            return Err(Error::WrongParameter);
        }
        let frame = Frame::AppDefaults(control::AppDefaults {
            apid: state.app_id,
            log_level: level.as_raw() as u8,
            trace_status: trace.as_raw() as u8,
        });
        self.send_control_locked(&mut state, &frame)
    }

    pub(crate) fn send_marker(&self) -> Result<()> {
        self.ensure_init()?;
        let mut state = self.state.lock();
        self.send_control_locked(&mut state, &Frame::Marker)
    }

    pub(crate) fn set_filesize_max(&self, limit: u64) -> Result<()> {
        let mut state = self.state.lock();
        match &mut state.output {
            Output::File {
                size_max,
                limit_reached,
                ..
            } => {
                *size_max = Some(limit);
                *limit_reached = false;
                Ok(())
            }
            Output::Daemon => Err(Error::WrongParameter),
        }
    }

    /// Total and used bytes of the overflow ring.
    pub(crate) fn buffer_fill(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.ring.total_size(), state.ring.used_size())
    }

    // ==== send paths ====

    /// Sends a control frame, staging it in the ring on failure.
    pub(crate) fn send_control_locked(
        &self,
        state: &mut UserState,
        frame: &Frame,
    ) -> Result<()> {
        if !matches!(state.output, Output::Daemon) {
            // file mode has no daemon to talk to
            return Ok(());
        }
        let mut bytes = Vec::new();
        frame.encode(&mut bytes);

        let serial = self.serial_header();
        if let Some(transport) = state.transport.as_mut() {
            match transport.send(&[&bytes], serial) {
                Ok(()) => return Ok(()),
                Err(SendError::Broken) => {
                    state.transport = None;
                    state.connection = ConnectionState::RetryConnect;
                }
                Err(_) => {}
            }
        }
        self.stage_locked(state, &bytes, &[], &[])
    }

    /// Pushes a message into the ring, counting a drop on failure.
    fn stage_locked(
        &self,
        state: &mut UserState,
        part1: &[u8],
        part2: &[u8],
        part3: &[u8],
    ) -> Result<()> {
        match state.ring.push3(part1, part2, part3) {
            Ok(()) => Ok(()),
            Err(_) => {
                if state.overflow_counter == 0 {
                    tracing::warn!("buffer full, messages will be discarded");
                }
                state.overflow_counter += 1;
                Err(Error::BufferFull)
            }
        }
    }

    /// Reports and clears the overflow counter; keeps it on failure.
    fn report_overflow_locked(&self, state: &mut UserState) {
        if state.overflow_counter == 0 || state.app_id.is_empty() {
            return;
        }
        let frame = Frame::Overflow(control::Overflow {
            overflow_counter: state.overflow_counter,
            apid: state.app_id,
        });
        let mut bytes = Vec::new();
        frame.encode(&mut bytes);
        let serial = self.serial_header();
        if let Some(transport) = state.transport.as_mut() {
            if transport.send(&[&bytes], serial).is_ok() {
                tracing::warn!(
                    discarded = state.overflow_counter,
                    "messages discarded since last report"
                );
                state.overflow_counter = 0;
            }
        }
    }

    /// Replays the ring head-first until empty or the first send failure.
    pub(crate) fn resend_locked(&self, state: &mut UserState) -> Result<()> {
        let serial = self.serial_header();
        loop {
            let UserState {
                ring,
                resend_buf,
                transport,
                connection,
                ..
            } = state;
            let Some(transport_ref) = transport.as_mut() else {
                return Err(Error::PipeError);
            };

            let size = match ring.peek_size() {
                Ok(Some(size)) => size,
                Ok(None) => return Ok(()),
                Err(_) => {
                    tracing::error!("overflow ring corrupted, content dropped");
                    return Err(Error::Other);
                }
            };
            if resend_buf.len() < size {
                resend_buf.resize(size, 0);
            }
            match ring.copy(&mut resend_buf[..size]) {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(()),
                Err(_) => {
                    tracing::error!("overflow ring corrupted, content dropped");
                    return Err(Error::Other);
                }
            }

            match transport_ref.send(&[&resend_buf[..size]], serial) {
                Ok(()) => {
                    let _ = ring.remove();
                }
                Err(SendError::Full) => return Err(Error::PipeFull),
                Err(SendError::Broken) => {
                    *transport = None;
                    *connection = ConnectionState::RetryConnect;
                    return Err(Error::PipeError);
                }
                Err(SendError::Other) => return Err(Error::Other),
            }
        }
    }

    /// Reconnects and replays the registration sequence.
    pub(crate) fn reattach_locked(&self, state: &mut UserState) {
        if state.transport.is_some() {
            return;
        }
        match Transport::connect(&state.config) {
            Ok(transport) => {
                state.transport = Some(transport);
                state.connection = ConnectionState::Connected;
                tracing::info!("logging re-enabled");
            }
            Err(error) => {
                if state.connection != ConnectionState::RetryConnect {
                    tracing::info!(%error, "daemon endpoint not reachable, retrying later");
                    state.connection = ConnectionState::RetryConnect;
                }
                return;
            }
        }

        if state.app_id.is_empty() {
            return;
        }

        let app_frame = Frame::RegisterApp(control::RegisterApp {
            apid: state.app_id,
            pid: std::process::id() as i32,
            description: state.app_description.clone(),
        });
        let _ = self.send_control_locked(state, &app_frame);

        let contexts: Vec<(u32, Id4, String)> = state
            .registry
            .iter_active()
            .map(|(pos, entry)| (pos, entry.ctid, entry.description.clone()))
            .collect();
        for (pos, ctid, description) in contexts {
            let frame = Frame::RegisterContext(control::RegisterContext {
                apid: state.app_id,
                ctid,
                log_level_pos: pos as i32,
                log_level: -1,
                trace_status: -1,
                pid: std::process::id() as i32,
                description,
            });
            let _ = self.send_control_locked(state, &frame);
        }
    }

    /// Assembles the headers for a finished message and dispatches it.
    pub(crate) fn finish_message(
        &self,
        context: &Context,
        level: LogLevel,
        payload: &[u8],
        noar: u8,
        verbose: bool,
    ) -> Result<()> {
        if is_child() {
            return Err(Error::LoggingDisabled);
        }
        if !self.is_initialized() {
            return Err(Error::LoggingDisabled);
        }

        let mut state = self.state.lock();
        let is_file = matches!(state.output, Output::File { .. });

        let mut htyp_byte = htyp::PROTOCOL_VERSION1;
        if self.with_ecu_id.load(Ordering::Relaxed) {
            htyp_byte |= htyp::WEID;
        }
        if self.with_session_id.load(Ordering::Relaxed) {
            htyp_byte |= htyp::WSID;
        }
        if self.with_timestamp.load(Ordering::Relaxed) {
            htyp_byte |= htyp::WTMS;
        }
        if verbose || state.config.extended_header_for_nonverbose {
            htyp_byte |= htyp::UEH;
        }
        if cfg!(target_endian = "big") {
            htyp_byte |= htyp::MSBF;
        }

        let mut headers = Vec::with_capacity(32);
        StandardHeader {
            htyp: htyp_byte,
            mcnt: context.next_mcnt(),
            len: 0,
        }
        .write_to(&mut headers);
        HeaderExtra {
            ecu: Some(state.ecu_id),
            session_id: Some(std::process::id()),
            timestamp: Some(uptime_01ms()),
        }
        .write_to(&mut headers, htyp_byte)
        .map_err(|_| Error::Other)?;
        if htyp_byte & htyp::UEH != 0 {
            mct_core::header::ExtendedHeader {
                msin: pack_msin(MessageType::Log, level.as_raw() as u8, verbose),
                noar,
                apid: state.app_id,
                ctid: context.ctid,
            }
            .write_to(&mut headers);
        }

        let total = headers.len() + payload.len();
        if total > u16::MAX as usize {
            tracing::warn!(size = total, "huge message discarded");
            return Err(Error::Other);
        }
        headers[2..4].copy_from_slice(&(total as u16).to_be_bytes());

        let print_always = match state.config.local_print_mode {
            LocalPrintMode::ForceOn => true,
            LocalPrintMode::ForceOff | LocalPrintMode::Automatic => false,
            LocalPrintMode::Unset => self.local_print_enabled.load(Ordering::Relaxed),
        };
        if print_always && !is_file {
            self.local_print(&headers, payload, verbose);
        }

        if is_file {
            return Self::write_to_file(&mut state, &headers, payload);
        }
        drop(state);
        self.dispatch(&headers, payload, verbose)
    }

    fn local_print(&self, headers: &[u8], payload: &[u8], verbose: bool) {
        let mut bytes = Vec::with_capacity(headers.len() + payload.len());
        bytes.extend_from_slice(headers);
        bytes.extend_from_slice(payload);
        let Ok(Some((message, _))) = WireMessage::parse(&bytes, false) else {
            return;
        };

        let mut line = String::new();
        if let Some(timestamp) = message.extra.timestamp {
            line.push_str(&format!("{}.{:04} ", timestamp / 10_000, timestamp % 10_000));
        }
        if let Some(extended) = &message.extended {
            let level = extended.log_level().unwrap_or(LogLevel::Off);
            line.push_str(&format!("{} {} [{}] ", extended.apid, extended.ctid, level));
        }
        if verbose {
            if let Ok(args) = parse_args(&message.payload, message.standard.is_msbf()) {
                for arg in args {
                    line.push_str(&format!("{:?} ", arg.value));
                }
            }
        } else {
            for byte in &message.payload {
                line.push_str(&format!("{:02x} ", byte));
            }
        }
        let stdout = std::io::stdout();
        let mut stdout = stdout.lock();
        let _ = writeln!(stdout, "{}", line.trim_end());
    }

    fn write_to_file(state: &mut UserState, headers: &[u8], payload: &[u8]) -> Result<()> {
        let ecu = state.ecu_id;
        let Output::File {
            file,
            size_max,
            limit_reached,
        } = &mut state.output
        else {
            return Err(Error::Other);
        };
        if *limit_reached {
            return Err(Error::FileSize);
        }

        let mut storage = Vec::with_capacity(16);
        StorageHeader::now(ecu).write_to(&mut storage);
        let total = (storage.len() + headers.len() + payload.len()) as u64;

        if let Some(max) = *size_max {
            let current = file.metadata().map(|m| m.len()).unwrap_or(0);
            if current + total > max {
                *limit_reached = true;
                tracing::error!(
                    current,
                    limit = max,
                    "file size reached the configured maximum"
                );
                return Err(Error::FileSize);
            }
        }

        file.write_all(&storage)
            .and_then(|_| file.write_all(headers))
            .and_then(|_| file.write_all(payload))
            .map_err(|_| Error::Other)
    }

    /// The daemon dispatch path: report overflow, replay the ring, send
    /// directly, fall back to the ring under the block-mode policy.
    fn dispatch(&self, headers: &[u8], payload: &[u8], verbose: bool) -> Result<()> {
        let user_header = control::user_header(FrameType::Log);
        let serial = self.serial_header();

        let mut state = self.state.lock();

        self.report_overflow_locked(&mut state);

        let mut pending_clear = Ok(());
        if state.transport.is_some()
            && !state.app_id.is_empty()
            && state.ring.message_count() > 0
        {
            pending_clear = self.resend_locked(&mut state);
        }

        let mut send_failure = None;
        if pending_clear.is_ok() && !state.app_id.is_empty() {
            if let Some(transport) = state.transport.as_mut() {
                match transport.send(&[&user_header[..], headers, payload], serial) {
                    Ok(()) => return Ok(()),
                    Err(error) => send_failure = Some(error),
                }
            }
        }

        if let Some(SendError::Broken) = send_failure {
            state.transport = None;
            state.connection = ConnectionState::RetryConnect;
            if state.config.local_print_mode == LocalPrintMode::Automatic {
                self.local_print(headers, payload, verbose);
            }
        }

        // everything below ends in the ring
        let staged = self.stage_with_policy(state, &user_header, headers, payload);
        match staged {
            Err(error) => Err(error),
            Ok(()) => match send_failure {
                None => Ok(()),
                Some(SendError::Full) => Err(Error::PipeFull),
                Some(SendError::Broken) => Err(Error::PipeError),
                Some(SendError::Other) => Err(Error::Other),
            },
        }
    }

    /// Stages a message honoring the block-mode policy.
    fn stage_with_policy(
        &self,
        mut state: parking_lot::MutexGuard<'_, UserState>,
        part1: &[u8],
        part2: &[u8],
        part3: &[u8],
    ) -> Result<()> {
        let needed = BLOCK_HEAD_SIZE + part1.len() + part2.len() + part3.len();
        let must_block =
            self.block_mode() == BlockMode::Blocking && !state.ring.fits_within_max(needed);
        if !must_block {
            return self.stage_locked(&mut state, part1, part2, part3);
        }
        drop(state);

        let mut flush = self.flush.lock();
        flush.buffer_full = true;
        while flush.buffer_full {
            if !self.is_initialized() {
                return Err(Error::LoggingDisabled);
            }
            self.cond_free.wait(&mut flush);
        }
        let mut state = self.state.lock();
        self.stage_locked(&mut state, part1, part2, part3)
    }
}
