//! Per-process client library for the MCT log and trace infrastructure.
//!
//! # Overview
//!
//! An application registers itself and one or more logging *contexts*,
//! then emits typed log messages through those contexts. The library
//! serializes each message into the MCT wire format, forwards it to the
//! collecting daemon over a local IPC endpoint, and falls back to a
//! growable in-process ring buffer whenever the daemon is slow, restarting
//! or not yet up; a background housekeeper task replays the ring and
//! applies daemon-initiated control messages (log-level changes, injection
//! calls, block-mode switches) at runtime.
//!
//! # Usage
//!
//! ```rust
//! # fn docs() -> mct::Result<()> {
//! mct::register_app("DEMO", "demonstration application")?;
//! let ctx = mct::register_context("MAIN", "main context")?;
//!
//! if let Some(mut msg) = ctx.log(mct::LogLevel::Info) {
//!     msg.write_string("temperature")?;
//!     msg.write_i32(-14)?;
//!     msg.finish()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The [`message!`] macro shortens the common build-and-finish sequence:
//!
//! ```rust
//! # fn docs() -> mct::Result<()> {
//! # let ctx = mct::register_context("MAIN", "main context")?;
//! mct::message!(ctx, mct::LogLevel::Warn, "voltage drop", 11.7f32)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Filtering
//!
//! Every context carries a log level that the daemon can change at
//! runtime. [`Context::log`] consults a cached copy with a single atomic
//! read, so messages below the threshold cost neither allocation nor
//! formatting. Initial levels can be pinned per context with the
//! `MCT_INITIAL_LOG_LEVEL` environment variable.
//!
//! # Backpressure
//!
//! When the IPC endpoint cannot accept a message it is staged in a ring
//! buffer that grows in steps up to a bound. Beyond that bound the policy
//! decides: in the default non-blocking mode the message is dropped and
//! counted (the count is reported to the daemon on the next successful
//! send), in blocking mode the producer waits until the housekeeper has
//! drained the ring. The daemon may switch the mode at runtime unless
//! `MCT_FORCE_BLOCKING` pinned it.
//!
//! # Forked processes
//!
//! A child of a logging process must not reuse the parent's transport,
//! registry, or ring. The library latches the fork and disables itself in
//! the child; re-initialization there is the application's decision.

mod config;
mod context;
mod diag;
mod error;
mod housekeeper;
mod message;
mod registry;
mod transport;
mod user;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use mct_core::payload::IntFormat;
pub use mct_core::{Id4, LogLevel, TraceStatus};

pub use crate::context::{Context, INJECTION_SERVICE_ID_MIN};
pub use crate::error::{Error, Result};
pub use crate::message::MessageBuilder;

use crate::user::USER;

/// Initializes the library explicitly.
///
/// Calling this is optional: registration and logging initialize on first
/// use. An explicit call is useful to front-load the connection attempt
/// and the environment snapshot.
pub fn init() -> Result<()> {
    USER.ensure_init()
}

/// Initializes the library for direct-to-file operation.
///
/// Messages are written to `path` with storage headers instead of being
/// sent to the daemon. See [`set_filesize_max`] for bounding the file.
pub fn init_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .map_err(|_| Error::Other)?;
    USER.init_with(Some(file), None)
}

/// Bounds the output file of direct-to-file mode.
///
/// Once a message would push the file past `bytes`, writes fail with
/// [`Error::FileSize`] until the library is re-initialized.
pub fn set_filesize_max(bytes: u64) -> Result<()> {
    USER.set_filesize_max(bytes)
}

/// Shuts the library down: stops the housekeeper, closes the transport,
/// and clears the registry. A later call to [`init`] starts over.
pub fn free() {
    USER.teardown();
}

/// Registers the application of this process.
///
/// One application per process: re-registration with the same id is a
/// refresh, with a different id an error. `MCT_APP_ID` overrides `apid`.
pub fn register_app(apid: &str, description: &str) -> Result<()> {
    USER.register_app(apid, description)
}

/// Unregisters the application and all its contexts.
pub fn unregister_app() -> Result<()> {
    USER.unregister_app(false)
}

/// Like [`unregister_app`], but first drains buffered messages for the
/// at-exit timeout configured with [`set_resend_timeout_at_exit`].
pub fn unregister_app_flush_buffered_logs() -> Result<()> {
    USER.unregister_app(true)
}

/// Registers a logging context under the current application.
///
/// The initial log level resolves in priority order: the
/// `MCT_INITIAL_LOG_LEVEL` environment override, then `info`; the initial
/// trace status is `off`. Use [`register_context_with_level`] to supply
/// explicit initial values.
pub fn register_context(ctid: &str, description: &str) -> Result<Context> {
    USER.register_context(ctid, description, None, None, None)
}

/// Registers a context with explicit initial level and trace status.
///
/// The environment override still wins over `level`.
pub fn register_context_with_level(
    ctid: &str,
    description: &str,
    level: LogLevel,
    trace_status: TraceStatus,
) -> Result<Context> {
    USER.register_context(ctid, description, Some(level), Some(trace_status), None)
}

/// Registers a context and a callback invoked whenever the daemon changes
/// the context's log level or trace status.
///
/// The callback runs on the housekeeper task with no library lock held.
pub fn register_context_with_callback<F>(
    ctid: &str,
    description: &str,
    level_changed: F,
) -> Result<Context>
where
    F: Fn(Id4, LogLevel, TraceStatus) + Send + Sync + 'static,
{
    USER.register_context(ctid, description, None, None, Some(Arc::new(level_changed)))
}

/// Unregisters a context. Its position in the registry is retired, not
/// reused; re-registering the same id resolves the initial level afresh.
pub fn unregister_context(context: Context) -> Result<()> {
    USER.unregister_context(context)
}

/// Sets the default log level and trace status for every context of the
/// application, daemon-side.
pub fn set_application_log_level(level: LogLevel, trace_status: TraceStatus) -> Result<()> {
    USER.set_app_defaults(level, trace_status)
}

/// Switches between verbose mode (self-describing arguments) and
/// non-verbose mode (message-id addressed payloads). Verbose is the
/// default.
pub fn set_verbose_mode(verbose: bool) {
    USER.set_verbose(verbose)
}

/// Enables or disables the serial header prefix on each sent message, for
/// links that resynchronize on it.
pub fn set_serial_header(enabled: bool) {
    USER.set_serial_header(enabled)
}

/// Controls whether messages carry the ECU id extra field. On by default.
pub fn set_with_ecu_id(enabled: bool) {
    USER.set_with_ecu_id(enabled)
}

/// Controls whether messages carry the session id (the process id). On by
/// default.
pub fn set_with_session_id(enabled: bool) {
    USER.set_with_session_id(enabled)
}

/// Controls whether messages carry the uptime timestamp. On by default.
pub fn set_with_timestamp(enabled: bool) {
    USER.set_with_timestamp(enabled)
}

/// Mirrors finalized messages to stdout (unless `MCT_LOCAL_PRINT_MODE`
/// forces the behavior either way).
pub fn enable_local_print() {
    USER.set_local_print(true)
}

/// Stops mirroring messages to stdout.
pub fn disable_local_print() {
    USER.set_local_print(false)
}

/// Sets how long the at-exit handler may keep draining buffered messages,
/// in milliseconds. The default is 0: no drain at exit.
///
/// With `MCT_FORCE_BLOCKING`, producers blocked on a full ring do not
/// observe this deadline; they stay parked until the ring drains or the
/// process exits.
pub fn set_resend_timeout_at_exit(milliseconds: u32) {
    USER.set_atexit_timeout(milliseconds)
}

/// Last daemon-announced log state: `-1` unknown, `0` no external client,
/// `1` an external client is connected.
pub fn log_state() -> i8 {
    USER.log_state()
}

/// Emits a timestamped marker control message.
pub fn log_marker() -> Result<()> {
    USER.send_marker()
}

/// Returns `(total, used)` bytes of the overflow ring, for health
/// monitoring.
pub fn buffer_fill() -> (usize, usize) {
    USER.buffer_fill()
}

/// Drains the overflow ring for at most `timeout`, returning the number
/// of messages still buffered afterwards.
pub fn flush_buffered_logs(timeout: Duration) -> usize {
    USER.drain_for(timeout)
}

/// A value that can be appended to a [`MessageBuilder`] as one argument.
///
/// Implemented for the primitive types the wire format knows; used by the
/// [`message!`] macro.
pub trait ToArg {
    /// Appends `self` to the message.
    fn append_to(&self, message: &mut MessageBuilder<'_>) -> Result<()>;
}

macro_rules! impl_to_arg {
    ($($ty:ty => $method:ident;)+) => {
        $(
            impl ToArg for $ty {
                fn append_to(&self, message: &mut MessageBuilder<'_>) -> Result<()> {
                    message.$method(*self)
                }
            }
        )+
    };
}

impl_to_arg! {
    bool => write_bool;
    i8 => write_i8;
    i16 => write_i16;
    i32 => write_i32;
    i64 => write_i64;
    u8 => write_u8;
    u16 => write_u16;
    u32 => write_u32;
    u64 => write_u64;
    f32 => write_f32;
    f64 => write_f64;
}

impl ToArg for &str {
    fn append_to(&self, message: &mut MessageBuilder<'_>) -> Result<()> {
        message.write_utf8_string(self)
    }
}

impl ToArg for String {
    fn append_to(&self, message: &mut MessageBuilder<'_>) -> Result<()> {
        message.write_utf8_string(self)
    }
}

impl ToArg for &[u8] {
    fn append_to(&self, message: &mut MessageBuilder<'_>) -> Result<()> {
        message.write_raw(self)
    }
}

/// Builds and finishes a log message in one step.
///
/// Expands to the level check, one append per argument, and the finish;
/// a message filtered by the level check costs only the cached-cell read
/// and returns `Ok(())`.
///
/// ```rust
/// # fn docs() -> mct::Result<()> {
/// # let ctx = mct::register_context("MAIN", "main context")?;
/// mct::message!(ctx, mct::LogLevel::Debug, "frame", 42u32, true)?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! message {
    ($ctx:expr, $level:expr $(, $arg:expr)* $(,)?) => {{
        match $ctx.log($level) {
            Some(mut message) => {
                let mut result: $crate::Result<()> = Ok(());
                $(
                    if result.is_ok() {
                        result = $crate::ToArg::append_to(&$arg, &mut message);
                    }
                )*
                match result {
                    Ok(()) => message.finish(),
                    Err(error) => Err(error),
                }
            }
            None => Ok(()),
        }
    }};
}
