//! Context handles.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use mct_core::{Id4, LogLevel};

use crate::error::{Error, Result};
use crate::message::MessageBuilder;
use crate::registry::LevelCell;
use crate::user::{self, USER};

/// Minimum valid service id of an injection message.
pub const INJECTION_SERVICE_ID_MIN: u32 = 0xFFF;

/// A registered logging context.
///
/// Obtained from [`register_context`](crate::register_context) and friends.
/// The handle carries the context's cached log level, so the
/// [`log`](Context::log) fast path is a single atomic read; it is `Send`
/// and `Sync` and meant to live in a `static` or be shared across the
/// application's threads.
pub struct Context {
    pub(crate) ctid: Id4,
    pub(crate) pos: u32,
    pub(crate) cell: Arc<LevelCell>,
    pub(crate) mcnt: AtomicU8,
}

impl Context {
    /// The context id.
    pub fn ctid(&self) -> Id4 {
        self.ctid
    }

    /// Starts a log message at `level`.
    ///
    /// Returns `None` when the message would be filtered: the level does
    /// not pass the context's effective threshold, the library is not
    /// initialized, or this process is a child of a logging process. The
    /// check reads the daemon-updatable cache cell and costs no lock.
    pub fn log(&self, level: LogLevel) -> Option<MessageBuilder<'_>> {
        self.start(level, None)
    }

    /// Starts a non-verbose log message carrying `message_id`.
    ///
    /// The message id becomes the first four payload bytes; per-argument
    /// type information is omitted. In verbose mode the id is ignored and
    /// this behaves exactly like [`log`](Context::log).
    pub fn log_id(&self, level: LogLevel, message_id: u32) -> Option<MessageBuilder<'_>> {
        self.start(level, Some(message_id))
    }

    fn start(&self, level: LogLevel, message_id: Option<u32>) -> Option<MessageBuilder<'_>> {
        if user::is_child() || !USER.is_initialized() {
            return None;
        }
        if !level.passes(self.cell.level()) {
            return None;
        }
        Some(MessageBuilder::new(self, level, message_id))
    }

    /// Registers `callback` for injections addressed to this context with
    /// `service_id`. A second registration for the same service id
    /// replaces the first.
    ///
    /// The callback runs on the housekeeper task, outside all library
    /// locks, so it may call back into the logging API.
    pub fn register_injection_callback<F>(&self, service_id: u32, callback: F) -> Result<()>
    where
        F: Fn(u32, &[u8]) + Send + Sync + 'static,
    {
        if service_id < INJECTION_SERVICE_ID_MIN {
            return Err(Error::WrongParameter);
        }
        USER.register_injection(self.pos, service_id, Arc::new(callback))
    }

    pub(crate) fn next_mcnt(&self) -> u8 {
        self.mcnt.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("ctid", &self.ctid)
            .field("log_level_pos", &self.pos)
            .field("level", &self.cell.level())
            .finish()
    }
}
