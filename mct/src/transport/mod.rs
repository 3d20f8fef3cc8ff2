//! The IPC endpoint to the daemon.
//!
//! Exactly one flavor is compiled in, selected by cargo feature: a Unix
//! stream socket (the default), a VSOCK stream for guests logging to the
//! host, or a pair of named FIFOs. All flavors share the same surface: a
//! non-blocking scatter-gather send that never partially commits a
//! message, and a non-blocking read of daemon-to-library control frames.

use std::io;

use crate::config::Config;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "unix-socket", not(any(feature = "vsock", feature = "fifo"))))] {
        mod unix;
        use unix as imp;
    } else if #[cfg(all(feature = "vsock", not(any(feature = "unix-socket", feature = "fifo"))))] {
        mod vsock;
        use vsock as imp;
    } else if #[cfg(all(feature = "fifo", not(any(feature = "unix-socket", feature = "vsock"))))] {
        mod fifo;
        use fifo as imp;
    } else {
        compile_error!(
            "exactly one of the `unix-socket`, `vsock`, or `fifo` features must be enabled"
        );
    }
}

/// Classified outcome of a failed send.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SendError {
    /// The endpoint cannot accept data right now (`EAGAIN`); the caller
    /// stages the message in the overflow ring.
    Full,
    /// The endpoint is gone (`EPIPE`, `EBADF`); the caller closes the
    /// handle and moves to retry-connect.
    Broken,
    /// Anything else, including a short write.
    Other,
}

fn classify(error: &io::Error) -> SendError {
    if error.kind() == io::ErrorKind::WouldBlock {
        return SendError::Full;
    }
    match error.raw_os_error() {
        Some(libc::EPIPE) | Some(libc::EBADF) => SendError::Broken,
        _ => SendError::Other,
    }
}

/// The connected endpoint.
#[derive(Debug)]
pub(crate) struct Transport {
    inner: imp::Endpoint,
}

impl Transport {
    /// Connects to the daemon. A failure here is not fatal; the caller
    /// retries on the next housekeeper tick.
    pub(crate) fn connect(config: &Config) -> io::Result<Transport> {
        Ok(Transport {
            inner: imp::Endpoint::connect(config)?,
        })
    }

    /// Sends the concatenation of `parts` as one message.
    ///
    /// With `serial`, the four-byte serial header pattern is prepended for
    /// links that resynchronize on it. A short write counts as
    /// [`SendError::Other`]: the message boundary is gone and the caller
    /// must not retry the remainder.
    pub(crate) fn send(&mut self, parts: &[&[u8]], serial: bool) -> Result<(), SendError> {
        let mut slices = Vec::with_capacity(parts.len() + 1);
        if serial {
            slices.push(io::IoSlice::new(&mct_core::header::SERIAL_PATTERN));
        }
        for part in parts {
            if !part.is_empty() {
                slices.push(io::IoSlice::new(part));
            }
        }
        let total: usize = slices.iter().map(|s| s.len()).sum();

        match self.inner.send_vectored(&slices) {
            Ok(sent) if sent == total => Ok(()),
            Ok(_) => Err(SendError::Other),
            Err(error) => Err(classify(&error)),
        }
    }

    /// Reads available daemon-to-library bytes into the spare capacity of
    /// `buf`, growing its length accordingly. Returns the number of bytes
    /// appended; zero means nothing was pending.
    pub(crate) fn try_recv(&mut self, buf: &mut Vec<u8>, max: usize) -> io::Result<usize> {
        let start = buf.len();
        if start >= max {
            return Ok(0);
        }
        buf.resize(max, 0);
        let result = self.inner.recv(&mut buf[start..]);
        match result {
            // a zero-length read is the peer hanging up, not "no data";
            // empty-but-alive endpoints report `WouldBlock`
            Ok(0) => {
                buf.truncate(start);
                Err(io::ErrorKind::BrokenPipe.into())
            }
            Ok(read) => {
                buf.truncate(start + read);
                Ok(read)
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                buf.truncate(start);
                Ok(0)
            }
            Err(error) => {
                buf.truncate(start);
                Err(error)
            }
        }
    }
}
