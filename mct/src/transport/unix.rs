//! Unix stream socket flavor.
//!
//! Connects to `${ipc_dir}/mct`. The socket is switched to non-blocking
//! before the connect and carries `SO_LINGER {on, 10}` so a process
//! exiting with queued data gives the daemon a bounded chance to drain it.

use std::io::{self, Read};
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::config::Config;

#[derive(Debug)]
pub(super) struct Endpoint {
    socket: Socket,
}

impl Endpoint {
    pub(super) fn connect(config: &Config) -> io::Result<Endpoint> {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        socket.set_nonblocking(true)?;
        if let Err(error) = socket.set_linger(Some(Duration::from_secs(10))) {
            tracing::warn!(%error, "failed to set socket linger option");
        }
        let path = config.ipc_dir.join("mct");
        socket.connect(&SockAddr::unix(&path)?)?;
        Ok(Endpoint { socket })
    }

    pub(super) fn send_vectored(&mut self, slices: &[io::IoSlice<'_>]) -> io::Result<usize> {
        self.socket.send_vectored(slices)
    }

    pub(super) fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}
