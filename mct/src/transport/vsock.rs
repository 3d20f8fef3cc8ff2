//! VSOCK stream flavor, for guests logging to a daemon on the host.
//!
//! The port is fixed at build time. The socket connects blocking and is
//! switched to non-blocking afterwards, sidestepping `EINPROGRESS`
//! handling on the connect path.

use std::io::{self, Read};
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::config::Config;

/// The daemon's fixed VSOCK port.
const VSOCK_PORT: u32 = 3490;

#[derive(Debug)]
pub(super) struct Endpoint {
    socket: Socket,
}

impl Endpoint {
    pub(super) fn connect(_config: &Config) -> io::Result<Endpoint> {
        let socket = Socket::new(Domain::VSOCK, Type::STREAM, None)?;
        socket.connect(&SockAddr::vsock(libc::VMADDR_CID_HOST, VSOCK_PORT))?;
        socket.set_nonblocking(true)?;
        if let Err(error) = socket.set_linger(Some(Duration::from_secs(10))) {
            tracing::warn!(%error, "failed to set socket linger option");
        }
        Ok(Endpoint { socket })
    }

    pub(super) fn send_vectored(&mut self, slices: &[io::IoSlice<'_>]) -> io::Result<usize> {
        self.socket.send_vectored(slices)
    }

    pub(super) fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}
