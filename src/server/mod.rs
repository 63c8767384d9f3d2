//! The three server architectures.
//!
//! All three speak the identical wire protocol; a client cannot tell them
//! apart except by latency. What differs is the concurrency model:
//!
//! - [`SimpleServer`]: one thread owns a connection end to end.
//! - [`PooledServer`]: per-connection reader threads dispatch sorting to a
//!   fixed worker pool; a per-connection serializer owns the write side.
//! - [`MultiplexedServer`]: a bounded pair of threads drive readiness
//!   polling over all connections; [`FrameAssembler`] / [`FrameSender`]
//!   absorb partial reads and writes.
//!
//! None of the servers shut down gracefully; they run until the process is
//! killed. Errors are connection-local: one misbehaving client never
//! affects another connection or any accept/read/write loop.

mod assembler;
mod multiplexed;
mod pooled;
mod sender;
mod simple;

pub use assembler::{FrameAssembler, ReadOutcome};
pub use multiplexed::MultiplexedServer;
pub use pooled::PooledServer;
pub use sender::FrameSender;
pub use simple::SimpleServer;

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

/// Build the listening socket every architecture starts from.
///
/// Address reuse keeps quick restarts from tripping over sockets in
/// TIME_WAIT. Binding failures surface here, at construction time.
pub(crate) fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind_listener(0).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_taken_port_fails_fast() {
        let first = bind_listener(0).unwrap();
        let port = first.local_addr().unwrap().port();
        // SO_REUSEADDR does not allow two live listeners on one port.
        assert!(bind_listener(port).is_err());
    }
}
