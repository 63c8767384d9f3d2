//! Thread-per-connection architecture.
//!
//! The baseline: one dedicated thread owns a connection end to end and
//! sorts inline, so total concurrency is bounded only by the number of
//! live connections. Partial reads are absorbed by blocking stream
//! semantics (read until the length is satisfied).

use crate::error::Error;
use crate::server::bind_listener;
use crate::{sort, wire};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info};

/// One thread per connection, sort inline.
pub struct SimpleServer {
    listener: TcpListener,
}

impl SimpleServer {
    /// Bind the listening port. Fails fast when the port cannot be bound.
    pub fn bind(port: u16) -> io::Result<Self> {
        Ok(Self {
            listener: bind_listener(port)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the process is killed.
    pub fn start(&self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "Simple server listening");

        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    let spawned = thread::Builder::new()
                        .name(format!("simple-conn-{peer}"))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream) {
                                debug!(peer = %peer, error = %e, "Connection ended");
                            }
                        });
                    if let Err(e) = spawned {
                        error!(error = %e, "Failed to spawn connection thread");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }
}

/// Request-response cycle for one connection. Any error ends the cycle
/// and closes the socket; no other connection is affected.
fn handle_connection(mut stream: TcpStream) -> Result<(), Error> {
    loop {
        let payload = match wire::read_frame(&mut stream)? {
            Some(payload) => payload,
            None => return Ok(()), // peer closed at a frame boundary
        };

        // The frame is fully available; processing time starts here.
        let started = Instant::now();
        let values = wire::decode_array(&payload)?;
        let (sorted, sort_time) = sort::timed(values);
        let response_payload = wire::encode_array(&sorted);

        // Measured through encoding, excluding the network write.
        let processing = started.elapsed();
        let response = wire::encode_response(processing, sort_time, &response_payload);
        stream.write_all(&response)?;
        stream.flush()?;
    }
}
