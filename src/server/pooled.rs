//! Pooled-worker architecture.
//!
//! One thread per connection still owns the read side, but sorting moves
//! to a fixed worker pool shared across all connections, and every
//! connection owns exactly one single-threaded send serializer: pool
//! workers hand completed sorts to the serializer instead of writing the
//! socket themselves, so no two threads ever write one socket
//! concurrently.
//!
//! The reader submits a frame and immediately loops back to read the
//! next one, so pipelined requests are accepted. With more than one frame
//! of the same connection in flight, responses leave in pool-completion
//! order, not submission order. This is a known limitation, unobservable
//! under the client's one-in-flight discipline.

use crate::error::Error;
use crate::pool::WorkerPool;
use crate::server::bind_listener;
use crate::{sort, wire};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A sorted result on its way to the send serializer.
struct Completion {
    started: Instant,
    sort_time: Duration,
    sorted: Vec<i32>,
}

/// Reader thread per connection, shared sort pool, serializer per
/// connection.
pub struct PooledServer {
    listener: TcpListener,
    pool: Arc<WorkerPool>,
}

impl PooledServer {
    /// Bind the listening port and spawn the worker pool. Fails fast when
    /// the port cannot be bound.
    pub fn bind(port: u16, workers: usize, queue_depth: Option<usize>) -> io::Result<Self> {
        Ok(Self {
            listener: bind_listener(port)?,
            pool: Arc::new(WorkerPool::new(workers, queue_depth)?),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the process is killed.
    pub fn start(&self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "Pooled server listening");

        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    let pool = Arc::clone(&self.pool);
                    let spawned = thread::Builder::new()
                        .name(format!("pooled-conn-{peer}"))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, pool) {
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

/// Read side of one connection: frame in, decode, hand to the pool, loop.
fn handle_connection(mut stream: TcpStream, pool: Arc<WorkerPool>) -> Result<(), Error> {
    let write_half = stream.try_clone()?;
    let (tx, rx) = channel::<Completion>();
    thread::Builder::new()
        .name("pooled-sender".to_string())
        .spawn(move || send_loop(write_half, rx))
        .map_err(Error::Io)?;

    loop {
        let payload = match wire::read_frame(&mut stream)? {
            Some(payload) => payload,
            None => return Ok(()), // peer closed; dropping tx ends the serializer
        };

        // Processing time starts once the frame is fully read; pool
        // queueing counts toward it.
        let started = Instant::now();
        let values = wire::decode_array(&payload)?;

        let tx = tx.clone();
        pool.execute(move || {
            let (sorted, sort_time) = sort::timed(values);
            // The serializer may already be gone if the connection died.
            let _ = tx.send(Completion {
                started,
                sort_time,
                sorted,
            });
        });
    }
}

/// The connection's single-threaded send serializer: encodes and writes
/// completions in the order the pool finished them.
fn send_loop(mut stream: TcpStream, rx: Receiver<Completion>) {
    while let Ok(completion) = rx.recv() {
        let payload = wire::encode_array(&completion.sorted);
        let processing = completion.started.elapsed();
        let response = wire::encode_response(processing, completion.sort_time, &payload);

        if let Err(e) = stream.write_all(&response).and_then(|_| stream.flush()) {
            debug!(error = %e, "Send serializer ended");
            return;
        }
    }
}
