//! Readiness-multiplexed architecture.
//!
//! No thread count grows with the connection count: a blocking accept
//! thread, one spinning read thread, one spinning write thread, and the
//! shared worker pool service every connection. Each connection's read
//! side is a [`FrameAssembler`] resumed across readiness events; its write
//! side is a [`FrameSender`] drained across readiness events.
//!
//! Both polling loops use a zero timeout and busy-retry when nothing is
//! ready: a deliberate spin that keeps read and write responsiveness
//! independent of any single slow connection, at the cost of CPU when
//! idle.
//!
//! The accepted socket is duplicated so the read half and the write half
//! each register with their own poll. Lock discipline: a connection's
//! mutex guards its sender queue and `registered` flag and is taken before
//! any registry call; mio's `Registry` is internally synchronized, so the
//! registry is the write-readiness facility's own lock. The read thread
//! never touches write-side state and vice versa.

use crate::error::Error;
use crate::pool::WorkerPool;
use crate::server::{bind_listener, FrameAssembler, FrameSender, ReadOutcome};
use crate::{sort, wire};
use mio::net::TcpStream as MioStream;
use mio::{Events, Interest, Poll, Registry, Token};
use slab::Slab;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const EVENT_CAPACITY: usize = 1024;

/// Read side of one connection, owned by the read thread via the slab.
struct ReadHalf {
    stream: MioStream,
    assembler: FrameAssembler,
    write: Arc<Mutex<WriteHalf>>,
}

/// Write side of one connection, shared between pool workers (appending)
/// and the write thread (draining) under the connection's mutex.
struct WriteHalf {
    stream: MioStream,
    sender: FrameSender,
    /// This connection's key on the write poll, stable for its lifetime.
    /// Re-arming always registers under the same token.
    token: Token,
    registered: bool,
}

type ReadConns = Arc<Mutex<Slab<ReadHalf>>>;
type WriteConns = Arc<Mutex<Slab<Arc<Mutex<WriteHalf>>>>>;

/// Accept + read + write threads and a shared pool multiplex all
/// connections.
pub struct MultiplexedServer {
    listener: TcpListener,
    workers: usize,
    queue_depth: Option<usize>,
}

impl MultiplexedServer {
    /// Bind the listening port. Fails fast when the port cannot be bound.
    pub fn bind(port: u16, workers: usize, queue_depth: Option<usize>) -> io::Result<Self> {
        Ok(Self {
            listener: bind_listener(port)?,
            workers,
            queue_depth,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the read and write threads, then run the blocking accept
    /// loop on the calling thread. Runs until the process is killed.
    pub fn start(&self) -> io::Result<()> {
        let read_poll = Poll::new()?;
        let write_poll = Poll::new()?;
        let read_registry = read_poll.registry().try_clone()?;
        let write_registry = Arc::new(write_poll.registry().try_clone()?);

        let read_conns: ReadConns = Arc::new(Mutex::new(Slab::new()));
        let write_conns: WriteConns = Arc::new(Mutex::new(Slab::new()));
        let pool = Arc::new(WorkerPool::new(self.workers, self.queue_depth)?);

        {
            let read_conns = Arc::clone(&read_conns);
            let write_conns = Arc::clone(&write_conns);
            let write_registry = Arc::clone(&write_registry);
            let pool = Arc::clone(&pool);
            thread::Builder::new().name("mux-read".to_string()).spawn(move || {
                read_loop(read_poll, read_conns, write_conns, write_registry, pool);
            })?;
        }
        {
            let write_conns = Arc::clone(&write_conns);
            thread::Builder::new().name("mux-write".to_string()).spawn(move || {
                write_loop(write_poll, write_conns);
            })?;
        }

        info!(
            addr = %self.local_addr()?,
            workers = self.workers,
            "Multiplexed server listening"
        );

        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    match register_connection(stream, &read_registry, &read_conns, &write_conns) {
                        Ok(()) => debug!(peer = %peer, "Accepted connection"),
                        Err(e) => debug!(peer = %peer, error = %e, "Failed to register connection"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }
}

/// Set the accepted socket non-blocking, split it into its two halves,
/// and register the read half with read interest. The write half starts
/// unregistered; the first completed sort registers it.
fn register_connection(
    stream: TcpStream,
    read_registry: &Registry,
    read_conns: &ReadConns,
    write_conns: &WriteConns,
) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    let write_stream = MioStream::from_std(stream.try_clone()?);
    let read_stream = MioStream::from_std(stream);

    let (write, write_token) = {
        let mut conns = write_conns.lock().unwrap();
        let entry = conns.vacant_entry();
        let token = Token(entry.key());
        let half = Arc::new(Mutex::new(WriteHalf {
            stream: write_stream,
            sender: FrameSender::new(),
            token,
            registered: false,
        }));
        entry.insert(Arc::clone(&half));
        (half, token)
    };

    let mut conns = read_conns.lock().unwrap();
    let entry = conns.vacant_entry();
    let read_token = Token(entry.key());
    let half = entry.insert(ReadHalf {
        stream: read_stream,
        assembler: FrameAssembler::new(),
        write,
    });

    if let Err(e) = read_registry.register(&mut half.stream, read_token, Interest::READABLE) {
        conns.try_remove(read_token.0);
        drop(conns);
        write_conns.lock().unwrap().try_remove(write_token.0);
        return Err(e);
    }
    Ok(())
}

/// Read cycle: zero-timeout poll, busy-retried. Assembles frames and
/// submits them to the pool; a connection whose socket fails is torn
/// down and dropped from future polling, leaving every other connection
/// untouched.
fn read_loop(
    mut poll: Poll,
    read_conns: ReadConns,
    write_conns: WriteConns,
    write_registry: Arc<Registry>,
    pool: Arc<WorkerPool>,
) {
    let mut events = Events::with_capacity(EVENT_CAPACITY);
    loop {
        if let Err(e) = poll.poll(&mut events, Some(Duration::ZERO)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!(error = %e, "Read poll failed");
            continue;
        }
        if events.is_empty() {
            continue; // nothing ready; spin
        }

        for event in events.iter() {
            let token = event.token();
            let mut conns = read_conns.lock().unwrap();
            let keep = match conns.get_mut(token.0) {
                Some(conn) => match drive_read(conn, &pool, &write_registry) {
                    Ok(keep) => keep,
                    Err(e) => {
                        debug!(error = %e, "Connection ended");
                        false
                    }
                },
                None => continue, // already torn down; stale event
            };

            if !keep {
                teardown(&mut conns, token, poll.registry(), &write_conns, &write_registry);
            }
        }
    }
}

/// Drive one connection's assembler as far as the socket allows,
/// submitting every completed frame. Returns false when the peer closed.
fn drive_read(
    conn: &mut ReadHalf,
    pool: &Arc<WorkerPool>,
    write_registry: &Arc<Registry>,
) -> Result<bool, Error> {
    loop {
        match conn.assembler.poll_read(&mut conn.stream)? {
            ReadOutcome::Complete => {
                if let Some(frame) = conn.assembler.take_frame() {
                    // Processing time starts at frame completion; pool
                    // queueing counts toward it.
                    let started = Instant::now();
                    let write = Arc::clone(&conn.write);
                    let registry = Arc::clone(write_registry);
                    pool.execute(move || handle_frame(frame, started, write, registry));
                }
                // More frames may already be buffered; keep assembling.
            }
            ReadOutcome::Incomplete => return Ok(true),
            ReadOutcome::Closed => return Ok(false),
        }
    }
}

/// Remove a connection from both registries and both slabs.
fn teardown(
    read_slab: &mut Slab<ReadHalf>,
    token: Token,
    read_registry: &Registry,
    write_conns: &WriteConns,
    write_registry: &Registry,
) {
    if let Some(mut conn) = read_slab.try_remove(token.0) {
        let _ = read_registry.deregister(&mut conn.stream);

        let write_token = {
            let mut half = conn.write.lock().unwrap();
            if half.registered {
                let _ = write_registry.deregister(&mut half.stream);
                half.registered = false;
            }
            let _ = half.stream.shutdown(Shutdown::Both);
            half.token
        };
        write_conns.lock().unwrap().try_remove(write_token.0);
        debug!(token = token.0, "Connection closed");
    }
}

/// Pool worker: decode, sort (with its own nested timer), encode, queue
/// on the connection's sender, and make sure write interest is armed.
fn handle_frame(
    frame: Vec<u8>,
    started: Instant,
    write: Arc<Mutex<WriteHalf>>,
    registry: Arc<Registry>,
) {
    let values = match wire::decode_array(&frame) {
        Ok(values) => values,
        Err(e) => {
            debug!(error = %e, "Dropping connection with malformed frame");
            // Collapse the connection; the read thread observes EOF and
            // finishes the teardown.
            let half = write.lock().unwrap();
            let _ = half.stream.shutdown(Shutdown::Both);
            return;
        }
    };

    let (sorted, sort_time) = sort::timed(values);
    let payload = wire::encode_array(&sorted);

    let mut guard = write.lock().unwrap();
    let half = &mut *guard;
    let processing = started.elapsed();
    for chunk in wire::response_chunks(processing, sort_time, payload) {
        half.sender.push(chunk);
    }

    // Arm write interest: re-arm if still registered, register fresh if
    // the write thread cleared it. Same token either way.
    let armed = if half.registered {
        registry.reregister(&mut half.stream, half.token, Interest::WRITABLE)
    } else {
        registry
            .register(&mut half.stream, half.token, Interest::WRITABLE)
            .map(|()| half.registered = true)
    };
    if let Err(e) = armed {
        debug!(error = %e, "Failed to arm write interest");
        let _ = half.stream.shutdown(Shutdown::Both);
    }
}

/// Write cycle: zero-timeout poll, busy-retried. Flushes as much of each
/// ready connection's queue as the socket accepts; a drained connection's
/// write interest is cleared until a worker re-arms it.
fn write_loop(mut poll: Poll, write_conns: WriteConns) {
    let mut events = Events::with_capacity(EVENT_CAPACITY);
    loop {
        if let Err(e) = poll.poll(&mut events, Some(Duration::ZERO)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!(error = %e, "Write poll failed");
            continue;
        }
        if events.is_empty() {
            continue; // nothing ready; spin
        }

        for event in events.iter() {
            let token = event.token();
            let half = {
                let conns = write_conns.lock().unwrap();
                match conns.get(token.0) {
                    Some(half) => Arc::clone(half),
                    None => continue, // already torn down; stale event
                }
            };

            let mut guard = half.lock().unwrap();
            let conn = &mut *guard;
            match conn.sender.poll_write(&mut conn.stream) {
                Ok(true) => {
                    // Queue drained: clear write interest. mio has no
                    // empty interest set, so clearing means deregistering
                    // the half while its slab slot (and token) live on.
                    if conn.registered {
                        let _ = poll.registry().deregister(&mut conn.stream);
                        conn.registered = false;
                    }
                }
                Ok(false) => {} // partial flush; stay armed
                Err(e) => {
                    debug!(error = %e, "Write failed, dropping connection");
                    if conn.registered {
                        let _ = poll.registry().deregister(&mut conn.stream);
                        conn.registered = false;
                    }
                    let _ = conn.stream.shutdown(Shutdown::Both);
                    let write_token = conn.token;
                    drop(guard);
                    write_conns.lock().unwrap().try_remove(write_token.0);
                }
            }
        }
    }
}
