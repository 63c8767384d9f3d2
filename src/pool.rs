//! Fixed-size worker pool shared across connections.
//!
//! Workers pull jobs from one queue. The queue bound is a configuration
//! choice: unbounded reproduces the reference behavior (a slow sort stage
//! can grow it without limit), a bound makes `execute` block the submitter
//! once the queue fills, back-pressuring the reader that produced the job.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Queue {
    Unbounded(Sender<Job>),
    Bounded(SyncSender<Job>),
}

/// Fixed number of named worker threads over one shared job queue.
pub struct WorkerPool {
    queue: Queue,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads (0 means one per CPU core). With
    /// `queue_depth` set the queue is bounded and a full queue blocks
    /// `execute`; unset means unbounded.
    pub fn new(workers: usize, queue_depth: Option<usize>) -> io::Result<Self> {
        let workers = if workers == 0 { num_cpus() } else { workers };
        let (queue, receiver) = match queue_depth {
            Some(depth) => {
                let (tx, rx) = mpsc::sync_channel(depth);
                (Queue::Bounded(tx), rx)
            }
            None => {
                let (tx, rx) = mpsc::channel();
                (Queue::Unbounded(tx), rx)
            }
        };

        let receiver = Arc::new(Mutex::new(receiver));
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("sort-worker-{id}"))
                .spawn(move || worker_loop(id, receiver))?;
            handles.push(handle);
        }

        Ok(Self {
            queue,
            _workers: handles,
        })
    }

    /// Submit a job. Blocks when the queue is bounded and full.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Workers outlive the pool handle; the send only fails during
        // process teardown.
        let job: Job = Box::new(job);
        let _ = match &self.queue {
            Queue::Unbounded(tx) => tx.send(job),
            Queue::Bounded(tx) => tx.send(job),
        };
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = receiver.lock().unwrap().recv();
        match job {
            Ok(job) => job(),
            Err(_) => {
                debug!(worker = id, "Worker queue closed, exiting");
                break;
            }
        }
    }
}
