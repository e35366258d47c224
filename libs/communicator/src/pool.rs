//! Receive Pool
//!
//! Fixed set of named worker threads draining a shared FIFO of inbound
//! work. Decoding and delivery happen on the workers so transports never
//! block on message execution.

use crate::envelope::Envelope;
use crate::{CommError, Result};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Unit of inbound work
#[derive(Debug)]
pub enum Inbound {
    /// Raw bytes straight off a transport
    Bytes(Bytes),
    /// An already decoded envelope
    Envelope(Envelope),
}

impl Inbound {
    fn into_envelope(self) -> Result<Envelope> {
        match self {
            Inbound::Bytes(bytes) => Envelope::from_bytes(&bytes),
            Inbound::Envelope(envelope) => Ok(envelope),
        }
    }
}

/// Called on a worker for every decoded envelope
pub type DeliveryHandler = Arc<dyn Fn(Envelope) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Queue {
    items: VecDeque<Inbound>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

pub struct ReceivePool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ReceivePool {
    /// Spawn `size` workers named `{name}-{index}`
    pub fn start(name: &str, size: usize, handler: DeliveryHandler) -> Result<Self> {
        if size == 0 {
            return Err(CommError::configuration(
                "Receive pool needs at least one worker",
                Some("worker_threads"),
            ));
        }

        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let worker_shared = shared.clone();
            let handler = handler.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || worker_loop(&worker_shared, &handler));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    let pool = Self {
                        shared,
                        workers: Mutex::new(workers),
                        size,
                    };
                    pool.shutdown();
                    return Err(e.into());
                }
            }
        }

        info!(workers = size, "Receive pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Queue work for the next free worker. Returns false after shutdown.
    pub fn enqueue(&self, item: Inbound) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return false;
        }
        queue.items.push_back(item);
        drop(queue);
        self.shared.available.notify_one();
        true
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Stop all workers and discard queued work.
    ///
    /// Safe to call from a worker: the calling thread is not joined and
    /// exits once its current item returns.
    pub fn shutdown(&self) {
        let discarded = {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            let discarded = queue.items.len();
            queue.items.clear();
            discarded
        };
        self.shared.available.notify_all();

        if discarded > 0 {
            warn!(discarded, "Receive pool shut down with queued work");
        }

        let current = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("Receive worker terminated abnormally");
            }
        }
        info!("Receive pool stopped");
    }
}

impl Drop for ReceivePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, handler: &DeliveryHandler) {
    debug!("Receive worker started");
    loop {
        let item = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    debug!("Receive worker exiting");
                    return;
                }
                if let Some(item) = queue.items.pop_front() {
                    break item;
                }
                shared.available.wait(&mut queue);
            }
        };

        let envelope = match item.into_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable inbound data");
                continue;
            }
        };

        let message_id = envelope.message_id();
        match panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(message_id, error = %e, "Delivery failed"),
            Err(_) => error!(message_id, "Delivery handler panicked"),
        }
    }
}
