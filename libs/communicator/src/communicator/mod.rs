//! Communicator
//!
//! The per-process facade over identity, peer resolution, sealing, the
//! receive pool and outbound tracking. [`Communicator`] is a cheap clonable
//! handle; transports that must not keep the process alive hold a
//! [`WeakCommunicator`] instead.

mod inbound;
mod outbound;
mod waiting;

use crate::config::CommunicatorConfig;
use crate::envelope::Envelope;
use crate::host::{HostInfo, Uid};
use crate::message::{MessageKind, MessageRegistry};
use crate::pool::{DeliveryHandler, ReceivePool};
use crate::routing::Resolver;
use crate::security::{Identity, LocalKeys, Sealer, X25519Sealer};
use crate::stats::{CommStats, StatsSnapshot};
use crate::tracking::{PendingSet, ReplyBook};
use crate::{CommError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// Hook run when a [`Shutdown`](crate::message::Shutdown) message arrives
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Inner {
    uid: Uid,
    host: HostInfo,
    keys: LocalKeys,
    config: CommunicatorConfig,
    resolver: Resolver,
    sealer: Arc<dyn Sealer>,
    registry: MessageRegistry,
    unsent: PendingSet,
    unacknowledged: PendingSet,
    replies: ReplyBook,
    pool: Mutex<Option<ReceivePool>>,
    shutdown_hook: Option<ShutdownHook>,
    stats: CommStats,
    open: AtomicBool,
}

/// Messaging endpoint of one process
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<Inner>,
}

/// Non-owning handle, see [`Communicator::downgrade`]
#[derive(Clone)]
pub struct WeakCommunicator {
    inner: Weak<Inner>,
}

impl WeakCommunicator {
    pub fn upgrade(&self) -> Option<Communicator> {
        self.inner.upgrade().map(|inner| Communicator { inner })
    }
}

impl fmt::Debug for WeakCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCommunicator")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Communicator {
    pub fn builder(config: CommunicatorConfig) -> CommunicatorBuilder {
        CommunicatorBuilder::new(config)
    }

    pub fn uid(&self) -> Uid {
        self.inner.uid
    }

    /// Public identity to hand to peers
    pub fn host_info(&self) -> &HostInfo {
        &self.inner.host
    }

    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    pub fn config(&self) -> &CommunicatorConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakCommunicator {
        WeakCommunicator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run the installed shutdown hook, if any
    pub fn cluster_shutdown(&self) {
        match &self.inner.shutdown_hook {
            Some(hook) => {
                info!(uid = %self.uid(), "Cluster shutdown requested");
                hook();
            }
            None => warn!(uid = %self.uid(), "Cluster shutdown requested but no hook installed"),
        }
    }

    /// Stop the receive pool and close the communicator. Idempotent, and
    /// safe to call from inside a message being delivered.
    pub fn end(&self) {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return;
        }

        let pool = self.inner.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown();
        }

        self.inner.unsent.close();
        self.inner.unacknowledged.close();
        self.inner.replies.close();
        info!(uid = %self.uid(), "Communicator ended");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CommError::Closed)
        }
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("uid", &self.inner.uid)
            .field("peers", &self.inner.resolver.len())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Assembles a [`Communicator`] and starts its receive pool
pub struct CommunicatorBuilder {
    config: CommunicatorConfig,
    uid: Option<Uid>,
    keys: Option<LocalKeys>,
    sealer: Option<Arc<dyn Sealer>>,
    registry: MessageRegistry,
    shutdown_hook: Option<ShutdownHook>,
}

impl CommunicatorBuilder {
    pub fn new(config: CommunicatorConfig) -> Self {
        Self {
            config,
            uid: None,
            keys: None,
            sealer: None,
            registry: MessageRegistry::new(),
            shutdown_hook: None,
        }
    }

    /// Use an existing identity instead of the configured or generated one
    pub fn identity(mut self, identity: Identity) -> Self {
        let (uid, keys) = identity.into_parts();
        self.uid = Some(uid);
        self.keys = Some(keys);
        self
    }

    pub fn uid(mut self, uid: Uid) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn local_keys(mut self, keys: LocalKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Replace the default [`X25519Sealer`]
    pub fn sealer(mut self, sealer: impl Sealer + 'static) -> Self {
        self.sealer = Some(Arc::new(sealer));
        self
    }

    pub fn on_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shutdown_hook = Some(Arc::new(hook));
        self
    }

    /// Allow `M` to be decoded on arrival
    pub fn register<M: MessageKind>(mut self) -> Self {
        self.registry.register::<M>();
        self
    }

    pub fn build(self) -> Result<Communicator> {
        self.config.validate()?;

        let (uid, keys) = match (self.uid, self.keys) {
            (uid, Some(keys)) => (uid.unwrap_or_else(Uid::generate), keys),
            (uid, None) => {
                let identity = match &self.config.identity_file {
                    Some(path) => Identity::load_or_generate(path).map_err(|e| {
                        CommError::configuration(format!("{:#}", e), Some("identity_file"))
                    })?,
                    None => Identity::generate(),
                };
                let (loaded_uid, keys) = identity.into_parts();
                (uid.unwrap_or(loaded_uid), keys)
            }
        };

        if uid.is_nil() {
            return Err(CommError::configuration("Local uid must not be nil", Some("uid")));
        }

        let host = keys.host_info(uid);
        let workers = self.config.worker_threads;
        let inner = Arc::new(Inner {
            uid,
            host,
            keys,
            config: self.config,
            resolver: Resolver::new(),
            sealer: self.sealer.unwrap_or_else(|| Arc::new(X25519Sealer::new())),
            registry: self.registry,
            unsent: PendingSet::new("unsent"),
            unacknowledged: PendingSet::new("unacknowledged"),
            replies: ReplyBook::new(),
            pool: Mutex::new(None),
            shutdown_hook: self.shutdown_hook,
            stats: CommStats::default(),
            open: AtomicBool::new(true),
        });

        // Workers only hold a weak reference so dropping the last handle
        // tears the pool down.
        let weak = Arc::downgrade(&inner);
        let handler: DeliveryHandler = Arc::new(move |envelope: Envelope| match weak.upgrade() {
            Some(inner) => Communicator { inner }.deliver(envelope),
            None => Err(CommError::Closed),
        });
        let pool = ReceivePool::start(&format!("comm-{}", short_uid(uid)), workers, handler)?;
        *inner.pool.lock() = Some(pool);

        info!(uid = %uid, workers, kinds = inner.registry.kinds().count(), "Communicator started");
        Ok(Communicator { inner })
    }
}

fn short_uid(uid: Uid) -> String {
    uid.to_string().chars().take(8).collect()
}
