//! Cluster Communicator
//!
//! Messaging layer for a cluster of cooperating processes. Each process owns
//! one [`Communicator`]: it seals messages for a peer, wraps them in an
//! [`Envelope`] and hands the bytes to a transport callback; on the way in it
//! reroutes envelopes addressed elsewhere, and unseals, decodes and executes
//! the ones addressed to it on a fixed pool of receive workers.
//!
//! Transports are not part of this crate. They plug in as send callbacks
//! registered with the [`Resolver`] and feed inbound bytes to
//! [`Communicator::received_bytes`].

pub mod communicator;
pub mod config;
pub mod envelope;
pub mod error;
pub mod host;
pub mod logging;
pub mod message;
pub mod pool;
pub mod routing;
pub mod security;
pub mod stats;

mod tracking;

// Re-export commonly used types
pub use communicator::{Communicator, CommunicatorBuilder, ShutdownHook, WeakCommunicator};
pub use config::{CommunicatorConfig, PeerConfig};
pub use envelope::{Envelope, WireFormat};
pub use error::{CommError, Result, SealError};
pub use host::{HostInfo, KeyBytes, Uid, KEY_LEN};
pub use message::{Acknowledge, Message, MessageKind, MessageRegistry, Reply, Shutdown};
pub use routing::{OnSent, Resolver, Route, SendCallback};
pub use security::{Identity, LocalKeys, Sealer, X25519Sealer};
pub use stats::StatsSnapshot;

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide message identifier. 0 marks a loopback delivery.
pub type MessageId = u64;

static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique message ID
pub fn generate_message_id() -> MessageId {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

pub const DEFAULT_WORKER_THREADS: usize = 4;
