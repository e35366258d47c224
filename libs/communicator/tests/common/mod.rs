//! In-process cluster fixtures: nodes wired together with send callbacks
//! that feed the peer's receive pool directly.

#![allow(dead_code)]

use bytes::Bytes;
use communicator::{
    CommError, Communicator, CommunicatorConfig, Message, MessageId, MessageKind, OnSent, Result,
    SendCallback, Uid,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

static EXECUTED: Mutex<Vec<u64>> = parking_lot::const_mutex(Vec::new());

/// How many times a [`Ping`] carrying `tag` has executed, in any process
pub fn executions(tag: u64) -> usize {
    EXECUTED.lock().iter().filter(|t| **t == tag).count()
}

pub fn fresh_tag() -> u64 {
    rand::random()
}

/// Records its tag when executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub tag: u64,
}

impl Message for Ping {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        communicator::message::encode_body(self)
    }

    fn read(&self, _comm: &Communicator, _sender: Uid, _message_id: MessageId) -> Result<()> {
        EXECUTED.lock().push(self.tag);
        Ok(())
    }
}

impl MessageKind for Ping {
    const KIND: &'static str = "test.ping";
}

/// Replies with `value * 2` as little-endian bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Double {
    pub value: u64,
}

impl Message for Double {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        communicator::message::encode_body(self)
    }

    fn read(&self, comm: &Communicator, sender: Uid, message_id: MessageId) -> Result<()> {
        let doubled = self.value * 2;
        comm.reply(sender, message_id, doubled.to_le_bytes().to_vec(), false)?;
        Ok(())
    }
}

impl MessageKind for Double {
    const KIND: &'static str = "test.double";
}

pub fn config() -> CommunicatorConfig {
    CommunicatorConfig {
        worker_threads: 2,
        ..Default::default()
    }
}

pub fn node() -> Communicator {
    Communicator::builder(config())
        .register::<Ping>()
        .register::<Double>()
        .build()
        .unwrap()
}

/// Callback delivering straight into `to`'s receive pool
pub fn link(to: &Communicator) -> SendCallback {
    let weak = to.downgrade();
    Arc::new(move |bytes: Bytes, on_sent: OnSent| {
        let peer = weak
            .upgrade()
            .ok_or_else(|| CommError::transport("peer dropped"))?;
        peer.received_bytes(bytes)?;
        on_sent();
        Ok(())
    })
}

/// Like [`link`], also keeping a copy of every forwarded frame
pub fn tapped_link(to: &Communicator, tap: Arc<Mutex<Vec<Bytes>>>) -> SendCallback {
    let inner = link(to);
    Arc::new(move |bytes: Bytes, on_sent: OnSent| {
        tap.lock().push(bytes.clone());
        inner(bytes, on_sent)
    })
}

/// Frames parked until [`Gate::release`]
#[derive(Default)]
pub struct Gate {
    held: Mutex<Vec<(Bytes, OnSent)>>,
}

impl Gate {
    pub fn callback(self: &Arc<Self>) -> SendCallback {
        let gate = self.clone();
        Arc::new(move |bytes: Bytes, on_sent: OnSent| {
            gate.held.lock().push((bytes, on_sent));
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    /// Deliver everything held to `to` and report it sent
    pub fn release(&self, to: &Communicator) {
        let held: Vec<_> = self.held.lock().drain(..).collect();
        for (bytes, on_sent) in held {
            to.received_bytes(bytes).unwrap();
            on_sent();
        }
    }
}

/// Make `a` and `b` direct neighbours of each other
pub fn connect(a: &Communicator, b: &Communicator) {
    assert!(a.resolver().add_neighbour(b.host_info().clone(), link(b)));
    assert!(b.resolver().add_neighbour(a.host_info().clone(), link(a)));
}

/// Teach `from` to reach `to` through `router`
pub fn route_via(from: &Communicator, router: &Communicator, to: &Communicator) {
    assert!(from.resolver().add_routed_neighbour(
        to.host_info().clone(),
        router.uid(),
        link(router),
        1,
    ));
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);
