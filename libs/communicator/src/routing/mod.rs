//! Routing Module
//!
//! Maps peer UIDs to their public keys and to one or more routes. A route
//! is an opaque send callback supplied by the transport layer, optionally
//! tagged with the intermediate router it goes through.

pub mod resolver;

pub use resolver::Resolver;

use crate::host::Uid;
use crate::Result;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Invoked by the transport once the bytes have actually left the process
pub type OnSent = Box<dyn FnOnce() + Send>;

/// Transport hook: hand over encoded envelope bytes, call `OnSent` when done
pub type SendCallback = Arc<dyn Fn(Bytes, OnSent) -> Result<()> + Send + Sync>;

/// One way of reaching a peer
#[derive(Clone)]
pub struct Route {
    send: SendCallback,
    router: Option<Uid>,
    hops: u32,
}

impl Route {
    /// Route to a directly connected neighbour
    pub fn direct(send: SendCallback) -> Self {
        Self {
            send,
            router: None,
            hops: 0,
        }
    }

    /// Route through an intermediate process
    pub fn via(router: Uid, send: SendCallback, hops: u32) -> Self {
        Self {
            send,
            router: Some(router),
            hops: hops.max(1),
        }
    }

    pub fn router(&self) -> Option<Uid> {
        self.router
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn is_direct(&self) -> bool {
        self.router.is_none()
    }

    /// Hand bytes to the transport
    pub fn send(&self, bytes: Bytes, on_sent: OnSent) -> Result<()> {
        (self.send)(bytes, on_sent)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("router", &self.router)
            .field("hops", &self.hops)
            .finish_non_exhaustive()
    }
}
