//! Peer directory: UID -> public keys and routes

use super::{Route, SendCallback};
use crate::config::PeerConfig;
use crate::host::{HostInfo, Uid};
use crate::{CommError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Tables {
    hosts: HashMap<Uid, HostInfo>,
    routes: HashMap<Uid, Vec<Route>>,
}

/// Thread-safe peer directory.
///
/// The local process is never registered here, so enumerating known peers
/// never includes the owner.
#[derive(Default)]
pub struct Resolver {
    tables: RwLock<Tables>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directly connected peer. Returns false for a null host.
    pub fn add_neighbour(&self, host: HostInfo, send: SendCallback) -> bool {
        if host.is_null() {
            warn!("Refusing to register null host as neighbour");
            return false;
        }
        self.insert(host, Route::direct(send))
    }

    /// Register a peer reached through `router`
    pub fn add_routed_neighbour(
        &self,
        host: HostInfo,
        router: Uid,
        send: SendCallback,
        hops: u32,
    ) -> bool {
        if host.is_null() || router.is_nil() || router == host.uid() {
            warn!(peer = %host.uid(), router = %router, "Refusing invalid routed neighbour");
            return false;
        }
        self.insert(host, Route::via(router, send, hops))
    }

    fn insert(&self, host: HostInfo, route: Route) -> bool {
        let uid = host.uid();
        let mut tables = self.tables.write();
        tables.hosts.insert(uid, host);
        debug!(peer = %uid, router = ?route.router(), hops = route.hops(), "Route added");
        // Kept in registration order; hop counts are informational only
        tables.routes.entry(uid).or_default().push(route);
        true
    }

    /// Forget a peer and all of its routes
    pub fn remove_neighbour(&self, uid: Uid) -> bool {
        let mut tables = self.tables.write();
        let had_host = tables.hosts.remove(&uid).is_some();
        let had_routes = tables.routes.remove(&uid).is_some();
        if had_host || had_routes {
            debug!(peer = %uid, "Neighbour removed");
        }
        had_host || had_routes
    }

    pub fn host_info(&self, uid: Uid) -> Result<HostInfo> {
        self.tables
            .read()
            .hosts
            .get(&uid)
            .cloned()
            .ok_or_else(|| CommError::unknown_peer(uid))
    }

    /// First registered route to `uid`
    pub fn route(&self, uid: Uid) -> Result<Route> {
        let tables = self.tables.read();
        match tables.routes.get(&uid).and_then(|routes| routes.first()) {
            Some(route) => Ok(route.clone()),
            None if tables.hosts.contains_key(&uid) => Err(CommError::no_route(uid)),
            None => Err(CommError::unknown_peer(uid)),
        }
    }

    /// All routes to `uid`, in registration order
    pub fn routes(&self, uid: Uid) -> Vec<Route> {
        self.tables
            .read()
            .routes
            .get(&uid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn knows(&self, uid: Uid) -> bool {
        self.tables.read().hosts.contains_key(&uid)
    }

    /// UIDs of every peer with registered keys
    pub fn known_uids(&self) -> Vec<Uid> {
        let mut uids: Vec<Uid> = self.tables.read().hosts.keys().copied().collect();
        uids.sort();
        uids
    }

    pub fn len(&self) -> usize {
        self.tables.read().hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register configured peers, asking `connector` for each peer's (or its
    /// router's) send callback. Peers the connector cannot reach are skipped.
    pub fn install_static_routes<F>(&self, peers: &[PeerConfig], connector: F) -> Result<usize>
    where
        F: Fn(&PeerConfig) -> Option<SendCallback>,
    {
        let mut installed = 0;
        for peer in peers {
            let host = peer.host_info()?;
            let Some(send) = connector(peer) else {
                warn!(peer = %peer.uid, "No transport for configured peer");
                continue;
            };
            let added = match peer.router {
                Some(router) => self.add_routed_neighbour(host, router, send, peer.hops),
                None => self.add_neighbour(host, send),
            };
            if added {
                installed += 1;
            }
        }
        info!(installed, configured = peers.len(), "Static routes installed");
        Ok(installed)
    }
}
