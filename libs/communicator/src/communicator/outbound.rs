use super::Communicator;
use crate::envelope::Envelope;
use crate::host::{HostInfo, Uid};
use crate::message::{encode_frame, Message, Reply};
use crate::routing::{OnSent, Route};
use crate::{CommError, MessageId, Result};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

impl Communicator {
    /// Seal `message` for `recipient` and hand it to the recipient's route.
    ///
    /// Sending to the local UID executes the message synchronously and
    /// returns ID 0. With `acknowledge`, the returned ID stays pending until
    /// the recipient's receipt arrives.
    pub fn send(&self, message: &dyn Message, recipient: Uid, acknowledge: bool) -> Result<MessageId> {
        self.ensure_open()?;

        if recipient == self.uid() {
            return self.send_loopback(message).map(|_| 0);
        }

        let host = self.inner.resolver.host_info(recipient)?;
        let route = self.inner.resolver.route(recipient)?;
        let plaintext = encode_frame(message)?;
        self.send_sealed(&plaintext, &host, &route, acknowledge)
    }

    /// Send one message to several peers.
    ///
    /// Every recipient is resolved before anything is sent; if any cannot be
    /// resolved the call fails listing all of them. The message is encoded
    /// once and sealed separately per recipient.
    pub fn send_to_many(
        &self,
        message: &dyn Message,
        recipients: &[Uid],
        acknowledge: bool,
    ) -> Result<HashMap<Uid, MessageId>> {
        self.ensure_open()?;

        let mut seen = HashSet::with_capacity(recipients.len());
        let mut targets = Vec::with_capacity(recipients.len());
        let mut unresolved = Vec::new();
        let mut loopback = false;

        for &uid in recipients {
            if !seen.insert(uid) {
                continue;
            }
            if uid == self.uid() {
                loopback = true;
                continue;
            }
            match (self.inner.resolver.host_info(uid), self.inner.resolver.route(uid)) {
                (Ok(host), Ok(route)) => targets.push((host, route)),
                _ => unresolved.push(uid),
            }
        }

        if !unresolved.is_empty() {
            warn!(count = unresolved.len(), "Multi-send aborted, unresolved recipients");
            return Err(CommError::unknown_peers(unresolved));
        }

        let mut ids = HashMap::with_capacity(targets.len() + usize::from(loopback));
        if !targets.is_empty() {
            let plaintext = encode_frame(message)?;
            for (host, route) in &targets {
                let id = self.send_sealed(&plaintext, host, route, acknowledge)?;
                ids.insert(host.uid(), id);
            }
        }

        if loopback {
            self.send_loopback(message)?;
            ids.insert(self.uid(), 0);
        }

        Ok(ids)
    }

    /// Send to every peer the resolver knows. The local process is never
    /// among them.
    pub fn broadcast(&self, message: &dyn Message, acknowledge: bool) -> Result<HashMap<Uid, MessageId>> {
        let peers = self.inner.resolver.known_uids();
        debug!(peers = peers.len(), kind = message.kind(), "Broadcasting");
        self.send_to_many(message, &peers, acknowledge)
    }

    /// Answer message `message_id` from `to`
    pub fn reply(&self, to: Uid, message_id: MessageId, contents: Vec<u8>, is_error: bool) -> Result<MessageId> {
        let reply = Reply::new(self.uid(), message_id, contents, is_error);
        self.send(&reply, to, false)
    }

    /// Forward an envelope addressed elsewhere, appending the local UID to
    /// its trail. The sealed payload is passed on untouched.
    pub fn reroute(&self, envelope: Envelope) -> Result<Envelope> {
        self.ensure_open()?;

        let local = self.uid();
        if envelope.was_routed_by(local) {
            return Err(CommError::protocol(format!(
                "Routing loop: message {} already passed through {}",
                envelope.message_id(),
                local
            )));
        }
        if envelope.route().len() >= self.inner.config.max_route_length {
            return Err(CommError::protocol(format!(
                "Message {} exceeded {} routers",
                envelope.message_id(),
                self.inner.config.max_route_length
            )));
        }

        let destination = envelope.destination();
        let route = self.inner.resolver.route(destination)?;
        let forwarded = envelope.add_router(local);
        let bytes = forwarded.to_bytes()?;

        debug!(
            message_id = forwarded.message_id(),
            sender = %forwarded.sender(),
            destination = %destination,
            trail = forwarded.route().len(),
            "Rerouting"
        );
        route.send(bytes, Box::new(|| {}))?;
        self.inner.stats.record_rerouted();
        Ok(forwarded)
    }

    fn send_loopback(&self, message: &dyn Message) -> Result<()> {
        debug!(kind = message.kind(), "Loopback delivery");
        self.inner.stats.record_loopback();
        message.read(self, self.uid(), 0)
    }

    fn send_sealed(
        &self,
        plaintext: &[u8],
        host: &HostInfo,
        route: &Route,
        acknowledge: bool,
    ) -> Result<MessageId> {
        let sealed = self
            .inner
            .sealer
            .seal(plaintext, host.encrypt_key(), &self.inner.keys)
            .map_err(|source| CommError::Seal { source })?;

        if sealed.len() > self.inner.config.max_payload_size as usize {
            return Err(CommError::protocol(format!(
                "Sealed payload of {} bytes exceeds limit of {}",
                sealed.len(),
                self.inner.config.max_payload_size
            )));
        }

        let envelope = Envelope::new(self.uid(), host.uid(), sealed, acknowledge);
        if envelope.is_null() {
            return Err(CommError::protocol("Refusing to send null envelope"));
        }
        let bytes = envelope.to_bytes()?;

        self.dispatch(envelope.message_id(), host.uid(), bytes, route, acknowledge)?;
        Ok(envelope.message_id())
    }

    fn dispatch(
        &self,
        id: MessageId,
        peer: Uid,
        bytes: Bytes,
        route: &Route,
        acknowledge: bool,
    ) -> Result<()> {
        // Registered before the callback runs: a synchronous transport may
        // fire on_sent (or the receipt may arrive) before send returns.
        self.inner.unsent.insert(id, peer);
        if acknowledge {
            self.inner.unacknowledged.insert(id, peer);
        }

        let weak = Arc::downgrade(&self.inner);
        let on_sent: OnSent = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unsent.remove(id);
            }
        });

        let size = bytes.len();
        if let Err(e) = route.send(bytes, on_sent) {
            self.inner.unsent.remove(id);
            self.inner.unacknowledged.remove(id);
            self.inner.stats.record_send_error();
            warn!(message_id = id, peer = %peer, error = %e, "Send callback failed");
            return Err(e);
        }

        self.inner.stats.record_sent(size);
        debug!(message_id = id, peer = %peer, via = ?route.router(), size, "Sent");
        Ok(())
    }
}
