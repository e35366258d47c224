use super::Communicator;
use crate::envelope::Envelope;
use crate::host::Uid;
use crate::message::{Acknowledge, Reply};
use crate::pool::Inbound;
use crate::{CommError, MessageId, Result};
use bytes::Bytes;
use tracing::{debug, warn};

impl Communicator {
    /// Queue raw transport bytes for a receive worker. Never blocks.
    pub fn received_bytes(&self, bytes: Bytes) -> Result<()> {
        self.enqueue(Inbound::Bytes(bytes))
    }

    /// Queue a decoded envelope for a receive worker. Never blocks.
    pub fn received_envelope(&self, envelope: Envelope) -> Result<()> {
        self.enqueue(Inbound::Envelope(envelope))
    }

    fn enqueue(&self, item: Inbound) -> Result<()> {
        self.ensure_open()?;
        match self.inner.pool.lock().as_ref() {
            Some(pool) if pool.enqueue(item) => Ok(()),
            _ => Err(CommError::Closed),
        }
    }

    /// Process one envelope on the calling thread.
    ///
    /// Envelopes addressed elsewhere are rerouted without being unsealed.
    /// Otherwise the payload is unsealed with the sender's verify key,
    /// decoded, acknowledged if requested, and executed.
    pub fn deliver(&self, envelope: Envelope) -> Result<()> {
        self.ensure_open()?;

        if envelope.is_null() {
            return Err(CommError::protocol("Null envelope delivered"));
        }

        if !envelope.is_recipient(self.uid()) {
            return self.reroute(envelope).map(|_| ());
        }

        let result = self.open_and_read(&envelope);
        if result.is_err() {
            self.inner.stats.record_delivery_error();
        }
        result
    }

    fn open_and_read(&self, envelope: &Envelope) -> Result<()> {
        let sender = envelope.sender();
        let message_id = envelope.message_id();
        let host = self.inner.resolver.host_info(sender)?;

        let plaintext = self
            .inner
            .sealer
            .unseal(envelope.payload(), &self.inner.keys, host.verify_key())
            .map_err(|source| CommError::Unseal { peer: sender, source })?;
        let message = self.inner.registry.decode(&plaintext)?;
        self.inner.stats.record_received(envelope.payload().len());

        debug!(message_id, sender = %sender, kind = message.kind(), "Delivering");

        if envelope.acknowledge_requested() {
            if let Err(e) = self.send(&Acknowledge::new(message_id), sender, false) {
                warn!(message_id, sender = %sender, error = %e, "Failed to acknowledge");
            }
        }

        message.read(self, sender, message_id)
    }

    /// Clear `message_id` from the unacknowledged set if `sender` is the
    /// peer it was sent to
    pub(crate) fn acknowledge_from(&self, sender: Uid, message_id: MessageId) {
        if self.inner.unacknowledged.remove_from(message_id, sender) {
            debug!(message_id, sender = %sender, "Acknowledged");
        }
    }

    /// Store a reply and wake everyone waiting for it
    pub fn deliver_reply(&self, message_id: MessageId, reply: Reply) {
        debug!(message_id, sender = %reply.sender(), "Reply stored");
        self.inner.replies.post(message_id, reply);
    }
}
