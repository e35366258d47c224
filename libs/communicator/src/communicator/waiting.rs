use super::Communicator;
use crate::host::Uid;
use crate::message::Reply;
use crate::{CommError, MessageId, Result};
use std::time::{Duration, Instant};

impl Communicator {
    /// True once the peer has acknowledged `id` (or if it never asked to)
    pub fn message_acknowledged(&self, id: MessageId) -> bool {
        !self.inner.unacknowledged.contains(id)
    }

    pub fn all_messages_acknowledged(&self, ids: &[MessageId]) -> bool {
        !self.inner.unacknowledged.contains_any(ids)
    }

    /// Block until `id` is acknowledged. Fails if the communicator ends first.
    pub fn await_acknowledgement(&self, id: MessageId) -> Result<()> {
        self.inner.unacknowledged.wait_cleared(id)
    }

    /// Returns false if `timeout` passes (or the communicator ends) first
    pub fn await_acknowledgement_timeout(&self, id: MessageId, timeout: Duration) -> bool {
        self.inner.unacknowledged.wait_cleared_for(id, timeout)
    }

    /// True once the transport has reported `id` as sent
    pub fn message_sent(&self, id: MessageId) -> bool {
        !self.inner.unsent.contains(id)
    }

    pub fn all_messages_sent(&self, ids: &[MessageId]) -> bool {
        !self.inner.unsent.contains_any(ids)
    }

    pub fn await_sent(&self, id: MessageId) -> Result<()> {
        self.inner.unsent.wait_cleared(id)
    }

    pub fn await_sent_timeout(&self, id: MessageId, timeout: Duration) -> bool {
        self.inner.unsent.wait_cleared_for(id, timeout)
    }

    /// Block until `host` answers message `id`, consuming the reply.
    ///
    /// A second waiter on the same ID keeps waiting after the first one
    /// consumes the reply, until the communicator ends; use
    /// [`try_await_reply`](Self::try_await_reply) where that can happen.
    pub fn await_reply(&self, host: Uid, id: MessageId) -> Result<Reply> {
        match self.inner.replies.take(host, id, None)? {
            Some(reply) => Ok(reply),
            None => Err(CommError::Closed),
        }
    }

    /// Like [`await_reply`](Self::await_reply) but gives up after `timeout`
    pub fn try_await_reply(&self, host: Uid, id: MessageId, timeout: Duration) -> Result<Option<Reply>> {
        self.inner.replies.take(host, id, Some(Instant::now() + timeout))
    }

    /// Replies stored but not yet consumed
    /// Messages the transport has not yet reported sent
    pub fn pending_sends(&self) -> usize {
        self.inner.unsent.len()
    }

    /// Messages still waiting for the peer's receipt
    pub fn pending_acknowledgements(&self) -> usize {
        self.inner.unacknowledged.len()
    }

    pub fn pending_replies(&self) -> usize {
        self.inner.replies.len()
    }
}
