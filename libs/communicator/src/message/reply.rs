use super::{encode_body, Message, MessageKind};
use crate::communicator::Communicator;
use crate::host::Uid;
use crate::{CommError, MessageId, Result};
use serde::{Deserialize, Serialize};

/// Result (or error) answering an earlier message, correlated by that
/// message's ID.
///
/// A reply is consumed exactly once by
/// [`Communicator::await_reply`] / [`Communicator::try_await_reply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    sender: Uid,
    message_id: MessageId,
    contents: Vec<u8>,
    is_error: bool,
}

impl Reply {
    pub fn new(sender: Uid, message_id: MessageId, contents: Vec<u8>, is_error: bool) -> Self {
        Self {
            sender,
            message_id,
            contents,
            is_error,
        }
    }

    pub fn ok(sender: Uid, message_id: MessageId, contents: Vec<u8>) -> Self {
        Self::new(sender, message_id, contents, false)
    }

    pub fn error(sender: Uid, message_id: MessageId, contents: Vec<u8>) -> Self {
        Self::new(sender, message_id, contents, true)
    }

    /// Process that produced the reply
    pub fn sender(&self) -> Uid {
        self.sender
    }

    /// ID of the message being answered
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn into_contents(self) -> Vec<u8> {
        self.contents
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

impl Message for Reply {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        encode_body(self)
    }

    fn read(&self, comm: &Communicator, sender: Uid, _message_id: MessageId) -> Result<()> {
        // The recorded sender is part of the sealed payload; the delivering
        // sender was verified by unsealing. They must agree.
        if sender != self.sender {
            return Err(CommError::SignatureMismatch {
                expected: self.sender,
                actual: sender,
                message_id: self.message_id,
            });
        }

        comm.deliver_reply(self.message_id, self.clone());
        Ok(())
    }
}

impl MessageKind for Reply {
    const KIND: &'static str = "comm.reply";
}
