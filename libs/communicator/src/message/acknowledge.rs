use super::{encode_body, Message, MessageKind};
use crate::communicator::Communicator;
use crate::host::Uid;
use crate::{MessageId, Result};
use serde::{Deserialize, Serialize};

/// Receipt sent back automatically when an envelope asks for one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledge {
    message_id: MessageId,
}

impl Acknowledge {
    pub fn new(message_id: MessageId) -> Self {
        Self { message_id }
    }

    /// ID of the acknowledged message, as assigned by its sender
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

impl Message for Acknowledge {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        encode_body(self)
    }

    fn read(&self, comm: &Communicator, sender: Uid, _message_id: MessageId) -> Result<()> {
        comm.acknowledge_from(sender, self.message_id);
        Ok(())
    }
}

impl MessageKind for Acknowledge {
    const KIND: &'static str = "comm.acknowledge";
}
