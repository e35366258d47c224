use super::{encode_body, Message, MessageKind};
use crate::communicator::Communicator;
use crate::host::Uid;
use crate::{MessageId, Result};
use serde::{Deserialize, Serialize};

/// Asks the receiving process to shut down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shutdown;

impl Message for Shutdown {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn encode(&self) -> Result<Vec<u8>> {
        encode_body(self)
    }

    fn read(&self, comm: &Communicator, _sender: Uid, _message_id: MessageId) -> Result<()> {
        comm.cluster_shutdown();
        Ok(())
    }
}

impl MessageKind for Shutdown {
    const KIND: &'static str = "comm.shutdown";
}
