//! Message Types
//!
//! A message is something that executes on arrival: the receiving process
//! decodes it and calls [`Message::read`] with the verified sender and the
//! envelope's message ID. Concrete variants are reconstructed from a
//! type-tagged frame, so every variant a process may receive must be
//! registered in its [`MessageRegistry`].
//!
//! Plaintext frame (before sealing): bincode of `{kind, body}`, where
//! `body` is the variant's own bincode encoding.

mod acknowledge;
mod reply;
mod shutdown;

pub use acknowledge::Acknowledge;
pub use reply::Reply;
pub use shutdown::Shutdown;

use crate::communicator::Communicator;
use crate::host::Uid;
use crate::{CommError, MessageId, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Executable payload carried inside a sealed envelope
pub trait Message: Send + Sync + fmt::Debug {
    /// Type discriminator written into the frame
    fn kind(&self) -> &'static str;

    /// Encode the variant's own fields
    fn encode(&self) -> Result<Vec<u8>>;

    /// Execute the message's effect on the receiving process
    fn read(&self, comm: &Communicator, sender: Uid, message_id: MessageId) -> Result<()>;
}

/// A concrete message type that can be registered for decoding
pub trait MessageKind: Message + DeserializeOwned + Sized + 'static {
    const KIND: &'static str;

    fn decode(body: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(body)?)
    }
}

/// Bincode-encode a message body
pub fn encode_body<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

#[derive(Serialize, Deserialize)]
struct Frame {
    kind: String,
    body: Vec<u8>,
}

/// Serialize a message into its type-tagged plaintext frame
pub fn encode_frame(message: &dyn Message) -> Result<Vec<u8>> {
    let frame = Frame {
        kind: message.kind().to_string(),
        body: message.encode()?,
    };
    encode_body(&frame)
}

type Decoder = fn(&[u8]) -> Result<Box<dyn Message>>;

fn decode_as<M: MessageKind>(body: &[u8]) -> Result<Box<dyn Message>> {
    Ok(Box::new(M::decode(body)?))
}

/// Maps frame discriminators back to concrete message types
#[derive(Clone)]
pub struct MessageRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl MessageRegistry {
    /// Registry holding the built-in variants
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };
        registry.register::<Reply>();
        registry.register::<Shutdown>();
        registry.register::<Acknowledge>();
        registry
    }

    /// Register `M`; returns false if the kind was already taken
    pub fn register<M: MessageKind>(&mut self) -> bool {
        self.decoders.insert(M::KIND, decode_as::<M>).is_none()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Rebuild the concrete message from a plaintext frame
    pub fn decode(&self, plaintext: &[u8]) -> Result<Box<dyn Message>> {
        let frame: Frame = bincode::deserialize(plaintext)?;
        let decoder = self.decoders.get(frame.kind.as_str()).ok_or_else(|| {
            CommError::protocol(format!("Unregistered message kind '{}'", frame.kind))
        })?;
        decoder(&frame.body)
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}
