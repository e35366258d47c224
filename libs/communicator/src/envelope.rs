//! Message Envelope
//!
//! Routable wire wrapper around a sealed payload. An envelope carries who
//! sent it, who it is for, the relays that forwarded it so far and whether
//! the sender wants an acknowledgement. The payload itself is opaque: relays
//! never look inside it.
//!
//! ## Wire layout (little-endian)
//!
//! ```text
//! magic[4] version[1] flags[1] reserved[2] body_len[4]
//! body:
//!   sender[16] destination[16] message_id[8]
//!   relay_count[2] relays[16 * relay_count]
//!   payload_len[4] payload[payload_len]
//! crc32[4]   (over everything before it)
//! ```

use crate::host::Uid;
use crate::{generate_message_id, CommError, MessageId, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read, Write};

/// Wire format constants
pub struct WireFormat;

impl WireFormat {
    /// Protocol version
    pub const VERSION: u8 = 1;
    /// Magic bytes for message validation
    pub const MAGIC: &'static [u8; 4] = b"CLCM";
    /// Fixed header size in bytes
    pub const HEADER_SIZE: usize = 12;
    /// Trailing checksum size in bytes
    pub const CHECKSUM_SIZE: usize = 4;
    /// Maximum sealed payload size (16MB)
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
    /// Maximum number of relays an envelope may record
    pub const MAX_ROUTE_LENGTH: usize = 255;

    const FLAG_ACKNOWLEDGE: u8 = 0b0000_0001;
}

/// Sealed message plus its routing metadata
///
/// Immutable apart from [`Envelope::add_router`], which hands back a new
/// envelope with one more trail entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: Uid,
    destination: Uid,
    payload: Bytes,
    message_id: MessageId,
    routed: Vec<Uid>,
    acknowledge: bool,
}

impl Envelope {
    /// Wrap a sealed payload, assigning the next process-wide message ID.
    ///
    /// A nil sender or destination, or an empty payload, yields the null
    /// envelope instead; check [`Envelope::is_null`].
    pub fn new(sender: Uid, destination: Uid, sealed: impl Into<Bytes>, acknowledge: bool) -> Self {
        let payload = sealed.into();
        if sender.is_nil() || destination.is_nil() || payload.is_empty() {
            return Self::null();
        }

        Self {
            sender,
            destination,
            payload,
            message_id: generate_message_id(),
            routed: Vec::new(),
            acknowledge,
        }
    }

    /// The invalid envelope
    pub fn null() -> Self {
        Self {
            sender: Uid::nil(),
            destination: Uid::nil(),
            payload: Bytes::new(),
            message_id: 0,
            routed: Vec::new(),
            acknowledge: false,
        }
    }

    pub fn is_null(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn sender(&self) -> Uid {
        self.sender
    }

    pub fn destination(&self) -> Uid {
        self.destination
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn acknowledge_requested(&self) -> bool {
        self.acknowledge
    }

    pub fn is_recipient(&self, uid: Uid) -> bool {
        self.destination == uid
    }

    /// True for the original sender and for every relay on the trail
    pub fn was_routed_by(&self, uid: Uid) -> bool {
        self.sender == uid || self.routed.contains(&uid)
    }

    /// Relays that forwarded this envelope, oldest first
    pub fn route(&self) -> &[Uid] {
        &self.routed
    }

    /// Copy of this envelope with `uid` appended to the relay trail
    pub fn add_router(&self, uid: Uid) -> Self {
        let mut routed = Vec::with_capacity(self.routed.len() + 1);
        routed.extend_from_slice(&self.routed);
        routed.push(uid);

        Self {
            routed,
            ..self.clone()
        }
    }

    /// Serialize envelope to wire format
    pub fn to_bytes(&self) -> Result<Bytes> {
        if self.is_null() {
            return Err(CommError::protocol("Cannot encode a null envelope"));
        }
        if self.payload.len() > WireFormat::MAX_PAYLOAD_SIZE as usize {
            return Err(CommError::protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload.len(),
                WireFormat::MAX_PAYLOAD_SIZE
            )));
        }
        if self.routed.len() > WireFormat::MAX_ROUTE_LENGTH {
            return Err(CommError::protocol(format!(
                "Route length {} exceeds maximum {}",
                self.routed.len(),
                WireFormat::MAX_ROUTE_LENGTH
            )));
        }

        let body_len = 16 + 16 + 8 + 2 + 16 * self.routed.len() + 4 + self.payload.len();
        let mut buffer =
            Vec::with_capacity(WireFormat::HEADER_SIZE + body_len + WireFormat::CHECKSUM_SIZE);

        // Fixed header (12 bytes)
        buffer.write_all(WireFormat::MAGIC)?;
        buffer.write_u8(WireFormat::VERSION)?;
        buffer.write_u8(self.flags())?;
        buffer.write_u16::<LittleEndian>(0)?; // reserved
        buffer.write_u32::<LittleEndian>(body_len as u32)?;

        // Body
        buffer.write_all(self.sender.as_bytes())?;
        buffer.write_all(self.destination.as_bytes())?;
        buffer.write_u64::<LittleEndian>(self.message_id)?;
        buffer.write_u16::<LittleEndian>(self.routed.len() as u16)?;
        for relay in &self.routed {
            buffer.write_all(relay.as_bytes())?;
        }
        buffer.write_u32::<LittleEndian>(self.payload.len() as u32)?;
        buffer.write_all(&self.payload)?;

        let checksum = crc32fast::hash(&buffer);
        buffer.write_u32::<LittleEndian>(checksum)?;

        Ok(Bytes::from(buffer))
    }

    /// Deserialize envelope from wire format
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < WireFormat::HEADER_SIZE + WireFormat::CHECKSUM_SIZE {
            return Err(CommError::protocol("Envelope too short"));
        }

        // Verify checksum first
        let checksum_pos = data.len() - WireFormat::CHECKSUM_SIZE;
        let expected_checksum = u32::from_le_bytes([
            data[checksum_pos],
            data[checksum_pos + 1],
            data[checksum_pos + 2],
            data[checksum_pos + 3],
        ]);
        if crc32fast::hash(&data[..checksum_pos]) != expected_checksum {
            return Err(CommError::protocol("Checksum mismatch"));
        }

        let mut cursor = Cursor::new(&data[..checksum_pos]);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != *WireFormat::MAGIC {
            return Err(CommError::protocol("Invalid magic bytes"));
        }

        let version = cursor.read_u8()?;
        if version != WireFormat::VERSION {
            return Err(CommError::protocol(format!(
                "Unsupported protocol version: {}",
                version
            )));
        }

        // Unknown flag bits are ignored
        let flags = cursor.read_u8()?;
        let _reserved = cursor.read_u16::<LittleEndian>()?;
        let body_len = cursor.read_u32::<LittleEndian>()? as usize;
        if body_len != checksum_pos - WireFormat::HEADER_SIZE {
            return Err(CommError::protocol(format!(
                "Body length mismatch: header says {}, found {}",
                body_len,
                checksum_pos - WireFormat::HEADER_SIZE
            )));
        }

        let sender = Self::read_uid(&mut cursor)?;
        let destination = Self::read_uid(&mut cursor)?;
        let message_id = cursor.read_u64::<LittleEndian>()?;

        let relay_count = cursor.read_u16::<LittleEndian>()? as usize;
        if relay_count > WireFormat::MAX_ROUTE_LENGTH {
            return Err(CommError::protocol(format!(
                "Route length {} exceeds maximum {}",
                relay_count,
                WireFormat::MAX_ROUTE_LENGTH
            )));
        }
        let mut routed = Vec::with_capacity(relay_count);
        for _ in 0..relay_count {
            routed.push(Self::read_uid(&mut cursor)?);
        }

        let payload_len = cursor.read_u32::<LittleEndian>()?;
        if payload_len > WireFormat::MAX_PAYLOAD_SIZE {
            return Err(CommError::protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload_len,
                WireFormat::MAX_PAYLOAD_SIZE
            )));
        }
        let start = cursor.position() as usize;
        let end = start + payload_len as usize;
        if end != checksum_pos {
            return Err(CommError::protocol("Payload length mismatch"));
        }
        let payload = Bytes::copy_from_slice(&data[start..end]);

        if sender.is_nil() || destination.is_nil() || payload.is_empty() {
            return Err(CommError::protocol("Decoded a null envelope"));
        }

        Ok(Self {
            sender,
            destination,
            payload,
            message_id,
            routed,
            acknowledge: flags & WireFormat::FLAG_ACKNOWLEDGE != 0,
        })
    }

    fn flags(&self) -> u8 {
        if self.acknowledge {
            WireFormat::FLAG_ACKNOWLEDGE
        } else {
            0
        }
    }

    fn read_uid(cursor: &mut Cursor<&[u8]>) -> Result<Uid> {
        let mut bytes = [0u8; 16];
        cursor.read_exact(&mut bytes)?;
        Ok(Uid::from_bytes(bytes))
    }
}
