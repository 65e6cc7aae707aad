//! Wire protocol
//!
//! Every message travels as one frame: a 4-byte big-endian body length
//! followed by the JSON envelope `{"type": ..., "payload": ...}`.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};

const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Handshake,
    Block,
    Transaction,
    GetBlocks,
    Inventory,
    LatestBlock,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Handshake => "handshake",
            MessageType::Block => "block",
            MessageType::Transaction => "transaction",
            MessageType::GetBlocks => "get_blocks",
            MessageType::Inventory => "inventory",
            MessageType::LatestBlock => "latest_block",
        }
    }

    pub fn parse(kind: &str) -> Option<MessageType> {
        match kind {
            "handshake" => Some(MessageType::Handshake),
            "block" => Some(MessageType::Block),
            "transaction" => Some(MessageType::Transaction),
            "get_blocks" => Some(MessageType::GetBlocks),
            "inventory" => Some(MessageType::Inventory),
            "latest_block" => Some(MessageType::LatestBlock),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First message each side sends on a new connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub version: u32,
    pub addr_from: String,
    pub addr_to: String,
    pub listen_port: u16,
}

/// Tagged envelope. Unknown types decode fine and are left to the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Message {
    pub fn new<T: Serialize>(kind: MessageType, payload: &T) -> Result<Message> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            BlockchainError::Serialization(format!("Failed to encode {kind} payload: {e}"))
        })?;
        Ok(Message {
            kind: kind.as_str().to_string(),
            payload,
        })
    }

    pub fn handshake(handshake: &Handshake) -> Result<Message> {
        Message::new(MessageType::Handshake, handshake)
    }

    pub fn block(block: &Block) -> Result<Message> {
        Message::new(MessageType::Block, block)
    }

    pub fn latest_block(block: &Block) -> Result<Message> {
        Message::new(MessageType::LatestBlock, block)
    }

    /// Request for the sender's chain, starting after `known_length` blocks
    pub fn get_blocks(known_length: usize) -> Result<Message> {
        Message::new(
            MessageType::GetBlocks,
            &serde_json::json!({ "known_length": known_length }),
        )
    }

    pub fn inventory(blocks: &[Block]) -> Result<Message> {
        Message::new(MessageType::Inventory, &blocks)
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::parse(&self.kind)
    }

    pub fn kind_str(&self) -> &str {
        self.kind.as_str()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Decode the payload as `T`
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| {
            BlockchainError::Decode(format!("Malformed {} payload: {e}", self.kind))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| BlockchainError::Serialization(format!("Failed to encode message: {e}")))
    }

    pub fn decode(body: &[u8]) -> Result<Message> {
        serde_json::from_slice(body)
            .map_err(|e| BlockchainError::Decode(format!("Malformed message body: {e}")))
    }
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len()).map_err(|_| {
        BlockchainError::Protocol(format!("Frame of {} bytes is too large", body.len()))
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Block until one full frame body is read
pub fn read_frame<R: Read>(reader: &mut R, max_len: u32) -> Result<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header)?;

    let len = u32::from_be_bytes(header);
    if len > max_len {
        return Err(BlockchainError::Protocol(format!(
            "Frame length {len} exceeds limit {max_len}"
        )));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    write_frame(writer, &message.encode()?)
}

pub fn read_message<R: Read>(reader: &mut R, max_len: u32) -> Result<Message> {
    Message::decode(&read_frame(reader, max_len)?)
}
