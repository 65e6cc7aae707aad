//! Peer-to-peer replication
//!
//! Length-prefixed JSON messages over TCP, one thread per connection,
//! and a server that keeps the local ledger in step with its peers.

pub mod message;
pub mod peer;
pub mod server;

pub use message::{read_message, write_message, Handshake, Message, MessageType};
pub use peer::{InboundMessage, Peer};
pub use server::{Server, ServerConfig};
