use crate::error::{BlockchainError, Result};
use crate::network::message::{read_message, write_message, Handshake, Message, MessageType};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A decoded message tagged with the address of the peer that sent it
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: String,
    pub message: Message,
}

/// One live connection. Reads and writes go through separate handles so a
/// broadcast never waits behind a blocked read.
pub struct Peer {
    addr: String,
    writer: Mutex<TcpStream>,
    reader: Mutex<TcpStream>,
    max_frame_len: u32,
    inbound: Sender<InboundMessage>,
    dead: Sender<Arc<Peer>>,
}

impl Peer {
    pub fn new(
        stream: TcpStream,
        max_frame_len: u32,
        inbound: Sender<InboundMessage>,
        dead: Sender<Arc<Peer>>,
    ) -> Result<Arc<Peer>> {
        let addr = stream
            .peer_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to get peer address: {e}")))?
            .to_string();
        let reader = stream
            .try_clone()
            .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;

        Ok(Arc::new(Peer {
            addr,
            writer: Mutex::new(stream),
            reader: Mutex::new(reader),
            max_frame_len,
            inbound,
            dead,
        }))
    }

    /// Remote address; the peer's identity in the registry
    pub fn addr(&self) -> &str {
        self.addr.as_str()
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_message(&mut *writer, message)
    }

    pub fn receive(&self) -> Result<Message> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        read_message(&mut *reader, self.max_frame_len)
    }

    /// `None` blocks reads indefinitely
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        reader
            .set_read_timeout(timeout)
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))
    }

    pub fn send_handshake(&self, handshake: &Handshake) -> Result<()> {
        self.send(&Message::handshake(handshake)?)
    }

    pub fn receive_handshake(&self) -> Result<Handshake> {
        let message = self.receive()?;
        if message.kind() != Some(MessageType::Handshake) {
            return Err(BlockchainError::Protocol(format!(
                "Expected handshake message, got {}",
                message.kind_str()
            )));
        }
        message.payload_as::<Handshake>()
    }

    /// Forward every decoded frame to the inbound channel until the
    /// connection fails, then close it and report this peer as dead.
    pub fn listen(self: Arc<Self>, read_timeout: Duration) {
        if let Err(e) = self.set_read_timeout(Some(read_timeout)) {
            warn!("Peer {}: {e}", self.addr);
        } else {
            loop {
                match self.receive() {
                    Ok(message) => {
                        debug!("Peer {} sent {}", self.addr, message.kind_str());
                        let inbound = InboundMessage {
                            from: self.addr.clone(),
                            message,
                        };
                        if self.inbound.send(inbound).is_err() {
                            // Dispatcher is gone; nothing left to deliver to
                            break;
                        }
                    }
                    // The frame was consumed whole, so the stream is still in sync
                    Err(e @ BlockchainError::Decode(_)) => {
                        warn!("Peer {}: skipping frame: {e}", self.addr);
                    }
                    Err(e) => {
                        info!("Peer {} connection ended: {e}", self.addr);
                        break;
                    }
                }
            }
        }

        self.close();
        let _ = self.dead.send(Arc::clone(&self));
    }

    pub fn close(&self) {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // Already-closed sockets report NotConnected; nothing to do then
        let _ = writer.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::net::TcpListener;
    use std::thread;

    const MAX: u32 = 1024 * 1024;

    // A connected (client, server) socket pair on loopback
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn handshake(from: &str) -> Handshake {
        Handshake {
            version: 1,
            addr_from: from.to_string(),
            addr_to: "remote".to_string(),
            listen_port: 0,
        }
    }

    #[test]
    fn test_handshake_exchange() {
        let (client, server) = socket_pair();
        let (inbound_tx, _inbound_rx) = unbounded();
        let (dead_tx, _dead_rx) = unbounded();

        let a = Peer::new(client, MAX, inbound_tx.clone(), dead_tx.clone()).unwrap();
        let b = Peer::new(server, MAX, inbound_tx, dead_tx).unwrap();

        a.send_handshake(&handshake("a")).unwrap();
        let received = b.receive_handshake().unwrap();
        assert_eq!(received.addr_from, "a");
    }

    #[test]
    fn test_non_handshake_is_protocol_error() {
        let (client, server) = socket_pair();
        let (inbound_tx, _inbound_rx) = unbounded();
        let (dead_tx, _dead_rx) = unbounded();

        let a = Peer::new(client, MAX, inbound_tx.clone(), dead_tx.clone()).unwrap();
        let b = Peer::new(server, MAX, inbound_tx, dead_tx).unwrap();

        a.send(&Message::get_blocks(1).unwrap()).unwrap();
        assert!(matches!(
            b.receive_handshake(),
            Err(BlockchainError::Protocol(_))
        ));
    }

    #[test]
    fn test_listen_forwards_then_reports_dead() {
        let (client, server) = socket_pair();
        let (inbound_tx, inbound_rx) = unbounded();
        let (dead_tx, dead_rx) = unbounded();

        let sender = Peer::new(client, MAX, inbound_tx.clone(), dead_tx.clone()).unwrap();
        let listener = Peer::new(server, MAX, inbound_tx, dead_tx).unwrap();
        let listen_addr = listener.addr().to_string();

        let handle = thread::spawn(move || listener.listen(Duration::from_secs(5)));

        sender.send(&Message::get_blocks(3).unwrap()).unwrap();
        let inbound = inbound_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(inbound.message.kind(), Some(MessageType::GetBlocks));
        assert_eq!(inbound.from, listen_addr);

        sender.close();
        let dead = dead_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(dead.addr(), listen_addr);
        handle.join().unwrap();
    }

    #[test]
    fn test_listen_skips_malformed_frames() {
        let (mut client, server) = socket_pair();
        let (inbound_tx, inbound_rx) = unbounded();
        let (dead_tx, _dead_rx) = unbounded();

        let listener = Peer::new(server, MAX, inbound_tx, dead_tx).unwrap();
        thread::spawn(move || listener.listen(Duration::from_secs(5)));

        crate::network::message::write_frame(&mut client, b"garbage").unwrap();
        write_message(&mut client, &Message::get_blocks(0).unwrap()).unwrap();

        let inbound = inbound_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(inbound.message.kind(), Some(MessageType::GetBlocks));
    }

    #[test]
    fn test_silent_peer_times_out() {
        let (_client, server) = socket_pair();
        let (inbound_tx, _inbound_rx) = unbounded();
        let (dead_tx, dead_rx) = unbounded();

        let listener = Peer::new(server, MAX, inbound_tx, dead_tx).unwrap();
        thread::spawn(move || listener.listen(Duration::from_millis(200)));

        assert!(dead_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
