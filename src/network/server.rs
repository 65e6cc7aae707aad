use crate::config::Config;
use crate::core::{Block, CancelToken, Ledger, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::message::{Handshake, Message, MessageType};
use crate::network::peer::{InboundMessage, Peer};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

type PeerMap = Arc<RwLock<HashMap<String, Arc<Peer>>>>;
type MiningSlot = Arc<Mutex<Option<CancelToken>>>;

/// Settings the replication server needs from the node config
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Advertised in handshakes until the listener is bound
    pub listen_port: u16,
    pub protocol_version: u32,
    pub read_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_frame_len: u32,
    pub validate_incoming_blocks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::from(&Config::default())
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        ServerConfig {
            listen_addr: config.node_addr.clone(),
            listen_port: config.listen_port().unwrap_or(0),
            protocol_version: config.protocol_version,
            read_timeout: config.read_timeout(),
            handshake_timeout: config.handshake_timeout(),
            max_frame_len: config.max_frame_len,
            validate_incoming_blocks: config.validate_incoming_blocks,
        }
    }
}

// Everything a connection handler needs to turn a socket into a registered peer
#[derive(Clone)]
struct Handshaker {
    config: ServerConfig,
    local_addr: Arc<OnceCell<SocketAddr>>,
    new_peer: Sender<Arc<Peer>>,
    dead_peer: Sender<Arc<Peer>>,
    inbound: Sender<InboundMessage>,
}

impl Handshaker {
    fn our_handshake(&self, addr_to: &str) -> Handshake {
        let (addr_from, listen_port) = match self.local_addr.get() {
            Some(addr) => (addr.to_string(), addr.port()),
            None => (self.config.listen_addr.clone(), self.config.listen_port),
        };
        Handshake {
            version: self.config.protocol_version,
            addr_from,
            addr_to: addr_to.to_string(),
            listen_port,
        }
    }

    /// Send our handshake, wait for theirs, then publish the peer.
    fn establish(&self, stream: TcpStream, addr_to: &str) -> Result<Arc<Peer>> {
        let peer = Peer::new(
            stream,
            self.config.max_frame_len,
            self.inbound.clone(),
            self.dead_peer.clone(),
        )?;

        let result = peer
            .set_read_timeout(Some(self.config.handshake_timeout))
            .and_then(|_| peer.send_handshake(&self.our_handshake(addr_to)))
            .and_then(|_| peer.receive_handshake());

        let theirs = match result {
            Ok(theirs) => theirs,
            Err(e) => {
                peer.close();
                return Err(e);
            }
        };

        if theirs.version != self.config.protocol_version {
            warn!(
                "Peer {} speaks protocol version {} (ours is {})",
                peer.addr(),
                theirs.version,
                self.config.protocol_version
            );
        }
        info!(
            "Handshake with {} complete (they listen on {})",
            peer.addr(),
            theirs.addr_from
        );

        self.new_peer
            .send(Arc::clone(&peer))
            .map_err(|_| BlockchainError::Network("Peer registry has stopped".to_string()))?;
        Ok(peer)
    }
}

struct Receivers {
    new_peer: Receiver<Arc<Peer>>,
    dead_peer: Receiver<Arc<Peer>>,
    inbound: Receiver<InboundMessage>,
}

struct ServerInner {
    ledger: Ledger,
    handshaker: Handshaker,
    peers: PeerMap,
    receivers: Mutex<Option<Receivers>>,
    running: Arc<AtomicBool>,
    mining: MiningSlot,
}

/// Peer lifecycle and message routing for one node
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(ledger: Ledger, config: ServerConfig) -> Self {
        let (new_peer_tx, new_peer_rx) = unbounded();
        let (dead_peer_tx, dead_peer_rx) = unbounded();
        let (inbound_tx, inbound_rx) = unbounded();

        let handshaker = Handshaker {
            config,
            local_addr: Arc::new(OnceCell::new()),
            new_peer: new_peer_tx,
            dead_peer: dead_peer_tx,
            inbound: inbound_tx,
        };

        Self {
            inner: Arc::new(ServerInner {
                ledger,
                handshaker,
                peers: Arc::new(RwLock::new(HashMap::new())),
                receivers: Mutex::new(Some(Receivers {
                    new_peer: new_peer_rx,
                    dead_peer: dead_peer_rx,
                    inbound: inbound_rx,
                })),
                running: Arc::new(AtomicBool::new(false)),
                mining: Arc::new(Mutex::new(None)),
            }),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Bind the listener and start the accept, registry and dispatch threads.
    /// Returns the bound address (useful when listening on port 0).
    pub fn start(&self) -> Result<SocketAddr> {
        let receivers = self
            .inner
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BlockchainError::Network("Server already started".to_string()))?;

        let config = &self.inner.handshaker.config;
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            BlockchainError::Network(format!("Failed to bind to {}: {e}", config.listen_addr))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to read local address: {e}")))?;
        let _ = self.inner.handshaker.local_addr.set(local_addr);
        self.inner.running.store(true, Ordering::SeqCst);

        info!("P2P server listening on {local_addr}");

        let registry = Registry {
            ledger: self.inner.ledger.clone(),
            peers: Arc::clone(&self.inner.peers),
            read_timeout: config.read_timeout,
        };
        thread::spawn(move || registry.run(receivers.new_peer, receivers.dead_peer));

        let dispatcher = Dispatcher {
            ledger: self.inner.ledger.clone(),
            peers: Arc::clone(&self.inner.peers),
            validate_blocks: config.validate_incoming_blocks,
            mining: Arc::clone(&self.inner.mining),
        };
        thread::spawn(move || dispatcher.run(receivers.inbound));

        let handshaker = self.inner.handshaker.clone();
        let running = Arc::clone(&self.inner.running);
        thread::spawn(move || accept_loop(listener, handshaker, running));

        Ok(local_addr)
    }

    /// Dial `address`, handshake, and hand the peer to the registry without
    /// waiting for it to be registered.
    pub fn connect_to_peer(&self, address: &str) -> Result<()> {
        let stream = TcpStream::connect(address)
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {address}: {e}")))?;
        self.inner.handshaker.establish(stream, address)?;
        Ok(())
    }

    /// Send `message` to every registered peer concurrently. Returns how many
    /// sends succeeded; failures are logged and do not stop the others.
    pub fn broadcast(&self, message: &Message) -> usize {
        let peers: Vec<Arc<Peer>> = self
            .inner
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        thread::scope(|scope| {
            let sends: Vec<_> = peers
                .iter()
                .map(|peer| {
                    scope.spawn(move || match peer.send(message) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(
                                "Failed to send {} to {}: {e}",
                                message.kind_str(),
                                peer.addr()
                            );
                            false
                        }
                    })
                })
                .collect();
            sends
                .into_iter()
                .map(|send| send.join())
                .filter(|joined| matches!(joined, Ok(true)))
                .count()
        })
    }

    /// Broadcast a locally produced block
    pub fn announce_block(&self, block: &Block) -> Result<usize> {
        Ok(self.broadcast(&Message::block(block)?))
    }

    /// A fresh cancel token for the next mining attempt. The dispatcher
    /// cancels it when a peer changes the ledger.
    pub fn mining_token(&self) -> CancelToken {
        let token = CancelToken::new();
        *self
            .inner
            .mining
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    pub fn peer_count(&self) -> usize {
        self.inner
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn peer_addrs(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self
            .inner
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        addrs.sort();
        addrs
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.handshaker.local_addr.get().copied()
    }

    /// Close the listening socket. Established peers stay connected.
    pub fn stop(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Wake the blocked accept so the loop sees the flag and drops the listener
        if let Some(addr) = self.local_addr() {
            let _ = TcpStream::connect(addr);
        }
        info!("P2P server stopped");
        Ok(())
    }
}

fn accept_loop(listener: TcpListener, handshaker: Handshaker, running: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let handshaker = handshaker.clone();
                thread::spawn(move || {
                    let addr_to = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_default();
                    if let Err(e) = handshaker.establish(stream, &addr_to) {
                        warn!("Handshake with {addr_to} failed: {e}");
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {e}");
            }
        }
    }
    debug!("Accept loop finished");
}

// Sole writer of the peer map
struct Registry {
    ledger: Ledger,
    peers: PeerMap,
    read_timeout: Duration,
}

impl Registry {
    fn run(self, new_peer: Receiver<Arc<Peer>>, dead_peer: Receiver<Arc<Peer>>) {
        loop {
            select! {
                recv(new_peer) -> peer => match peer {
                    Ok(peer) => self.register(peer),
                    Err(_) => break,
                },
                recv(dead_peer) -> peer => match peer {
                    Ok(peer) => self.unregister(&peer),
                    Err(_) => break,
                },
            }
        }
        // Drop our references so listen loops own the remaining connections
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Peer registry finished");
    }

    fn register(&self, peer: Arc<Peer>) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.addr().to_string(), Arc::clone(&peer));
        info!("New peer connected: {}", peer.addr());

        if let Some(head) = self.ledger.head() {
            match Message::latest_block(&head).and_then(|message| peer.send(&message)) {
                Ok(()) => debug!("Sent head #{} to {}", head.get_index(), peer.addr()),
                Err(e) => warn!("Failed to send latest block to {}: {e}", peer.addr()),
            }
        }

        let read_timeout = self.read_timeout;
        thread::spawn(move || peer.listen(read_timeout));
    }

    fn unregister(&self, peer: &Arc<Peer>) {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        // A reconnect may already have replaced this entry
        if peers
            .get(peer.addr())
            .is_some_and(|current| Arc::ptr_eq(current, peer))
        {
            peers.remove(peer.addr());
            info!("Peer disconnected: {}", peer.addr());
        }
    }
}

// Sole consumer of inbound messages
struct Dispatcher {
    ledger: Ledger,
    peers: PeerMap,
    validate_blocks: bool,
    mining: MiningSlot,
}

impl Dispatcher {
    fn run(self, inbound: Receiver<InboundMessage>) {
        for InboundMessage { from, message } in inbound.iter() {
            self.dispatch(&from, &message);
        }
        debug!("Message dispatcher finished");
    }

    fn dispatch(&self, from: &str, message: &Message) {
        let Some(kind) = message.kind() else {
            warn!("Unknown message type {} from {from}", message.kind_str());
            return;
        };
        debug!("Dispatching {kind} from {from}");

        let result = match kind {
            MessageType::Block => self.handle_block(from, message),
            MessageType::LatestBlock => self.handle_latest_block(from, message),
            MessageType::GetBlocks => self.handle_get_blocks(from, message),
            MessageType::Inventory => self.handle_inventory(from, message),
            MessageType::Transaction => self.handle_transaction(from, message),
            MessageType::Handshake => {
                debug!("Ignoring repeated handshake from {from}");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Failed to handle {kind} from {from}: {e}");
        }
    }

    fn handle_block(&self, from: &str, message: &Message) -> Result<()> {
        let block = message.payload_as::<Block>()?;
        self.accept_block(from, block)
    }

    fn accept_block(&self, from: &str, block: Block) -> Result<()> {
        let index = block.get_index();
        if self.validate_blocks {
            if !ProofOfWork::validate(&block) {
                warn!("Rejected block #{index} from {from}: proof-of-work does not verify");
                return Ok(());
            }
            match self.ledger.append_checked(block) {
                Ok(()) => {}
                Err(e @ BlockchainError::ChainInvalid { .. }) => {
                    warn!("Rejected block #{index} from {from}: {e}");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            self.ledger.append_existing(block)?;
        }

        info!("Received and added block #{index} from {from}");
        self.cancel_mining();
        Ok(())
    }

    fn handle_latest_block(&self, from: &str, message: &Message) -> Result<()> {
        let theirs = message.payload_as::<Block>()?;
        let Some(ours) = self.ledger.head() else {
            return Ok(());
        };

        if ours.get_index().checked_add(1) == Some(theirs.get_index())
            && theirs.get_previous_hash() == ours.get_hash()
        {
            self.accept_block(from, theirs)
        } else if theirs.get_index() > ours.get_index() {
            info!(
                "Peer {from} is ahead (#{} vs #{}); requesting its chain",
                theirs.get_index(),
                ours.get_index()
            );
            self.reply(from, &Message::get_blocks(self.ledger.length())?)
        } else {
            debug!("Peer {from} head #{} is not ahead of ours", theirs.get_index());
            Ok(())
        }
    }

    fn handle_get_blocks(&self, from: &str, message: &Message) -> Result<()> {
        let known = message
            .payload()
            .get("known_length")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let blocks = self.ledger.snapshot();
        debug!("Sending {} blocks to {from} (it holds {known})", blocks.len());
        self.reply(from, &Message::inventory(&blocks)?)
    }

    fn handle_inventory(&self, from: &str, message: &Message) -> Result<()> {
        let candidate = message.payload_as::<Vec<Block>>()?;
        let length = candidate.len();
        if self.ledger.replace_chain(candidate)? {
            info!("Adopted chain of length {length} from {from}");
            self.cancel_mining();
        }
        Ok(())
    }

    fn handle_transaction(&self, from: &str, message: &Message) -> Result<()> {
        let tx = message.payload_as::<Transaction>()?;
        info!(
            "Received transaction {} from {from} ({} inputs, {} outputs)",
            tx.get_id(),
            tx.get_inputs().len(),
            tx.get_outputs().len()
        );
        Ok(())
    }

    fn reply(&self, to: &str, message: &Message) -> Result<()> {
        let peer = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(to)
            .cloned()
            .ok_or_else(|| BlockchainError::Network(format!("Peer {to} is not registered")))?;
        peer.send(message)
    }

    fn cancel_mining(&self) {
        if let Some(token) = self
            .mining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            token.cancel();
        }
    }
}
