//! Replication integration tests
//!
//! Runs real servers on loopback ports and checks handshakes, peer
//! registration, chain sync and block propagation end to end.

use coubcore::network::{read_message, write_message, Handshake, Message, MessageType};
use coubcore::{Ledger, ProofOfWork, Server, ServerConfig};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

const WAIT: Duration = Duration::from_secs(10);
const MAX_FRAME: u32 = 1024 * 1024;

fn config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        read_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

fn node() -> (Server, Ledger, TempDir) {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(dir.path().join("ledger")).unwrap();
    let server = Server::new(ledger.clone(), config());
    server.start().unwrap();
    (server, ledger, dir)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

fn addr(server: &Server) -> String {
    server.local_addr().unwrap().to_string()
}

#[test]
fn test_connect_registers_both_sides() {
    let (a, _ledger_a, _dir_a) = node();
    let (b, _ledger_b, _dir_b) = node();

    b.connect_to_peer(&addr(&a)).unwrap();

    assert!(wait_until(|| a.peer_count() == 1 && b.peer_count() == 1));
    assert_eq!(b.peer_addrs(), vec![addr(&a)]);
}

#[test]
fn test_connect_to_closed_port_fails() {
    let (a, _ledger_a, _dir_a) = node();
    let (b, _ledger_b, _dir_b) = node();
    let target = addr(&b);
    b.stop().unwrap();
    // Give the accept loop a moment to drop its listener
    assert!(wait_until(|| TcpStream::connect(&target).is_err()));

    assert!(a.connect_to_peer(&target).is_err());
    assert_eq!(a.peer_count(), 0);
}

#[test]
fn test_new_peer_receives_latest_block() {
    let (a, ledger_a, _dir_a) = node();
    let mut stream = TcpStream::connect(addr(&a)).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();

    let theirs = read_message(&mut stream, MAX_FRAME).unwrap();
    assert_eq!(theirs.kind(), Some(MessageType::Handshake));
    let handshake = theirs.payload_as::<Handshake>().unwrap();
    assert_eq!(handshake.version, 1);
    assert_eq!(handshake.addr_from, addr(&a));

    let ours = Handshake {
        version: 1,
        addr_from: "127.0.0.1:1".to_string(),
        addr_to: addr(&a),
        listen_port: 1,
    };
    write_message(&mut stream, &Message::handshake(&ours).unwrap()).unwrap();

    let latest = read_message(&mut stream, MAX_FRAME).unwrap();
    assert_eq!(latest.kind(), Some(MessageType::LatestBlock));
    assert_eq!(
        latest.payload_as::<coubcore::Block>().unwrap(),
        ledger_a.head().unwrap()
    );
}

#[test]
fn test_wrong_first_message_is_not_registered() {
    let (a, _ledger_a, _dir_a) = node();
    let mut stream = TcpStream::connect(addr(&a)).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();

    read_message(&mut stream, MAX_FRAME).unwrap();
    write_message(&mut stream, &Message::get_blocks(0).unwrap()).unwrap();

    // The server closes the connection instead of registering it
    assert!(read_message(&mut stream, MAX_FRAME).is_err());
    assert_eq!(a.peer_count(), 0);
}

#[test]
fn test_lagging_node_catches_up_on_connect() {
    let (a, ledger_a, _dir_a) = node();
    let (b, ledger_b, _dir_b) = node();
    for i in 0..4 {
        ProofOfWork::mine_next(&ledger_a, format!("a{i}"))
            .unwrap()
            .unwrap();
    }

    b.connect_to_peer(&addr(&a)).unwrap();

    assert!(wait_until(|| ledger_b.length() == 5));
    assert_eq!(ledger_b.snapshot(), ledger_a.snapshot());
    assert!(ledger_b.is_valid());
}

#[test]
fn test_announced_block_reaches_every_peer() {
    let (hub, ledger_hub, _dir_hub) = node();
    let (b, ledger_b, _dir_b) = node();
    let (c, ledger_c, _dir_c) = node();

    // Spokes adopt the hub's chain first so they share its genesis
    ProofOfWork::mine_next(&ledger_hub, "seed").unwrap().unwrap();
    b.connect_to_peer(&addr(&hub)).unwrap();
    c.connect_to_peer(&addr(&hub)).unwrap();
    assert!(wait_until(|| hub.peer_count() == 2));
    assert!(wait_until(|| ledger_b.length() == 2 && ledger_c.length() == 2));

    let block = ProofOfWork::mine_next(&ledger_hub, "news").unwrap().unwrap();
    assert_eq!(hub.announce_block(&block).unwrap(), 2);

    assert!(wait_until(|| ledger_b.length() == 3 && ledger_c.length() == 3));
    assert_eq!(ledger_b.head().unwrap(), block);
    assert_eq!(ledger_c.head().unwrap(), block);
}

#[test]
fn test_disconnected_peer_is_removed() {
    let (a, _ledger_a, _dir_a) = node();
    let mut stream = TcpStream::connect(addr(&a)).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();

    read_message(&mut stream, MAX_FRAME).unwrap();
    let ours = Handshake {
        version: 1,
        addr_from: "127.0.0.1:1".to_string(),
        addr_to: addr(&a),
        listen_port: 1,
    };
    write_message(&mut stream, &Message::handshake(&ours).unwrap()).unwrap();
    assert!(wait_until(|| a.peer_count() == 1));

    drop(stream);
    assert!(wait_until(|| a.peer_count() == 0));
}

#[test]
fn test_silent_peer_is_dropped_after_handshake_timeout() {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(dir.path().join("ledger")).unwrap();
    let server = Server::new(
        ledger,
        ServerConfig {
            handshake_timeout: Duration::from_millis(300),
            ..config()
        },
    );
    server.start().unwrap();

    let mut stream = TcpStream::connect(addr(&server)).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let theirs = read_message(&mut stream, MAX_FRAME).unwrap();
    assert_eq!(theirs.kind(), Some(MessageType::Handshake));

    // Never answer; the server gives up and closes the socket
    assert!(read_message(&mut stream, MAX_FRAME).is_err());
    assert_eq!(server.peer_count(), 0);
}

