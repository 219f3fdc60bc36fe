//! Graceful shutdown with sessions blocked mid-transfer.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use petal_core::encode_length;

use common::{start_server, wait_until};

/// Opens a connection that declares `declared` bytes but sends only a few.
fn stalled_client(addr: std::net::SocketAddr, declared: u64) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(&encode_length(declared)).unwrap();
    stream.write_all(&[0xFF, 0xD8, 0xFF]).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

#[test]
fn test_stop_releases_sessions_blocked_in_payload() {
    // Arrange – three sessions stuck waiting for payload bytes
    let server = start_server();
    let clients: Vec<TcpStream> = (0..3)
        .map(|_| stalled_client(server.local_addr(), 100_000))
        .collect();
    assert!(wait_until(Duration::from_secs(5), || server.active_sessions() == 3));
    // let each session consume its header and block on the payload
    thread::sleep(Duration::from_millis(200));

    // Act
    let started = Instant::now();
    server.stop();

    // Assert
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!server.is_running());
    assert_eq!(server.active_sessions(), 0);
    assert_eq!(server.stats().connection_lost, 3);
    for mut client in clients {
        let mut buf = Vec::new();
        let read = client.read_to_end(&mut buf);
        assert!(buf.is_empty(), "no result expected, got {buf:?} ({read:?})");
    }
}

#[test]
fn test_stop_counts_idle_connection_as_lost_not_protocol_error() {
    // Arrange – a client that connects and never sends the header
    let server = start_server();
    let mut idle = TcpStream::connect(server.local_addr()).unwrap();
    idle.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    assert!(wait_until(Duration::from_secs(5), || server.active_sessions() == 1));

    // Act
    server.stop();

    // Assert
    let stats = server.stats();
    assert_eq!(stats.connection_lost, 1, "stats: {stats:?}");
    assert_eq!(stats.protocol, 0, "stats: {stats:?}");
    let mut buf = Vec::new();
    let _ = idle.read_to_end(&mut buf);
    assert!(buf.is_empty());
}

#[test]
fn test_concurrent_stops_all_return_after_sessions_are_joined() {
    // Arrange
    let server = Arc::new(start_server());
    let _clients: Vec<TcpStream> = (0..2)
        .map(|_| stalled_client(server.local_addr(), 50_000))
        .collect();
    assert!(wait_until(Duration::from_secs(5), || server.active_sessions() == 2));
    thread::sleep(Duration::from_millis(200));

    // Act – every caller reads the stats as soon as its stop() returns
    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                server.stop();
                (server.active_sessions(), server.stats().connection_lost)
            })
        })
        .collect();

    // Assert
    for stopper in stoppers {
        assert_eq!(stopper.join().unwrap(), (0, 2));
    }
}

#[test]
fn test_second_stop_is_a_noop() {
    let server = start_server();
    let _client = stalled_client(server.local_addr(), 10);
    assert!(wait_until(Duration::from_secs(5), || server.active_sessions() == 1));
    thread::sleep(Duration::from_millis(200));

    server.stop();
    let after_first = server.stats();
    server.stop();
    server.wait();

    assert_eq!(server.stats(), after_first);
    assert_eq!(after_first.connection_lost, 1);
}

#[test]
fn test_wait_returns_after_stop_from_another_thread() {
    let server = Arc::new(start_server());
    let stopper = Arc::clone(&server);

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stopper.stop();
    });
    server.wait();

    handle.join().unwrap();
    assert!(!server.is_running());
}
