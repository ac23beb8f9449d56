//! TCP transports against real loopback sockets.
//!
//! Covers accept deadlines, bidirectional traffic, the single-shot nature
//! of accepted connections, and health-driven self-healing when the peer
//! goes away.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use commport::{Port, PortError, PortSettings, TcpClientTransport, TcpServer};

fn short_settings() -> PortSettings {
    PortSettings::new().with_timeout_millis(1_000)
}

#[test]
fn test_bind_assigns_an_ephemeral_port() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    assert_ne!(server.local_addr().port(), 0);
}

#[test]
fn test_accept_and_exchange() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    let mut client = TcpStream::connect(server.local_addr()).unwrap();

    let mut port = server
        .accept_within(Duration::from_secs(2), short_settings())
        .unwrap()
        .expect("a queued connection must be accepted");

    client.write_all(b"ping").unwrap();
    assert_eq!(port.read_exact_bytes(4).unwrap(), b"ping");

    port.write_bytes(b"pong").unwrap();
    port.flush_tx().unwrap();

    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");
}

#[test]
fn test_accept_gives_up_after_the_wait() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();

    let start = Instant::now();
    let accepted = server
        .accept_within(Duration::from_millis(80), short_settings())
        .unwrap();
    assert!(accepted.is_none());
    assert!(Instant::now() - start >= Duration::from_millis(80));
}

#[test]
fn test_client_transport_dials_and_talks() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr();

    let echo = thread::spawn(move || {
        let mut port = server
            .accept_within(Duration::from_secs(2), short_settings())
            .unwrap()
            .expect("the client should dial in");
        let line = port.read_exact_bytes(5).unwrap();
        port.write_bytes(&line).unwrap();
        port.flush_tx().unwrap();
        line
    });

    let mut port = Port::with_settings(TcpClientTransport::new(addr.to_string()), short_settings());
    port.open().unwrap();
    port.write_bytes(b"hello").unwrap();
    assert_eq!(port.read_exact_bytes(5).unwrap(), b"hello");

    assert_eq!(echo.join().unwrap(), b"hello");
}

#[test]
fn test_client_transport_reopens_with_a_fresh_connection() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    let addr = server.local_addr();

    let greeter = thread::spawn(move || {
        for greeting in [&b"first"[..], &b"again"[..]] {
            let mut port = server
                .accept_within(Duration::from_secs(2), short_settings())
                .unwrap()
                .expect("expected a dial-in");
            port.write_bytes(greeting).unwrap();
            port.flush_tx().unwrap();
            // Wait for the peer to hang up before accepting the next call.
            while port.is_open() {
                thread::sleep(Duration::from_millis(5));
            }
        }
    });

    let mut port = Port::with_settings(TcpClientTransport::new(addr.to_string()), short_settings());

    port.open().unwrap();
    assert_eq!(port.read_exact_bytes(5).unwrap(), b"first");
    port.close();

    port.open().unwrap();
    assert_eq!(port.read_exact_bytes(5).unwrap(), b"again");
    port.close();

    greeter.join().unwrap();
}

#[test]
fn test_peer_drop_self_heals_to_closed() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(server.local_addr()).unwrap();

    let mut port = server
        .accept_within(Duration::from_secs(2), short_settings())
        .unwrap()
        .unwrap();
    assert!(port.is_open());

    drop(client);
    thread::sleep(Duration::from_millis(50));

    // The health probe sees the hangup and the port closes itself.
    assert!(!port.is_open());

    // An accepted connection exists only once; reopening is refused.
    let err = port.open().unwrap_err();
    match err {
        PortError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::Unsupported),
        other => panic!("expected the single-shot refusal, got {other:?}"),
    }
}

#[test]
fn test_blocking_read_surfaces_the_native_timeout() {
    let server = TcpServer::bind("127.0.0.1:0").unwrap();
    // Keep the peer alive but silent.
    let _client = TcpStream::connect(server.local_addr()).unwrap();

    let mut port = server
        .accept_within(
            Duration::from_secs(2),
            PortSettings::new().with_timeout_millis(100),
        )
        .unwrap()
        .unwrap();

    let mut buf = [0u8; 4];
    let err = port.read_blocking_into(&mut buf).unwrap_err();
    match err {
        PortError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
        other => panic!("expected an I/O timeout, got {other:?}"),
    }
}

#[test]
fn test_dialing_a_closed_port_fails() {
    // Bind and drop to find a port that is very likely unused.
    let addr = {
        let server = TcpServer::bind("127.0.0.1:0").unwrap();
        server.local_addr()
    };

    let mut port = Port::with_settings(TcpClientTransport::new(addr.to_string()), short_settings());
    assert!(port.open().is_err());
    assert!(!port.is_open());
}
