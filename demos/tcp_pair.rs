//! Example running a TCP server port and client port in one process.
//!
//! The server side accepts one connection and answers PING with PONG;
//! the client side dials, sends, and reads the reply. Both ends go
//! through the same port engine.
//!
//! Run with: cargo run --example tcp_pair

use std::thread;
use std::time::Duration;

use commport::{Port, PortError, PortSettings, TcpClientTransport, TcpServer, Transport};

fn settings() -> PortSettings {
    PortSettings::new().with_timeout_millis(2_000)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== TCP Pair Example ===\n");

    let server = TcpServer::bind("127.0.0.1:0")?;
    let addr = server.local_addr();
    println!("1. Listening on {addr}");

    let responder = thread::spawn(move || -> Result<(), PortError> {
        let accepted = server.accept_within(Duration::from_secs(2), settings())?;
        let mut port = match accepted {
            Some(port) => port,
            None => return Ok(()),
        };
        if port.skip_until(b"PING\n")? {
            port.write_str("PONG\n")?;
            port.flush_tx()?;
        }
        port.close();
        Ok(())
    });

    let mut port = Port::with_settings(TcpClientTransport::new(addr.to_string()), settings());
    port.open()?;
    println!("2. Client connected via {}", port.transport().label());

    port.write_str("PING\n")?;
    port.flush_tx()?;

    let mut reply = Vec::new();
    port.collect_until(b'\n', &mut reply)?;
    println!("3. Reply: {}", String::from_utf8_lossy(&reply));
    port.close();

    match responder.join() {
        Ok(result) => result?,
        Err(_) => return Err("responder thread panicked".into()),
    }

    println!("\n=== Example complete ===");
    Ok(())
}
