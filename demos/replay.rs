//! Example demonstrating file replay and the scan vocabulary.
//!
//! A recorded device session is replayed through the port engine, the
//! interesting frame is pulled out with pattern and sentinel scans, and
//! everything written goes to a capture file. No hardware required.
//!
//! Run with: cargo run --example replay

use std::env;

use commport::{FileTransport, Port, PortSettings, ScanResult};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== File Replay Example ===\n");

    // A captured exchange: boot noise, then one framed reading.
    let recording = b"boot v2.1\r\nready\r\n*DATA:23.6C\r\nidle\r\n".to_vec();
    let capture = env::temp_dir().join("commport-replay-capture.bin");

    let mut port = Port::with_settings(
        FileTransport::from_bytes(recording, &capture),
        PortSettings::new().with_timeout_millis(500),
    );
    port.open()?;
    println!("1. Replaying {} bytes of recorded traffic", port.available()?);

    // Skip the banner, then collect the frame up to its terminator.
    if port.skip_until(b"*DATA:")? {
        let mut value = Vec::new();
        match port.collect_until(b'\r', &mut value)? {
            ScanResult::Found(n) => {
                println!("2. Frame found: {} ({n} bytes)", String::from_utf8_lossy(&value));
            }
            other => println!("2. Frame incomplete: {other:?}"),
        }
    } else {
        println!("2. No data frame in the recording");
    }

    // Put a byte back and read it again.
    port.unread_str("X")?;
    println!("3. After unread, next byte is {:?}", port.next_byte()? as char);

    // Writes land in the capture file for later inspection.
    port.write_str("ACK\r\n")?;
    port.flush_tx()?;
    port.close();
    println!("4. Wrote capture to {}", capture.display());

    println!("\n=== Example complete ===");
    Ok(())
}
