//! Monitor wiring across its modes.
//!
//! The tee sits below the pushback buffer: every wire byte is recorded
//! exactly once, in wire order, regardless of how the caller re-reads it.

mod common;

use commport::{Direction, MonitorEntry, MonitorMode, MonitorQueue, PortSettings};
use common::open_mock_with;
use pretty_assertions::assert_eq;

fn settings(monitor: MonitorMode) -> PortSettings {
    PortSettings::new()
        .with_timeout_millis(500)
        .with_monitor(monitor)
}

#[test]
fn test_shared_queue_interleaves_in_wire_order() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Shared));

    port.write_bytes(b"ping").unwrap();
    mock.feed(b"pong");
    assert_eq!(port.read_exact_bytes(4).unwrap(), b"pong".to_vec());

    let queue = port.rx_monitor().expect("shared wiring has an rx handle");
    let entries = queue.drain();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].direction, Direction::Tx);
    assert_eq!(entries[0].bytes, b"ping".to_vec());
    assert_eq!(entries[1].direction, Direction::Rx);
    assert_eq!(entries[1].bytes, b"pong".to_vec());

    // Both handles point at the same queue, so it is now empty on the tx
    // side too.
    assert!(port.tx_monitor().unwrap().is_empty());
}

#[test]
fn test_split_queues_separate_directions() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Split));

    port.write_bytes(b"cmd").unwrap();
    mock.feed(b"resp");
    assert_eq!(port.read_exact_bytes(4).unwrap(), b"resp".to_vec());

    let rx = port.rx_monitor().unwrap();
    let tx = port.tx_monitor().unwrap();
    assert_eq!(rx.bytes(Direction::Rx), b"resp".to_vec());
    assert_eq!(rx.bytes(Direction::Tx), Vec::<u8>::new());
    assert_eq!(tx.bytes(Direction::Tx), b"cmd".to_vec());
    assert_eq!(tx.bytes(Direction::Rx), Vec::<u8>::new());
}

#[test]
fn test_custom_queues_stay_with_the_caller() {
    let rx = MonitorQueue::new();
    let tx = MonitorQueue::new();
    let (mut port, mock) = open_mock_with(
        "mon",
        settings(MonitorMode::Custom {
            rx: rx.clone(),
            tx: tx.clone(),
        }),
    );

    port.write_bytes(b"out").unwrap();
    mock.feed(b"in");
    assert_eq!(port.read_exact_bytes(2).unwrap(), b"in".to_vec());

    // The caller's handles observe the traffic and outlive the port.
    port.close();
    assert_eq!(rx.bytes(Direction::Rx), b"in".to_vec());
    assert_eq!(tx.bytes(Direction::Tx), b"out".to_vec());
}

#[test]
fn test_off_records_nothing() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Off));

    port.write_bytes(b"silent").unwrap();
    mock.feed(b"quiet");
    assert_eq!(port.read_exact_bytes(5).unwrap(), b"quiet".to_vec());

    assert!(port.rx_monitor().is_none());
    assert!(port.tx_monitor().is_none());
}

#[test]
fn test_wire_bytes_recorded_once_despite_unread_cycles() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Shared));
    mock.feed(b"xy");

    assert_eq!(port.read_exact_bytes(2).unwrap(), b"xy".to_vec());
    port.unread_byte(b'y').unwrap();
    assert_eq!(port.read_exact_bytes(1).unwrap(), b"y".to_vec());

    // 'y' crossed the wire once, so it is recorded once.
    let queue = port.rx_monitor().unwrap();
    assert_eq!(queue.bytes(Direction::Rx), b"xy".to_vec());
}

#[test]
fn test_handles_taken_while_open_survive_a_close() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Shared));
    mock.feed(b"data");
    assert_eq!(port.read_exact_bytes(4).unwrap(), b"data".to_vec());

    let queue = port.rx_monitor().unwrap();
    port.close();
    assert!(port.rx_monitor().is_none());
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_transcript_round_trips_through_json() {
    let (mut port, mock) = open_mock_with("mon", settings(MonitorMode::Shared));

    port.write_bytes(b"\x01\x02").unwrap();
    mock.feed(b"ok");
    assert_eq!(port.read_exact_bytes(2).unwrap(), b"ok".to_vec());

    let entries = port.rx_monitor().unwrap().drain();
    let json = serde_json::to_string(&entries).unwrap();
    let back: Vec<MonitorEntry> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entries);
}
