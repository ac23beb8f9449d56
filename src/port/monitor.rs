//! Traffic monitoring.
//!
//! A port can tee every byte it moves into observation queues, either one
//! shared queue with both directions interleaved or one queue per direction.
//! The tee sits below the pushback buffer, so each wire byte is recorded
//! exactly once no matter how often it is unread and re-read.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Direction of a recorded byte range, relative to the local end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bytes received from the link.
    Rx,
    /// Bytes transmitted to the link.
    Tx,
}

/// One observed I/O operation: a contiguous byte range with its direction
/// and capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEntry {
    /// When the bytes crossed the port.
    pub at: DateTime<Utc>,
    /// Whether they were received or transmitted.
    pub direction: Direction,
    /// The bytes themselves.
    pub bytes: Vec<u8>,
}

/// Cheaply cloneable handle to an ordered queue of observed operations.
///
/// All clones share the same queue, so one handle can be kept by a test or
/// a protocol analyzer while its clone is wired into the port. A single
/// handle may serve both directions; entries then interleave in wire order.
#[derive(Debug, Clone, Default)]
pub struct MonitorQueue {
    entries: Arc<Mutex<VecDeque<MonitorEntry>>>,
}

impl MonitorQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation. Empty ranges are not recorded.
    pub(crate) fn record(&self, direction: Direction, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.entries.lock().push_back(MonitorEntry {
            at: Utc::now(),
            direction,
            bytes: bytes.to_vec(),
        });
    }

    /// Take the oldest entry, if any.
    pub fn pop(&self) -> Option<MonitorEntry> {
        self.entries.lock().pop_front()
    }

    /// Take every entry recorded so far, oldest first.
    pub fn drain(&self) -> Vec<MonitorEntry> {
        self.entries.lock().drain(..).collect()
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been recorded (or everything was drained).
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Discard all queued entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Concatenated payloads for one direction, in capture order, without
    /// consuming the queue.
    pub fn bytes(&self, direction: Direction) -> Vec<u8> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.direction == direction)
            .flat_map(|entry| entry.bytes.iter().copied())
            .collect()
    }
}

/// How a port wires its traffic into monitor queues.
#[derive(Debug, Clone, Default)]
pub enum MonitorMode {
    /// No monitoring; bytes are moved without recording.
    #[default]
    Off,
    /// The port creates one queue at open and records both directions into
    /// it, interleaved in wire order.
    Shared,
    /// The port creates two queues at open, one per direction.
    Split,
    /// Caller-supplied handles. Passing clones of the same queue for both
    /// directions reproduces [`MonitorMode::Shared`] over a queue the caller
    /// already holds.
    Custom { rx: MonitorQueue, tx: MonitorQueue },
}

/// Resolved queue pair for an open port. Either side may be absent when
/// monitoring is off.
#[derive(Debug, Clone, Default)]
pub(crate) struct MonitorBinding {
    pub rx: Option<MonitorQueue>,
    pub tx: Option<MonitorQueue>,
}

impl MonitorBinding {
    /// Build the queue pair an open port will record into.
    pub fn resolve(mode: &MonitorMode) -> Self {
        match mode {
            MonitorMode::Off => Self::default(),
            MonitorMode::Shared => {
                let queue = MonitorQueue::new();
                Self {
                    rx: Some(queue.clone()),
                    tx: Some(queue),
                }
            }
            MonitorMode::Split => Self {
                rx: Some(MonitorQueue::new()),
                tx: Some(MonitorQueue::new()),
            },
            MonitorMode::Custom { rx, tx } => Self {
                rx: Some(rx.clone()),
                tx: Some(tx.clone()),
            },
        }
    }

    pub fn record_rx(&self, bytes: &[u8]) {
        if let Some(queue) = &self.rx {
            queue.record(Direction::Rx, bytes);
        }
    }

    pub fn record_tx(&self, bytes: &[u8]) {
        if let Some(queue) = &self.tx {
            queue.record(Direction::Tx, bytes);
        }
    }
}
