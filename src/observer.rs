//! Observers receive what the peers see. They never influence the protocol.

use crate::{log, NodeId};
use color_print::cformat;
use parking_lot::Mutex;
use serde::Serialize;
use std::{sync::Arc, time::Instant};

/// Why a peer left the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownCause {
    /// An inbound edge reached end of stream.
    Closed,
    /// The coordinator asked the peer to stop.
    Terminated,
    /// An I/O failure or a malformed record.
    Failed,
}

/// Lifecycle and protocol events reported by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PeerEvent {
    Started,
    TokenAcquired,
    SlotEmpty,
    Injected { destination: NodeId, len: usize },
    InputRejected { destination: NodeId },
    TokenReleased,
    Shutdown { cause: ShutdownCause },
}

pub trait Observer: Send + Sync {
    fn on_delivered(&self, node: NodeId, body: &[u8]);
    fn on_forwarding(&self, node: NodeId, destination: Option<NodeId>);
    fn on_state_change(&self, node: NodeId, event: &PeerEvent);
}

/// Observer that prints every event as a coloured console line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn on_delivered(&self, node: NodeId, body: &[u8]) {
        let text = String::from_utf8_lossy(body);
        log::info(&cformat!(
            "<bold>[node {node}]</bold> message is <green, bold>for me</green, bold>: received {} bytes \"{text}\"",
            body.len()
        ));
    }

    fn on_forwarding(&self, node: NodeId, destination: Option<NodeId>) {
        match destination {
            Some(dest) if dest != node => log::debug(&cformat!(
                "<bold>[node {node}]</bold> forwarding message for node <bold>{dest}</bold>."
            )),
            Some(dest) => log::debug(&cformat!(
                "<bold>[node {node}]</bold> forwarding own message addressed to <bold>{dest}</bold>."
            )),
            None => log::debug(&cformat!("<bold>[node {node}]</bold> forwarding empty slot.")),
        }
    }

    fn on_state_change(&self, node: NodeId, event: &PeerEvent) {
        match event {
            PeerEvent::Started => log::info(&cformat!("<bold>[node {node}]</bold> started.")),
            PeerEvent::TokenAcquired => log::debug(&cformat!(
                "<bold>[node {node}]</bold> got the <yellow, bold>apple</yellow, bold>."
            )),
            PeerEvent::SlotEmpty => log::debug(&cformat!(
                "<bold>[node {node}]</bold> slot is empty, nothing to consume."
            )),
            PeerEvent::Injected { destination, len } => log::info(&cformat!(
                "<bold>[node {node}]</bold> queued {len} bytes for node <bold>{destination}</bold>."
            )),
            PeerEvent::InputRejected { destination } => log::warn(&cformat!(
                "<bold>[node {node}]</bold> invalid destination <bold>{destination}</bold>, message not sent."
            )),
            PeerEvent::TokenReleased => log::debug(&cformat!(
                "<bold>[node {node}]</bold> passing the <yellow, bold>apple</yellow, bold>."
            )),
            PeerEvent::Shutdown { cause: ShutdownCause::Failed } => log::warn(&cformat!(
                "<bold>[node {node}]</bold> left the ring after a failure."
            )),
            PeerEvent::Shutdown { cause } => log::info(&cformat!(
                "<bold>[node {node}]</bold> exiting ({cause:?})."
            )),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonLine<'a> {
    Delivered {
        node: NodeId,
        body: &'a str,
    },
    Forwarding {
        node: NodeId,
        destination: Option<NodeId>,
    },
    State {
        node: NodeId,
        #[serde(flatten)]
        change: &'a PeerEvent,
    },
}

/// Observer that writes one JSON object per event to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonObserver;

impl JsonObserver {
    fn emit(line: &JsonLine<'_>) {
        match serde_json::to_string(line) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error(&format!("Couldn't encode event: {e}")),
        }
    }
}

impl Observer for JsonObserver {
    fn on_delivered(&self, node: NodeId, body: &[u8]) {
        let body = String::from_utf8_lossy(body);
        Self::emit(&JsonLine::Delivered { node, body: &body });
    }

    fn on_forwarding(&self, node: NodeId, destination: Option<NodeId>) {
        Self::emit(&JsonLine::Forwarding { node, destination });
    }

    fn on_state_change(&self, node: NodeId, event: &PeerEvent) {
        Self::emit(&JsonLine::State {
            node,
            change: event,
        });
    }
}

/// What a [`RecordingObserver`] captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Delivered { body: Vec<u8> },
    Forwarding { destination: Option<NodeId> },
    State(PeerEvent),
}

/// One captured observation with its monotonic timestamp.
#[derive(Debug, Clone)]
pub struct Entry {
    pub at: Instant,
    pub node: NodeId,
    pub record: Record,
}

/// Observer that keeps every observation in memory, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, node: NodeId, record: Record) {
        // timestamp under the lock so arrival order and time order agree
        let mut entries = self.entries.lock();
        entries.push(Entry {
            at: Instant::now(),
            node,
            record,
        });
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    pub fn deliveries(&self) -> Vec<(NodeId, Vec<u8>)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match &e.record {
                Record::Delivered { body } => Some((e.node, body.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<(NodeId, PeerEvent)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match &e.record {
                Record::State(event) => Some((e.node, event.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &PeerEvent) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| matches!(&e.record, Record::State(event) if event == wanted))
            .count()
    }
}

impl Observer for RecordingObserver {
    fn on_delivered(&self, node: NodeId, body: &[u8]) {
        self.push(
            node,
            Record::Delivered {
                body: body.to_vec(),
            },
        );
    }

    fn on_forwarding(&self, node: NodeId, destination: Option<NodeId>) {
        self.push(node, Record::Forwarding { destination });
    }

    fn on_state_change(&self, node: NodeId, event: &PeerEvent) {
        self.push(node, Record::State(event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_are_flat_objects() {
        let line = JsonLine::State {
            node: 3,
            change: &PeerEvent::Injected {
                destination: 1,
                len: 2,
            },
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&line).unwrap()).unwrap();

        assert_eq!(value["kind"], "state");
        assert_eq!(value["node"], 3);
        assert_eq!(value["event"], "injected");
        assert_eq!(value["destination"], 1);
    }

    #[test]
    fn recorder_keeps_arrival_order() {
        let recorder = RecordingObserver::new();
        recorder.on_state_change(0, &PeerEvent::TokenAcquired);
        recorder.on_delivered(0, b"hi");
        recorder.on_state_change(0, &PeerEvent::TokenReleased);

        let entries = recorder.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(recorder.deliveries(), vec![(0, b"hi".to_vec())]);
        assert_eq!(recorder.count(&PeerEvent::TokenAcquired), 1);
    }
}
