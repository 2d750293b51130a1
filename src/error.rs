//! Error taxonomy shared by every layer of the ring.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    /// The requested ring size cannot form a ring.
    #[error("invalid ring size {0}: a ring needs at least one node")]
    Configuration(i64),

    /// A seed or lookup named an edge the ring does not have.
    #[error("no edge {edge} in a ring of {ring_size}")]
    UnknownEdge { edge: usize, ring_size: usize },

    /// A slot was addressed to a node outside the ring.
    #[error("no node {destination} in a ring of {ring_size}")]
    UnknownDestination { destination: usize, ring_size: usize },

    /// The far end of an edge went away. Expected during shutdown.
    #[error("transport closed")]
    TransportClosed,

    /// Any I/O failure other than a clean closure.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// A short or malformed record where a full one was expected.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl RingError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}
