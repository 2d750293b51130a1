//! A ring of peers passing one mailbox slot around, guarded by a circulating token (the apple).
//!
//! Only the peer holding the apple may read or write the slot. Node 0 is
//! interactive and may put new messages into an empty slot; every other node
//! consumes messages addressed to it and forwards the rest.

pub use crate::config::RingConfig;
pub use crate::coordinator::{Coordinator, PeerHandle, RingReport};
pub use crate::error::RingError;
pub use crate::message::{Apple, MessageSlot};
pub use crate::peer::{Peer, PeerExit};

pub mod config;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod log;
pub mod message;
pub mod observer;
pub mod peer;
pub mod poisson;
pub mod ring;
pub mod transport;

/// Identifies a peer and doubles as a slot destination.
pub type NodeId = usize;

/// Capacity of the slot body in bytes.
pub const MAXMSG: usize = 512;

/// The node that may originate messages.
pub const INTERACTIVE_NODE: NodeId = 0;
