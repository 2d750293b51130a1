//! Ring topology: one message edge and one token edge per successor relation.

use crate::{
    error::RingError,
    message::MessageSlot,
    transport::{edge, Inbound, Outbound, EDGE_CAPACITY},
    NodeId,
};

pub fn successor(node: NodeId, ring_size: usize) -> NodeId {
    (node + 1) % ring_size
}

pub fn predecessor(node: NodeId, ring_size: usize) -> NodeId {
    (node + ring_size - 1) % ring_size
}

/// The four endpoints owned by one peer. Nothing else holds them.
pub struct PeerEdges {
    pub node: NodeId,
    pub message_in: Inbound,
    pub message_out: Outbound,
    pub token_in: Inbound,
    pub token_out: Outbound,
}

impl PeerEdges {
    /// Function that releases all four endpoints.
    pub fn close(&mut self) {
        self.message_in.close();
        self.message_out.close();
        self.token_in.close();
        self.token_out.close();
    }
}

/// A wired ring whose endpoints have not been handed to peers yet.
pub struct Ring {
    peers: Vec<PeerEdges>,
}

impl Ring {
    /// Function that wires `ring_size` peers. Edge `i` joins peer `i` to its successor.
    pub fn build(ring_size: usize) -> Result<Self, RingError> {
        if ring_size == 0 {
            return Err(RingError::Configuration(0));
        }

        let (message_out, mut message_in): (Vec<_>, Vec<_>) =
            (0..ring_size).map(|_| edge(EDGE_CAPACITY)).unzip();
        let (token_out, mut token_in): (Vec<_>, Vec<_>) =
            (0..ring_size).map(|_| edge(EDGE_CAPACITY)).unzip();

        // peer i reads from edge i-1
        message_in.rotate_right(1);
        token_in.rotate_right(1);

        let peers = message_out
            .into_iter()
            .zip(message_in)
            .zip(token_out.into_iter().zip(token_in))
            .enumerate()
            .map(|(node, ((message_out, message_in), (token_out, token_in)))| PeerEdges {
                node,
                message_in,
                message_out,
                token_in,
                token_out,
            })
            .collect();

        Ok(Self { peers })
    }

    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Function that puts the slot and the apple on edge `edge`, so that its successor starts holding them.
    pub async fn seed(&mut self, edge: NodeId, slot: &MessageSlot) -> Result<(), RingError> {
        let ring_size = self.size();
        let peer = self
            .peers
            .get_mut(edge)
            .ok_or(RingError::UnknownEdge { edge, ring_size })?;

        peer.message_out.send_slot(slot).await?;
        peer.token_out.send_apple().await
    }

    pub fn into_peers(self) -> Vec<PeerEdges> {
        self.peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_wrap_around() {
        assert_eq!(successor(4, 5), 0);
        assert_eq!(predecessor(0, 5), 4);
        assert_eq!(successor(0, 1), 0);
        assert_eq!(predecessor(0, 1), 0);
    }

    #[test]
    fn empty_ring_is_rejected() {
        assert!(matches!(Ring::build(0), Err(RingError::Configuration(0))));
    }

    #[tokio::test]
    async fn each_edge_joins_a_peer_to_its_successor() {
        let mut peers = Ring::build(3).unwrap().into_peers();

        for node in 0..3 {
            let slot = MessageSlot::addressed(node, b"probe");
            peers[node].message_out.send_slot(&slot).await.unwrap();
            peers[node].token_out.send_apple().await.unwrap();

            let next = successor(node, 3);
            assert_eq!(peers[next].message_in.recv_slot().await.unwrap(), slot);
            peers[next].token_in.recv_apple().await.unwrap();
        }
    }

    #[tokio::test]
    async fn closing_a_peer_is_seen_by_its_successor_only() {
        let mut peers = Ring::build(3).unwrap().into_peers();
        peers[1].close();

        assert!(matches!(
            peers[2].token_in.recv_apple().await,
            Err(RingError::TransportClosed)
        ));
        // peer 0's inbound edge belongs to peer 2, which is still open
        peers[2].token_out.send_apple().await.unwrap();
        peers[0].token_in.recv_apple().await.unwrap();
    }

    #[tokio::test]
    async fn seeding_a_missing_edge_fails() {
        let mut ring = Ring::build(2).unwrap();

        assert!(matches!(
            ring.seed(2, &MessageSlot::empty()).await,
            Err(RingError::UnknownEdge { edge: 2, ring_size: 2 })
        ));
    }

    #[tokio::test]
    async fn single_peer_feeds_itself() {
        let mut ring = Ring::build(1).unwrap();
        ring.seed(0, &MessageSlot::empty()).await.unwrap();

        let mut peers = ring.into_peers();
        peers[0].token_in.recv_apple().await.unwrap();
        assert!(peers[0].message_in.recv_slot().await.unwrap().is_empty());
    }
}
