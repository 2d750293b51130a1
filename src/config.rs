use crate::{error::RingError, message::MessageSlot, ring::predecessor, NodeId, INTERACTIVE_NODE};

/// Validated settings for one ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    nodes: usize,
    seed_edge: NodeId,
    seed_slot: MessageSlot,
}

impl RingConfig {
    /// Function that validates a ring size coming from the outside world.
    ///
    /// The apple and an empty slot are seeded on the edge feeding the interactive node.
    pub fn new(nodes: i64) -> Result<Self, RingError> {
        if nodes < 1 {
            return Err(RingError::Configuration(nodes));
        }
        let nodes = usize::try_from(nodes).map_err(|_| RingError::Configuration(nodes))?;

        Ok(Self {
            nodes,
            seed_edge: predecessor(INTERACTIVE_NODE, nodes),
            seed_slot: MessageSlot::empty(),
        })
    }

    /// Function that moves the initial apple and slot onto edge `edge`.
    pub fn seeded_on(mut self, edge: NodeId) -> Result<Self, RingError> {
        if edge >= self.nodes {
            return Err(RingError::UnknownEdge {
                edge,
                ring_size: self.nodes,
            });
        }
        self.seed_edge = edge;
        Ok(self)
    }

    /// Function that replaces the initial empty slot. Its destination must be a node of the ring.
    pub fn seeded_with(mut self, slot: MessageSlot) -> Result<Self, RingError> {
        if let Some(destination) = slot.destination() {
            if destination >= self.nodes {
                return Err(RingError::UnknownDestination {
                    destination,
                    ring_size: self.nodes,
                });
            }
        }
        self.seed_slot = slot;
        Ok(self)
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn seed_edge(&self) -> NodeId {
        self.seed_edge
    }

    pub fn seed_slot(&self) -> &MessageSlot {
        &self.seed_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rings_need_a_node() {
        assert!(matches!(RingConfig::new(0), Err(RingError::Configuration(0))));
        assert!(matches!(RingConfig::new(-3), Err(RingError::Configuration(-3))));
    }

    #[test]
    fn default_seed_feeds_the_interactive_node() {
        let config = RingConfig::new(5).unwrap();
        assert_eq!(config.seed_edge(), 4);
        assert!(config.seed_slot().is_empty());

        assert_eq!(RingConfig::new(1).unwrap().seed_edge(), 0);
    }

    #[test]
    fn seed_edge_must_exist() {
        assert!(RingConfig::new(3).unwrap().seeded_on(0).is_ok());
        assert!(matches!(
            RingConfig::new(3).unwrap().seeded_on(3),
            Err(RingError::UnknownEdge { edge: 3, ring_size: 3 })
        ));
    }

    #[test]
    fn seed_slot_must_be_addressed_inside_the_ring() {
        let config = RingConfig::new(3)
            .unwrap()
            .seeded_with(MessageSlot::addressed(2, b"hi"))
            .unwrap();
        assert_eq!(config.seed_slot().destination(), Some(2));

        assert!(matches!(
            RingConfig::new(3)
                .unwrap()
                .seeded_with(MessageSlot::addressed(7, b"lost")),
            Err(RingError::UnknownDestination {
                destination: 7,
                ring_size: 3
            })
        ));
        assert!(RingConfig::new(1)
            .unwrap()
            .seeded_with(MessageSlot::empty())
            .is_ok());
    }
}
