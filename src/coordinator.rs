use crate::{
    config::RingConfig,
    error::RingError,
    input::InputProvider,
    log,
    observer::Observer,
    peer::{Peer, PeerExit},
    ring::Ring,
    NodeId, INTERACTIVE_NODE,
};
use color_print::cformat;
use futures::future::select_all;
use std::{collections::BTreeMap, mem, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Coordinator-side record of one spawned peer.
pub struct PeerHandle {
    node: NodeId,
    cancel: CancellationToken,
    task: JoinHandle<PeerExit>,
}

impl PeerHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Function that asks the peer to stop. The peer notices at its next suspension point.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Function that waits for the peer to exit, consuming the handle.
    pub async fn join(self) -> PeerExit {
        exit_of(self.task.await)
    }
}

fn exit_of(result: Result<PeerExit, tokio::task::JoinError>) -> PeerExit {
    result.unwrap_or(PeerExit::Panicked)
}

/// Waits for whichever peer exits first. `peers` must not be empty.
async fn next_exit(peers: &mut BTreeMap<NodeId, PeerHandle>) -> (NodeId, PeerExit) {
    let pending = peers.values_mut().map(|handle| {
        Box::pin(async move { (handle.node, exit_of((&mut handle.task).await)) })
    });
    let ((node, exit), _, _) = select_all(pending).await;
    (node, exit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    ShuttingDown,
    Stopped,
}

/// Outcome of a ring's life.
#[derive(Debug)]
pub struct RingReport {
    /// Whether the ring ended because of an interrupt rather than on its own.
    pub interrupted: bool,
    pub exits: BTreeMap<NodeId, PeerExit>,
}

impl RingReport {
    pub fn failures(&self) -> usize {
        self.exits.values().filter(|exit| exit.is_failure()).count()
    }
}

/// Owns every peer of one ring, from spawn to confirmed termination.
pub struct Coordinator {
    ring_size: usize,
    peers: BTreeMap<NodeId, PeerHandle>,
    exits: BTreeMap<NodeId, PeerExit>,
    phase: Phase,
}

impl Coordinator {
    /// Function that wires the ring, seeds the apple and the slot, and spawns every peer.
    ///
    /// `input` drives the interactive node; every other node is a relay.
    pub async fn start(
        config: &RingConfig,
        observer: Arc<dyn Observer>,
        input: Box<dyn InputProvider>,
    ) -> Result<Self, RingError> {
        let ring_size = config.nodes();
        let mut ring = Ring::build(ring_size)?;

        ring.seed(config.seed_edge(), config.seed_slot()).await?;
        log::info(&cformat!(
            "Seeded the <yellow, bold>apple</yellow, bold> and the slot on edge <bold>{}</bold>.",
            config.seed_edge()
        ));

        let mut input = Some(input);
        let mut peers = BTreeMap::new();

        for edges in ring.into_peers() {
            let node = edges.node;
            let cancel = CancellationToken::new();

            let mut peer = Peer::new(edges, ring_size, Arc::clone(&observer), cancel.clone());
            if node == INTERACTIVE_NODE {
                if let Some(input) = input.take() {
                    peer = peer.with_input(input);
                }
            }

            let task = tokio::spawn(peer.run());
            peers.insert(node, PeerHandle { node, cancel, task });
        }

        log::info(&cformat!("Spawned <bold>{ring_size}</bold> peers."));

        Ok(Self {
            ring_size,
            peers,
            exits: BTreeMap::new(),
            phase: Phase::Running,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    pub fn peer(&self, node: NodeId) -> Option<&PeerHandle> {
        self.peers.get(&node)
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Exits collected so far, by node.
    pub fn exits(&self) -> &BTreeMap<NodeId, PeerExit> {
        &self.exits
    }

    /// Function that runs the control loop until an interrupt arrives or every peer has left.
    ///
    /// Each message on `interrupts` is one interrupt. Interrupts arriving while
    /// the shutdown is under way are ignored.
    pub async fn run(mut self, mut interrupts: mpsc::UnboundedReceiver<()>) -> RingReport {
        let mut interrupted = false;

        while !self.peers.is_empty() {
            let exited = tokio::select! {
                Some(()) = interrupts.recv() => None,
                exited = next_exit(&mut self.peers) => Some(exited),
            };

            match exited {
                Some((node, exit)) => {
                    self.peers.remove(&node);
                    log::debug(&cformat!("<bold>[node {node}]</bold> left the ring: {exit:?}"));
                    self.exits.insert(node, exit);
                }
                None => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            log::info("Interrupt received: shutting down peers...");
            let shutdown = self.shutdown();
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    Some(()) = interrupts.recv() => {
                        log::warn("Shutdown already in progress; ignoring interrupt.");
                    }
                }
            }
        } else {
            log::warn("Every peer left the ring on its own.");
            self.phase = Phase::Stopped;
        }

        RingReport {
            interrupted,
            exits: mem::take(&mut self.exits),
        }
    }

    /// Function that terminates every peer and waits for all of them. Later calls do nothing.
    pub async fn shutdown(&mut self) {
        if self.phase != Phase::Running {
            log::debug("Shutdown already requested.");
            return;
        }
        self.phase = Phase::ShuttingDown;

        for handle in self.peers.values() {
            handle.terminate();
        }
        // every endpoint was moved into a peer, so there is nothing of ours to close

        for (node, handle) in mem::take(&mut self.peers) {
            let exit = handle.join().await;
            log::debug(&cformat!("<bold>[node {node}]</bold> confirmed down: {exit:?}"));
            self.exits.insert(node, exit);
        }

        self.phase = Phase::Stopped;
        log::info("All peers terminated.");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for handle in self.peers.values() {
            handle.terminate();
        }
    }
}
