use crate::{
    error::RingError,
    input::{InputProvider, Outgoing},
    log,
    message::MessageSlot,
    observer::{Observer, PeerEvent, ShutdownCause},
    ring::PeerEdges,
    NodeId,
};
use color_print::cformat;
use std::{future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;

/// How a peer left the ring.
#[derive(Debug)]
pub enum PeerExit {
    /// An inbound edge closed. The normal way out during shutdown.
    Closed,
    /// The coordinator's termination request was noticed.
    Terminated,
    /// A transport failure or protocol violation ended this peer only.
    Failed(RingError),
    /// The peer task itself died.
    Panicked,
}

impl PeerExit {
    pub fn cause(&self) -> ShutdownCause {
        match self {
            Self::Closed => ShutdownCause::Closed,
            Self::Terminated => ShutdownCause::Terminated,
            Self::Failed(_) | Self::Panicked => ShutdownCause::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked)
    }
}

impl From<RingError> for PeerExit {
    fn from(e: RingError) -> Self {
        if e.is_closed() {
            Self::Closed
        } else {
            Self::Failed(e)
        }
    }
}

/// What the holder did with the slot it found.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing to consume; the slot passes through.
    Empty,
    /// The slot was addressed here; its body was taken and the slot emptied.
    Delivered(Vec<u8>),
    /// Addressed to another node; left untouched.
    PassThrough(NodeId),
}

/// Function that applies the holder's policy to the slot. Empty is checked before the address.
pub fn apply_policy(node: NodeId, slot: &mut MessageSlot) -> Verdict {
    match slot.destination() {
        None => Verdict::Empty,
        Some(destination) if destination == node => Verdict::Delivered(slot.take()),
        Some(destination) => Verdict::PassThrough(destination),
    }
}

/// One node of the ring.
///
/// A peer only touches the slot between receiving the apple and passing it on;
/// the apple is the lock.
pub struct Peer {
    node: NodeId,
    ring_size: usize,
    edges: PeerEdges,
    observer: Arc<dyn Observer>,
    input: Option<Box<dyn InputProvider>>,
    cancel: CancellationToken,
}

impl Peer {
    pub fn new(
        edges: PeerEdges,
        ring_size: usize,
        observer: Arc<dyn Observer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node: edges.node,
            ring_size,
            edges,
            observer,
            input: None,
            cancel,
        }
    }

    /// Function that makes this peer interactive: it may originate messages.
    pub fn with_input(mut self, input: Box<dyn InputProvider>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_interactive(&self) -> bool {
        self.input.is_some()
    }

    /// Function that runs the peer until its edges close, it fails, or it is told to stop.
    pub async fn run(mut self) -> PeerExit {
        self.observer.on_state_change(self.node, &PeerEvent::Started);

        let exit = loop {
            if self.cancel.is_cancelled() {
                break PeerExit::Terminated;
            }
            if let Err(exit) = self.cycle().await {
                break exit;
            }
        };

        self.edges.close();

        match &exit {
            PeerExit::Failed(e) => log::error(&cformat!("<bold>[node {}]</bold> {e}", self.node)),
            _ => log::debug(&cformat!("<bold>[node {}]</bold> {exit:?}", self.node)),
        }
        self.observer.on_state_change(
            self.node,
            &PeerEvent::Shutdown {
                cause: exit.cause(),
            },
        );

        exit
    }

    /// One visit of the apple: acquire, inspect, forward, release.
    async fn cycle(&mut self) -> Result<(), PeerExit> {
        let node = self.node;

        guarded(&self.cancel, self.edges.token_in.recv_apple()).await?;
        self.observer.on_state_change(node, &PeerEvent::TokenAcquired);

        let mut slot = guarded(&self.cancel, self.edges.message_in.recv_slot()).await?;

        match apply_policy(node, &mut slot) {
            Verdict::Empty => self.observer.on_state_change(node, &PeerEvent::SlotEmpty),
            Verdict::Delivered(body) => self.observer.on_delivered(node, &body),
            Verdict::PassThrough(_) => {}
        }

        // only an empty slot can take a new message
        if slot.is_empty() {
            if let Some(input) = self.input.as_mut() {
                let outgoing =
                    guarded_value(&self.cancel, input.prompt_for_outgoing(self.ring_size)).await?;
                if let Some(outgoing) = outgoing {
                    self.inject(&mut slot, outgoing);
                }
            }
        }

        self.observer.on_forwarding(node, slot.destination());
        guarded(&self.cancel, self.edges.message_out.send_slot(&slot)).await?;

        self.observer.on_state_change(node, &PeerEvent::TokenReleased);
        guarded(&self.cancel, self.edges.token_out.send_apple()).await?;

        Ok(())
    }

    fn inject(&self, slot: &mut MessageSlot, outgoing: Outgoing) {
        if outgoing.destination >= self.ring_size {
            self.observer.on_state_change(
                self.node,
                &PeerEvent::InputRejected {
                    destination: outgoing.destination,
                },
            );
            return;
        }

        *slot = MessageSlot::addressed(outgoing.destination, &outgoing.body);
        self.observer.on_state_change(
            self.node,
            &PeerEvent::Injected {
                destination: outgoing.destination,
                len: slot.body().len(),
            },
        );
    }
}

/// Races a transport operation against the termination request.
async fn guarded<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = Result<T, RingError>>,
) -> Result<T, PeerExit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PeerExit::Terminated),
        result = op => result.map_err(PeerExit::from),
    }
}

async fn guarded_value<T>(
    cancel: &CancellationToken,
    op: impl Future<Output = T>,
) -> Result<T, PeerExit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PeerExit::Terminated),
        value = op => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        input::ScriptedInput,
        observer::RecordingObserver,
        ring::Ring,
        transport::Inbound,
    };
    use bytes::BytesMut;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    };
    use tokio::{
        io::{AsyncRead, ReadBuf},
        time::timeout,
    };
    use tokio_util::codec::Encoder;

    /// Reader whose device has gone bad.
    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("device gone")))
        }
    }

    fn encoded(slot: &MessageSlot) -> BytesMut {
        let mut buf = BytesMut::new();
        crate::message::SlotCodec.encode(slot, &mut buf).unwrap();
        buf
    }

    #[test]
    fn empty_slot_short_circuits() {
        let mut slot = MessageSlot::empty();
        assert_eq!(apply_policy(0, &mut slot), Verdict::Empty);
        assert!(slot.is_empty());
    }

    #[test]
    fn addressee_consumes_and_empties() {
        let mut slot = MessageSlot::addressed(2, b"hi");

        assert_eq!(apply_policy(2, &mut slot), Verdict::Delivered(b"hi".to_vec()));
        assert_eq!(encoded(&slot), encoded(&MessageSlot::empty()));
    }

    #[test]
    fn pass_through_is_byte_for_byte() {
        let original = MessageSlot::addressed(4, b"not yours");
        let mut slot = original.clone();

        assert_eq!(apply_policy(1, &mut slot), Verdict::PassThrough(4));
        assert_eq!(encoded(&slot), encoded(&original));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lone_relay_keeps_the_apple_moving() {
        let mut ring = Ring::build(1).unwrap();
        ring.seed(0, &MessageSlot::addressed(0, b"me")).await.unwrap();
        let edges = ring.into_peers().pop().unwrap();

        let observer = RecordingObserver::new();
        let cancel = CancellationToken::new();
        let peer = Peer::new(edges, 1, Arc::new(observer.clone()), cancel.clone());
        let task = tokio::spawn(peer.run());

        while observer.count(&PeerEvent::TokenAcquired) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();

        let exit = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(matches!(exit, PeerExit::Terminated));
        assert_eq!(observer.deliveries(), vec![(0, b"me".to_vec())]);
    }

    #[tokio::test]
    async fn interactive_peer_ignores_destinations_outside_the_ring() {
        let mut ring = Ring::build(2).unwrap();
        ring.seed(1, &MessageSlot::empty()).await.unwrap();
        let mut peers = ring.into_peers();
        let relay = peers.pop().unwrap();
        let edges = peers.pop().unwrap();

        let observer = RecordingObserver::new();
        let cancel = CancellationToken::new();
        let peer = Peer::new(edges, 2, Arc::new(observer.clone()), cancel.clone())
            .with_input(Box::new(ScriptedInput::new([Some(Outgoing::new(9, "lost"))])));
        assert!(peer.is_interactive());
        let task = tokio::spawn(peer.run());

        // stand in for node 1 by reading what node 0 forwards
        let mut relay = relay;
        let forwarded = timeout(Duration::from_secs(5), relay.message_in.recv_slot())
            .await
            .unwrap()
            .unwrap();
        assert!(forwarded.is_empty());
        assert_eq!(observer.count(&PeerEvent::InputRejected { destination: 9 }), 1);

        drop(relay);
        let exit = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(matches!(exit, PeerExit::Closed));
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn partial_record_ends_only_this_peer() {
        let mut peers = Ring::build(2).unwrap().into_peers();
        let mut upstream = peers.pop().unwrap();
        let edges = peers.pop().unwrap();

        upstream.token_out.send_apple().await.unwrap();
        upstream.message_out.send(&[0u8; 5]).await.unwrap();
        upstream.message_out.close();

        let observer = RecordingObserver::new();
        let peer = Peer::new(edges, 2, Arc::new(observer.clone()), CancellationToken::new());
        let exit = timeout(Duration::from_secs(5), peer.run()).await.unwrap();

        assert!(matches!(exit, PeerExit::Failed(RingError::ProtocolViolation(_))));
        assert_eq!(
            observer.count(&PeerEvent::Shutdown {
                cause: ShutdownCause::Failed
            }),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn io_failure_stops_the_peer_and_its_successor_sees_a_closure() {
        let mut peers = Ring::build(2).unwrap().into_peers();
        let mut successor = peers.pop().unwrap();
        let mut edges = peers.pop().unwrap();
        edges.message_in = Inbound::new(Box::new(Broken));

        // node 1 hands the apple to node 0, then runs as an ordinary relay
        successor.token_out.send_apple().await.unwrap();

        let observer = RecordingObserver::new();
        let failing = Peer::new(edges, 2, Arc::new(observer.clone()), CancellationToken::new());
        let relay = Peer::new(successor, 2, Arc::new(observer.clone()), CancellationToken::new());
        let relay = tokio::spawn(relay.run());

        let exit = timeout(Duration::from_secs(5), failing.run()).await.unwrap();
        assert!(matches!(exit, PeerExit::Failed(RingError::Transport(_))));

        let downstream = timeout(Duration::from_secs(5), relay).await.unwrap().unwrap();
        assert!(matches!(downstream, PeerExit::Closed));
        assert!(!downstream.is_failure());

        assert_eq!(
            observer.count(&PeerEvent::Shutdown {
                cause: ShutdownCause::Failed
            }),
            1
        );
        assert_eq!(
            observer.count(&PeerEvent::Shutdown {
                cause: ShutdownCause::Closed
            }),
            1
        );
    }
}
