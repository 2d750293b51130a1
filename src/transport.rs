//! Point-to-point byte channels joining two peers.
//!
//! An edge is a pair of endpoints: an [`Outbound`] that only writes and an
//! [`Inbound`] that only reads. Dropping or closing one end makes the other end
//! observe closure instead of blocking forever.

use crate::{
    error::RingError,
    message::{Apple, AppleCodec, MessageSlot, SlotCodec, APPLE_LEN, RECORD_LEN},
};
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Buffer capacity of an in-process edge. One full record fits, so seeding never blocks.
pub const EDGE_CAPACITY: usize = RECORD_LEN;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outcome of an exact-length receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Complete(Bytes),
    /// The far end closed first; holds whatever arrived before that, possibly nothing.
    Closed(Bytes),
}

/// Writing end of an edge.
pub struct Outbound {
    io: Option<BoxedWriter>,
    buf: BytesMut,
}

/// Reading end of an edge.
pub struct Inbound {
    io: Option<BoxedReader>,
    buf: BytesMut,
}

/// Function that creates one in-process edge.
pub fn edge(capacity: usize) -> (Outbound, Inbound) {
    let (tx, rx) = tokio::io::duplex(capacity);
    (Outbound::new(Box::new(tx)), Inbound::new(Box::new(rx)))
}

impl Outbound {
    pub fn new(io: BoxedWriter) -> Self {
        Self {
            io: Some(io),
            buf: BytesMut::with_capacity(RECORD_LEN),
        }
    }

    /// Function that writes every byte of `bytes`, retrying benign interruptions.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), RingError> {
        let io = self.io.as_mut().ok_or(RingError::TransportClosed)?;

        let mut written = 0;
        while written < bytes.len() {
            match io.write(&bytes[written..]).await {
                Ok(0) => return Err(RingError::TransportClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    return Err(RingError::TransportClosed)
                }
                Err(e) => return Err(e.into()),
            }
        }

        loop {
            match io.flush().await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn send_slot(&mut self, slot: &MessageSlot) -> Result<(), RingError> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        SlotCodec.encode(slot, &mut buf)?;
        let result = self.send(&buf).await;
        self.buf = buf;
        result
    }

    pub async fn send_apple(&mut self) -> Result<(), RingError> {
        let mut buf = BytesMut::with_capacity(APPLE_LEN);
        AppleCodec.encode(Apple, &mut buf)?;
        self.send(&buf).await
    }

    /// Function that releases the endpoint. Calling it again does nothing.
    pub fn close(&mut self) {
        self.io.take();
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }
}

impl Inbound {
    pub fn new(io: BoxedReader) -> Self {
        Self {
            io: Some(io),
            buf: BytesMut::with_capacity(RECORD_LEN),
        }
    }

    /// Function that blocks until `len` bytes arrived or the far end closed.
    pub async fn recv_exact(&mut self, len: usize) -> Result<Received, RingError> {
        let io = self.io.as_mut().ok_or(RingError::TransportClosed)?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match io.read(&mut buf[filled..]).await {
                Ok(0) => {
                    buf.truncate(filled);
                    return Ok(Received::Closed(buf.into()));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Received::Complete(buf.into()))
    }

    /// Function that receives one full slot record. A partial record is a protocol violation.
    pub async fn recv_slot(&mut self) -> Result<MessageSlot, RingError> {
        match self.recv_exact(RECORD_LEN).await? {
            Received::Complete(bytes) => {
                self.buf.clear();
                self.buf.extend_from_slice(&bytes);
                SlotCodec.decode(&mut self.buf)?.ok_or_else(|| {
                    RingError::ProtocolViolation("incomplete slot record".to_string())
                })
            }
            Received::Closed(partial) if partial.is_empty() => Err(RingError::TransportClosed),
            Received::Closed(partial) => Err(RingError::ProtocolViolation(format!(
                "slot record cut short after {} of {RECORD_LEN} bytes",
                partial.len()
            ))),
        }
    }

    pub async fn recv_apple(&mut self) -> Result<Apple, RingError> {
        match self.recv_exact(APPLE_LEN).await? {
            Received::Complete(bytes) => {
                let mut buf = BytesMut::from(&bytes[..]);
                AppleCodec.decode(&mut buf)?.ok_or(RingError::TransportClosed)
            }
            Received::Closed(_) => Err(RingError::TransportClosed),
        }
    }

    /// Function that releases the endpoint. Calling it again does nothing.
    pub fn close(&mut self) {
        self.io.take();
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    /// Reader that fails once with `Interrupted` before every chunk it hands out.
    struct Flaky {
        chunks: Vec<Vec<u8>>,
        interrupt_next: bool,
    }

    impl AsyncRead for Flaky {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Poll::Ready(Err(io::Error::from(ErrorKind::Interrupted)));
            }
            if !self.chunks.is_empty() {
                let chunk = self.chunks.remove(0);
                buf.put_slice(&chunk);
                self.interrupt_next = true;
            }
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn interrupted_reads_are_retried() {
        let mut inbound = Inbound::new(Box::new(Flaky {
            chunks: vec![b"ab".to_vec(), b"cd".to_vec()],
            interrupt_next: true,
        }));

        let got = inbound.recv_exact(4).await.unwrap();
        assert_eq!(got, Received::Complete(Bytes::from_static(b"abcd")));
    }

    #[tokio::test]
    async fn closing_the_writer_ends_the_stream() {
        let (mut tx, mut rx) = edge(EDGE_CAPACITY);
        tx.send(b"xy").await.unwrap();
        tx.close();
        tx.close();

        assert_eq!(
            rx.recv_exact(4).await.unwrap(),
            Received::Closed(Bytes::from_static(b"xy"))
        );
        assert_eq!(rx.recv_exact(1).await.unwrap(), Received::Closed(Bytes::new()));
        assert!(matches!(
            tx.send(b"z").await,
            Err(RingError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn closing_the_reader_fails_later_sends() {
        let (mut tx, mut rx) = edge(EDGE_CAPACITY);
        rx.close();

        assert!(rx.is_closed());
        assert!(matches!(tx.send_apple().await, Err(RingError::TransportClosed)));
        assert!(matches!(rx.recv_apple().await, Err(RingError::TransportClosed)));
    }

    #[tokio::test]
    async fn slot_records_travel_whole() {
        let (mut tx, mut rx) = edge(EDGE_CAPACITY);
        let slot = MessageSlot::addressed(2, b"hi");

        tx.send_slot(&slot).await.unwrap();
        assert_eq!(rx.recv_slot().await.unwrap(), slot);
    }

    #[tokio::test]
    async fn partial_record_is_a_protocol_violation() {
        let (mut tx, mut rx) = edge(EDGE_CAPACITY);
        tx.send(&[0u8; 10]).await.unwrap();
        drop(tx);

        assert!(matches!(
            rx.recv_slot().await,
            Err(RingError::ProtocolViolation(_))
        ));
    }

    #[tokio::test]
    async fn clean_closure_before_a_record_is_not_a_violation() {
        let (tx, mut rx) = edge(EDGE_CAPACITY);
        drop(tx);

        assert!(matches!(rx.recv_slot().await, Err(RingError::TransportClosed)));
    }
}
