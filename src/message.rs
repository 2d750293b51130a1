//! Module that contains the values carried around the ring: the mailbox slot and the apple.

use crate::{error::RingError, NodeId, MAXMSG};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Destination value written on the wire for an empty slot.
pub const EMPTY_DESTINATION: i32 = -1;

/// Size of one encoded slot: destination, length, then the full body capacity.
pub const RECORD_LEN: usize = 4 + 4 + MAXMSG;

/// Size of one encoded apple.
pub const APPLE_LEN: usize = 1;

/// The single mailbox circulating with the apple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSlot {
    destination: Option<NodeId>,
    body: Vec<u8>,
}

/// Struct that represents the token whose holder owns the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Apple;

impl MessageSlot {
    /// Function that creates an empty slot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Function that creates a slot addressed to `destination`, truncating the body to `MAXMSG` bytes.
    pub fn addressed(destination: NodeId, body: &[u8]) -> Self {
        let len = body.len().min(MAXMSG);
        Self {
            destination: Some(destination),
            body: body[..len].to_vec(),
        }
    }

    pub fn destination(&self) -> Option<NodeId> {
        self.destination
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_empty(&self) -> bool {
        self.destination.is_none()
    }

    /// Function that consumes the content, leaving the slot empty.
    pub fn take(&mut self) -> Vec<u8> {
        self.destination = None;
        std::mem::take(&mut self.body)
    }

    /// Function that writes the fixed-size record into `dst`. The body never exceeds `MAXMSG` bytes on the wire.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(RECORD_LEN);
        let destination = match self.destination {
            Some(node) => node as i32,
            None => EMPTY_DESTINATION,
        };
        let body = &self.body[..self.body.len().min(MAXMSG)];

        dst.put_i32_le(destination);
        dst.put_i32_le(body.len() as i32);
        dst.put_slice(body);
        dst.put_bytes(0, MAXMSG - body.len());
    }

    /// Function that parses one full record. The caller guarantees `src` holds `RECORD_LEN` bytes.
    pub fn decode_from(mut src: &[u8]) -> Result<Self, RingError> {
        if src.len() < RECORD_LEN {
            return Err(RingError::ProtocolViolation(format!(
                "short record: {} of {RECORD_LEN} bytes",
                src.len()
            )));
        }

        let destination = match src.get_i32_le() {
            EMPTY_DESTINATION => None,
            node if node >= 0 => Some(node as NodeId),
            node => {
                return Err(RingError::ProtocolViolation(format!(
                    "invalid destination {node}"
                )))
            }
        };

        let len = src.get_i32_le();
        if len < 0 || len as usize > MAXMSG {
            return Err(RingError::ProtocolViolation(format!(
                "body length {len} outside 0..={MAXMSG}"
            )));
        }

        let body = match destination {
            Some(_) => src[..len as usize].to_vec(),
            None => Vec::new(),
        };

        Ok(Self { destination, body })
    }
}

/// Codec that frames `MessageSlot` records on a message edge.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotCodec;

impl Encoder<&MessageSlot> for SlotCodec {
    type Error = RingError;

    fn encode(&mut self, slot: &MessageSlot, dst: &mut BytesMut) -> Result<(), Self::Error> {
        slot.encode_into(dst);
        Ok(())
    }
}

impl Decoder for SlotCodec {
    type Item = MessageSlot;
    type Error = RingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < RECORD_LEN {
            return Ok(None);
        }
        let record = src.split_to(RECORD_LEN);
        MessageSlot::decode_from(&record).map(Some)
    }
}

/// Codec that frames apples on a token edge.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleCodec;

impl Encoder<Apple> for AppleCodec {
    type Error = RingError;

    fn encode(&mut self, _apple: Apple, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(1);
        Ok(())
    }
}

impl Decoder for AppleCodec {
    type Item = Apple;
    type Error = RingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // any byte value counts as the apple
        src.advance(APPLE_LEN);
        Ok(Some(Apple))
    }
}
