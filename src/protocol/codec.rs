use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

use super::packet::{Packet, MAX_PACKET_SIZE};

/// MySQL packet codec for use with tokio Framed.
///
/// The codec owns the per-connection sequence counter: outbound payloads
/// are split into frames stamped with consecutive sequence ids, inbound
/// frames are checked against the counter and continuation frames
/// (payload length == 0xFFFFFF) are concatenated until a terminating
/// frame arrives. The connection resets the counter at the start of
/// every command exchange.
#[derive(Debug, Default)]
pub struct PacketCodec {
    next_seq: u8,
    partial: Option<BytesMut>,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart sequence numbering; called before each command packet.
    pub fn reset_sequence(&mut self) {
        self.next_seq = 0;
        self.partial = None;
    }

    /// Next sequence id that will be stamped or expected.
    pub fn sequence(&self) -> u8 {
        self.next_seq
    }

    fn tick(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(packet) = Packet::decode(src) {
            if packet.sequence_id != self.next_seq {
                return Err(Error::protocol(format!(
                    "packet out of sequence: got {}, expected {}",
                    packet.sequence_id, self.next_seq
                )));
            }
            self.tick();

            let terminal = packet.payload.len() < MAX_PACKET_SIZE;
            if let Some(partial) = self.partial.as_mut() {
                partial.extend_from_slice(&packet.payload);
                if terminal {
                    let assembled = self.partial.take().unwrap_or_default();
                    return Ok(Some(assembled.freeze()));
                }
            } else if terminal {
                return Ok(Some(packet.payload));
            } else {
                self.partial = Some(BytesMut::from(&packet.payload[..]));
            }
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut offset = 0;
        loop {
            let chunk_len = usize::min(MAX_PACKET_SIZE, item.len() - offset);
            let frame = Packet::new(self.tick(), item.slice(offset..offset + chunk_len));
            frame.encode(dst);
            offset += chunk_len;
            // a maximum-size final chunk needs an empty trailer frame
            if offset >= item.len() && chunk_len < MAX_PACKET_SIZE {
                return Ok(());
            }
        }
    }
}
