//! Reassembly of transport frames into whole control packets.

use bytes::{Buf, BytesMut};

use crate::error::Result;
use crate::packet::{decode_packet, Packet};

/// Accumulates the unparsed tail of the byte stream. A single transport
/// frame may complete zero, one or several packets.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    tail: BytesMut,
}

impl ReassemblyBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one inbound frame and drains every now-complete packet.
    ///
    /// A structural decode error poisons the stream; callers abort the
    /// connection rather than resynchronise.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Packet>> {
        self.tail.extend_from_slice(chunk);

        let mut packets = Vec::new();
        let mut offset = 0;
        while let Some((packet, end)) = decode_packet(&self.tail, offset)? {
            packets.push(packet);
            offset = end;
        }
        self.tail.advance(offset);
        Ok(packets)
    }

    /// Bytes still waiting for the rest of their frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tail.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }

    pub fn clear(&mut self) {
        self.tail.clear();
    }
}
