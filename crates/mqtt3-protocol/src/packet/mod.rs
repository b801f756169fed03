//! MQTT 3.x control packets and the frame-level codec.
//!
//! Encoding always produces a complete frame (fixed header, MBI remaining
//! length, body). Decoding works on a contiguous byte slice at an offset and
//! signals a partial frame with `Ok(None)` so the reassembly buffer can wait
//! for more bytes.

pub mod ack;
pub mod connack;
pub mod connect;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

pub use ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsubscribe::UnsubscribePacket;

use bytes::{BufMut, Bytes, BytesMut};

use crate::encoding::{decode_remaining_length, encode_remaining_length};
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            other => Err(ClientError::InvalidMqttMessageType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq => PacketType::PingReq,
            Self::PingResp => PacketType::PingResp,
            Self::Disconnect => PacketType::Disconnect,
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Self::Publish(p) => p.flags(),
            Self::PubRel(_) | Self::Subscribe(_) | Self::Unsubscribe(_) => 0x02,
            _ => 0x00,
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::Connect(p) => p.encode_body(buf),
            Self::ConnAck(p) => p.encode_body(buf),
            Self::Publish(p) => p.encode_body(buf),
            Self::PubAck(p) => p.encode_body(buf),
            Self::PubRec(p) => p.encode_body(buf),
            Self::PubRel(p) => p.encode_body(buf),
            Self::PubComp(p) => p.encode_body(buf),
            Self::Subscribe(p) => p.encode_body(buf),
            Self::SubAck(p) => p.encode_body(buf),
            Self::Unsubscribe(p) => p.encode_body(buf),
            Self::UnsubAck(p) => p.encode_body(buf),
            Self::PingReq | Self::PingResp | Self::Disconnect => Ok(()),
        }
    }

    /// Encodes the complete wire frame.
    pub fn encode(&self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        let mut frame = BytesMut::with_capacity(body.len() + 5);
        frame.put_u8((self.packet_type().as_u8() << 4) | self.flags());
        encode_remaining_length(&mut frame, body.len())?;
        frame.extend_from_slice(&body);
        Ok(frame.freeze())
    }

    /// The message identifier carried by the variable header, when the
    /// packet type has one.
    #[must_use]
    pub fn message_identifier(&self) -> Option<u16> {
        match self {
            Self::Publish(p) => p.message_identifier,
            Self::PubAck(p) => Some(p.message_identifier),
            Self::PubRec(p) => Some(p.message_identifier),
            Self::PubRel(p) => Some(p.message_identifier),
            Self::PubComp(p) => Some(p.message_identifier),
            Self::Subscribe(p) => Some(p.message_identifier),
            Self::SubAck(p) => Some(p.message_identifier),
            Self::Unsubscribe(p) => Some(p.message_identifier),
            Self::UnsubAck(p) => Some(p.message_identifier),
            _ => None,
        }
    }
}

/// Decodes one packet from `bytes` starting at `offset`.
///
/// Returns `Ok(None)` when the slice does not yet hold a complete frame.
/// On success the returned offset points one past the decoded frame.
pub fn decode_packet(bytes: &[u8], offset: usize) -> Result<Option<(Packet, usize)>> {
    let Some(&first) = bytes.get(offset) else {
        return Ok(None);
    };
    let packet_type = PacketType::try_from(first >> 4)?;
    let flags = first & 0x0F;

    let Some((remaining, body_start)) = decode_remaining_length(bytes, offset + 1)? else {
        return Ok(None);
    };
    let body_end = body_start + remaining;
    let Some(body) = bytes.get(body_start..body_end) else {
        return Ok(None);
    };

    let packet = match packet_type {
        PacketType::Connect => {
            // A client never receives CONNECT.
            return Err(ClientError::InvalidMqttMessageType(
                PacketType::Connect.as_u8(),
            ));
        }
        PacketType::ConnAck => Packet::ConnAck(ConnAckPacket::decode_body(body)?),
        PacketType::Publish => Packet::Publish(PublishPacket::decode_body(flags, body)?),
        PacketType::PubAck => Packet::PubAck(PubAckPacket::decode_body(flags, body)?),
        PacketType::PubRec => Packet::PubRec(PubRecPacket::decode_body(flags, body)?),
        PacketType::PubRel => Packet::PubRel(PubRelPacket::decode_body(flags, body)?),
        PacketType::PubComp => Packet::PubComp(PubCompPacket::decode_body(flags, body)?),
        PacketType::Subscribe => Packet::Subscribe(SubscribePacket::decode_body(body)?),
        PacketType::SubAck => Packet::SubAck(SubAckPacket::decode_body(body)?),
        PacketType::Unsubscribe => Packet::Unsubscribe(UnsubscribePacket::decode_body(body)?),
        PacketType::UnsubAck => Packet::UnsubAck(UnsubAckPacket::decode_body(flags, body)?),
        PacketType::PingReq => Packet::PingReq,
        PacketType::PingResp => Packet::PingResp,
        PacketType::Disconnect => Packet::Disconnect,
    };
    Ok(Some((packet, body_end)))
}
