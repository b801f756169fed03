use bytes::{BufMut, BytesMut};

use crate::encoding::{write_binary, write_utf8_string};
use crate::error::Result;
use crate::types::{Message, ProtocolVersion};

mod connect_flags {
    pub const CLEAN_SESSION: u8 = 0x02;
    pub const WILL: u8 = 0x04;
    pub const WILL_RETAIN: u8 = 0x20;
    pub const PASSWORD: u8 = 0x40;
    pub const USER_NAME: u8 = 0x80;
}

/// CONNECT carries the protocol id for the negotiated revision
/// (`MQIsdp`/level 3 or `MQTT`/level 4) and the session payload.
///
/// Decode is intentionally absent: a client never receives CONNECT, and the
/// flag byte encodes optional-field presence one-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub version: ProtocolVersion,
    pub client_id: String,
    pub keep_alive: u16,
    pub clean_session: bool,
    pub will: Option<Message>,
    pub user_name: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_utf8_string(buf, self.version.protocol_name())?;
        buf.put_u8(self.version.level());

        let mut flags = 0u8;
        if self.clean_session {
            flags |= connect_flags::CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= connect_flags::WILL;
            flags |= will.qos.as_u8() << 3;
            if will.retained {
                flags |= connect_flags::WILL_RETAIN;
            }
        }
        if self.password.is_some() {
            flags |= connect_flags::PASSWORD;
        }
        if self.user_name.is_some() {
            flags |= connect_flags::USER_NAME;
        }
        buf.put_u8(flags);
        buf.put_u16(self.keep_alive);

        write_utf8_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            write_utf8_string(buf, &will.destination_name)?;
            write_binary(buf, &will.payload)?;
        }
        if let Some(user_name) = &self.user_name {
            write_utf8_string(buf, user_name)?;
        }
        if let Some(password) = &self.password {
            write_utf8_string(buf, password)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::types::QoS;

    fn minimal(version: ProtocolVersion) -> ConnectPacket {
        ConnectPacket {
            version,
            client_id: "cid".into(),
            keep_alive: 60,
            clean_session: true,
            will: None,
            user_name: None,
            password: None,
        }
    }

    #[test]
    fn test_connect_v4_bytes() {
        let bytes = Packet::Connect(minimal(ProtocolVersion::V4)).encode().unwrap();
        assert_eq!(
            bytes.as_ref(),
            [
                0x10, 0x0F, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, // protocol id + level
                0x02, // clean session
                0x00, 0x3C, // keep alive
                0x00, 0x03, b'c', b'i', b'd',
            ]
        );
    }

    #[test]
    fn test_connect_v3_bytes() {
        let bytes = Packet::Connect(minimal(ProtocolVersion::V3)).encode().unwrap();
        assert_eq!(
            bytes.as_ref(),
            [
                0x10, 0x11,
                0x00, 0x06, b'M', b'Q', b'I', b's', b'd', b'p', 0x03,
                0x02,
                0x00, 0x3C,
                0x00, 0x03, b'c', b'i', b'd',
            ]
        );
    }

    #[test]
    fn test_connect_flags_with_credentials_and_will() {
        let packet = ConnectPacket {
            will: Some(
                Message::new("last/will", b"gone".to_vec())
                    .with_qos(QoS::AtLeastOnce)
                    .with_retained(true),
            ),
            user_name: Some("user".into()),
            password: Some("pass".into()),
            clean_session: false,
            ..minimal(ProtocolVersion::V4)
        };
        let mut buf = BytesMut::new();
        packet.encode_body(&mut buf).unwrap();

        // Flags byte sits right after the 7-byte protocol header.
        let flags = buf[7];
        assert_eq!(flags, 0x04 | (1 << 3) | 0x20 | 0x40 | 0x80);

        // Payload order: client id, will topic, will payload, user, password.
        let tail = &buf[11..];
        assert_eq!(&tail[0..5], [0x00, 0x03, b'c', b'i', b'd']);
        assert_eq!(&tail[5..7], [0x00, 0x09]);
        assert_eq!(&tail[7..16], b"last/will");
        assert_eq!(&tail[16..18], [0x00, 0x04]);
        assert_eq!(&tail[18..22], b"gone");
        assert_eq!(&tail[22..28], [0x00, 0x04, b'u', b's', b'e', b'r']);
        assert_eq!(&tail[28..34], [0x00, 0x04, b'p', b'a', b's', b's']);
    }
}
