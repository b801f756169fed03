use bytes::{BufMut, BytesMut};

use crate::error::{ClientError, Result};

/// Broker response to CONNECT: the accept/refuse return code plus the
/// 3.1.1 session-present flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAckPacket {
    #[must_use]
    pub const fn new(session_present: bool, return_code: u8) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        buf.put_u8(self.return_code);
        Ok(())
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() != 2 {
            return Err(ClientError::Internal(format!(
                "CONNACK body must be two bytes, got {}",
                body.len()
            )));
        }
        Ok(Self {
            session_present: body[0] & 0x01 != 0,
            return_code: body[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_packet, Packet};

    #[test]
    fn test_connack_accepted() {
        let (packet, end) = decode_packet(&[0x20, 0x02, 0x00, 0x00], 0).unwrap().unwrap();
        assert_eq!(end, 4);
        match packet {
            Packet::ConnAck(connack) => {
                assert!(!connack.session_present);
                assert_eq!(connack.return_code, 0);
            }
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    #[test]
    fn test_connack_session_present() {
        let (packet, _) = decode_packet(&[0x20, 0x02, 0x01, 0x00], 0).unwrap().unwrap();
        match packet {
            Packet::ConnAck(connack) => assert!(connack.session_present),
            other => panic!("expected CONNACK, got {other:?}"),
        }
    }

    #[test]
    fn test_connack_round_trip() {
        let packet = Packet::ConnAck(ConnAckPacket::new(true, 5));
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.as_ref(), [0x20, 0x02, 0x01, 0x05]);
        let (decoded, _) = decode_packet(&bytes, 0).unwrap().unwrap();
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn test_connack_bad_length() {
        assert!(ConnAckPacket::decode_body(&[0x00]).is_err());
        assert!(ConnAckPacket::decode_body(&[0x00, 0x00, 0x00]).is_err());
    }
}
