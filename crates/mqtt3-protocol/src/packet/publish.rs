use bytes::{BufMut, BytesMut};

use crate::encoding::{read_u16, read_utf8_string, write_utf8_string};
use crate::error::{ClientError, Result};
use crate::types::{Message, QoS};

/// PUBLISH. The fixed-header flags carry `DUP<<3 | QoS<<1 | RETAIN`; the
/// message identifier is present exactly when QoS > 0; the payload runs to
/// the end of the frame with no length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub message: Message,
    pub message_identifier: Option<u16>,
}

impl PublishPacket {
    #[must_use]
    pub const fn new(message: Message, message_identifier: Option<u16>) -> Self {
        Self {
            message,
            message_identifier,
        }
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        let mut flags = self.message.qos.as_u8() << 1;
        if self.message.duplicate {
            flags |= 0x08;
        }
        if self.message.retained {
            flags |= 0x01;
        }
        flags
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        write_utf8_string(buf, &self.message.destination_name)?;
        if self.message.qos != QoS::AtMostOnce {
            let Some(id) = self.message_identifier else {
                return Err(ClientError::Internal(
                    "QoS > 0 PUBLISH without a message identifier".into(),
                ));
            };
            buf.put_u16(id);
        }
        buf.put_slice(&self.message.payload);
        Ok(())
    }

    pub(crate) fn decode_body(flags: u8, body: &[u8]) -> Result<Self> {
        let qos_bits = (flags >> 1) & 0x03;
        let qos = QoS::try_from(qos_bits).map_err(|_| {
            ClientError::Internal(format!("PUBLISH carries reserved QoS {qos_bits}"))
        })?;
        let duplicate = flags & 0x08 != 0;
        let retained = flags & 0x01 != 0;

        let (destination_name, mut offset) = read_utf8_string(body, 0)?;
        let message_identifier = if qos != QoS::AtMostOnce {
            let (id, next) = read_u16(body, offset)?;
            offset = next;
            Some(id)
        } else {
            None
        };

        Ok(Self {
            message: Message {
                destination_name,
                payload: body[offset..].to_vec(),
                qos,
                retained,
                duplicate,
            },
            message_identifier,
        })
    }
}
