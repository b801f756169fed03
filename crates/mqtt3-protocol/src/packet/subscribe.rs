use bytes::{BufMut, BytesMut};

use crate::encoding::{read_u16, read_utf8_string, write_utf8_string};
use crate::error::{ClientError, Result};
use crate::types::QoS;

/// SUBSCRIBE carries a topic-filter list and a requested-QoS list as
/// parallel arrays, one QoS byte after each filter on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub message_identifier: u16,
    pub topics: Vec<String>,
    pub requested_qos: Vec<QoS>,
}

impl SubscribePacket {
    #[must_use]
    pub const fn new(message_identifier: u16, topics: Vec<String>, requested_qos: Vec<QoS>) -> Self {
        Self {
            message_identifier,
            topics,
            requested_qos,
        }
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        if self.topics.len() != self.requested_qos.len() {
            return Err(ClientError::Internal(format!(
                "SUBSCRIBE topic/QoS lists diverge: {} vs {}",
                self.topics.len(),
                self.requested_qos.len()
            )));
        }
        buf.put_u16(self.message_identifier);
        for (topic, qos) in self.topics.iter().zip(&self.requested_qos) {
            write_utf8_string(buf, topic)?;
            buf.put_u8(qos.as_u8());
        }
        Ok(())
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let (message_identifier, mut offset) = read_u16(body, 0)?;
        let mut topics = Vec::new();
        let mut requested_qos = Vec::new();
        while offset < body.len() {
            let (topic, next) = read_utf8_string(body, offset)?;
            let Some(&qos_byte) = body.get(next) else {
                return Err(ClientError::Internal(
                    "SUBSCRIBE filter missing its QoS byte".into(),
                ));
            };
            let qos = QoS::try_from(qos_byte).map_err(|_| {
                ClientError::Internal(format!("SUBSCRIBE requests reserved QoS {qos_byte}"))
            })?;
            topics.push(topic);
            requested_qos.push(qos);
            offset = next + 1;
        }
        Ok(Self {
            message_identifier,
            topics,
            requested_qos,
        })
    }
}
