use bytes::{BufMut, BytesMut};

use crate::encoding::{read_u16, read_utf8_string, write_utf8_string};
use crate::error::{ClientError, Result};

/// UNSUBSCRIBE: identifier followed by the topic-filter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub message_identifier: u16,
    pub topics: Vec<String>,
}

impl UnsubscribePacket {
    #[must_use]
    pub const fn new(message_identifier: u16, topics: Vec<String>) -> Self {
        Self {
            message_identifier,
            topics,
        }
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.message_identifier);
        for topic in &self.topics {
            write_utf8_string(buf, topic)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let (message_identifier, mut offset) = read_u16(body, 0)?;
        let mut topics = Vec::new();
        while offset < body.len() {
            let (topic, next) = read_utf8_string(body, offset)?;
            topics.push(topic);
            offset = next;
        }
        if topics.is_empty() {
            return Err(ClientError::Internal(
                "UNSUBSCRIBE carries no topic filters".into(),
            ));
        }
        Ok(Self {
            message_identifier,
            topics,
        })
    }
}
