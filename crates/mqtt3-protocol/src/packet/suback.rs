use bytes::{BufMut, BytesMut};

use crate::encoding::read_u16;
use crate::error::{ClientError, Result};

/// SUBACK: one return-code byte per requested filter, `0x00..0x02` for the
/// granted QoS or `0x80` for failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub message_identifier: u16,
    pub return_codes: Vec<u8>,
}

impl SubAckPacket {
    #[must_use]
    pub const fn new(message_identifier: u16, return_codes: Vec<u8>) -> Self {
        Self {
            message_identifier,
            return_codes,
        }
    }

    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.return_codes.iter().any(|&c| c == 0x80)
    }

    pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.message_identifier);
        buf.put_slice(&self.return_codes);
        Ok(())
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        if body.len() < 3 {
            return Err(ClientError::Internal(format!(
                "SUBACK needs an identifier and at least one return code, got {} bytes",
                body.len()
            )));
        }
        let (message_identifier, offset) = read_u16(body, 0)?;
        Ok(Self {
            message_identifier,
            return_codes: body[offset..].to_vec(),
        })
    }
}
