//! The acknowledgement packets whose body is a single 16-bit message
//! identifier: PUBACK, PUBREC, PUBREL, PUBCOMP and UNSUBACK.

use bytes::{BufMut, BytesMut};

use crate::encoding::read_u16;
use crate::error::{ClientError, Result};

macro_rules! define_ack_packet {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        error_prefix = $prefix:literal;
        flags = $flags:literal;
        validate_flags = $validate:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub message_identifier: u16,
        }

        impl $name {
            #[must_use]
            pub const fn new(message_identifier: u16) -> Self {
                Self { message_identifier }
            }

            #[must_use]
            pub const fn flags() -> u8 {
                $flags
            }

            pub(crate) fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
                buf.put_u16(self.message_identifier);
                Ok(())
            }

            pub(crate) fn decode_body(flags: u8, body: &[u8]) -> Result<Self> {
                if $validate && flags != $flags {
                    return Err(ClientError::Internal(format!(
                        concat!($prefix, " carries invalid header flags 0x{:02x}"),
                        flags
                    )));
                }
                if body.len() != 2 {
                    return Err(ClientError::Internal(format!(
                        concat!($prefix, " body must be two bytes, got {}"),
                        body.len()
                    )));
                }
                let (message_identifier, _) = read_u16(body, 0)?;
                Ok(Self { message_identifier })
            }
        }
    };
}

define_ack_packet! {
    /// Acknowledges a QoS 1 PUBLISH.
    pub struct PubAckPacket;
    error_prefix = "PUBACK";
    flags = 0x00;
    validate_flags = false;
}

define_ack_packet! {
    /// First acknowledgement of a QoS 2 PUBLISH.
    pub struct PubRecPacket;
    error_prefix = "PUBREC";
    flags = 0x00;
    validate_flags = false;
}

define_ack_packet! {
    /// Releases a received QoS 2 PUBLISH. Carries the fixed 0x02 flags.
    pub struct PubRelPacket;
    error_prefix = "PUBREL";
    flags = 0x02;
    validate_flags = true;
}

define_ack_packet! {
    /// Completes a QoS 2 flow.
    pub struct PubCompPacket;
    error_prefix = "PUBCOMP";
    flags = 0x00;
    validate_flags = false;
}

define_ack_packet! {
    /// Acknowledges an UNSUBSCRIBE.
    pub struct UnsubAckPacket;
    error_prefix = "UNSUBACK";
    flags = 0x00;
    validate_flags = false;
}
