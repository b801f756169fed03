use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Stable numeric codes surfaced through callbacks and the trace log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Ok = 0,
    ConnectTimeout = 1,
    SubscribeTimeout = 2,
    UnsubscribeTimeout = 3,
    PingTimeout = 4,
    InternalError = 5,
    ConnAckReturnCode = 6,
    SocketError = 7,
    SocketClose = 8,
    MalformedUtf = 9,
    Unsupported = 10,
    InvalidState = 11,
    InvalidType = 12,
    InvalidArgument = 13,
    UnsupportedOperation = 14,
    InvalidStoredData = 15,
    InvalidMqttMessageType = 16,
    MalformedUnicode = 17,
    BufferFull = 18,
    ExternalError = 19,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("CONNACK not received within the connect timeout")]
    ConnectTimeout,

    #[error("SUBACK not received within the request timeout")]
    SubscribeTimeout,

    #[error("UNSUBACK not received within the request timeout")]
    UnsubscribeTimeout,

    #[error("no PINGRESP within the keep-alive interval")]
    PingTimeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("connection refused by broker: {code} {reason}")]
    ConnAckReturnCode { code: u8, reason: &'static str },

    #[error("socket error: {0}")]
    SocketError(String),

    #[error("socket closed")]
    SocketClose,

    #[error("malformed UTF-8 data: {0}")]
    MalformedUtf(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid type for {0}")]
    InvalidType(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid stored data for key {key}: {detail}")]
    InvalidStoredData { key: String, detail: String },

    #[error("invalid MQTT message type: {0}")]
    InvalidMqttMessageType(u8),

    #[error("malformed unicode: {0}")]
    MalformedUnicode(String),

    #[error("disconnected publish buffer is full")]
    BufferFull,

    #[error("external error: {0}")]
    External(String),
}

impl ClientError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectTimeout => ErrorCode::ConnectTimeout,
            Self::SubscribeTimeout => ErrorCode::SubscribeTimeout,
            Self::UnsubscribeTimeout => ErrorCode::UnsubscribeTimeout,
            Self::PingTimeout => ErrorCode::PingTimeout,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::ConnAckReturnCode { .. } => ErrorCode::ConnAckReturnCode,
            Self::SocketError(_) => ErrorCode::SocketError,
            Self::SocketClose => ErrorCode::SocketClose,
            Self::MalformedUtf(_) => ErrorCode::MalformedUtf,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::InvalidType(_) => ErrorCode::InvalidType,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::UnsupportedOperation(_) => ErrorCode::UnsupportedOperation,
            Self::InvalidStoredData { .. } => ErrorCode::InvalidStoredData,
            Self::InvalidMqttMessageType(_) => ErrorCode::InvalidMqttMessageType,
            Self::MalformedUnicode(_) => ErrorCode::MalformedUnicode,
            Self::BufferFull => ErrorCode::BufferFull,
            Self::External(_) => ErrorCode::ExternalError,
        }
    }

    /// Maps a CONNACK return code to the error the connect caller sees.
    #[must_use]
    pub fn from_connack_code(code: u8) -> Self {
        Self::ConnAckReturnCode {
            code,
            reason: connack_reason(code),
        }
    }
}

/// Human-readable text for the CONNACK return codes of MQTT 3.1.1 §3.2.2.3.
#[must_use]
pub fn connack_reason(code: u8) -> &'static str {
    match code {
        0 => "Connection Accepted",
        1 => "Connection Refused: unacceptable protocol version",
        2 => "Connection Refused: identifier rejected",
        3 => "Connection Refused: server unavailable",
        4 => "Connection Refused: bad user name or password",
        5 => "Connection Refused: not authorized",
        _ => "Connection Refused: unknown return code",
    }
}
