use std::time::Duration;

use crate::error::{ClientError, Result};

/// Quality of service for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ClientError::InvalidArgument(format!(
                "QoS must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

/// Wire protocol revision. The level byte goes into CONNECT; the
/// subprotocol string is offered during the WebSocket upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProtocolVersion {
    V3 = 3,
    #[default]
    V4 = 4,
}

impl ProtocolVersion {
    #[must_use]
    pub const fn protocol_name(self) -> &'static str {
        match self {
            Self::V3 => "MQIsdp",
            Self::V4 => "MQTT",
        }
    }

    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn subprotocol(self) -> &'static str {
        match self {
            Self::V3 => "mqttv3.1",
            Self::V4 => "mqtt",
        }
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ClientError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            other => Err(ClientError::InvalidArgument(format!(
                "mqtt_version must be 3 or 4, got {other}"
            ))),
        }
    }
}

/// An application message as published or delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub destination_name: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
    pub duplicate: bool,
}

impl Message {
    #[must_use]
    pub fn new(destination_name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination_name: destination_name.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retained: false,
            duplicate: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    /// Payload interpreted as UTF-8 text, when it is.
    #[must_use]
    pub fn payload_string(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Options for one connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// How long to wait for CONNACK before moving to the next URI.
    pub timeout: Duration,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub will_message: Option<Message>,
    /// Seconds between control packets before a PINGREQ is due. Zero
    /// disables keep-alive supervision.
    pub keep_alive_interval: u16,
    pub clean_session: bool,
    pub use_ssl: bool,
    pub mqtt_version: ProtocolVersion,
    /// Whether the caller pinned the version. An unpinned 3.1.1 connect
    /// falls back to 3.1 after every URI has been tried.
    pub mqtt_version_explicit: bool,
    /// Explicit server URIs. Takes precedence over `hosts`/`ports`.
    pub uris: Vec<String>,
    /// Paired with `ports` index-by-index to derive URIs.
    pub hosts: Vec<String>,
    pub ports: Vec<u16>,
    pub path: String,
    /// Reconnect automatically after an established session drops.
    pub reconnect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_name: None,
            password: None,
            will_message: None,
            keep_alive_interval: 60,
            clean_session: true,
            use_ssl: false,
            mqtt_version: ProtocolVersion::V4,
            mqtt_version_explicit: false,
            uris: Vec::new(),
            hosts: Vec::new(),
            ports: Vec::new(),
            path: String::from("/mqtt"),
            reconnect: false,
        }
    }
}

impl ConnectOptions {
    pub fn validate(&self) -> Result<()> {
        if self.password.is_some() && self.user_name.is_none() {
            return Err(ClientError::InvalidArgument(
                "password requires user_name".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidArgument(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.hosts.len() != self.ports.len() {
            return Err(ClientError::InvalidArgument(format!(
                "hosts and ports must pair up, got {} hosts and {} ports",
                self.hosts.len(),
                self.ports.len()
            )));
        }
        if let Some(will) = &self.will_message {
            if will.destination_name.is_empty() {
                return Err(ClientError::InvalidArgument(
                    "will message requires a destination".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Broker verdict on a SUBSCRIBE request: either every filter was granted a
/// QoS, or at least one came back as the 0x80 failure byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubAckResult {
    Granted(Vec<u8>),
    Failure(Vec<u8>),
}

impl SubAckResult {
    #[must_use]
    pub fn from_return_codes(codes: Vec<u8>) -> Self {
        if codes.iter().any(|&c| c == 0x80) {
            Self::Failure(codes)
        } else {
            Self::Granted(codes)
        }
    }
}

/// Client identifiers are 1..=65535 characters, a surrogate pair counting
/// as one (i.e. one Unicode scalar value).
pub fn validate_client_id(client_id: &str) -> Result<()> {
    let chars = client_id.chars().count();
    if chars == 0 || chars > 65_535 {
        return Err(ClientError::InvalidArgument(format!(
            "client id must be 1..=65535 characters, got {chars}"
        )));
    }
    Ok(())
}
