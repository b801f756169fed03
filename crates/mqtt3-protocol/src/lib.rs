#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::if_not_else)]

pub mod client;
pub mod connection;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod keepalive;
pub mod packet;
pub mod persist;
pub mod session;
pub mod types;

pub use client::{Action, Engine, Notification, TimerId};
pub use connection::{ConnectionState, ReconnectBackoff};
pub use decoder::ReassemblyBuffer;
pub use error::{ClientError, ErrorCode, Result};
pub use packet::{Packet, PacketType};
pub use persist::{DeliveryStore, MemoryStore};
pub use types::{ConnectOptions, Message, ProtocolVersion, QoS, SubAckResult};
