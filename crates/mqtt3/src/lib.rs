#![warn(clippy::pedantic)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

//! Tokio shell around the sans-io [`mqtt3_protocol`] engine: one task owns
//! the protocol state and reacts to user commands, transport events and
//! timer deadlines; outcomes stream back as [`ClientEvent`]s.

pub mod client;
pub mod trace;
pub mod transport;

pub use client::{Client, ClientEvent};
pub use trace::{TraceBuffer, TraceEntry};
pub use transport::{memory, Transport, TransportEvent};

pub use mqtt3_protocol::{
    ClientError, ConnectOptions, ErrorCode, MemoryStore, Message, ProtocolVersion, QoS, Result,
    SubAckResult,
};
