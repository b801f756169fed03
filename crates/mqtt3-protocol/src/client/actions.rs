use std::time::Duration;

use crate::error::ClientError;
use crate::packet::Packet;
use crate::types::{Message, SubAckResult};

/// Timers the engine asks its runtime to arm. All are one-shot; arming an
/// already-armed id replaces the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// CONNACK deadline for the connect attempt in flight.
    Connect,
    /// Next automatic reconnect attempt.
    Reconnect,
    /// Keep-alive one-shot window.
    Ping,
    /// Per-request SUBSCRIBE/UNSUBSCRIBE deadline, keyed by identifier.
    Request(u16),
}

/// One instruction to the runtime shell, executed in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenTransport {
        uri: String,
        subprotocol: &'static str,
    },
    SendPacket(Packet),
    CloseTransport,
    Schedule {
        timer: TimerId,
        delay: Duration,
    },
    Cancel {
        timer: TimerId,
    },
    Notify(Notification),
}

impl Action {
    pub(crate) fn schedule(timer: TimerId, delay: Duration) -> Self {
        Self::Schedule { timer, delay }
    }

    pub(crate) fn cancel(timer: TimerId) -> Self {
        Self::Cancel { timer }
    }
}

/// User-visible outcomes, the callback surface rendered as typed events.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The connect call succeeded (CONNACK accepted).
    ConnectSuccess,
    /// Session established; `reconnect` marks attempts driven by the
    /// backoff loop rather than a user connect call.
    Connected {
        reconnect: bool,
        uri: String,
    },
    /// Every URI (and the 3.1 fallback, when eligible) was exhausted.
    ConnectFailure(ClientError),
    /// An established session dropped.
    ConnectionLost(ClientError),
    /// A clean user-requested disconnect completed.
    Disconnected,
    MessageDelivered(Message),
    MessageArrived(Message),
    SubscribeResult {
        topics: Vec<String>,
        result: Result<SubAckResult, ClientError>,
    },
    UnsubscribeResult {
        topics: Vec<String>,
        result: Result<(), ClientError>,
    },
}
