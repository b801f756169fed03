use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::{build_uris, ConnectionState, ReconnectBackoff};
use crate::decoder::ReassemblyBuffer;
use crate::error::{ClientError, Result};
use crate::keepalive::{PingOutcome, Pinger};
use crate::packet::{
    ConnAckPacket, ConnectPacket, Packet, PubAckPacket, PubCompPacket, PubRecPacket,
    PubRelPacket, PublishPacket, SubAckPacket, SubscribePacket, UnsubAckPacket, UnsubscribePacket,
};
use crate::persist::{self, DeliveryStore};
use crate::session::{OutboxEntry, SentPublish, SessionTables};
use crate::types::{
    validate_client_id, ConnectOptions, Message, ProtocolVersion, QoS, SubAckResult,
};

use super::actions::{Action, Notification, TimerId};

pub const DEFAULT_DISCONNECTED_BUFFER_SIZE: usize = 5_000;

/// A QoS 0 message accepted while disconnected, waiting for the next
/// CONNACK to drain in sequence order.
#[derive(Debug, Clone)]
struct BufferedPublish {
    message: Message,
    sequence: u32,
}

/// The protocol engine. One instance per `(uri, clientId)`; all state
/// transitions flow through its methods, which return the actions the
/// runtime must carry out in order.
#[derive(Debug)]
pub struct Engine<S> {
    store: S,
    uri: String,
    client_id: String,

    state: ConnectionState,
    tables: SessionTables,
    reassembly: ReassemblyBuffer,

    options: Option<ConnectOptions>,
    uris: Vec<String>,
    host_index: usize,
    version: ProtocolVersion,
    current_uri: String,

    pinger: Pinger,
    backoff: ReconnectBackoff,

    /// Outbound queue: LIFO push at the front, LIFO pop at the back, which
    /// yields FIFO emission.
    queue: VecDeque<Packet>,
    buffered: VecDeque<BufferedPublish>,

    pub disconnected_publishing: bool,
    pub disconnected_buffer_size: usize,
}

impl<S: DeliveryStore> Engine<S> {
    /// Builds an engine and restores any persisted session state for this
    /// `(uri, clientId)`. Restored outbound publishes are marked as
    /// duplicates for redelivery.
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>, store: S) -> Result<Self> {
        let uri = uri.into();
        let client_id = client_id.into();
        validate_client_id(&client_id)?;

        let restored = persist::restore_session(&store, &uri, &client_id)?;
        let mut tables = SessionTables::new();
        for publish in restored.sent {
            tables.observe_sequence(publish.sequence);
            tables.insert_outbox(publish.message_identifier, OutboxEntry::Publish(publish));
        }
        for (message_identifier, message) in restored.received {
            tables.insert_inbox(message_identifier, message);
        }
        debug!(
            outbox = tables.outbox_len(),
            inbox = tables.inbox_len(),
            "restored session state"
        );

        Ok(Self {
            store,
            current_uri: uri.clone(),
            uri,
            client_id,
            state: ConnectionState::Idle,
            tables,
            reassembly: ReassemblyBuffer::new(),
            options: None,
            uris: Vec::new(),
            host_index: 0,
            version: ProtocolVersion::V4,
            pinger: Pinger::new(0),
            backoff: ReconnectBackoff::new(),
            queue: VecDeque::new(),
            buffered: VecDeque::new(),
            disconnected_publishing: false,
            disconnected_buffer_size: DEFAULT_DISCONNECTED_BUFFER_SIZE,
        })
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.tables.outbox_len()
    }

    #[must_use]
    pub fn inbox_len(&self) -> usize {
        self.tables.inbox_len()
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    // ---- user operations -------------------------------------------------

    pub fn connect(&mut self, options: ConnectOptions) -> Result<Vec<Action>> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Reconnecting => {}
            other => {
                return Err(ClientError::InvalidState(format!(
                    "connect called while {other:?}"
                )))
            }
        }
        options.validate()?;

        let mut actions = Vec::new();
        if self.state.is_reconnecting() {
            // A manual connect cancels the pending retry.
            actions.push(Action::cancel(TimerId::Reconnect));
        }

        self.uris = build_uris(&self.uri, &options);
        self.host_index = 0;
        self.version = options.mqtt_version;
        self.pinger = Pinger::new(options.keep_alive_interval);
        self.state = ConnectionState::Connecting;
        let timeout = options.timeout;
        self.options = Some(options);

        self.open_current_host(timeout, &mut actions);
        Ok(actions)
    }

    pub fn disconnect(&mut self) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        match self.state {
            ConnectionState::Idle => {
                return Err(ClientError::InvalidState(
                    "disconnect called while not connecting or connected".into(),
                ))
            }
            ConnectionState::Reconnecting => {
                actions.push(Action::cancel(TimerId::Reconnect));
            }
            ConnectionState::Connected => {
                // The caller observes the disconnect as soon as the packet
                // is handed to the transport, before teardown.
                actions.push(Action::SendPacket(Packet::Disconnect));
            }
            ConnectionState::Connecting | ConnectionState::Disconnecting => {}
        }
        self.state = ConnectionState::Disconnecting;
        self.teardown(&mut actions);
        self.state = ConnectionState::Idle;
        actions.push(Action::Notify(Notification::Disconnected));
        Ok(actions)
    }

    /// Publishes a message, or buffers it when disconnected publishing is
    /// enabled and a reconnect is pending.
    pub fn publish(&mut self, message: Message) -> Result<Vec<Action>> {
        if message.destination_name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "destination_name must not be empty".into(),
            ));
        }

        match self.state {
            ConnectionState::Connected => {
                let mut actions = Vec::new();
                if message.qos == QoS::AtMostOnce {
                    self.schedule_packet(Packet::Publish(PublishPacket::new(message, None)));
                } else {
                    let id = self.tables.allocate_identifier()?;
                    let publish = SentPublish {
                        message,
                        message_identifier: id,
                        sequence: self.tables.next_sequence(),
                        pub_rec_received: false,
                    };
                    persist::persist_sent(&mut self.store, &self.uri, &self.client_id, &publish)?;
                    let packet =
                        Packet::Publish(PublishPacket::new(publish.message.clone(), Some(id)));
                    self.tables.insert_outbox(id, OutboxEntry::Publish(publish));
                    self.schedule_packet(packet);
                }
                self.process_queue(&mut actions);
                Ok(actions)
            }
            ConnectionState::Reconnecting if self.disconnected_publishing => {
                if self.tables.outbox_len() + self.buffered.len() >= self.disconnected_buffer_size
                {
                    return Err(ClientError::BufferFull);
                }
                if message.qos == QoS::AtMostOnce {
                    let sequence = self.tables.next_sequence();
                    self.buffered.push_front(BufferedPublish { message, sequence });
                } else {
                    let id = self.tables.allocate_identifier()?;
                    let publish = SentPublish {
                        message,
                        message_identifier: id,
                        sequence: self.tables.next_sequence(),
                        pub_rec_received: false,
                    };
                    persist::persist_sent(&mut self.store, &self.uri, &self.client_id, &publish)?;
                    self.tables.insert_outbox(id, OutboxEntry::Publish(publish));
                }
                Ok(Vec::new())
            }
            other => Err(ClientError::InvalidState(format!(
                "publish called while {other:?}"
            ))),
        }
    }

    pub fn subscribe(
        &mut self,
        topics: Vec<String>,
        requested_qos: Vec<QoS>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Action>> {
        if !self.is_connected() {
            return Err(ClientError::InvalidState(
                "subscribe called while not connected".into(),
            ));
        }
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument(
                "subscribe needs at least one topic filter".into(),
            ));
        }
        if topics.len() != requested_qos.len() {
            return Err(ClientError::InvalidArgument(format!(
                "topic and QoS lists must pair up, got {} topics and {} QoS values",
                topics.len(),
                requested_qos.len()
            )));
        }

        let id = self.tables.allocate_identifier()?;
        self.tables.insert_outbox(
            id,
            OutboxEntry::Subscribe {
                topics: topics.clone(),
                requested_qos: requested_qos.clone(),
            },
        );

        let mut actions = Vec::new();
        if let Some(timeout) = timeout {
            actions.push(Action::schedule(TimerId::Request(id), timeout));
        }
        self.schedule_packet(Packet::Subscribe(SubscribePacket::new(
            id,
            topics,
            requested_qos,
        )));
        self.process_queue(&mut actions);
        Ok(actions)
    }

    pub fn unsubscribe(
        &mut self,
        topics: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Action>> {
        if !self.is_connected() {
            return Err(ClientError::InvalidState(
                "unsubscribe called while not connected".into(),
            ));
        }
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument(
                "unsubscribe needs at least one topic filter".into(),
            ));
        }

        let id = self.tables.allocate_identifier()?;
        self.tables.insert_outbox(
            id,
            OutboxEntry::Unsubscribe {
                topics: topics.clone(),
            },
        );

        let mut actions = Vec::new();
        if let Some(timeout) = timeout {
            actions.push(Action::schedule(TimerId::Request(id), timeout));
        }
        self.schedule_packet(Packet::Unsubscribe(UnsubscribePacket::new(id, topics)));
        self.process_queue(&mut actions);
        Ok(actions)
    }

    // ---- transport events ------------------------------------------------

    /// The transport for the current attempt is open: transmit CONNECT.
    pub fn transport_opened(&mut self) -> Vec<Action> {
        let Some(options) = &self.options else {
            return Vec::new();
        };
        let connect = ConnectPacket {
            version: self.version,
            client_id: self.client_id.clone(),
            keep_alive: options.keep_alive_interval,
            clean_session: options.clean_session,
            will: options.will_message.clone(),
            user_name: options.user_name.clone(),
            password: options.password.clone(),
        };
        let mut actions = Vec::new();
        self.emit_send(Packet::Connect(connect), &mut actions);
        actions
    }

    /// Bytes arrived. Frames reassemble into packets; any structural error
    /// is fatal to the connection.
    pub fn transport_data(&mut self, bytes: &[u8]) -> Vec<Action> {
        let packets = match self.reassembly.feed(bytes) {
            Ok(packets) => packets,
            Err(err) => {
                warn!(error = %err, "aborting connection on malformed inbound data");
                return self.disconnected(err);
            }
        };
        let mut actions = Vec::new();
        for packet in packets {
            actions.extend(self.handle_packet(packet));
            // A fatal packet may have torn the session down; later packets
            // from the same frame are stale.
            if !matches!(
                self.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                break;
            }
        }
        actions
    }

    pub fn transport_error(&mut self, detail: impl Into<String>) -> Vec<Action> {
        self.disconnected(ClientError::SocketError(detail.into()))
    }

    pub fn transport_closed(&mut self) -> Vec<Action> {
        self.disconnected(ClientError::SocketClose)
    }

    // ---- timers ----------------------------------------------------------

    pub fn timer_fired(&mut self, timer: TimerId) -> Vec<Action> {
        match timer {
            TimerId::Connect => self.disconnected(ClientError::ConnectTimeout),
            TimerId::Reconnect => self.begin_reconnect_attempt(),
            TimerId::Ping => match self.pinger.fire() {
                PingOutcome::SendPing => {
                    // PINGREQ bypasses the queue and does not re-arm the
                    // window; only real traffic or PINGRESP does.
                    vec![
                        Action::SendPacket(Packet::PingReq),
                        Action::schedule(TimerId::Ping, self.pinger.interval()),
                    ]
                }
                PingOutcome::Timeout => self.disconnected(ClientError::PingTimeout),
                PingOutcome::Disabled => Vec::new(),
            },
            TimerId::Request(id) => self.request_timed_out(id),
        }
    }

    fn request_timed_out(&mut self, id: u16) -> Vec<Action> {
        // The outbox entry stays: a late ack still completes the request.
        match self.tables.outbox_get(id) {
            Some(OutboxEntry::Subscribe { topics, .. }) => {
                vec![Action::Notify(Notification::SubscribeResult {
                    topics: topics.clone(),
                    result: Err(ClientError::SubscribeTimeout),
                })]
            }
            Some(OutboxEntry::Unsubscribe { topics }) => {
                vec![Action::Notify(Notification::UnsubscribeResult {
                    topics: topics.clone(),
                    result: Err(ClientError::UnsubscribeTimeout),
                })]
            }
            _ => Vec::new(),
        }
    }

    // ---- inbound packets -------------------------------------------------

    fn handle_packet(&mut self, packet: Packet) -> Vec<Action> {
        debug!(packet_type = ?packet.packet_type(), "inbound packet");
        match packet {
            Packet::ConnAck(connack) => self.handle_connack(&connack),
            Packet::Publish(publish) => self.handle_inbound_publish(publish),
            Packet::PubAck(PubAckPacket { message_identifier }) => {
                self.handle_puback(message_identifier)
            }
            Packet::PubRec(PubRecPacket { message_identifier }) => {
                self.handle_pubrec(message_identifier)
            }
            Packet::PubRel(PubRelPacket { message_identifier }) => {
                self.handle_pubrel(message_identifier)
            }
            Packet::PubComp(PubCompPacket { message_identifier }) => {
                self.handle_pubcomp(message_identifier)
            }
            Packet::SubAck(suback) => self.handle_suback(&suback),
            Packet::UnsubAck(UnsubAckPacket { message_identifier }) => {
                self.handle_unsuback(message_identifier)
            }
            Packet::PingResp => {
                let mut actions = Vec::new();
                self.rearm_pinger(&mut actions);
                actions
            }
            // A peer must never send these to a client.
            Packet::Disconnect | Packet::PingReq | Packet::Connect(_) | Packet::Subscribe(_)
            | Packet::Unsubscribe(_) => {
                let code = packet.packet_type().as_u8();
                self.disconnected(ClientError::InvalidMqttMessageType(code))
            }
        }
    }

    fn handle_connack(&mut self, connack: &ConnAckPacket) -> Vec<Action> {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            return self.disconnected(ClientError::Internal(
                "CONNACK received outside a connect attempt".into(),
            ));
        }

        let mut actions = vec![Action::cancel(TimerId::Connect)];

        let clean_session = self
            .options
            .as_ref()
            .is_some_and(|options| options.clean_session);
        if clean_session {
            self.tables.clear();
            persist::clear_all(&mut self.store, &self.uri, &self.client_id);
        }

        if connack.return_code != 0 {
            let mut rest = self.disconnected(ClientError::from_connack_code(connack.return_code));
            actions.append(&mut rest);
            return actions;
        }

        let was_reconnect = self.state.is_reconnecting();
        self.state = ConnectionState::Connected;
        // Pin past the end of the list: no further failover this session.
        self.host_index = self.uris.len();
        self.backoff.reset();
        debug!(uri = %self.current_uri, reconnect = was_reconnect, "session established");

        // Replay strictly by stored sequence: QoS 2 flows past PUBREC
        // resume with PUBREL, everything else with the original packet.
        let mut replay: Vec<(u32, Packet)> = self
            .tables
            .outbox_publishes()
            .into_iter()
            .map(|publish| {
                let packet = if publish.pub_rec_received {
                    Packet::PubRel(PubRelPacket::new(publish.message_identifier))
                } else {
                    Packet::Publish(PublishPacket::new(
                        publish.message.clone(),
                        Some(publish.message_identifier),
                    ))
                };
                (publish.sequence, packet)
            })
            .collect();
        for buffered in self.buffered.drain(..) {
            replay.push((
                buffered.sequence,
                Packet::Publish(PublishPacket::new(buffered.message, None)),
            ));
        }
        replay.sort_by_key(|(sequence, _)| *sequence);
        for (_, packet) in replay {
            self.schedule_packet(packet);
        }

        if !was_reconnect {
            // The connect call's own success fires once; backoff-driven
            // sessions only announce themselves through `Connected`.
            actions.push(Action::Notify(Notification::ConnectSuccess));
        }
        actions.push(Action::Notify(Notification::Connected {
            reconnect: was_reconnect,
            uri: self.current_uri.clone(),
        }));
        self.process_queue(&mut actions);
        actions
    }

    fn handle_inbound_publish(&mut self, publish: PublishPacket) -> Vec<Action> {
        let mut actions = Vec::new();
        match publish.message.qos {
            QoS::AtMostOnce => {
                actions.push(Action::Notify(Notification::MessageArrived(
                    publish.message,
                )));
            }
            QoS::AtLeastOnce => {
                let Some(id) = publish.message_identifier else {
                    return self.disconnected(ClientError::Internal(
                        "QoS 1 PUBLISH without a message identifier".into(),
                    ));
                };
                actions.push(Action::Notify(Notification::MessageArrived(
                    publish.message,
                )));
                self.schedule_packet(Packet::PubAck(PubAckPacket::new(id)));
                self.process_queue(&mut actions);
            }
            QoS::ExactlyOnce => {
                let Some(id) = publish.message_identifier else {
                    return self.disconnected(ClientError::Internal(
                        "QoS 2 PUBLISH without a message identifier".into(),
                    ));
                };
                // Delivery waits for PUBREL; until then the message sits in
                // the inbox and the store.
                if let Err(err) = persist::persist_received(
                    &mut self.store,
                    &self.uri,
                    &self.client_id,
                    id,
                    &publish.message,
                ) {
                    return self.disconnected(err);
                }
                self.tables.insert_inbox(id, publish.message);
                self.schedule_packet(Packet::PubRec(PubRecPacket::new(id)));
                self.process_queue(&mut actions);
            }
        }
        actions
    }

    fn handle_puback(&mut self, id: u16) -> Vec<Action> {
        match self.tables.outbox_get(id) {
            Some(OutboxEntry::Publish(_)) => {}
            _ => {
                // Stray ack, tolerated for broker-restart scenarios.
                debug!(id, "ignoring PUBACK with no matching outbox entry");
                return Vec::new();
            }
        }
        let Some(OutboxEntry::Publish(publish)) = self.tables.remove_outbox(id) else {
            return Vec::new();
        };
        persist::remove_sent(&mut self.store, &self.uri, &self.client_id, id);
        vec![Action::Notify(Notification::MessageDelivered(
            publish.message,
        ))]
    }

    fn handle_pubrec(&mut self, id: u16) -> Vec<Action> {
        let Some(OutboxEntry::Publish(publish)) = self.tables.outbox_get_mut(id) else {
            debug!(id, "ignoring PUBREC with no matching outbox entry");
            return Vec::new();
        };
        publish.pub_rec_received = true;
        let snapshot = publish.clone();
        if let Err(err) =
            persist::persist_sent(&mut self.store, &self.uri, &self.client_id, &snapshot)
        {
            return self.disconnected(err);
        }
        let mut actions = Vec::new();
        self.schedule_packet(Packet::PubRel(PubRelPacket::new(id)));
        self.process_queue(&mut actions);
        actions
    }

    fn handle_pubrel(&mut self, id: u16) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(message) = self.tables.remove_inbox(id) {
            persist::remove_received(&mut self.store, &self.uri, &self.client_id, id);
            actions.push(Action::Notify(Notification::MessageArrived(message)));
        }
        // PUBCOMP goes out even with no inbox entry (possible after a
        // restart) so the peer's flow can complete.
        self.schedule_packet(Packet::PubComp(PubCompPacket::new(id)));
        self.process_queue(&mut actions);
        actions
    }

    fn handle_pubcomp(&mut self, id: u16) -> Vec<Action> {
        match self.tables.outbox_get(id) {
            Some(OutboxEntry::Publish(_)) => {}
            _ => {
                debug!(id, "ignoring PUBCOMP with no matching outbox entry");
                return Vec::new();
            }
        }
        let Some(OutboxEntry::Publish(publish)) = self.tables.remove_outbox(id) else {
            return Vec::new();
        };
        persist::remove_sent(&mut self.store, &self.uri, &self.client_id, id);
        vec![Action::Notify(Notification::MessageDelivered(
            publish.message,
        ))]
    }

    fn handle_suback(&mut self, suback: &SubAckPacket) -> Vec<Action> {
        let id = suback.message_identifier;
        let Some(OutboxEntry::Subscribe { topics, .. }) = self.tables.outbox_get(id) else {
            debug!(id, "ignoring SUBACK with no matching outbox entry");
            return Vec::new();
        };
        let topics = topics.clone();
        self.tables.remove_outbox(id);
        vec![
            Action::cancel(TimerId::Request(id)),
            Action::Notify(Notification::SubscribeResult {
                topics,
                result: Ok(SubAckResult::from_return_codes(
                    suback.return_codes.clone(),
                )),
            }),
        ]
    }

    fn handle_unsuback(&mut self, id: u16) -> Vec<Action> {
        let Some(OutboxEntry::Unsubscribe { topics }) = self.tables.outbox_get(id) else {
            debug!(id, "ignoring UNSUBACK with no matching outbox entry");
            return Vec::new();
        };
        let topics = topics.clone();
        self.tables.remove_outbox(id);
        vec![
            Action::cancel(TimerId::Request(id)),
            Action::Notify(Notification::UnsubscribeResult {
                topics,
                result: Ok(()),
            }),
        ]
    }

    // ---- internals -------------------------------------------------------

    fn open_current_host(&mut self, timeout: Duration, actions: &mut Vec<Action>) {
        let uri = self.uris[self.host_index].clone();
        debug!(uri = %uri, version = ?self.version, "opening transport");
        self.current_uri = uri.clone();
        self.reassembly.clear();
        actions.push(Action::OpenTransport {
            uri,
            subprotocol: self.version.subprotocol(),
        });
        actions.push(Action::schedule(TimerId::Connect, timeout));
    }

    fn begin_reconnect_attempt(&mut self) -> Vec<Action> {
        if !self.state.is_reconnecting() {
            return Vec::new();
        }
        let Some(options) = &self.options else {
            return Vec::new();
        };
        let timeout = options.timeout;
        self.host_index = 0;
        let mut actions = Vec::new();
        self.open_current_host(timeout, &mut actions);
        actions
    }

    /// Session teardown and recovery routing: failover while still
    /// connecting, the backoff loop when configured, or surfacing the
    /// failure to the caller.
    fn disconnected(&mut self, err: ClientError) -> Vec<Action> {
        let mut actions = Vec::new();
        self.teardown(&mut actions);

        match self.state {
            ConnectionState::Reconnecting => {
                // One failed attempt of the backoff loop.
                self.backoff.advance();
                debug!(error = %err, delay = ?self.backoff.delay(), "reconnect attempt failed");
                actions.push(Action::schedule(TimerId::Reconnect, self.backoff.delay()));
            }
            ConnectionState::Connecting => {
                let timeout = self
                    .options
                    .as_ref()
                    .map_or(Duration::from_secs(30), |o| o.timeout);
                if self.host_index + 1 < self.uris.len() {
                    self.host_index += 1;
                    self.open_current_host(timeout, &mut actions);
                } else if self.version == ProtocolVersion::V4
                    && self
                        .options
                        .as_ref()
                        .is_some_and(|o| !o.mqtt_version_explicit)
                {
                    debug!("every URI refused MQTT 3.1.1, retrying as 3.1");
                    self.version = ProtocolVersion::V3;
                    self.host_index = 0;
                    self.open_current_host(timeout, &mut actions);
                } else {
                    self.state = ConnectionState::Idle;
                    actions.push(Action::Notify(Notification::ConnectFailure(err)));
                }
            }
            ConnectionState::Connected => {
                warn!(error = %err, "connection lost");
                actions.push(Action::Notify(Notification::ConnectionLost(err)));
                if self.options.as_ref().is_some_and(|o| o.reconnect) {
                    self.state = ConnectionState::Reconnecting;
                    actions.push(Action::schedule(TimerId::Reconnect, self.backoff.delay()));
                } else {
                    self.state = ConnectionState::Idle;
                }
            }
            ConnectionState::Idle | ConnectionState::Disconnecting => {}
        }
        actions
    }

    fn teardown(&mut self, actions: &mut Vec<Action>) {
        actions.push(Action::cancel(TimerId::Connect));
        actions.push(Action::cancel(TimerId::Ping));
        actions.push(Action::CloseTransport);
        self.queue.clear();
        self.reassembly.clear();
    }

    /// Front-insert; [`Self::process_queue`] pops from the back, so
    /// emission order is submission order.
    fn schedule_packet(&mut self, packet: Packet) {
        self.queue.push_front(packet);
    }

    fn process_queue(&mut self, actions: &mut Vec<Action>) {
        if !self.is_connected() {
            return;
        }
        while let Some(packet) = self.queue.pop_back() {
            self.emit_send(packet, actions);
        }
    }

    fn emit_send(&mut self, packet: Packet, actions: &mut Vec<Action>) {
        let delivered = match &packet {
            Packet::Publish(publish) if publish.message.qos == QoS::AtMostOnce => {
                Some(publish.message.clone())
            }
            _ => None,
        };
        actions.push(Action::SendPacket(packet));
        self.rearm_pinger(actions);
        if let Some(message) = delivered {
            actions.push(Action::Notify(Notification::MessageDelivered(message)));
        }
    }

    fn rearm_pinger(&mut self, actions: &mut Vec<Action>) {
        if self.pinger.reset() {
            actions.push(Action::cancel(TimerId::Ping));
            actions.push(Action::schedule(TimerId::Ping, self.pinger.interval()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;

    const URI: &str = "ws://broker.example:8080/mqtt";

    fn engine() -> Engine<MemoryStore> {
        Engine::new(URI, "cid", MemoryStore::new()).unwrap()
    }

    fn connect_engine(options: ConnectOptions) -> Engine<MemoryStore> {
        let mut engine = engine();
        engine.connect(options).unwrap();
        engine.transport_opened();
        engine.transport_data(&[0x20, 0x02, 0x00, 0x00]);
        assert!(engine.is_connected());
        engine
    }

    #[test]
    fn test_connect_opens_first_uri_with_v4_subprotocol() {
        let mut engine = engine();
        let actions = engine.connect(ConnectOptions::default()).unwrap();
        assert_eq!(
            actions[0],
            Action::OpenTransport {
                uri: URI.into(),
                subprotocol: "mqtt",
            }
        );
        assert!(matches!(
            actions[1],
            Action::Schedule {
                timer: TimerId::Connect,
                ..
            }
        ));
        assert_eq!(engine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_while_connected_is_invalid_state() {
        let mut engine = connect_engine(ConnectOptions::default());
        let err = engine.connect(ConnectOptions::default()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));
    }

    #[test]
    fn test_transport_open_sends_connect() {
        let mut engine = engine();
        engine.connect(ConnectOptions::default()).unwrap();
        let actions = engine.transport_opened();
        match &actions[0] {
            Action::SendPacket(Packet::Connect(connect)) => {
                assert_eq!(connect.client_id, "cid");
                assert_eq!(connect.version, ProtocolVersion::V4);
                assert!(connect.clean_session);
            }
            other => panic!("expected CONNECT, got {other:?}"),
        }
    }

    #[test]
    fn test_qos0_publish_sends_and_notifies() {
        let mut engine = connect_engine(ConnectOptions::default());
        let actions = engine.publish(Message::new("a/b", b"hi".to_vec())).unwrap();
        assert!(matches!(
            actions[0],
            Action::SendPacket(Packet::Publish(_))
        ));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Notify(Notification::MessageDelivered(_)))));
        assert_eq!(engine.outbox_len(), 0);
    }

    #[test]
    fn test_publish_while_idle_is_invalid_state() {
        let mut engine = engine();
        let err = engine.publish(Message::new("a", b"x".to_vec())).unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));
    }

    #[test]
    fn test_inbound_disconnect_is_fatal() {
        let mut engine = connect_engine(ConnectOptions::default());
        let actions = engine.transport_data(&[0xE0, 0x00]);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::ConnectionLost(
                ClientError::InvalidMqttMessageType(14)
            ))
        )));
        assert!(!engine.is_connected());
    }

    #[test]
    fn test_stray_acks_are_ignored() {
        let mut engine = connect_engine(ConnectOptions::default());
        assert!(engine.transport_data(&[0x40, 0x02, 0x00, 0x09]).is_empty());
        assert!(engine.transport_data(&[0x70, 0x02, 0x00, 0x09]).is_empty());
        assert!(engine.transport_data(&[0x50, 0x02, 0x00, 0x09]).is_empty());
        assert!(engine.is_connected());
    }

    #[test]
    fn test_disconnect_sends_packet_then_tears_down() {
        let mut engine = connect_engine(ConnectOptions::default());
        let actions = engine.disconnect().unwrap();
        assert_eq!(actions[0], Action::SendPacket(Packet::Disconnect));
        assert!(actions.contains(&Action::CloseTransport));
        assert_eq!(
            *actions.last().unwrap(),
            Action::Notify(Notification::Disconnected)
        );
        assert_eq!(engine.state(), ConnectionState::Idle);

        let err = engine.disconnect().unwrap_err();
        assert!(matches!(err, ClientError::InvalidState(_)));
    }
}
