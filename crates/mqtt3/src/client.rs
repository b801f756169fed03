//! The client handle and its event-loop task.
//!
//! All protocol state lives inside one spawned task that owns the engine.
//! Handle methods enqueue a command and return immediately; every outcome
//! comes back through the [`ClientEvent`] stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use mqtt3_protocol::client::{Action, Engine, Notification, TimerId};
use mqtt3_protocol::persist::DeliveryStore;
use mqtt3_protocol::{ClientError, ConnectOptions, Message, QoS, Result, SubAckResult};

use crate::trace::{TraceBuffer, TraceEntry};
use crate::transport::{Transport, TransportEvent};

/// Everything an application observes from its client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectSuccess,
    Connected { reconnect: bool, uri: String },
    ConnectFailure(ClientError),
    ConnectionLost(ClientError),
    Disconnected,
    MessageDelivered(Message),
    MessageArrived(Message),
    SubscribeResult {
        topics: Vec<String>,
        result: std::result::Result<SubAckResult, ClientError>,
    },
    UnsubscribeResult {
        topics: Vec<String>,
        result: std::result::Result<(), ClientError>,
    },
    /// An enqueued operation was rejected by the engine (invalid state,
    /// invalid argument, full buffer).
    OperationError(ClientError),
}

impl From<Notification> for ClientEvent {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::ConnectSuccess => Self::ConnectSuccess,
            Notification::Connected { reconnect, uri } => Self::Connected { reconnect, uri },
            Notification::ConnectFailure(err) => Self::ConnectFailure(err),
            Notification::ConnectionLost(err) => Self::ConnectionLost(err),
            Notification::Disconnected => Self::Disconnected,
            Notification::MessageDelivered(message) => Self::MessageDelivered(message),
            Notification::MessageArrived(message) => Self::MessageArrived(message),
            Notification::SubscribeResult { topics, result } => {
                Self::SubscribeResult { topics, result }
            }
            Notification::UnsubscribeResult { topics, result } => {
                Self::UnsubscribeResult { topics, result }
            }
        }
    }
}

enum Command {
    Connect(ConnectOptions),
    Disconnect,
    Publish(Message),
    Subscribe {
        topics: Vec<String>,
        requested_qos: Vec<QoS>,
        timeout: Option<Duration>,
    },
    Unsubscribe {
        topics: Vec<String>,
        timeout: Option<Duration>,
    },
    SetDisconnectedPublishing(bool),
    SetDisconnectedBufferSize(usize),
}

/// Cloneable handle onto the client task.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    trace: Arc<Mutex<TraceBuffer>>,
}

impl Client {
    /// Builds the engine (restoring any persisted session for
    /// `(uri, client_id)`), spawns the event-loop task and returns the
    /// handle plus the event stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<S, T, F>(
        uri: impl Into<String>,
        client_id: impl Into<String>,
        store: S,
        connector: F,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)>
    where
        S: DeliveryStore + Send + 'static,
        T: Transport,
        F: FnMut(&str, &str) -> T + Send + 'static,
    {
        let engine = Engine::new(uri, client_id, store)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let trace = Arc::new(Mutex::new(TraceBuffer::new()));

        let event_loop = EventLoop {
            engine,
            connector,
            transport: None::<T>,
            commands: command_rx,
            events: event_tx,
            timers: Vec::new(),
            connected: Arc::clone(&connected),
            trace: Arc::clone(&trace),
        };
        tokio::spawn(event_loop.run());

        Ok((
            Self {
                commands: command_tx,
                connected,
                trace,
            },
            event_rx,
        ))
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::InvalidState("client task has stopped".into()))
    }

    pub fn connect(&self, options: ConnectOptions) -> Result<()> {
        self.enqueue(Command::Connect(options))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.enqueue(Command::Disconnect)
    }

    pub fn publish(&self, message: Message) -> Result<()> {
        self.enqueue(Command::Publish(message))
    }

    /// Alias for [`Self::publish`].
    pub fn send(&self, message: Message) -> Result<()> {
        self.publish(message)
    }

    pub fn subscribe(
        &self,
        topics: Vec<String>,
        requested_qos: Vec<QoS>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.enqueue(Command::Subscribe {
            topics,
            requested_qos,
            timeout,
        })
    }

    pub fn unsubscribe(&self, topics: Vec<String>, timeout: Option<Duration>) -> Result<()> {
        self.enqueue(Command::Unsubscribe { topics, timeout })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_disconnected_publishing(&self, enabled: bool) -> Result<()> {
        self.enqueue(Command::SetDisconnectedPublishing(enabled))
    }

    pub fn set_disconnected_buffer_size(&self, size: usize) -> Result<()> {
        self.enqueue(Command::SetDisconnectedBufferSize(size))
    }

    pub fn start_trace(&self) {
        self.trace.lock().start();
    }

    pub fn stop_trace(&self) {
        self.trace.lock().stop();
    }

    #[must_use]
    pub fn trace_log(&self) -> Vec<TraceEntry> {
        self.trace.lock().log()
    }
}

struct EventLoop<S, T, F> {
    engine: Engine<S>,
    connector: F,
    transport: Option<T>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent>,
    timers: Vec<(TimerId, Instant)>,
    connected: Arc<AtomicBool>,
    trace: Arc<Mutex<TraceBuffer>>,
}

impl<S, T, F> EventLoop<S, T, F>
where
    S: DeliveryStore + Send + 'static,
    T: Transport,
    F: FnMut(&str, &str) -> T + Send + 'static,
{
    async fn run(mut self) {
        enum Wake {
            Command(Option<Command>),
            Transport(TransportEvent),
            Timer(TimerId),
        }

        loop {
            let next = self.timers.iter().copied().min_by_key(|(_, at)| *at);
            let sleep_at =
                next.map_or_else(|| Instant::now() + Duration::from_secs(3600), |(_, at)| at);

            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                event = Self::transport_event(&mut self.transport) => Wake::Transport(event),
                () = sleep_until(sleep_at), if next.is_some() => {
                    Wake::Timer(next.expect("timer branch requires a deadline").0)
                }
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => {
                    // Every handle dropped: shut the task down.
                    if let Some(mut transport) = self.transport.take() {
                        transport.close().await;
                    }
                    break;
                }
                Wake::Transport(event) => self.handle_transport_event(event).await,
                Wake::Timer(timer) => {
                    self.timers.retain(|(t, _)| *t != timer);
                    let actions = self.engine.timer_fired(timer);
                    self.apply_actions(actions).await;
                }
            }
        }
        debug!("client task stopped");
    }

    async fn transport_event(transport: &mut Option<T>) -> TransportEvent {
        match transport {
            Some(t) => match t.recv().await {
                Some(event) => event,
                None => TransportEvent::Closed,
            },
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let outcome = match command {
            Command::Connect(options) => self.engine.connect(options),
            Command::Disconnect => self.engine.disconnect(),
            Command::Publish(message) => self.engine.publish(message),
            Command::Subscribe {
                topics,
                requested_qos,
                timeout,
            } => self.engine.subscribe(topics, requested_qos, timeout),
            Command::Unsubscribe { topics, timeout } => self.engine.unsubscribe(topics, timeout),
            Command::SetDisconnectedPublishing(enabled) => {
                self.engine.disconnected_publishing = enabled;
                Ok(Vec::new())
            }
            Command::SetDisconnectedBufferSize(size) => {
                self.engine.disconnected_buffer_size = size;
                Ok(Vec::new())
            }
        };
        match outcome {
            Ok(actions) => self.apply_actions(actions).await,
            Err(err) => {
                self.trace_line(format!("operation rejected: {err}"));
                let _ = self.events.send(ClientEvent::OperationError(err));
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        let actions = match event {
            TransportEvent::Opened => self.engine.transport_opened(),
            TransportEvent::Data(bytes) => {
                self.trace_line(format!("recv {} bytes", bytes.len()));
                self.engine.transport_data(&bytes)
            }
            TransportEvent::Error(detail) => {
                self.trace_line(format!("socket error: {detail}"));
                self.engine.transport_error(detail)
            }
            TransportEvent::Closed => {
                self.trace_line("socket closed");
                self.engine.transport_closed()
            }
        };
        self.apply_actions(actions).await;
    }

    async fn apply_actions(&mut self, actions: Vec<Action>) {
        let mut pending: VecDeque<Action> = actions.into();
        while let Some(action) = pending.pop_front() {
            match action {
                Action::OpenTransport { uri, subprotocol } => {
                    if let Some(mut old) = self.transport.take() {
                        old.close().await;
                    }
                    self.trace_line(format!("connecting to {uri} ({subprotocol})"));
                    self.transport = Some((self.connector)(&uri, subprotocol));
                }
                Action::SendPacket(packet) => {
                    self.trace_line(format!("send {:?}", packet.packet_type()));
                    match packet.encode() {
                        Ok(frame) => {
                            let mut failure = None;
                            if let Some(transport) = self.transport.as_mut() {
                                if let Err(detail) = transport.send(frame.to_vec()).await {
                                    failure = Some(detail);
                                }
                            }
                            if let Some(detail) = failure {
                                pending.extend(self.engine.transport_error(detail));
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping unencodable packet");
                        }
                    }
                }
                Action::CloseTransport => {
                    if let Some(mut transport) = self.transport.take() {
                        transport.close().await;
                    }
                }
                Action::Schedule { timer, delay } => {
                    let at = Instant::now() + delay;
                    self.timers.retain(|(t, _)| *t != timer);
                    self.timers.push((timer, at));
                }
                Action::Cancel { timer } => {
                    self.timers.retain(|(t, _)| *t != timer);
                }
                Action::Notify(notification) => {
                    self.dispatch(notification);
                }
            }
        }
    }

    fn dispatch(&mut self, notification: Notification) {
        match &notification {
            Notification::Connected { uri, .. } => {
                self.trace_line(format!("connected to {uri}"));
                self.connected.store(true, Ordering::SeqCst);
            }
            Notification::ConnectionLost(err) => {
                self.trace_line(format!("connection lost: {err}"));
                self.connected.store(false, Ordering::SeqCst);
            }
            Notification::ConnectFailure(err) => {
                self.trace_line(format!("connect failed: {err}"));
                self.connected.store(false, Ordering::SeqCst);
            }
            Notification::Disconnected => {
                self.trace_line("disconnected");
                self.connected.store(false, Ordering::SeqCst);
            }
            _ => {}
        }
        let _ = self.events.send(ClientEvent::from(notification));
    }

    fn trace_line(&self, text: impl Into<String>) {
        self.trace.lock().record(text);
    }
}
