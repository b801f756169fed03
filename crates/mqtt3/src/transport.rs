//! The duplex byte-transport contract.
//!
//! A transport is created per connect attempt by a connector closure
//! (`FnMut(uri, subprotocol) -> T`, the factory role of a WebSocket
//! constructor) and is owned exclusively by the client task until the
//! engine closes it. Frames are whole transport messages, not arbitrary
//! splits; the engine still tolerates any fragmentation.

use std::future::Future;

/// What a transport reports back to the client task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection handshake finished; bytes may now be sent.
    Opened,
    /// One inbound frame.
    Data(Vec<u8>),
    /// The transport failed. The payload is diagnostic text.
    Error(String),
    /// The peer (or the network) closed the connection.
    Closed,
}

pub trait Transport: Send + 'static {
    /// Next event, or `None` once the transport is gone for good.
    fn recv(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns diagnostic text when the write fails; the engine treats it
    /// as a socket error.
    fn send(&mut self, frame: Vec<u8>) -> impl Future<Output = Result<(), String>> + Send;

    /// Closes the connection. Idempotent.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// In-memory paired transport: the far side plays the broker in tests.
pub mod memory {
    use tokio::sync::mpsc;

    use super::TransportEvent;

    pub struct MemoryTransport {
        events: mpsc::UnboundedReceiver<TransportEvent>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    }

    /// The broker side of a [`MemoryTransport`].
    pub struct BrokerHandle {
        inbound: mpsc::UnboundedSender<TransportEvent>,
        outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    }

    /// Creates a connected pair. The client side observes `Opened`
    /// immediately, like a loopback WebSocket.
    #[must_use]
    pub fn pair() -> (MemoryTransport, BrokerHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let _ = inbound_tx.send(TransportEvent::Opened);
        (
            MemoryTransport {
                events: inbound_rx,
                outbound: outbound_tx,
            },
            BrokerHandle {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }

    impl super::Transport for MemoryTransport {
        fn recv(&mut self) -> impl std::future::Future<Output = Option<TransportEvent>> + Send {
            async move { self.events.recv().await }
        }

        fn send(
            &mut self,
            frame: Vec<u8>,
        ) -> impl std::future::Future<Output = Result<(), String>> + Send {
            let result = self
                .outbound
                .send(frame)
                .map_err(|_| String::from("transport closed"));
            async move { result }
        }

        fn close(&mut self) -> impl std::future::Future<Output = ()> + Send {
            self.events.close();
            async {}
        }
    }

    impl BrokerHandle {
        /// Injects one frame toward the client.
        pub fn feed(&self, bytes: impl Into<Vec<u8>>) {
            let _ = self.inbound.send(TransportEvent::Data(bytes.into()));
        }

        /// Simulates a transport failure.
        pub fn fail(&self, detail: &str) {
            let _ = self.inbound.send(TransportEvent::Error(detail.to_string()));
        }

        /// Simulates the peer closing the socket.
        pub fn close(&self) {
            let _ = self.inbound.send(TransportEvent::Closed);
        }

        /// Next frame written by the client, once one is available.
        pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
            self.outbound.recv().await
        }

        /// Drains every frame currently queued without waiting.
        pub fn drain_frames(&mut self) -> Vec<Vec<u8>> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.outbound.try_recv() {
                frames.push(frame);
            }
            frames
        }
    }
}
