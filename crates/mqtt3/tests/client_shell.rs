//! Client-task tests over the in-memory paired transport. Time-dependent
//! paths run under tokio's paused clock, so keep-alive and backoff elapse
//! instantly and deterministically.

use tokio::sync::mpsc;

use mqtt3::transport::memory::{self, BrokerHandle};
use mqtt3::{Client, ClientError, ClientEvent, ConnectOptions, MemoryStore, Message, QoS};

const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

fn spawn_client() -> (
    Client,
    mpsc::UnboundedReceiver<ClientEvent>,
    mpsc::UnboundedReceiver<BrokerHandle>,
) {
    let (pair_tx, pair_rx) = mpsc::unbounded_channel();
    let connector = move |_uri: &str, _subprotocol: &str| {
        let (transport, broker) = memory::pair();
        let _ = pair_tx.send(broker);
        transport
    };
    let (client, events) = Client::new(
        "ws://broker.example:8080/mqtt",
        "cid",
        MemoryStore::new(),
        connector,
    )
    .unwrap();
    (client, events, pair_rx)
}

async fn establish(
    client: &Client,
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    pairs: &mut mpsc::UnboundedReceiver<BrokerHandle>,
    options: ConnectOptions,
) -> BrokerHandle {
    client.connect(options).unwrap();
    let mut broker = pairs.recv().await.unwrap();

    let connect_frame = broker.next_frame().await.unwrap();
    assert_eq!(connect_frame[0] >> 4, 1);

    broker.feed(CONNACK_OK);
    assert_eq!(events.recv().await.unwrap(), ClientEvent::ConnectSuccess);
    match events.recv().await.unwrap() {
        ClientEvent::Connected { reconnect, .. } => assert!(!reconnect),
        other => panic!("expected Connected, got {other:?}"),
    }
    broker
}

#[tokio::test]
async fn connect_then_publish_qos0() {
    let (client, mut events, mut pairs) = spawn_client();
    let mut broker = establish(&client, &mut events, &mut pairs, ConnectOptions::default()).await;
    assert!(client.is_connected());

    client.publish(Message::new("a/b", b"hi".to_vec())).unwrap();
    let frame = broker.next_frame().await.unwrap();
    assert_eq!(
        frame,
        vec![0x30, 0x07, 0x00, 0x03, 0x61, 0x2F, 0x62, 0x68, 0x69]
    );
    match events.recv().await.unwrap() {
        ClientEvent::MessageDelivered(message) => {
            assert_eq!(message.destination_name, "a/b");
        }
        other => panic!("expected delivery, got {other:?}"),
    }
}

#[tokio::test]
async fn qos1_delivery_completes_on_puback() {
    let (client, mut events, mut pairs) = spawn_client();
    let mut broker = establish(&client, &mut events, &mut pairs, ConnectOptions::default()).await;

    client
        .publish(Message::new("a/b", b"hi".to_vec()).with_qos(QoS::AtLeastOnce))
        .unwrap();
    let frame = broker.next_frame().await.unwrap();
    assert_eq!(
        frame,
        vec![0x32, 0x07, 0x00, 0x03, 0x61, 0x2F, 0x62, 0x00, 0x01, 0x68, 0x69]
    );

    broker.feed([0x40, 0x02, 0x00, 0x01]);
    match events.recv().await.unwrap() {
        ClientEvent::MessageDelivered(message) => {
            assert_eq!(message.qos, QoS::AtLeastOnce);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_and_receive_a_message() {
    let (client, mut events, mut pairs) = spawn_client();
    let mut broker = establish(&client, &mut events, &mut pairs, ConnectOptions::default()).await;

    client
        .subscribe(vec!["a/#".into()], vec![QoS::AtLeastOnce], None)
        .unwrap();
    let frame = broker.next_frame().await.unwrap();
    assert_eq!(frame[0], 0x82);
    let id = u16::from(frame[2]) << 8 | u16::from(frame[3]);

    broker.feed([0x90, 0x03, (id >> 8) as u8, (id & 0xFF) as u8, 0x01]);
    match events.recv().await.unwrap() {
        ClientEvent::SubscribeResult { topics, result } => {
            assert_eq!(topics, vec![String::from("a/#")]);
            assert!(result.is_ok());
        }
        other => panic!("expected subscribe result, got {other:?}"),
    }

    // Broker publishes QoS 0 into the subscription.
    broker.feed([0x30, 0x06, 0x00, 0x03, b'a', b'/', b'x', b'!']);
    match events.recv().await.unwrap() {
        ClientEvent::MessageArrived(message) => {
            assert_eq!(message.destination_name, "a/x");
            assert_eq!(message.payload, b"!");
        }
        other => panic!("expected arrival, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_sends_packet_and_reports() {
    let (client, mut events, mut pairs) = spawn_client();
    let mut broker = establish(&client, &mut events, &mut pairs, ConnectOptions::default()).await;

    client.disconnect().unwrap();
    let frame = broker.next_frame().await.unwrap();
    assert_eq!(frame, vec![0xE0, 0x00]);
    assert_eq!(events.recv().await.unwrap(), ClientEvent::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn operation_errors_come_back_as_events() {
    let (client, mut events, _pairs) = spawn_client();
    client.publish(Message::new("t", b"p".to_vec())).unwrap();
    match events.recv().await.unwrap() {
        ClientEvent::OperationError(ClientError::InvalidState(_)) => {}
        other => panic!("expected invalid-state error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn keep_alive_pings_then_times_out() {
    let (client, mut events, mut pairs) = spawn_client();
    let options = ConnectOptions {
        keep_alive_interval: 2,
        ..Default::default()
    };
    let mut broker = establish(&client, &mut events, &mut pairs, options).await;

    // Quiet window expires: PINGREQ goes straight out.
    let frame = broker.next_frame().await.unwrap();
    assert_eq!(frame, vec![0xC0, 0x00]);

    // No PINGRESP within the next window: the session dies with code 4.
    match events.recv().await.unwrap() {
        ClientEvent::ConnectionLost(err) => assert_eq!(err.code().as_u8(), 4),
        other => panic!("expected connection lost, got {other:?}"),
    }
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn pingresp_defers_the_timeout() {
    let (client, mut events, mut pairs) = spawn_client();
    let options = ConnectOptions {
        keep_alive_interval: 2,
        ..Default::default()
    };
    let mut broker = establish(&client, &mut events, &mut pairs, options).await;

    for _ in 0..3 {
        let frame = broker.next_frame().await.unwrap();
        assert_eq!(frame, vec![0xC0, 0x00]);
        broker.feed([0xD0, 0x00]);
    }
    assert!(client.is_connected());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn dropped_session_reconnects_with_backoff() {
    let (client, mut events, mut pairs) = spawn_client();
    let options = ConnectOptions {
        clean_session: false,
        reconnect: true,
        ..Default::default()
    };
    let broker = establish(&client, &mut events, &mut pairs, options).await;

    broker.close();
    match events.recv().await.unwrap() {
        ClientEvent::ConnectionLost(err) => assert_eq!(err, ClientError::SocketClose),
        other => panic!("expected connection lost, got {other:?}"),
    }

    // The backoff timer elapses on the paused clock and a fresh transport
    // is opened.
    let mut broker = pairs.recv().await.unwrap();
    let connect_frame = broker.next_frame().await.unwrap();
    assert_eq!(connect_frame[0] >> 4, 1);

    broker.feed(CONNACK_OK);
    match events.recv().await.unwrap() {
        ClientEvent::Connected { reconnect, .. } => assert!(reconnect),
        other => panic!("expected Connected, got {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn trace_ring_captures_lifecycle() {
    let (client, mut events, mut pairs) = spawn_client();
    client.start_trace();
    let _broker = establish(&client, &mut events, &mut pairs, ConnectOptions::default()).await;

    let log = client.trace_log();
    assert!(!log.is_empty());
    assert!(log.iter().any(|entry| entry.text.contains("connecting to")));
    assert!(log.iter().any(|entry| entry.text.contains("connected to")));

    client.stop_trace();
    let frozen = client.trace_log().len();
    client.publish(Message::new("t", b"p".to_vec())).unwrap();
    events.recv().await.unwrap();
    assert_eq!(client.trace_log().len(), frozen);
}
