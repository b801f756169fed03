use mqtt3_protocol::client::{Action, Engine, Notification, TimerId};
use mqtt3_protocol::persist::MemoryStore;
use mqtt3_protocol::types::{ConnectOptions, Message, QoS};

fn main() {
    println!("Sans-io MQTT 3.1.1 client engine");
    println!("================================\n");

    let mut engine =
        Engine::new("ws://broker.example:8080/mqtt", "demo-client", MemoryStore::new())
            .expect("fresh store restores cleanly");

    println!("1. Connecting...");
    let actions = engine.connect(ConnectOptions::default()).unwrap();
    process_actions(&actions, "connect");

    println!("\n2. Transport opened, CONNECT goes out...");
    let actions = engine.transport_opened();
    process_actions(&actions, "open");

    println!("\n3. Broker accepts (CONNACK rc=0)...");
    let actions = engine.transport_data(&[0x20, 0x02, 0x00, 0x00]);
    process_actions(&actions, "connack");
    assert!(engine.is_connected());

    println!("\n4. Subscribing...");
    let actions = engine
        .subscribe(vec!["sensors/#".into()], vec![QoS::AtLeastOnce], None)
        .unwrap();
    process_actions(&actions, "subscribe");

    println!("\n5. Publishing QoS 1...");
    let actions = engine
        .publish(Message::new("actuators/led", b"ON".to_vec()).with_qos(QoS::AtLeastOnce))
        .unwrap();
    process_actions(&actions, "publish");

    println!("\n6. PUBACK completes the delivery...");
    let actions = engine.transport_data(&[0x40, 0x02, 0x00, 0x02]);
    process_actions(&actions, "puback");

    println!("\n7. Keep-alive window expires...");
    let actions = engine.timer_fired(TimerId::Ping);
    process_actions(&actions, "ping");

    println!("\n8. Disconnecting...");
    let actions = engine.disconnect().unwrap();
    process_actions(&actions, "disconnect");
    assert!(!engine.is_connected());

    println!("\nThe engine never does I/O: your transport interprets");
    println!("SendPacket/OpenTransport, your timers drive Schedule/Cancel.");
}

fn process_actions(actions: &[Action], label: &str) {
    for action in actions {
        match action {
            Action::OpenTransport { uri, subprotocol } => {
                println!("   [{label}] open {uri} (subprotocol {subprotocol})");
            }
            Action::SendPacket(packet) => {
                let bytes = packet.encode().unwrap();
                println!(
                    "   [{label}] send {:?} ({} bytes)",
                    packet.packet_type(),
                    bytes.len()
                );
            }
            Action::CloseTransport => println!("   [{label}] close transport"),
            Action::Schedule { timer, delay } => {
                println!("   [{label}] arm {timer:?} in {delay:?}");
            }
            Action::Cancel { timer } => println!("   [{label}] cancel {timer:?}"),
            Action::Notify(notification) => match notification {
                Notification::Connected { uri, .. } => {
                    println!("   [{label}] event: connected to {uri}");
                }
                other => println!("   [{label}] event: {other:?}"),
            },
        }
    }
}
