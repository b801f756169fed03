//! Durable snapshot of in-flight deliveries.
//!
//! Only PUBLISH (and its QoS 2 continuation state) is persisted. Records
//! are keyed `Sent:<uri>:<clientId>:<messageIdentifier>` and
//! `Received:<uri>:<clientId>:<messageIdentifier>`; values are JSON with
//! the payload bytes as a lowercase hex string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::session::SentPublish;
use crate::types::{Message, QoS};

/// Schema tag of the current record layout. Anything else is corruption.
pub const STORED_RECORD_VERSION: u8 = 1;

const SENT_PREFIX: &str = "Sent:";
const RECEIVED_PREFIX: &str = "Received:";

/// Key/value store contract. Values are opaque strings that must
/// round-trip exactly; keys are enumerated once at client construction.
pub trait DeliveryStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str);
    fn remove_item(&mut self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// Hash-map store for tests and non-durable deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl DeliveryStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&mut self, key: &str) {
        self.items.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMessage {
    payload_hex: String,
    qos: u8,
    destination_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retained: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDelivery {
    #[serde(rename = "type")]
    packet_type: u8,
    message_identifier: u16,
    version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub_rec_received: Option<bool>,
    payload_message: StoredMessage,
}

/// Lowercase hex, two digits per byte.
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Pairwise parse of a hex payload string.
#[must_use]
pub fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = hex.as_bytes();
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let s = std::str::from_utf8(pair).ok()?;
        out.push(u8::from_str_radix(s, 16).ok()?);
    }
    Some(out)
}

/// The `(uri, clientId)` namespace shared by every key of one client.
#[must_use]
pub fn local_key(uri: &str, client_id: &str) -> String {
    format!("{uri}:{client_id}:")
}

#[must_use]
pub fn sent_key(uri: &str, client_id: &str, message_identifier: u16) -> String {
    format!("{SENT_PREFIX}{}{message_identifier}", local_key(uri, client_id))
}

#[must_use]
pub fn received_key(uri: &str, client_id: &str, message_identifier: u16) -> String {
    format!(
        "{RECEIVED_PREFIX}{}{message_identifier}",
        local_key(uri, client_id)
    )
}

fn message_record(message: &Message) -> StoredMessage {
    StoredMessage {
        payload_hex: encode_hex(&message.payload),
        qos: message.qos.as_u8(),
        destination_name: message.destination_name.clone(),
        duplicate: message.duplicate.then_some(true),
        retained: message.retained.then_some(true),
    }
}

fn encode_record(record: &StoredDelivery) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| ClientError::Internal(format!("failed to serialise stored delivery: {e}")))
}

/// Writes (or rewrites) the `Sent:` record for an in-flight publish.
pub fn persist_sent<S: DeliveryStore>(
    store: &mut S,
    uri: &str,
    client_id: &str,
    publish: &SentPublish,
) -> Result<()> {
    let record = StoredDelivery {
        packet_type: crate::packet::PacketType::Publish.as_u8(),
        message_identifier: publish.message_identifier,
        version: STORED_RECORD_VERSION,
        sequence: Some(publish.sequence),
        pub_rec_received: publish.pub_rec_received.then_some(true),
        payload_message: message_record(&publish.message),
    };
    let key = sent_key(uri, client_id, publish.message_identifier);
    store.set_item(&key, &encode_record(&record)?);
    Ok(())
}

pub fn remove_sent<S: DeliveryStore>(
    store: &mut S,
    uri: &str,
    client_id: &str,
    message_identifier: u16,
) {
    store.remove_item(&sent_key(uri, client_id, message_identifier));
}

/// Writes the `Received:` record for a QoS 2 publish awaiting PUBREL.
pub fn persist_received<S: DeliveryStore>(
    store: &mut S,
    uri: &str,
    client_id: &str,
    message_identifier: u16,
    message: &Message,
) -> Result<()> {
    let record = StoredDelivery {
        packet_type: crate::packet::PacketType::Publish.as_u8(),
        message_identifier,
        version: STORED_RECORD_VERSION,
        sequence: None,
        pub_rec_received: None,
        payload_message: message_record(message),
    };
    let key = received_key(uri, client_id, message_identifier);
    store.set_item(&key, &encode_record(&record)?);
    Ok(())
}

pub fn remove_received<S: DeliveryStore>(
    store: &mut S,
    uri: &str,
    client_id: &str,
    message_identifier: u16,
) {
    store.remove_item(&received_key(uri, client_id, message_identifier));
}

/// Drops every `Sent:`/`Received:` key of this `(uri, clientId)`. Invoked
/// on a clean-session CONNACK.
pub fn clear_all<S: DeliveryStore>(store: &mut S, uri: &str, client_id: &str) {
    let local = local_key(uri, client_id);
    for key in store.keys() {
        let payload = key
            .strip_prefix(SENT_PREFIX)
            .or_else(|| key.strip_prefix(RECEIVED_PREFIX));
        if payload.is_some_and(|rest| rest.starts_with(&local)) {
            store.remove_item(&key);
        }
    }
}

/// Deliveries recovered from the store at client construction.
#[derive(Debug, Default)]
pub struct RestoredSession {
    /// Outbound publishes, marked `duplicate` for redelivery.
    pub sent: Vec<SentPublish>,
    /// Received QoS 2 publishes still awaiting PUBREL.
    pub received: Vec<(u16, Message)>,
}

fn decode_record(key: &str, value: &str) -> Result<StoredDelivery> {
    let corrupt = |detail: String| ClientError::InvalidStoredData {
        key: key.to_string(),
        detail,
    };
    let record: StoredDelivery =
        serde_json::from_str(value).map_err(|e| corrupt(e.to_string()))?;
    if record.version != STORED_RECORD_VERSION {
        return Err(corrupt(format!("unknown schema version {}", record.version)));
    }
    if record.packet_type != crate::packet::PacketType::Publish.as_u8() {
        return Err(corrupt(format!(
            "stored record is not a PUBLISH (type {})",
            record.packet_type
        )));
    }
    Ok(record)
}

fn decode_message(key: &str, record: &StoredDelivery, duplicate: bool) -> Result<Message> {
    let corrupt = |detail: String| ClientError::InvalidStoredData {
        key: key.to_string(),
        detail,
    };
    let payload = decode_hex(&record.payload_message.payload_hex)
        .ok_or_else(|| corrupt("payload is not valid hex".into()))?;
    let qos = QoS::try_from(record.payload_message.qos)
        .map_err(|e| corrupt(e.to_string()))?;
    Ok(Message {
        destination_name: record.payload_message.destination_name.clone(),
        payload,
        qos,
        retained: record.payload_message.retained.unwrap_or(false),
        duplicate,
    })
}

/// Restores all `Sent:`/`Received:` records for `(uri, clientId)`.
pub fn restore_session<S: DeliveryStore>(
    store: &S,
    uri: &str,
    client_id: &str,
) -> Result<RestoredSession> {
    let local = local_key(uri, client_id);
    let mut restored = RestoredSession::default();

    for key in store.keys() {
        let Some(value) = store.get_item(&key) else {
            continue;
        };
        if let Some(rest) = key.strip_prefix(SENT_PREFIX) {
            if !rest.starts_with(&local) {
                continue;
            }
            let record = decode_record(&key, &value)?;
            let message = decode_message(&key, &record, true)?;
            restored.sent.push(SentPublish {
                message,
                message_identifier: record.message_identifier,
                sequence: record.sequence.unwrap_or(0),
                pub_rec_received: record.pub_rec_received.unwrap_or(false),
            });
        } else if let Some(rest) = key.strip_prefix(RECEIVED_PREFIX) {
            if !rest.starts_with(&local) {
                continue;
            }
            let record = decode_record(&key, &value)?;
            let message = decode_message(&key, &record, false)?;
            restored.received.push((record.message_identifier, message));
        }
    }

    restored.sent.sort_by_key(|p| p.sequence);
    restored.received.sort_by_key(|(id, _)| *id);
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "ws://broker.example:8080/mqtt";
    const CLIENT: &str = "cid";

    fn sent_publish(id: u16, sequence: u32) -> SentPublish {
        SentPublish {
            message: Message::new("a/b", vec![0x00, 0xAB, 0xFF]).with_qos(QoS::ExactlyOnce),
            message_identifier: id,
            sequence,
            pub_rec_received: false,
        }
    }

    #[test]
    fn test_hex_is_lowercase_zero_padded() {
        assert_eq!(encode_hex(&[0x00, 0x0F, 0xAB, 0xFF]), "000fabff");
        assert_eq!(decode_hex("000fabff").unwrap(), vec![0x00, 0x0F, 0xAB, 0xFF]);
        assert!(decode_hex("abc").is_none());
        assert!(decode_hex("zz").is_none());
    }

    #[test]
    fn test_key_scheme() {
        assert_eq!(
            sent_key(URI, CLIENT, 7),
            "Sent:ws://broker.example:8080/mqtt:cid:7"
        );
        assert_eq!(
            received_key(URI, CLIENT, 7),
            "Received:ws://broker.example:8080/mqtt:cid:7"
        );
    }

    #[test]
    fn test_record_field_names() {
        let mut store = MemoryStore::new();
        persist_sent(&mut store, URI, CLIENT, &sent_publish(7, 3)).unwrap();

        let value = store.get_item(&sent_key(URI, CLIENT, 7)).unwrap();
        assert!(value.contains("\"type\":3"));
        assert!(value.contains("\"messageIdentifier\":7"));
        assert!(value.contains("\"version\":1"));
        assert!(value.contains("\"sequence\":3"));
        assert!(value.contains("\"payloadHex\":\"00abff\""));
        assert!(value.contains("\"destinationName\":\"a/b\""));
        // Absent flags are omitted, not serialised as false.
        assert!(!value.contains("pubRecReceived"));
    }

    #[test]
    fn test_restore_marks_outbound_duplicate() {
        let mut store = MemoryStore::new();
        let mut publish = sent_publish(7, 3);
        publish.pub_rec_received = true;
        persist_sent(&mut store, URI, CLIENT, &publish).unwrap();
        persist_received(&mut store, URI, CLIENT, 9, &Message::new("in", b"x".to_vec()))
            .unwrap();

        let restored = restore_session(&store, URI, CLIENT).unwrap();
        assert_eq!(restored.sent.len(), 1);
        assert!(restored.sent[0].message.duplicate);
        assert!(restored.sent[0].pub_rec_received);
        assert_eq!(restored.sent[0].sequence, 3);
        assert_eq!(restored.received, vec![(9, Message::new("in", b"x".to_vec()))]);
    }

    #[test]
    fn test_restore_ignores_other_clients() {
        let mut store = MemoryStore::new();
        persist_sent(&mut store, URI, "other", &sent_publish(1, 0)).unwrap();
        let restored = restore_session(&store, URI, CLIENT).unwrap();
        assert!(restored.sent.is_empty());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut store = MemoryStore::new();
        let key = sent_key(URI, CLIENT, 1);
        store.set_item(
            &key,
            r#"{"type":3,"messageIdentifier":1,"version":2,"payloadMessage":{"payloadHex":"","qos":1,"destinationName":"t"}}"#,
        );
        let err = restore_session(&store, URI, CLIENT).unwrap_err();
        assert!(matches!(err, ClientError::InvalidStoredData { .. }));
    }

    #[test]
    fn test_non_publish_record_rejected() {
        let mut store = MemoryStore::new();
        let key = sent_key(URI, CLIENT, 1);
        store.set_item(
            &key,
            r#"{"type":8,"messageIdentifier":1,"version":1,"payloadMessage":{"payloadHex":"","qos":1,"destinationName":"t"}}"#,
        );
        let err = restore_session(&store, URI, CLIENT).unwrap_err();
        assert!(matches!(err, ClientError::InvalidStoredData { .. }));
    }

    #[test]
    fn test_clear_all_scopes_to_client() {
        let mut store = MemoryStore::new();
        persist_sent(&mut store, URI, CLIENT, &sent_publish(1, 0)).unwrap();
        persist_received(&mut store, URI, CLIENT, 2, &Message::new("t", b"p".to_vec()))
            .unwrap();
        persist_sent(&mut store, URI, "other", &sent_publish(3, 0)).unwrap();

        clear_all(&mut store, URI, CLIENT);
        assert_eq!(store.len(), 1);
        assert!(store.get_item(&sent_key(URI, "other", 3)).is_some());
    }

    #[test]
    fn test_restore_sorts_sent_by_sequence() {
        let mut store = MemoryStore::new();
        persist_sent(&mut store, URI, CLIENT, &sent_publish(5, 9)).unwrap();
        persist_sent(&mut store, URI, CLIENT, &sent_publish(6, 2)).unwrap();

        let restored = restore_session(&store, URI, CLIENT).unwrap();
        let sequences: Vec<u32> = restored.sent.iter().map(|p| p.sequence).collect();
        assert_eq!(sequences, vec![2, 9]);
    }
}
