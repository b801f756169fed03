//! In-flight delivery tables: the outbox of sent-but-unacknowledged
//! packets, the inbox of received QoS 2 publishes awaiting PUBREL, the
//! message-identifier allocator and the replay sequence counter.

use std::collections::HashMap;

use crate::error::{ClientError, Result};
use crate::types::{Message, QoS};

pub const MAX_MESSAGE_IDENTIFIER: u16 = 65_535;

/// An outbound PUBLISH awaiting its acknowledgement handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPublish {
    pub message: Message,
    pub message_identifier: u16,
    /// Replay position; strictly increasing across the session.
    pub sequence: u32,
    /// Set once PUBREC arrives: recovery resumes at PUBREL, not PUBLISH.
    pub pub_rec_received: bool,
}

/// What an outbox slot is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboxEntry {
    Publish(SentPublish),
    Subscribe {
        topics: Vec<String>,
        requested_qos: Vec<QoS>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
}

#[derive(Debug, Default)]
pub struct SessionTables {
    outbox: HashMap<u16, OutboxEntry>,
    inbox: HashMap<u16, Message>,
    cursor: u16,
    sequence: u32,
}

impl SessionTables {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbox: HashMap::new(),
            inbox: HashMap::new(),
            cursor: 1,
            sequence: 0,
        }
    }

    /// Allocates the next free message identifier.
    ///
    /// The cursor scans forward over occupied slots and wraps to 1 past
    /// 65535; released identifiers are only reused on the next wrap.
    pub fn allocate_identifier(&mut self) -> Result<u16> {
        if self.outbox.len() >= usize::from(MAX_MESSAGE_IDENTIFIER) {
            return Err(ClientError::Internal(
                "all 65535 message identifiers are in flight".into(),
            ));
        }
        while self.outbox.contains_key(&self.cursor) {
            self.cursor = self.advance(self.cursor);
        }
        let id = self.cursor;
        self.cursor = self.advance(id);
        Ok(id)
    }

    const fn advance(&self, cursor: u16) -> u16 {
        if cursor == MAX_MESSAGE_IDENTIFIER {
            1
        } else {
            cursor + 1
        }
    }

    /// Next replay sequence number, assigned to stored publishes and to
    /// QoS 0 messages buffered while disconnected.
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    /// Bumps the counter past a restored sequence so later messages sort
    /// after everything recovered from the store.
    pub fn observe_sequence(&mut self, sequence: u32) {
        if sequence >= self.sequence {
            self.sequence = sequence.wrapping_add(1);
        }
    }

    pub fn insert_outbox(&mut self, message_identifier: u16, entry: OutboxEntry) {
        self.outbox.insert(message_identifier, entry);
    }

    #[must_use]
    pub fn outbox_get(&self, message_identifier: u16) -> Option<&OutboxEntry> {
        self.outbox.get(&message_identifier)
    }

    pub fn outbox_get_mut(&mut self, message_identifier: u16) -> Option<&mut OutboxEntry> {
        self.outbox.get_mut(&message_identifier)
    }

    pub fn remove_outbox(&mut self, message_identifier: u16) -> Option<OutboxEntry> {
        self.outbox.remove(&message_identifier)
    }

    #[must_use]
    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    /// All in-flight publishes, unordered; callers sort by sequence.
    #[must_use]
    pub fn outbox_publishes(&self) -> Vec<&SentPublish> {
        self.outbox
            .values()
            .filter_map(|entry| match entry {
                OutboxEntry::Publish(publish) => Some(publish),
                _ => None,
            })
            .collect()
    }

    pub fn insert_inbox(&mut self, message_identifier: u16, message: Message) {
        self.inbox.insert(message_identifier, message);
    }

    #[must_use]
    pub fn inbox_contains(&self, message_identifier: u16) -> bool {
        self.inbox.contains_key(&message_identifier)
    }

    pub fn remove_inbox(&mut self, message_identifier: u16) -> Option<Message> {
        self.inbox.remove(&message_identifier)
    }

    #[must_use]
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Clean-session wipe. The identifier cursor and sequence counter keep
    /// rolling; only the tables empty.
    pub fn clear(&mut self) {
        self.outbox.clear();
        self.inbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_entry(id: u16, sequence: u32) -> OutboxEntry {
        OutboxEntry::Publish(SentPublish {
            message: Message::new("t", b"p".to_vec()).with_qos(QoS::AtLeastOnce),
            message_identifier: id,
            sequence,
            pub_rec_received: false,
        })
    }

    #[test]
    fn test_first_identifier_is_one() {
        let mut tables = SessionTables::new();
        assert_eq!(tables.allocate_identifier().unwrap(), 1);
        assert_eq!(tables.allocate_identifier().unwrap(), 2);
    }

    #[test]
    fn test_allocator_skips_occupied_slots() {
        let mut tables = SessionTables::new();
        let a = tables.allocate_identifier().unwrap();
        tables.insert_outbox(a, publish_entry(a, 0));
        tables.insert_outbox(2, publish_entry(2, 1));
        tables.insert_outbox(3, publish_entry(3, 2));

        assert_eq!(tables.allocate_identifier().unwrap(), 4);
    }

    #[test]
    fn test_allocator_wraps_to_one() {
        let mut tables = SessionTables::new();
        tables.cursor = MAX_MESSAGE_IDENTIFIER;
        assert_eq!(
            tables.allocate_identifier().unwrap(),
            MAX_MESSAGE_IDENTIFIER
        );
        assert_eq!(tables.allocate_identifier().unwrap(), 1);
    }

    #[test]
    fn test_allocator_never_returns_in_flight_id() {
        let mut tables = SessionTables::new();
        tables.cursor = MAX_MESSAGE_IDENTIFIER;
        tables.insert_outbox(MAX_MESSAGE_IDENTIFIER, publish_entry(MAX_MESSAGE_IDENTIFIER, 0));
        assert_eq!(tables.allocate_identifier().unwrap(), 1);
    }

    #[test]
    fn test_full_outbox_fails_hard() {
        let mut tables = SessionTables::new();
        for id in 1..=MAX_MESSAGE_IDENTIFIER {
            tables.insert_outbox(id, publish_entry(id, u32::from(id)));
        }
        assert!(tables.allocate_identifier().is_err());
    }

    #[test]
    fn test_sequence_strictly_increases() {
        let mut tables = SessionTables::new();
        assert_eq!(tables.next_sequence(), 0);
        assert_eq!(tables.next_sequence(), 1);

        tables.observe_sequence(40);
        assert_eq!(tables.next_sequence(), 41);

        // Older restored sequences never move the counter backwards.
        tables.observe_sequence(5);
        assert_eq!(tables.next_sequence(), 42);
    }

    #[test]
    fn test_clear_wipes_tables_only() {
        let mut tables = SessionTables::new();
        let id = tables.allocate_identifier().unwrap();
        let sequence = tables.next_sequence();
        tables.insert_outbox(id, publish_entry(id, sequence));
        tables.insert_inbox(9, Message::new("in", b"x".to_vec()));

        tables.clear();
        assert_eq!(tables.outbox_len(), 0);
        assert_eq!(tables.inbox_len(), 0);
        // Cursor keeps scanning forward after the wipe.
        assert_eq!(tables.allocate_identifier().unwrap(), 2);
    }
}
