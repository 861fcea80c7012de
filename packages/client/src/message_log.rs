//! Bounded, ordered log of chat messages for one room.

use std::collections::VecDeque;

use collab_shared::protocol::CodeReference;

pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Identity of a logged message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Sequence id assigned by the server.
    Server(String),
    /// Temporary id assigned by this client before acknowledgement.
    Pending(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Delivered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Client-side arrival order, assigned by [`MessageLog::append`].
    pub local_seq: u64,
    pub room_id: String,
    pub author_id: String,
    pub body: String,
    pub code_reference: Option<CodeReference>,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub delivery: Delivery,
}

impl ChatMessage {
    /// A locally sent message awaiting acknowledgement.
    pub fn pending(
        client_temp_id: impl Into<String>,
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        body: impl Into<String>,
        code_reference: Option<CodeReference>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: MessageId::Pending(client_temp_id.into()),
            local_seq: 0,
            room_id: room_id.into(),
            author_id: author_id.into(),
            body: body.into(),
            code_reference,
            timestamp,
            delivery: Delivery::Pending,
        }
    }

    /// An authoritative message as stamped by the server.
    pub fn delivered(
        sequence_id: impl Into<String>,
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        body: impl Into<String>,
        code_reference: Option<CodeReference>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: MessageId::Server(sequence_id.into()),
            local_seq: 0,
            room_id: room_id.into(),
            author_id: author_id.into(),
            body: body.into(),
            code_reference,
            timestamp,
            delivery: Delivery::Delivered,
        }
    }

    pub fn client_temp_id(&self) -> Option<&str> {
        match &self.id {
            MessageId::Pending(id) => Some(id),
            MessageId::Server(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == Delivery::Pending
    }
}

/// Append-only message log with bounded memory.
///
/// When full, the oldest entry is evicted. Entries are never edited except when a pending
/// entry is replaced by its acknowledged server copy.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<ChatMessage>,
    capacity: usize,
    next_seq: u64,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl MessageLog {
    /// Capacities below 1 are clamped to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
            next_seq: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a message and return the local sequence number it was given.
    pub fn append(&mut self, mut message: ChatMessage) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        message.local_seq = seq;

        if self.entries.len() == self.capacity
            && let Some(evicted) = self.entries.pop_front()
        {
            tracing::trace!("Evicted message {:?} from full log", evicted.id);
        }
        self.entries.push_back(message);
        seq
    }

    /// Replace the pending entry with `client_temp_id` by its server copy.
    ///
    /// # Returns
    ///
    /// `true` when a pending entry matched; the log length is unchanged either way.
    pub fn reconcile(&mut self, client_temp_id: &str, server_message: ChatMessage) -> bool {
        let pending_id = MessageId::Pending(client_temp_id.to_string());
        match self.entries.iter_mut().find(|m| m.id == pending_id) {
            Some(entry) => {
                let local_seq = entry.local_seq;
                *entry = ChatMessage {
                    local_seq,
                    delivery: Delivery::Delivered,
                    ..server_message
                };
                true
            }
            None => {
                tracing::debug!(
                    "No pending message with temporary id '{}' to reconcile",
                    client_temp_id
                );
                false
            }
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.iter().any(|m| &m.id == id)
    }

    /// Messages in arrival order. Each call starts over from the current contents.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ChatMessage> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    /// Up to `limit` messages older than `before` (or the newest ones), oldest first.
    pub fn page_before(&self, before: Option<u64>, limit: usize) -> Vec<ChatMessage> {
        let mut page: Vec<ChatMessage> = self
            .entries
            .iter()
            .rev()
            .filter(|m| before.is_none_or(|seq| m.local_seq < seq))
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        page
    }

    /// Case-insensitive search over message bodies and referenced paths.
    pub fn search<'a>(&'a self, term: &str) -> impl Iterator<Item = &'a ChatMessage> + 'a {
        let needle = term.to_lowercase();
        self.entries.iter().filter(move |m| {
            m.body.to_lowercase().contains(&needle)
                || m
                    .code_reference
                    .as_ref()
                    .is_some_and(|r| r.path.to_lowercase().contains(&needle))
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
