use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// A chat message persisted as a side effect of the relay's chat path.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// User who sent the message.
    pub sender: Uuid,
    /// Display handle the sender carried at send time.
    pub handle: String,
    /// Raw message content.
    pub content: String,
    /// Server-assigned timestamp.
    pub timestamp: OffsetDateTime,
}

/// Append-only per-call log of relayed chat messages.
///
/// History retrieval and deletion are external surfaces; the core only
/// appends here when the relay forwards a chat frame.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: DashMap<Uuid, Vec<StoredMessage>>,
}

impl MessageLog {
    /// Construct an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a call's log.
    pub fn append(&self, call_id: Uuid, message: StoredMessage) {
        self.entries.entry(call_id).or_default().push(message);
    }

    /// Snapshot the messages stored for a call, oldest first.
    pub fn history(&self, call_id: Uuid) -> Vec<StoredMessage> {
        self.entries
            .get(&call_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_preserve_order_per_call() {
        let log = MessageLog::new();
        let call = Uuid::new_v4();
        let other = Uuid::new_v4();
        let sender = Uuid::new_v4();

        for content in ["first", "second"] {
            log.append(
                call,
                StoredMessage {
                    sender,
                    handle: "gull".into(),
                    content: content.into(),
                    timestamp: OffsetDateTime::now_utc(),
                },
            );
        }

        let history = log.history(call);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
        assert!(log.history(other).is_empty());
    }
}
