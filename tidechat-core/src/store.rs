//! Ordered message store
//!
//! Messages are kept in append order and addressed by id. Nothing here ever
//! reorders existing entries, and updates to unknown ids are silently
//! dropped: late callbacks for a message that has been pruned are expected.

use std::collections::HashMap;

use crate::types::{ChatMessage, MessageId};

#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    /// Position of each message in `messages`
    index: HashMap<MessageId, usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message, or merge it into the existing one with the same id.
    ///
    /// On merge `role` and `status` always take the incoming value, while
    /// `content` and `attachments` only overwrite when non-empty.
    pub fn upsert(&mut self, message: ChatMessage) {
        match self.index.get(&message.id) {
            Some(&pos) => {
                let existing = &mut self.messages[pos];
                existing.role = message.role;
                existing.status = message.status;
                if !message.content.is_empty() {
                    existing.content = message.content;
                }
                if !message.attachments.is_empty() {
                    existing.attachments = message.attachments;
                }
            }
            None => {
                self.index.insert(message.id.clone(), self.messages.len());
                self.messages.push(message);
            }
        }
    }

    /// Apply `mutator` to the message with `id`. Returns false if absent.
    pub fn update<F>(&mut self, id: &MessageId, mutator: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        match self.index.get(id) {
            Some(&pos) => {
                mutator(&mut self.messages[pos]);
                true
            }
            None => {
                tracing::trace!(message = %id, "Ignoring update for unknown message");
                false
            }
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.index.get(id).map(|&pos| &self.messages[pos])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Swap in a loaded history. Duplicate ids collapse into one entry.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.clear();
        for message in messages {
            self.upsert(message);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileRef, MessageStatus, Role, PLACEHOLDER_TEXT};

    fn file_ref(name: &str) -> FileRef {
        FileRef {
            file_id: format!("id-{name}"),
            filename: name.to_string(),
            content_type: "text/plain".to_string(),
            size: 1,
            processing_method: None,
        }
    }

    #[test]
    fn test_upsert_appends_in_order() {
        let mut store = MessageStore::new();
        let a = ChatMessage::user("a", Vec::new());
        let b = ChatMessage::assistant_placeholder();
        let (a_id, b_id) = (a.id.clone(), b.id.clone());

        store.upsert(a);
        store.upsert(b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.messages()[0].id, a_id);
        assert_eq!(store.messages()[1].id, b_id);
        assert_eq!(store.get(&b_id).unwrap().content, PLACEHOLDER_TEXT);
    }

    #[test]
    fn test_upsert_merges_non_empty_fields() {
        let mut store = MessageStore::new();
        let original = ChatMessage::user("question", vec![file_ref("a.txt")]);
        let id = original.id.clone();
        store.upsert(original.clone());

        let mut partial = original.clone();
        partial.content = String::new();
        partial.attachments = Vec::new();
        partial.status = MessageStatus::Errored;
        store.upsert(partial);

        let merged = store.get(&id).unwrap();
        assert_eq!(merged.content, "question");
        assert_eq!(merged.attachments.len(), 1);
        assert_eq!(merged.status, MessageStatus::Errored);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_re_upsert_does_not_regress_appended_content() {
        let mut store = MessageStore::new();
        let placeholder = ChatMessage::assistant_placeholder();
        let id = placeholder.id.clone();
        store.upsert(placeholder);

        for chunk in ["The ", "answer ", "is 4"] {
            store.update(&id, |m| {
                if m.status == MessageStatus::Pending {
                    m.content.clear();
                    m.status = MessageStatus::Streaming;
                }
                m.content.push_str(chunk);
            });
        }

        // Duplicate delivery of the full message object
        let snapshot = store.get(&id).unwrap().clone();
        store.upsert(snapshot.clone());
        store.upsert(snapshot);

        let msg = store.get(&id).unwrap();
        assert_eq!(msg.content, "The answer is 4");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut store = MessageStore::new();
        store.upsert(ChatMessage::user("hi", Vec::new()));

        let touched = store.update(&MessageId::from("gone"), |m| m.content.push('!'));
        assert!(!touched);
        assert_eq!(store.messages()[0].content, "hi");
    }

    #[test]
    fn test_replace_all_and_clear() {
        let mut store = MessageStore::new();
        store.upsert(ChatMessage::user("old", Vec::new()));

        let history = vec![
            ChatMessage::user("q1", Vec::new()),
            ChatMessage::user("q2", Vec::new()),
        ];
        let second = history[1].id.clone();
        store.replace_all(history);

        assert_eq!(store.len(), 2);
        assert_eq!(store.last().unwrap().id, second);
        assert!(store.get(&second).is_some());

        store.clear();
        assert!(store.is_empty());
        assert!(store.get(&second).is_none());
    }
}
