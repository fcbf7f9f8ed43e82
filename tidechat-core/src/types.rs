//! Core domain types for tidechat
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Chat** | A server-side conversation; owns an ordered list of messages |
//! | **Chunk** | One increment of assistant text delivered by the stream |
//! | **Generation** | One submit-to-final-answer cycle, identified by a [`GenerationId`] |
//! | **Placeholder** | The `Thinking...` text an assistant message carries until its first chunk |
//! | **FileRef** | A server-assigned reference to an uploaded file |

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Content of an assistant message awaiting its first token.
pub const PLACEHOLDER_TEXT: &str = "Thinking...";

// ============================================
// Identifiers
// ============================================

macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh client-side identifier (UUID v4)
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_string_id!(
    /// Identity of a chat message, stable for the message's lifetime
    MessageId
);
define_string_id!(
    /// Identity of a chat on the backend (an integer on the wire)
    ChatId
);
define_string_id!(
    /// Client-local identity of a staged attachment
    AttachmentId
);

/// Identity of one generation attempt. Never reused across resubmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId(Uuid);

impl GenerationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accept both JSON integers and strings as an id.
fn id_from_int_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => T::from(n.to_string()),
        RawId::Str(s) => T::from(s),
    })
}

/// Parse a backend timestamp. Offsets are honoured; naive values
/// (SQLite-backed servers send these) are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}"))),
        None => Ok(None),
    }
}

// ============================================
// Messages
// ============================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// The backend also spells this `model`
    #[serde(alias = "model")]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Lifecycle of a message's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Assistant placeholder, no token yet
    Pending,
    /// Receiving chunks
    Streaming,
    #[default]
    Complete,
    /// Content holds an error description
    Errored,
}

/// Server-assigned reference to an uploaded file.
///
/// Also used as the attachment descriptor carried by a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    /// "inline" or "files_api"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_method: Option<String>,
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    /// Accumulated text; grows by append while streaming
    pub content: String,
    pub status: MessageStatus,
    /// Immutable after creation
    #[serde(default)]
    pub attachments: Vec<FileRef>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A finished user turn
    pub fn user(content: impl Into<String>, attachments: Vec<FileRef>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Complete,
            attachments,
            created_at: Utc::now(),
        }
    }

    /// An assistant message awaiting its first token
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: PLACEHOLDER_TEXT.to_string(),
            status: MessageStatus::Pending,
            attachments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// True while the message shows the loading indicator
    pub fn is_loading(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    pub fn is_error(&self) -> bool {
        self.status == MessageStatus::Errored
    }

    /// First line of the content, truncated to `max_chars` characters
    pub fn preview(&self, max_chars: usize) -> String {
        let first_line = self.content.lines().next().unwrap_or("");
        if first_line.chars().count() <= max_chars {
            first_line.to_string()
        } else {
            let truncated: String = first_line.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }
}

// ============================================
// Chats (backend DTOs)
// ============================================

/// File metadata as attached to a stored message on the backend
#[derive(Debug, Clone, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub original_filename: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub processing_method: Option<String>,
}

impl From<StoredFile> for FileRef {
    fn from(file: StoredFile) -> Self {
        FileRef {
            file_id: file.id,
            filename: file.original_filename,
            content_type: file.content_type,
            size: file.size,
            processing_method: file.processing_method,
        }
    }
}

/// A message as returned by `GET /chats/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    #[serde(deserialize_with = "id_from_int_or_string")]
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: Vec<StoredFile>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(msg: StoredMessage) -> Self {
        ChatMessage {
            id: msg.id,
            role: msg.role,
            content: msg.content,
            status: MessageStatus::Complete,
            attachments: msg.files.into_iter().map(FileRef::from).collect(),
            created_at: msg.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// A chat with its message history
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    #[serde(deserialize_with = "id_from_int_or_string")]
    pub id: ChatId,
    #[serde(default = "default_chat_title")]
    pub title: String,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

fn default_chat_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

/// Title the backend gives a chat before it is renamed
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

impl Chat {
    /// Convert the stored history into store-ready messages
    pub fn into_history(self) -> Vec<ChatMessage> {
        self.messages.into_iter().map(ChatMessage::from).collect()
    }
}

/// Derive a chat title from the first prompt (40 chars, `...` when cut)
pub fn title_from_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() > 40 {
        let head: String = trimmed.chars().take(40).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_loading() {
        let msg = ChatMessage::assistant_placeholder();
        assert_eq!(msg.content, PLACEHOLDER_TEXT);
        assert!(msg.is_loading());
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
        assert_ne!(GenerationId::new(), GenerationId::new());
    }

    #[test]
    fn test_chat_deserializes_integer_ids() {
        let json = r#"{
            "id": 42,
            "title": "Integrals",
            "create_time": "2025-01-02T03:04:05Z",
            "messages": [
                {"id": 7, "chat_id": 42, "role": "user", "content": "hi",
                 "timestamp": "2025-01-02T03:04:05Z",
                 "files": [{"id": "f-1", "original_filename": "a.png",
                            "content_type": "image/png", "size": 12,
                            "processing_method": "inline"}]},
                {"id": 8, "chat_id": 42, "role": "model", "content": "hello",
                 "timestamp": "2025-01-02T03:04:06Z"}
            ]
        }"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        assert_eq!(chat.id.as_str(), "42");

        let history = chat.into_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id.as_str(), "7");
        assert_eq!(history[0].attachments[0].filename, "a.png");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].status, MessageStatus::Complete);
    }

    #[test]
    fn test_chat_accepts_naive_timestamps() {
        let json = r#"{
            "id": 3,
            "title": "New Chat",
            "create_time": "2025-01-02T03:04:05.123456",
            "messages": [
                {"id": 1, "role": "user", "content": "hi",
                 "timestamp": "2025-01-02T03:04:06"},
                {"id": 2, "role": "model", "content": "hello", "timestamp": null}
            ]
        }"#;
        let chat: Chat = serde_json::from_str(json).unwrap();
        let created = chat.create_time.unwrap();
        assert_eq!(created.to_rfc3339(), "2025-01-02T03:04:05.123456+00:00");

        let history = chat.into_history();
        assert_eq!(
            history[0].created_at,
            parse_timestamp("2025-01-02T03:04:06Z").unwrap()
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = parse_timestamp("2025-01-02T03:04:05Z").unwrap();
        assert_eq!(parse_timestamp("2025-01-02T05:04:05+02:00").unwrap(), utc);
        assert_eq!(parse_timestamp("2025-01-02T03:04:05").unwrap(), utc);
        assert_eq!(parse_timestamp("2025-01-02 03:04:05").unwrap(), utc);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_title_from_prompt() {
        assert_eq!(title_from_prompt("  2+2?  "), "2+2?");
        let long = "a".repeat(45);
        assert_eq!(title_from_prompt(&long), format!("{}...", "a".repeat(40)));
    }

    #[test]
    fn test_preview_truncates_first_line() {
        let msg = ChatMessage::user("first line is long\nsecond", Vec::new());
        assert_eq!(msg.preview(5), "first...");
        assert_eq!(msg.preview(100), "first line is long");
    }
}
