//! Error types for tidechat-core

use thiserror::Error;

/// Main error type for the tidechat-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend answered with a non-success status
    #[error("API error: {0}")]
    Api(String),

    /// Chat not found on the backend
    #[error("chat not found: {0}")]
    ChatNotFound(String),
}

impl Error {
    /// Message without the category prefix, for showing to users
    pub fn detail(&self) -> String {
        match self {
            Error::Api(message) | Error::Config(message) | Error::ChatNotFound(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for tidechat-core
pub type Result<T> = std::result::Result<T, Error>;

/// Why a generation ended in the `failed` phase.
///
/// Every variant is caught at the session boundary and turned into an errored
/// assistant message plus a transient notice. None of them escape as panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// A staged file failed to upload; the whole submission is aborted
    #[error("failed to upload {file}: {message}")]
    UploadFailed { file: String, message: String },

    /// Non-2xx response before the first chunk
    #[error("{0}")]
    StreamOpenFailed(String),

    /// I/O failure while reading the stream body
    #[error("stream interrupted: {0}")]
    StreamReadFailed(String),

    /// A frame explicitly carried an error payload
    #[error("{0}")]
    ServerReportedError(String),

    /// Anything that went wrong before the stream request was made
    #[error("{0}")]
    SetupFailed(String),
}

impl GenerationError {
    /// Title used for the transient user-facing notice.
    pub fn title(&self) -> &'static str {
        match self {
            GenerationError::SetupFailed(_) => "Error starting stream",
            GenerationError::UploadFailed { .. } => "Upload failed",
            _ => "Error generating response",
        }
    }

    /// Text shown inline in the assistant message bubble.
    pub fn inline_text(&self) -> String {
        format!("Error: {}", self)
    }
}

/// Rejection reasons from the attachment stager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("too many files: at most {max} per prompt")]
    TooMany { max: usize },

    #[error("unsupported file type: {mime}")]
    UnsupportedType { mime: String },

    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
}

/// Why a submission was refused before any session was created.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// A generation is already running for this chat
    #[error("a response is already being generated")]
    Busy,

    /// Neither text nor staged files
    #[error("nothing to send")]
    Empty,
}
