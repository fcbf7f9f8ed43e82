//! Generation session
//!
//! A [`GenerationSession`] tracks one submit-to-answer cycle. The network
//! side runs as an async job ([`run_generation`]) that never touches shared
//! state: it reports [`GenerationUpdate`]s over a channel, each tagged with
//! the [`GenerationId`] it was started with. The engine applies them and
//! drops any update whose id no longer matches the live session.
//!
//! ## Phases
//!
//! ```text
//! uploading ─> streaming ─> animating ─> settling ─> done
//!     │            │            │            │
//!     └────────────┴────────────┴────────────┴─> failed | cancelled
//! ```
//!
//! `done` requires both completion signals: the stream said done and the
//! playback scheduler revealed everything.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::GenerationError;
use crate::stager::StagedAttachment;
use crate::transport::{ApiClient, StreamRequest, StreamSink};
use crate::types::{title_from_prompt, ChatId, FileRef, GenerationId, MessageId};

/// Where a generation is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Pushing staged attachments, one at a time
    Uploading,
    /// Request open, no chunk yet
    Streaming,
    /// Chunks arriving, stream still open
    Animating,
    /// Stream finished, reveal still catching up
    Settling,
    Done,
    Cancelled,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Cancelled | Phase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uploading => "uploading",
            Phase::Streaming => "streaming",
            Phase::Animating => "animating",
            Phase::Settling => "settling",
            Phase::Done => "done",
            Phase::Cancelled => "cancelled",
            Phase::Failed => "failed",
        }
    }
}

/// State of the live generation
#[derive(Debug)]
pub struct GenerationSession {
    id: GenerationId,
    user_message: MessageId,
    assistant_message: MessageId,
    phase: Phase,
    stream_done: bool,
    /// Starts true: nothing to reveal before the first chunk
    reveal_done: bool,
    chunks: usize,
    server_generation_id: Option<String>,
    /// Backend references for the uploaded attachments
    uploaded_files: Vec<FileRef>,
    cancel: CancellationToken,
}

impl GenerationSession {
    pub fn new(user_message: MessageId, assistant_message: MessageId, has_uploads: bool) -> Self {
        Self {
            id: GenerationId::new(),
            user_message,
            assistant_message,
            phase: if has_uploads {
                Phase::Uploading
            } else {
                Phase::Streaming
            },
            stream_done: false,
            reveal_done: true,
            chunks: 0,
            server_generation_id: None,
            uploaded_files: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user_message(&self) -> &MessageId {
        &self.user_message
    }

    pub fn assistant_message(&self) -> &MessageId {
        &self.assistant_message
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn server_generation_id(&self) -> Option<&str> {
        self.server_generation_id.as_deref()
    }

    pub fn set_server_generation_id(&mut self, id: String) {
        self.server_generation_id = Some(id);
    }

    /// Handle shared with the job; cancelling it aborts the transport
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn uploaded_files(&self) -> &[FileRef] {
        &self.uploaded_files
    }

    pub fn uploads_finished(&mut self, files: Vec<FileRef>) {
        self.uploaded_files = files;
        if self.phase == Phase::Uploading {
            self.phase = Phase::Streaming;
        }
    }

    /// Count a chunk. Returns true for the first one.
    pub fn record_chunk(&mut self) -> bool {
        self.chunks += 1;
        self.reveal_done = false;
        if matches!(self.phase, Phase::Uploading | Phase::Streaming) {
            self.phase = Phase::Animating;
        }
        self.chunks == 1
    }

    /// The stream signalled done; returns the resulting phase.
    pub fn mark_stream_done(&mut self) -> Phase {
        self.stream_done = true;
        self.settle()
    }

    /// The scheduler revealed everything known so far; returns the resulting phase.
    pub fn mark_revealed(&mut self) -> Phase {
        self.reveal_done = true;
        self.settle()
    }

    fn settle(&mut self) -> Phase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        self.phase = match (self.stream_done, self.reveal_done) {
            (true, true) => Phase::Done,
            (true, false) => Phase::Settling,
            (false, _) => self.phase,
        };
        self.phase
    }

    pub fn is_settled(&self) -> bool {
        self.stream_done && self.reveal_done
    }

    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Abort the transport and enter `cancelled`
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.phase = Phase::Cancelled;
    }
}

/// What the async job reports back
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// A chat was created for this generation
    ChatReady(ChatId),
    /// Every attachment uploaded; references in submission order
    UploadsFinished(Vec<FileRef>),
    /// The backend's own id for this generation
    ServerGeneration(String),
    Chunk(String),
    Failed(GenerationError),
    StreamDone,
}

/// An event tagged with the generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationUpdate {
    pub generation: GenerationId,
    pub event: GenerationEvent,
}

/// Everything the async side needs to run one generation
#[derive(Debug)]
pub struct GenerationJob {
    pub generation: GenerationId,
    /// `None` when a chat must be created first
    pub chat_id: Option<ChatId>,
    pub prompt: String,
    pub attachments: Vec<StagedAttachment>,
    pub cancel: CancellationToken,
}

/// Forwards stream callbacks as tagged updates
#[derive(Debug, Clone)]
pub struct ChannelSink {
    generation: GenerationId,
    tx: mpsc::UnboundedSender<GenerationUpdate>,
}

impl ChannelSink {
    pub fn new(generation: GenerationId, tx: mpsc::UnboundedSender<GenerationUpdate>) -> Self {
        Self { generation, tx }
    }

    fn send(&self, event: GenerationEvent) {
        // The receiver only goes away when the owner shuts down
        let _ = self.tx.send(GenerationUpdate {
            generation: self.generation,
            event,
        });
    }
}

impl StreamSink for ChannelSink {
    fn on_generation_id(&mut self, id: &str) {
        self.send(GenerationEvent::ServerGeneration(id.to_string()));
    }

    fn on_chunk(&mut self, text: String) {
        self.send(GenerationEvent::Chunk(text));
    }

    fn on_error(&mut self, error: GenerationError) {
        self.send(GenerationEvent::Failed(error));
    }

    fn on_done(&mut self) {
        self.send(GenerationEvent::StreamDone);
    }
}

/// Run one generation: create the chat if needed, upload attachments,
/// then stream the answer. Every outcome is reported through `tx`.
pub async fn run_generation(
    client: ApiClient,
    job: GenerationJob,
    tx: mpsc::UnboundedSender<GenerationUpdate>,
) {
    let mut sink = ChannelSink::new(job.generation, tx);
    let generation = job.generation;
    tracing::info!(
        generation = %generation,
        chat_id = ?job.chat_id,
        attachments = job.attachments.len(),
        "Starting generation"
    );

    let chat_id = match job.chat_id {
        Some(chat_id) => chat_id,
        None => {
            let created = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => return,
                created = client.create_chat() => created,
            };
            match created {
                Ok(chat) => {
                    sink.send(GenerationEvent::ChatReady(chat.id.clone()));
                    rename_new_chat(&client, &chat.id, &job.prompt).await;
                    chat.id
                }
                Err(e) => {
                    tracing::warn!(generation = %generation, error = %e, "Could not create chat");
                    sink.send(GenerationEvent::Failed(GenerationError::SetupFailed(e.detail())));
                    return;
                }
            }
        }
    };

    let mut file_refs = Vec::new();
    if !job.attachments.is_empty() {
        let uploaded = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return,
            uploaded = client.upload_all(&job.attachments) => uploaded,
        };
        match uploaded {
            Ok(refs) => {
                sink.send(GenerationEvent::UploadsFinished(refs.clone()));
                file_refs = refs;
            }
            Err(e) => {
                sink.send(GenerationEvent::Failed(e));
                return;
            }
        }
    }

    if job.cancel.is_cancelled() {
        return;
    }

    let request = StreamRequest::new(&job.prompt, &file_refs);
    let outcome = client
        .stream_message(&chat_id, &request, &job.cancel, &mut sink)
        .await;
    tracing::info!(generation = %generation, chat_id = %chat_id, outcome = ?outcome, "Generation finished");
}

async fn rename_new_chat(client: &ApiClient, chat_id: &ChatId, prompt: &str) {
    let title = title_from_prompt(prompt);
    if title.is_empty() {
        return;
    }
    if let Err(e) = client.rename_chat(chat_id, &title).await {
        tracing::warn!(chat_id = %chat_id, error = %e, "Failed to rename new chat");
    }
}
