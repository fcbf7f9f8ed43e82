//! Chat engine
//!
//! [`ChatEngine`] is the single-writer state container for one chat view. It
//! owns the message store, the playback scheduler, the attachment stager and
//! the live [`GenerationSession`]. Every mutation goes through `&mut self`:
//! user actions ([`ChatEngine::submit`], [`ChatEngine::stop`]), updates from
//! the async job ([`ChatEngine::apply`]) and the playback clock
//! ([`ChatEngine::tick`]). The owner drives all three from one loop.
//!
//! ## Stale updates
//!
//! Updates carry the [`GenerationId`] of the session that produced them. An
//! update for any other id is dropped before it can touch the store or the
//! `is_generating`/`is_animating` flags.

use std::time::Instant;

use crate::config::{Config, PlaybackConfig};
use crate::error::{GenerationError, StageError, SubmitError};
use crate::playback::PlaybackScheduler;
use crate::session::{GenerationEvent, GenerationJob, GenerationSession, GenerationUpdate, Phase};
use crate::stager::{AttachmentPolicy, AttachmentStager, StagedAttachment};
use crate::store::MessageStore;
use crate::types::{
    AttachmentId, ChatId, ChatMessage, FileRef, GenerationId, MessageId, MessageStatus,
};

/// Transient user-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    fn from_error(error: &GenerationError) -> Self {
        Self {
            title: error.title().to_string(),
            message: error.to_string(),
        }
    }
}

/// Best-effort interrupt to send after a stop; nobody waits for its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptRequest {
    pub chat_id: ChatId,
    pub server_generation_id: Option<String>,
}

#[derive(Debug)]
pub struct ChatEngine {
    chat_id: Option<ChatId>,
    store: MessageStore,
    playback: PlaybackScheduler,
    stager: AttachmentStager,
    session: Option<GenerationSession>,
    /// Last stopped generation, whose chat may still be on its way
    stopped_generation: Option<GenerationId>,
    is_generating: bool,
    is_animating: bool,
}

impl ChatEngine {
    pub fn new(playback: &PlaybackConfig, policy: AttachmentPolicy) -> Self {
        Self {
            chat_id: None,
            store: MessageStore::new(),
            playback: PlaybackScheduler::from_config(playback),
            stager: AttachmentStager::new(policy),
            session: None,
            stopped_generation: None,
            is_generating: false,
            is_animating: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.playback, AttachmentPolicy::from(&config.attachments))
    }

    // ============================================
    // Read access
    // ============================================

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn message(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.store.get(id)
    }

    /// Text to display for a message: the revealed prefix while it is being
    /// played back, otherwise its full content
    pub fn visible_content<'a>(&'a self, message: &'a ChatMessage) -> &'a str {
        if message.status == MessageStatus::Pending {
            return &message.content;
        }
        self.playback
            .visible_text(&message.id)
            .unwrap_or(&message.content)
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn staged(&self) -> &[StagedAttachment] {
        self.stager.staged()
    }

    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.session.as_ref().map(GenerationSession::phase)
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn is_animating(&self) -> bool {
        self.is_animating
    }

    // ============================================
    // Attachments
    // ============================================

    pub fn stage(&mut self, file: StagedAttachment) -> Result<AttachmentId, StageError> {
        self.stager.add(file)
    }

    pub fn unstage(&mut self, id: &AttachmentId) {
        self.stager.remove(id);
    }

    pub fn clear_staged(&mut self) {
        self.stager.clear();
    }

    // ============================================
    // Chat switching
    // ============================================

    /// Show another chat (or a blank one with `None`).
    ///
    /// A running generation is detached, not cancelled: the backend may keep
    /// going, but its updates are stale from here on. History is shown in
    /// full and never animated.
    pub fn open_chat(&mut self, chat_id: Option<ChatId>, history: Vec<ChatMessage>) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                generation = %session.id(),
                phase = session.phase().as_str(),
                "Detaching generation on chat switch"
            );
        }
        self.chat_id = chat_id;
        self.stopped_generation = None;
        self.store.replace_all(history);
        self.playback.clear();
        self.stager.clear();
        self.is_generating = false;
        self.is_animating = false;
    }

    // ============================================
    // Generation lifecycle
    // ============================================

    /// Start a generation for `text` plus every staged file.
    ///
    /// Appends the user message and an assistant placeholder, and returns the
    /// job for the caller to run with [`crate::session::run_generation`].
    pub fn submit(&mut self, text: &str) -> Result<GenerationJob, SubmitError> {
        if self.session.is_some() {
            return Err(SubmitError::Busy);
        }
        let text = text.trim();
        if text.is_empty() && self.stager.is_empty() {
            return Err(SubmitError::Empty);
        }

        let attachments = self.stager.take_all();
        let local_refs: Vec<FileRef> = attachments
            .iter()
            .map(|file| FileRef {
                file_id: file.id.to_string(),
                filename: file.name.clone(),
                content_type: file.mime_type.clone(),
                size: file.size,
                processing_method: None,
            })
            .collect();

        let user = ChatMessage::user(text, local_refs);
        let assistant = ChatMessage::assistant_placeholder();
        let session =
            GenerationSession::new(user.id.clone(), assistant.id.clone(), !attachments.is_empty());

        tracing::info!(
            generation = %session.id(),
            chat_id = ?self.chat_id,
            attachments = attachments.len(),
            "Submitting prompt"
        );

        let job = GenerationJob {
            generation: session.id(),
            chat_id: self.chat_id.clone(),
            prompt: text.to_string(),
            attachments,
            cancel: session.cancel_token(),
        };

        self.store.upsert(user);
        self.store.upsert(assistant);
        self.session = Some(session);
        self.stopped_generation = None;
        self.is_generating = true;
        self.is_animating = true;

        Ok(job)
    }

    /// Apply one update from the async job. Returns a notice on failure.
    pub fn apply(&mut self, update: GenerationUpdate) -> Option<Notice> {
        if self.adopt_stopped_chat(&update) {
            return None;
        }
        if !self.is_current(update.generation) {
            tracing::debug!(generation = %update.generation, "Dropping stale generation update");
            return None;
        }

        match update.event {
            GenerationEvent::ChatReady(chat_id) => {
                tracing::debug!(chat_id = %chat_id, "Generation created chat");
                self.chat_id = Some(chat_id);
                None
            }
            GenerationEvent::UploadsFinished(refs) => {
                if let Some(session) = self.session.as_mut() {
                    tracing::debug!(files = refs.len(), "Uploads finished");
                    session.uploads_finished(refs);
                }
                None
            }
            GenerationEvent::ServerGeneration(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_server_generation_id(id);
                }
                None
            }
            GenerationEvent::Chunk(text) => {
                self.apply_chunk(text);
                None
            }
            GenerationEvent::StreamDone => {
                self.apply_stream_done();
                None
            }
            GenerationEvent::Failed(error) => Some(self.fail(error)),
        }
    }

    /// Advance playback to `now`. Returns messages whose reveal just completed.
    pub fn tick(&mut self, now: Instant) -> Vec<MessageId> {
        let completed = self.playback.tick(now);

        let assistant = self
            .session
            .as_ref()
            .map(|s| s.assistant_message().clone());
        if let Some(assistant) = assistant {
            if completed.contains(&assistant) {
                let phase = self
                    .session
                    .as_mut()
                    .map(GenerationSession::mark_revealed);
                if phase == Some(Phase::Done) {
                    self.finish();
                }
            }
        }

        completed
    }

    /// Stop the live generation immediately.
    ///
    /// Flags drop at once, playback snaps to the full received text and the
    /// transport is aborted without reporting an error. Returns the interrupt
    /// to send to the backend, if the chat exists there.
    pub fn stop(&mut self) -> Option<InterruptRequest> {
        let mut session = self.session.take()?;
        session.cancel();
        self.stopped_generation = Some(session.id());
        self.is_generating = false;
        self.is_animating = false;
        self.playback.stop_all();

        let assistant = session.assistant_message().clone();
        self.store.update(&assistant, |m| {
            if m.status == MessageStatus::Pending {
                m.content.clear();
            }
            m.status = MessageStatus::Complete;
        });
        self.playback.remove(&assistant);

        tracing::info!(
            generation = %session.id(),
            chunks = session.chunk_count(),
            "Generation cancelled"
        );

        self.chat_id.clone().map(|chat_id| InterruptRequest {
            chat_id,
            server_generation_id: session.server_generation_id().map(str::to_string),
        })
    }

    /// A chat created just before a stop still belongs to this view.
    fn adopt_stopped_chat(&mut self, update: &GenerationUpdate) -> bool {
        let GenerationEvent::ChatReady(chat_id) = &update.event else {
            return false;
        };
        if self.chat_id.is_some() || self.stopped_generation != Some(update.generation) {
            return false;
        }
        tracing::info!(chat_id = %chat_id, "Keeping chat created by a stopped generation");
        self.chat_id = Some(chat_id.clone());
        true
    }

    fn is_current(&self, generation: GenerationId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.id() == generation && !s.phase().is_terminal())
    }

    fn apply_chunk(&mut self, text: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let first = session.record_chunk();
        let assistant = session.assistant_message().clone();

        self.store.update(&assistant, |m| {
            if first {
                m.content = text;
            } else {
                m.content.push_str(&text);
            }
            m.status = MessageStatus::Streaming;
        });

        if let Some(message) = self.store.get(&assistant) {
            self.playback.push_text(&assistant, &message.content);
        }
    }

    fn apply_stream_done(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let phase = session.mark_stream_done();
        let assistant = session.assistant_message().clone();

        if session.chunk_count() == 0 {
            self.store.update(&assistant, |m| {
                if m.status == MessageStatus::Pending {
                    m.content.clear();
                }
            });
        }

        if phase == Phase::Done {
            self.finish();
        } else {
            tracing::debug!(phase = phase.as_str(), "Stream done, waiting for reveal");
        }
    }

    fn finish(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let assistant = session.assistant_message().clone();
        self.store
            .update(&assistant, |m| m.status = MessageStatus::Complete);
        self.playback.remove(&assistant);
        self.is_generating = false;
        self.is_animating = false;

        tracing::info!(
            generation = %session.id(),
            chunks = session.chunk_count(),
            "Generation complete"
        );
    }

    fn fail(&mut self, error: GenerationError) -> Notice {
        let notice = Notice::from_error(&error);
        if let Some(mut session) = self.session.take() {
            session.fail();
            let assistant = session.assistant_message().clone();
            let text = error.inline_text();
            self.store.update(&assistant, |m| {
                m.content = text;
                m.status = MessageStatus::Errored;
            });
            self.playback.remove(&assistant);

            tracing::warn!(generation = %session.id(), error = %error, "Generation failed");
        }
        self.is_generating = false;
        self.is_animating = false;
        notice
    }
}

impl Default for ChatEngine {
    fn default() -> Self {
        Self::new(&PlaybackConfig::default(), AttachmentPolicy::default())
    }
}
