//! HTTP client for the chat backend
//!
//! Wraps every endpoint the pipeline needs: file upload, the response
//! stream, generation interrupt, and the chat CRUD calls used for setup and
//! history. Plain request/response calls carry a per-request timeout; the
//! stream only has the connect timeout, so a stalled stream stays open until
//! it is cancelled.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::stream::{finish_cancelled, pump, StreamOutcome, StreamSink};
use crate::config::ServerConfig;
use crate::error::{Error, GenerationError, Result};
use crate::stager::StagedAttachment;
use crate::types::{Chat, ChatId, FileRef, DEFAULT_CHAT_TITLE};

/// Reported when a stream request has neither text nor files
pub const EMPTY_REQUEST_MESSAGE: &str = "No message content or file provided.";

/// Body of `POST /chats/{id}/stream`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
}

impl StreamRequest {
    /// Build a request from prompt text and uploaded files; empty text is omitted
    pub fn new(text: &str, files: &[FileRef]) -> Self {
        Self {
            content: (!text.is_empty()).then(|| text.to_string()),
            file_ids: files.iter().map(|f| f.file_id.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.file_ids.is_empty()
    }
}

/// Response from `POST /chats/{id}/interrupt`
#[derive(Debug, Clone, Deserialize)]
pub struct InterruptResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct CreateChatRequest<'a> {
    title: &'a str,
    #[serde(rename = "forceCreate")]
    force_create: bool,
}

#[derive(Serialize)]
struct RenameChatRequest<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct InterruptRequestBody<'a> {
    generation_id: Option<&'a str>,
}

/// Error body shape used by the backend for non-2xx responses
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// HTTP client for the chat backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    /// Create a client from the `[server]` configuration
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("server.base_url is required".to_string()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_token: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn chat_url(&self, chat_id: &ChatId, suffix: &str) -> String {
        self.url(&format!(
            "/chats/{}{}",
            urlencoding::encode(chat_id.as_str()),
            suffix
        ))
    }

    // ============================================
    // Chats
    // ============================================

    /// Create an empty chat titled "New Chat"
    pub async fn create_chat(&self) -> Result<Chat> {
        let response = self
            .http_client
            .post(self.url("/chats"))
            .timeout(self.request_timeout)
            .json(&CreateChatRequest {
                title: DEFAULT_CHAT_TITLE,
                force_create: true,
            })
            .send()
            .await?;

        let chat: Chat = check(response).await?.json().await?;
        tracing::info!(chat_id = %chat.id, "Created chat");
        Ok(chat)
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>> {
        let response = self
            .http_client
            .get(self.url("/chats"))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Fetch a chat with its message history
    pub async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        let response = self
            .http_client
            .get(self.chat_url(chat_id, ""))
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ChatNotFound(chat_id.to_string()));
        }
        Ok(check(response).await?.json().await?)
    }

    pub async fn rename_chat(&self, chat_id: &ChatId, title: &str) -> Result<Chat> {
        let response = self
            .http_client
            .patch(self.chat_url(chat_id, ""))
            .timeout(self.request_timeout)
            .json(&RenameChatRequest { title })
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<()> {
        let response = self
            .http_client
            .delete(self.chat_url(chat_id, ""))
            .timeout(self.request_timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ChatNotFound(chat_id.to_string()));
        }
        check(response).await?;
        Ok(())
    }

    // ============================================
    // Files
    // ============================================

    /// Upload one staged file as multipart field `file`
    pub async fn upload_file(&self, file: &StagedAttachment) -> Result<FileRef> {
        let data = tokio::fs::read(&file.path).await?;
        let part = Part::bytes(data)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.url("/files/upload"))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        let file_ref: FileRef = check(response).await?.json().await?;
        tracing::debug!(
            file_id = %file_ref.file_id,
            name = %file.name,
            size = file.size,
            "Uploaded attachment"
        );
        Ok(file_ref)
    }

    /// Upload files one at a time, in order, stopping at the first failure.
    ///
    /// The returned references are in the same order as `files`.
    pub async fn upload_all(
        &self,
        files: &[StagedAttachment],
    ) -> std::result::Result<Vec<FileRef>, GenerationError> {
        let mut refs = Vec::with_capacity(files.len());
        for file in files {
            match self.upload_file(file).await {
                Ok(file_ref) => refs.push(file_ref),
                Err(e) => {
                    tracing::warn!(name = %file.name, error = %e, "Attachment upload failed");
                    return Err(GenerationError::UploadFailed {
                        file: file.name.clone(),
                        message: e.detail(),
                    });
                }
            }
        }
        Ok(refs)
    }

    // ============================================
    // Generation
    // ============================================

    /// Send a prompt and feed the response stream into `sink`.
    ///
    /// Every failure is reported through the sink; this never returns an
    /// error. After cancellation the sink only receives `on_done`.
    pub async fn stream_message(
        &self,
        chat_id: &ChatId,
        request: &StreamRequest,
        cancel: &CancellationToken,
        sink: &mut dyn StreamSink,
    ) -> StreamOutcome {
        if request.is_empty() {
            sink.on_error(GenerationError::SetupFailed(EMPTY_REQUEST_MESSAGE.to_string()));
            sink.on_done();
            return StreamOutcome::Finished;
        }

        let send = self
            .http_client
            .post(self.chat_url(chat_id, "/stream"))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return finish_cancelled(0, sink),
            response = send => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(_) if cancel.is_cancelled() => return finish_cancelled(0, sink),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Stream request failed");
                sink.on_error(GenerationError::StreamOpenFailed(e.to_string()));
                sink.on_done();
                return StreamOutcome::Finished;
            }
        };

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            tracing::warn!(chat_id = %chat_id, detail = %detail, "Stream request rejected");
            if cancel.is_cancelled() {
                return finish_cancelled(0, sink);
            }
            sink.on_error(GenerationError::StreamOpenFailed(detail));
            sink.on_done();
            return StreamOutcome::Finished;
        }

        tracing::debug!(chat_id = %chat_id, "Stream opened");
        pump(response.bytes_stream(), cancel, sink).await
    }

    /// Ask the backend to stop a running generation.
    ///
    /// Without a server generation id the backend stops every generation
    /// running for the chat.
    pub async fn interrupt(
        &self,
        chat_id: &ChatId,
        generation_id: Option<&str>,
    ) -> Result<InterruptResponse> {
        let response = self
            .http_client
            .post(self.chat_url(chat_id, "/interrupt"))
            .timeout(self.request_timeout)
            .json(&InterruptRequestBody { generation_id })
            .send()
            .await?;

        let result: InterruptResponse = check(response).await?.json().await?;
        tracing::info!(
            chat_id = %chat_id,
            status = %result.status,
            message = %result.message,
            "Interrupt acknowledged"
        );
        Ok(result)
    }
}

/// Pass successful responses through; turn anything else into `Error::Api`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Error::Api(error_detail(response).await))
    }
}

/// The body's `detail` string, or `Error: <code> <reason>`.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let fallback = format!(
        "Error: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .trim_end()
    .to_string();

    match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) if !detail.is_empty() => detail,
        _ => fallback,
    }
}
