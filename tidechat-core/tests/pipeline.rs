//! Integration tests for the generation pipeline
//!
//! A wiremock server stands in for the chat backend. Each test drives a
//! `ChatEngine` the way the binaries do: spawn `run_generation`, drain its
//! updates, and tick playback on a virtual clock until the engine settles.

use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;
use tidechat_core::config::ServerConfig;
use tidechat_core::session::run_generation;
use tidechat_core::transport::{StreamOutcome, StreamRequest, StreamSink};
use tidechat_core::{
    ApiClient, ChatEngine, ChatId, Error, GenerationError, GenerationEvent, GenerationUpdate,
    MessageStatus, Notice, StagedAttachment,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    tidechat_core::logging::init_test();
    let config = ServerConfig {
        base_url: server.uri(),
        api_token: Some("test-token".to_string()),
        ..Default::default()
    };
    ApiClient::new(&config).unwrap()
}

fn sse(lines: &[&str]) -> ResponseTemplate {
    let body: String = lines.iter().map(|l| format!("{l}\n\n")).collect();
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Apply updates and tick playback until the generation settles
async fn drive(
    engine: &mut ChatEngine,
    rx: &mut mpsc::UnboundedReceiver<GenerationUpdate>,
) -> Vec<Notice> {
    let mut notices = Vec::new();
    let mut now = Instant::now();

    for _ in 0..2000 {
        if !engine.is_generating() {
            break;
        }
        if let Ok(Some(update)) = tokio::time::timeout(Duration::from_millis(5), rx.recv()).await {
            notices.extend(engine.apply(update));
        }
        now += Duration::from_millis(50);
        engine.tick(now);
    }

    assert!(!engine.is_generating(), "generation never settled");
    notices
}

/// Run one prompt against `server` for an existing chat
async fn generate(server: &MockServer, chat_id: &str, prompt: &str) -> (ChatEngine, Vec<Notice>) {
    let mut engine = ChatEngine::default();
    engine.open_chat(Some(ChatId::from(chat_id)), Vec::new());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit(prompt).unwrap();
    let handle = tokio::spawn(run_generation(client_for(server), job, tx));

    let notices = drive(&mut engine, &mut rx).await;
    handle.await.unwrap();
    (engine, notices)
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<String>,
}

impl StreamSink for Recorder {
    fn on_generation_id(&mut self, id: &str) {
        self.events.push(format!("id:{id}"));
    }

    fn on_chunk(&mut self, text: String) {
        self.events.push(format!("chunk:{text}"));
    }

    fn on_error(&mut self, error: GenerationError) {
        self.events.push(format!("error:{error}"));
    }

    fn on_done(&mut self) {
        self.events.push("done".to_string());
    }
}

// ============================================
// End-to-end scenarios
// ============================================

#[tokio::test]
async fn test_simple_prompt_streams_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/1/stream"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "text/event-stream"))
        .and(body_json(json!({"content": "2+2?"})))
        .respond_with(sse(&[
            r#"data: {"generation_id": "1_1700000000"}"#,
            r#"data: {"text": "4"}"#,
            "data: [DONE]",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let (engine, notices) = generate(&server, "1", "2+2?").await;

    assert!(notices.is_empty());
    let messages = engine.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "2+2?");
    assert_eq!(messages[1].content, "4");
    assert_eq!(messages[1].status, MessageStatus::Complete);
    assert!(!engine.is_animating());
}

#[tokio::test]
async fn test_new_chat_is_created_and_renamed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats"))
        .and(body_json(json!({"title": "New Chat", "forceCreate": true})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 42, "title": "New Chat", "create_time": "2025-01-01T00:00:00.250000"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/chats/42"))
        .and(body_json(json!({"title": "What is the capital of France?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "title": "What is the capital of France?",
            "create_time": "2025-01-01T00:00:00.250000"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chats/42/stream"))
        .respond_with(sse(&[r#"data: {"text": "Paris."}"#, "data: [DONE]"]))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine = ChatEngine::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit("What is the capital of France?").unwrap();
    let handle = tokio::spawn(run_generation(client_for(&server), job, tx));

    drive(&mut engine, &mut rx).await;
    handle.await.unwrap();

    assert_eq!(engine.chat_id().map(ChatId::as_str), Some("42"));
    assert_eq!(engine.messages()[1].content, "Paris.");
}

#[tokio::test]
async fn test_chat_creation_failure_is_setup_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"})),
        )
        .mount(&server)
        .await;

    let mut engine = ChatEngine::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit("hello").unwrap();
    tokio::spawn(run_generation(client_for(&server), job, tx));

    let notices = drive(&mut engine, &mut rx).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Error starting stream");
    assert_eq!(engine.messages()[1].content, "Error: Not authenticated");
    assert!(engine.chat_id().is_none());
}

#[tokio::test]
async fn test_http_500_detail_becomes_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/3/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "model unavailable"})),
        )
        .mount(&server)
        .await;

    let (engine, notices) = generate(&server, "3", "hi").await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Error generating response");
    let assistant = &engine.messages()[1];
    assert!(assistant.is_error());
    assert!(assistant.content.contains("model unavailable"));
    assert!(!assistant.is_loading());
}

#[tokio::test]
async fn test_http_error_without_detail_uses_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/3/stream"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let (engine, _) = generate(&server, "3", "hi").await;
    assert_eq!(engine.messages()[1].content, "Error: Error: 502 Bad Gateway");
}

#[tokio::test]
async fn test_server_error_frame_fails_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/4/stream"))
        .respond_with(sse(&[
            r#"data: {"text": "Let me"}"#,
            r#"data: {"error": "quota", "text": "An error occurred while generating the response."}"#,
        ]))
        .mount(&server)
        .await;

    let (engine, notices) = generate(&server, "4", "hi").await;

    assert_eq!(notices.len(), 1);
    assert_eq!(
        engine.messages()[1].content,
        "Error: An error occurred while generating the response."
    );
    assert_eq!(engine.messages()[1].status, MessageStatus::Errored);
}

#[tokio::test]
async fn test_raw_payload_is_shown_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/5/stream"))
        .respond_with(sse(&["data: An error occurred.", ": keepalive"]))
        .mount(&server)
        .await;

    let (engine, notices) = generate(&server, "5", "hi").await;
    assert!(notices.is_empty());
    assert_eq!(engine.messages()[1].content, "An error occurred.");
    assert_eq!(engine.messages()[1].status, MessageStatus::Complete);
}

// ============================================
// Attachments
// ============================================

fn write_files(dir: &TempDir, names: &[&str]) -> Vec<StagedAttachment> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("contents of {name}")).unwrap();
            StagedAttachment::from_path(&path).unwrap()
        })
        .collect()
}

/// Answer an upload with a file id derived from the uploaded file name
fn upload_responder(request: &Request) -> ResponseTemplate {
    let body = String::from_utf8_lossy(&request.body);
    let name = if body.contains("filename=\"first.txt\"") {
        "first.txt"
    } else {
        "second.txt"
    };
    ResponseTemplate::new(201).set_body_json(json!({
        "file_id": format!("srv-{name}"),
        "filename": name,
        "content_type": "text/plain",
        "size": 20,
        "processing_method": "inline"
    }))
}

#[tokio::test]
async fn test_uploads_run_in_order_before_stream() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/files/upload"))
        .respond_with(upload_responder)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chats/9/stream"))
        .and(body_json(json!({
            "content": "compare these",
            "file_ids": ["srv-first.txt", "srv-second.txt"]
        })))
        .respond_with(sse(&[r#"data: {"text": "Both are short."}"#, "data: [DONE]"]))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine = ChatEngine::default();
    engine.open_chat(Some(ChatId::from("9")), Vec::new());
    for file in write_files(&dir, &["first.txt", "second.txt"]) {
        engine.stage(file).unwrap();
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit("compare these").unwrap();
    assert!(engine.staged().is_empty());
    let handle = tokio::spawn(run_generation(client_for(&server), job, tx));
    drive(&mut engine, &mut rx).await;
    handle.await.unwrap();

    // Server ids went to the stream request; the message keeps what it was created with
    let user = &engine.messages()[0];
    let names: Vec<_> = user.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["first.txt", "second.txt"]);
    assert!(user.attachments.iter().all(|a| !a.file_id.starts_with("srv-")));
    assert_eq!(engine.messages()[1].content, "Both are short.");
}

#[tokio::test]
async fn test_upload_failure_aborts_submission() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/files/upload"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"detail": "File type text/plain not supported."})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chats/9/stream"))
        .respond_with(sse(&["data: [DONE]"]))
        .expect(0)
        .mount(&server)
        .await;

    let mut engine = ChatEngine::default();
    engine.open_chat(Some(ChatId::from("9")), Vec::new());
    for file in write_files(&dir, &["first.txt", "second.txt"]) {
        engine.stage(file).unwrap();
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit("").unwrap();
    let handle = tokio::spawn(run_generation(client_for(&server), job, tx));
    let notices = drive(&mut engine, &mut rx).await;
    handle.await.unwrap();

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Upload failed");
    let assistant = &engine.messages()[1];
    assert!(assistant.is_error());
    assert!(assistant.content.contains("first.txt"));
    assert!(assistant.content.contains("not supported"));
    assert!(engine.staged().is_empty());
}

// ============================================
// Cancellation
// ============================================

#[tokio::test]
async fn test_stop_aborts_stalled_stream_and_interrupts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/7/stream"))
        .respond_with(sse(&[r#"data: {"text": "late"}"#]).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chats/7/interrupt"))
        .and(body_json(json!({"generation_id": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "warning",
            "message": "No active generations found to interrupt"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut engine = ChatEngine::default();
    engine.open_chat(Some(ChatId::from("7")), Vec::new());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = engine.submit("long story please").unwrap();
    let handle = tokio::spawn(run_generation(client.clone(), job, tx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let interrupt = engine.stop().expect("chat exists on the backend");
    assert!(!engine.is_generating());
    assert!(!engine.is_animating());

    let response = client
        .interrupt(&interrupt.chat_id, interrupt.server_generation_id.as_deref())
        .await
        .unwrap();
    assert_eq!(response.status, "warning");

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("job should stop promptly after cancel")
        .unwrap();

    // Only the closing done arrives after the cancel, and it is stale
    while let Ok(update) = rx.try_recv() {
        assert_eq!(update.event, GenerationEvent::StreamDone);
        assert!(engine.apply(update).is_none());
    }
    let assistant = &engine.messages()[1];
    assert_eq!(assistant.content, "");
    assert_eq!(assistant.status, MessageStatus::Complete);
}

#[tokio::test]
async fn test_stream_message_stops_sink_on_cancel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/8/stream"))
        .respond_with(sse(&[r#"data: {"text": "never"}"#]).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut sink = Recorder::default();
    let outcome = client
        .stream_message(
            &ChatId::from("8"),
            &StreamRequest::new("hi", &[]),
            &cancel,
            &mut sink,
        )
        .await;

    assert_eq!(outcome, StreamOutcome::Cancelled);
    assert_eq!(sink.events, vec!["done"]);
}

// ============================================
// Transport contract
// ============================================

#[tokio::test]
async fn test_stream_callbacks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chats/2/stream"))
        .respond_with(sse(&[
            r#"data: {"generation_id": "2_5"}"#,
            r#"data: {"text": "a"}"#,
            r#"data: {"text": "b"}"#,
            "data: [DONE]",
        ]))
        .mount(&server)
        .await;

    let mut sink = Recorder::default();
    let outcome = client_for(&server)
        .stream_message(
            &ChatId::from("2"),
            &StreamRequest::new("x", &[]),
            &CancellationToken::new(),
            &mut sink,
        )
        .await;

    assert_eq!(outcome, StreamOutcome::Finished);
    assert_eq!(sink.events, vec!["id:2_5", "chunk:a", "chunk:b", "done"]);
}

#[tokio::test]
async fn test_empty_request_never_reaches_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut sink = Recorder::default();
    client_for(&server)
        .stream_message(
            &ChatId::from("2"),
            &StreamRequest::new("", &[]),
            &CancellationToken::new(),
            &mut sink,
        )
        .await;

    assert_eq!(
        sink.events,
        vec!["error:No message content or file provided.", "done"]
    );
}

// ============================================
// Chat CRUD
// ============================================

#[tokio::test]
async fn test_get_chat_loads_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "title": "Math",
            "messages": [
                {"id": 1, "chat_id": 11, "role": "user", "content": "2+2?"},
                {"id": 2, "chat_id": 11, "role": "model", "content": "4"}
            ]
        })))
        .mount(&server)
        .await;

    let chat = client_for(&server).get_chat(&ChatId::from("11")).await.unwrap();
    assert_eq!(chat.title, "Math");

    let mut engine = ChatEngine::default();
    let chat_id = chat.id.clone();
    engine.open_chat(Some(chat_id), chat.into_history());
    assert_eq!(engine.messages().len(), 2);
    assert_eq!(engine.visible_content(&engine.messages()[1]), "4");
    assert!(engine.playback().state(&engine.messages()[1].id).is_none());
}

#[tokio::test]
async fn test_missing_chat_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Chat not found"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/chats/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.get_chat(&ChatId::from("404")).await.unwrap_err();
    assert!(matches!(err, Error::ChatNotFound(id) if id == "404"));
    let err = client.delete_chat(&ChatId::from("404")).await.unwrap_err();
    assert!(matches!(err, Error::ChatNotFound(_)));
}

#[tokio::test]
async fn test_list_and_delete_chats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "title": "First"},
            {"id": 2, "title": "Second", "messages": []}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/chats/2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let chats = client.list_chats().await.unwrap();
    let titles: Vec<_> = chats.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);

    client.delete_chat(&ChatId::from("2")).await.unwrap();
}
