//! Application state for the TUI.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tidechat_core::session::run_generation;
use tidechat_core::{
    ApiClient, ChatEngine, ChatId, GenerationUpdate, InterruptRequest, StagedAttachment,
    SubmitError,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// How long a toast stays on screen
pub const TOAST_TTL: Duration = Duration::from_secs(5);

/// Lines moved per PageUp/PageDown
const PAGE_SCROLL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Error,
}

/// Transient notification shown over the message pane
#[derive(Debug, Clone)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub kind: ToastKind,
    shown_at: Instant,
}

impl Toast {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) >= TOAST_TTL
    }
}

/// Slash commands typed into the input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Attach(PathBuf),
    /// Zero-based index into the staged list
    Detach(usize),
    ClearFiles,
    NewChat,
    Quit,
    Invalid(String),
}

/// Parse input starting with `/`. Anything else is a prompt.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "attach" if arg.is_empty() => Command::Invalid("usage: /attach <path>".to_string()),
        "attach" => Command::Attach(PathBuf::from(arg)),
        "detach" => match arg.parse::<usize>() {
            Ok(n) if n >= 1 => Command::Detach(n - 1),
            _ => Command::Invalid("usage: /detach <number>".to_string()),
        },
        "files-clear" => Command::ClearFiles,
        "new" => Command::NewChat,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("unknown command: /{}", other)),
    };
    Some(command)
}

/// Main application state
pub struct App {
    pub engine: ChatEngine,
    client: ApiClient,
    runtime: Handle,
    updates_tx: mpsc::UnboundedSender<GenerationUpdate>,
    updates_rx: mpsc::UnboundedReceiver<GenerationUpdate>,
    /// Current contents of the input line
    pub input: String,
    /// Scroll offset into the rendered message lines
    pub scroll_offset: usize,
    /// Keep the view pinned to the newest line
    pub follow_tail: bool,
    pub toasts: Vec<Toast>,
    pub should_quit: bool,
}

impl App {
    pub fn new(engine: ChatEngine, client: ApiClient, runtime: Handle) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            client,
            runtime,
            updates_tx,
            updates_rx,
            input: String::new(),
            scroll_offset: 0,
            follow_tail: true,
            toasts: Vec::new(),
            should_quit: false,
        }
    }

    /// Load an existing chat's history into the view.
    pub fn load_chat(&mut self, chat_id: ChatId) -> Result<()> {
        let client = self.client.clone();
        let chat = self
            .runtime
            .block_on(async move { client.get_chat(&chat_id).await })
            .context("failed to load chat")?;

        tracing::info!(chat_id = %chat.id, messages = chat.messages.len(), "Loaded chat");
        let chat_id = chat.id.clone();
        self.engine.open_chat(Some(chat_id), chat.into_history());
        self.follow_tail = true;
        Ok(())
    }

    /// Title shown in the header
    pub fn title(&self) -> String {
        match self.engine.chat_id() {
            Some(id) => format!("tidechat · chat {}", id),
            None => "tidechat · new chat".to_string(),
        }
    }

    /// Short description of the live generation, if any
    pub fn status(&self) -> Option<&'static str> {
        self.engine.phase().map(|phase| phase.as_str())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Esc => self.stop(),
            KeyCode::Enter => {
                if self.engine.is_generating() {
                    self.stop();
                } else {
                    self.submit_input();
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::PageUp => {
                self.follow_tail = false;
                self.scroll_offset = self.scroll_offset.saturating_sub(PAGE_SCROLL);
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_add(PAGE_SCROLL);
            }
            KeyCode::End => self.follow_tail = true,
            _ => {}
        }
    }

    fn submit_input(&mut self) {
        let input = std::mem::take(&mut self.input);
        if let Some(command) = parse_command(&input) {
            self.run_command(command);
            return;
        }

        match self.engine.submit(&input) {
            Ok(job) => {
                self.follow_tail = true;
                self.runtime.spawn(run_generation(
                    self.client.clone(),
                    job,
                    self.updates_tx.clone(),
                ));
            }
            Err(SubmitError::Empty) => {}
            Err(e) => {
                self.input = input;
                self.push_toast("Cannot send", e.to_string(), ToastKind::Info);
            }
        }
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Attach(path) => self.attach(path),
            Command::Detach(index) => {
                let id = self.engine.staged().get(index).map(|f| f.id.clone());
                match id {
                    Some(id) => self.engine.unstage(&id),
                    None => self.push_toast(
                        "Nothing to detach",
                        format!("no staged file #{}", index + 1),
                        ToastKind::Info,
                    ),
                }
            }
            Command::ClearFiles => self.engine.clear_staged(),
            Command::NewChat => {
                self.engine.open_chat(None, Vec::new());
                self.scroll_offset = 0;
                self.follow_tail = true;
            }
            Command::Quit => self.should_quit = true,
            Command::Invalid(message) => self.push_toast("Command", message, ToastKind::Info),
        }
    }

    fn attach(&mut self, path: PathBuf) {
        let staged = match StagedAttachment::from_path(&path) {
            Ok(staged) => staged,
            Err(e) => {
                self.push_toast("Cannot attach file", e.detail(), ToastKind::Error);
                return;
            }
        };
        let name = staged.name.clone();
        if let Err(e) = self.engine.stage(staged) {
            self.push_toast(format!("Cannot attach {}", name), e.to_string(), ToastKind::Error);
        }
    }

    /// Stop the live generation and tell the backend, without waiting.
    pub fn stop(&mut self) {
        if let Some(request) = self.engine.stop() {
            self.send_interrupt(request);
        }
    }

    fn send_interrupt(&self, request: InterruptRequest) {
        let client = self.client.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client
                .interrupt(&request.chat_id, request.server_generation_id.as_deref())
                .await
            {
                tracing::warn!(chat_id = %request.chat_id, error = %e, "Interrupt request failed");
            }
        });
    }

    /// Apply pending generation updates, advance playback and expire toasts.
    pub fn tick(&mut self, now: Instant) {
        while let Ok(update) = self.updates_rx.try_recv() {
            if let Some(notice) = self.engine.apply(update) {
                self.push_toast(notice.title, notice.message, ToastKind::Error);
            }
        }
        self.engine.tick(now);
        self.toasts.retain(|toast| !toast.is_expired(now));
    }

    pub fn push_toast(&mut self, title: impl Into<String>, message: impl Into<String>, kind: ToastKind) {
        self.toasts.push(Toast {
            title: title.into(),
            message: message.into(),
            kind,
            shown_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidechat_core::config::ServerConfig;

    fn test_app(runtime: &tokio::runtime::Runtime) -> App {
        let config = ServerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = ApiClient::new(&config).unwrap();
        App::new(ChatEngine::default(), client, runtime.handle().clone())
    }

    fn type_line(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(
            parse_command("/attach ./notes.pdf"),
            Some(Command::Attach(PathBuf::from("./notes.pdf")))
        );
        assert_eq!(parse_command("/detach 2"), Some(Command::Detach(1)));
        assert!(matches!(parse_command("/detach 0"), Some(Command::Invalid(_))));
        assert!(matches!(parse_command("/attach"), Some(Command::Invalid(_))));
        assert_eq!(parse_command(" /files-clear "), Some(Command::ClearFiles));
        assert_eq!(parse_command("/new"), Some(Command::NewChat));
        assert_eq!(parse_command("/quit"), Some(Command::Quit));
        assert!(matches!(parse_command("/frobnicate"), Some(Command::Invalid(_))));
    }

    #[test]
    fn test_attach_and_detach_commands() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        let image = dir.path().join("diagram.png");
        std::fs::write(&notes, "some notes").unwrap();
        std::fs::write(&image, [0u8; 16]).unwrap();

        type_line(&mut app, &format!("/attach {}", notes.display()));
        type_line(&mut app, &format!("/attach {}", image.display()));
        assert_eq!(app.engine.staged().len(), 2);
        assert!(app.input.is_empty());

        type_line(&mut app, "/detach 1");
        assert_eq!(app.engine.staged().len(), 1);
        assert_eq!(app.engine.staged()[0].name, "diagram.png");

        type_line(&mut app, "/files-clear");
        assert!(app.engine.staged().is_empty());
    }

    #[test]
    fn test_rejected_attachment_shows_toast() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        std::fs::write(&archive, "zip").unwrap();

        type_line(&mut app, &format!("/attach {}", archive.display()));
        type_line(&mut app, "/attach /definitely/not/here.pdf");

        assert!(app.engine.staged().is_empty());
        assert_eq!(app.toasts.len(), 2);
        assert!(app.toasts[0].message.contains("unsupported file type"));
        assert_eq!(app.toasts[0].kind, ToastKind::Error);
    }

    #[test]
    fn test_toasts_expire() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        app.push_toast("Hello", "world", ToastKind::Info);

        app.tick(Instant::now());
        assert_eq!(app.toasts.len(), 1);
        app.tick(Instant::now() + TOAST_TTL + Duration::from_millis(1));
        assert!(app.toasts.is_empty());
    }

    #[test]
    fn test_quit_keys() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        type_line(&mut app, "/quit");
        assert!(app.should_quit);

        let mut app = test_app(&runtime);
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
        assert!(app.input.is_empty());
    }

    #[test]
    fn test_escape_stops_generation() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);

        type_line(&mut app, "tell me something");
        assert!(app.engine.is_generating());
        assert_eq!(app.status(), Some("streaming"));

        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(!app.engine.is_generating());
        assert!(app.status().is_none());

        // The failed connection attempt reports against a dead session
        std::thread::sleep(Duration::from_millis(100));
        app.tick(Instant::now());
        assert!(app.toasts.is_empty());
        assert!(!app.engine.messages()[1].is_error());
    }
}
