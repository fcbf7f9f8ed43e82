//! tidechat - terminal client for a streaming chat backend
//!
//! Sends prompts and attachments, then reveals the streamed answer at a
//! steady pace. Generation runs on a background tokio runtime; the UI loop
//! owns all state and polls for keys on the playback tick interval.

mod app;
mod message_format;
mod ui;

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tidechat_core::{ApiClient, ChatEngine, ChatId, Config, RevealMode};

use crate::app::App;

#[derive(Parser)]
#[command(name = "tidechat")]
#[command(about = "Chat with a streaming backend from the terminal")]
#[command(version)]
struct Args {
    /// Resume an existing chat by id
    #[arg(long)]
    chat: Option<String>,

    /// Backend base URL (overrides config and TIDECHAT_API_URL)
    #[arg(long)]
    server: Option<String>,

    /// Reveal the answer word by word instead of character by character
    #[arg(long)]
    words: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    if args.words {
        config.playback.mode = RevealMode::Words;
    }
    config.validate().context("invalid configuration")?;

    // Initialize logging (to file, not stdout since we have a TUI)
    let log_guard =
        tidechat_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!(
        server = %config.server.base_url,
        log_dir = %log_guard.log_dir().display(),
        "tidechat TUI starting up"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let client = ApiClient::new(&config.server).context("failed to create API client")?;
    let mut app = App::new(
        ChatEngine::from_config(&config),
        client,
        runtime.handle().clone(),
    );
    if let Some(chat_id) = args.chat {
        app.load_chat(ChatId::from(chat_id))?;
    }

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app, config.playback.tick_interval());

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    // Stop anything still streaming before the runtime goes away
    app.stop();
    runtime.shutdown_timeout(Duration::from_secs(1));

    tracing::info!("tidechat TUI shutting down");

    result
}

/// Run the main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_interval: Duration,
) -> Result<()> {
    loop {
        app.tick(Instant::now());

        // Render
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events
        if event::poll(tick_interval)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
