//! tidechat-ask - headless client for a streaming chat backend
//!
//! Runs one generation through the same engine as the TUI and prints the
//! revealed answer to stdout as it appears. Useful for scripting and for
//! checking a backend without a terminal UI.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/tidechat/config.toml (~/.config/tidechat/config.toml)
//! - Logs: $XDG_STATE_HOME/tidechat/tidechat.log (~/.local/state/tidechat/tidechat.log)

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tidechat_core::session::run_generation;
use tidechat_core::{
    ApiClient, ChatEngine, ChatId, Config, MessageId, RevealMode, StagedAttachment,
};
use tokio::sync::mpsc;

/// Reveal rate that shows every received unit on the next tick
const UNPACED_RATE: f64 = 1e9;

#[derive(Parser)]
#[command(name = "tidechat-ask")]
#[command(about = "Ask a streaming chat backend a single question")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt and print the answer
    Ask {
        /// Continue an existing chat instead of creating one
        #[arg(long)]
        chat: Option<String>,

        /// Attach a file (repeatable, up to the configured limit)
        #[arg(short, long = "attach", value_name = "PATH")]
        attach: Vec<PathBuf>,

        /// Reveal word by word
        #[arg(long)]
        words: bool,

        /// Print text as soon as it arrives
        #[arg(long)]
        no_pace: bool,

        /// The prompt (may be empty when files are attached)
        prompt: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load().context("failed to load configuration")?;

    match args.command {
        Command::Config => {
            print_config(&config);
            Ok(())
        }
        Command::Ask {
            chat,
            attach,
            words,
            no_pace,
            prompt,
        } => {
            if words {
                config.playback.mode = RevealMode::Words;
            }
            if no_pace {
                config.playback.char_rate = UNPACED_RATE;
                config.playback.word_rate = UNPACED_RATE;
            }

            let _log_guard = tidechat_core::logging::init(&config.logging)
                .context("failed to initialize logging")?;

            ask(&config, chat, &attach, &prompt.join(" ")).await
        }
    }
}

async fn ask(config: &Config, chat: Option<String>, attach: &[PathBuf], prompt: &str) -> Result<()> {
    let client = ApiClient::new(&config.server).context("failed to create API client")?;
    let mut engine = ChatEngine::from_config(config);

    if let Some(chat_id) = chat {
        let chat = client
            .get_chat(&ChatId::from(chat_id))
            .await
            .context("failed to load chat")?;
        let chat_id = chat.id.clone();
        engine.open_chat(Some(chat_id), chat.into_history());
    }

    for path in attach {
        let file = StagedAttachment::from_path(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        engine
            .stage(file)
            .with_context(|| format!("cannot attach {}", path.display()))?;
    }

    let job = engine.submit(prompt).context("cannot send prompt")?;
    let assistant_id = engine
        .messages()
        .last()
        .map(|m| m.id.clone())
        .context("assistant message missing after submit")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_generation(client.clone(), job, tx));
    let mut ticker = tokio::time::interval(config.playback.tick_interval());
    let mut printer = RevealPrinter::default();
    let mut failure = None;
    let mut stopped = false;

    while engine.is_generating() {
        tokio::select! {
            Some(update) = rx.recv() => {
                if let Some(notice) = engine.apply(update) {
                    failure = Some(notice);
                }
            }
            _ = ticker.tick() => {
                engine.tick(Instant::now());
            }
            _ = tokio::signal::ctrl_c() => {
                stopped = true;
                if let Some(request) = engine.stop() {
                    if let Err(e) = client
                        .interrupt(&request.chat_id, request.server_generation_id.as_deref())
                        .await
                    {
                        tracing::warn!(error = %e, "Interrupt request failed");
                    }
                }
            }
        }

        printer.print(&engine, &assistant_id)?;
    }
    printer.print(&engine, &assistant_id)?;
    println!();

    if stopped {
        handle.abort();
        eprintln!("[stopped]");
        return Ok(());
    }
    // The job has nothing left to report once the engine settled
    let _ = handle.await;

    if let Some(notice) = failure {
        bail!("{}: {}", notice.title, notice.message);
    }
    if let Some(chat_id) = engine.chat_id() {
        tracing::info!(chat_id = %chat_id, "Answer complete");
    }
    Ok(())
}

/// Writes the newly revealed part of one message to stdout
#[derive(Default)]
struct RevealPrinter {
    printed: usize,
}

impl RevealPrinter {
    fn print(&mut self, engine: &ChatEngine, id: &MessageId) -> Result<()> {
        let Some(message) = engine.message(id) else {
            return Ok(());
        };
        if message.is_loading() || message.is_error() {
            return Ok(());
        }

        let visible = engine.visible_content(message);
        if let Some(fresh) = visible.get(self.printed..).filter(|s| !s.is_empty()) {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(fresh.as_bytes())?;
            stdout.flush()?;
            self.printed = visible.len();
        }
        Ok(())
    }
}

fn print_config(config: &Config) {
    let config_path = Config::config_path();
    println!("tidechat configuration");
    println!("======================");
    println!();
    println!(
        "Config file: {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "not found, using defaults" }
    );
    println!("Log file:    {}", Config::log_path().display());
    println!();
    println!("[server]");
    println!("  base_url:             {}", config.server.base_url);
    println!(
        "  api_token:            {}",
        if config.server.api_token.is_some() { "(set)" } else { "(not set)" }
    );
    println!("  connect_timeout_secs: {}", config.server.connect_timeout_secs);
    println!("  request_timeout_secs: {}", config.server.request_timeout_secs);
    println!();
    println!("[playback]");
    println!("  mode:      {:?}", config.playback.mode);
    println!("  char_rate: {}", config.playback.char_rate);
    println!("  word_rate: {}", config.playback.word_rate);
    println!("  tick_ms:   {}", config.playback.tick_ms);
    println!();
    println!("[attachments]");
    println!("  max_files:        {}", config.attachments.max_files);
    println!("  max_file_size_mb: {}", config.attachments.max_file_size_mb);
    println!();
    println!("[logging]");
    println!("  level:     {}", config.logging.level);
    println!("  max_files: {}", config.logging.max_files);
}

