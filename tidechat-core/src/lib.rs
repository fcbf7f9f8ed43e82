//! # tidechat-core
//!
//! Core library for tidechat - a terminal client for a streaming chat backend.
//!
//! This library provides:
//! - The stream transport (HTTP client, line framing, frame parsing)
//! - Generation sessions and the async job that drives them
//! - An ordered message store with idempotent upserts
//! - A playback scheduler that reveals text at a steady pace
//! - Attachment staging with count/type/size limits
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! [`ChatEngine`] is the only writer. Network work runs as a tokio task
//! ([`session::run_generation`]) that sends tagged [`GenerationUpdate`]s
//! back over a channel; the owning loop applies them and ticks playback:
//!
//! ```text
//! submit ─> GenerationJob ─> run_generation ─┐
//!                                            │ GenerationUpdate
//! ChatEngine::apply  <───────────────────────┘
//! ChatEngine::tick   <── fixed-rate clock
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use tidechat_core::{session, ApiClient, ChatEngine, Config};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> tidechat_core::Result<()> {
//! let config = Config::load()?;
//! let client = ApiClient::new(&config.server)?;
//! let mut engine = ChatEngine::from_config(&config);
//! let (tx, mut rx) = mpsc::unbounded_channel();
//!
//! let job = engine.submit("2+2?").expect("nothing else is running");
//! tokio::spawn(session::run_generation(client, job, tx));
//!
//! while let Some(update) = rx.recv().await {
//!     engine.apply(update);
//!     engine.tick(std::time::Instant::now());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use engine::{ChatEngine, InterruptRequest, Notice};
pub use error::{Error, GenerationError, Result, StageError, SubmitError};
pub use playback::{PlaybackScheduler, RevealMode};
pub use session::{GenerationEvent, GenerationJob, GenerationUpdate, Phase};
pub use stager::{AttachmentPolicy, AttachmentStager, StagedAttachment};
pub use store::MessageStore;
pub use transport::ApiClient;
pub use types::*;

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod playback;
pub mod session;
pub mod stager;
pub mod store;
pub mod transport;
pub mod types;
