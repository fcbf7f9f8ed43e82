//! Stream transport
//!
//! Talks to the chat backend and turns its incremental response body into
//! chunk/error/done callbacks.

pub mod client;
pub mod frame;
pub mod stream;

pub use client::{ApiClient, InterruptResponse, StreamRequest, EMPTY_REQUEST_MESSAGE};
pub use frame::{Frame, LineBuffer};
pub use stream::{pump, StreamOutcome, StreamSink};
