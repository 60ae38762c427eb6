//! Transport-only client for the canvas model service.
//!
//! This crate owns request building, response framing and retry behavior for
//! the streaming endpoint. It knows nothing about canvas state: each inbound
//! frame is handed to the caller as a raw partial action value.
//!
//! The inbound stream is a sequence of `data: <json-fragment>\n\n` frames
//! terminated by `data: [DONE]\n\n`. A fragment carrying an `error` member
//! fails the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ModelApiClient, StreamResult};
pub use config::ModelApiConfig;
pub use error::ModelApiError;
pub use payload::{ModelApiRequest, WireContent, WireMessage};
pub use sse::{SseStreamParser, StreamFrame};
pub use url::normalize_endpoint;
