//! `resilient-http` issues outbound HTTP requests that survive flaky networks.
//!
//! A logical request is sent through [`HttpEngine::execute`] (or the free
//! [`execute`] function):
//! - transport failures are retried with exponential backoff
//!   (`2^attempt` time units) up to [`RequestOptions::max_retries`] attempts
//! - error statuses become [`HttpError::Status`] and are not retried by default
//! - successful bodies are decoded as JSON, text or bytes, or exposed as a
//!   lazily-read [`ChunkStream`] of byte blocks or line-delimited JSON values
//!   ending at a `[DONE]` line

mod client;
mod decode;
mod error;
mod executor;
mod options;
mod request;
mod retry;
mod types;

pub use client::{execute, execute_spec, HttpEngine};
pub use decode::{ContentKind, STREAM_SENTINEL};
pub use error::HttpError;
pub use options::{RequestOptions, StreamFraming};
pub use request::RequestSpec;
pub use retry::{Sleeper, TokioSleeper};
pub use types::{Chunk, ChunkStream, DecodedResponse, Payload};

pub type Result<T> = std::result::Result<T, HttpError>;
