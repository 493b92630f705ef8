use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures_util::{stream::BoxStream, Stream, StreamExt};
use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{HttpError, Result};

/// One unit of a streamed body.
#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    /// Fixed-size block of raw bytes (the last block may be shorter).
    Bytes(Bytes),
    /// One decoded line of a line-delimited JSON body.
    Json(serde_json::Value),
}

/// Lazily-read, single-pass sequence of chunks.
///
/// Reading is driven by the consumer; nothing is fetched ahead of the chunk
/// being polled. Dropping the stream releases the underlying connection.
pub struct ChunkStream {
    inner: BoxStream<'static, Result<Chunk>>,
}

impl ChunkStream {
    pub(crate) fn new(inner: impl Stream<Item = Result<Chunk>> + Send + 'static) -> Self {
        Self {
            inner: inner.boxed(),
        }
    }

    /// Drains a byte stream into a single buffer.
    ///
    /// Fails with [`HttpError::Decode`] if the stream yields JSON chunks.
    pub async fn collect_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            match chunk? {
                Chunk::Bytes(bytes) => buf.extend_from_slice(&bytes),
                Chunk::Json(_) => {
                    return Err(HttpError::Decode(
                        "cannot collect line-delimited JSON chunks as bytes".to_owned(),
                    ))
                }
            }
        }
        Ok(buf.freeze())
    }
}

impl Stream for ChunkStream {
    type Item = Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

/// Decoded body of a successful request.
#[derive(Debug)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
    Stream(ChunkStream),
}

/// Final value handed to the caller.
#[derive(Debug)]
pub struct DecodedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Payload,
}

impl DecodedResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Takes the chunk stream out of a streaming response.
    pub fn into_stream(self) -> Option<ChunkStream> {
        match self.payload {
            Payload::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Deserializes a buffered JSON payload into `T`.
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.json().ok_or_else(|| {
            HttpError::Decode(format!(
                "expected a JSON payload, got {}",
                self.payload_kind()
            ))
        })?;
        T::deserialize(value)
            .map_err(|err| HttpError::Decode(format!("unexpected JSON shape: {err}")))
    }

    fn payload_kind(&self) -> &'static str {
        match self.payload {
            Payload::Json(_) => "json",
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Stream(_) => "stream",
        }
    }
}
