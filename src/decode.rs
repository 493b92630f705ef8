use bytes::{Bytes, BytesMut};
use futures_util::{
    stream::{self, BoxStream},
    Stream, StreamExt,
};
use reqwest::header::{self, HeaderMap};

use crate::{
    executor::{RawBody, RawResponse},
    Chunk, ChunkStream, DecodedResponse, HttpError, Payload, RequestOptions, Result,
    StreamFraming,
};

/// Line that ends a line-delimited JSON stream.
pub const STREAM_SENTINEL: &[u8] = b"[DONE]";

/// Body interpretation chosen once from the declared media type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentKind {
    Json,
    Text,
    Binary,
    LineDelimitedJson,
}

impl ContentKind {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(Self::from_media_type)
            .unwrap_or(Self::Text)
    }

    /// Classifies a `Content-Type` value, ignoring parameters such as `charset`.
    pub fn from_media_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" => Self::Json,
            "application/x-ndjson"
            | "application/ndjson"
            | "application/jsonl"
            | "application/x-jsonlines"
            | "application/jsonlines" => Self::LineDelimitedJson,
            "application/octet-stream" | "application/zip" | "application/gzip"
            | "application/pdf" => Self::Binary,
            other if other.ends_with("+json") => Self::Json,
            other
                if other.starts_with("image/")
                    || other.starts_with("audio/")
                    || other.starts_with("video/") =>
            {
                Self::Binary
            }
            _ => Self::Text,
        }
    }
}

/// Turns a successful attempt into the caller-facing response.
pub(crate) fn decode_response(
    raw: RawResponse,
    options: &RequestOptions,
) -> Result<DecodedResponse> {
    let kind = ContentKind::from_headers(&raw.headers);

    #[cfg(feature = "tracing")]
    tracing::debug!(status = %raw.status, ?kind, stream = options.stream, "decoding response");

    let payload = match raw.body {
        RawBody::Buffered(body) => decode_buffered(body, kind)?,
        RawBody::Streaming(response) => {
            let body = response.bytes_stream();
            let lines = match options.framing {
                StreamFraming::LineDelimitedJson => true,
                StreamFraming::Bytes => false,
                StreamFraming::Auto => kind == ContentKind::LineDelimitedJson,
            };
            if lines {
                Payload::Stream(json_lines(body))
            } else {
                Payload::Stream(byte_blocks(body, options.chunk_size))
            }
        }
    };

    Ok(DecodedResponse {
        status: raw.status,
        headers: raw.headers,
        payload,
    })
}

pub(crate) fn decode_buffered(body: Bytes, kind: ContentKind) -> Result<Payload> {
    match kind {
        ContentKind::Json => {
            // An empty JSON response (e.g. 204) decodes to null.
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::Json(serde_json::Value::Null));
            }
            serde_json::from_slice(&body)
                .map(Payload::Json)
                .map_err(|err| HttpError::Decode(format!("invalid JSON body: {err}")))
        }
        ContentKind::LineDelimitedJson => {
            let mut values = Vec::new();
            for (index, raw) in body.split(|byte| *byte == b'\n').enumerate() {
                match decode_line(raw, index + 1) {
                    Ok(Line::Blank) => continue,
                    Ok(Line::Sentinel) => break,
                    Ok(Line::Value(value)) => values.push(value),
                    Err(err) => return Err(HttpError::Decode(err.to_string())),
                }
            }
            Ok(Payload::Json(serde_json::Value::Array(values)))
        }
        ContentKind::Text => Ok(Payload::Text(String::from_utf8_lossy(&body).into_owned())),
        ContentKind::Binary => Ok(Payload::Bytes(body)),
    }
}

enum Line {
    Blank,
    Sentinel,
    Value(serde_json::Value),
}

fn decode_line(raw: &[u8], line: usize) -> Result<Line> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Line::Blank);
    }
    if raw == STREAM_SENTINEL {
        return Ok(Line::Sentinel);
    }
    serde_json::from_slice(raw)
        .map(Line::Value)
        .map_err(|source| HttpError::StreamDecode { line, source })
}

struct BlockState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: BytesMut,
    size: usize,
    eof: bool,
    /// Body error held back until the partial block before it is yielded.
    failed: Option<reqwest::Error>,
}

/// Re-frames a body into blocks of exactly `size` bytes, except the last.
///
/// If the body fails mid-block, the bytes received so far are yielded as a
/// short block before the transport error.
pub(crate) fn byte_blocks<S>(body: S, size: usize) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = BlockState {
        body: body.boxed(),
        buf: BytesMut::new(),
        size: size.max(1),
        eof: false,
        failed: None,
    };

    ChunkStream::new(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(err) = st.failed.take() {
                return Some((Err(HttpError::Transport(err)), st));
            }
            if st.buf.len() >= st.size {
                let block = st.buf.split_to(st.size).freeze();
                return Some((Ok(Chunk::Bytes(block)), st));
            }
            if st.eof {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = st.buf.split().freeze();
                return Some((Ok(Chunk::Bytes(rest)), st));
            }
            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    st.eof = true;
                    if st.buf.is_empty() {
                        return Some((Err(HttpError::Transport(err)), st));
                    }
                    st.failed = Some(err);
                    let partial = st.buf.split().freeze();
                    return Some((Ok(Chunk::Bytes(partial)), st));
                }
                None => st.eof = true,
            }
        }
    }))
}

struct LineState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: BytesMut,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    line: usize,
    eof: bool,
    finished: bool,
}

/// Decodes one JSON value per non-blank line until `[DONE]` or end of body.
///
/// A malformed line is reported once and ends the stream; chunks already
/// yielded are unaffected.
pub(crate) fn json_lines<S>(body: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = LineState {
        body: body.boxed(),
        buf: BytesMut::new(),
        scanned: 0,
        line: 0,
        eof: false,
        finished: false,
    };

    ChunkStream::new(stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            let newline = st.buf[st.scanned..]
                .iter()
                .position(|byte| *byte == b'\n')
                .map(|offset| st.scanned + offset);

            let raw = if let Some(pos) = newline {
                let mut raw = st.buf.split_to(pos + 1);
                raw.truncate(pos);
                st.scanned = 0;
                raw
            } else if st.eof {
                // Unterminated final line.
                st.finished = true;
                if st.buf.is_empty() {
                    return None;
                }
                st.buf.split()
            } else {
                st.scanned = st.buf.len();
                match st.body.next().await {
                    Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                    Some(Err(err)) => {
                        st.finished = true;
                        return Some((Err(HttpError::Transport(err)), st));
                    }
                    None => st.eof = true,
                }
                continue;
            };

            st.line += 1;
            match decode_line(&raw, st.line) {
                Ok(Line::Blank) => continue,
                Ok(Line::Sentinel) => return None,
                Ok(Line::Value(value)) => return Some((Ok(Chunk::Json(value)), st)),
                Err(err) => {
                    st.finished = true;
                    return Some((Err(err), st));
                }
            }
        }
    }))
}
