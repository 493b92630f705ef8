/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request could not be built (bad method, URL, header or body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Invalid options or a session that could not be created from them.
    #[error("configuration error: {0}")]
    Config(String),
    /// Network error from `reqwest` that was not retried, such as a body
    /// read failure in the middle of a stream.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Error status code with the raw response body. Never retried unless
    /// status retries were explicitly enabled.
    #[error("http error {status}: {body}")]
    Status { status: u16, body: String },
    /// Every attempt failed at the transport level.
    #[error("max retries reached after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Number of attempts that were made.
        attempts: usize,
        /// Cause of the final attempt's failure.
        last: reqwest::Error,
    },
    /// Malformed line in a line-delimited JSON stream.
    #[error("stream decode error at line {line}: {source}")]
    StreamDecode {
        /// One-based line number within the response body.
        line: usize,
        source: serde_json::Error,
    },
    /// Buffered response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl HttpError {
    /// Returns `true` for [`HttpError::Status`].
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status { .. })
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::HttpError;

    #[test]
    fn status_helpers() {
        let err = HttpError::Status {
            status: 404,
            body: "missing".to_owned(),
        };
        assert!(err.is_status());
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "http error 404: missing");

        let err = HttpError::Decode("nope".to_owned());
        assert!(!err.is_status());
        assert_eq!(err.status(), None);
    }
}
