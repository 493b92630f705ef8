use std::time::Duration;

use crate::{HttpError, Result};

/// Selects how a streamed body is split into chunks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StreamFraming {
    /// Line-delimited JSON when the response declares an NDJSON media type,
    /// fixed-size byte blocks otherwise.
    #[default]
    Auto,
    /// Always fixed-size byte blocks.
    Bytes,
    /// Always line-delimited JSON terminated by `[DONE]`.
    LineDelimitedJson,
}

/// Configures retry, TLS, proxy and response handling for a logical request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestOptions {
    /// Attempt budget. `0` still makes one attempt.
    pub max_retries: usize,
    /// Verify the server's TLS certificate.
    pub verify_tls: bool,
    /// Turn 4xx/5xx responses into [`HttpError::Status`].
    pub raise_on_status: bool,
    /// Proxy URL applied to every scheme. No environment proxy is used when unset.
    pub proxy: Option<String>,
    /// Return a lazily-read chunk stream instead of a buffered body.
    pub stream: bool,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Time unit of the `2^attempt` backoff, in milliseconds.
    pub backoff_unit_ms: u64,
    /// Also retry 408, 429, 500, 502, 503 and 504 responses.
    pub retry_on_status: bool,
    /// Chunk framing used in streaming mode.
    pub framing: StreamFraming,
    /// Block size for byte framing.
    pub chunk_size: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            verify_tls: true,
            raise_on_status: true,
            proxy: None,
            stream: false,
            timeout_ms: 300_000,
            backoff_unit_ms: 1_000,
            retry_on_status: false,
            framing: StreamFraming::Auto,
            chunk_size: 1024,
        }
    }
}

impl RequestOptions {
    /// Loads options from the environment, keeping defaults for unset variables.
    ///
    /// Reads:
    /// - `RESILIENT_HTTP_MAX_RETRIES`
    /// - `RESILIENT_HTTP_VERIFY_TLS`
    /// - `RESILIENT_HTTP_RAISE_ON_STATUS`
    /// - `RESILIENT_HTTP_PROXY`
    /// - `RESILIENT_HTTP_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_BACKOFF_UNIT_MS`
    ///
    /// Returns an error if a variable is set but empty or unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_MAX_RETRIES")? {
            opts.max_retries = parse_number("RESILIENT_HTTP_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_VERIFY_TLS")? {
            opts.verify_tls = parse_flag("RESILIENT_HTTP_VERIFY_TLS", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_RAISE_ON_STATUS")? {
            opts.raise_on_status = parse_flag("RESILIENT_HTTP_RAISE_ON_STATUS", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_PROXY")? {
            opts.proxy = Some(value);
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_TIMEOUT_MS")? {
            opts.timeout_ms = parse_number("RESILIENT_HTTP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_BACKOFF_UNIT_MS")? {
            opts.backoff_unit_ms = parse_number("RESILIENT_HTTP_BACKOFF_UNIT_MS", &value)?;
        }
        Ok(opts)
    }

    /// Number of attempts a logical request may make.
    pub fn attempt_budget(&self) -> usize {
        self.max_retries.max(1)
    }

    /// Delay slept after the failed attempt with the given zero-based index.
    ///
    /// `backoff_unit_ms * 2^attempt`, with the exponent capped at 16.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let exp = attempt.min(16) as u32;
        let multiplier = 1u64 << exp;
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(multiplier))
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn read_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<String>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => {
            Err(HttpError::Config(format!("{key} is set but empty")))
        }
        Some(value) => Ok(Some(value.trim().to_owned())),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|err| HttpError::Config(format!("invalid {key} '{value}': {err}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HttpError::Config(format!(
            "invalid {key} '{value}': expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use crate::{HttpError, RequestOptions, StreamFraming};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let opts = RequestOptions::default();
        assert_eq!(opts.max_retries, 3);
        assert!(opts.verify_tls);
        assert!(opts.raise_on_status);
        assert!(opts.proxy.is_none());
        assert!(!opts.stream);
        assert!(!opts.retry_on_status);
        assert_eq!(opts.framing, StreamFraming::Auto);
        assert_eq!(opts.chunk_size, 1024);
    }

    #[test]
    fn attempt_budget_is_at_least_one() {
        let mut opts = RequestOptions::default();
        opts.max_retries = 0;
        assert_eq!(opts.attempt_budget(), 1);
        opts.max_retries = 1;
        assert_eq!(opts.attempt_budget(), 1);
        opts.max_retries = 5;
        assert_eq!(opts.attempt_budget(), 5);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let opts = RequestOptions::default();
        assert_eq!(opts.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(opts.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(opts.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(opts.backoff_delay(40), opts.backoff_delay(16));
    }

    #[test]
    fn backoff_saturates() {
        let opts = RequestOptions {
            backoff_unit_ms: u64::MAX,
            ..RequestOptions::default()
        };
        assert_eq!(opts.backoff_delay(3), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn from_lookup_overrides_defaults() {
        let opts = RequestOptions::from_lookup(lookup(&[
            ("RESILIENT_HTTP_MAX_RETRIES", "5"),
            ("RESILIENT_HTTP_VERIFY_TLS", "off"),
            ("RESILIENT_HTTP_RAISE_ON_STATUS", "false"),
            ("RESILIENT_HTTP_PROXY", "http://127.0.0.1:3128"),
            ("RESILIENT_HTTP_TIMEOUT_MS", "2500"),
            ("RESILIENT_HTTP_BACKOFF_UNIT_MS", "10"),
        ]))
        .expect("must parse");

        assert_eq!(opts.max_retries, 5);
        assert!(!opts.verify_tls);
        assert!(!opts.raise_on_status);
        assert_eq!(opts.proxy.as_deref(), Some("http://127.0.0.1:3128"));
        assert_eq!(opts.timeout_ms, 2500);
        assert_eq!(opts.backoff_unit_ms, 10);
    }

    #[test]
    fn from_lookup_rejects_empty_and_invalid_values() {
        let err = RequestOptions::from_lookup(lookup(&[("RESILIENT_HTTP_PROXY", "  ")]))
            .expect_err("must fail");
        assert!(matches!(err, HttpError::Config(_)));

        let err = RequestOptions::from_lookup(lookup(&[("RESILIENT_HTTP_MAX_RETRIES", "many")]))
            .expect_err("must fail");
        assert!(matches!(err, HttpError::Config(_)));

        let err = RequestOptions::from_lookup(lookup(&[("RESILIENT_HTTP_VERIFY_TLS", "maybe")]))
            .expect_err("must fail");
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn from_lookup_without_variables_is_default() {
        let opts = RequestOptions::from_lookup(|_| None).expect("must parse");
        assert_eq!(opts, RequestOptions::default());
    }
}
