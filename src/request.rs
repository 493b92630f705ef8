use std::{fmt, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use serde::Serialize;

use crate::{HttpError, Result};

/// One logical request: what to send, identical on every attempt.
///
/// Transport settings (TLS verification, proxy, retry budget) live in
/// [`RequestOptions`](crate::RequestOptions).
#[derive(Clone)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    timeout: Option<Duration>,
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &redacted_headers(&self.headers))
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RequestSpec {
    /// Creates a request from a verb and a URL.
    ///
    /// The verb is upper-cased, so `"get"` and `"GET"` are equivalent.
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| HttpError::InvalidRequest(format!("invalid method '{method}'")))?;
        let url = Url::parse(url.trim())
            .map_err(|err| HttpError::InvalidRequest(format!("invalid url '{url}': {err}")))?;

        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new("GET", url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new("POST", url)
    }

    /// Adds a header, replacing any previous value with the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            HttpError::InvalidRequest(format!("invalid header name '{name}': {err}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            HttpError::InvalidRequest(format!("invalid value for header '{name}': {err}"))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a raw request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON request body.
    ///
    /// Serialization happens once; every attempt resends the same bytes.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value).map_err(|err| {
            HttpError::InvalidRequest(format!("unserializable json body: {err}"))
        })?;
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(Bytes::from(encoded));
        Ok(self)
    }

    /// Overrides the per-attempt timeout from the options.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Builds a fresh `reqwest` request for one attempt.
    pub(crate) fn to_request(
        &self,
        session: &reqwest::Client,
        default_timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let mut builder = session
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone())
            .timeout(self.timeout.unwrap_or(default_timeout));
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            // Bytes clones share the buffer.
            builder = builder.body(body.clone());
        }
        builder
    }
}

/// Header pairs with credential values hidden.
fn redacted_headers(headers: &HeaderMap) -> Vec<(&str, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == header::AUTHORIZATION || *name == header::PROXY_AUTHORIZATION {
                "<redacted>".to_owned()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str(), shown)
        })
        .collect()
}
