use bytes::Bytes;
use reqwest::{header::HeaderMap, Proxy, StatusCode};

use crate::{retry::AttemptOutcome, HttpError, RequestOptions, RequestSpec, Result};

/// Successful attempt, before decoding.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RawBody,
}

#[derive(Debug)]
pub(crate) enum RawBody {
    Buffered(Bytes),
    /// Live response whose body has not been read yet.
    Streaming(reqwest::Response),
}

/// Sends one logical request's attempts over a single session.
///
/// Holds no retry state; every call to [`RequestExecutor::attempt`] is
/// independent apart from connection reuse.
pub(crate) struct RequestExecutor<'a> {
    session: reqwest::Client,
    spec: &'a RequestSpec,
    options: &'a RequestOptions,
}

impl<'a> RequestExecutor<'a> {
    /// Opens the session this request's attempts share.
    pub(crate) fn open(spec: &'a RequestSpec, options: &'a RequestOptions) -> Result<Self> {
        Ok(Self {
            session: build_session(options)?,
            spec,
            options,
        })
    }

    pub(crate) async fn attempt(
        &self,
        attempt: usize,
    ) -> AttemptOutcome<RawResponse, reqwest::Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt = attempt + 1,
            method = %self.spec.method(),
            url = %self.spec.url(),
            "sending request"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = attempt;

        let response = match self
            .spec
            .to_request(&self.session, self.options.timeout())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::TransportFailure(err),
        };

        let status = response.status();
        if self.options.raise_on_status && is_error_status(status) {
            let cause = match response.text().await {
                Ok(body) => body,
                Err(err) => format!("<unreadable body: {err}>"),
            };
            return AttemptOutcome::StatusFailure { status, cause };
        }

        let headers = response.headers().clone();
        if self.options.stream {
            return AttemptOutcome::Success(RawResponse {
                status,
                headers,
                body: RawBody::Streaming(response),
            });
        }

        match response.bytes().await {
            Ok(body) => AttemptOutcome::Success(RawResponse {
                status,
                headers,
                body: RawBody::Buffered(body),
            }),
            Err(err) => AttemptOutcome::TransportFailure(err),
        }
    }
}

fn build_session(options: &RequestOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!options.verify_tls);

    builder = match options.proxy.as_deref() {
        Some(url) => {
            let proxy = Proxy::all(url)
                .map_err(|err| HttpError::Config(format!("invalid proxy '{url}': {err}")))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|err| HttpError::Config(format!("could not create http session: {err}")))
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}
