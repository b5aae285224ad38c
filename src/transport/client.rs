//! reqwest-backed transport

use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Body, Client};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::http_logger;

use super::{
    HttpRequest, HttpResponse, HttpTransport, RequestBody, TransportError, TransportErrorKind,
};

/// Production transport built on a shared reqwest client
pub struct ReqwestTransport {
    client: Client,
    bearer_token: Option<String>,
    log_path: PathBuf,
}

impl ReqwestTransport {
    /// Build a client from configuration, authenticating with a bearer token if given.
    ///
    /// No total request timeout is set: a large body may legitimately stream
    /// for longer than any fixed bound, so only stalls are timed out.
    pub fn new(config: &Config, bearer_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
            log_path: config.http_log_path.clone(),
        })
    }

    /// Wrap a client that already carries its own authentication
    pub fn with_client(config: &Config, client: Client) -> Self {
        Self {
            client,
            bearer_token: None,
            log_path: config.http_log_path.clone(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let start_time = Instant::now();
        let request_log =
            http_logger::build_request_log_if_enabled(&request, self.bearer_token.is_some());

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let result = builder.body(into_body(request.body)).send().await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                let err = classify_reqwest_error(&e);
                if let Some(ref req_log) = request_log {
                    let duration_ms = start_time.elapsed().as_millis() as u64;
                    http_logger::log_request(
                        &self.log_path,
                        req_log,
                        None,
                        duration_ms,
                        Some(&err.to_string()),
                    );
                }
                return Err(err);
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?
            .to_vec();

        if let Some(ref req_log) = request_log {
            let duration_ms = start_time.elapsed().as_millis() as u64;
            let response_log = http_logger::build_response_log(status, &headers, &body);
            http_logger::log_request(&self.log_path, req_log, Some(&response_log), duration_ms, None);
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Stream a request body without buffering it
fn into_body(body: RequestBody) -> Body {
    match body {
        RequestBody::Empty => Body::from(Vec::new()),
        RequestBody::Stream { source, len } => Body::wrap_stream(ReaderStream::new(source.take(len))),
    }
}

/// Map a reqwest error onto the transport taxonomy
pub(crate) fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    let message = error_chain(err);
    let lower = message.to_lowercase();

    let kind = if err.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if err.is_builder() && lower.contains("scheme") {
        TransportErrorKind::UnsupportedScheme
    } else if is_unknown_authority(&lower) {
        TransportErrorKind::UnknownAuthority
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, message)
}

/// Flatten an error and its sources into one line
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// TLS verification failures caused by an untrusted issuer
fn is_unknown_authority(lower_message: &str) -> bool {
    [
        "unknownissuer",
        "unknown issuer",
        "certificate signed by unknown authority",
        "self signed certificate",
        "self-signed certificate",
        "unable to get local issuer certificate",
    ]
    .iter()
    .any(|pattern| lower_message.contains(pattern))
}
