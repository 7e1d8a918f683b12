//! HTTP transport infrastructure.
//!
//! Provides a trait-based abstraction for a single upstream request/response
//! exchange, so the fetch strategies can be driven by a scripted transport
//! in tests and by `reqwest` in production.

use super::decompressor::decompress_body;
use crate::proxy::guard::is_internal_host;
use reqwest::cookie::Jar;
use std::collections::HashMap;
use std::error::Error as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// One upstream GET exchange.
#[derive(Clone)]
pub struct TransportRequest {
    pub url: String,
    /// Ordered header list, sent as-is.
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    pub referer: Option<String>,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// When false, no `Accept-Encoding` is negotiated and the client does
    /// not decode the body.
    pub decompress: bool,
    pub verify_ssl: bool,
    /// When false, redirect hops onto loopback or private hosts are refused.
    pub allow_internal_targets: bool,
    pub cookie_jar: Option<Arc<Jar>>,
}

impl TransportRequest {
    /// Headers as they go on the wire, for diagnostics.
    pub fn header_trace(&self) -> HashMap<String, String> {
        let mut trace: HashMap<String, String> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        trace.insert("user-agent".to_string(), self.user_agent.clone());
        if let Some(referer) = &self.referer {
            trace.insert("referer".to_string(), referer.clone());
        }
        trace
    }
}

/// Response of a completed exchange, after redirects.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub final_url: String,
    pub headers: HashMap<String, String>,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Redirect,
    Decode,
    Other,
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// True when the failure came from a body whose content coding could not
    /// be handled.
    pub fn is_content_encoding(&self) -> bool {
        self.kind == TransportErrorKind::Decode
            || self.message.to_ascii_lowercase().contains("content encoding")
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        if err.is_decode() {
            return Self::new(
                TransportErrorKind::Decode,
                format!("content encoding error: {}", message),
            );
        }

        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_redirect() {
            TransportErrorKind::Redirect
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, message)
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Trait for the upstream HTTP client primitive.
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// `reqwest`-backed transport.
///
/// A client is built per exchange: redirect policy, decompression and the
/// cookie jar are client-level settings in `reqwest`.
#[derive(Default, Clone)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
        Box::pin(async move { send(request).await })
    }
}

fn redirect_policy(max_redirects: usize, allow_internal: bool) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error("too many redirects")
        } else if !allow_internal && attempt.url().host().is_some_and(|h| is_internal_host(&h)) {
            attempt.error("redirect to internal address refused")
        } else {
            attempt.follow()
        }
    })
}

async fn send(request: TransportRequest) -> Result<TransportResponse, TransportError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(request.user_agent.as_str())
        .timeout(request.timeout)
        .redirect(redirect_policy(request.max_redirects, request.allow_internal_targets))
        .gzip(request.decompress)
        .brotli(request.decompress)
        .deflate(request.decompress)
        .danger_accept_invalid_certs(!request.verify_ssl);

    if let Some(jar) = &request.cookie_jar {
        builder = builder.cookie_provider(Arc::clone(jar));
    }

    let client = builder.build()?;

    let mut req = client.get(&request.url);
    for (name, value) in &request.headers {
        req = req.header(name.as_str(), value.as_str());
    }
    if let Some(referer) = &request.referer {
        req = req.header(reqwest::header::REFERER, referer.as_str());
    }

    let response = req.send().await?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let content_type = headers.get("content-type").cloned().unwrap_or_default();

    let raw = response.bytes().await?.to_vec();

    // Origins sometimes encode the body even without Accept-Encoding.
    let body = if request.decompress {
        raw
    } else {
        let encoding = headers.get("content-encoding").map(|s| s.trim());
        match decompress_body(&raw, encoding) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "Keeping undecoded body");
                raw
            }
        }
    };

    Ok(TransportResponse {
        status,
        final_url,
        headers,
        content_type,
        body,
    })
}
