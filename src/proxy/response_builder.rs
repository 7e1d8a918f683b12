//! Response formatting for proxied content and errors.
//!
//! Three wire formats share one envelope shape:
//! - `raw`: origin bytes under the origin content type
//! - `json`: `{"status":{..},"contents":..,"debug":..}`
//! - `jsonp`: the same envelope wrapped in a sanitized callback call
//!
//! Raw output switches to the JSON envelope whenever diagnostics are
//! requested, as raw bytes have nowhere to carry them.

use super::types::{Diagnostics, OutputFormat, ProxyParams};
use crate::error::ProxyError;
use crate::infra::charset::{self, DEFAULT_CHARSET};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

const JSON_CONTENT_TYPE: &str = "application/json";
const JSONP_CONTENT_TYPE: &str = "application/javascript";
const DEFAULT_CALLBACK: &str = "callback";

/// Field order here is the wire order.
#[derive(Serialize)]
struct Envelope<'a> {
    status: EnvelopeStatus<'a>,
    contents: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<&'a Diagnostics>,
}

#[derive(Serialize)]
struct EnvelopeStatus<'a> {
    http_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Status, content type and body bytes, ready for the wire.
#[derive(Debug, Clone)]
pub struct RenderedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        (status, [(header::CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// Rendering options of one request.
#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    format: OutputFormat,
    callback: String,
    charset_override: Option<String>,
    debug: bool,
}

impl ResponseFormatter {
    pub fn new(
        format: OutputFormat,
        callback: impl Into<String>,
        charset_override: Option<String>,
        debug: bool,
    ) -> Self {
        Self {
            format,
            callback: callback.into(),
            charset_override,
            debug,
        }
    }

    pub fn from_params(params: &ProxyParams) -> Self {
        Self::new(
            params.output_format(),
            params.callback(),
            params.charset_override().map(str::to_string),
            params.debug_enabled(),
        )
    }

    /// Renders a fetched (or cached) response.
    ///
    /// # Arguments
    ///
    /// * `status` - Origin status, passed through unchanged
    /// * `body` - Origin body bytes
    /// * `content_type` - Origin content type, possibly with a `charset=`
    /// * `diagnostics` - Pipeline diagnostics; emitted only when debug is on
    ///
    /// Charset conversion failures never fail the response: the original
    /// bytes are emitted and the failure is noted in the diagnostics.
    pub fn render(
        &self,
        status: u16,
        body: Vec<u8>,
        content_type: &str,
        mut diagnostics: Diagnostics,
    ) -> RenderedResponse {
        let source = charset::extract_charset(content_type);
        let requested = self
            .charset_override
            .clone()
            .or_else(|| source.clone())
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string());

        // Only bodies that declare a charset are converted.
        let (body, body_charset, converted) = match &source {
            Some(from) if !charset::same_charset(from, &requested) => {
                match charset::transcode(&body, from, &requested) {
                    Ok(bytes) => (bytes, requested, true),
                    Err(err) => {
                        tracing::warn!(
                            from = %from,
                            to = %requested,
                            error = %err,
                            "Charset conversion failed, emitting original bytes"
                        );
                        diagnostics.transcode = Some(err.to_string());
                        (body, from.clone(), false)
                    }
                }
            }
            _ => (body, requested, false),
        };

        if self.format == OutputFormat::Raw && !self.debug {
            let content_type = if converted {
                charset::with_charset(content_type, &body_charset)
            } else {
                content_type.to_string()
            };
            return RenderedResponse {
                status,
                content_type,
                body,
            };
        }

        let contents = charset::decode_text(&body, &body_charset);
        let envelope = Envelope {
            status: EnvelopeStatus {
                http_code: status,
                content_type: Some(content_type),
                message: None,
            },
            contents: Some(&contents),
            debug: self.debug.then_some(&diagnostics),
        };
        self.emit(status, &envelope, &body_charset)
    }

    /// Renders a request-ending error. Diagnostics are attached only when
    /// debug is on, and then force the JSON envelope even for `raw`.
    pub fn render_error(
        &self,
        err: &ProxyError,
        diagnostics: Option<&Diagnostics>,
    ) -> RenderedResponse {
        let status = err.status_code().as_u16();
        let message = err.to_string();
        let debug = diagnostics.filter(|_| self.debug);

        if self.format == OutputFormat::Raw && debug.is_none() {
            return RenderedResponse {
                status,
                content_type: format!("text/plain; charset={}", DEFAULT_CHARSET),
                body: message.into_bytes(),
            };
        }

        let envelope = Envelope {
            status: EnvelopeStatus {
                http_code: status,
                content_type: None,
                message: Some(&message),
            },
            contents: None,
            debug,
        };
        self.emit(status, &envelope, DEFAULT_CHARSET)
    }

    fn emit(&self, status: u16, envelope: &Envelope<'_>, body_charset: &str) -> RenderedResponse {
        let output_charset = if charset::is_output_charset(body_charset) {
            body_charset
        } else {
            DEFAULT_CHARSET
        };

        let json = serde_json::to_string(envelope).unwrap_or_else(|err| {
            tracing::error!(error = %err, "Failed to serialize response envelope");
            format!(
                r#"{{"status":{{"http_code":{},"message":"response serialization failed"}},"contents":null}}"#,
                status
            )
        });

        let (mime, text) = match self.format {
            OutputFormat::Jsonp => (
                JSONP_CONTENT_TYPE,
                format!("{}({});", sanitize_callback(&self.callback), json),
            ),
            OutputFormat::Json | OutputFormat::Raw => (JSON_CONTENT_TYPE, json),
        };

        RenderedResponse {
            status: envelope_wire_status(status),
            content_type: format!("{}; charset={}", mime, output_charset),
            body: charset::encode_text(&text, output_charset),
        }
    }
}

/// An envelope always has a body, so origin statuses that forbid one are
/// reported inside it (`http_code`) and sent as 200.
fn envelope_wire_status(status: u16) -> u16 {
    match status {
        100..=199 | 204 | 304 => 200,
        other => other,
    }
}

/// Keeps `[A-Za-z0-9_]` only. An empty result becomes `callback`.
pub fn sanitize_callback(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() {
        DEFAULT_CALLBACK.to_string()
    } else {
        cleaned
    }
}
