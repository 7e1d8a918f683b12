//! Fetch strategy engine.
//!
//! Runs the ordered retrieval attempts for one request:
//!
//! 1. dedicated site handler, when the policy names one (falls back to 2 on
//!    transport failure)
//! 2. standard fetch, with a single no-decompression retry when the body's
//!    content coding breaks the client
//! 3. WAF evaluation of the standard result
//! 4. one bypass escalation on a positive signal, adopted only if it
//!    succeeds outright
//!
//! Attempts run strictly in sequence, each under its own deadline.

use super::fingerprint;
use super::handlers::run_handler;
use super::types::{AttemptRecord, AttemptTrace, FetchAttemptResult, FetchRequest, Strategy};
use super::waf;
use crate::config::{Config, PacingConfig};
use crate::error::ProxyError;
use crate::infra::{HttpTransport, TransportError, TransportRequest};
use crate::shared::elapsed_ms;
use reqwest::cookie::Jar;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide engine settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub user_agent: String,
    pub verify_ssl: bool,
    pub allow_internal_targets: bool,
    pub pacing: PacingConfig,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.fetch.user_agent.clone(),
            verify_ssl: config.fetch.verify_ssl,
            allow_internal_targets: config.allow_internal_targets,
            pacing: config.pacing.clone(),
        }
    }
}

/// The canonical response (or the transport failure that exhausted every
/// strategy) plus the record of what was tried.
pub type FetchOutcome = (Result<FetchAttemptResult, ProxyError>, AttemptTrace);

pub struct FetchEngine {
    transport: Arc<dyn HttpTransport>,
    settings: EngineSettings,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: EngineSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Retrieves `request.url` through the ordered strategies.
    ///
    /// # Arguments
    ///
    /// * `request` - The validated target with its policy-resolved timeout,
    ///   redirect budget, profile flag and optional site handler
    ///
    /// # Returns
    ///
    /// The canonical response, or the transport failure that ended the
    /// attempts, together with the trace of every attempt made.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let mut trace = AttemptTrace::default();

        if let Some(handler) = &request.handler {
            trace.handler = Some(handler.name());
            if let Some(result) = run_handler(self, handler, request, &mut trace).await {
                // Handlers already carry their own anti-bot tactics.
                trace.strategy_used = Some(Strategy::SiteHandler);
                return (Ok(result), trace);
            }
            tracing::info!(
                handler = handler.name(),
                url = %request.url,
                "Site handler produced no result, falling back to standard fetch"
            );
        }

        let standard = self.standard_request(request).await;
        let original = match self.attempt(Strategy::Standard, standard, &mut trace).await {
            Ok(result) => result,
            Err(err) if err.is_content_encoding() => {
                let outcome = self.retry_without_encoding(request, &mut trace).await;
                return (outcome, trace);
            }
            Err(err) => {
                return (
                    Err(ProxyError::TransportFailure(err.to_string())),
                    trace,
                );
            }
        };

        let Some(signal) = waf::detect(original.status, &original.body) else {
            trace.strategy_used = Some(Strategy::Standard);
            return (Ok(original), trace);
        };

        tracing::warn!(url = %request.url, signal = %signal, "WAF challenge detected, escalating");
        trace.waf_signal = Some(signal.to_string());

        let result = self.escalate(request, original, &mut trace).await;
        (Ok(result), trace)
    }

    /// One extra attempt with a fuller browser fingerprint. The original
    /// result is kept unless this one is a 2xx.
    async fn escalate(
        &self,
        request: &FetchRequest,
        original: FetchAttemptResult,
        trace: &mut AttemptTrace,
    ) -> FetchAttemptResult {
        let bypass = self
            .browser_request(request, request.timeout.saturating_mul(2))
            .await;

        match self.attempt(Strategy::WafBypass, bypass, trace).await {
            Ok(result) if result.succeeded() => {
                tracing::info!(url = %request.url, status = result.status, "WAF bypass succeeded");
                trace.bypass_result = Some(format!("Success: got status code {}", result.status));
                trace.strategy_used = Some(Strategy::WafBypass);
                result
            }
            Ok(result) => {
                tracing::info!(
                    url = %request.url,
                    status = result.status,
                    original = original.status,
                    "WAF bypass did not succeed, keeping original response"
                );
                trace.bypass_result = Some(format!(
                    "Not adopted: got status code {}, keeping original {}",
                    result.status, original.status
                ));
                trace.strategy_used = Some(Strategy::Standard);
                original
            }
            Err(err) => {
                tracing::info!(url = %request.url, error = %err, "WAF bypass failed, keeping original response");
                trace.bypass_result = Some(format!("Failed: {}", err));
                trace.strategy_used = Some(Strategy::Standard);
                original
            }
        }
    }

    /// Baseline headers, unless the site is flagged as challenging; those get
    /// the browser profile from the first request on.
    async fn standard_request(&self, request: &FetchRequest) -> TransportRequest {
        if request.challenging_profile {
            return self.browser_request(request, request.timeout).await;
        }
        self.transport_request(
            request.url.as_str(),
            fingerprint::baseline_headers(),
            request.timeout,
            request.max_redirects,
        )
    }

    /// Full browser profile: client hints, search-engine referer and a fresh
    /// cookie jar, sent after a pacing delay.
    async fn browser_request(&self, request: &FetchRequest, timeout: Duration) -> TransportRequest {
        self.pace(&self.settings.pacing.bypass_delay_ms).await;

        let mut browser = self.transport_request(
            request.url.as_str(),
            fingerprint::bypass_headers(),
            timeout,
            request.max_redirects,
        );
        browser.referer = Some(fingerprint::search_referer(
            request.url.host_str().unwrap_or_default(),
        ));
        browser.cookie_jar = Some(Arc::new(Jar::default()));
        browser
    }

    /// Terminal: whatever this retry yields is the outcome.
    async fn retry_without_encoding(
        &self,
        request: &FetchRequest,
        trace: &mut AttemptTrace,
    ) -> Result<FetchAttemptResult, ProxyError> {
        tracing::info!(url = %request.url, "Retrying without content encoding handling");

        let mut retry = self.transport_request(
            request.url.as_str(),
            fingerprint::baseline_headers(),
            request.timeout,
            request.max_redirects,
        );
        retry.decompress = false;

        let result = self
            .attempt(Strategy::EncodingRetry, retry, trace)
            .await
            .map_err(|err| ProxyError::TransportFailure(format!("Retry failed: {}", err)))?;
        trace.strategy_used = Some(Strategy::EncodingRetry);
        Ok(result)
    }

    pub(super) fn transport_request(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        timeout: Duration,
        max_redirects: usize,
    ) -> TransportRequest {
        TransportRequest {
            url: url.to_string(),
            headers,
            user_agent: self.settings.user_agent.clone(),
            referer: None,
            timeout,
            max_redirects,
            decompress: true,
            verify_ssl: self.settings.verify_ssl,
            allow_internal_targets: self.settings.allow_internal_targets,
            cookie_jar: None,
        }
    }

    /// Runs one exchange and records it in the trace.
    pub(super) async fn attempt(
        &self,
        strategy: Strategy,
        request: TransportRequest,
        trace: &mut AttemptTrace,
    ) -> Result<FetchAttemptResult, TransportError> {
        let mut record = AttemptRecord {
            strategy,
            url: request.url.clone(),
            elapsed_ms: 0,
            status: None,
            content_type: None,
            final_url: None,
            request_headers: request.header_trace(),
            response_headers: HashMap::new(),
            error: None,
        };

        let started = Instant::now();
        let outcome = self.transport.execute(request).await;
        record.elapsed_ms = elapsed_ms(started, Instant::now());

        match outcome {
            Ok(response) => {
                tracing::debug!(
                    strategy = ?strategy,
                    url = %record.url,
                    status = response.status,
                    elapsed_ms = record.elapsed_ms,
                    "Attempt completed"
                );
                record.status = Some(response.status);
                record.content_type = Some(response.content_type.clone());
                record.final_url = Some(response.final_url.clone());
                record.response_headers = response.headers.clone();
                trace.attempts.push(record.clone());
                Ok(FetchAttemptResult::from_transport(response, record))
            }
            Err(err) => {
                tracing::debug!(
                    strategy = ?strategy,
                    url = %record.url,
                    error = %err,
                    elapsed_ms = record.elapsed_ms,
                    "Attempt failed"
                );
                record.error = Some(err.to_string());
                trace.attempts.push(record);
                Err(err)
            }
        }
    }

    /// Human-pacing sleep drawn from `range` (milliseconds).
    pub(super) async fn pace(&self, range: &RangeInclusive<u64>) {
        if range.is_empty() {
            return;
        }
        let ms = fastrand::u64(range.clone());
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}
