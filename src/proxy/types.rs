use crate::config::FetchConfig;
use crate::infra::TransportResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Incoming proxy request parameters (query string).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyParams {
    pub url: Option<String>,
    pub format: Option<String>,
    pub callback: Option<String>,
    pub charset: Option<String>,
    pub debug: Option<String>,
}

impl ProxyParams {
    pub fn output_format(&self) -> OutputFormat {
        self.format
            .as_deref()
            .map(OutputFormat::parse)
            .unwrap_or_default()
    }

    /// JSONP callback name as supplied; sanitized only at emission.
    pub fn callback(&self) -> &str {
        self.callback.as_deref().unwrap_or("callback")
    }

    pub fn charset_override(&self) -> Option<&str> {
        self.charset
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
            .as_deref()
            .and_then(crate::config::parse_flag)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Raw,
    Json,
    Jsonp,
}

impl OutputFormat {
    /// Unknown values fall back to raw.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonp" => OutputFormat::Jsonp,
            _ => OutputFormat::Raw,
        }
    }
}

/// Named per-site retrieval strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteHandler {
    /// Visit a landing page first to pick up session cookies, then fetch
    /// the target with that page as referer.
    SessionWarmup { landing_page: &'static str },
}

impl SiteHandler {
    pub fn name(&self) -> &'static str {
        match self {
            SiteHandler::SessionWarmup { .. } => "session-warmup",
        }
    }
}

/// Retrieval hints for URLs containing `match_token`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SitePolicy {
    /// Empty for the default policy.
    pub match_token: &'static str,
    pub timeout_override: Option<Duration>,
    pub redirect_override: Option<usize>,
    pub dedicated_handler: Option<SiteHandler>,
    pub skip_cache: bool,
    /// Standard attempt goes out with the full browser fingerprint: client
    /// hints, search referer, fresh cookie jar and a pacing delay.
    pub challenging_profile: bool,
}

impl SitePolicy {
    pub fn is_default(&self) -> bool {
        self.match_token.is_empty()
    }
}

/// Per-request fetch parameters, derived once and never mutated.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub force_fresh_fetch: bool,
    pub challenging_profile: bool,
    pub handler: Option<SiteHandler>,
}

impl FetchRequest {
    pub fn new(url: Url, policy: &SitePolicy, defaults: &FetchConfig) -> Self {
        Self {
            url,
            timeout: policy.timeout_override.unwrap_or(defaults.timeout),
            max_redirects: policy.redirect_override.unwrap_or(defaults.max_redirects),
            force_fresh_fetch: policy.skip_cache,
            challenging_profile: policy.challenging_profile,
            handler: policy.dedicated_handler.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Standard,
    HandlerWarmup,
    SiteHandler,
    WafBypass,
    EncodingRetry,
}

/// What one attempt did, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    pub url: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub request_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub response_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A response produced by one attempt. The one the engine settles on is the
/// canonical response.
#[derive(Debug, Clone)]
pub struct FetchAttemptResult {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
    pub diagnostics: AttemptRecord,
}

impl FetchAttemptResult {
    pub fn from_transport(response: TransportResponse, diagnostics: AttemptRecord) -> Self {
        Self {
            status: response.status,
            body: response.body,
            content_type: response.content_type,
            diagnostics,
        }
    }

    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Everything the strategy engine tried for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttemptTrace {
    pub attempts: Vec<AttemptRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waf_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<Strategy>,
}

impl AttemptTrace {
    pub fn count(&self, strategy: Strategy) -> usize {
        self.attempts.iter().filter(|a| a.strategy == strategy).count()
    }
}

/// Stage timings in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingInfo {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_lookup: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheStatus {
    #[default]
    Disabled,
    /// Skipped because the site policy forces a fresh fetch.
    Bypassed,
    Miss,
    Stale {
        age_secs: u64,
    },
    Hit {
        age_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub verify_ssl: bool,
}

/// Pipeline diagnostics. Always built; rendered only on request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<EffectiveConfig>,
    pub cache: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_diagnostics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<AttemptTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode: Option<String>,
    pub timing: TimingInfo,
}
