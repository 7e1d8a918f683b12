//! Proxy service abstraction layer.
//!
//! `ProxyService` is the seam between the HTTP route and the pipeline, so
//! routes can be tested against a mock. `HttpProxyService` runs the real
//! pipeline:
//!
//! guard → site policy → cache lookup → fetch strategies → cache write → render

use super::executor::{EngineSettings, FetchEngine};
use super::guard::SsrfGuard;
use super::policy::PolicyRegistry;
use super::response_builder::{RenderedResponse, ResponseFormatter};
use super::types::{CacheStatus, Diagnostics, EffectiveConfig, FetchRequest, ProxyParams};
use crate::config::{Config, FetchConfig};
use crate::infra::{is_cacheable, CacheEntry, CacheLookup, CacheStore, HttpTransport, ReqwestTransport};
use crate::shared::PipelineTiming;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type ProxyFuture<'a> = Pin<Box<dyn Future<Output = RenderedResponse> + Send + 'a>>;

/// Trait for services that answer proxy requests.
pub trait ProxyService: Send + Sync {
    /// Handles one proxy request.
    ///
    /// # Arguments
    ///
    /// * `params` - The query parameters of the inbound request
    ///
    /// # Returns
    ///
    /// A future resolving to the fully rendered response, errors included.
    fn handle(&self, params: ProxyParams) -> ProxyFuture<'_>;
}

/// Default pipeline implementation.
pub struct HttpProxyService {
    guard: SsrfGuard,
    policies: PolicyRegistry,
    cache: Option<CacheStore>,
    engine: FetchEngine,
    fetch_defaults: FetchConfig,
}

impl HttpProxyService {
    pub fn new(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| CacheStore::new(config.cache.dir.clone(), config.cache.ttl));

        Self {
            guard: SsrfGuard::new(config.allow_internal_targets),
            policies: PolicyRegistry::builtin(),
            cache,
            engine: FetchEngine::new(transport, EngineSettings::from_config(config)),
            fetch_defaults: config.fetch.clone(),
        }
    }

    /// Creates the service backed by `reqwest`, wrapped in an `Arc`.
    pub fn arc(config: &Config) -> Arc<Self> {
        Arc::new(Self::new(config, ReqwestTransport::arc()))
    }

    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub async fn process(&self, params: &ProxyParams) -> RenderedResponse {
        let formatter = ResponseFormatter::from_params(params);

        // Validation failures end the request before any network access.
        let url = match self.guard.validate(params.url.as_deref()) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "Rejected proxy request");
                return formatter.render_error(&err, None);
            }
        };

        let mut timing = PipelineTiming::new();
        let policy = self.policies.resolve(url.as_str());
        let request = FetchRequest::new(url, &policy, &self.fetch_defaults);

        tracing::debug!(
            url = %request.url,
            policy = policy.match_token,
            timeout_secs = request.timeout.as_secs(),
            max_redirects = request.max_redirects,
            "Proxying request"
        );

        let settings = self.engine.settings();
        let mut diagnostics = Diagnostics {
            site_policy: (!policy.is_default()).then(|| policy.match_token.to_string()),
            config: Some(EffectiveConfig {
                timeout_secs: request.timeout.as_secs(),
                max_redirects: request.max_redirects,
                user_agent: settings.user_agent.clone(),
                verify_ssl: settings.verify_ssl,
            }),
            ..Default::default()
        };

        let cache_key = CacheStore::key_for(&request.url);
        match &self.cache {
            None => diagnostics.cache = CacheStatus::Disabled,
            Some(_) if request.force_fresh_fetch => diagnostics.cache = CacheStatus::Bypassed,
            Some(cache) => {
                timing.start_cache_lookup();
                let lookup = cache.lookup(&cache_key).await;
                timing.end_cache_lookup();

                match lookup {
                    CacheLookup::Fresh { entry, age } => {
                        tracing::debug!(url = %request.url, age_secs = age.as_secs(), "Serving from cache");
                        diagnostics.cache = CacheStatus::Hit {
                            age_secs: age.as_secs(),
                        };
                        diagnostics.cached_diagnostics = entry.diagnostics;
                        diagnostics.timing = timing.to_timing_info();
                        return formatter.render(
                            entry.status,
                            entry.body,
                            &entry.content_type,
                            diagnostics,
                        );
                    }
                    CacheLookup::Stale { age } => {
                        diagnostics.cache = CacheStatus::Stale {
                            age_secs: age.as_secs(),
                        };
                    }
                    CacheLookup::Absent => diagnostics.cache = CacheStatus::Miss,
                }
            }
        }

        timing.start_fetch();
        let (outcome, trace) = self.engine.fetch(&request).await;
        timing.end_fetch();
        diagnostics.fetch = Some(trace);

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "All fetch strategies failed");
                diagnostics.timing = timing.to_timing_info();
                return formatter.render_error(&err, Some(&diagnostics));
            }
        };

        let mut entry = CacheEntry::new(response.status, response.content_type, response.body);
        if let Some(cache) = self.cache.as_ref().filter(|_| is_cacheable(entry.status)) {
            timing.start_cache_write();
            entry.diagnostics = diagnostics
                .fetch
                .as_ref()
                .and_then(|trace| serde_json::to_value(trace).ok());
            if let Err(err) = cache.store(&cache_key, &entry).await {
                tracing::warn!(key = %cache_key, error = %err, "Cache write failed");
                diagnostics.cache_write_error = Some(err.to_string());
            }
            timing.end_cache_write();
        }

        diagnostics.timing = timing.to_timing_info();
        formatter.render(entry.status, entry.body, &entry.content_type, diagnostics)
    }
}

impl ProxyService for HttpProxyService {
    fn handle(&self, params: ProxyParams) -> ProxyFuture<'_> {
        Box::pin(async move { self.process(&params).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::infra::TransportErrorKind;
    use crate::proxy::types::SitePolicy;
    use crate::test_support::{failure, reply, ScriptedTransport};
    use std::time::Duration;
    use tempfile::TempDir;
    use url::Url;

    fn config(cache_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.cache.dir = cache_dir.path().join("cache");
        config.pacing = PacingConfig::disabled();
        config
    }

    fn params(url: &str, format: &str) -> ProxyParams {
        ProxyParams {
            url: Some(url.to_string()),
            format: Some(format.to_string()),
            ..Default::default()
        }
    }

    fn debug_json(response: &RenderedResponse) -> serde_json::Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_url_never_touches_network() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        for raw in [None, Some("not a url"), Some("/relative"), Some("ftp://example.com/")] {
            let params = ProxyParams {
                url: raw.map(str::to_string),
                ..Default::default()
            };
            let response = service.process(&params).await;
            assert_eq!(response.status, 400, "{:?}", raw);
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_internal_target_forbidden_without_override() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        for url in ["http://127.0.0.1/", "http://192.168.0.10/admin", "http://[::1]:8080/"] {
            let response = service.process(&params(url, "json")).await;
            assert_eq!(response.status, 403);
            let value = debug_json(&response);
            assert!(value["contents"].is_null());
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_internal_target_allowed_with_override() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, "text/plain", "internal")]);
        let mut config = config(&dir);
        config.allow_internal_targets = true;
        let service = HttpProxyService::new(&config, transport.clone());

        let response = service.process(&params("http://127.0.0.1/status", "raw")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"internal");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, "text/plain", "hello")]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        let first = service.process(&params("https://example.com/a", "json")).await;
        let second = service.process(&params("https://example.com/a", "json")).await;

        assert_eq!(transport.calls(), 1);
        assert_eq!(debug_json(&first)["contents"], debug_json(&second)["contents"]);
        assert_eq!(first.body, second.body);
    }

    #[tokio::test]
    async fn test_cache_hit_reports_age_and_stored_trace() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, "text/plain", "hello")]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        let mut debug = params("https://example.com/a", "json");
        debug.debug = Some("1".to_string());

        let first = debug_json(&service.process(&debug).await);
        assert_eq!(first["debug"]["cache"]["state"], "miss");
        assert_eq!(first["debug"]["fetch"]["strategy_used"], "standard");

        let second = debug_json(&service.process(&debug).await);
        assert_eq!(second["debug"]["cache"]["state"], "hit");
        assert_eq!(
            second["debug"]["cached_diagnostics"]["strategy_used"],
            "standard"
        );
        assert!(second["debug"].get("fetch").is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_one_refetch() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let url = Url::parse("https://example.com/old").unwrap();

        let store = CacheStore::new(config.cache.dir.clone(), config.cache.ttl);
        let mut old = CacheEntry::new(200, "text/plain".to_string(), b"old".to_vec());
        old.stored_at -= 7200;
        store.store(&CacheStore::key_for(&url), &old).await.unwrap();

        let transport = ScriptedTransport::new(vec![reply(200, "text/plain", "new")]);
        let service = HttpProxyService::new(&config, transport.clone());

        let mut request = params(url.as_str(), "json");
        request.debug = Some("true".to_string());
        let value = debug_json(&service.process(&request).await);

        assert_eq!(transport.calls(), 1);
        assert_eq!(value["contents"], "new");
        assert_eq!(value["debug"]["cache"]["state"], "stale");
    }

    #[tokio::test]
    async fn test_error_statuses_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(404, "text/html", "missing"),
            reply(404, "text/html", "missing"),
        ]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        let first = service.process(&params("https://example.com/gone", "raw")).await;
        assert_eq!(first.status, 404);
        service.process(&params("https://example.com/gone", "raw")).await;
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(200, "text/plain", "one"),
            reply(200, "text/plain", "two"),
        ]);
        let mut config = config(&dir);
        config.cache.enabled = false;
        let service = HttpProxyService::new(&config, transport.clone());

        service.process(&params("https://example.com/", "raw")).await;
        let second = service.process(&params("https://example.com/", "raw")).await;
        assert_eq!(second.body, b"two");
        assert_eq!(transport.calls(), 2);
        assert!(!config.cache.dir.exists());
    }

    #[tokio::test]
    async fn test_policy_forces_fresh_fetch_but_still_writes() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(200, "text/plain", "one"),
            reply(200, "text/plain", "two"),
        ]);
        let config = config(&dir);
        let service = HttpProxyService::new(&config, transport.clone()).with_policies(
            PolicyRegistry::new(vec![SitePolicy {
                match_token: "hardened.example",
                timeout_override: Some(Duration::from_secs(40)),
                redirect_override: Some(15),
                dedicated_handler: None,
                skip_cache: true,
                challenging_profile: false,
            }]),
        );

        let mut request = params("https://hardened.example/page", "json");
        request.debug = Some("1".to_string());
        service.process(&request).await;
        let value = debug_json(&service.process(&request).await);

        assert_eq!(transport.calls(), 2);
        assert_eq!(value["contents"], "two");
        assert_eq!(value["debug"]["cache"]["state"], "bypassed");
        assert_eq!(value["debug"]["site_policy"], "hardened.example");
        assert_eq!(value["debug"]["config"]["timeout_secs"], 40);
        assert_eq!(transport.requests()[0].timeout, Duration::from_secs(40));
        assert_eq!(transport.requests()[0].max_redirects, 15);
        assert_eq!(std::fs::read_dir(&config.cache.dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_500_envelope() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![failure(
            TransportErrorKind::Connect,
            "connection refused",
        )]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        let response = service.process(&params("https://example.com/", "json")).await;
        assert_eq!(response.status, 500);
        let value = debug_json(&response);
        assert!(value["contents"].is_null());
        assert!(value["status"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        // A file where the directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        config.cache.dir = blocker;

        let transport = ScriptedTransport::new(vec![reply(200, "text/plain", "hello")]);
        let service = HttpProxyService::new(&config, transport);

        let mut request = params("https://example.com/", "json");
        request.debug = Some("1".to_string());
        let response = service.process(&request).await;
        assert_eq!(response.status, 200);

        let value = debug_json(&response);
        assert_eq!(value["contents"], "hello");
        assert!(value["debug"]["cache_write_error"].is_string());
    }

    #[tokio::test]
    async fn test_waf_escalation_through_pipeline() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(403, "text/html", "solve this captcha"),
            reply(200, "text/html", "article"),
        ]);
        let service = HttpProxyService::new(&config(&dir), transport.clone());

        let mut request = params("https://news.example.com/", "json");
        request.debug = Some("1".to_string());
        let value = debug_json(&service.process(&request).await);

        assert_eq!(transport.calls(), 2);
        assert_eq!(value["status"]["http_code"], 200);
        assert_eq!(value["contents"], "article");
        assert_eq!(value["debug"]["fetch"]["strategy_used"], "waf_bypass");
        assert_eq!(value["debug"]["fetch"]["waf_signal"], "status code 403");
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![]);
        let service: Arc<dyn ProxyService> =
            Arc::new(HttpProxyService::new(&config(&dir), transport));

        let response = service.handle(ProxyParams::default()).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body, b"URL parameter is missing");
    }

    mod end_to_end {
        use super::*;
        use wiremock::matchers::{header, header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_bypass_against_live_server() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/guarded"))
                .and(header_exists("sec-ch-ua"))
                .and(header("referer", "https://www.google.com/search?q=127.0.0.1"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_raw("the real page".as_bytes(), "text/html; charset=utf-8"),
                )
                .with_priority(1)
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/guarded"))
                .respond_with(
                    ResponseTemplate::new(403)
                        .set_body_raw("Please complete the security check".as_bytes(), "text/html"),
                )
                .expect(1)
                .mount(&server)
                .await;

            let dir = TempDir::new().unwrap();
            let mut config = config(&dir);
            config.allow_internal_targets = true;
            let service = HttpProxyService::new(&config, ReqwestTransport::arc());

            let response = service
                .process(&params(&format!("{}/guarded", server.uri()), "raw"))
                .await;

            assert_eq!(response.status, 200);
            assert_eq!(response.body, b"the real page");
            assert_eq!(response.content_type, "text/html; charset=utf-8");
        }
    }
}
