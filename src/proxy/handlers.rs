//! Dedicated per-site retrieval handlers.

use super::executor::FetchEngine;
use super::fingerprint;
use super::types::{AttemptTrace, FetchAttemptResult, FetchRequest, SiteHandler, Strategy};
use reqwest::cookie::Jar;
use std::sync::Arc;

/// Runs `handler` for `request`. `None` means the handler could not produce
/// a response and the caller should continue with the standard strategy.
pub(super) async fn run_handler(
    engine: &FetchEngine,
    handler: &SiteHandler,
    request: &FetchRequest,
    trace: &mut AttemptTrace,
) -> Option<FetchAttemptResult> {
    match handler {
        SiteHandler::SessionWarmup { landing_page } => {
            session_warmup(engine, landing_page, request, trace).await
        }
    }
}

async fn session_warmup(
    engine: &FetchEngine,
    landing_page: &str,
    request: &FetchRequest,
    trace: &mut AttemptTrace,
) -> Option<FetchAttemptResult> {
    let jar = Arc::new(Jar::default());

    let mut warmup = engine.transport_request(
        landing_page,
        fingerprint::warmup_headers(),
        request.timeout,
        request.max_redirects,
    );
    warmup.cookie_jar = Some(Arc::clone(&jar));

    // The landing page only seeds cookies; its outcome is recorded and ignored.
    if let Err(err) = engine.attempt(Strategy::HandlerWarmup, warmup, trace).await {
        tracing::debug!(landing_page, error = %err, "Landing page visit failed, continuing");
    }

    engine.pace(&engine.settings().pacing.handler_delay_ms).await;

    let mut target = engine.transport_request(
        request.url.as_str(),
        fingerprint::same_origin_headers(),
        request.timeout,
        request.max_redirects,
    );
    target.referer = Some(landing_page.to_string());
    target.cookie_jar = Some(jar);

    match engine.attempt(Strategy::SiteHandler, target, trace).await {
        Ok(result) => {
            tracing::info!(url = %request.url, status = result.status, "Session warm-up handler completed");
            Some(result)
        }
        Err(err) => {
            tracing::warn!(url = %request.url, error = %err, "Session warm-up handler failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use crate::infra::TransportErrorKind;
    use crate::proxy::executor::EngineSettings;
    use crate::test_support::{failure, reply, ScriptedTransport};
    use std::time::Duration;
    use url::Url;

    fn engine(transport: Arc<ScriptedTransport>) -> FetchEngine {
        paced_engine(transport, PacingConfig::disabled())
    }

    fn paced_engine(transport: Arc<ScriptedTransport>, pacing: PacingConfig) -> FetchEngine {
        FetchEngine::new(
            transport,
            EngineSettings {
                user_agent: "test-agent".to_string(),
                verify_ssl: true,
                allow_internal_targets: false,
                pacing,
            },
        )
    }

    fn request() -> FetchRequest {
        FetchRequest {
            url: Url::parse("https://www.example.org/work/item").unwrap(),
            timeout: Duration::from_secs(40),
            max_redirects: 15,
            force_fresh_fetch: true,
            challenging_profile: true,
            handler: Some(SiteHandler::SessionWarmup {
                landing_page: "https://www.example.org/",
            }),
        }
    }

    #[tokio::test]
    async fn test_warmup_then_target_share_session() {
        let transport = ScriptedTransport::new(vec![
            reply(200, "text/html", "landing"),
            reply(200, "text/html", "target"),
        ]);
        let handler = request().handler.unwrap();
        let mut trace = AttemptTrace::default();

        let result = run_handler(&engine(transport.clone()), &handler, &request(), &mut trace)
            .await
            .unwrap();
        assert_eq!(result.body, b"target");

        let sent = transport.requests();
        assert_eq!(sent[0].url, "https://www.example.org/");
        assert_eq!(sent[1].url, "https://www.example.org/work/item");
        assert_eq!(sent[1].referer.as_deref(), Some("https://www.example.org/"));
        assert_eq!(sent[1].timeout, Duration::from_secs(40));
        assert_eq!(sent[1].max_redirects, 15);

        let first = sent[0].cookie_jar.as_ref().unwrap();
        let second = sent[1].cookie_jar.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));

        assert!(sent[1]
            .headers
            .iter()
            .any(|(k, v)| k == "Sec-Fetch-Site" && v == "same-origin"));
        assert_eq!(trace.count(Strategy::HandlerWarmup), 1);
        assert_eq!(trace.count(Strategy::SiteHandler), 1);
    }

    #[tokio::test]
    async fn test_failed_landing_page_does_not_stop_target() {
        let transport = ScriptedTransport::new(vec![
            failure(TransportErrorKind::Connect, "connection refused"),
            reply(200, "text/html", "target"),
        ]);
        let handler = request().handler.unwrap();
        let mut trace = AttemptTrace::default();

        let result = run_handler(&engine(transport.clone()), &handler, &request(), &mut trace).await;
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(trace.attempts[0].error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_failed_target_yields_none() {
        let transport = ScriptedTransport::new(vec![
            reply(200, "text/html", "landing"),
            failure(TransportErrorKind::Timeout, "operation timed out"),
        ]);
        let handler = request().handler.unwrap();
        let mut trace = AttemptTrace::default();

        let result = run_handler(&engine(transport), &handler, &request(), &mut trace).await;
        assert!(result.is_none());
        assert_eq!(trace.attempts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_waits_handler_delay_after_landing_page() {
        let transport = ScriptedTransport::new(vec![
            reply(200, "text/html", "landing"),
            reply(200, "text/html", "target"),
        ]);
        let pacing = PacingConfig {
            handler_delay_ms: 700..=700,
            ..PacingConfig::disabled()
        };
        let handler = request().handler.unwrap();
        let mut trace = AttemptTrace::default();

        let result =
            run_handler(&paced_engine(transport.clone(), pacing), &handler, &request(), &mut trace).await;
        assert!(result.is_some());

        let times = transport.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1].duration_since(times[0]) >= Duration::from_millis(700));
    }
}
