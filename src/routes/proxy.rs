use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};

use crate::proxy::{ProxyParams, RenderedResponse};
use crate::routes::AppState;

pub async fn proxy_request(
    State(state): State<AppState>,
    query: Result<Query<ProxyParams>, QueryRejection>,
) -> RenderedResponse {
    // An unparsable query string is handled like a missing `url`.
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unparsable query string");
            ProxyParams::default()
        }
    };

    tracing::debug!(
        url = params.url.as_deref().unwrap_or(""),
        format = params.format.as_deref().unwrap_or("raw"),
        "Proxying request"
    );

    let response = state.service.handle(params).await;

    if response.status >= 400 {
        tracing::warn!(status = response.status, "Request finished with error status");
    } else {
        tracing::debug!(status = response.status, bytes = response.body.len(), "Request succeeded");
    }

    response
}
