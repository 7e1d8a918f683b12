//! Scripted transport shared by the engine and service tests.

use crate::infra::{
    HttpTransport, TransportError, TransportErrorKind, TransportFuture, TransportRequest,
    TransportResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Replays canned results in order and records every request it sees,
/// along with the tokio clock reading when it arrived.
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    seen: Mutex<Vec<TransportRequest>>,
    seen_at: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            seen_at: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.seen_at.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
        let url = request.url.clone();
        self.seen.lock().unwrap().push(request);
        self.seen_at.lock().unwrap().push(Instant::now());
        let next = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            next.unwrap_or_else(|| {
                Err(TransportError::new(
                    TransportErrorKind::Other,
                    format!("no scripted reply for {}", url),
                ))
            })
        })
    }
}

pub(crate) fn reply(
    status: u16,
    content_type: &str,
    body: impl Into<Vec<u8>>,
) -> Result<TransportResponse, TransportError> {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    Ok(TransportResponse {
        status,
        final_url: "https://scripted.test/".to_string(),
        headers,
        content_type: content_type.to_string(),
        body: body.into(),
    })
}

pub(crate) fn failure(
    kind: TransportErrorKind,
    message: &str,
) -> Result<TransportResponse, TransportError> {
    Err(TransportError::new(kind, message))
}
