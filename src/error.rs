use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error("Requests to localhost or internal networks are not allowed: {0}")]
    ForbiddenTarget(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Cache I/O failure: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Transcoding failed: {0}")]
    Transcode(String),
}

impl ProxyError {
    /// HTTP status surfaced to the caller when this error ends a request.
    ///
    /// `CacheIo` and `Transcode` never end a request; they map to 500 only
    /// so that the mapping is total.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            ProxyError::TransportFailure(_)
            | ProxyError::CacheIo(_)
            | ProxyError::Transcode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::InvalidUrl(_) => "INVALID_URL",
            ProxyError::ForbiddenTarget(_) => "FORBIDDEN_TARGET",
            ProxyError::TransportFailure(_) => "TRANSPORT_FAILURE",
            ProxyError::CacheIo(_) => "CACHE_IO",
            ProxyError::Transcode(_) => "TRANSCODE_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::InvalidUrl("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::ForbiddenTarget("localhost".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::TransportFailure("reset".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: ProxyError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.code(), "CACHE_IO");
        assert!(err.to_string().contains("disk full"));
    }
}
